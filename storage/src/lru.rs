//! 最近使用链表
//!
//! 以下标代替指针的双向循环链表，表头是最近使用的缓冲区，表尾是最久未用的。
//! 哨兵位于最后一个槽位。

use alloc::vec::Vec;

use crate::buf::BufId;

#[derive(Debug, Clone, Copy)]
struct Link {
    prev: usize,
    next: usize,
}

#[derive(Debug)]
pub struct LruList {
    links: Vec<Link>,
}

impl LruList {
    /// 依次把 `0..len` 插到表头，最后插入的在最前
    pub fn new(len: usize) -> Self {
        let mut list = Self {
            links: alloc::vec![Link { prev: len, next: len }; len + 1],
        };
        for id in 0..len {
            list.push_front(id);
        }
        list
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.links.len() - 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 移到表头，O(1)
    pub fn move_to_front(&mut self, id: BufId) {
        assert!(id < self.len(), "lru: no buffer {id}");
        self.unlink(id);
        self.push_front(id);
    }

    /// 从最近使用到最久未用
    pub fn iter(&self) -> Iter<'_> {
        let head = self.head();
        Iter {
            list: self,
            front: self.links[head].next,
            back: self.links[head].prev,
            remaining: self.len(),
        }
    }
}

impl LruList {
    #[inline]
    fn head(&self) -> usize {
        self.links.len() - 1
    }

    fn unlink(&mut self, id: BufId) {
        let Link { prev, next } = self.links[id];
        self.links[prev].next = next;
        self.links[next].prev = prev;
    }

    fn push_front(&mut self, id: BufId) {
        let head = self.head();
        let first = self.links[head].next;
        self.links[id] = Link {
            prev: head,
            next: first,
        };
        self.links[first].prev = id;
        self.links[head].next = id;
    }
}

pub struct Iter<'a> {
    list: &'a LruList,
    front: usize,
    back: usize,
    remaining: usize,
}

impl Iterator for Iter<'_> {
    type Item = BufId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.front;
        self.front = self.list.links[id].next;
        self.remaining -= 1;
        Some(id)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.back;
        self.back = self.list.links[id].prev;
        self.remaining -= 1;
        Some(id)
    }
}

impl ExactSizeIterator for Iter<'_> {}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use super::LruList;

    #[test]
    fn initial_order() {
        let list = LruList::new(4);
        assert_eq!(4, list.len());
        assert_eq!(vec![3, 2, 1, 0], list.iter().collect::<Vec<_>>());
        assert_eq!(vec![0, 1, 2, 3], list.iter().rev().collect::<Vec<_>>());
    }

    #[test]
    fn move_to_front() {
        let mut list = LruList::new(4);
        list.move_to_front(0);
        assert_eq!(vec![0, 3, 2, 1], list.iter().collect::<Vec<_>>());
        list.move_to_front(2);
        list.move_to_front(2);
        assert_eq!(vec![2, 0, 3, 1], list.iter().collect::<Vec<_>>());
        assert_eq!(Some(1), list.iter().next_back());
    }

    #[test]
    fn both_ends_meet() {
        let list = LruList::new(3);
        let mut iter = list.iter();
        assert_eq!(Some(2), iter.next());
        assert_eq!(Some(0), iter.next_back());
        assert_eq!(Some(1), iter.next());
        assert_eq!(None, iter.next_back());
        assert_eq!(None, iter.next());
    }

    #[test]
    fn empty() {
        let list = LruList::new(0);
        assert!(list.is_empty());
        assert_eq!(None, list.iter().next());
    }
}
