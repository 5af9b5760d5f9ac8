//! # 块缓存层
//!
//! 固定数量的缓冲区按最近使用排成链表，缓存磁盘扇区的内容，
//! 同时是多个执行流访问同一扇区的同步点：任一 (设备, 扇区) 至多有一个缓冲区。
//!
//! 用法：
//! - [`BufferCache::read`] 借出装有扇区内容的缓冲区；
//! - 修改后调用 [`BufferCache::write`] 写回磁盘；
//! - 用完调用 [`BufferCache::release`]（或直接丢弃句柄）归还；
//! - 同一时刻只有一个执行流能借出某个缓冲区，不要久占。

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::ptr;

use block_dev::{DeviceId, SectorData, SectorId};
use enumflags2::BitFlags;
use spin::Mutex;

use crate::IoError;
use crate::buf::{Buf, BufFlag, BufId};
use crate::ide::IdeDriver;
use crate::lru::LruList;
use crate::sync::{self, Scheduler};

/// 缓存未命中时的 I/O 方式
///
/// 中断 I/O 依赖调度器的休眠与唤醒，调度器与中断就绪之前只能轮询。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    Interrupt,
    Poll,
}

pub struct BufferCache {
    bufs: Box<[Arc<Buf>]>,
    /// 缓存锁：保护链表、各缓冲区的身份与借出标志
    lru: Mutex<LruList>,
    ide: Arc<IdeDriver>,
    sched: Arc<dyn Scheduler>,
}

impl core::fmt::Debug for BufferCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufferCache")
            .field("capacity", &self.bufs.len())
            .field("ide", &self.ide)
            .finish()
    }
}

impl BufferCache {
    pub fn new(capacity: usize, ide: Arc<IdeDriver>, sched: Arc<dyn Scheduler>) -> Self {
        Self {
            bufs: (0..capacity).map(|id| Arc::new(Buf::new(id))).collect(),
            lru: Mutex::new(LruList::new(capacity)),
            ide,
            sched,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.bufs.len()
    }

    #[inline]
    pub fn ide(&self) -> &Arc<IdeDriver> {
        &self.ide
    }

    /// 借出 (设备, 扇区) 对应的缓冲区，内容不保证有效。
    ///
    /// 已缓存但被借出时休眠，醒来后从头再找；
    /// 未缓存时从最久未用的一端回收一个既不忙也不脏的缓冲区。
    pub fn acquire(&self, dev: DeviceId, sector: SectorId) -> BufGuard<'_> {
        let mut lru = self.lru.lock();

        loop {
            // 是否已缓存？
            let cached = lru.iter().find(|&id| self.bufs[id].lock().is(dev, sector));
            if let Some(id) = cached {
                let buf = &self.bufs[id];
                let mut inner = buf.lock();
                if !inner.flags.contains(BufFlag::Busy) {
                    inner.flags.insert(BufFlag::Busy);
                    return BufGuard::new(self, buf.clone());
                }
                drop(inner);
                lru = sync::sleep_on(&*self.sched, buf.channel(), &self.lru, lru);
                continue;
            }

            // 未缓存，回收
            let victim = lru.iter().rev().find(|&id| {
                !self.bufs[id]
                    .lock()
                    .flags
                    .intersects(BufFlag::Busy | BufFlag::Dirty)
            });
            let Some(id) = victim else {
                drop(lru);
                panic!("bget: no buffers");
            };

            let buf = &self.bufs[id];
            let mut inner = buf.lock();
            if let Some((old_dev, old_sector)) = inner.key {
                log::trace!("bget: buffer {id} evicts sector {old_sector} of disk {old_dev}");
            }
            inner.key = Some((dev, sector));
            inner.flags = BufFlag::Busy.into();
            return BufGuard::new(self, buf.clone());
        }
    }

    /// 借出装有扇区当前内容的缓冲区，未命中时以中断方式读盘
    pub fn read(&self, dev: DeviceId, sector: SectorId) -> Result<BufGuard<'_>, IoError> {
        self.read_with(dev, sector, IoMode::Interrupt)
    }

    /// 同 [`read`](Self::read)，但以轮询方式读盘
    pub fn read_polling(&self, dev: DeviceId, sector: SectorId) -> Result<BufGuard<'_>, IoError> {
        self.read_with(dev, sector, IoMode::Poll)
    }

    pub fn read_with(
        &self,
        dev: DeviceId,
        sector: SectorId,
        mode: IoMode,
    ) -> Result<BufGuard<'_>, IoError> {
        let buf = self.acquire(dev, sector);
        if !buf.is_valid() {
            match mode {
                IoMode::Interrupt => self.ide.enqueue_and_wait(&buf.buf)?,
                IoMode::Poll => self.ide.poll_transfer(&buf.buf)?,
            }
        }
        Ok(buf)
    }

    /// 同步写回缓冲区
    pub fn write(&self, buf: &mut BufGuard<'_>) -> Result<(), IoError> {
        assert!(ptr::eq(buf.cache, self), "bwrite: buffer of another cache");
        {
            let mut inner = buf.buf.lock();
            assert!(inner.flags.contains(BufFlag::Busy), "bwrite");
            inner.flags.insert(BufFlag::Dirty);
        }
        self.ide.enqueue_and_wait(&buf.buf)
    }

    /// 归还缓冲区，此后不得再使用
    pub fn release(&self, buf: BufGuard<'_>) {
        assert!(ptr::eq(buf.cache, self), "brelse: buffer of another cache");
        drop(buf);
    }

    /// 读出一个原始扇区
    pub fn read_sector(
        &self,
        dev: DeviceId,
        sector: SectorId,
        dest: &mut SectorData,
    ) -> Result<(), IoError> {
        let buf = self.read(dev, sector)?;
        buf.map(|data| dest.copy_from_slice(data));
        self.release(buf);
        Ok(())
    }

    /// 整个覆盖一个原始扇区，无须先读
    pub fn write_sector(
        &self,
        dev: DeviceId,
        sector: SectorId,
        src: &SectorData,
    ) -> Result<(), IoError> {
        let mut buf = self.acquire(dev, sector);
        buf.map_mut(|data| data.copy_from_slice(src));
        self.write(&mut buf)?;
        self.release(buf);
        Ok(())
    }
}

impl BufferCache {
    /// 移到表头，清除借出标志，唤醒等待者
    fn brelse(&self, buf: &Buf) {
        let mut lru = self.lru.lock();
        let mut inner = buf.lock();
        if !inner.flags.contains(BufFlag::Busy) {
            drop(inner);
            drop(lru);
            panic!("brelse");
        }

        lru.move_to_front(buf.id());
        inner.flags.remove(BufFlag::Busy);
        drop(inner);

        self.sched.wakeup(buf.channel());
    }
}

/// 借出的缓冲区
///
/// 只有持有者能读写内容；丢弃即归还。
/// 传给 [`map`](Self::map) 等方法的闭包不得再进入缓存。
pub struct BufGuard<'a> {
    cache: &'a BufferCache,
    buf: Arc<Buf>,
}

impl<'a> BufGuard<'a> {
    fn new(cache: &'a BufferCache, buf: Arc<Buf>) -> Self {
        Self { cache, buf }
    }

    #[inline]
    pub fn id(&self) -> BufId {
        self.buf.id()
    }

    pub fn device(&self) -> DeviceId {
        self.key().0
    }

    pub fn sector(&self) -> SectorId {
        self.key().1
    }

    #[inline]
    pub fn flags(&self) -> BitFlags<BufFlag> {
        self.buf.flags()
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.flags().contains(BufFlag::Valid)
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.flags().contains(BufFlag::Dirty)
    }

    #[inline]
    pub fn map<V>(&self, f: impl FnOnce(&SectorData) -> V) -> V {
        f(&self.buf.lock().data)
    }

    #[inline]
    pub fn map_mut<V>(&mut self, f: impl FnOnce(&mut SectorData) -> V) -> V {
        f(&mut self.buf.lock().data)
    }

    fn key(&self) -> (DeviceId, SectorId) {
        self.buf.key().expect("busy buffer without identity")
    }
}

impl core::fmt::Debug for BufGuard<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufGuard").field("buf", &self.buf).finish()
    }
}

impl Drop for BufGuard<'_> {
    fn drop(&mut self) {
        self.cache.brelse(&self.buf);
    }
}
