//! # 调度器协作接口
//!
//! 存储栈自己不调度，阻塞与唤醒都交给调度器。
//! 等待者以**通道**区分，缓冲区的地址就是它的通道。

use spin::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Channel(usize);

impl Channel {
    /// 以对象地址作为通道
    pub fn of<T>(obj: &T) -> Self {
        Self(obj as *const T as usize)
    }
}

pub trait Scheduler: Send + Sync {
    /// 把当前执行流登记为 `chan` 上的等待者，调用 `unlock` 释放调用者持有的锁，
    /// 然后休眠直到 `chan` 被唤醒。
    ///
    /// 登记必须先于 `unlock`，否则唤醒可能落在检查与休眠之间而丢失。
    fn sleep(&self, chan: Channel, unlock: &mut dyn FnMut());

    /// 唤醒 `chan` 上的全部等待者
    fn wakeup(&self, chan: Channel);
}

/// 持锁休眠：原子地放开 `guard` 并在 `chan` 上休眠，醒来后重新持有 `mutex`。
///
/// 醒来不代表条件成立，调用者须重新检查。
pub fn sleep_on<'a, T>(
    sched: &dyn Scheduler,
    chan: Channel,
    mutex: &'a Mutex<T>,
    guard: MutexGuard<'a, T>,
) -> MutexGuard<'a, T> {
    let mut guard = Some(guard);
    sched.sleep(chan, &mut || drop(guard.take()));
    assert!(guard.is_none(), "sleep: scheduler did not release the lock");
    mutex.lock()
}
