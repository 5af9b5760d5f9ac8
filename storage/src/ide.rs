//! # 磁盘驱动层
//!
//! 基于 PIO 的 IDE 驱动，每个控制器一条先进先出的请求队列，
//! 队首即控制器正在服务的请求。
//!
//! 中断 I/O 需要调度器的休眠队列，而调度器就绪之前只能轮询，
//! 所以驱动同时提供两种完成方式：
//! - [`IdeDriver::enqueue_and_wait`]：入队后休眠，由 [`IdeDriver::handle_irq`] 唤醒；
//! - [`IdeDriver::poll_transfer`]：不入队，忙等控制器就绪。

use alloc::collections::VecDeque;
use alloc::sync::Arc;

use block_dev::{Command, Controller, DeviceId, Status};
use enumflags2::BitFlags;
use spin::Mutex;

use crate::IoError;
use crate::buf::{Buf, BufFlag};
use crate::sync::{self, Scheduler};

/// 探测从盘时读状态寄存器的次数
const PROBE_TRIES: usize = 1000;

pub struct IdeDriver {
    ctrl: Arc<dyn Controller>,
    sched: Arc<dyn Scheduler>,
    /// 队首是正在传输的缓冲区，修改队列必须持有此锁
    queue: Mutex<VecDeque<Arc<Buf>>>,
    has_disk1: bool,
}

impl core::fmt::Debug for IdeDriver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IdeDriver")
            .field("queue", &self.queue)
            .field("has_disk1", &self.has_disk1)
            .finish()
    }
}

impl IdeDriver {
    pub fn new(ctrl: Arc<dyn Controller>, sched: Arc<dyn Scheduler>) -> Self {
        wait_ready(&*ctrl);

        // 从盘是否存在
        ctrl.select(DeviceId::new(1));
        let has_disk1 = (0..PROBE_TRIES).any(|_| !ctrl.status().is_empty());
        ctrl.select(DeviceId::new(0));
        log::info!("ide: disk 1 {}", if has_disk1 { "present" } else { "absent" });

        Self {
            ctrl,
            sched,
            queue: Mutex::new(VecDeque::new()),
            has_disk1,
        }
    }

    #[inline]
    pub fn has_disk1(&self) -> bool {
        self.has_disk1
    }

    /// 尚未完成的请求数
    #[inline]
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// 同步缓冲区与磁盘：脏则写回，否则读入。
    ///
    /// 成功后缓冲区有效且不脏；失败时读请求保持无效，写请求保持脏。
    pub fn enqueue_and_wait(&self, buf: &Arc<Buf>) -> Result<(), IoError> {
        self.check_request(buf, "iderw");

        let mut queue = self.queue.lock();
        queue.push_back(buf.clone());

        // 控制器空闲，立即开始
        if queue.len() == 1 {
            self.start(buf);
        }

        loop {
            {
                let mut inner = buf.lock();
                if inner.flags.contains(BufFlag::Error) {
                    inner.flags.remove(BufFlag::Error);
                    return Err(IoError::Device);
                }
                if inner.is_synced() {
                    return Ok(());
                }
            }
            queue = sync::sleep_on(&*self.sched, buf.channel(), &self.queue, queue);
        }
    }

    /// 中断处理例程：完成队首请求，唤醒其等待者，再启动下一个请求
    pub fn handle_irq(&self) {
        let mut queue = self.queue.lock();
        let Some(buf) = queue.pop_front() else {
            log::trace!("ide: spurious interrupt");
            return;
        };

        {
            let mut inner = buf.lock();
            match check(wait_ready(&*self.ctrl)) {
                Ok(()) => {
                    if !inner.flags.contains(BufFlag::Dirty) {
                        self.ctrl.read_data(&mut inner.data);
                    }
                    inner.flags.insert(BufFlag::Valid);
                    inner.flags.remove(BufFlag::Dirty);
                }
                Err(_) => {
                    if let Some((dev, sector)) = inner.key {
                        log::warn!("ide: transfer of sector {sector} on disk {dev} failed");
                    }
                    inner.flags.insert(BufFlag::Error);
                }
            }
        }
        self.sched.wakeup(buf.channel());

        if let Some(next) = queue.front() {
            self.start(next);
        }
    }

    /// 不经队列、不等中断的同步传输，用于调度器就绪之前。
    ///
    /// 此时不得有排队中的中断请求。
    pub fn poll_transfer(&self, buf: &Buf) -> Result<(), IoError> {
        self.check_request(buf, "iderwpoll");

        let queue = self.queue.lock();
        if !queue.is_empty() {
            drop(queue);
            panic!("iderwpoll: interrupt-driven requests outstanding");
        }

        let mut inner = buf.lock();
        let Some((dev, sector)) = inner.key else {
            unreachable!("checked busy buffers always have an identity");
        };
        let dirty = inner.flags.contains(BufFlag::Dirty);

        wait_ready(&*self.ctrl);
        self.ctrl.set_interrupt(false);
        if dirty {
            self.ctrl.issue(Command::Write, dev, sector);
            self.ctrl.write_data(&inner.data);
        } else {
            self.ctrl.issue(Command::Read, dev, sector);
        }

        check(wait_ready(&*self.ctrl))?;

        if !dirty {
            self.ctrl.read_data(&mut inner.data);
        }
        inner.flags.insert(BufFlag::Valid);
        inner.flags.remove(BufFlag::Dirty);

        Ok(())
    }
}

impl IdeDriver {
    /// 请求的前提：缓冲区被借出，且确有事可做。
    /// 检查时不持有任何锁，违约直接停机。
    fn check_request(&self, buf: &Buf, op: &str) {
        let (key, busy, synced) = {
            let inner = buf.lock();
            (inner.key, inner.flags.contains(BufFlag::Busy), inner.is_synced())
        };
        assert!(busy, "{op}: buf not busy");
        assert!(!synced, "{op}: nothing to do");
        let Some((dev, _)) = key else {
            panic!("{op}: buf has no identity");
        };
        assert!(dev.raw() <= 1, "{op}: no ide disk {dev}");
        assert!(
            dev == DeviceId::new(0) || self.has_disk1,
            "{op}: ide disk 1 not present"
        );
    }

    /// 开始传输 `buf`，调用者必须持有队列锁
    fn start(&self, buf: &Buf) {
        let inner = buf.lock();
        let Some((dev, sector)) = inner.key else {
            panic!("idestart: buf has no identity");
        };

        wait_ready(&*self.ctrl);
        self.ctrl.set_interrupt(true);
        if inner.flags.contains(BufFlag::Dirty) {
            self.ctrl.issue(Command::Write, dev, sector);
            self.ctrl.write_data(&inner.data);
        } else {
            self.ctrl.issue(Command::Read, dev, sector);
        }
    }
}

/// 忙等控制器不忙且就绪
fn wait_ready(ctrl: &dyn Controller) -> BitFlags<Status> {
    loop {
        let status = ctrl.status();
        if status & (Status::Busy | Status::Ready) == BitFlags::from(Status::Ready) {
            return status;
        }
        core::hint::spin_loop();
    }
}

fn check(status: BitFlags<Status>) -> Result<(), IoError> {
    if status.intersects(Status::Fault | Status::Err) {
        Err(IoError::Device)
    } else {
        Ok(())
    }
}
