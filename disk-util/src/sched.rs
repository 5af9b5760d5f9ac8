//! 单线程调度器
//!
//! 宿主机上只有一个执行流，休眠即空转：取走磁盘挂起的中断交给驱动，
//! 直到自己的通道被唤醒。

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use spin::{Mutex, Once};
use storage::{Channel, IdeDriver, Scheduler};

use crate::image::ImageDisk;

#[derive(Debug)]
pub struct IdleScheduler {
    disk: Arc<ImageDisk>,
    ide: Once<Weak<IdeDriver>>,
    woken: Mutex<BTreeSet<Channel>>,
}

impl IdleScheduler {
    pub fn new(disk: Arc<ImageDisk>) -> Self {
        Self {
            disk,
            ide: Once::new(),
            woken: Mutex::new(BTreeSet::new()),
        }
    }

    /// 指定中断送往的驱动
    pub fn attach(&self, ide: &Arc<IdeDriver>) {
        self.ide.call_once(|| Arc::downgrade(ide));
    }
}

impl Scheduler for IdleScheduler {
    fn sleep(&self, chan: Channel, unlock: &mut dyn FnMut()) {
        self.woken.lock().remove(&chan);
        unlock();

        while !self.woken.lock().remove(&chan) {
            let Some(ide) = self.ide.get().and_then(Weak::upgrade) else {
                panic!("sleep: no interrupt source attached");
            };
            if !self.disk.take_interrupt() {
                // 唯一的执行流睡下了，再没有人能唤醒它
                panic!("sleep: would block forever on {chan:?}");
            }
            ide.handle_irq();
        }
    }

    fn wakeup(&self, chan: Channel) {
        self.woken.lock().insert(chan);
    }
}
