#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use block_dev::{DeviceId, RamDisk, SECTOR_SIZE, SectorData, SectorId};
use storage::ext2::{MAGIC, SUPERBLOCK_SIZE};
use storage::part::mbr::{ENTRY_SIZE, SIGNATURE, TABLE_OFFSET};
use storage::{BufferCache, Channel, IdeDriver, Journal, Scheduler};

pub const DISK0: DeviceId = DeviceId::new(0);
pub const DISK1: DeviceId = DeviceId::new(1);

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 以系统线程模拟调度器：每个通道一个世代计数，唤醒即加一
#[derive(Debug, Default)]
pub struct StdScheduler {
    state: Mutex<SchedState>,
    cond: Condvar,
}

#[derive(Debug, Default)]
struct SchedState {
    generations: HashMap<Channel, u64>,
    sleeping: usize,
}

impl StdScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sleeping(&self) -> usize {
        self.state.lock().unwrap().sleeping
    }

    /// 等到至少 `count` 个执行流睡下
    pub fn wait_for_sleepers(&self, count: usize) {
        let mut state = self.state.lock().unwrap();
        while state.sleeping < count {
            state = self.cond.wait(state).unwrap();
        }
    }
}

impl Scheduler for StdScheduler {
    fn sleep(&self, chan: Channel, unlock: &mut dyn FnMut()) {
        let mut state = self.state.lock().unwrap();
        let generation = *state.generations.entry(chan).or_default();
        state.sleeping += 1;
        self.cond.notify_all();
        unlock();

        while state.generations[&chan] == generation {
            state = self.cond.wait(state).unwrap();
        }
        state.sleeping -= 1;
    }

    fn wakeup(&self, chan: Channel) {
        let mut state = self.state.lock().unwrap();
        *state.generations.entry(chan).or_default() += 1;
        self.cond.notify_all();
    }
}

/// 中断线：后台线程取走控制器挂起的中断，交给驱动处理
pub struct IrqLine {
    stop: Arc<AtomicBool>,
    handled: Arc<AtomicUsize>,
    worker: Option<JoinHandle<()>>,
}

impl IrqLine {
    pub fn new(disk: Arc<RamDisk>, ide: Arc<IdeDriver>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let handled = Arc::new(AtomicUsize::new(0));
        let worker = thread::spawn({
            let stop = stop.clone();
            let handled = handled.clone();
            move || {
                while !stop.load(Ordering::Acquire) {
                    if disk.take_interrupt() {
                        ide.handle_irq();
                        handled.fetch_add(1, Ordering::Relaxed);
                    } else {
                        thread::yield_now();
                    }
                }
            }
        });

        Self {
            stop,
            handled,
            worker: Some(worker),
        }
    }

    pub fn handled(&self) -> usize {
        self.handled.load(Ordering::Relaxed)
    }
}

impl Drop for IrqLine {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// 内存盘 + 驱动 + 缓存
pub struct Rig {
    pub disk: Arc<RamDisk>,
    pub sched: Arc<StdScheduler>,
    pub ide: Arc<IdeDriver>,
    pub cache: BufferCache,
}

impl Rig {
    pub fn new(capacity: usize, sectors: usize) -> Self {
        Self::with_disk(capacity, RamDisk::new(sectors))
    }

    pub fn with_disk(capacity: usize, disk: RamDisk) -> Self {
        init_logger();
        let disk = Arc::new(disk);
        let sched = StdScheduler::new();
        let ide = Arc::new(IdeDriver::new(disk.clone(), sched.clone()));
        let cache = BufferCache::new(capacity, ide.clone(), sched.clone());
        Self {
            disk,
            sched,
            ide,
            cache,
        }
    }

    /// 接上中断线，返回值存活期间中断自动送达
    pub fn irq(&self) -> IrqLine {
        IrqLine::new(self.disk.clone(), self.ide.clone())
    }

    /// 每个扇区填满自己的扇区号
    pub fn fill_pattern(&self, dev: DeviceId, sectors: u32) {
        for sector in 0..sectors {
            self.disk
                .load(dev, SectorId::new(sector), &pattern(sector as u8));
        }
    }
}

pub fn pattern(byte: u8) -> SectorData {
    [byte; SECTOR_SIZE]
}

/// 记录事务钩子的调用次数
#[derive(Debug, Default)]
pub struct CountingJournal {
    pub begins: AtomicUsize,
    pub commits: AtomicUsize,
}

impl Journal for CountingJournal {
    fn begin_transaction(&self) {
        self.begins.fetch_add(1, Ordering::SeqCst);
    }

    fn commit_transaction(&self) {
        self.commits.fetch_add(1, Ordering::SeqCst);
    }
}

/// MBR 表项：(表项号, 分区类型, 起始扇区, 扇区数)
pub fn mbr(entries: &[(usize, u8, u32, u32)]) -> SectorData {
    let mut sector = [0; SECTOR_SIZE];
    for &(slot, system_id, start, count) in entries {
        let offset = TABLE_OFFSET + slot * ENTRY_SIZE;
        let entry = &mut sector[offset..offset + ENTRY_SIZE];
        entry[4] = system_id;
        entry[8..12].copy_from_slice(&start.to_le_bytes());
        entry[12..16].copy_from_slice(&count.to_le_bytes());
    }
    sector[510..].copy_from_slice(&SIGNATURE);
    sector
}

/// 超级块映像中测试关心的字段
#[derive(Debug, Clone, Copy)]
pub struct SbImage {
    pub inodes_count: u32,
    pub blocks_count: u32,
    pub free_blocks_count: u32,
    pub free_inodes_count: u32,
    pub first_data_block: u32,
    pub log_block_size: u32,
    pub blocks_per_group: u32,
    pub magic: u16,
    pub state: u16,
    pub errors: u16,
    pub rev_level: u32,
    pub first_ino: u32,
    pub inode_size: u16,
    pub block_group_nr: u16,
}

impl Default for SbImage {
    fn default() -> Self {
        Self {
            inodes_count: 16,
            blocks_count: 25,
            free_blocks_count: 10,
            free_inodes_count: 5,
            first_data_block: 1,
            log_block_size: 0,
            blocks_per_group: 8,
            magic: MAGIC,
            state: 1,
            errors: 1,
            rev_level: 1,
            first_ino: 11,
            inode_size: 128,
            block_group_nr: 0,
        }
    }
}

impl SbImage {
    pub fn bytes(&self) -> [u8; SUPERBLOCK_SIZE] {
        let mut raw = [0; SUPERBLOCK_SIZE];
        let mut put = |offset: usize, bytes: &[u8]| {
            raw[offset..offset + bytes.len()].copy_from_slice(bytes);
        };
        put(0, &self.inodes_count.to_le_bytes());
        put(4, &self.blocks_count.to_le_bytes());
        put(12, &self.free_blocks_count.to_le_bytes());
        put(16, &self.free_inodes_count.to_le_bytes());
        put(20, &self.first_data_block.to_le_bytes());
        put(24, &self.log_block_size.to_le_bytes());
        put(32, &self.blocks_per_group.to_le_bytes());
        put(56, &self.magic.to_le_bytes());
        put(58, &self.state.to_le_bytes());
        put(60, &self.errors.to_le_bytes());
        put(76, &self.rev_level.to_le_bytes());
        put(84, &self.first_ino.to_le_bytes());
        put(88, &self.inode_size.to_le_bytes());
        put(90, &self.block_group_nr.to_le_bytes());
        raw
    }

    /// 第一个备份的绝对扇区号
    pub fn backup_sector(&self, start: u32) -> u32 {
        let sectors_per_block = (1024 << self.log_block_size) / SECTOR_SIZE as u32;
        start + (self.first_data_block + self.blocks_per_group) * sectors_per_block
    }

    /// 写入主超级块与一份相同的备份
    pub fn install(&self, disk: &RamDisk, dev: DeviceId, start: u32) {
        disk.load(dev, SectorId::new(start + 2), &self.bytes());
        let backup = SbImage {
            block_group_nr: 1,
            ..*self
        };
        disk.load(dev, SectorId::new(self.backup_sector(start)), &backup.bytes());
    }
}
