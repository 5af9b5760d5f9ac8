//! # 块存储栈
//!
//! 自下而上：
//! - [`ide`]：PIO 磁盘驱动，请求排队，由中断或轮询完成；
//! - [`bio`]：块缓存，同一扇区在内存中至多一份；
//! - [`part`]：MBR 分区表与 EXT2 超级块校验；
//! - [`ext2`]：超级块读取。
//!
//! 调度器（休眠/唤醒）与日志层（事务钩子）由使用者提供，
//! 见 [`Scheduler`] 与 [`Journal`]。
//! [`Storage`] 把以上各层装配在一起，是上层使用的入口。

#![no_std]

extern crate alloc;

pub mod bio;
pub mod buf;
pub mod config;
pub mod error;
pub mod ext2;
pub mod ide;
pub mod journal;
mod lru;
pub mod part;
pub mod sync;

use alloc::sync::Arc;

use block_dev::{Controller, DeviceId, SectorData, SectorId};

pub use self::{
    bio::{BufGuard, BufferCache, IoMode},
    buf::{BufFlag, BufId},
    error::IoError,
    ext2::SuperBlock,
    ide::IdeDriver,
    journal::{Journal, NoJournal},
    part::{BackupStatus, Partition, PartitionTable},
    sync::{Channel, Scheduler},
};

/// 装配好的存储栈
pub struct Storage {
    cache: BufferCache,
    parts: PartitionTable,
    journal: Arc<dyn Journal>,
}

impl core::fmt::Debug for Storage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Storage")
            .field("cache", &self.cache)
            .field("parts", &self.parts)
            .finish_non_exhaustive()
    }
}

impl Storage {
    /// 内核启动时的初始化：分区表在 [`config::BOOT_DEV`] 上
    pub fn init(
        ctrl: Arc<dyn Controller>,
        sched: Arc<dyn Scheduler>,
        journal: Arc<dyn Journal>,
    ) -> Result<Self, IoError> {
        Self::new(ctrl, sched, journal, config::BOOT_DEV)
    }

    /// 初始化驱动与缓存，扫描 `boot_dev` 的分区表
    ///
    /// 分区扫描只用轮询，因此可以在中断就绪之前调用。
    pub fn new(
        ctrl: Arc<dyn Controller>,
        sched: Arc<dyn Scheduler>,
        journal: Arc<dyn Journal>,
        boot_dev: DeviceId,
    ) -> Result<Self, IoError> {
        let ide = Arc::new(IdeDriver::new(ctrl, sched.clone()));
        let cache = BufferCache::new(config::NBUF, ide, sched);
        let parts = PartitionTable::scan(&cache, boot_dev)?;
        log::info!("storage: {} partition(s) on disk {boot_dev}", parts.len());

        Ok(Self {
            cache,
            parts,
            journal,
        })
    }

    #[inline]
    pub fn cache(&self) -> &BufferCache {
        &self.cache
    }

    /// 中断处理例程经此找到驱动
    #[inline]
    pub fn ide(&self) -> &Arc<IdeDriver> {
        self.cache.ide()
    }

    #[inline]
    pub fn partitions(&self) -> &PartitionTable {
        &self.parts
    }

    pub fn read_sector(
        &self,
        dev: DeviceId,
        sector: SectorId,
        dest: &mut SectorData,
    ) -> Result<(), IoError> {
        self.cache.read_sector(dev, sector, dest)
    }

    pub fn write_sector(
        &self,
        dev: DeviceId,
        sector: SectorId,
        src: &SectorData,
    ) -> Result<(), IoError> {
        self.cache.write_sector(dev, sector, src)
    }

    pub fn read_block(&self, id: usize, block: u32, dest: &mut [u8]) -> Result<(), IoError> {
        self.parts.read_block(&self.cache, id, block, dest)
    }

    pub fn write_block(&self, id: usize, block: u32, src: &[u8]) -> Result<(), IoError> {
        self.parts
            .write_block(&self.cache, &*self.journal, id, block, src)
    }

    pub fn superblock(&self, id: usize) -> Result<SuperBlock, IoError> {
        ext2::read_superblock(&self.cache, &self.parts, id)
    }
}
