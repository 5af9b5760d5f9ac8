//! 缓冲区：一个扇区在内存中的副本

use block_dev::{DeviceId, SECTOR_SIZE, SectorData, SectorId};
use enumflags2::{BitFlags, bitflags};
use spin::{Mutex, MutexGuard};

use crate::sync::Channel;

#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufFlag {
    /// 已被某个执行流借出
    Busy = 1 << 0,
    /// 内容与磁盘一致
    Valid = 1 << 1,
    /// 内容尚未写回磁盘
    Dirty = 1 << 2,
    /// 驱动报告的传输失败，由等待者取走
    Error = 1 << 3,
}

/// 缓冲区在池中的下标
pub type BufId = usize;

#[derive(Debug)]
pub struct Buf {
    id: BufId,
    inner: Mutex<BufInner>,
}

#[derive(Debug)]
pub(crate) struct BufInner {
    /// (设备, 扇区)，从未分配过时为空
    pub key: Option<(DeviceId, SectorId)>,
    pub flags: BitFlags<BufFlag>,
    pub data: SectorData,
}

impl Buf {
    pub(crate) fn new(id: BufId) -> Self {
        Self {
            id,
            inner: Mutex::new(BufInner {
                key: None,
                flags: BitFlags::empty(),
                data: [0; SECTOR_SIZE],
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> BufId {
        self.id
    }

    #[inline]
    pub fn flags(&self) -> BitFlags<BufFlag> {
        self.inner.lock().flags
    }

    #[inline]
    pub fn key(&self) -> Option<(DeviceId, SectorId)> {
        self.inner.lock().key
    }

    /// 等待此缓冲区的执行流都睡在这个通道上
    #[inline]
    pub(crate) fn channel(&self) -> Channel {
        Channel::of(self)
    }

    #[inline]
    pub(crate) fn lock(&self) -> MutexGuard<'_, BufInner> {
        self.inner.lock()
    }
}

impl BufInner {
    #[inline]
    pub fn is(&self, dev: DeviceId, sector: SectorId) -> bool {
        self.key == Some((dev, sector))
    }

    /// 有效且不脏：与磁盘一致，无须传输
    #[inline]
    pub fn is_synced(&self) -> bool {
        self.flags & (BufFlag::Valid | BufFlag::Dirty) == BitFlags::from(BufFlag::Valid)
    }
}
