//! 扇区与设备的编号

use core::fmt;
use core::ops::Add;

use derive_more::{Add, From, Into};

/// 磁盘上的绝对扇区号（LBA28）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Add, From, Into)]
#[repr(transparent)]
pub struct SectorId(u32);

impl Add<u32> for SectorId {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        self + Self(rhs)
    }
}

impl SectorId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// 扇区在磁盘上的字节偏移
    pub const fn byte_offset(self) -> u64 {
        self.0 as u64 * crate::SECTOR_SIZE as u64
    }
}

impl fmt::Display for SectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 控制器上的驱动器编号：0 为主盘，1 为从盘
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[repr(transparent)]
pub struct DeviceId(u32);

impl DeviceId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// 驱动器选择位，一个通道只有主从两个驱动器
    pub const fn drive(self) -> usize {
        (self.0 & 1) as usize
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
