//! 主引导记录（Master Boot Record）
//!
//! 磁盘的 0 号扇区：引导代码 | 四个分区表项（偏移 446） | 签名 0x55 0xAA

use core::fmt;
use core::mem;
use core::ptr;

use block_dev::{SectorData, SectorId};

/// 分区表在扇区内的偏移
pub const TABLE_OFFSET: usize = 446;
pub const ENTRY_SIZE: usize = 16;
pub const ENTRY_COUNT: usize = 4;
pub const SIGNATURE: [u8; 2] = [0x55, 0xAA];

/// 引导标志：可引导
pub const BOOTABLE: u8 = 0x80;

/// 分区表项
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct PartEntry {
    /// 0x80 可引导，0x00 不可引导
    boot_flag: u8,
    start: Chs,
    system_id: u8,
    end: Chs,
    /// 分区首扇区相对于磁盘起点的 LBA（小端）
    relative_start: u32,
    /// 分区的扇区数（小端）
    total_sectors: u32,
}

const _: () = assert!(mem::size_of::<PartEntry>() == ENTRY_SIZE);

/// 柱面/磁头/扇区地址
///
/// - 字节 0：磁头
/// - 字节 1：低 6 位为扇区，高 2 位为柱面的第 8–9 位
/// - 字节 2：柱面的第 0–7 位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Chs([u8; 3]);

impl Chs {
    pub const fn head(self) -> u8 {
        self.0[0]
    }

    pub const fn sector(self) -> u8 {
        self.0[1] & 0x3f
    }

    pub const fn cylinder(self) -> u16 {
        ((self.0[1] as u16 & 0xc0) << 2) | self.0[2] as u16
    }
}

impl fmt::Display for Chs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.cylinder(), self.head(), self.sector())
    }
}

/// 分区类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemId {
    Unused,
    Fat12,
    /// 不超过 32MB
    Fat16Small,
    Extended,
    /// 超过 32MB
    Fat16,
    Hpfs,
    Ntfs,
    LinuxSwap,
    /// 本系统唯一支持的类型
    Linux,
    Unknown(u8),
}

impl From<u8> for SystemId {
    fn from(raw: u8) -> Self {
        match raw {
            0x00 => Self::Unused,
            0x01 => Self::Fat12,
            0x04 => Self::Fat16Small,
            0x05 => Self::Extended,
            0x06 => Self::Fat16,
            0x07 => Self::Hpfs,
            0x08 => Self::Ntfs,
            0x82 => Self::LinuxSwap,
            0x83 => Self::Linux,
            raw => Self::Unknown(raw),
        }
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unused => f.write_str("Unused"),
            Self::Fat12 => f.write_str("DOS 12-bit FAT"),
            Self::Fat16Small => f.write_str("DOS 16-bit FAT (<=32MB)"),
            Self::Extended => f.write_str("DOS Extended Partition"),
            Self::Fat16 => f.write_str("DOS 16-bit FAT (>32MB)"),
            Self::Hpfs => f.write_str("OS/2 HPFS"),
            Self::Ntfs => f.write_str("Windows NTFS"),
            Self::LinuxSwap => f.write_str("Linux Swap"),
            Self::Linux => f.write_str("Linux EXT2"),
            Self::Unknown(raw) => write!(f, "Unknown type {raw:x}"),
        }
    }
}

impl PartEntry {
    pub fn from_bytes(raw: &[u8; ENTRY_SIZE]) -> Self {
        // 全部字段都是整数，任何位模式都合法
        unsafe { ptr::read_unaligned(raw.as_ptr().cast()) }
    }

    pub const fn is_bootable(&self) -> bool {
        self.boot_flag == BOOTABLE
    }

    pub fn system_id(&self) -> SystemId {
        self.system_id.into()
    }

    pub const fn start_chs(&self) -> Chs {
        self.start
    }

    pub const fn end_chs(&self) -> Chs {
        self.end
    }

    pub const fn relative_start(&self) -> SectorId {
        SectorId::new(u32::from_le(self.relative_start))
    }

    pub const fn total_sectors(&self) -> u32 {
        u32::from_le(self.total_sectors)
    }
}

/// fdisk 风格的描述，不含表项序号
impl fmt::Display for PartEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let system_id = self.system_id();
        writeln!(f, "  {system_id}")?;
        if system_id == SystemId::Unused {
            return Ok(());
        }
        writeln!(
            f,
            "  LBA Start {}, for {} sectors",
            self.relative_start(),
            self.total_sectors()
        )?;
        writeln!(f, "  Starting Cyl/Head/Sect: {}", self.start_chs())?;
        writeln!(f, "  Ending Cyl/Head/Sect: {}", self.end_chs())
    }
}

/// 解析 0 号扇区中的四个表项
pub fn entries(sector: &SectorData) -> [PartEntry; ENTRY_COUNT] {
    core::array::from_fn(|i| {
        let offset = TABLE_OFFSET + i * ENTRY_SIZE;
        let mut raw = [0; ENTRY_SIZE];
        raw.copy_from_slice(&sector[offset..offset + ENTRY_SIZE]);
        PartEntry::from_bytes(&raw)
    })
}

pub fn has_signature(sector: &SectorData) -> bool {
    sector[TABLE_OFFSET + ENTRY_COUNT * ENTRY_SIZE..] == SIGNATURE
}
