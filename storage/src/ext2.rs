//! # EXT2 超级块
//!
//! 超级块位于分区起点之后 1024 字节处，占两个扇区。
//! 这里只把它整个读出来，不解释块组与索引节点。

use core::fmt;
use core::mem;
use core::ptr;

use block_dev::{DeviceId, SECTOR_SIZE, SectorId};

use crate::IoError;
use crate::bio::{BufferCache, IoMode};
use crate::part::PartitionTable;

#[cfg(not(target_endian = "little"))]
compile_error!("on-disk EXT2 structures are read in place and assume a little-endian target");

pub const MAGIC: u16 = 0xef53;

/// 超级块的字节数
pub const SUPERBLOCK_SIZE: usize = 1024;

/// 超级块相对分区起点的扇区号
pub const SUPERBLOCK_SECTOR: u32 = (SUPERBLOCK_SIZE / SECTOR_SIZE) as u32;

/// 第 0 版固定的首个可用索引节点与索引节点大小
pub const GOOD_OLD_FIRST_INO: u32 = 11;
pub const GOOD_OLD_INODE_SIZE: u16 = 128;

/// 支持的最大块大小：1024 << 6 = 64K
const MAX_LOG_BLOCK_SIZE: u32 = 6;

pub type RawSuperBlock = [u8; SUPERBLOCK_SIZE];

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct SuperBlock {
    /// 索引节点总数，含已用与未用
    pub inodes_count: u32,
    /// 块总数，含已用、未用与保留
    pub blocks_count: u32,
    pub r_blocks_count: u32,
    pub free_blocks_count: u32,
    pub free_inodes_count: u32,
    /// 超级块所在的块号，块大于 1K 时为 0
    pub first_data_block: u32,
    /// 块大小：1024 << log_block_size
    log_block_size: u32,
    /// 片段大小：1024 << log_frag_size
    log_frag_size: u32,
    pub blocks_per_group: u32,
    pub frags_per_group: u32,
    pub inodes_per_group: u32,
    /// 最近一次挂载的 POSIX 时间
    pub mtime: u32,
    /// 最近一次写入的 POSIX 时间
    pub wtime: u32,
    /// 自上次完整检查以来的挂载次数
    pub mnt_count: u16,
    pub max_mnt_count: u16,
    magic: u16,
    state: u16,
    errors: u16,
    pub minor_rev_level: u16,
    pub lastcheck: u32,
    pub checkinterval: u32,
    creator_os: u32,
    rev_level: u32,
    /// 保留块的默认属主
    pub def_resuid: u16,
    pub def_resgid: u16,

    /*
     * 以下字段仅第 1 版有意义
     */
    first_ino: u32,
    inode_size: u16,
    /// 备份超级块所在的块组号
    pub block_group_nr: u16,
    pub feature_compat: u32,
    pub feature_incompat: u32,
    pub feature_ro_compat: u32,
    pub uuid: [u8; 16],
    volume_name: [u8; 16],
    /// 最近一次挂载的路径
    pub last_mounted: [u8; 64],
    pub algo_bitmap: u32,
    pub prealloc_blocks: u8,
    pub prealloc_dir_blocks: u8,
    _alignment: u16,
    pub journal_uuid: [u8; 16],
    pub journal_inum: u32,
    pub journal_dev: u32,
    pub last_orphan: u32,
    pub hash_seed: [u32; 4],
    pub def_hash_version: u8,
    _padding: [u8; 3],
    pub default_mount_options: u32,
    pub first_meta_bg: u32,
    _unused: [u8; 760],
}

const _: () = assert!(mem::size_of::<SuperBlock>() == SUPERBLOCK_SIZE);

/// `block_group_nr` 在超级块中的字节范围，各备份在此处互不相同
pub const BLOCK_GROUP_NR: core::ops::Range<usize> = 90..92;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FsState {
    /// 正常卸载
    Clean = 1,
    /// 检测到错误
    Errors = 2,
}

/// 检测到错误时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorPolicy {
    Continue = 1,
    RemountRo = 2,
    Panic = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CreatorOs {
    Linux = 0,
    Hurd = 1,
    Masix = 2,
    FreeBsd = 3,
    Lites = 4,
    Century = 100,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Revision {
    /// 第 0 版
    GoodOld = 0,
    /// 第 1 版，索引节点大小可变
    Dynamic = 1,
}

impl TryFrom<u16> for FsState {
    type Error = u16;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        match raw {
            1 => Ok(Self::Clean),
            2 => Ok(Self::Errors),
            raw => Err(raw),
        }
    }
}

impl TryFrom<u16> for ErrorPolicy {
    type Error = u16;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        match raw {
            1 => Ok(Self::Continue),
            2 => Ok(Self::RemountRo),
            3 => Ok(Self::Panic),
            raw => Err(raw),
        }
    }
}

impl TryFrom<u32> for CreatorOs {
    type Error = u32;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Linux),
            1 => Ok(Self::Hurd),
            2 => Ok(Self::Masix),
            3 => Ok(Self::FreeBsd),
            4 => Ok(Self::Lites),
            100 => Ok(Self::Century),
            raw => Err(raw),
        }
    }
}

impl TryFrom<u32> for Revision {
    type Error = u32;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::GoodOld),
            1 => Ok(Self::Dynamic),
            raw => Err(raw),
        }
    }
}

impl SuperBlock {
    pub fn from_bytes(raw: &RawSuperBlock) -> Self {
        // 全部字段都是整数，任何位模式都合法
        unsafe { ptr::read_unaligned(raw.as_ptr().cast()) }
    }

    #[inline]
    pub fn magic(&self) -> u16 {
        self.magic
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    pub fn state(&self) -> Result<FsState, u16> {
        self.state.try_into()
    }

    pub fn errors(&self) -> Result<ErrorPolicy, u16> {
        self.errors.try_into()
    }

    pub fn creator_os(&self) -> Result<CreatorOs, u32> {
        self.creator_os.try_into()
    }

    pub fn revision(&self) -> Result<Revision, u32> {
        self.rev_level.try_into()
    }

    #[inline]
    pub fn rev_level(&self) -> u32 {
        self.rev_level
    }

    /// 块字节数，指数超过 64K 时为 `None`
    pub fn block_size(&self) -> Option<usize> {
        scaled(self.log_block_size)
    }

    pub fn fragment_size(&self) -> Option<usize> {
        scaled(self.log_frag_size)
    }

    /// 第 0 版没有扩展字段，取固定值
    pub fn first_inode(&self) -> u32 {
        if self.rev_level == Revision::GoodOld as u32 {
            GOOD_OLD_FIRST_INO
        } else {
            self.first_ino
        }
    }

    pub fn inode_size(&self) -> u16 {
        if self.rev_level == Revision::GoodOld as u32 {
            GOOD_OLD_INODE_SIZE
        } else {
            self.inode_size
        }
    }

    /// 卷名，第 0 版或未设置时为 `None`
    pub fn volume_name(&self) -> Option<&str> {
        if self.rev_level == Revision::GoodOld as u32 {
            return None;
        }
        let len = self
            .volume_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.volume_name.len());
        core::str::from_utf8(&self.volume_name[..len])
            .ok()
            .filter(|name| !name.is_empty())
    }
}

fn scaled(log: u32) -> Option<usize> {
    (log <= MAX_LOG_BLOCK_SIZE).then(|| 1024 << log)
}

/// dumpe2fs 风格的清单
impl fmt::Display for SuperBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let not_impl = "<not implemented>";

        writeln!(
            f,
            "Filesystem volume name:   {}",
            self.volume_name().unwrap_or("<none>")
        )?;
        writeln!(f, "Last mounted on:          {not_impl}")?;
        writeln!(f, "Filesystem UUID:          {not_impl}")?;
        writeln!(f, "Filesystem magic number:  {:#x}", self.magic)?;
        write!(f, "Filesystem revision #:    {} ", self.rev_level)?;
        match self.revision() {
            Ok(Revision::GoodOld) => writeln!(f, "(good old rev 0)")?,
            Ok(Revision::Dynamic) => writeln!(f, "(dynamic)")?,
            Err(_) => writeln!(f, "(unknown)")?,
        }
        writeln!(f, "Filesystem features:      {not_impl}")?;
        writeln!(f, "Default mount options:    {not_impl}")?;
        match self.state() {
            Ok(FsState::Clean) => writeln!(f, "Filesystem state:         clean")?,
            Ok(FsState::Errors) => writeln!(f, "Filesystem state:         dirty")?,
            Err(raw) => writeln!(f, "Filesystem state:         unknown ({raw})")?,
        }
        match self.errors() {
            Ok(ErrorPolicy::Continue) => writeln!(f, "Errors behavior:          continue")?,
            Ok(ErrorPolicy::RemountRo) => writeln!(f, "Errors behavior:          remount ro")?,
            Ok(ErrorPolicy::Panic) => writeln!(f, "Errors behavior:          panic")?,
            Err(raw) => writeln!(f, "Errors behavior:          unknown ({raw})")?,
        }
        let os = match self.creator_os() {
            Ok(CreatorOs::Linux) => "Linux",
            Ok(CreatorOs::Hurd) => "Hurd",
            Ok(CreatorOs::Masix) => "Masix",
            Ok(CreatorOs::FreeBsd) => "FreeBSD",
            Ok(CreatorOs::Lites) => "Lites",
            Ok(CreatorOs::Century) => "CenturyOS",
            Err(_) => "unknown",
        };
        writeln!(f, "Filesystem OS type:       {os}")?;
        writeln!(f, "Inode count:              {}", self.inodes_count)?;
        writeln!(f, "Block count:              {}", self.blocks_count)?;
        writeln!(f, "Reserved block count:     {}", self.r_blocks_count)?;
        writeln!(f, "Free blocks:              {}", self.free_blocks_count)?;
        writeln!(f, "Free inodes:              {}", self.free_inodes_count)?;
        writeln!(f, "First block:              {}", self.first_data_block)?;
        match self.block_size() {
            Some(size) => writeln!(f, "Block size:               {size}")?,
            None => writeln!(f, "Block size:               invalid")?,
        }
        match self.fragment_size() {
            Some(size) => writeln!(f, "Fragment size:            {size}")?,
            None => writeln!(f, "Fragment size:            invalid")?,
        }
        writeln!(f, "Blocks per group:         {}", self.blocks_per_group)?;
        writeln!(f, "Fragments per group:      {}", self.frags_per_group)?;
        writeln!(f, "Inodes per group:         {}", self.inodes_per_group)?;
        writeln!(f, "Filesystem created:       {not_impl}")?;
        writeln!(f, "Last mount time:          {not_impl}")?;
        writeln!(f, "Last write time:          {not_impl}")?;
        writeln!(f, "Mount count:              {}", self.mnt_count)?;
        writeln!(f, "Maximum mount count:      {}", self.max_mnt_count)?;
        writeln!(f, "Last checked:             {not_impl}")?;
        writeln!(f, "Check interval:           {}", self.checkinterval)?;
        writeln!(f, "Next check after:         {not_impl}")?;
        writeln!(f, "Reserved blocks uid:      {}", self.def_resuid)?;
        writeln!(f, "Reserved blocks gid:      {}", self.def_resgid)?;
        writeln!(f, "First inode:              {}", self.first_inode())?;
        writeln!(f, "Inode size:               {}", self.inode_size())?;
        writeln!(f, "Journal inode:            {}", self.journal_inum)?;
        writeln!(f, "Default directory hash:   {not_impl}")?;
        writeln!(f, "Directory hash seed:      {not_impl}")?;
        writeln!(f, "Journal backup:           {not_impl}")
    }
}

/// 读出 `first` 起连续两个扇区，拼成一个超级块映像
pub(crate) fn read_raw(
    cache: &BufferCache,
    dev: DeviceId,
    first: SectorId,
    mode: IoMode,
) -> Result<RawSuperBlock, IoError> {
    let mut raw = [0; SUPERBLOCK_SIZE];
    for (i, chunk) in raw.chunks_exact_mut(SECTOR_SIZE).enumerate() {
        let buf = cache.read_with(dev, first + i as u32, mode)?;
        buf.map(|data| chunk.copy_from_slice(data));
        cache.release(buf);
    }
    Ok(raw)
}

/// 读出分区 `id` 的超级块快照，底层缓冲区随即归还
pub fn read_superblock(
    cache: &BufferCache,
    parts: &PartitionTable,
    id: usize,
) -> Result<SuperBlock, IoError> {
    let (Some(dev), Some(first), Some(_)) = (
        parts.device(id),
        parts.offset(id, SUPERBLOCK_SECTOR),
        parts.offset(id, SUPERBLOCK_SECTOR + 1),
    ) else {
        panic!("ext2readsb: invalid partition");
    };
    let raw = read_raw(cache, dev, first, IoMode::Interrupt)?;
    Ok(SuperBlock::from_bytes(&raw))
}
