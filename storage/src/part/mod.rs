//! # 分区层
//!
//! 启动时从引导盘的 MBR 找出 EXT2 分区，校验各自的超级块，
//! 此后按 (分区号, 块号) 读写磁盘。

pub mod mbr;

use alloc::vec::Vec;
use core::ops::Range;

use block_dev::{DeviceId, SECTOR_SIZE, SectorData, SectorId};

use crate::IoError;
use crate::bio::{BufferCache, IoMode};
use crate::config::MAX_PARTS;
use crate::ext2::{self, BLOCK_GROUP_NR, FsState, SUPERBLOCK_SECTOR, SuperBlock};
use crate::journal::Journal;

use self::mbr::SystemId;

/// 主超级块与第一个备份的比对结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStatus {
    InSync,
    /// 备份的签名不对
    BadMagic,
    /// 签名对，内容不一致
    OutOfSync,
    /// 备份的位置超出分区
    OutOfRange,
    /// 读备份时控制器出错
    Unreadable,
    /// 每组块数为 0，算不出备份的位置
    BadGeometry,
}

/// 分区描述符
#[derive(Debug, Clone)]
pub struct Partition {
    dev: DeviceId,
    /// 来自 MBR 的第几个表项
    slot: usize,
    start: SectorId,
    /// 不含
    end: SectorId,
    block_size: usize,
    valid: bool,
    backup: Option<BackupStatus>,
}

impl Partition {
    /// `block_size` 须是扇区大小的整数倍
    pub fn new(
        dev: DeviceId,
        slot: usize,
        start: SectorId,
        sectors: u32,
        block_size: usize,
    ) -> Self {
        assert!(
            block_size >= SECTOR_SIZE && block_size % SECTOR_SIZE == 0,
            "partition: bad block size {block_size}"
        );
        let Some(end) = start.raw().checked_add(sectors) else {
            panic!("partition: end sector overflows");
        };
        Self {
            dev,
            slot,
            start,
            end: SectorId::new(end),
            block_size,
            valid: true,
            backup: None,
        }
    }

    #[inline]
    pub fn device(&self) -> DeviceId {
        self.dev
    }

    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    #[inline]
    pub fn start(&self) -> SectorId {
        self.start
    }

    #[inline]
    pub fn end(&self) -> SectorId {
        self.end
    }

    #[inline]
    pub fn sectors(&self) -> u32 {
        self.end.raw() - self.start.raw()
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn sectors_per_block(&self) -> usize {
        self.block_size / SECTOR_SIZE
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// 未校验（分区无效）时为 `None`
    #[inline]
    pub fn backup(&self) -> Option<BackupStatus> {
        self.backup
    }
}

#[derive(Debug, Clone, Default)]
pub struct PartitionTable {
    parts: Vec<Partition>,
}

impl PartitionTable {
    /// 扫描引导盘的分区表并校验超级块
    ///
    /// 此时中断尚未就绪，全部以轮询方式读盘。
    /// 单个分区的错误只令该分区无效，只有 MBR 读不出来才返回错误。
    pub fn scan(cache: &BufferCache, boot_dev: DeviceId) -> Result<Self, IoError> {
        let buf = cache.read_polling(boot_dev, SectorId::new(0))?;
        let (entries, signed) = buf.map(|data| (mbr::entries(data), mbr::has_signature(data)));
        cache.release(buf);
        if !signed {
            log::warn!("Disk {boot_dev}: boot sector has no 55AA signature");
        }

        let mut parts: Vec<_> = entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.system_id() == SystemId::Linux)
            .filter(|(slot, entry)| {
                let fits = entry
                    .relative_start()
                    .raw()
                    .checked_add(entry.total_sectors())
                    .is_some();
                if !fits {
                    log::warn!("Disk {boot_dev}: entry {slot} runs past the last sector");
                }
                fits
            })
            .take(MAX_PARTS)
            .map(|(slot, entry)| {
                Partition::new(
                    boot_dev,
                    slot,
                    entry.relative_start(),
                    entry.total_sectors(),
                    SECTOR_SIZE,
                )
            })
            .collect();

        for (id, part) in parts.iter_mut().enumerate() {
            check_partition(cache, id, part);
        }

        Ok(Self { parts })
    }

    pub fn from_partitions(parts: Vec<Partition>) -> Self {
        assert!(parts.len() <= MAX_PARTS, "partition: too many partitions");
        Self { parts }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.parts.iter()
    }

    #[inline]
    pub fn get(&self, id: usize) -> Option<&Partition> {
        self.parts.get(id)
    }

    pub fn is_valid(&self, id: usize) -> bool {
        self.get(id).is_some_and(Partition::is_valid)
    }

    pub fn device(&self, id: usize) -> Option<DeviceId> {
        self.usable(id).map(Partition::device)
    }

    /// 分区内第 `sector` 个扇区的绝对扇区号，超出分区时为 `None`
    pub fn offset(&self, id: usize, sector: u32) -> Option<SectorId> {
        let part = self.usable(id)?;
        part.start
            .raw()
            .checked_add(sector)
            .filter(|&abs| abs < part.end.raw())
            .map(SectorId::new)
    }

    /// 块 `block` 覆盖的绝对扇区
    ///
    /// # Panics
    ///
    /// 分区无效，或块超出分区。
    pub fn translate(&self, id: usize, block: u32) -> Range<SectorId> {
        self.span(id, block, "translate")
    }

    /// 读出一个块，`dest` 至少要有一块大
    pub fn read_block(
        &self,
        cache: &BufferCache,
        id: usize,
        block: u32,
        dest: &mut [u8],
    ) -> Result<(), IoError> {
        let part = self.expect_usable(id, "pread");
        fits(part, dest.len())?;

        let span = self.span(id, block, "pread");
        let chunks = dest.chunks_exact_mut(SECTOR_SIZE);
        for (sector, chunk) in (span.start.raw()..span.end.raw()).zip(chunks) {
            let buf = cache.read(part.dev, SectorId::new(sector))?;
            buf.map(|data| chunk.copy_from_slice(data));
            cache.release(buf);
        }

        Ok(())
    }

    /// 写入一个块，每个扇区的写盘都由一对事务钩子括起
    pub fn write_block(
        &self,
        cache: &BufferCache,
        journal: &dyn Journal,
        id: usize,
        block: u32,
        src: &[u8],
    ) -> Result<(), IoError> {
        let part = self.expect_usable(id, "pwrite");
        fits(part, src.len())?;

        let span = self.span(id, block, "pwrite");
        let chunks = src.chunks_exact(SECTOR_SIZE);
        for (sector, chunk) in (span.start.raw()..span.end.raw()).zip(chunks) {
            // 整扇区覆盖，不必先读
            let mut buf = cache.acquire(part.dev, SectorId::new(sector));
            buf.map_mut(|data: &mut SectorData| data.copy_from_slice(chunk));

            journal.begin_transaction();
            let written = cache.write(&mut buf);
            journal.commit_transaction();
            cache.release(buf);
            written?;
        }

        Ok(())
    }
}

impl PartitionTable {
    fn usable(&self, id: usize) -> Option<&Partition> {
        self.get(id).filter(|part| part.valid)
    }

    fn expect_usable(&self, id: usize, op: &str) -> &Partition {
        match self.usable(id) {
            Some(part) => part,
            None => panic!("{op}: invalid partition {id}"),
        }
    }

    fn span(&self, id: usize, block: u32, op: &str) -> Range<SectorId> {
        let part = self.expect_usable(id, op);
        let per_block = part.sectors_per_block() as u64;
        let first = u64::from(part.start.raw()) + u64::from(block) * per_block;
        let last = first + per_block;
        if last > u64::from(part.end.raw()) {
            panic!("{op}: bad sector number");
        }
        // 不超过 end，必然装得进 u32
        SectorId::new(first as u32)..SectorId::new(last as u32)
    }
}

fn fits(part: &Partition, len: usize) -> Result<(), IoError> {
    if len < part.block_size {
        return Err(IoError::BufferTooSmall {
            need: part.block_size,
            got: len,
        });
    }
    Ok(())
}

/// 校验分区 `id` 的超级块，确定块大小并与第一个备份比对
fn check_partition(cache: &BufferCache, id: usize, part: &mut Partition) {
    let dev = part.dev;

    if part.sectors() < SUPERBLOCK_SECTOR + 2 {
        log::warn!("Disk {dev}, Partition {id}: too small to hold an EXT2 superblock");
        part.valid = false;
        return;
    }

    let raw = match ext2::read_raw(cache, dev, part.start + SUPERBLOCK_SECTOR, IoMode::Poll) {
        Ok(raw) => raw,
        Err(err) => {
            log::error!("Disk {dev}, Partition {id}: cannot read superblock: {err}");
            part.valid = false;
            return;
        }
    };
    let sb = SuperBlock::from_bytes(&raw);

    if !sb.is_valid() {
        log::warn!("Disk {dev}, Partition {id}: Invalid EXT2 Superblock signature");
        part.valid = false;
        return;
    }
    let Some(block_size) = sb.block_size() else {
        log::warn!("Disk {dev}, Partition {id}: unsupported EXT2 block size");
        part.valid = false;
        return;
    };
    part.block_size = block_size;

    let state = match sb.state() {
        Ok(FsState::Clean) => "clean",
        Ok(FsState::Errors) => "dirty",
        Err(_) => "unknown state",
    };
    log::info!("Disk {dev}, Partition {id}: ext2 ({state})");
    log::info!(
        "  Free blocks: {}/{}",
        sb.free_blocks_count,
        sb.blocks_count
    );
    log::info!(
        "  Free inodes: {}/{}",
        sb.free_inodes_count,
        sb.inodes_count
    );

    let status = check_backup(cache, part, &sb, &raw);
    match status {
        BackupStatus::InSync => {}
        BackupStatus::BadMagic => log::error!("ext2 backup superblock bad magic number"),
        BackupStatus::OutOfSync => log::error!("ext2 backup superblock not in sync"),
        BackupStatus::OutOfRange => {
            log::error!("ext2 backup superblock lies outside the partition")
        }
        BackupStatus::Unreadable => log::error!("ext2 backup superblock cannot be read"),
        BackupStatus::BadGeometry => log::error!("ext2 superblock has no blocks per group"),
    }
    part.backup = Some(status);
}

/// 第一个备份位于块组 1 的首块
fn check_backup(
    cache: &BufferCache,
    part: &Partition,
    sb: &SuperBlock,
    primary: &ext2::RawSuperBlock,
) -> BackupStatus {
    if sb.blocks_per_group == 0 {
        return BackupStatus::BadGeometry;
    }
    let block = u64::from(sb.first_data_block) + u64::from(sb.blocks_per_group);
    log::debug!("Getting backup superblock at block {block}");

    let first = u64::from(part.start.raw()) + block * part.sectors_per_block() as u64;
    if first + 2 > u64::from(part.end.raw()) {
        return BackupStatus::OutOfRange;
    }

    let Ok(backup) = ext2::read_raw(cache, part.dev, SectorId::new(first as u32), IoMode::Poll)
    else {
        return BackupStatus::Unreadable;
    };
    if !SuperBlock::from_bytes(&backup).is_valid() {
        return BackupStatus::BadMagic;
    }

    // 块组号各份不同，不参与比较
    let same = primary[..BLOCK_GROUP_NR.start] == backup[..BLOCK_GROUP_NR.start]
        && primary[BLOCK_GROUP_NR.end..] == backup[BLOCK_GROUP_NR.end..];
    if same {
        BackupStatus::InSync
    } else {
        BackupStatus::OutOfSync
    }
}
