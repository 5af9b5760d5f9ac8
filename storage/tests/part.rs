mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use block_dev::{RamDisk, SectorId};
use storage::{BackupStatus, IoError, NoJournal, Partition, PartitionTable, Storage};

use common::{CountingJournal, DISK0, DISK1, IrqLine, Rig, SbImage, StdScheduler, mbr, pattern};

const LINUX: u8 = 0x83;
const FAT32: u8 = 0x0b;

/// 按 `entries` 写好 MBR，并在每个 Linux 分区里装上 `sb`
fn disk(entries: &[(usize, u8, u32, u32)], sb: &SbImage) -> Arc<RamDisk> {
    let disk = Arc::new(RamDisk::new(512));
    disk.load(DISK0, SectorId::new(0), &mbr(entries));
    for &(_, system_id, start, _) in entries {
        if system_id == LINUX {
            sb.install(&disk, DISK0, start);
        }
    }
    disk
}

fn mount(disk: &Arc<RamDisk>, journal: Arc<CountingJournal>) -> (Storage, IrqLine) {
    common::init_logger();
    let storage = Storage::new(disk.clone(), StdScheduler::new(), journal, DISK0).unwrap();
    let irq = IrqLine::new(disk.clone(), storage.ide().clone());
    (storage, irq)
}

#[test]
fn one_sector_blocks() {
    let parts = PartitionTable::from_partitions(vec![Partition::new(
        DISK0,
        0,
        SectorId::new(100),
        50,
        512,
    )]);

    assert_eq!(SectorId::new(100)..SectorId::new(101), parts.translate(0, 0));
    assert_eq!(SectorId::new(149)..SectorId::new(150), parts.translate(0, 49));
    assert_eq!(Some(SectorId::new(102)), parts.offset(0, 2));
    assert_eq!(Some(DISK0), parts.device(0));
}

#[test]
#[should_panic(expected = "translate: bad sector number")]
fn block_past_the_end() {
    let parts = PartitionTable::from_partitions(vec![Partition::new(
        DISK0,
        0,
        SectorId::new(100),
        50,
        512,
    )]);
    let _ = parts.translate(0, 50);
}

#[test]
fn scan_finds_ext2() {
    let disk = disk(&[(0, LINUX, 100, 50)], &SbImage::default());
    let (storage, _irq) = mount(&disk, Default::default());
    let parts = storage.partitions();

    assert_eq!(1, parts.len());
    let part = parts.get(0).unwrap();
    assert!(part.is_valid());
    assert_eq!(0, part.slot());
    assert_eq!(SectorId::new(100), part.start());
    assert_eq!(SectorId::new(150), part.end());
    assert_eq!(1024, part.block_size());
    assert_eq!(Some(BackupStatus::InSync), part.backup());

    assert_eq!(SectorId::new(100)..SectorId::new(102), parts.translate(0, 0));
    assert_eq!(SectorId::new(148)..SectorId::new(150), parts.translate(0, 24));
}

#[test]
fn each_entry_gets_its_own_descriptor() {
    let disk = disk(
        &[(0, LINUX, 100, 50), (1, FAT32, 150, 50), (2, LINUX, 200, 60)],
        &SbImage::default(),
    );
    let (storage, _irq) = mount(&disk, Default::default());
    let parts = storage.partitions();

    assert_eq!(2, parts.len());
    assert_eq!(0, parts.get(0).unwrap().slot());
    assert_eq!(2, parts.get(1).unwrap().slot());
    assert_eq!(Some(SectorId::new(200)), parts.offset(1, 0));
    assert_eq!(SectorId::new(260), parts.get(1).unwrap().end());
}

#[test]
fn bad_magic_invalidates_only_its_partition() {
    let disk = disk(&[(0, LINUX, 100, 50), (2, LINUX, 200, 50)], &SbImage::default());
    let broken = SbImage {
        magic: 0,
        ..Default::default()
    };
    disk.load(DISK0, SectorId::new(102), &broken.bytes());

    let (storage, _irq) = mount(&disk, Default::default());
    let parts = storage.partitions();

    assert!(!parts.is_valid(0));
    assert_eq!(None, parts.device(0));
    assert_eq!(None, parts.offset(0, 0));
    assert_eq!(None, parts.get(0).unwrap().backup());
    assert!(parts.is_valid(1));

    disk.load(DISK0, SectorId::new(204), &pattern(0x24));
    disk.load(DISK0, SectorId::new(205), &pattern(0x25));
    let mut block = [0; 1024];
    storage.read_block(1, 2, &mut block).unwrap();
    assert_eq!(pattern(0x24), block[..512]);
    assert_eq!(pattern(0x25), block[512..]);
}

#[test]
fn backup_out_of_sync() {
    let sb = SbImage::default();
    let disk = disk(&[(0, LINUX, 100, 50)], &sb);
    let stale = SbImage {
        free_blocks_count: sb.free_blocks_count + 1,
        block_group_nr: 1,
        ..sb
    };
    disk.load(DISK0, SectorId::new(sb.backup_sector(100)), &stale.bytes());

    let (storage, _irq) = mount(&disk, Default::default());
    let part = storage.partitions().get(0).unwrap();
    assert!(part.is_valid());
    assert_eq!(Some(BackupStatus::OutOfSync), part.backup());
}

#[test]
fn backup_bad_magic() {
    let sb = SbImage::default();
    let disk = disk(&[(0, LINUX, 100, 50)], &sb);
    disk.load(DISK0, SectorId::new(sb.backup_sector(100)), &[0; 1024]);

    let (storage, _irq) = mount(&disk, Default::default());
    let part = storage.partitions().get(0).unwrap();
    assert!(part.is_valid());
    assert_eq!(Some(BackupStatus::BadMagic), part.backup());
}

#[test]
fn backup_out_of_range() {
    let sb = SbImage {
        blocks_per_group: 8192,
        ..Default::default()
    };
    let disk = disk(&[(0, LINUX, 100, 50)], &SbImage::default());
    disk.load(DISK0, SectorId::new(102), &sb.bytes());

    let (storage, _irq) = mount(&disk, Default::default());
    let part = storage.partitions().get(0).unwrap();
    assert!(part.is_valid());
    assert_eq!(Some(BackupStatus::OutOfRange), part.backup());
}

#[test]
fn block_round_trip() {
    let disk = disk(&[(0, LINUX, 100, 50)], &SbImage::default());
    let journal = Arc::new(CountingJournal::default());
    let (storage, _irq) = mount(&disk, journal.clone());

    let src: Vec<u8> = (0..1024).map(|i| (i % 251) as u8).collect();
    storage.write_block(0, 3, &src).unwrap();
    assert_eq!(2, journal.begins.load(Ordering::SeqCst));
    assert_eq!(2, journal.commits.load(Ordering::SeqCst));
    assert_eq!(src[..512], disk.sector(DISK0, SectorId::new(106)));
    assert_eq!(src[512..], disk.sector(DISK0, SectorId::new(107)));

    // 更大的缓冲区也行，只用前一块
    let mut dest = vec![0; 1500];
    storage.read_block(0, 3, &mut dest).unwrap();
    assert_eq!(src, dest[..1024]);
}

#[test]
fn small_buffer_is_rejected() {
    let disk = disk(&[(0, LINUX, 100, 50)], &SbImage::default());
    let (storage, _irq) = mount(&disk, Default::default());

    let mut dest = [0; 512];
    assert_eq!(
        Err(IoError::BufferTooSmall {
            need: 1024,
            got: 512
        }),
        storage.read_block(0, 0, &mut dest)
    );
    assert_eq!(
        Err(IoError::BufferTooSmall {
            need: 1024,
            got: 512
        }),
        storage.write_block(0, 0, &dest)
    );
}

#[test]
#[should_panic(expected = "pread: invalid partition 3")]
fn invalid_partition_is_fatal() {
    let disk = disk(&[(0, LINUX, 100, 50)], &SbImage::default());
    let (storage, _irq) = mount(&disk, Default::default());

    let mut dest = [0; 1024];
    let _ = storage.read_block(3, 0, &mut dest);
}

#[test]
#[should_panic(expected = "pwrite: bad sector number")]
fn write_past_the_end_is_fatal() {
    let disk = disk(&[(0, LINUX, 100, 50)], &SbImage::default());
    let (storage, _irq) = mount(&disk, Default::default());
    let _ = storage.write_block(0, 25, &[0; 1024]);
}

#[test]
fn scan_without_partitions() {
    let rig = Rig::new(4, 8);
    let parts = PartitionTable::scan(&rig.cache, DISK0).unwrap();
    assert!(parts.is_empty());
    assert!(!parts.is_valid(0));
}

#[test]
fn offset_stays_inside_partition() {
    let parts = PartitionTable::from_partitions(vec![Partition::new(
        DISK0,
        0,
        SectorId::new(100),
        50,
        512,
    )]);

    assert_eq!(Some(SectorId::new(149)), parts.offset(0, 49));
    assert_eq!(None, parts.offset(0, 50));
    assert_eq!(None, parts.offset(0, 1000));
    assert_eq!(None, parts.offset(0, u32::MAX));
    assert_eq!(None, parts.offset(1, 0));
}

#[test]
fn zero_blocks_per_group_fails_backup_check() {
    let disk = disk(&[(0, LINUX, 100, 50)], &SbImage::default());
    let corrupt = SbImage {
        blocks_per_group: 0,
        ..Default::default()
    };
    disk.load(DISK0, SectorId::new(102), &corrupt.bytes());

    let (storage, _irq) = mount(&disk, Default::default());
    let part = storage.partitions().get(0).unwrap();
    assert!(part.is_valid());
    assert_eq!(Some(BackupStatus::BadGeometry), part.backup());
}

#[test]
fn init_scans_the_boot_disk() {
    common::init_logger();
    let disk = Arc::new(RamDisk::new(8).with_slave(512));
    disk.load(DISK1, SectorId::new(0), &mbr(&[(1, LINUX, 100, 50)]));
    SbImage::default().install(&disk, DISK1, 100);

    let storage = Storage::init(disk.clone(), StdScheduler::new(), Arc::new(NoJournal)).unwrap();
    let _irq = IrqLine::new(disk, storage.ide().clone());
    let parts = storage.partitions();

    assert_eq!(1, parts.len());
    assert_eq!(Some(DISK1), parts.device(0));
    assert_eq!(1, parts.get(0).unwrap().slot());
    assert_eq!(Some(BackupStatus::InSync), parts.get(0).unwrap().backup());
    assert_eq!(25, storage.superblock(0).unwrap().blocks_count);
}
