mod cli;
mod image;
mod sched;

use std::io;
use std::sync::Arc;

use block_dev::{DeviceId, SECTOR_SIZE, SectorId};
use clap::Parser;
use storage::part::mbr;
use storage::{NoJournal, Storage};

use self::cli::{Cli, Command};
use self::image::ImageDisk;
use self::sched::IdleScheduler;

fn main() -> io::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    log::info!("disk0={:?} disk1={:?}", cli.disk0, cli.disk1);

    let boot_dev = DeviceId::new(cli.boot_dev);
    if boot_dev.raw() > 1 || (boot_dev != DeviceId::new(0) && cli.disk1.is_none()) {
        return Err(no_disk(boot_dev));
    }

    let disk = Arc::new(ImageDisk::open(&cli.disk0, cli.disk1.as_deref())?);
    let sched = Arc::new(IdleScheduler::new(disk.clone()));
    let storage = Storage::new(disk, sched.clone(), Arc::new(NoJournal), boot_dev)
        .map_err(io::Error::other)?;
    sched.attach(storage.ide());

    match cli.command {
        Command::Fdisk => fdisk(&storage, boot_dev),
        Command::Dumpe2fs { partition } => dumpe2fs(&storage, partition),
        Command::Readsect { sector, dev } => {
            readsect(&storage, DeviceId::new(dev), SectorId::new(sector))
        }
    }
}

fn fdisk(storage: &Storage, boot_dev: DeviceId) -> io::Result<()> {
    let mut sector = [0; SECTOR_SIZE];
    storage
        .read_sector(boot_dev, SectorId::new(0), &mut sector)
        .map_err(io::Error::other)?;

    for (i, entry) in mbr::entries(&sector).iter().enumerate() {
        let bootable = if entry.is_bootable() { "(Bootable)" } else { "" };
        println!("Partition {i}: {bootable}");
        print!("{entry}");
    }

    Ok(())
}

fn dumpe2fs(storage: &Storage, partition: usize) -> io::Result<()> {
    if !storage.partitions().is_valid(partition) {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no valid ext2 partition {partition}"),
        ));
    }

    let sb = storage.superblock(partition).map_err(io::Error::other)?;
    print!("{sb}");
    Ok(())
}

fn readsect(storage: &Storage, dev: DeviceId, sector: SectorId) -> io::Result<()> {
    if dev.raw() > 1 || (dev != DeviceId::new(0) && !storage.ide().has_disk1()) {
        return Err(no_disk(dev));
    }

    let mut data = [0; SECTOR_SIZE];
    storage
        .read_sector(dev, sector, &mut data)
        .map_err(io::Error::other)?;

    for (row, chunk) in data.chunks(16).enumerate() {
        let hex: Vec<_> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        let text: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
            .collect();
        println!("{:04x}: {}  {text}", row * 16, hex.join(" "));
    }

    Ok(())
}

fn no_disk(dev: DeviceId) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("disk {dev} not present"))
}
