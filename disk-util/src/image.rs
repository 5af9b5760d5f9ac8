//! 以宿主机文件充当磁盘的控制器
//!
//! 命令立即完成；完成时若允许中断，则挂起一次中断，等调度器在空闲时取走。

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use block_dev::{Command, Controller, DeviceId, SECTOR_SIZE, SectorData, SectorId, Status};
use enumflags2::BitFlags;

#[derive(Debug)]
pub struct ImageDisk {
    inner: Mutex<ImageInner>,
}

#[derive(Debug)]
struct ImageInner {
    files: [Option<File>; 2],
    selected: usize,
    status: BitFlags<Status>,
    irq_enabled: bool,
    irq_pending: bool,
    buffer: SectorData,
    write_target: Option<(usize, SectorId)>,
}

impl ImageDisk {
    pub fn open(disk0: &Path, disk1: Option<&Path>) -> io::Result<Self> {
        let open = |path: &Path| OpenOptions::new().read(true).write(true).open(path);
        let files = [Some(open(disk0)?), disk1.map(open).transpose()?];

        Ok(Self {
            inner: Mutex::new(ImageInner {
                files,
                selected: 0,
                status: Status::Ready.into(),
                irq_enabled: false,
                irq_pending: false,
                buffer: [0; SECTOR_SIZE],
                write_target: None,
            }),
        })
    }

    /// 取走挂起的中断
    pub fn take_interrupt(&self) -> bool {
        std::mem::take(&mut self.lock().irq_pending)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ImageInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ImageInner {
    fn file(&mut self, drive: usize) -> io::Result<&mut File> {
        self.files[drive]
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such drive"))
    }

    fn read_sector(&mut self, drive: usize, sector: SectorId) -> io::Result<()> {
        let file = self.file(drive)?;
        file.seek(SeekFrom::Start(sector.byte_offset()))?;
        let mut data = [0; SECTOR_SIZE];
        file.read_exact(&mut data)?;
        self.buffer = data;
        Ok(())
    }

    fn write_sector(
        &mut self,
        drive: usize,
        sector: SectorId,
        data: &SectorData,
    ) -> io::Result<()> {
        let file = self.file(drive)?;
        file.seek(SeekFrom::Start(sector.byte_offset()))?;
        file.write_all(data)
    }

    fn complete(&mut self, result: io::Result<()>, what: &str) {
        self.status = match result {
            Ok(()) => Status::Ready.into(),
            Err(err) => {
                log::warn!("image: {what} failed: {err}");
                Status::Ready | Status::Err
            }
        };
        if self.irq_enabled {
            self.irq_pending = true;
        }
    }
}

impl Controller for ImageDisk {
    fn status(&self) -> BitFlags<Status> {
        let inner = self.lock();
        if inner.files[inner.selected].is_some() {
            inner.status
        } else {
            BitFlags::empty()
        }
    }

    fn set_interrupt(&self, enable: bool) {
        self.lock().irq_enabled = enable;
    }

    fn select(&self, dev: DeviceId) {
        self.lock().selected = dev.drive();
    }

    fn issue(&self, cmd: Command, dev: DeviceId, sector: SectorId) {
        let mut inner = self.lock();
        let drive = dev.drive();
        inner.selected = drive;
        inner.write_target = None;

        match cmd {
            Command::Read => {
                let result = inner.read_sector(drive, sector);
                inner.complete(result, "read");
            }
            Command::Write => {
                inner.write_target = Some((drive, sector));
                inner.status = Status::Ready | Status::Drq;
            }
        }
    }

    fn read_data(&self, buf: &mut SectorData) {
        buf.copy_from_slice(&self.lock().buffer);
    }

    fn write_data(&self, buf: &SectorData) {
        let mut inner = self.lock();
        let Some((drive, sector)) = inner.write_target.take() else {
            return;
        };
        let result = inner.write_sector(drive, sector, buf);
        inner.complete(result, "write");
    }
}
