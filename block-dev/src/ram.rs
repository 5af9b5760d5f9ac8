//! 内存模拟的磁盘控制器
//!
//! 命令在发出的瞬间完成：读命令把扇区装入数据缓冲，写命令在数据写入后落盘。
//! 完成时若允许中断，则挂起一次中断，由使用者取走并转交驱动的中断处理例程。

use alloc::vec;
use alloc::vec::Vec;

use enumflags2::BitFlags;
use spin::Mutex;

use crate::{Command, Controller, DeviceId, SECTOR_SIZE, SectorData, SectorId, Status};

#[derive(Debug)]
pub struct RamDisk {
    inner: Mutex<RamInner>,
}

#[derive(Debug)]
struct RamInner {
    /// 主从两个驱动器的全部内容
    drives: [Option<Vec<u8>>; 2],
    selected: usize,
    status: BitFlags<Status>,
    irq_enabled: bool,
    irq_pending: bool,
    /// 数据端口背后的扇区缓冲
    buffer: SectorData,
    /// 已发出写命令、等待数据的扇区
    write_target: Option<(usize, SectorId)>,
    /// 接下来若干条命令以出错告终
    faults: usize,
    /// 已发出的命令
    log: Vec<(Command, DeviceId, SectorId)>,
}

impl RamDisk {
    /// 只有主盘的控制器
    pub fn new(sectors: usize) -> Self {
        Self {
            inner: Mutex::new(RamInner {
                drives: [Some(vec![0; sectors * SECTOR_SIZE]), None],
                selected: 0,
                status: Status::Ready.into(),
                irq_enabled: true,
                irq_pending: false,
                buffer: [0; SECTOR_SIZE],
                write_target: None,
                faults: 0,
                log: Vec::new(),
            }),
        }
    }

    /// 挂上从盘
    pub fn with_slave(self, sectors: usize) -> Self {
        self.inner.lock().drives[1] = Some(vec![0; sectors * SECTOR_SIZE]);
        self
    }

    /// 从 `sector` 起直接写入磁盘内容，不经过命令
    pub fn load(&self, dev: DeviceId, sector: SectorId, bytes: &[u8]) {
        let mut inner = self.inner.lock();
        let drive = inner.drives[dev.drive()]
            .as_mut()
            .expect("loading into a missing drive");
        let offset = sector.byte_offset() as usize;
        drive[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// 直接读出一个扇区的内容，不经过命令
    pub fn sector(&self, dev: DeviceId, sector: SectorId) -> SectorData {
        let inner = self.inner.lock();
        let drive = inner.drives[dev.drive()]
            .as_ref()
            .expect("reading from a missing drive");
        let offset = sector.byte_offset() as usize;
        let mut data = [0; SECTOR_SIZE];
        data.copy_from_slice(&drive[offset..offset + SECTOR_SIZE]);
        data
    }

    /// 让接下来的 `count` 条命令以出错告终
    pub fn inject_faults(&self, count: usize) {
        self.inner.lock().faults = count;
    }

    /// 取走挂起的中断
    pub fn take_interrupt(&self) -> bool {
        core::mem::take(&mut self.inner.lock().irq_pending)
    }

    /// 按发出先后排列的全部命令
    pub fn commands(&self) -> Vec<(Command, DeviceId, SectorId)> {
        self.inner.lock().log.clone()
    }
}

impl RamInner {
    fn raise(&mut self) {
        if self.irq_enabled {
            self.irq_pending = true;
        }
    }

    fn range(&self, drive: usize, sector: SectorId) -> Option<core::ops::Range<usize>> {
        let len = self.drives[drive].as_ref()?.len();
        let offset = usize::try_from(sector.byte_offset()).ok()?;
        (offset + SECTOR_SIZE <= len).then_some(offset..offset + SECTOR_SIZE)
    }
}

impl Controller for RamDisk {
    fn status(&self) -> BitFlags<Status> {
        let inner = self.inner.lock();
        if inner.drives[inner.selected].is_some() {
            inner.status
        } else {
            BitFlags::empty()
        }
    }

    fn set_interrupt(&self, enable: bool) {
        self.inner.lock().irq_enabled = enable;
    }

    fn select(&self, dev: DeviceId) {
        self.inner.lock().selected = dev.drive();
    }

    fn issue(&self, cmd: Command, dev: DeviceId, sector: SectorId) {
        let mut inner = self.inner.lock();
        let drive = dev.drive();
        inner.selected = drive;
        inner.log.push((cmd, dev, sector));
        inner.write_target = None;

        let range = match inner.range(drive, sector) {
            Some(range) if inner.faults == 0 => range,
            _ => {
                inner.faults = inner.faults.saturating_sub(1);
                log::debug!("ramdisk: {cmd:?} of sector {sector} on drive {drive} fails");
                inner.status = Status::Ready | Status::Err;
                inner.raise();
                return;
            }
        };

        match cmd {
            Command::Read => {
                let mut data = [0; SECTOR_SIZE];
                if let Some(disk) = inner.drives[drive].as_ref() {
                    data.copy_from_slice(&disk[range]);
                }
                inner.buffer = data;
                inner.status = Status::Ready.into();
                inner.raise();
            }
            Command::Write => {
                inner.write_target = Some((drive, sector));
                inner.status = Status::Ready | Status::Drq;
            }
        }
    }

    fn read_data(&self, buf: &mut SectorData) {
        buf.copy_from_slice(&self.inner.lock().buffer);
    }

    fn write_data(&self, buf: &SectorData) {
        let mut inner = self.inner.lock();
        let Some((drive, sector)) = inner.write_target.take() else {
            return;
        };
        if let Some(range) = inner.range(drive, sector) {
            if let Some(disk) = inner.drives[drive].as_mut() {
                disk[range].copy_from_slice(buf);
            }
        }
        inner.status = Status::Ready.into();
        inner.raise();
    }
}
