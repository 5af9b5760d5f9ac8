//! 主 IDE 通道（0x1F0–0x1F7, 0x3F6）的端口 I/O 控制器

use core::arch::asm;

use enumflags2::BitFlags;

use crate::{Command, Controller, DeviceId, SectorData, SectorId, Status};

const DATA: u16 = 0x1f0;
const SECTOR_COUNT: u16 = 0x1f2;
const LBA_LOW: u16 = 0x1f3;
const LBA_MID: u16 = 0x1f4;
const LBA_HIGH: u16 = 0x1f5;
const DRIVE_HEAD: u16 = 0x1f6;
/// 读为状态，写为命令
const COMMAND: u16 = 0x1f7;
/// 设备控制寄存器，bit 1 为 nIEN
const CONTROL: u16 = 0x3f6;

/// LBA 寻址，bit 4 选择主从
const DRIVE_LBA: u8 = 0xe0;

#[derive(Debug)]
pub struct Ata {
    _private: (),
}

impl Ata {
    /// # Safety
    ///
    /// 主 IDE 通道的端口必须存在，且只能由返回值访问。
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl Controller for Ata {
    fn status(&self) -> BitFlags<Status> {
        BitFlags::from_bits_truncate(unsafe { inb(COMMAND) })
    }

    fn set_interrupt(&self, enable: bool) {
        let nien = if enable { 0 } else { 1 << 1 };
        unsafe { outb(CONTROL, nien) };
    }

    fn select(&self, dev: DeviceId) {
        unsafe { outb(DRIVE_HEAD, DRIVE_LBA | ((dev.drive() as u8) << 4)) };
    }

    fn issue(&self, cmd: Command, dev: DeviceId, sector: SectorId) {
        let [low, mid, high, drive_head] = lba28(dev, sector);
        unsafe {
            outb(SECTOR_COUNT, 1);
            outb(LBA_LOW, low);
            outb(LBA_MID, mid);
            outb(LBA_HIGH, high);
            outb(DRIVE_HEAD, drive_head);
            outb(COMMAND, cmd as u8);
        }
    }

    fn read_data(&self, buf: &mut SectorData) {
        for word in buf.chunks_exact_mut(4) {
            word.copy_from_slice(&unsafe { inl(DATA) }.to_le_bytes());
        }
    }

    fn write_data(&self, buf: &SectorData) {
        for word in buf.chunks_exact(4) {
            let value = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            unsafe { outl(DATA, value) };
        }
    }
}

/// LBA28 地址拆成 [LBA_LOW, LBA_MID, LBA_HIGH, DRIVE_HEAD] 四个寄存器的值，
/// 第 24–27 位放在 DRIVE_HEAD 的低 4 位
fn lba28(dev: DeviceId, sector: SectorId) -> [u8; 4] {
    let [low, mid, high, top] = sector.raw().to_le_bytes();
    [
        low,
        mid,
        high,
        DRIVE_LBA | ((dev.drive() as u8) << 4) | (top & 0x0f),
    ]
}

unsafe fn inb(port: u16) -> u8 {
    let value: u8;
    unsafe {
        asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags));
    }
    value
}

unsafe fn outb(port: u16, value: u8) {
    unsafe {
        asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags));
    }
}

unsafe fn inl(port: u16) -> u32 {
    let value: u32;
    unsafe {
        asm!("in eax, dx", out("eax") value, in("dx") port, options(nomem, nostack, preserves_flags));
    }
    value
}

unsafe fn outl(port: u16, value: u32) {
    unsafe {
        asm!("out dx, eax", in("dx") port, in("eax") value, options(nomem, nostack, preserves_flags));
    }
}
