//! # 块设备接口层
//!
//! 磁盘控制器是以**扇区**为单位读写的设备，
//! [`Controller`] 是对 PIO（programmed I/O）磁盘控制器寄存器的抽象，
//! 实现了此特质的类型即可被上层的磁盘驱动使用。
//!
//! - [`Ata`]：x86 主板 IDE 通道，经端口 I/O 访问；
//! - [`RamDisk`]：在内存中模拟的控制器，供宿主机环境使用。

#![no_std]

extern crate alloc;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod ata;
mod controller;
mod ram;
mod sector;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub use self::ata::Ata;
pub use self::{
    controller::{Command, Controller, Status},
    ram::RamDisk,
    sector::{DeviceId, SectorId},
};

/// 扇区大小，磁盘寻址的最小单位
pub const SECTOR_SIZE: usize = 512;

pub type SectorData = [u8; SECTOR_SIZE];
