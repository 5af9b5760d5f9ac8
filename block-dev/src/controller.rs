use enumflags2::{BitFlags, bitflags};

use crate::{DeviceId, SectorData, SectorId};

/// ATA 状态寄存器（0x1F7）
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// 上一条命令出错
    Err = 0x01,
    /// 控制器等待 PIO 数据
    Drq = 0x08,
    /// 驱动器故障
    Fault = 0x20,
    /// 驱动器就绪
    Ready = 0x40,
    /// 控制器忙，其余位无意义
    Busy = 0x80,
}

/// 单扇区 PIO 命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Read = 0x20,
    Write = 0x30,
}

/// 磁盘控制器特质
///
/// 每个方法对应一组寄存器访问，不做任何等待；
/// 何时轮询状态、何时搬运数据由驱动决定。
pub trait Controller: Send + Sync {
    /// 读取当前所选驱动器的状态，驱动器不存在时为空
    fn status(&self) -> BitFlags<Status>;

    /// 命令完成时是否产生中断
    fn set_interrupt(&self, enable: bool);

    /// 选择驱动器
    fn select(&self, dev: DeviceId);

    /// 选择驱动器并对一个扇区发出命令
    fn issue(&self, cmd: Command, dev: DeviceId, sector: SectorId);

    /// 从数据端口读出一个扇区
    fn read_data(&self, buf: &mut SectorData);

    /// 向数据端口写入一个扇区
    fn write_data(&self, buf: &SectorData);
}
