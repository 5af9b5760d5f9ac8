//! Constants used by the storage stack

use block_dev::DeviceId;

/// 缓冲区池的大小，初始化后不再增减
pub const NBUF: usize = 30;

/// 最多识别的分区数，MBR 只有四个主分区表项
pub const MAX_PARTS: usize = 4;

/// 分区表所在的磁盘，主盘存放引导映像
pub const BOOT_DEV: DeviceId = DeviceId::new(1);
