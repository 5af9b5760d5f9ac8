use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    /// 控制器报告出错（ERR 或 DF）
    Device,
    /// 调用者的缓冲区装不下一个块
    BufferTooSmall { need: usize, got: usize },
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device => f.write_str("disk controller reported an error"),
            Self::BufferTooSmall { need, got } => {
                write!(f, "buffer of {got} bytes cannot hold a {need}-byte block")
            }
        }
    }
}

impl core::error::Error for IoError {}
