//! 事务钩子
//!
//! 分区层的每次块写入都由一对 begin/commit 括起，
//! 日志层据此决定何时把缓冲区真正落盘。

pub trait Journal: Send + Sync {
    fn begin_transaction(&self);
    fn commit_transaction(&self);
}

/// 不记日志，钩子什么也不做
#[derive(Debug, Default, Clone, Copy)]
pub struct NoJournal;

impl Journal for NoJournal {
    fn begin_transaction(&self) {}
    fn commit_transaction(&self) {}
}
