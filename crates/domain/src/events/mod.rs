//! 实时事件定义
//!
//! 通过实时通道推送或接收的事件类型。

pub mod live_event;

// 重新导出事件类型
pub use live_event::*;
