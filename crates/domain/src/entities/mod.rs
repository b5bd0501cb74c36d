//! 领域实体定义
//!
//! 包含系统的核心实体：会话、消息，以及实时连接的生命周期。

pub mod connection;
pub mod dialog;
pub mod message;

// 重新导出核心实体
pub use connection::{ConnectionLifecycle, ConnectionState};
pub use dialog::{Dialog, DialogRole, DialogType};
pub use message::{Attachment, Message, MessageMetadata, MessageType};
