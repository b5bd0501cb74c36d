//! 实时会话消息系统核心领域模型
//!
//! 包含会话、消息等核心实体，参与者访问控制，以及实时通道的事件类型。

pub mod access_control;
pub mod entities;
pub mod errors;
pub mod events;
pub mod value_objects;

// 重新导出常用类型
pub use access_control::AccessControlGuard;
pub use entities::*;
pub use errors::*;
pub use events::*;
pub use value_objects::*;
