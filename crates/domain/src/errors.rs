//! 领域模型错误定义
//!
//! 所有错误都携带足够的上下文，由应用层归类为 InvalidArgument / NotFound / Forbidden 等类别。

use thiserror::Error;

use crate::entities::ConnectionState;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 输入格式错误或越界
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    #[error("dialog not found")]
    DialogNotFound,

    #[error("message not found")]
    MessageNotFound,

    /// 已认证但不是会话参与者
    #[error("user is not a participant of the dialog")]
    NotParticipant,

    /// 参与者身份不足以执行该操作（例如非 owner/admin 分配角色）
    #[error("insufficient permissions")]
    InsufficientPermissions,

    /// 连接状态机的非法迁移
    #[error("invalid connection state transition: {from:?} -> {to:?}")]
    InvalidStateTransition {
        from: ConnectionState,
        to: ConnectionState,
    },
}

impl DomainError {
    /// 创建参数错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
