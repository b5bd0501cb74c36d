use std::time::Duration;

use domain::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("authentication required")]
    Unauthenticated,
    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),
    /// 不变量被破坏，正常运行时不应出现
    #[error("internal error: {0}")]
    Internal(String),
}

/// 面向调用方的错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Forbidden,
    Unauthenticated,
    DeadlineExceeded,
    Internal,
}

impl ApplicationError {
    pub fn internal(message: impl Into<String>) -> Self {
        ApplicationError::Internal(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApplicationError::Domain(err) => match err {
                DomainError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
                DomainError::DialogNotFound | DomainError::MessageNotFound => ErrorKind::NotFound,
                DomainError::NotParticipant | DomainError::InsufficientPermissions => {
                    ErrorKind::Forbidden
                }
                DomainError::InvalidStateTransition { .. } => ErrorKind::Internal,
            },
            ApplicationError::Unauthenticated => ErrorKind::Unauthenticated,
            ApplicationError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            ApplicationError::Internal(_) => ErrorKind::Internal,
        }
    }
}
