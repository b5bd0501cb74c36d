//! 实时连接的生命周期
//!
//! `Connecting -> Open -> Closing -> Closed`，不允许从 `Closed` 回到 `Open`；
//! 重连会创建新的连接（新的 `ConnectionId`）。

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{ConnectionId, UserId};

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// 握手中
    Connecting,
    /// 已建立
    Open,
    /// 读写失败或主动关闭，等待清理
    Closing,
    /// 已从注册表移除
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Open) | (Connecting, Closing) | (Open, Closing) | (Closing, Closed)
        )
    }
}

/// 单个连接的状态机
#[derive(Debug, Clone)]
pub struct ConnectionLifecycle {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    state: ConnectionState,
}

impl ConnectionLifecycle {
    pub fn new(user_id: UserId) -> Self {
        Self {
            connection_id: ConnectionId::generate(),
            user_id,
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn transition(&mut self, next: ConnectionState) -> Result<(), DomainError> {
        if !self.state.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// 进入 Closing；已经在 Closing/Closed 时为空操作
    pub fn begin_close(&mut self) {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            self.state = ConnectionState::Closing;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn happy_path() {
        let mut lifecycle = ConnectionLifecycle::new(UserId::from(Uuid::new_v4()));
        assert_eq!(lifecycle.state(), ConnectionState::Connecting);
        lifecycle.transition(ConnectionState::Open).unwrap();
        lifecycle.transition(ConnectionState::Closing).unwrap();
        lifecycle.transition(ConnectionState::Closed).unwrap();
        assert_eq!(lifecycle.state(), ConnectionState::Closed);
    }

    #[test]
    fn closed_never_reopens() {
        let mut lifecycle = ConnectionLifecycle::new(UserId::from(Uuid::new_v4()));
        lifecycle.begin_close();
        lifecycle.transition(ConnectionState::Closed).unwrap();

        let err = lifecycle.transition(ConnectionState::Open).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidStateTransition {
                from: ConnectionState::Closed,
                to: ConnectionState::Open,
            }
        );
    }

    #[test]
    fn begin_close_is_idempotent() {
        let mut lifecycle = ConnectionLifecycle::new(UserId::from(Uuid::new_v4()));
        lifecycle.transition(ConnectionState::Open).unwrap();
        lifecycle.begin_close();
        lifecycle.begin_close();
        assert_eq!(lifecycle.state(), ConnectionState::Closing);
    }
}
