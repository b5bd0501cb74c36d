//! 在线连接注册表
//!
//! 每个用户最多一个活动连接，新连接替换旧连接。推送时先在读锁内克隆发送端，
//! 释放锁后再等待，慢连接不会阻塞注册表。

use std::collections::HashMap;
use std::time::Duration;

use domain::{ConnectionId, ServerEvent, Timestamp, UserId};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 推送失败原因
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("user {0} has no live connection")]
    NotConnected(UserId),
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
    #[error("push to connection {0} timed out")]
    Timeout(ConnectionId),
}

impl ConnectionError {
    /// 失败的连接，用于只移除该连接而不误删替换者
    pub fn connection_id(&self) -> Option<ConnectionId> {
        match self {
            ConnectionError::NotConnected(_) => None,
            ConnectionError::Closed(id) | ConnectionError::Timeout(id) => Some(*id),
        }
    }
}

/// 注册到表中的连接出站句柄
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub connected_at: Timestamp,
    sender: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(
        connection_id: ConnectionId,
        user_id: UserId,
        connected_at: Timestamp,
        sender: mpsc::Sender<ServerEvent>,
    ) -> Self {
        Self {
            connection_id,
            user_id,
            connected_at,
            sender,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

pub struct ConnectionRegistry {
    connections: RwLock<HashMap<UserId, ConnectionHandle>>,
    push_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(push_timeout: Duration) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            push_timeout,
        }
    }

    /// 注册连接，返回被替换的旧连接
    pub async fn register(&self, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let user_id = handle.user_id;
        let connection_id = handle.connection_id;
        let previous = self.connections.write().await.insert(user_id, handle);

        match &previous {
            Some(old) => info!(
                user_id = %user_id,
                connection_id = %connection_id,
                replaced = %old.connection_id,
                "连接已替换"
            ),
            None => info!(user_id = %user_id, connection_id = %connection_id, "连接已注册"),
        }
        previous
    }

    /// 移除用户的连接，重复调用无副作用
    pub async fn unregister(&self, user_id: UserId) -> Option<ConnectionHandle> {
        let removed = self.connections.write().await.remove(&user_id);
        if let Some(handle) = &removed {
            info!(user_id = %user_id, connection_id = %handle.connection_id, "连接已注销");
        }
        removed
    }

    /// 仅当该连接仍是用户当前连接时才移除
    pub async fn unregister_connection(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> bool {
        let mut connections = self.connections.write().await;
        let is_current = connections
            .get(&user_id)
            .is_some_and(|handle| handle.connection_id == connection_id);
        if is_current {
            connections.remove(&user_id);
            drop(connections);
            info!(user_id = %user_id, connection_id = %connection_id, "连接已注销");
        } else {
            debug!(
                user_id = %user_id,
                connection_id = %connection_id,
                "连接已被替换，跳过注销"
            );
        }
        is_current
    }

    pub async fn is_online(&self, user_id: UserId) -> bool {
        self.connections.read().await.contains_key(&user_id)
    }

    pub async fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.connections.read().await.keys().copied().collect();
        users.sort();
        users
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn connection_of(&self, user_id: UserId) -> Option<ConnectionHandle> {
        self.connections.read().await.get(&user_id).cloned()
    }

    /// 向用户当前连接推送一个事件，最多等待 `push_timeout`
    pub async fn send(&self, user_id: UserId, event: ServerEvent) -> Result<(), ConnectionError> {
        let handle = self
            .connection_of(user_id)
            .await
            .ok_or(ConnectionError::NotConnected(user_id))?;

        match handle.sender.send_timeout(event, self.push_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Closed(_)) => Err(ConnectionError::Closed(handle.connection_id)),
            Err(SendTimeoutError::Timeout(_)) => {
                Err(ConnectionError::Timeout(handle.connection_id))
            }
        }
    }
}
