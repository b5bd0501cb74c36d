//! 实时通道事件
//!
//! 服务端推送与客户端上行的 JSON 帧，都以 `type` 字段区分。

use serde::{Deserialize, Serialize};

use crate::entities::Message;
use crate::value_objects::{ConnectionId, DialogId, Timestamp, UserId};

/// 服务端推送给客户端的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// 握手完成后立即发给新连接本身
    ConnectionEstablished {
        user_id: UserId,
        connection_id: ConnectionId,
        server_time: Timestamp,
    },
    /// 新消息，携带完整的消息体
    NewMessage { message: Message },
    TypingIndicator {
        dialog_id: DialogId,
        user_id: UserId,
        is_typing: bool,
    },
    Pong { server_time: Timestamp },
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn new_message(message: Message) -> Self {
        ServerEvent::NewMessage { message }
    }

    pub fn typing(dialog_id: DialogId, user_id: UserId, is_typing: bool) -> Self {
        ServerEvent::TypingIndicator {
            dialog_id,
            user_id,
            is_typing,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// 事件名称，用于日志
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::ConnectionEstablished { .. } => "connection_established",
            ServerEvent::NewMessage { .. } => "new_message",
            ServerEvent::TypingIndicator { .. } => "typing_indicator",
            ServerEvent::Pong { .. } => "pong",
            ServerEvent::Error { .. } => "error",
        }
    }
}

/// 客户端发往服务端的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Ping,
    TypingStart { dialog_id: DialogId },
    TypingStop { dialog_id: DialogId },
}
