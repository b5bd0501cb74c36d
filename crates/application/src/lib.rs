//! 应用层实现。
//!
//! 这里提供围绕领域模型的存储与用例服务：会话存储、按会话有序的消息日志、
//! 在线连接注册表，以及把已提交消息扇出到在线参与者的广播引擎。

pub mod broadcast_engine;
pub mod broadcaster;
pub mod clock;
pub mod connection_registry;
pub mod dialog_store;
pub mod dto;
pub mod error;
pub mod message_store;
pub mod services;

pub use broadcast_engine::BroadcastEngine;
pub use broadcaster::{DeliveryReport, MessageBroadcaster};
pub use clock::{Clock, SystemClock};
pub use connection_registry::{ConnectionError, ConnectionHandle, ConnectionRegistry};
pub use dialog_store::{DialogFilter, DialogStore};
pub use dto::{
    DialogDto, MessageDto, MessagePageDto, ParticipantDto, ReadReceiptDto, UnreadCountDto,
};
pub use error::{ApplicationError, ErrorKind};
pub use message_store::{MessagePage, MessageStore, NewMessage, Pagination};
pub use services::{
    AssignRoleRequest, ChatService, ChatServiceDependencies, CreateDialogRequest,
    EditMessageRequest, GetMessagesRequest, ListDialogsRequest, SendMessageRequest,
};
