use domain::{
    Attachment, Dialog, DialogRole, DialogType, Message, MessageMetadata, MessageType, Timestamp,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message_store::MessagePage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantDto {
    pub user_id: Uuid,
    pub role: DialogRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogDto {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub dialog_type: DialogType,
    pub title: Option<String>,
    pub creator_id: Uuid,
    pub participants: Vec<ParticipantDto>,
    pub message_count: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<&Dialog> for DialogDto {
    fn from(dialog: &Dialog) -> Self {
        let participants = dialog
            .participants
            .iter()
            .map(|&user_id| ParticipantDto {
                user_id: Uuid::from(user_id),
                role: dialog.role_of(user_id).unwrap_or(DialogRole::Member),
            })
            .collect();

        Self {
            id: Uuid::from(dialog.id),
            dialog_type: dialog.dialog_type,
            title: dialog.title.clone(),
            creator_id: Uuid::from(dialog.creator_id),
            participants,
            message_count: dialog.message_count,
            created_at: dialog.created_at,
            updated_at: dialog.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: Uuid,
    pub dialog_id: Uuid,
    pub sender_id: Uuid,
    pub sequence: u64,
    pub message_type: MessageType,
    pub content: String,
    pub metadata: Option<MessageMetadata>,
    pub attachments: Vec<Attachment>,
    pub read_by: Vec<Uuid>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub edited_at: Option<Timestamp>,
}

impl From<&Message> for MessageDto {
    fn from(message: &Message) -> Self {
        Self {
            id: Uuid::from(message.id),
            dialog_id: Uuid::from(message.dialog_id),
            sender_id: Uuid::from(message.sender_id),
            sequence: message.sequence,
            message_type: message.message_type,
            content: message.content.as_str().to_owned(),
            metadata: message.metadata.clone(),
            attachments: message.attachments.clone(),
            read_by: message.read_by.iter().copied().map(Uuid::from).collect(),
            created_at: message.created_at,
            updated_at: message.updated_at,
            edited_at: message.edited_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePageDto {
    pub messages: Vec<MessageDto>,
    pub total: u64,
    pub page: usize,
    pub limit: usize,
}

impl From<&MessagePage> for MessagePageDto {
    fn from(page: &MessagePage) -> Self {
        Self {
            messages: page.messages.iter().map(MessageDto::from).collect(),
            total: page.total,
            page: page.page,
            limit: page.limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadReceiptDto {
    pub message_id: Uuid,
    pub read_by: Vec<Uuid>,
}

impl From<&Message> for ReadReceiptDto {
    fn from(message: &Message) -> Self {
        Self {
            message_id: Uuid::from(message.id),
            read_by: message.read_by.iter().copied().map(Uuid::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnreadCountDto {
    pub dialog_id: Uuid,
    pub unread: u64,
}
