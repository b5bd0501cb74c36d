use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{DialogId, MessageContent, MessageId, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Multimedia,
    Image,
    File,
    System,
}

/// 消息附加的键值元数据
pub type MessageMetadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl Attachment {
    fn validate(&self) -> Result<(), DomainError> {
        if self.url.trim().is_empty() {
            return Err(DomainError::invalid_argument(
                "attachments",
                "attachment url cannot be empty",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub dialog_id: DialogId,
    pub sender_id: UserId,
    pub message_type: MessageType,
    pub content: MessageContent,
    pub metadata: Option<MessageMetadata>,
    pub attachments: Vec<Attachment>,
    /// 会话内从 1 开始连续递增的序列号
    pub sequence: u64,
    /// 已读用户，按首次确认顺序排列，发送者总在其中
    pub read_by: Vec<UserId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub edited_at: Option<Timestamp>,
}

impl Message {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: MessageId,
        dialog_id: DialogId,
        sender_id: UserId,
        message_type: MessageType,
        content: MessageContent,
        metadata: Option<MessageMetadata>,
        attachments: Vec<Attachment>,
        sequence: u64,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        Self::validate_attachments(&attachments)?;
        Ok(Self {
            id,
            dialog_id,
            sender_id,
            message_type,
            content,
            metadata,
            attachments,
            sequence,
            read_by: vec![sender_id],
            created_at,
            updated_at: created_at,
            edited_at: None,
        })
    }

    pub fn validate_attachments(attachments: &[Attachment]) -> Result<(), DomainError> {
        attachments.iter().try_for_each(Attachment::validate)
    }

    /// 修改正文和/或元数据，返回是否发生了变化。
    ///
    /// 正文变化时记录 `edited_at`，序列号保持不变。
    pub fn edit(
        &mut self,
        content: Option<MessageContent>,
        metadata: Option<MessageMetadata>,
        at: Timestamp,
    ) -> bool {
        let mut changed = false;
        if let Some(content) = content {
            if content != self.content {
                self.content = content;
                self.edited_at = Some(at);
                changed = true;
            }
        }
        if let Some(metadata) = metadata {
            if self.metadata.as_ref() != Some(&metadata) {
                self.metadata = Some(metadata);
                changed = true;
            }
        }
        if changed {
            self.updated_at = at;
        }
        changed
    }

    /// 幂等地加入已读集合，返回是否新增
    pub fn mark_read_by(&mut self, reader_id: UserId) -> bool {
        if self.is_read_by(reader_id) {
            return false;
        }
        self.read_by.push(reader_id);
        true
    }

    pub fn is_read_by(&self, user_id: UserId) -> bool {
        self.read_by.contains(&user_id)
    }
}
