use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// 统一的时间戳类型（UTC，序列化为 RFC 3339）。
pub type Timestamp = DateTime<Utc>;

/// 消息正文允许的最大字符数。
pub const MAX_MESSAGE_CHARS: usize = 10_000;

/// 会话标题允许的最大字符数。
pub const MAX_TITLE_CHARS: usize = 120;

/// 用户唯一标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UserId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<UserId> for Uuid {
    fn from(value: UserId) -> Self {
        value.0
    }
}

/// 会话唯一标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialogId(pub Uuid);

impl DialogId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// 生成一个新的随机标识
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for DialogId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<DialogId> for Uuid {
    fn from(value: DialogId) -> Self {
        value.0
    }
}

/// 消息唯一标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<MessageId> for Uuid {
    fn from(value: MessageId) -> Self {
        value.0
    }
}

/// 单条实时连接的标识。同一用户重连会得到新的连接标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 消息正文内容。
///
/// 非空（不能只有空白），且不超过 [`MAX_MESSAGE_CHARS`] 个字符。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageContent(String);

impl MessageContent {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::invalid_argument("content", "cannot be empty"));
        }
        let length = value.chars().count();
        if length > MAX_MESSAGE_CHARS {
            return Err(DomainError::invalid_argument(
                "content",
                format!("{length} characters exceeds the limit of {MAX_MESSAGE_CHARS}"),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MessageContent {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MessageContent> for String {
    fn from(value: MessageContent) -> Self {
        value.0
    }
}

impl fmt::Display for MessageContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 会话标题：去掉首尾空白，空标题视为未设置。
pub fn normalize_title(title: Option<String>) -> Result<Option<String>, DomainError> {
    let Some(title) = title else {
        return Ok(None);
    };
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_TITLE_CHARS {
        return Err(DomainError::invalid_argument("title", "too long"));
    }
    Ok(Some(trimmed.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_at_limit_is_accepted() {
        let content = "a".repeat(MAX_MESSAGE_CHARS);
        assert!(MessageContent::new(content).is_ok());
    }

    #[test]
    fn content_over_limit_is_rejected() {
        let content = "a".repeat(MAX_MESSAGE_CHARS + 1);
        let err = MessageContent::new(content).unwrap_err();
        assert!(
            matches!(err, DomainError::InvalidArgument { ref field, .. } if field == "content")
        );
    }

    #[test]
    fn limit_counts_characters_not_bytes() {
        // 每个字符 3 字节，字节数远超上限但字符数正好
        let content = "消".repeat(MAX_MESSAGE_CHARS);
        assert!(MessageContent::new(content).is_ok());
    }

    #[test]
    fn empty_and_blank_content_are_rejected() {
        assert!(MessageContent::new("").is_err());
        assert!(MessageContent::new("   \n").is_err());
    }

    #[test]
    fn content_deserialization_is_validated() {
        let ok: Result<MessageContent, _> = serde_json::from_str("\"hi\"");
        assert!(ok.is_ok());
        let blank: Result<MessageContent, _> = serde_json::from_str("\"\"");
        assert!(blank.is_err());
    }

    #[test]
    fn title_is_trimmed_and_blank_becomes_none() {
        assert_eq!(
            normalize_title(Some("  Team  ".into())).unwrap(),
            Some("Team".to_owned())
        );
        assert_eq!(normalize_title(Some("   ".into())).unwrap(), None);
        assert_eq!(normalize_title(None).unwrap(), None);
        assert!(normalize_title(Some("t".repeat(MAX_TITLE_CHARS + 1))).is_err());
    }
}
