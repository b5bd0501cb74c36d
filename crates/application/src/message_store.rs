//! 消息存储
//!
//! 每个会话一份有序日志，由该会话自己的读写锁保护。序列号的分配、消息写入、
//! 会话计数更新都在同一个写锁临界区内完成，读者不会看到半写入的消息或序列号空洞。
//!
//! 锁顺序：会话日志 -> 会话记录 -> 消息索引。追加时索引在释放日志锁之后写入。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use config::MessagingConfig;
use domain::{
    AccessControlGuard, Attachment, DialogId, DomainError, Message, MessageContent, MessageId,
    MessageMetadata, MessageType, UserId,
};
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::clock::Clock;
use crate::dialog_store::DialogStore;
use crate::error::ApplicationError;

/// 追加消息的输入
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub dialog_id: DialogId,
    pub sender_id: UserId,
    pub message_type: MessageType,
    pub content: String,
    pub metadata: Option<MessageMetadata>,
    pub attachments: Vec<Attachment>,
}

/// 基于偏移量的分页参数，`page` 从 1 开始
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
}

impl Pagination {
    /// 补全默认值；`limit` 超过上限时截断，`page`/`limit` 为 0 视为参数错误
    pub fn resolve(
        page: Option<usize>,
        limit: Option<usize>,
        config: &MessagingConfig,
    ) -> Result<Self, DomainError> {
        let page = page.unwrap_or(1);
        if page == 0 {
            return Err(DomainError::invalid_argument("page", "must start at 1"));
        }
        let limit = limit.unwrap_or(config.default_page_limit);
        if limit == 0 {
            return Err(DomainError::invalid_argument(
                "limit",
                "must be greater than 0",
            ));
        }
        Ok(Self {
            page,
            limit: limit.min(config.max_page_limit),
        })
    }

    fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 50 }
    }
}

#[derive(Debug, Clone)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    /// 日志中的消息总数，与分页无关
    pub total: u64,
    pub page: usize,
    pub limit: usize,
}

#[derive(Default)]
struct DialogLog {
    messages: BTreeMap<u64, Message>,
    sequences: HashMap<MessageId, u64>,
    /// 已分配的最大序列号，删除消息不会回收
    last_sequence: u64,
}

pub struct MessageStore {
    dialogs: Arc<DialogStore>,
    logs: RwLock<HashMap<DialogId, Arc<RwLock<DialogLog>>>>,
    /// 消息 ID -> 所属会话
    index: RwLock<HashMap<MessageId, DialogId>>,
    clock: Arc<dyn Clock>,
}

impl MessageStore {
    pub fn new(dialogs: Arc<DialogStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            dialogs,
            logs: RwLock::new(HashMap::new()),
            index: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub async fn append_message(&self, input: NewMessage) -> Result<Message, ApplicationError> {
        let dialog_entry = self.dialogs.entry(input.dialog_id).await?;
        {
            let dialog = dialog_entry.read().await;
            AccessControlGuard::ensure_participant(&dialog, input.sender_id)?;
        }
        let content = MessageContent::new(input.content)?;
        Message::validate_attachments(&input.attachments)?;

        let log = self.log_for(input.dialog_id).await;
        let mut log = log.write().await;

        let sequence = log.last_sequence + 1;
        if log.messages.contains_key(&sequence) {
            error!(
                dialog_id = %input.dialog_id,
                sequence,
                "sequence number collision"
            );
            return Err(ApplicationError::internal(format!(
                "sequence {sequence} already assigned in dialog {}",
                input.dialog_id
            )));
        }

        let now = self.clock.now();
        let message = Message::new(
            MessageId::generate(),
            input.dialog_id,
            input.sender_id,
            input.message_type,
            content,
            input.metadata,
            input.attachments,
            sequence,
            now,
        )?;

        log.last_sequence = sequence;
        log.sequences.insert(message.id, sequence);
        log.messages.insert(sequence, message.clone());
        dialog_entry.write().await.record_message(now);
        drop(log);
        // 消息 ID 返回前对调用方不可见
        self.index.write().await.insert(message.id, message.dialog_id);

        debug!(
            dialog_id = %message.dialog_id,
            message_id = %message.id,
            sequence,
            "消息已追加"
        );
        Ok(message)
    }

    /// 按序列号升序分页读取
    pub async fn get_messages(
        &self,
        dialog_id: DialogId,
        requester_id: UserId,
        pagination: Pagination,
    ) -> Result<MessagePage, ApplicationError> {
        let dialog = self.dialogs.get_dialog(dialog_id).await?;
        AccessControlGuard::ensure_participant(&dialog, requester_id)?;

        let Some(log) = self.existing_log(dialog_id).await else {
            return Ok(MessagePage {
                messages: Vec::new(),
                total: 0,
                page: pagination.page,
                limit: pagination.limit,
            });
        };

        let log = log.read().await;
        let messages = log
            .messages
            .values()
            .skip(pagination.offset())
            .take(pagination.limit)
            .cloned()
            .collect();

        Ok(MessagePage {
            messages,
            total: log.messages.len() as u64,
            page: pagination.page,
            limit: pagination.limit,
        })
    }

    /// 读取单条消息，要求请求者是会话参与者
    pub async fn get_message(
        &self,
        message_id: MessageId,
        requester_id: UserId,
    ) -> Result<Message, ApplicationError> {
        let message = self.find_message(message_id).await?;
        let dialog = self.dialogs.get_dialog(message.dialog_id).await?;
        AccessControlGuard::ensure_participant(&dialog, requester_id)?;
        Ok(message)
    }

    /// 不做访问控制的查找，供服务层做发送者校验
    pub async fn find_message(&self, message_id: MessageId) -> Result<Message, ApplicationError> {
        let (_, log) = self.locate(message_id).await?;
        let log = log.read().await;
        log.sequences
            .get(&message_id)
            .and_then(|sequence| log.messages.get(sequence))
            .cloned()
            .ok_or_else(|| DomainError::MessageNotFound.into())
    }

    pub async fn update_message(
        &self,
        message_id: MessageId,
        content: Option<String>,
        metadata: Option<MessageMetadata>,
    ) -> Result<Message, ApplicationError> {
        let (_, log) = self.locate(message_id).await?;
        if content.is_none() && metadata.is_none() {
            return Err(DomainError::invalid_argument("content", "nothing to update").into());
        }
        let content = content.map(MessageContent::new).transpose()?;

        let mut log = log.write().await;
        let message = Self::message_mut(&mut log, message_id)?;
        if message.edit(content, metadata, self.clock.now()) {
            debug!(message_id = %message_id, "消息已编辑");
        }
        Ok(message.clone())
    }

    /// 删除消息；其余消息保持原序列号，不做压缩
    pub async fn delete_message(&self, message_id: MessageId) -> Result<Message, ApplicationError> {
        let (dialog_id, log) = self.locate(message_id).await?;
        let dialog_entry = self.dialogs.entry(dialog_id).await?;

        let mut log = log.write().await;
        let sequence = log
            .sequences
            .remove(&message_id)
            .ok_or(DomainError::MessageNotFound)?;
        let removed = log
            .messages
            .remove(&sequence)
            .ok_or_else(|| ApplicationError::internal("message index out of sync with log"))?;
        dialog_entry.write().await.record_removal(self.clock.now());
        self.index.write().await.remove(&message_id);
        drop(log);

        debug!(dialog_id = %dialog_id, message_id = %message_id, sequence, "消息已删除");
        Ok(removed)
    }

    /// 幂等地记录已读
    pub async fn mark_read(
        &self,
        message_id: MessageId,
        reader_id: UserId,
    ) -> Result<Message, ApplicationError> {
        let (dialog_id, log) = self.locate(message_id).await?;
        let dialog = self.dialogs.get_dialog(dialog_id).await?;
        AccessControlGuard::ensure_participant(&dialog, reader_id)?;

        let mut log = log.write().await;
        let message = Self::message_mut(&mut log, message_id)?;
        if message.mark_read_by(reader_id) {
            debug!(message_id = %message_id, reader_id = %reader_id, "已读回执已记录");
        }
        Ok(message.clone())
    }

    /// 会话中该用户尚未确认的消息数
    pub async fn unread_count(
        &self,
        dialog_id: DialogId,
        user_id: UserId,
    ) -> Result<u64, ApplicationError> {
        let dialog = self.dialogs.get_dialog(dialog_id).await?;
        AccessControlGuard::ensure_participant(&dialog, user_id)?;

        let Some(log) = self.existing_log(dialog_id).await else {
            return Ok(0);
        };
        let log = log.read().await;
        Ok(log
            .messages
            .values()
            .filter(|message| !message.is_read_by(user_id))
            .count() as u64)
    }

    /// 日志在首次写入时惰性创建
    async fn log_for(&self, dialog_id: DialogId) -> Arc<RwLock<DialogLog>> {
        if let Some(log) = self.existing_log(dialog_id).await {
            return log;
        }
        let mut logs = self.logs.write().await;
        logs.entry(dialog_id).or_default().clone()
    }

    async fn existing_log(&self, dialog_id: DialogId) -> Option<Arc<RwLock<DialogLog>>> {
        self.logs.read().await.get(&dialog_id).cloned()
    }

    async fn locate(
        &self,
        message_id: MessageId,
    ) -> Result<(DialogId, Arc<RwLock<DialogLog>>), ApplicationError> {
        let dialog_id = self
            .index
            .read()
            .await
            .get(&message_id)
            .copied()
            .ok_or(DomainError::MessageNotFound)?;
        let log = self
            .existing_log(dialog_id)
            .await
            .ok_or(DomainError::MessageNotFound)?;
        Ok((dialog_id, log))
    }

    fn message_mut(
        log: &mut DialogLog,
        message_id: MessageId,
    ) -> Result<&mut Message, ApplicationError> {
        let sequence = *log
            .sequences
            .get(&message_id)
            .ok_or(DomainError::MessageNotFound)?;
        log.messages
            .get_mut(&sequence)
            .ok_or_else(|| DomainError::MessageNotFound.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::error::ErrorKind;
    use domain::{DialogType, MAX_MESSAGE_CHARS};
    use std::time::Duration;
    use uuid::Uuid;

    struct Fixture {
        dialogs: Arc<DialogStore>,
        messages: MessageStore,
    }

    fn fixture() -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let dialogs = Arc::new(DialogStore::new(clock.clone()));
        let messages = MessageStore::new(dialogs.clone(), clock);
        Fixture { dialogs, messages }
    }

    fn user() -> UserId {
        UserId::from(Uuid::new_v4())
    }

    fn text(dialog_id: DialogId, sender_id: UserId, content: impl Into<String>) -> NewMessage {
        NewMessage {
            dialog_id,
            sender_id,
            message_type: MessageType::Text,
            content: content.into(),
            metadata: None,
            attachments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn empty_dialog_returns_empty_page() {
        let fx = fixture();
        let alice = user();
        let dialog = fx
            .dialogs
            .create_dialog(alice, DialogType::Group, vec![], None)
            .await
            .unwrap();

        let page = fx
            .messages
            .get_messages(dialog.id, alice, Pagination::default())
            .await
            .unwrap();
        assert!(page.messages.is_empty());
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn append_does_not_hold_log_while_indexing() {
        let fx = fixture();
        let alice = user();
        let dialog = fx
            .dialogs
            .create_dialog(alice, DialogType::Group, vec![], None)
            .await
            .unwrap();

        // 占住全局索引，追加会停在写索引这一步
        let index_guard = fx.messages.index.write().await;
        let append = fx.messages.append_message(text(dialog.id, alice, "hi"));
        let read_while_indexing = async {
            tokio::task::yield_now().await;
            let page = tokio::time::timeout(
                Duration::from_secs(1),
                fx.messages.get_messages(dialog.id, alice, Pagination::default()),
            )
            .await
            .expect("dialog log still locked")
            .unwrap();
            drop(index_guard);
            page
        };

        let (appended, page) = tokio::join!(append, read_while_indexing);
        let appended = appended.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.messages[0].id, appended.id);
        assert_eq!(
            fx.messages.find_message(appended.id).await.unwrap().sequence,
            1
        );
    }

    #[tokio::test]
    async fn append_assigns_sequence_and_updates_dialog() {
        let fx = fixture();
        let alice = user();
        let bob = user();
        let dialog = fx
            .dialogs
            .create_dialog(alice, DialogType::Direct, vec![bob], None)
            .await
            .unwrap();

        let first = fx
            .messages
            .append_message(text(dialog.id, alice, "one"))
            .await
            .unwrap();
        let second = fx
            .messages
            .append_message(text(dialog.id, bob, "two"))
            .await
            .unwrap();

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(second.read_by, vec![bob]);

        let dialog = fx.dialogs.get_dialog(dialog.id).await.unwrap();
        assert_eq!(dialog.message_count, 2);
        assert!(dialog.updated_at >= second.created_at);
    }

    #[tokio::test]
    async fn content_boundaries() {
        let fx = fixture();
        let alice = user();
        let dialog = fx
            .dialogs
            .create_dialog(alice, DialogType::Group, vec![], None)
            .await
            .unwrap();

        let at_limit = "x".repeat(MAX_MESSAGE_CHARS);
        assert!(fx
            .messages
            .append_message(text(dialog.id, alice, at_limit))
            .await
            .is_ok());

        let over = "x".repeat(MAX_MESSAGE_CHARS + 1);
        let err = fx
            .messages
            .append_message(text(dialog.id, alice, over))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = fx
            .messages
            .append_message(text(dialog.id, alice, ""))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        // 被拒绝的写入不占用序列号
        let dialog = fx.dialogs.get_dialog(dialog.id).await.unwrap();
        assert_eq!(dialog.message_count, 1);
        let next = fx
            .messages
            .append_message(text(dialog.id, alice, "next"))
            .await
            .unwrap();
        assert_eq!(next.sequence, 2);
    }

    #[tokio::test]
    async fn not_found_is_reported_before_forbidden() {
        let fx = fixture();
        let outsider = user();

        let err = fx
            .messages
            .append_message(text(DialogId::generate(), outsider, "hi"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // 非参与者即使内容非法也先得到 Forbidden
        let dialog = fx
            .dialogs
            .create_dialog(user(), DialogType::Group, vec![], None)
            .await
            .unwrap();
        let err = fx
            .messages
            .append_message(text(dialog.id, outsider, ""))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn pagination_is_offset_based() {
        let fx = fixture();
        let alice = user();
        let dialog = fx
            .dialogs
            .create_dialog(alice, DialogType::Group, vec![], None)
            .await
            .unwrap();
        for i in 1..=7 {
            fx.messages
                .append_message(text(dialog.id, alice, format!("m{i}")))
                .await
                .unwrap();
        }

        let page = fx
            .messages
            .get_messages(dialog.id, alice, Pagination { page: 2, limit: 3 })
            .await
            .unwrap();
        let sequences: Vec<u64> = page.messages.iter().map(|m| m.sequence).collect();
        assert_eq!(sequences, vec![4, 5, 6]);
        assert_eq!(page.total, 7);

        let page = fx
            .messages
            .get_messages(dialog.id, alice, Pagination { page: 4, limit: 3 })
            .await
            .unwrap();
        assert!(page.messages.is_empty());
        assert_eq!(page.total, 7);
    }

    #[test]
    fn pagination_resolve_applies_defaults_and_clamps() {
        let config = MessagingConfig::default();
        assert_eq!(
            Pagination::resolve(None, None, &config).unwrap(),
            Pagination { page: 1, limit: 50 }
        );
        assert_eq!(
            Pagination::resolve(Some(3), Some(1_000), &config).unwrap(),
            Pagination {
                page: 3,
                limit: 100
            }
        );
        assert!(Pagination::resolve(Some(0), None, &config).is_err());
        assert!(Pagination::resolve(None, Some(0), &config).is_err());
    }

    #[tokio::test]
    async fn update_delete_and_unknown_ids() {
        let fx = fixture();
        let alice = user();
        let dialog = fx
            .dialogs
            .create_dialog(alice, DialogType::Group, vec![], None)
            .await
            .unwrap();
        let message = fx
            .messages
            .append_message(text(dialog.id, alice, "draft"))
            .await
            .unwrap();

        let updated = fx
            .messages
            .update_message(message.id, Some("final".into()), None)
            .await
            .unwrap();
        assert_eq!(updated.content.as_str(), "final");
        assert!(updated.edited_at.is_some());
        assert_eq!(updated.sequence, message.sequence);

        let err = fx
            .messages
            .update_message(message.id, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        fx.messages.delete_message(message.id).await.unwrap();
        for err in [
            fx.messages.find_message(message.id).await.unwrap_err(),
            fx.messages
                .update_message(message.id, Some("again".into()), None)
                .await
                .unwrap_err(),
            fx.messages.delete_message(message.id).await.unwrap_err(),
            fx.messages.mark_read(message.id, alice).await.unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::NotFound);
        }

        let dialog = fx.dialogs.get_dialog(dialog.id).await.unwrap();
        assert_eq!(dialog.message_count, 0);
    }

    #[tokio::test]
    async fn unread_count_tracks_receipts() {
        let fx = fixture();
        let alice = user();
        let bob = user();
        let dialog = fx
            .dialogs
            .create_dialog(alice, DialogType::Direct, vec![bob], None)
            .await
            .unwrap();
        let first = fx
            .messages
            .append_message(text(dialog.id, alice, "1"))
            .await
            .unwrap();
        fx.messages
            .append_message(text(dialog.id, alice, "2"))
            .await
            .unwrap();

        assert_eq!(fx.messages.unread_count(dialog.id, bob).await.unwrap(), 2);
        assert_eq!(fx.messages.unread_count(dialog.id, alice).await.unwrap(), 0);

        fx.messages.mark_read(first.id, bob).await.unwrap();
        assert_eq!(fx.messages.unread_count(dialog.id, bob).await.unwrap(), 1);

        let err = fx
            .messages
            .unread_count(dialog.id, user())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
}
