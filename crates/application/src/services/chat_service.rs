use std::sync::Arc;
use std::time::Duration;

use config::MessagingConfig;
use domain::{
    AccessControlGuard, Attachment, Dialog, DialogId, DialogRole, DialogType, DomainError,
    Message, MessageId, MessageMetadata, MessageType, UserId,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    broadcaster::MessageBroadcaster,
    dialog_store::{DialogFilter, DialogStore},
    error::ApplicationError,
    message_store::{MessagePage, MessageStore, NewMessage, Pagination},
};

#[derive(Debug, Clone)]
pub struct CreateDialogRequest {
    pub creator_id: Uuid,
    /// `direct` / `group` / `channel`
    pub dialog_type: String,
    pub participants: Vec<Uuid>,
    pub title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ListDialogsRequest {
    pub requester_id: Uuid,
    pub dialog_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AssignRoleRequest {
    pub dialog_id: Uuid,
    pub operator_id: Uuid, // 操作者，必须是 owner 或 admin
    pub target_user_id: Uuid,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub dialog_id: Uuid,
    pub sender_id: Uuid,
    pub message_type: MessageType,
    pub content: String,
    pub metadata: Option<MessageMetadata>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone)]
pub struct GetMessagesRequest {
    pub dialog_id: Uuid,
    pub requester_id: Uuid,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct EditMessageRequest {
    pub message_id: Uuid,
    pub editor_id: Uuid,
    pub content: Option<String>,
    pub metadata: Option<MessageMetadata>,
}

pub struct ChatServiceDependencies {
    pub dialog_store: Arc<DialogStore>,
    pub message_store: Arc<MessageStore>,
    pub broadcaster: Arc<dyn MessageBroadcaster>,
    pub messaging: MessagingConfig,
}

pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn create_dialog(
        &self,
        request: CreateDialogRequest,
    ) -> Result<Dialog, ApplicationError> {
        let dialog_type: DialogType = request.dialog_type.parse()?;
        let participants = request.participants.into_iter().map(UserId::from).collect();

        self.deps
            .dialog_store
            .create_dialog(
                UserId::from(request.creator_id),
                dialog_type,
                participants,
                request.title,
            )
            .await
    }

    /// 只有参与者可以查看会话
    pub async fn get_dialog(
        &self,
        dialog_id: Uuid,
        requester_id: Uuid,
    ) -> Result<Dialog, ApplicationError> {
        let dialog = self
            .deps
            .dialog_store
            .get_dialog(DialogId::from(dialog_id))
            .await?;
        AccessControlGuard::ensure_participant(&dialog, UserId::from(requester_id))?;
        Ok(dialog)
    }

    /// 请求者参与的会话，可按类型过滤
    pub async fn list_dialogs(
        &self,
        request: ListDialogsRequest,
    ) -> Result<Vec<Dialog>, ApplicationError> {
        let dialog_type = request
            .dialog_type
            .as_deref()
            .map(str::parse::<DialogType>)
            .transpose()?;
        let filter = DialogFilter {
            dialog_type,
            participant: Some(UserId::from(request.requester_id)),
        };
        Ok(self.deps.dialog_store.list_dialogs(&filter).await)
    }

    pub async fn assign_role(
        &self,
        request: AssignRoleRequest,
    ) -> Result<Dialog, ApplicationError> {
        let dialog_id = DialogId::from(request.dialog_id);
        let role: DialogRole = request.role.parse()?;

        let dialog = self.deps.dialog_store.get_dialog(dialog_id).await?;
        AccessControlGuard::ensure_admin(&dialog, UserId::from(request.operator_id))?;

        self.deps
            .dialog_store
            .assign_role(dialog_id, UserId::from(request.target_user_id), role)
            .await
    }

    /// 写入消息后推送给会话所有参与者。推送失败只记录日志，不影响写入结果。
    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<Message, ApplicationError> {
        let message = self
            .deps
            .message_store
            .append_message(NewMessage {
                dialog_id: DialogId::from(request.dialog_id),
                sender_id: UserId::from(request.sender_id),
                message_type: request.message_type,
                content: request.content,
                metadata: request.metadata,
                attachments: request.attachments,
            })
            .await?;

        match self.deps.dialog_store.get_dialog(message.dialog_id).await {
            Ok(dialog) => {
                let report = self
                    .deps
                    .broadcaster
                    .broadcast_new_message(&message, &dialog.participants)
                    .await;
                if !report.failed.is_empty() {
                    warn!(
                        dialog_id = %message.dialog_id,
                        message_id = %message.id,
                        failed = report.failed.len(),
                        "消息已保存，但部分推送失败"
                    );
                }
            }
            Err(err) => {
                warn!(
                    dialog_id = %message.dialog_id,
                    message_id = %message.id,
                    error = %err,
                    "消息已保存，但无法解析参与者"
                );
            }
        }

        Ok(message)
    }

    pub async fn get_messages(
        &self,
        request: GetMessagesRequest,
    ) -> Result<MessagePage, ApplicationError> {
        let pagination = Pagination::resolve(request.page, request.limit, &self.deps.messaging)?;
        self.deps
            .message_store
            .get_messages(
                DialogId::from(request.dialog_id),
                UserId::from(request.requester_id),
                pagination,
            )
            .await
    }

    /// 带截止时间的分页读取，超时返回 `DeadlineExceeded`
    pub async fn get_messages_within(
        &self,
        request: GetMessagesRequest,
        deadline: Duration,
    ) -> Result<MessagePage, ApplicationError> {
        tokio::time::timeout(deadline, self.get_messages(request))
            .await
            .map_err(|_| ApplicationError::DeadlineExceeded(deadline))?
    }

    /// 使用配置的默认读取超时
    pub async fn get_messages_with_default_deadline(
        &self,
        request: GetMessagesRequest,
    ) -> Result<MessagePage, ApplicationError> {
        let deadline = self.deps.messaging.read_timeout();
        self.get_messages_within(request, deadline).await
    }

    pub async fn get_message(
        &self,
        message_id: Uuid,
        requester_id: Uuid,
    ) -> Result<Message, ApplicationError> {
        self.deps
            .message_store
            .get_message(MessageId::from(message_id), UserId::from(requester_id))
            .await
    }

    /// 只有发送者可以编辑
    pub async fn edit_message(
        &self,
        request: EditMessageRequest,
    ) -> Result<Message, ApplicationError> {
        let message_id = MessageId::from(request.message_id);
        let existing = self.deps.message_store.find_message(message_id).await?;
        if existing.sender_id != UserId::from(request.editor_id) {
            return Err(DomainError::InsufficientPermissions.into());
        }

        self.deps
            .message_store
            .update_message(message_id, request.content, request.metadata)
            .await
    }

    /// 发送者本人或会话 owner/admin 可以删除
    pub async fn delete_message(
        &self,
        message_id: Uuid,
        operator_id: Uuid,
    ) -> Result<Message, ApplicationError> {
        let message_id = MessageId::from(message_id);
        let operator_id = UserId::from(operator_id);
        let existing = self.deps.message_store.find_message(message_id).await?;

        if existing.sender_id != operator_id {
            let dialog = self
                .deps
                .dialog_store
                .get_dialog(existing.dialog_id)
                .await?;
            AccessControlGuard::ensure_admin(&dialog, operator_id)?;
        }

        let removed = self.deps.message_store.delete_message(message_id).await?;
        info!(
            dialog_id = %removed.dialog_id,
            message_id = %removed.id,
            operator_id = %operator_id,
            "消息已删除"
        );
        Ok(removed)
    }

    pub async fn mark_read(
        &self,
        message_id: Uuid,
        reader_id: Uuid,
    ) -> Result<Message, ApplicationError> {
        self.deps
            .message_store
            .mark_read(MessageId::from(message_id), UserId::from(reader_id))
            .await
    }

    pub async fn unread_count(
        &self,
        dialog_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, ApplicationError> {
        self.deps
            .message_store
            .unread_count(DialogId::from(dialog_id), UserId::from(user_id))
            .await
    }
}
