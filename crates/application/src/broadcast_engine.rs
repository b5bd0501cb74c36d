//! 实时扇出引擎
//!
//! 对每个接收者并发推送，离线用户直接跳过；推送失败（通道关闭或超时）的连接
//! 会从注册表移除。单个接收者的失败不影响其他人，也不会回滚已提交的消息。

use std::sync::Arc;

use async_trait::async_trait;
use domain::{AccessControlGuard, DialogId, Message, ServerEvent, UserId};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::broadcaster::{DeliveryReport, MessageBroadcaster};
use crate::connection_registry::{ConnectionError, ConnectionRegistry};
use crate::dialog_store::DialogStore;
use crate::error::ApplicationError;

enum Outcome {
    Delivered(UserId),
    Offline(UserId),
    Failed(UserId),
}

pub struct BroadcastEngine {
    registry: Arc<ConnectionRegistry>,
    dialogs: Arc<DialogStore>,
}

impl BroadcastEngine {
    pub fn new(registry: Arc<ConnectionRegistry>, dialogs: Arc<DialogStore>) -> Self {
        Self { registry, dialogs }
    }

    /// 把输入状态转发给会话其他参与者；发起者必须是参与者
    pub async fn relay_typing(
        &self,
        dialog_id: DialogId,
        user_id: UserId,
        is_typing: bool,
    ) -> Result<DeliveryReport, ApplicationError> {
        let dialog = self.dialogs.get_dialog(dialog_id).await?;
        AccessControlGuard::ensure_participant(&dialog, user_id)?;
        Ok(self
            .broadcast_typing(dialog_id, user_id, is_typing, &dialog.participants)
            .await)
    }

    async fn fan_out<'a>(
        &self,
        recipients: impl Iterator<Item = &'a UserId>,
        event: &ServerEvent,
    ) -> DeliveryReport {
        let pushes = recipients.map(|&user_id| {
            let event = event.clone();
            async move {
                match self.registry.send(user_id, event).await {
                    Ok(()) => Outcome::Delivered(user_id),
                    Err(ConnectionError::NotConnected(_)) => Outcome::Offline(user_id),
                    Err(err) => {
                        warn!(user_id = %user_id, error = %err, "推送失败，移除连接");
                        if let Some(connection_id) = err.connection_id() {
                            self.registry
                                .unregister_connection(user_id, connection_id)
                                .await;
                        }
                        Outcome::Failed(user_id)
                    }
                }
            }
        });

        let mut report = DeliveryReport::default();
        for outcome in join_all(pushes).await {
            match outcome {
                Outcome::Delivered(user_id) => report.delivered.push(user_id),
                Outcome::Offline(user_id) => report.offline.push(user_id),
                Outcome::Failed(user_id) => report.failed.push(user_id),
            }
        }
        report
    }
}

#[async_trait]
impl MessageBroadcaster for BroadcastEngine {
    async fn broadcast_new_message(
        &self,
        message: &Message,
        recipients: &[UserId],
    ) -> DeliveryReport {
        let event = ServerEvent::new_message(message.clone());
        let report = self.fan_out(recipients.iter(), &event).await;
        debug!(
            dialog_id = %message.dialog_id,
            message_id = %message.id,
            delivered = report.delivered.len(),
            offline = report.offline.len(),
            failed = report.failed.len(),
            "新消息已扇出"
        );
        report
    }

    async fn broadcast_typing(
        &self,
        dialog_id: DialogId,
        user_id: UserId,
        is_typing: bool,
        recipients: &[UserId],
    ) -> DeliveryReport {
        let event = ServerEvent::typing(dialog_id, user_id, is_typing);
        let others = recipients.iter().filter(|&&recipient| recipient != user_id);
        let report = self.fan_out(others, &event).await;
        debug!(
            dialog_id = %dialog_id,
            user_id = %user_id,
            is_typing,
            delivered = report.delivered.len(),
            "输入状态已转发"
        );
        report
    }
}
