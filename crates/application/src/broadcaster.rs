use async_trait::async_trait;
use domain::{DialogId, Message, UserId};
use serde::Serialize;

/// 一次扇出的投递结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: Vec<UserId>,
    /// 没有在线连接，直接跳过
    pub offline: Vec<UserId>,
    /// 推送失败，连接已被移除
    pub failed: Vec<UserId>,
}

impl DeliveryReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.offline.len() + self.failed.len()
    }
}

/// 实时推送的出口，服务层只依赖这个接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageBroadcaster: Send + Sync {
    /// 向接收者推送新消息，包括发送者本人
    async fn broadcast_new_message(&self, message: &Message, recipients: &[UserId])
        -> DeliveryReport;

    /// 推送输入状态，`user_id` 本人不会收到
    async fn broadcast_typing(
        &self,
        dialog_id: DialogId,
        user_id: UserId,
        is_typing: bool,
        recipients: &[UserId],
    ) -> DeliveryReport;
}
