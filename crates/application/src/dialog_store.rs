//! 会话存储
//!
//! 会话表由一把读写锁保护，只在创建时写入；每个会话记录再各自持有一把锁，
//! 因此不同会话上的计数更新互不阻塞。

use std::collections::HashMap;
use std::sync::Arc;

use domain::{Dialog, DialogId, DialogRole, DialogType, DomainError, UserId};
use tokio::sync::RwLock;
use tracing::info;

use crate::clock::Clock;
use crate::error::ApplicationError;

/// 会话列表过滤条件
#[derive(Debug, Clone, Default)]
pub struct DialogFilter {
    pub dialog_type: Option<DialogType>,
    /// 只返回该用户参与的会话
    pub participant: Option<UserId>,
}

impl DialogFilter {
    fn matches(&self, dialog: &Dialog) -> bool {
        if let Some(dialog_type) = self.dialog_type {
            if dialog.dialog_type != dialog_type {
                return false;
            }
        }
        if let Some(user_id) = self.participant {
            if !dialog.participants.contains(&user_id) {
                return false;
            }
        }
        true
    }
}

#[derive(Default)]
struct DialogTable {
    by_id: HashMap<DialogId, Arc<RwLock<Dialog>>>,
    /// 插入顺序
    order: Vec<DialogId>,
}

pub struct DialogStore {
    table: RwLock<DialogTable>,
    clock: Arc<dyn Clock>,
}

impl DialogStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            table: RwLock::new(DialogTable::default()),
            clock,
        }
    }

    pub async fn create_dialog(
        &self,
        creator_id: UserId,
        dialog_type: DialogType,
        participants: Vec<UserId>,
        title: Option<String>,
    ) -> Result<Dialog, ApplicationError> {
        let dialog = Dialog::new(
            DialogId::generate(),
            creator_id,
            dialog_type,
            participants,
            title,
            self.clock.now(),
        )?;

        let mut table = self.table.write().await;
        if table.by_id.contains_key(&dialog.id) {
            return Err(ApplicationError::internal(format!(
                "dialog id collision: {}",
                dialog.id
            )));
        }
        table
            .by_id
            .insert(dialog.id, Arc::new(RwLock::new(dialog.clone())));
        table.order.push(dialog.id);
        drop(table);

        info!(
            dialog_id = %dialog.id,
            dialog_type = %dialog.dialog_type,
            participants = dialog.participants.len(),
            "会话已创建"
        );
        Ok(dialog)
    }

    pub async fn get_dialog(&self, dialog_id: DialogId) -> Result<Dialog, ApplicationError> {
        let entry = self.entry(dialog_id).await?;
        let dialog = entry.read().await;
        Ok(dialog.clone())
    }

    /// 按插入顺序返回满足条件的会话
    pub async fn list_dialogs(&self, filter: &DialogFilter) -> Vec<Dialog> {
        let entries: Vec<Arc<RwLock<Dialog>>> = {
            let table = self.table.read().await;
            table
                .order
                .iter()
                .filter_map(|id| table.by_id.get(id).cloned())
                .collect()
        };

        let mut dialogs = Vec::with_capacity(entries.len());
        for entry in entries {
            let dialog = entry.read().await;
            if filter.matches(&dialog) {
                dialogs.push(dialog.clone());
            }
        }
        dialogs
    }

    pub async fn assign_role(
        &self,
        dialog_id: DialogId,
        user_id: UserId,
        role: DialogRole,
    ) -> Result<Dialog, ApplicationError> {
        let entry = self.entry(dialog_id).await?;
        let mut dialog = entry.write().await;
        dialog.assign_role(user_id, role, self.clock.now())?;

        info!(dialog_id = %dialog_id, user_id = %user_id, role = ?role, "参与者角色已更新");
        Ok(dialog.clone())
    }

    /// 会话记录的共享句柄，供消息存储在追加的临界区内更新计数
    pub(crate) async fn entry(
        &self,
        dialog_id: DialogId,
    ) -> Result<Arc<RwLock<Dialog>>, ApplicationError> {
        let table = self.table.read().await;
        table
            .by_id
            .get(&dialog_id)
            .cloned()
            .ok_or_else(|| DomainError::DialogNotFound.into())
    }
}
