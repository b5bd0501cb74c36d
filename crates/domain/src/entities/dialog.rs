//! 会话实体
//!
//! 会话拥有参与者集合和角色表；`message_count` 由消息存储在同一临界区内维护。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{normalize_title, DialogId, Timestamp, UserId};

/// 会话类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogType {
    /// 一对一私聊
    Direct,
    /// 群聊
    Group,
    /// 频道
    Channel,
}

impl DialogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialogType::Direct => "direct",
            DialogType::Group => "group",
            DialogType::Channel => "channel",
        }
    }
}

impl fmt::Display for DialogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialogType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "direct" => Ok(DialogType::Direct),
            "group" => Ok(DialogType::Group),
            "channel" => Ok(DialogType::Channel),
            other => Err(DomainError::invalid_argument(
                "type",
                format!("unrecognized dialog type '{other}'"),
            )),
        }
    }
}

/// 参与者在会话中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogRole {
    Owner,
    Admin,
    Member,
}

impl DialogRole {
    /// 是否具备管理权限
    pub fn has_admin_access(&self) -> bool {
        matches!(self, DialogRole::Owner | DialogRole::Admin)
    }
}

impl FromStr for DialogRole {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "owner" => Ok(DialogRole::Owner),
            "admin" => Ok(DialogRole::Admin),
            "member" => Ok(DialogRole::Member),
            other => Err(DomainError::invalid_argument(
                "role",
                format!("unrecognized role '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialog {
    pub id: DialogId,
    pub dialog_type: DialogType,
    pub title: Option<String>,
    pub creator_id: UserId,
    /// 有序且去重，创建者总在第一位
    pub participants: Vec<UserId>,
    pub roles: BTreeMap<UserId, DialogRole>,
    pub message_count: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Dialog {
    pub fn new(
        id: DialogId,
        creator_id: UserId,
        dialog_type: DialogType,
        participants: Vec<UserId>,
        title: Option<String>,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        let participants = Self::normalize_participants(creator_id, participants);
        if dialog_type == DialogType::Direct && participants.len() != 2 {
            return Err(DomainError::invalid_argument(
                "participants",
                "a direct dialog needs exactly two distinct participants",
            ));
        }
        let title = normalize_title(title)?;

        let roles = participants
            .iter()
            .map(|&user_id| {
                let role = if user_id == creator_id {
                    DialogRole::Owner
                } else {
                    DialogRole::Member
                };
                (user_id, role)
            })
            .collect();

        Ok(Self {
            id,
            dialog_type,
            title,
            creator_id,
            participants,
            roles,
            message_count: 0,
            created_at,
            updated_at: created_at,
        })
    }

    /// 创建者放在首位，其余保持请求顺序并去重
    pub fn normalize_participants(creator_id: UserId, participants: Vec<UserId>) -> Vec<UserId> {
        let mut normalized = Vec::with_capacity(participants.len() + 1);
        normalized.push(creator_id);
        for user_id in participants {
            if !normalized.contains(&user_id) {
                normalized.push(user_id);
            }
        }
        normalized
    }

    pub fn role_of(&self, user_id: UserId) -> Option<DialogRole> {
        self.roles.get(&user_id).copied()
    }

    pub fn assign_role(
        &mut self,
        user_id: UserId,
        role: DialogRole,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        if !self.participants.contains(&user_id) {
            return Err(DomainError::NotParticipant);
        }
        if user_id == self.creator_id && role != DialogRole::Owner {
            return Err(DomainError::invalid_argument(
                "role",
                "the creator always keeps the owner role",
            ));
        }
        self.roles.insert(user_id, role);
        self.updated_at = now;
        Ok(())
    }

    pub fn record_message(&mut self, at: Timestamp) {
        self.message_count += 1;
        self.updated_at = at;
    }

    pub fn record_removal(&mut self, at: Timestamp) {
        self.message_count = self.message_count.saturating_sub(1);
        self.updated_at = at;
    }
}
