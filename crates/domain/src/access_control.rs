//! 参与者访问控制
//!
//! 纯函数判断，不做任何存储访问；会话是否存在由调用方先行确认。

use crate::entities::Dialog;
use crate::errors::DomainError;
use crate::value_objects::UserId;

pub struct AccessControlGuard;

impl AccessControlGuard {
    /// 用户是否是会话参与者
    pub fn is_participant(dialog: &Dialog, user_id: UserId) -> bool {
        dialog.participants.contains(&user_id)
    }

    pub fn ensure_participant(dialog: &Dialog, user_id: UserId) -> Result<(), DomainError> {
        if Self::is_participant(dialog, user_id) {
            Ok(())
        } else {
            Err(DomainError::NotParticipant)
        }
    }

    /// 参与者且为 owner/admin
    pub fn ensure_admin(dialog: &Dialog, user_id: UserId) -> Result<(), DomainError> {
        Self::ensure_participant(dialog, user_id)?;
        match dialog.role_of(user_id) {
            Some(role) if role.has_admin_access() => Ok(()),
            _ => Err(DomainError::InsufficientPermissions),
        }
    }
}
