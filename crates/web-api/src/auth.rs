//! 调用方身份
//!
//! 身份由上游网关认证后通过 `x-user-id` 头传入；WebSocket 握手也可以用 `?user_id=`。

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use uuid::Uuid;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// 已识别的调用方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub Uuid);

impl CurrentUser {
    pub fn id(&self) -> Uuid {
        self.0
    }
}

/// 从请求头解析用户 ID，缺失或格式错误都返回 `None`
pub fn user_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_from_headers(&parts.headers)
            .map(CurrentUser)
            .ok_or_else(|| {
                ApiError::unauthenticated(format!("missing or invalid {USER_ID_HEADER} header"))
            })
    }
}
