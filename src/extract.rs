//! JSON 请求体提取器
//! 解析失败时返回统一的 JSON 错误信封，而不是 axum 默认的纯文本拒绝
//! 请求体超过 `DefaultBodyLimit` 时返回 413

use crate::error::AppError;
use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    Json,
};
use serde::de::DeserializeOwned;

/// 与 `axum::Json` 相同，但拒绝时返回 400 `{"error": "Cannot parse JSON"}`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(map_rejection(rejection)),
        }
    }
}

fn map_rejection(rejection: JsonRejection) -> AppError {
    tracing::debug!(status = %rejection.status(), reason = %rejection.body_text(), "JSON body rejected");

    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::PayloadTooLarge;
    }
    AppError::BadRequest("Cannot parse JSON".to_string())
}
