//! 用户管理的 HTTP 处理器

use crate::{
    error::AppError,
    extract::JsonBody,
    middleware::AppState,
    models::user::{CreateUserRequest, UserResponse},
};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

/// 创建用户
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.user_service.create_user(req).await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}
