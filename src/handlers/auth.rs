//! 认证相关的 HTTP 处理器

use crate::{
    auth::middleware::AuthContext,
    error::AppError,
    extract::JsonBody,
    middleware::AppState,
    models::{
        auth::{AuthResponse, LoginRequest, MessageResponse, RefreshTokenRequest, TokenResponse},
        user::{CreateUserRequest, UserResponse},
    },
};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

/// 注册
pub async fn register(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (user, token_pair) = state.auth_service.register(req).await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token: token_pair.into(),
            user: user.into(),
        }),
    ))
}

/// 登录
pub async fn login(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (user, token_pair) = state.auth_service.login(req).await?;

    Ok(Json(AuthResponse {
        token: token_pair.into(),
        user: user.into(),
    }))
}

/// 刷新令牌
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    // 令牌无效、过期或所属用户已不存在，对外统一为 401
    let token_pair = state
        .auth_service
        .refresh_tokens(req)
        .await
        .map_err(|e| match e {
            AppError::InvalidToken | AppError::UserNotFound => AppError::InvalidRefreshToken,
            other => other,
        })?;

    Ok(Json(TokenResponse::from(token_pair)))
}

/// 登出
pub async fn logout(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    state.auth_service.logout().await?;

    Ok(Json(MessageResponse {
        message: "Logged out successfully".to_string(),
    }))
}

/// 当前用户资料
pub async fn profile(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let user = state.auth_service.me(auth_context.user_id).await?;

    Ok(Json(UserResponse::from(user)))
}
