//! 认证服务：注册、登录、令牌刷新、当前用户、登出

use crate::{
    auth::{
        jwt::{JwtService, TokenPair},
        password::CredentialHasher,
    },
    error::AppError,
    models::{
        auth::{LoginRequest, RefreshTokenRequest},
        user::{CreateUserRequest, NewUser, User},
    },
    repository::UserStore,
    validation::UserValidator,
};
use std::sync::Arc;
use uuid::Uuid;

/// 未知邮箱登录时用于比对的占位密码
const DUMMY_PASSWORD: &str = "dummy-password-for-unknown-accounts";

pub struct AuthService {
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn CredentialHasher>,
    jwt_service: Arc<JwtService>,
    validator: UserValidator,
    /// 启动时生成的占位哈希，使未知邮箱的登录同样经过一次密码校验
    dummy_hash: String,
}

impl AuthService {
    pub async fn new(
        store: Arc<dyn UserStore>,
        hasher: Arc<dyn CredentialHasher>,
        jwt_service: Arc<JwtService>,
        validator: UserValidator,
    ) -> Result<Self, AppError> {
        let dummy_hash = hasher.hash(DUMMY_PASSWORD.to_string()).await?;

        Ok(Self {
            store,
            hasher,
            jwt_service,
            validator,
            dummy_hash,
        })
    }

    /// 用户注册
    pub async fn register(&self, req: CreateUserRequest) -> Result<(User, TokenPair), AppError> {
        self.validator.validate_registration(&req)?;

        // 检查邮箱是否已注册（插入时唯一约束会再次兜底）
        if self.store.find_by_email(&req.email).await?.is_some() {
            record_event("register", "email_in_use");
            return Err(AppError::EmailInUse);
        }

        let password_hash = self.hasher.hash(req.password).await?;

        let user = self
            .store
            .create(NewUser {
                name: req.name,
                email: req.email,
                password_hash,
                hobby: req.hobby,
            })
            .await?;

        let token_pair = self.jwt_service.generate_token_pair(&user)?;

        record_event("register", "success");
        tracing::info!(user_id = %user.id, "User registered");

        Ok((user, token_pair))
    }

    /// 用户登录
    ///
    /// 邮箱不存在与密码错误返回同一个错误，且都执行一次哈希比对
    pub async fn login(&self, req: LoginRequest) -> Result<(User, TokenPair), AppError> {
        let user = match self.store.find_by_email(&req.email).await? {
            Some(user) => user,
            None => {
                // 结果丢弃，只为耗时与真实账户一致
                let _ = self
                    .hasher
                    .verify(req.password, self.dummy_hash.clone())
                    .await;
                record_event("login", "failure");
                tracing::debug!("Login attempt for unknown email");
                return Err(AppError::InvalidCredentials);
            }
        };

        // 验证密码
        if let Err(e) = self
            .hasher
            .verify(req.password, user.password_hash.clone())
            .await
        {
            record_event("login", "failure");
            tracing::debug!(user_id = %user.id, "Login attempt with wrong password");
            return Err(e);
        }

        let token_pair = self.jwt_service.generate_token_pair(&user)?;

        record_event("login", "success");
        tracing::info!(user_id = %user.id, "User logged in");

        Ok((user, token_pair))
    }

    /// 刷新令牌
    ///
    /// 令牌无状态，旧的刷新令牌在过期前仍然有效
    pub async fn refresh_tokens(&self, req: RefreshTokenRequest) -> Result<TokenPair, AppError> {
        let claims = self
            .jwt_service
            .validate_refresh_token(&req.refresh_token)
            .inspect_err(|_| record_event("refresh", "invalid_token"))?;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidToken)?;

        let user = self.store.find_by_id(user_id).await?.ok_or_else(|| {
            record_event("refresh", "user_not_found");
            AppError::UserNotFound
        })?;

        let token_pair = self.jwt_service.generate_token_pair(&user)?;

        record_event("refresh", "success");
        tracing::debug!(user_id = %user.id, "Token pair rotated");

        Ok(token_pair)
    }

    /// 获取当前认证用户
    pub async fn me(&self, user_id: Uuid) -> Result<User, AppError> {
        self.store
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::UserNotFound)
    }

    /// 登出：令牌无服务端状态，只做确认
    pub async fn logout(&self) -> Result<(), AppError> {
        record_event("logout", "success");
        Ok(())
    }
}

fn record_event(event: &'static str, outcome: &'static str) {
    metrics::counter!("auth_events_total", "event" => event, "outcome" => outcome).increment(1);
}
