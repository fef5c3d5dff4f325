//! 服务层测试

use account_service::{
    auth::{
        jwt::JwtService,
        password::{CredentialHasher, PasswordHasher},
    },
    error::AppError,
    middleware::AppState,
    models::{
        auth::{LoginRequest, RefreshTokenRequest},
        user::{CreateUserRequest, NewUser, User},
    },
    repository::UserStore,
    routes,
    services::{AuthService, UserService},
    validation::UserValidator,
};
use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::json;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use uuid::Uuid;

mod common;
use common::{create_test_config, setup_test_db, TEST_PASSWORD};

/// 所有操作都失败的存储，用于验证内部错误不会泄露
struct FailingStore;

#[async_trait]
impl UserStore for FailingStore {
    async fn create(&self, _new_user: NewUser) -> Result<User, AppError> {
        Err(AppError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn find_by_id(&self, _id: Uuid) -> Result<Option<User>, AppError> {
        Err(AppError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn find_by_email(&self, _email: &str) -> Result<Option<User>, AppError> {
        Err(AppError::Database(sqlx::Error::PoolTimedOut))
    }
}

/// 统计校验次数的哈希器，委托给真实的 Argon2 实现
struct CountingHasher {
    inner: PasswordHasher,
    verifications: AtomicUsize,
}

impl CountingHasher {
    fn new() -> Self {
        Self {
            inner: PasswordHasher::from_config(&create_test_config().security).unwrap(),
            verifications: AtomicUsize::new(0),
        }
    }

    fn verifications(&self) -> usize {
        self.verifications.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialHasher for CountingHasher {
    async fn hash(&self, password: String) -> Result<String, AppError> {
        self.inner.hash_blocking(password).await
    }

    async fn verify(&self, password: String, hash: String) -> Result<(), AppError> {
        self.verifications.fetch_add(1, Ordering::SeqCst);
        self.inner.verify_blocking(password, hash).await
    }
}

async fn auth_service_with(
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn CredentialHasher>,
) -> AuthService {
    let config = create_test_config();
    AuthService::new(
        store,
        hasher,
        Arc::new(JwtService::from_config(&config).unwrap()),
        UserValidator::from_config(&config.security),
    )
    .await
    .unwrap()
}

async fn auth_service(store: Arc<dyn UserStore>) -> AuthService {
    auth_service_with(store, Arc::new(CountingHasher::new())).await
}

async fn sqlite_store() -> Arc<dyn UserStore> {
    let pool = setup_test_db(&create_test_config()).await;
    Arc::new(account_service::repository::UserRepository::new(pool))
}

fn registration(email: &str) -> CreateUserRequest {
    CreateUserRequest {
        name: "Jane Doe".to_string(),
        email: email.to_string(),
        password: TEST_PASSWORD.to_string(),
        hobby: None,
    }
}

#[tokio::test]
async fn test_register_stores_hash_not_plaintext() {
    let store = sqlite_store().await;
    let service = auth_service(store.clone()).await;

    let (user, pair) = service.register(registration("jane@example.com")).await.unwrap();

    let stored = store.find_by_id(user.id).await.unwrap().unwrap();
    assert_ne!(stored.password_hash, TEST_PASSWORD);
    assert!(stored.password_hash.starts_with("$argon2id$"));
    assert!(!pair.access_token.is_empty());
    assert!(!pair.refresh_token.is_empty());
}

#[tokio::test]
async fn test_register_twice_is_email_in_use() {
    let service = auth_service(sqlite_store().await).await;

    service.register(registration("jane@example.com")).await.unwrap();
    let err = service
        .register(registration("jane@example.com"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::EmailInUse));
}

#[tokio::test]
async fn test_login_and_refresh() {
    let service = auth_service(sqlite_store().await).await;
    let (registered, _) = service.register(registration("jane@example.com")).await.unwrap();

    let (user, pair) = service
        .login(LoginRequest {
            email: "jane@example.com".to_string(),
            password: TEST_PASSWORD.to_string(),
        })
        .await
        .unwrap();
    assert_eq!(user.id, registered.id);

    let rotated = service
        .refresh_tokens(RefreshTokenRequest {
            refresh_token: pair.refresh_token.clone(),
        })
        .await
        .unwrap();
    assert_ne!(rotated.access_token, pair.access_token);
    assert_ne!(rotated.refresh_token, pair.refresh_token);
}

#[tokio::test]
async fn test_login_unknown_and_wrong_password_same_error() {
    let service = auth_service(sqlite_store().await).await;
    service.register(registration("jane@example.com")).await.unwrap();

    let unknown = service
        .login(LoginRequest {
            email: "ghost@example.com".to_string(),
            password: TEST_PASSWORD.to_string(),
        })
        .await
        .unwrap_err();
    let wrong = service
        .login(LoginRequest {
            email: "jane@example.com".to_string(),
            password: "Other1!x".to_string(),
        })
        .await
        .unwrap_err();

    assert!(matches!(unknown, AppError::InvalidCredentials));
    assert!(matches!(wrong, AppError::InvalidCredentials));
}

#[tokio::test]
async fn test_login_unknown_email_still_verifies_password() {
    let hasher = Arc::new(CountingHasher::new());
    let service = auth_service_with(sqlite_store().await, hasher.clone()).await;
    service.register(registration("jane@example.com")).await.unwrap();
    assert_eq!(hasher.verifications(), 0);

    let wrong = service
        .login(LoginRequest {
            email: "jane@example.com".to_string(),
            password: "Other1!x".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(wrong, AppError::InvalidCredentials));
    assert_eq!(hasher.verifications(), 1);

    // 未知邮箱同样走一次哈希比对
    let unknown = service
        .login(LoginRequest {
            email: "ghost@example.com".to_string(),
            password: TEST_PASSWORD.to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(unknown, AppError::InvalidCredentials));
    assert_eq!(hasher.verifications(), 2);
}

#[tokio::test]
async fn test_refresh_with_access_token_fails() {
    let service = auth_service(sqlite_store().await).await;
    let (_, pair) = service.register(registration("jane@example.com")).await.unwrap();

    let err = service
        .refresh_tokens(RefreshTokenRequest {
            refresh_token: pair.access_token,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidToken));
}

#[tokio::test]
async fn test_me_unknown_user() {
    let service = auth_service(sqlite_store().await).await;

    let err = service.me(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AppError::UserNotFound));
}

#[tokio::test]
async fn test_logout_always_succeeds() {
    let service = auth_service(Arc::new(FailingStore)).await;
    service.logout().await.unwrap();
}

#[tokio::test]
async fn test_user_service_rejects_weak_password() {
    let config = create_test_config();
    let service = UserService::new(
        sqlite_store().await,
        Arc::new(PasswordHasher::from_config(&config.security).unwrap()),
        UserValidator::from_config(&config.security),
    );

    let mut req = registration("weak@example.com");
    req.password = "weakpass".to_string();

    match service.create_user(req).await {
        Err(AppError::Validation { fields, .. }) => assert!(fields.contains_key("password")),
        other => panic!("expected validation error, got {:?}", other.map(|u| u.id)),
    }
}

#[tokio::test]
async fn test_storage_failure_is_generic_500() {
    let config = create_test_config();
    let pool = setup_test_db(&config).await;
    let state = AppState::with_store(config, pool, Arc::new(FailingStore))
        .await
        .unwrap();
    let app = routes::create_router(Arc::new(state));

    let response = common::post_json(
        &app,
        "/api/auth/login",
        json!({"email": "jane@example.com", "password": TEST_PASSWORD}),
    )
    .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body, json!({"error": "Internal server error"}));
}
