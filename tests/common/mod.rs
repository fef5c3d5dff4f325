//! 测试公共模块
//! 提供测试辅助函数和测试工具
#![allow(dead_code)]

use account_service::{
    config::{AppConfig, DatabaseConfig, LoggingConfig, SecurityConfig, ServerConfig},
    db,
    middleware::AppState,
    routes,
};
use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use secrecy::Secret;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "test-secret-key-for-testing-only-min-32-chars";
pub const TEST_PASSWORD: &str = "Secret1!";

/// 创建测试配置
/// 内存数据库、低成本 Argon2 参数、关闭限流
pub fn create_test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            addr: "127.0.0.1:0".to_string(), // 使用随机端口
            max_body_bytes: 64 * 1024,
        },
        database: DatabaseConfig {
            url: Secret::new("sqlite::memory:".to_string()),
            max_connections: 1,
            min_connections: 1,
            acquire_timeout_secs: 5,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
        security: SecurityConfig {
            jwt_secret: Secret::new(TEST_JWT_SECRET.to_string()),
            access_token_exp_secs: 900,
            refresh_token_exp_secs: 604800,
            password_min_length: 6,
            password_require_uppercase: true,
            password_require_digit: true,
            password_require_special: true,
            password_hash_memory_kib: 1024,
            password_hash_iterations: 1,
            password_hash_parallelism: 1,
            rate_limit_enabled: false,
            rate_limit_max_requests: 60,
            rate_limit_window_secs: 60,
            trust_proxy: false,
        },
    }
}

/// 初始化测试数据库（每次调用都是独立的内存库）
pub async fn setup_test_db(config: &AppConfig) -> SqlitePool {
    let pool = db::create_pool(&config.database)
        .await
        .expect("Failed to create test database pool");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// 创建测试应用状态
pub async fn create_test_app_state(config: AppConfig) -> Arc<AppState> {
    let pool = setup_test_db(&config).await;
    Arc::new(
        AppState::new(config, pool)
            .await
            .expect("Failed to build app state"),
    )
}

/// 使用默认测试配置创建路由
pub async fn create_test_app() -> Router {
    create_test_app_with(create_test_config()).await
}

pub async fn create_test_app_with(config: AppConfig) -> Router {
    routes::create_router(create_test_app_state(config).await)
}

/// 测试响应
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// 发送请求并解析 JSON 响应体（空响应体解析为 Null）
pub async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            panic!("response body is not JSON: {}", String::from_utf8_lossy(&bytes))
        })
    };

    TestResponse {
        status,
        headers,
        body,
    }
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> TestResponse {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn get(app: &Router, uri: &str, bearer: Option<&str>) -> TestResponse {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

pub fn registration(name: &str, email: &str) -> Value {
    json!({
        "name": name,
        "email": email,
        "password": TEST_PASSWORD,
        "hobby": "climbing",
    })
}

/// 注册用户并返回完整响应体
pub async fn register_user(app: &Router, name: &str, email: &str) -> Value {
    let response = post_json(app, "/api/auth/register", registration(name, email)).await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    response.body
}
