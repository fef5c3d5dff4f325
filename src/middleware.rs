//! HTTP 中间件
//! 应用状态、请求追踪、速率限制

use crate::{
    auth::{
        jwt::JwtService,
        password::{CredentialHasher, PasswordHasher},
    },
    config::{AppConfig, SecurityConfig},
    error::AppError,
    repository::{UserRepository, UserStore},
    services::{AuthService, UserService},
    validation::UserValidator,
};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use sqlx::SqlitePool;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

/// 应用状态
///
/// 所有服务在启动时显式构建并注入，处理器通过 `State<Arc<AppState>>` 获取
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: SqlitePool,
    pub auth_service: Arc<AuthService>,
    pub user_service: Arc<UserService>,
    pub jwt_service: Arc<JwtService>,
    pub rate_limiter: Arc<FixedWindowRateLimiter>,
    /// 进程启动时间，用于计算 uptime
    pub started_at: Instant,
}

impl AppState {
    /// 从配置和连接池构建应用状态
    pub async fn new(config: AppConfig, db: SqlitePool) -> Result<Self, AppError> {
        let store: Arc<dyn UserStore> = Arc::new(UserRepository::new(db.clone()));
        Self::with_store(config, db, store).await
    }

    /// 使用自定义凭据存储构建（测试中可替换为故障注入实现）
    pub async fn with_store(
        config: AppConfig,
        db: SqlitePool,
        store: Arc<dyn UserStore>,
    ) -> Result<Self, AppError> {
        let jwt_service = Arc::new(JwtService::from_config(&config)?);
        let hasher: Arc<dyn CredentialHasher> =
            Arc::new(PasswordHasher::from_config(&config.security)?);
        let validator = UserValidator::from_config(&config.security);

        let auth_service = Arc::new(
            AuthService::new(
                store.clone(),
                hasher.clone(),
                jwt_service.clone(),
                validator.clone(),
            )
            .await?,
        );
        let user_service = Arc::new(UserService::new(store, hasher, validator));
        let rate_limiter = Arc::new(FixedWindowRateLimiter::from_config(&config.security));

        Ok(Self {
            config,
            db,
            auth_service,
            user_service,
            jwt_service,
            rate_limiter,
            started_at: Instant::now(),
        })
    }
}

/// 请求追踪中间件
/// 为每个请求生成 request_id、提取或生成 trace_id，并记录指标
pub async fn request_tracking_middleware(req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(req.headers());
    let request_id = Uuid::new_v4().to_string();

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let span = tracing::info_span!(
        "http_request",
        trace_id = %trace_id,
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    async move {
        let start = Instant::now();

        let mut response = next.run(req).await;

        let elapsed = start.elapsed();
        let status = response.status().as_u16();

        metrics::counter!(
            "http_requests_total",
            "method" => method.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
        metrics::histogram!("http_request_duration_seconds").record(elapsed.as_secs_f64());

        tracing::info!(
            method = %method,
            path = %path,
            status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Request completed"
        );

        // 在响应头中回传追踪标识
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            headers.insert("x-trace-id", value);
        }
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            headers.insert("x-request-id", value);
        }

        response
    }
    .instrument(span)
    .await
}

/// 从请求头中提取或生成 trace_id
fn extract_or_generate_trace_id(headers: &HeaderMap) -> String {
    headers
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// 速率限制中间件
/// 按客户端 IP 计数，超出窗口预算返回 429
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.config.security.rate_limit_enabled {
        return Ok(next.run(req).await);
    }

    let client_ip = client_ip(&req, state.config.security.trust_proxy);

    if !state.rate_limiter.check(client_ip) {
        tracing::warn!(
            client_ip = %client_ip,
            path = %req.uri().path(),
            "Rate limit exceeded"
        );
        metrics::counter!("http_rate_limited_total").increment(1);
        return Err(AppError::RateLimitExceeded);
    }

    // 将 IP 添加到请求扩展，以便后续使用
    req.extensions_mut().insert(client_ip);

    Ok(next.run(req).await)
}

/// 获取客户端 IP 地址
/// 信任代理时优先读取代理头，其次取连接地址
///
/// 仅支持单层受信代理：取 X-Forwarded-For 最右侧的条目，即该代理实际看到的对端地址
pub fn client_ip(req: &Request, trust_proxy: bool) -> IpAddr {
    if trust_proxy {
        if let Some(ip) = ip_from_proxy_headers(req.headers()) {
            return ip;
        }
    }

    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip();
    }

    // 无连接信息（例如测试中直接调用 Router），归入回环地址
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn ip_from_proxy_headers(headers: &HeaderMap) -> Option<IpAddr> {
    // 左侧条目由客户端自行填写，不可信
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.rsplit(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok());

    forwarded.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
    })
}

// ==================== 限流服务 ====================

/// 单个 IP 的计数窗口
#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// IP 级别的固定窗口限流器
pub struct FixedWindowRateLimiter {
    windows: DashMap<IpAddr, Window>,
    max_requests: u32,
    window: Duration,
}

impl FixedWindowRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(
            config.rate_limit_max_requests,
            Duration::from_secs(config.rate_limit_window_secs),
        )
    }

    /// 记录一次请求，返回是否允许
    pub fn check(&self, ip: IpAddr) -> bool {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> bool {
        let mut entry = self.windows.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });

        // 窗口到期，重新计数
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count < self.max_requests {
            entry.count += 1;
            true
        } else {
            false
        }
    }

    /// 清理已过期的窗口，返回清理数量
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.window);
        before.saturating_sub(self.windows.len())
    }

    /// 当前跟踪的 IP 数量
    pub fn tracked_ips(&self) -> usize {
        self.windows.len()
    }
}
