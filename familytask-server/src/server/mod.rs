mod account;
mod acl;
pub mod auth;
pub mod checkout;
mod config;
mod family;
mod notifications;
mod rewards;
mod tasks;

use std::collections::HashMap;
use std::sync::Arc;

use crate::server::auth::AuthCtx;
use crate::storage::{MemoryTaskRepo, Store, StorageError, TaskRepo};
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::response::Response as AxumResponse;
use axum::{
    Json, Router,
    http::{Method, StatusCode, header},
    routing::{get, post},
};
use chrono::{DateTime, NaiveDateTime, Utc};
pub use config::{AppConfig, CheckoutConfig, RegistrationConfig, TaskStoreKind};
use familytask_shared::api;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Span, info_span};
use uuid::Uuid;

type BalanceCacheMap = Arc<Mutex<HashMap<String, Arc<Mutex<Option<i64>>>>>>;
type BalanceGuard<'a> = MutexGuard<'a, Option<i64>>;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Store,
    pub tasks: Arc<dyn TaskRepo>,
    checkout: Option<checkout::CheckoutClient>,
    // Cached point balance per child. None => needs recompute
    balances: BalanceCacheMap,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig, store: Store) -> Self {
        let tasks: Arc<dyn TaskRepo> = match config.task_store {
            TaskStoreKind::Sqlite => Arc::new(store.clone()),
            TaskStoreKind::Memory => Arc::new(MemoryTaskRepo::with_ledger(store.clone())),
        };
        let checkout = match config.checkout.clone().filter(|c| c.is_ready()) {
            Some(cfg) => match checkout::CheckoutClient::new(cfg) {
                Ok(c) => Some(c),
                Err(e) => {
                    tracing::error!(error=%e, "checkout: client init failed; payments disabled");
                    None
                }
            },
            None => None,
        };
        Self {
            config,
            store,
            tasks,
            checkout,
            balances: Default::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Replaces the task repository chosen from config.
    pub fn with_task_repo(mut self, tasks: Arc<dyn TaskRepo>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    async fn child_mutex(&self, child_id: &str) -> Arc<Mutex<Option<i64>>> {
        let mut map = self.balances.lock().await;
        map.entry(child_id.to_string())
            .or_insert_with(Default::default)
            .clone()
    }

    fn reset_balance(&self, guard: &mut BalanceGuard<'_>) {
        guard.take();
    }

    async fn points_balance(
        &self,
        child_id: &str,
        guard: &mut BalanceGuard<'_>,
    ) -> Result<i64, AppError> {
        if let Some(v) = **guard {
            return Ok(v);
        }
        let v = self
            .store
            .points_balance(child_id)
            .await
            .map_err(AppError::internal)?;
        **guard = Some(v);
        Ok(v)
    }
}

#[derive(Clone, Debug)]
struct ReqId(pub String);

pub fn router(state: AppState) -> Router {
    let private = Router::new()
        .route("/api/auth/logout", post(account::api_logout))
        .route(
            "/api/profile",
            get(account::api_get_profile).put(account::api_update_profile),
        )
        .route("/api/check-premium", get(account::api_check_premium))
        .route("/api/checkout", post(checkout::api_checkout))
        .route("/api/family/create", post(family::api_create_family))
        .route("/api/family/link-child", post(family::api_link_child))
        .route("/api/family/link-parent", post(family::api_link_parent))
        .route("/api/family/members", get(family::api_family_members))
        .route(
            "/api/tasks",
            get(tasks::api_list_tasks)
                .post(tasks::api_create_task)
                .put(tasks::api_update_task),
        )
        .route(
            "/api/rewards",
            get(rewards::api_list_rewards).post(rewards::api_create_reward),
        )
        .route("/api/rewards/{id}/redeem", post(rewards::api_redeem_reward))
        .route("/api/redemptions", get(rewards::api_list_redemptions))
        .route("/api/children/{id}/points", get(rewards::api_child_points))
        .route("/api/notifications", get(notifications::api_list_notifications))
        .route(
            "/api/notifications/count",
            get(notifications::api_notification_count),
        )
        .route(
            "/api/notifications/read-all",
            post(notifications::api_mark_all_read),
        )
        .route(
            "/api/notifications/{id}/read",
            post(notifications::api_mark_read),
        )
        .with_state(state.clone())
        .layer(middleware::from_fn(set_auth_span_fields))
        .layer(middleware::from_fn(acl::enforce_acl))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    // Trace with request context (method, path, request_id)
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let request_id = req
            .extensions()
            .get::<ReqId>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %request_id,
            user_id = tracing::field::Empty,
            role = tracing::field::Empty
        )
    });

    let app = Router::new()
        .route("/api/health", get(api_health))
        .route("/api/auth/login", post(account::api_login))
        .route("/api/auth/register", post(account::api_register))
        .route(
            "/api/check-registration-limit",
            get(account::api_check_registration_limit),
        )
        .route("/api/family/validate", post(family::api_validate_family))
        .route(
            "/api/admin/notifications",
            post(notifications::api_admin_insert_notification),
        )
        .merge(private)
        .fallback(not_found)
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(add_security_headers))
        .layer(middleware::from_fn(add_request_id));

    // Optionally add CORS for dev if configured

    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
        app.layer(cors)
    } else {
        app
    }
}

async fn api_health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<api::HealthDto> {
    let database = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error=%e, "health: database ping failed");
            false
        }
    };
    let checks = api::HealthChecks {
        database,
        jwt_secret: !state.config.jwt_secret.trim().is_empty(),
        service_role_key: state.config.has_service_role_key(),
        payments: state.checkout.is_some(),
    };
    let status = if checks.database && checks.jwt_secret {
        "ok"
    } else {
        "degraded"
    };
    Json(api::HealthDto {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks,
    })
}

async fn not_found() -> AppError {
    AppError::not_found("not found")
}

async fn add_request_id(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let hdr = HeaderName::from_static("x-request-id");
    // Use provided x-request-id if present, else generate
    let rid = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(ReqId(rid.clone()));
    let mut resp = next.run(req).await;
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(hdr, hv);
    }
    Ok(resp)
}

async fn add_security_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let path = req.uri().path().to_string();
    let mut resp = next.run(req).await;

    let headers = resp.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("same-origin"),
    );
    // HSTS is only honored on HTTPS; harmless otherwise
    headers.insert(
        HeaderName::from_static("strict-transport-security"),
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );

    // API responses carry per-user data
    if path.starts_with("/api/") || path == "/api" {
        headers.insert(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
        );
        headers.insert(
            HeaderName::from_static("pragma"),
            HeaderValue::from_static("no-cache"),
        );
    }

    Ok(resp)
}

async fn set_auth_span_fields(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    if let Some(auth) = req.extensions().get::<AuthCtx>() {
        let span = Span::current();
        span.record("user_id", tracing::field::display(auth.user_id()));
        span.record("role", tracing::field::display(auth.role()));
    }
    Ok(next.run(req).await)
}

/// Pages start at 1.
struct PageOpts {
    page: Option<usize>,
    per_page: Option<usize>,
}

impl PageOpts {
    fn resolve(&self) -> (usize, usize) {
        (self.page.unwrap_or(1), self.per_page.unwrap_or(20))
    }
}

fn rfc3339(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

/// A present, non-blank string field, trimmed.
fn required(field: &str, value: Option<String>) -> Result<String, AppError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::bad_request(format!("{field} is required"))),
    }
}

/// Blank strings count as absent.
fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    Forbidden,
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl AppError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        Self::BadRequest(msg.into())
    }
    fn unauthorized() -> Self {
        Self::Unauthorized
    }
    fn forbidden() -> Self {
        Self::Forbidden
    }
    fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidInput(m) | StorageError::Conflict(m) => AppError::BadRequest(m),
            StorageError::NotFound(what) => AppError::NotFound(format!("{what} not found")),
            StorageError::CapacityExceeded(_) => {
                AppError::BadRequest("family already has the maximum number of parents".into())
            }
            other => AppError::internal(other),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, kind, detail) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m, "bad_request", None),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized".into(),
                "unauthorized",
                None,
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".into(), "forbidden", None),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, "not_found", None),
            AppError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m, "unavailable", None),
            // Do not leak internal error details to clients, but log them
            AppError::Internal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
                "internal",
                Some(m),
            ),
        };
        if let Some(detail) = detail {
            tracing::error!(status = %status, kind = kind, message = %msg, detail = %detail, "request failed");
        } else {
            tracing::error!(status = %status, kind = kind, message = %msg, "request failed");
        }
        let body = axum::Json(ErrorBody { error: msg });
        (status, body).into_response()
    }
}
