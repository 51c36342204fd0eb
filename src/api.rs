//! HTTP 接口模块
//!
//! 路由处理器本身没有业务复杂度，生命周期语义集中在
//! `/shutdown`：同步返回确认响应，实际退出流程异步执行。

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::shutdown::ShutdownTrigger;
use crate::state::AppState;

/// 通用消息响应
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// 响应内容
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// `GET /` 固定问候
pub async fn index() -> (StatusCode, Json<MessageResponse>) {
    debug!("Processing request to index endpoint");
    (StatusCode::OK, Json(MessageResponse::new("Hello, World!")))
}

/// `GET /health-check` 探活端点
pub async fn health_check() -> (StatusCode, Json<MessageResponse>) {
    debug!("Health check requested");
    (StatusCode::OK, Json(MessageResponse::new("OK!")))
}

/// `POST /shutdown` 触发优雅退出
///
/// 无论是否胜出都同步返回确认；重复触发由管理器记录并忽略。
pub async fn shutdown(State(state): State<AppState>) -> (StatusCode, Json<MessageResponse>) {
    warn!("Shutdown requested via endpoint");
    state.shutdown.trigger_shutdown(ShutdownTrigger::HttpRequest);
    (
        StatusCode::OK,
        Json(MessageResponse::new("Server shutting down...")),
    )
}

/// 构建对外 HTTP 路由
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/health-check", get(health_check))
        .route("/shutdown", post(shutdown))
}
