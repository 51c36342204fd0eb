//! 请求计时中间件模块
//!
//! 为每个请求记录起始时刻，在响应返回前计算耗时并分类：
//! 超过配置阈值的请求以 408 响应覆盖原响应并记录 error 日志，
//! 其余请求原样透传并记录 info 日志。
//!
//! 注意这是事后（post-hoc）超时：判定发生时处理器已经执行完毕，
//! 它报告慢请求而不会抢占式地中断处理。

use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::AppError;

/// 计时中间件状态
#[derive(Debug, Clone)]
pub struct TimingState {
    /// 请求超时阈值
    pub request_timeout: Duration,
}

/// 计时中间件：记录每次 HTTP 请求的耗时并按阈值分类
pub async fn timing_middleware(
    State(state): State<TimingState>,
    req: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let request_id = resolve_request_id(req.headers());

    info!("Incoming {} request to {} [{}]", method, uri, request_id);

    // 透传；处理器内的错误已在此之前转换为响应
    let res = next.run(req).await;
    let elapsed = started.elapsed();

    let mut res = if elapsed > state.request_timeout {
        error!(
            "Request timeout: {} {} ({:.2}s) [{}]",
            method,
            uri,
            elapsed.as_secs_f64(),
            request_id
        );
        AppError::RequestTimeout.into_response_with_request_id(Some(request_id.clone()))
    } else {
        info!(
            "Request completed: {} ({:.2}s) [{}]",
            res.status(),
            elapsed.as_secs_f64(),
            request_id
        );
        res
    };

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        res.headers_mut().insert("x-request-id", value);
    }

    res
}

fn is_valid_request_id(v: &str) -> bool {
    !v.is_empty()
        && v.len() <= 128
        && v.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
}

/// 优先透传客户端传入的 `X-Request-Id`，缺失或非法时服务端生成
fn resolve_request_id(headers: &axum::http::HeaderMap) -> String {
    if let Some(raw) = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        && is_valid_request_id(raw)
    {
        return raw.to_string();
    }
    format!("req_{}", Uuid::new_v4().simple())
}
