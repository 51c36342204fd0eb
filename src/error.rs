use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 应用统一错误类型（面向 HTTP 响应）
#[derive(Error, Debug)]
pub enum AppError {
    /// 请求超时（事后判定，处理器已执行完毕）
    #[error("The request took too long to process")]
    RequestTimeout,

    /// 内部服务器错误
    #[error("{0}")]
    Internal(String),
}

/// 启动阶段致命错误
///
/// 任何启动失败都会中止进程（退出码 1），不会留下半初始化状态。
#[derive(Error, Debug)]
pub enum StartupError {
    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    Config(#[from] config::ConfigError),

    /// 监听地址无法解析
    #[error("监听地址无法解析: {0}")]
    InvalidAddr(String),

    /// 监听地址绑定失败（端口占用、权限不足等）
    #[error("监听地址绑定失败 {addr}: {source}")]
    Bind {
        /// 目标地址
        addr: String,
        /// 底层 I/O 错误
        #[source]
        source: std::io::Error,
    },

    /// 文档存储连接失败
    #[error("文档存储连接失败: {0}")]
    Store(#[from] crate::store::StoreError),

    /// 信号处理器启动失败
    #[error("信号处理器启动失败: {0}")]
    Signal(#[from] crate::shutdown::ShutdownError),
}

/// 结构化错误响应体
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// 错误概要
    pub error: String,
    /// 人类可读的详细信息
    pub message: String,
    /// 可选：请求追踪 ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            AppError::RequestTimeout => "Request timed out",
            AppError::Internal(_) => "Internal server error",
        }
    }

    /// 渲染为结构化错误响应，附带请求追踪 ID
    pub fn into_response_with_request_id(self, request_id: Option<String>) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.summary().to_string(),
            message: self.to_string(),
            request_id,
        };
        let mut res = Json(body).into_response();
        *res.status_mut() = status;
        res
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.into_response_with_request_id(None)
    }
}
