/// 统一错误处理模块
pub mod error;

/// 配置模块
pub mod config;

/// 优雅退出管理模块
pub mod shutdown;

/// 服务器生命周期模块
pub mod server;

/// 请求计时中间件模块
pub mod timing;

/// HTTP 接口模块
pub mod api;

/// 文档存储客户端模块（接口边界）
pub mod store;

/// 应用状态聚合模块
pub mod state;

// 导出常用类型供外部使用
pub use config::AppConfig;
pub use error::{AppError, StartupError};
pub use server::{ServerHandle, ServerRunner};
pub use shutdown::{ShutdownError, ShutdownManager, ShutdownTrigger};
pub use store::StoreClient;
