use std::sync::Arc;

use crate::shutdown::ShutdownManager;
use crate::store::StoreClient;

/// 聚合的应用共享状态
#[derive(Clone)]
pub struct AppState {
    /// 优雅退出管理器，供 `/shutdown` 端点触发退出
    pub shutdown: ShutdownManager,
    /// 文档存储客户端（跨请求只读共享）
    pub store: Arc<StoreClient>,
}
