//! 文档存储客户端模块（接口边界）
//!
//! 生命周期核心只依赖该客户端的三段式契约：启动时 connect、
//! 请求处理期间按 scope/collection 取句柄（跨任务只读共享）、
//! 退出流程中 close。存储引擎本身不属于本服务的范围，
//! 此处以进程内实现承载同样的接口与生命周期语义。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::StoreConfig;

/// 文档存储错误类型
#[derive(Error, Debug)]
pub enum StoreError {
    /// 存储配置无效
    #[error("存储配置无效: {0}")]
    InvalidConfig(String),

    /// 连接已关闭
    #[error("存储连接已关闭")]
    Closed,
}

/// 文档存储客户端
///
/// 连接在启动时建立一次，随后跨请求处理任务只读共享（`Arc`）。
#[derive(Debug)]
pub struct StoreClient {
    host: String,
    bucket: String,
    collections: RwLock<HashMap<String, Collection>>,
    closed: AtomicBool,
}

/// 单个集合的句柄
#[derive(Debug, Clone)]
pub struct Collection {
    name: String,
    docs: Arc<RwLock<HashMap<String, Value>>>,
}

impl StoreClient {
    /// 建立存储连接
    ///
    /// 配置校验失败是启动阶段的致命错误，由组合根中止进程。
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        if config.host.is_empty() {
            return Err(StoreError::InvalidConfig("host 不能为空".to_string()));
        }
        if config.user.is_empty() {
            return Err(StoreError::InvalidConfig("user 不能为空".to_string()));
        }
        if config.bucket.is_empty() {
            return Err(StoreError::InvalidConfig("bucket 不能为空".to_string()));
        }

        info!("已连接文档存储: {} (bucket: {})", config.host, config.bucket);

        Ok(Self {
            host: config.host.clone(),
            bucket: config.bucket.clone(),
            collections: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// 存储集群地址
    pub fn host(&self) -> &str {
        &self.host
    }

    /// 获取指定 scope 下的集合句柄（不存在时创建）
    pub async fn collection(&self, scope: &str, name: &str) -> Result<Collection, StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }

        let key = format!("{scope}.{name}");
        {
            let guard = self.collections.read().await;
            if let Some(c) = guard.get(&key) {
                return Ok(c.clone());
            }
        }

        let mut guard = self.collections.write().await;
        let collection = guard
            .entry(key.clone())
            .or_insert_with(|| Collection {
                name: key,
                docs: Arc::new(RwLock::new(HashMap::new())),
            })
            .clone();
        Ok(collection)
    }

    /// 获取默认集合
    pub async fn default_collection(&self) -> Result<Collection, StoreError> {
        self.collection("_default", "_default").await
    }

    /// 关闭存储连接（幂等）
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            warn!("存储连接已关闭，忽略重复关闭");
            return;
        }
        self.collections.write().await.clear();
        info!("文档存储连接已关闭");
    }
}

impl Collection {
    /// 集合全名（scope.name）
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 读取文档
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.docs.read().await.get(key).cloned()
    }

    /// 写入或覆盖文档
    pub async fn upsert(&self, key: &str, doc: Value) {
        self.docs.write().await.insert(key.to_string(), doc);
    }

    /// 删除文档，返回是否存在
    pub async fn remove(&self, key: &str) -> bool {
        self.docs.write().await.remove(key).is_some()
    }
}
