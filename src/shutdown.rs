//! 优雅退出管理模块
//!
//! 提供跨平台的信号处理和优雅退出协调机制：
//! 信号、HTTP 端点与致命错误三类触发源都汇入同一个协调器，
//! 保证整个进程生命周期内最多执行一次退出流程。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Notify, broadcast};
use tracing::{debug, info, warn};

/// 退出触发源
///
/// 仅用于日志与退出码决策，不改变退出流程本身。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// 用户中断信号 (SIGINT / Ctrl+C)
    Interrupt,
    /// 终止信号 (SIGTERM)
    Terminate,
    /// HTTP `/shutdown` 端点触发
    HttpRequest,
    /// 未处理的致命错误
    Fatal,
}

impl ShutdownTrigger {
    /// 进程退出码：正常优雅退出为 0，致命错误触发的退出为 1
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownTrigger::Fatal => 1,
            _ => 0,
        }
    }
}

/// 优雅退出管理器
///
/// 状态机只有 `Running -> ShuttingDown` 一条单向转换，
/// 由实例持有的原子标志（而非进程级全局变量）通过 CAS 保证恰好发生一次。
#[derive(Debug, Clone)]
pub struct ShutdownManager {
    /// 内部状态
    inner: Arc<ShutdownInner>,
}

#[derive(Debug)]
struct ShutdownInner {
    /// 退出信号通知器
    notify: Notify,
    /// 退出触发源广播通道
    trigger_tx: broadcast::Sender<ShutdownTrigger>,
    /// 胜出的触发源（用于先触发后等待的场景）
    winner: std::sync::Mutex<Option<ShutdownTrigger>>,
    /// 是否已经开始优雅退出
    shutting_down: AtomicBool,
}

impl ShutdownManager {
    /// 创建新的优雅退出管理器
    pub fn new() -> Self {
        let (trigger_tx, _) = broadcast::channel(16);

        Self {
            inner: Arc::new(ShutdownInner {
                notify: Notify::new(),
                trigger_tx,
                winner: std::sync::Mutex::new(None),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    /// 触发优雅退出（幂等）
    ///
    /// 第一个调用者完成 `Running -> ShuttingDown` 转换并唤醒所有等待者，
    /// 返回 `true`；其后任何线程、任何触发源的调用都只记录一条警告日志，
    /// 无副作用地返回 `false`。
    pub fn trigger_shutdown(&self, trigger: ShutdownTrigger) -> bool {
        // CAS 保证检查与置位对所有触发源原子
        let won = self
            .inner
            .shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();

        if !won {
            warn!("退出流程已在进行，忽略重复触发: {:?}", trigger);
            return false;
        }

        info!("触发优雅退出: {:?}", trigger);

        // 先记录胜出触发源，再唤醒等待者，避免唤醒后读到空值
        if let Ok(mut guard) = self.inner.winner.lock() {
            *guard = Some(trigger);
        }

        // 广播给订阅者（尚无订阅者时属正常情况）
        if let Err(e) = self.inner.trigger_tx.send(trigger) {
            debug!("退出触发源无订阅者: {}", e);
        }

        // 通知所有等待者
        self.inner.notify.notify_waiters();
        true
    }

    /// 等待退出信号
    ///
    /// 通过 `Notify` 挂起而非轮询；若退出已触发则立即返回胜出触发源。
    pub async fn wait_for_shutdown(&self) -> ShutdownTrigger {
        let mut notified = std::pin::pin!(self.inner.notify.notified());
        // 先注册等待，再检查状态，避免在检查与挂起之间丢失唤醒
        notified.as_mut().enable();
        if self.is_shutting_down() {
            return self.winner();
        }
        notified.await;
        self.winner()
    }

    /// 检查是否正在关闭
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// 创建退出触发源接收器，用于其他组件监听退出事件
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownTrigger> {
        self.inner.trigger_tx.subscribe()
    }

    fn winner(&self) -> ShutdownTrigger {
        self.inner
            .winner
            .lock()
            .ok()
            .and_then(|guard| *guard)
            .unwrap_or(ShutdownTrigger::Fatal)
    }

    /// 启动信号处理器
    ///
    /// 在 Linux/macOS 上监听 SIGINT 和 SIGTERM，在 Windows 上监听 Ctrl+C。
    /// 处理器只翻转触发标志，清理工作始终在等待方执行。
    pub async fn start_signal_handler(&self) -> Result<(), ShutdownError> {
        #[cfg(unix)]
        {
            self.start_unix_signal_handler().await
        }

        #[cfg(windows)]
        {
            self.start_windows_signal_handler().await
        }
    }

    #[cfg(unix)]
    async fn start_unix_signal_handler(&self) -> Result<(), ShutdownError> {
        use tokio::signal::unix::{SignalKind, signal};

        info!("启动Unix信号处理器");

        // 创建SIGINT处理器 (Ctrl+C)
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| ShutdownError::SignalSetup(e.to_string()))?;

        // 创建SIGTERM处理器
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| ShutdownError::SignalSetup(e.to_string()))?;

        let manager = self.clone();

        // 常驻监听任务：重复到达的信号进入 trigger_shutdown 的幂等路径，
        // 被记录为"忽略重复触发"而不是开启第二次退出流程
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    // SIGINT信号 (Ctrl+C)
                    _ = sigint.recv() => {
                        info!("接收到SIGINT信号 (Ctrl+C)");
                        manager.trigger_shutdown(ShutdownTrigger::Interrupt);
                    }
                    // SIGTERM信号
                    _ = sigterm.recv() => {
                        info!("接收到SIGTERM信号");
                        manager.trigger_shutdown(ShutdownTrigger::Terminate);
                    }
                }
            }
        });

        Ok(())
    }

    #[cfg(windows)]
    async fn start_windows_signal_handler(&self) -> Result<(), ShutdownError> {
        info!("启动Windows信号处理器");

        let manager = self.clone();

        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("监听Ctrl+C信号失败: {}", e);
                    return;
                }

                info!("接收到Ctrl+C信号");
                manager.trigger_shutdown(ShutdownTrigger::Interrupt);
            }
        });

        Ok(())
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 优雅退出错误类型
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    /// 信号处理器注册失败
    #[error("信号设置失败: {0}")]
    SignalSetup(String),

    /// 优雅关闭未能在期限内完成
    #[error("优雅退出超时")]
    Timeout,

    /// 资源清理失败
    #[error("资源清理失败: {0}")]
    Cleanup(String),
}
