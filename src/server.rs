//! 服务器生命周期模块
//!
//! 负责 HTTP 监听器的构建、后台启动与关停：
//! 绑定失败视为致命的启动错误，优雅关停受配置的期限约束，
//! 超过期限后强制终止剩余连接。

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use axum::Router;
use socket2::{Domain, Protocol, Socket, TcpKeepalive, Type};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::StartupError;
use crate::shutdown::{ShutdownError, ShutdownManager, ShutdownTrigger};

/// 监听器积压队列长度
const LISTEN_BACKLOG: i32 = 1024;

/// HTTP 服务器运行器
///
/// `bind` 与 `start` 分离：绑定失败在启动阶段就能同步暴露，
/// 不会启动一个接不到流量的半初始化进程。
#[derive(Debug)]
pub struct ServerRunner {
    listener: TcpListener,
    addr: SocketAddr,
}

impl ServerRunner {
    /// 绑定监听地址并配置 TCP keep-alive
    pub fn bind(config: &ServerConfig) -> Result<Self, StartupError> {
        let target = format!("{}:{}", config.host, config.port);
        let addr = target
            .to_socket_addrs()
            .map_err(|_| StartupError::InvalidAddr(target.clone()))?
            .next()
            .ok_or_else(|| StartupError::InvalidAddr(target.clone()))?;

        let bind_err = |source: std::io::Error| StartupError::Bind {
            addr: target.clone(),
            source,
        };

        let domain = if addr.is_ipv6() {
            Domain::IPV6
        } else {
            Domain::IPV4
        };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(bind_err)?;
        socket.set_reuse_address(true).map_err(bind_err)?;
        // SO_KEEPALIVE + 空闲时间，空闲连接在超时后由传输层关闭
        socket
            .set_tcp_keepalive(&TcpKeepalive::new().with_time(config.keep_alive_duration()))
            .map_err(bind_err)?;
        socket.set_nonblocking(true).map_err(bind_err)?;
        socket.bind(&addr.into()).map_err(bind_err)?;
        socket.listen(LISTEN_BACKLOG).map_err(bind_err)?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener).map_err(bind_err)?;
        // 端口 0 时取回内核实际分配的端口
        let addr = listener.local_addr().map_err(bind_err)?;

        Ok(Self { listener, addr })
    }

    /// 实际绑定的地址（端口 0 时为内核分配的端口）
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// 在后台任务上启动服务器
    ///
    /// 调用方（进程主任务）保持空闲以等待退出信号；
    /// accept 循环的 I/O 错误作为致命错误汇入统一的退出流程。
    pub fn start(self, router: Router, shutdown: &ShutdownManager) -> ServerHandle {
        let addr = self.addr;
        let manager = shutdown.clone();
        let waiter = shutdown.clone();

        let task = tokio::spawn(async move {
            info!("服务器已启动: http://{}", addr);

            let graceful = axum::serve(self.listener, router).with_graceful_shutdown(async move {
                let trigger = waiter.wait_for_shutdown().await;
                info!("开始优雅关闭HTTP服务器 (触发源: {:?})", trigger);
            });

            if let Err(e) = graceful.await {
                error!("服务器运行错误: {}", e);
                manager.trigger_shutdown(ShutdownTrigger::Fatal);
            }
        });

        ServerHandle { addr, task }
    }
}

/// 活动监听器的句柄
///
/// 由 `ServerRunner::start` 创建，在退出流程中由 `stop` 回收。
pub struct ServerHandle {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// 监听地址
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// 等待服务器排空在途请求并退出，受 `deadline` 约束
    ///
    /// 期限内未完成时强制中止服务任务（关闭剩余连接）并返回
    /// [`ShutdownError::Timeout`]，保证退出流程永不悬挂。
    pub async fn stop(self, deadline: Duration) -> Result<(), ShutdownError> {
        let mut task = self.task;
        match tokio::time::timeout(deadline, &mut task).await {
            Ok(Ok(())) => {
                info!("服务器已优雅关闭");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("服务器任务异常退出: {}", e);
                Err(ShutdownError::Cleanup(e.to_string()))
            }
            Err(_) => {
                warn!("优雅关闭超时（{}s），强制关闭剩余连接", deadline.as_secs());
                task.abort();
                Err(ShutdownError::Timeout)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn from_task(addr: SocketAddr, task: JoinHandle<()>) -> Self {
        Self { addr, task }
    }
}
