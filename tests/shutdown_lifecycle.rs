use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use orbit_backend::api::create_api_router;
use orbit_backend::config::{ServerConfig, StoreConfig};
use orbit_backend::state::AppState;
use orbit_backend::{ServerRunner, ShutdownManager, ShutdownTrigger, StoreClient};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Barrier;

fn loopback_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        keep_alive_secs: 5,
    }
}

/// 并发竞争：混合触发源同时触发时必须恰好产生一个胜者
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mixed_triggers_have_exactly_one_winner() {
    let triggers = [
        ShutdownTrigger::Interrupt,
        ShutdownTrigger::Terminate,
        ShutdownTrigger::HttpRequest,
        ShutdownTrigger::Fatal,
    ];

    // 重复多轮以覆盖不同的交错顺序
    for _ in 0..200 {
        let manager = ShutdownManager::new();
        let barrier = Arc::new(Barrier::new(triggers.len()));

        let mut tasks = Vec::new();
        for trigger in triggers {
            let manager = manager.clone();
            let barrier = barrier.clone();
            tasks.push(tokio::spawn(async move {
                barrier.wait().await;
                manager.trigger_shutdown(trigger)
            }));
        }

        let mut winners = 0;
        for task in tasks {
            if task.await.expect("trigger task") {
                winners += 1;
            }
        }

        assert_eq!(winners, 1, "exactly one trigger must win");
        assert!(manager.is_shutting_down());

        // 胜出触发源必须是参与竞争的触发源之一
        let winner = manager.wait_for_shutdown().await;
        assert!(triggers.contains(&winner));
    }
}

/// 等待者先挂起、后触发，也必须被唤醒并得到胜出触发源
#[tokio::test]
async fn waiters_observe_single_transition() {
    let manager = ShutdownManager::new();

    let mut waiters = Vec::new();
    for _ in 0..8 {
        let m = manager.clone();
        waiters.push(tokio::spawn(async move { m.wait_for_shutdown().await }));
    }
    tokio::task::yield_now().await;

    manager.trigger_shutdown(ShutdownTrigger::Terminate);

    for waiter in waiters {
        let trigger = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter must wake")
            .expect("waiter join");
        assert_eq!(trigger, ShutdownTrigger::Terminate);
    }
}

/// 端到端：真实监听器上经 `/shutdown` 触发退出并在期限内关停
#[tokio::test]
async fn http_shutdown_drains_and_stops_within_deadline() {
    let shutdown = ShutdownManager::new();
    let store = Arc::new(
        StoreClient::connect(&StoreConfig::default())
            .await
            .expect("connect store"),
    );

    let runner = ServerRunner::bind(&loopback_config()).expect("bind");
    let addr = runner.addr();
    let app = create_api_router().with_state(AppState {
        shutdown: shutdown.clone(),
        store: store.clone(),
    });
    let handle = runner.start(app, &shutdown);

    // 原始 TCP 客户端发送 POST /shutdown
    let mut stream = tokio::net::TcpStream::connect(addr).await.expect("connect");
    stream
        .write_all(
            b"POST /shutdown HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await
        .expect("send request");

    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");

    // 确认响应同步返回；在途请求在关停开始后仍被完整送达
    assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
    assert!(response.contains("Server shutting down..."), "got: {response}");
    assert!(shutdown.is_shutting_down());

    handle
        .stop(Duration::from_secs(5))
        .await
        .expect("graceful stop within deadline");

    store.close().await;
}

/// 关停开始后监听器不再接受新连接
#[tokio::test]
async fn listener_refuses_new_connections_after_stop() {
    let shutdown = ShutdownManager::new();
    let runner = ServerRunner::bind(&loopback_config()).expect("bind");
    let addr = runner.addr();
    let router = axum::Router::new().route("/", get(|| async { "ok" }));
    let handle = runner.start(router, &shutdown);

    shutdown.trigger_shutdown(ShutdownTrigger::Terminate);
    handle
        .stop(Duration::from_secs(5))
        .await
        .expect("graceful stop");

    let refused = tokio::net::TcpStream::connect(addr).await;
    assert!(refused.is_err(), "listener must be closed after stop");
}
