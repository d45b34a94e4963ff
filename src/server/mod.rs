/// 监听循环
///
/// 接受连接，经过速率限制和连接闸门后为每个连接派生一个 worker 任务；
/// 被拒绝的连接直接关闭，不写任何字节
mod connection;

use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, ServerConfig};
use crate::gate::ConnectionGate;
use crate::handler::{create_handler, secs, ModeHandler};
use crate::rate_limiter::RateLimiter;
use crate::stats::ServerStats;
use connection::{handle_connection, WorkerSettings};

/// accept 出错后的退避时间
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// 已绑定端口的服务器
pub struct Server {
    listener: TcpListener,
    handler: Arc<dyn ModeHandler>,
    gate: ConnectionGate,
    rate_limiter: Option<RateLimiter>,
    stats: ServerStats,
    settings: WorkerSettings,
}

impl Server {
    /// 绑定监听地址
    pub async fn bind(config: &ServerConfig, handler: Arc<dyn ModeHandler>) -> Result<Self> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        let rate_limiter = config
            .rate_limit
            .clone()
            .map(RateLimiter::new)
            .transpose()?;
        if let Some(ref limiter) = rate_limiter {
            info!(
                "Rate limiting enabled: {}/s (burst {})",
                limiter.config().requests_per_second,
                limiter.config().burst_size
            );
        }

        Ok(Self {
            listener,
            handler,
            gate: ConnectionGate::new(config.max_connections),
            rate_limiter,
            stats: ServerStats::new(),
            settings: WorkerSettings {
                head_read: secs(config.timeouts.head_read_secs),
                io_idle: secs(config.timeouts.io_idle_secs),
                max_head_bytes: config.limits.max_head_bytes,
            },
        })
    }

    /// 实际监听的地址（端口 0 时由系统分配）
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    pub fn gate(&self) -> &ConnectionGate {
        &self.gate
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// 运行直到收到 Ctrl+C
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// 运行直到 `shutdown` 完成
    ///
    /// 停止接受新连接即返回，已派生的 worker 继续运行到结束
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        info!(
            "Serving {} mode on {} (max {} connections)",
            self.handler.name(),
            addr,
            self.gate.max_connections()
        );

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => self.dispatch(stream, peer),
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("Received shutdown signal, stopping server...");
                    break;
                }
            }
        }

        info!("Server stopped accepting connections");
        Ok(())
    }

    /// 准入检查并派生 worker；被拒绝的连接在这里 drop
    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        self.stats.record_accepted();

        if let Some(ref limiter) = self.rate_limiter {
            if let Err(wait_time) = limiter.check() {
                warn!(
                    "Rate limit exceeded, rejecting {} (retry after {:?})",
                    peer, wait_time
                );
                self.stats.record_rate_limited();
                return;
            }
        }

        let Some(slot) = self.gate.try_admit() else {
            warn!(
                "Connection limit reached ({}), rejecting {}",
                self.gate.max_connections(),
                peer
            );
            self.stats.record_rejected();
            return;
        };

        self.stats.record_admitted();
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
        }

        tokio::spawn(handle_connection(
            stream,
            peer,
            slot,
            Arc::clone(&self.handler),
            self.settings,
            self.stats.clone(),
        ));
    }
}

/// 按配置启动服务器，运行到 Ctrl+C，然后输出统计
pub async fn run_server(config: AppConfig) -> Result<()> {
    let handler = create_handler(&config.mode, &config.server);
    let server = Server::bind(&config.server, handler).await?;
    let stats = server.stats().clone();

    info!("Waiting for connections... (Press Ctrl+C to stop)");
    server.run().await?;

    match stats.to_json() {
        Ok(json) => info!("Final statistics: {}", json),
        Err(e) => warn!("Failed to serialize statistics: {}", e),
    }
    Ok(())
}
