/// 单个连接的处理流程：读请求头、交给模式处理器、写错误响应、关闭
use http::StatusCode;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::error::{Result, ServeError};
use crate::gate::ConnectionSlot;
use crate::handler::{with_deadline, ModeHandler};
use crate::protocol::{read_request, write_error, ParsedRequest};
use crate::stats::ServerStats;

/// 关闭前排空客户端输入的时长与字节上限
const LINGER_TIMEOUT: Duration = Duration::from_millis(500);
const LINGER_MAX_BYTES: u64 = 64 * 1024;

/// worker 使用的固定参数
#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkerSettings {
    pub head_read: Option<Duration>,
    pub io_idle: Option<Duration>,
    pub max_head_bytes: usize,
}

/// 处理一个已获准入的连接
///
/// `_slot` 在函数返回（或任务被取消）时 drop，归还闸门槽位
pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    _slot: ConnectionSlot,
    handler: Arc<dyn ModeHandler>,
    settings: WorkerSettings,
    stats: ServerStats,
) {
    let mut conn = BufReader::new(stream);

    let (summary, result) = match read_head(&mut conn, handler.as_ref(), settings).await {
        Ok(request) => {
            let summary = format!("{} {}", request.method, request.target);
            debug!("{} dispatching {} to {} handler", peer, summary, handler.name());
            (summary, handler.handle(request, &mut conn).await)
        }
        Err(e) => ("-".to_string(), Err(e)),
    };

    let status = match result {
        Ok(status) => {
            info!("{} \"{}\" {}", peer, summary, status.as_u16());
            Some(status)
        }
        Err(e) => respond_error(&mut conn, peer, &summary, e, settings).await,
    };

    // 无论哪种模式，连接都在这里关闭
    if let Err(e) = conn.get_mut().shutdown().await {
        debug!("{} shutdown error: {}", peer, e);
    }
    stats.record_completed(status);

    // 静态模式的 GET 不读头部块，成功响应后同样可能留有未读数据
    drain_input(&mut conn).await;
}

/// 读掉客户端未读完的数据；关闭时接收缓冲区非空会触发 RST，冲掉已写出的响应
async fn drain_input(conn: &mut BufReader<TcpStream>) {
    let mut sink = tokio::io::sink();
    let mut rest = (&mut *conn).take(LINGER_MAX_BYTES);
    let _ = tokio::time::timeout(LINGER_TIMEOUT, tokio::io::copy(&mut rest, &mut sink)).await;
}

async fn read_head(
    conn: &mut BufReader<TcpStream>,
    handler: &dyn ModeHandler,
    settings: WorkerSettings,
) -> Result<ParsedRequest> {
    let read = read_request(conn, handler.head_policy(), settings.max_head_bytes);
    match settings.head_read {
        Some(duration) => tokio::time::timeout(duration, read)
            .await
            .map_err(|_| ServeError::RequestTimeout { duration })?,
        None => read.await,
    }
}

/// 把错误映射为响应；返回实际写出的状态码，`None` 表示静默关闭
async fn respond_error(
    conn: &mut BufReader<TcpStream>,
    peer: SocketAddr,
    summary: &str,
    error: ServeError,
    settings: WorkerSettings,
) -> Option<StatusCode> {
    let Some(status) = error.status() else {
        debug!("{} \"{}\" closed without response: {}", peer, summary, error);
        return None;
    };

    if error.is_upstream() || error.is_timeout() {
        warn!("{} \"{}\" {}: {}", peer, summary, status.as_u16(), error);
    } else {
        info!("{} \"{}\" {}: {}", peer, summary, status.as_u16(), error);
    }

    match with_deadline(settings.io_idle, write_error(conn, status, "")).await {
        Ok(()) => Some(status),
        Err(e) => {
            debug!("{} failed to write {} response: {}", peer, status.as_u16(), e);
            None
        }
    }
}
