/// 模式处理器
///
/// 请求头解析完成后，由进程启动时选定的处理器（代理或静态文件）完成
/// 具体动作并写出响应
mod proxy;
mod static_files;

pub use proxy::ProxyHandler;
pub use static_files::StaticHandler;

use async_trait::async_trait;
use http::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::{ModeConfig, ServerConfig};
use crate::error::Result;
use crate::protocol::{HeadPolicy, ParsedRequest};

/// 客户端连接：带缓冲的读端加写端
///
/// 请求头解析后剩余的请求体字节仍在缓冲区中
pub trait ClientConn: AsyncBufRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncBufRead + AsyncWrite + Unpin + Send> ClientConn for T {}

/// 模式处理器 trait
#[async_trait]
pub trait ModeHandler: Send + Sync {
    /// 处理器名称（用于日志）
    fn name(&self) -> &'static str;

    /// 解析请求头时使用的策略
    fn head_policy(&self) -> HeadPolicy;

    /// 处理一个请求并写出响应，返回发给客户端的状态码
    ///
    /// 返回 Err 时如果错误带有状态码，调用方负责写出错误响应
    async fn handle(&self, request: ParsedRequest, conn: &mut dyn ClientConn)
        -> Result<StatusCode>;
}

/// I/O 截止时间，0 表示不限制
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadlines {
    pub connect: Option<Duration>,
    pub io_idle: Option<Duration>,
}

impl Deadlines {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            connect: secs(config.timeouts.connect_secs),
            io_idle: secs(config.timeouts.io_idle_secs),
        }
    }
}

pub(crate) fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

/// 给一个 I/O future 加上可选的截止时间，超时映射为 `TimedOut`
pub(crate) async fn with_deadline<F, T>(deadline: Option<Duration>, fut: F) -> std::io::Result<T>
where
    F: std::future::Future<Output = std::io::Result<T>>,
{
    match deadline {
        Some(duration) => match tokio::time::timeout(duration, fut).await {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("operation timed out after {:?}", duration),
            )),
        },
        None => fut.await,
    }
}

/// 数据复制缓冲区大小
const COPY_BUFFER_SIZE: usize = 16 * 1024;

/// 带空闲超时的数据复制
///
/// 每次读和写都单独计时；`copied` 实时累加，出错时调用方仍能知道已复制的字节数
pub(crate) async fn copy_with_idle_timeout<R, W>(
    reader: &mut R,
    writer: &mut W,
    idle: Option<Duration>,
    copied: &mut u64,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];

    loop {
        let n = with_deadline(idle, reader.read(&mut buf)).await?;
        if n == 0 {
            break;
        }
        with_deadline(idle, writer.write_all(&buf[..n])).await?;
        *copied += n as u64;
    }

    with_deadline(idle, writer.flush()).await
}

/// 根据配置创建处理器
pub fn create_handler(mode: &ModeConfig, server: &ServerConfig) -> Arc<dyn ModeHandler> {
    let deadlines = Deadlines::from_config(server);
    match mode {
        ModeConfig::Proxy(_) => Arc::new(ProxyHandler::new(
            deadlines,
            server.limits.max_upstream_head_bytes,
        )),
        ModeConfig::Static(config) => Arc::new(StaticHandler::new(
            config.root.clone(),
            deadlines,
            server.limits.max_body_bytes,
        )),
    }
}
