/// 正向代理处理器
///
/// 一次性中转：一个客户端请求、一个上游连接、一个响应，然后两端都关闭。
/// 不重试，不复用连接
use async_trait::async_trait;
use http::StatusCode;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::{copy_with_idle_timeout, with_deadline, ClientConn, Deadlines, ModeHandler};
use crate::error::{Result, ServeError};
use crate::limited_reader::LimitedReader;
use crate::protocol::{
    is_blank_line, read_response_head, BodyFraming, HeadPolicy, Method, ParsedRequest,
};

/// chunk 大小行的最大长度
const MAX_CHUNK_LINE: usize = 4096;

/// 代理模式处理器
#[derive(Debug, Clone)]
pub struct ProxyHandler {
    deadlines: Deadlines,
    /// 上游响应头的大小上限，独立于客户端请求头的限制
    max_upstream_head: usize,
}

impl ProxyHandler {
    pub fn new(deadlines: Deadlines, max_upstream_head: usize) -> Self {
        Self {
            deadlines,
            max_upstream_head,
        }
    }
}

#[async_trait]
impl ModeHandler for ProxyHandler {
    fn name(&self) -> &'static str {
        "proxy"
    }

    fn head_policy(&self) -> HeadPolicy {
        HeadPolicy::FullHead
    }

    async fn handle(
        &self,
        request: ParsedRequest,
        conn: &mut dyn ClientConn,
    ) -> Result<StatusCode> {
        if request.method != Method::Get {
            return Err(ServeError::UnsupportedMethod(request.method.to_string()));
        }

        let target = upstream_authority(&request).ok_or_else(|| {
            ServeError::dial_failure(
                request.target.clone(),
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "request does not name an upstream host",
                ),
            )
        })?;

        debug!("Dialing upstream {} for {}", target, request.target);

        let upstream = with_deadline(self.deadlines.connect, TcpStream::connect(&target))
            .await
            .map_err(|e| ServeError::dial_failure(&target, e))?;
        if let Err(e) = upstream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }
        let mut upstream = BufReader::new(upstream);

        // 原样转发请求行和头部
        with_deadline(
            self.deadlines.io_idle,
            upstream.get_mut().write_all(&request.raw_head),
        )
        .await
        .map_err(|source| ServeError::UpstreamWriteFailure {
            target: target.clone(),
            source,
        })?;

        let head = match with_deadline(
            self.deadlines.io_idle,
            read_response_head(&mut upstream, self.max_upstream_head),
        )
        .await
        {
            Ok(head) => head,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                return Err(ServeError::UpstreamTimeout {
                    target,
                    duration: self.deadlines.io_idle.unwrap_or_default(),
                });
            }
            Err(e) => return Err(ServeError::upstream_read(&target, e)),
        };

        debug!(
            "Upstream {} answered {} ({:?})",
            target, head.status, head.framing
        );

        with_deadline(self.deadlines.io_idle, conn.write_all(&head.raw))
            .await
            .map_err(ServeError::ClientIo)?;

        let mut sent = head.raw.len() as u64;
        relay_body(
            &mut upstream,
            conn,
            head.framing,
            self.deadlines,
            &mut sent,
        )
        .await
        .map_err(|e| ServeError::ResponseTruncated {
            sent,
            reason: e.to_string(),
        })?;

        info!(
            "Relayed {} from {} ({} bytes)",
            head.status.as_u16(),
            target,
            sent
        );
        Ok(head.status)
    }
}

/// 确定上游地址 `host:port`
///
/// 绝对形式的目标（`http://host/...`）优先，否则使用 Host 头，缺省端口 80
fn upstream_authority(request: &ParsedRequest) -> Option<String> {
    let url = if request.target.starts_with("http://") || request.target.starts_with("https://")
    {
        url::Url::parse(&request.target).ok()?
    } else {
        let host = request.header("host").filter(|h| !h.is_empty())?;
        url::Url::parse(&format!("http://{}", host)).ok()?
    };

    let host = url.host_str()?;
    let port = url.port_or_known_default().unwrap_or(80);
    Some(format!("{}:{}", host, port))
}

/// 按上游响应自身的分帧方式原样中转响应体
async fn relay_body<R, W>(
    upstream: &mut R,
    client: &mut W,
    framing: BodyFraming,
    deadlines: Deadlines,
    sent: &mut u64,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    match framing {
        BodyFraming::Empty => with_deadline(deadlines.io_idle, client.flush()).await,
        BodyFraming::Length(length) => {
            let mut body = upstream.take(length);
            let before = *sent;
            copy_with_idle_timeout(&mut body, client, deadlines.io_idle, sent).await?;
            expect_complete(*sent - before, length)
        }
        BodyFraming::Chunked => relay_chunked(upstream, client, deadlines, sent).await,
        BodyFraming::UntilClose => {
            copy_with_idle_timeout(upstream, client, deadlines.io_idle, sent).await
        }
    }
}

/// 中转 chunked 响应体，包括结尾的 trailer
async fn relay_chunked<R, W>(
    upstream: &mut R,
    client: &mut W,
    deadlines: Deadlines,
    sent: &mut u64,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    loop {
        let line = read_line(upstream, deadlines).await?;
        let size = parse_chunk_size(&line)?;
        with_deadline(deadlines.io_idle, client.write_all(&line)).await?;
        *sent += line.len() as u64;

        if size == 0 {
            // trailer 直到空行
            loop {
                let line = read_line(upstream, deadlines).await?;
                with_deadline(deadlines.io_idle, client.write_all(&line)).await?;
                *sent += line.len() as u64;
                if is_blank_line(&line) {
                    return with_deadline(deadlines.io_idle, client.flush()).await;
                }
            }
        }

        // 数据加结尾 CRLF
        let expected = size + 2;
        let mut chunk = (&mut *upstream).take(expected);
        let before = *sent;
        copy_with_idle_timeout(&mut chunk, client, deadlines.io_idle, sent).await?;
        expect_complete(*sent - before, expected)?;
    }
}

async fn read_line<R>(reader: &mut R, deadlines: Deadlines) -> io::Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut limited = LimitedReader::new(&mut *reader, MAX_CHUNK_LINE);
    let mut line = Vec::new();
    let n = with_deadline(deadlines.io_idle, limited.read_until(b'\n', &mut line)).await?;
    if n == 0 || !line.ends_with(b"\n") {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "upstream closed inside chunked body",
        ));
    }
    Ok(line)
}

fn parse_chunk_size(line: &[u8]) -> io::Result<u64> {
    let text = String::from_utf8_lossy(line);
    let size = text.split(';').next().unwrap_or_default().trim();
    u64::from_str_radix(size, 16).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("bad chunk size line: {:?}", text.trim_end()),
        )
    })
}

fn expect_complete(copied: u64, expected: u64) -> io::Result<()> {
    if copied < expected {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("upstream body ended after {} of {} bytes", copied, expected),
        ));
    }
    Ok(())
}
