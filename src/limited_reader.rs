/// 有限读取器模块
///
/// 解析请求头/响应头时限制可读取的字节数，防止超长头部耗尽内存。
/// 与 `take()` 不同，达到上限后返回错误而不是 EOF，调用方可以区分
/// "头部过长" 和 "对端提前关闭"
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncBufRead, AsyncRead, ReadBuf};

/// HTTP 头部最大大小（默认 8KB）
pub const DEFAULT_MAX_HEAD_SIZE: usize = 8 * 1024;

/// 上游响应头最大大小（默认 64KB），Set-Cookie 较多的响应也能通过
pub const DEFAULT_MAX_UPSTREAM_HEAD_SIZE: usize = 64 * 1024;

/// 有限读取器 - 包装一个带缓冲的读取器，只消费不超过 limit 字节
pub struct LimitedReader<R> {
    inner: R,
    remaining: usize,
    limit: usize,
}

impl<R> LimitedReader<R> {
    /// 创建新的有限读取器
    pub fn new(inner: R, limit: usize) -> Self {
        Self {
            inner,
            remaining: limit,
            limit,
        }
    }

    fn exhausted(&self) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            LimitExceeded { limit: self.limit },
        )
    }
}

/// 超过限制时放在 `io::Error` 里的负载，用于识别错误来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitExceeded {
    pub limit: usize,
}

impl std::fmt::Display for LimitExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "head size limit exceeded ({} bytes)", self.limit)
    }
}

impl std::error::Error for LimitExceeded {}

impl LimitExceeded {
    /// 从 io::Error 中取出限制信息
    pub fn from_io(err: &io::Error) -> Option<Self> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<LimitExceeded>())
            .copied()
    }
}

impl<R: AsyncBufRead + Unpin> AsyncRead for LimitedReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let available = match self.as_mut().poll_fill_buf(cx) {
            Poll::Ready(Ok(available)) => available,
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Pending => return Poll::Pending,
        };
        let n = available.len().min(buf.remaining());
        buf.put_slice(&available[..n]);
        self.consume(n);
        Poll::Ready(Ok(()))
    }
}

impl<R: AsyncBufRead + Unpin> AsyncBufRead for LimitedReader<R> {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        let this = self.get_mut();
        if this.remaining == 0 {
            return Poll::Ready(Err(this.exhausted()));
        }

        let remaining = this.remaining;
        match Pin::new(&mut this.inner).poll_fill_buf(cx) {
            Poll::Ready(Ok(available)) => {
                // 只暴露限制范围内的数据，其余留在内部缓冲区
                let n = available.len().min(remaining);
                Poll::Ready(Ok(&available[..n]))
            }
            other => other,
        }
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        let this = self.get_mut();
        let amt = amt.min(this.remaining);
        this.remaining -= amt;
        Pin::new(&mut this.inner).consume(amt);
    }
}
