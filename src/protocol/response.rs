/// 响应写出与上游响应头解析
use http::StatusCode;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::{find_header, is_blank_line, split_header_line};
use crate::limited_reader::LimitedReader;

/// 写出错误响应：状态行 + `Connection: close` + 空行
///
/// 只负责写字节，不关闭连接；连接由 worker 收尾时统一关闭
pub async fn write_error<W>(writer: &mut W, status: StatusCode, message: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let reason = if message.is_empty() {
        status.canonical_reason().unwrap_or("Unknown")
    } else {
        message
    };
    let head = format!(
        "HTTP/1.1 {} {}\r\nConnection: close\r\n\r\n",
        status.as_u16(),
        reason
    );
    writer.write_all(head.as_bytes()).await?;
    writer.flush().await
}

/// 成功响应的头部构造器
#[derive(Debug, Clone)]
pub struct ResponseHead {
    status: StatusCode,
    headers: Vec<(&'static str, String)>,
}

impl ResponseHead {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
        }
    }

    /// 200 OK
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// 追加一个头部
    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn content_type(self, mime: &str) -> Self {
        self.header("Content-Type", mime)
    }

    pub fn content_length(self, length: u64) -> Self {
        self.header("Content-Length", length.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// 序列化为字节，总是以 `Connection: close` 结尾
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {} {}\r\n",
            self.status.as_u16(),
            self.status.canonical_reason().unwrap_or("Unknown")
        );
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out.push_str("Connection: close\r\n\r\n");
        out.into_bytes()
    }

    /// 写到连接上
    pub async fn write_to<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        writer.write_all(&self.to_bytes()).await?;
        writer.flush().await
    }
}

/// 上游响应体的分帧方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// 没有响应体（1xx/204/304）
    Empty,
    /// 固定长度
    Length(u64),
    /// chunked 编码
    Chunked,
    /// 读到上游关闭为止
    UntilClose,
}

/// 解析后的上游响应头
#[derive(Debug, Clone)]
pub struct UpstreamHead {
    pub status: StatusCode,
    pub framing: BodyFraming,
    /// 状态行与头部块的原始字节
    pub raw: Vec<u8>,
}

/// 读取上游响应的状态行和头部
///
/// 格式错误以 `InvalidData` 返回，超长时错误中带有 `LimitExceeded`
pub async fn read_response_head<R>(reader: &mut R, max_head: usize) -> io::Result<UpstreamHead>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut limited = LimitedReader::new(reader, max_head);
    let mut raw = Vec::with_capacity(512);

    let n = limited.read_until(b'\n', &mut raw).await?;
    if n == 0 || !raw.ends_with(b"\n") {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed before status line",
        ));
    }
    let status = parse_status_line(&raw)?;

    let mut headers = Vec::new();
    loop {
        let start = raw.len();
        let n = limited.read_until(b'\n', &mut raw).await?;
        let line = &raw[start..];
        if n == 0 || !line.ends_with(b"\n") {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed inside response head",
            ));
        }
        if is_blank_line(line) {
            break;
        }
        if let Some(header) = split_header_line(line) {
            headers.push(header);
        }
    }

    let framing = body_framing(status, &headers)?;
    Ok(UpstreamHead {
        status,
        framing,
        raw,
    })
}

fn parse_status_line(line: &[u8]) -> io::Result<StatusCode> {
    let line = String::from_utf8_lossy(line);
    let mut parts = line.split_whitespace();
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(invalid(format!("bad status line: {:?}", line.trim_end())));
    }
    let code = parts.next().unwrap_or_default();
    if code.len() != 3 {
        return Err(invalid(format!("bad status code: {:?}", code)));
    }
    StatusCode::from_bytes(code.as_bytes())
        .map_err(|_| invalid(format!("bad status code: {:?}", code)))
}

fn body_framing(status: StatusCode, headers: &[(String, String)]) -> io::Result<BodyFraming> {
    if status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return Ok(BodyFraming::Empty);
    }

    if let Some(encoding) = find_header(headers, "transfer-encoding") {
        let last = encoding.rsplit(',').next().unwrap_or_default().trim();
        if last.eq_ignore_ascii_case("chunked") {
            return Ok(BodyFraming::Chunked);
        }
        return Ok(BodyFraming::UntilClose);
    }

    match find_header(headers, "content-length") {
        Some(value) => value
            .parse::<u64>()
            .map(BodyFraming::Length)
            .map_err(|_| invalid(format!("bad Content-Length: {:?}", value))),
        None => Ok(BodyFraming::UntilClose),
    }
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}
