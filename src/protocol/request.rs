/// 请求行与请求头读取
///
/// 逐行消费带缓冲的流，绝不越过头部结束的空行：请求体字节保留在
/// `BufReader` 的缓冲区中，交给模式处理器按 Content-Length 读取
use std::fmt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use super::{find_header, is_blank_line, split_header_line};
use crate::error::{Result, ServeError};
use crate::limited_reader::{LimitExceeded, LimitedReader};

/// 请求方法
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    /// 其他任意方法（原样保留）
    Other(String),
}

impl Method {
    /// 从请求行的第一个字段解析（区分大小写）
    pub fn parse(token: &str) -> Self {
        match token {
            "GET" => Method::Get,
            "POST" => Method::Post,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Other(token) => token,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 头部读取策略，由模式处理器决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadPolicy {
    /// 只有 POST 读取头部，并且必须带有效的 Content-Length（静态文件模式）
    LengthRequiredForPost,
    /// 所有方法都读取完整头部，Content-Length 不作要求（代理模式）
    FullHead,
}

/// 解析后的请求
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub method: Method,
    /// 请求目标（原样）
    pub target: String,
    /// 协议版本字段（不做校验）
    pub version: String,
    /// 按到达顺序保存的头部
    pub headers: Vec<(String, String)>,
    pub content_length: Option<u64>,
    /// 请求行与头部块的原始字节
    pub raw_head: Vec<u8>,
}

impl ParsedRequest {
    /// 查找头部（忽略大小写，同名取最后一个）
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// 从流中读取一个请求的头部
///
/// `max_head` 限制请求行加头部块的总字节数
pub async fn read_request<R>(
    reader: &mut R,
    policy: HeadPolicy,
    max_head: usize,
) -> Result<ParsedRequest>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut limited = LimitedReader::new(reader, max_head);
    let mut raw_head = Vec::with_capacity(256);

    let n = limited
        .read_until(b'\n', &mut raw_head)
        .await
        .map_err(|e| match LimitExceeded::from_io(&e) {
            Some(exceeded) => ServeError::HeadTooLarge {
                limit: exceeded.limit,
            },
            None => ServeError::ClientIo(e),
        })?;

    // 对端在完整的一行到达之前关闭
    if n == 0 || !raw_head.ends_with(b"\n") {
        return Err(ServeError::malformed(String::from_utf8_lossy(&raw_head)));
    }

    let line = String::from_utf8_lossy(&raw_head).into_owned();
    let fields: Vec<&str> = line.split_whitespace().collect();
    let &[method, target, version] = fields.as_slice() else {
        return Err(ServeError::malformed(line.trim_end()));
    };

    let method = Method::parse(method);
    let target = target.to_string();
    let version = version.to_string();

    let read_headers = match policy {
        HeadPolicy::FullHead => true,
        HeadPolicy::LengthRequiredForPost => method == Method::Post,
    };

    let headers = if read_headers {
        read_header_block(&mut limited, &mut raw_head).await?
    } else {
        Vec::new()
    };

    let content_length = find_header(&headers, "content-length")
        .and_then(|value| value.parse::<u64>().ok());

    if policy == HeadPolicy::LengthRequiredForPost
        && method == Method::Post
        && content_length.is_none()
    {
        return Err(ServeError::MissingOrInvalidContentLength);
    }

    debug!(
        "Parsed request: {} {} {} ({} headers, {} head bytes)",
        method,
        target,
        version,
        headers.len(),
        raw_head.len()
    );

    Ok(ParsedRequest {
        method,
        target,
        version,
        headers,
        content_length,
        raw_head,
    })
}

/// 读取头部行直到空行或流错误
async fn read_header_block<R>(
    reader: &mut LimitedReader<R>,
    raw_head: &mut Vec<u8>,
) -> Result<Vec<(String, String)>>
where
    R: AsyncBufRead + Unpin,
{
    let mut headers = Vec::new();

    loop {
        let start = raw_head.len();
        match reader.read_until(b'\n', raw_head).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                if let Some(exceeded) = LimitExceeded::from_io(&e) {
                    return Err(ServeError::HeadTooLarge {
                        limit: exceeded.limit,
                    });
                }
                // 其他读错误视为头部结束
                break;
            }
        }

        let line = &raw_head[start..];
        if is_blank_line(line) || !line.ends_with(b"\n") {
            break;
        }
        if let Some(header) = split_header_line(line) {
            headers.push(header);
        }
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, BufReader};

    const LIMIT: usize = 8 * 1024;

    async fn parse(input: &[u8], policy: HeadPolicy) -> Result<ParsedRequest> {
        let mut reader = BufReader::new(input);
        read_request(&mut reader, policy, LIMIT).await
    }

    #[tokio::test]
    async fn test_simple_get() {
        let req = parse(b"GET /index.html HTTP/1.1\r\n", HeadPolicy::LengthRequiredForPost)
            .await
            .unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.target, "/index.html");
        assert_eq!(req.version, "HTTP/1.1");
        assert!(req.headers.is_empty());
        assert_eq!(req.content_length, None);
    }

    #[tokio::test]
    async fn test_lf_only_line() {
        let req = parse(b"GET /a.txt HTTP/1.0\n", HeadPolicy::LengthRequiredForPost)
            .await
            .unwrap();
        assert_eq!(req.target, "/a.txt");
        assert_eq!(req.version, "HTTP/1.0");
    }

    #[tokio::test]
    async fn test_wrong_field_count_is_malformed() {
        for input in [
            &b"GET\r\n"[..],
            b"GET /a HTTP/1.1 extra\r\n",
            b"GET /a\r\n",
            b"\r\n",
        ] {
            let err = parse(input, HeadPolicy::LengthRequiredForPost)
                .await
                .unwrap_err();
            assert!(
                matches!(err, ServeError::MalformedRequestLine(_)),
                "unexpected error for {:?}: {}",
                String::from_utf8_lossy(input),
                err
            );
        }
    }

    #[tokio::test]
    async fn test_eof_before_line_end_is_malformed() {
        let err = parse(b"", HeadPolicy::FullHead).await.unwrap_err();
        assert!(matches!(err, ServeError::MalformedRequestLine(_)));

        let err = parse(b"GET / HTTP/1.1", HeadPolicy::FullHead)
            .await
            .unwrap_err();
        assert!(matches!(err, ServeError::MalformedRequestLine(_)));
    }

    #[tokio::test]
    async fn test_post_content_length_and_body_left_unread() {
        let input = b"POST /upload.txt HTTP/1.1\r\nHost: localhost\r\ncontent-length: 5\r\n\r\nhello";
        let mut reader = BufReader::new(&input[..]);
        let req = read_request(&mut reader, HeadPolicy::LengthRequiredForPost, LIMIT)
            .await
            .unwrap();

        assert_eq!(req.method, Method::Post);
        assert_eq!(req.content_length, Some(5));
        assert_eq!(req.header("HOST"), Some("localhost"));
        assert_eq!(req.raw_head.len(), input.len() - 5);

        let mut body = String::new();
        reader.read_to_string(&mut body).await.unwrap();
        assert_eq!(body, "hello");
    }

    #[tokio::test]
    async fn test_post_missing_or_invalid_length() {
        let cases: [&[u8]; 4] = [
            b"POST /a.txt HTTP/1.1\r\nHost: x\r\n\r\nhello",
            b"POST /a.txt HTTP/1.1\r\nContent-Length: five\r\n\r\nhello",
            b"POST /a.txt HTTP/1.1\r\nContent-Length: -5\r\n\r\nhello",
            b"POST /a.txt HTTP/1.1\r\nContent-Length: 5\r\n",
        ];
        for (i, input) in cases.iter().enumerate() {
            let result = parse(input, HeadPolicy::LengthRequiredForPost).await;
            match (i, result) {
                // 头部块没有空行但在 EOF 前给出了长度，长度依然有效
                (3, Ok(req)) => assert_eq!(req.content_length, Some(5)),
                (_, Err(ServeError::MissingOrInvalidContentLength)) => {}
                (_, other) => panic!("case {} unexpected result: {:?}", i, other),
            }
        }
    }

    #[tokio::test]
    async fn test_static_policy_get_skips_headers() {
        let input = b"GET /a.html HTTP/1.1\r\nHost: x\r\n\r\n";
        let mut reader = BufReader::new(&input[..]);
        let req = read_request(&mut reader, HeadPolicy::LengthRequiredForPost, LIMIT)
            .await
            .unwrap();
        assert!(req.headers.is_empty());
        assert_eq!(req.raw_head, b"GET /a.html HTTP/1.1\r\n");

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"Host: x\r\n\r\n");
    }

    #[tokio::test]
    async fn test_full_head_policy_keeps_raw_bytes() {
        let input = b"GET http://example.com/ HTTP/1.1\r\nHost: example.com\r\nAccept: */*\r\n\r\n";
        let req = parse(input, HeadPolicy::FullHead).await.unwrap();
        assert_eq!(req.headers.len(), 2);
        assert_eq!(req.raw_head, input.to_vec());
        assert_eq!(req.content_length, None);
    }

    #[tokio::test]
    async fn test_full_head_policy_post_without_length() {
        let input = b"POST / HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let req = parse(input, HeadPolicy::FullHead).await.unwrap();
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.content_length, None);
    }

    #[tokio::test]
    async fn test_other_method() {
        let req = parse(b"DELETE /a.txt HTTP/1.1\r\n", HeadPolicy::LengthRequiredForPost)
            .await
            .unwrap();
        assert_eq!(req.method, Method::Other("DELETE".to_string()));
        assert_eq!(req.method.to_string(), "DELETE");
    }

    #[tokio::test]
    async fn test_head_too_large() {
        let mut input = b"GET / HTTP/1.1\r\n".to_vec();
        for i in 0..100 {
            input.extend_from_slice(format!("X-Filler-{}: {}\r\n", i, "v".repeat(64)).as_bytes());
        }
        input.extend_from_slice(b"\r\n");

        let mut reader = BufReader::new(&input[..]);
        let err = read_request(&mut reader, HeadPolicy::FullHead, 512)
            .await
            .unwrap_err();
        assert!(matches!(err, ServeError::HeadTooLarge { limit: 512 }));
    }
}
