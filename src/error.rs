/// 连接级错误类型
///
/// 每个连接内部的失败都在连接边界处理：映射为一个 HTTP 错误状态码，
/// 或者（响应已经开始发送时）直接关闭连接
use http::StatusCode;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// 单个连接处理过程中的错误
#[derive(Error, Debug)]
pub enum ServeError {
    /// 请求行不是 `METHOD TARGET VERSION` 三段
    #[error("Malformed request line: {0:?}")]
    MalformedRequestLine(String),

    /// POST 缺少或携带了无法解析的 Content-Length
    #[error("Missing or invalid Content-Length header")]
    MissingOrInvalidContentLength,

    /// 客户端请求头超过大小限制（上游响应头超限按 UpstreamReadFailure 处理）
    #[error("Message head exceeds {limit} bytes")]
    HeadTooLarge { limit: usize },

    /// 当前模式不支持的方法
    #[error("Method {0} is not implemented")]
    UnsupportedMethod(String),

    /// 无法连接上游
    #[error("Failed to connect to {target}: {source}")]
    DialFailure {
        target: String,
        #[source]
        source: io::Error,
    },

    /// 向上游写请求失败
    #[error("Failed to forward request to {target}: {source}")]
    UpstreamWriteFailure {
        target: String,
        #[source]
        source: io::Error,
    },

    /// 读取或解析上游响应头失败
    #[error("Invalid response from {target}: {reason}")]
    UpstreamReadFailure { target: String, reason: String },

    /// 等待上游响应头超时
    #[error("Upstream {target} did not respond within {duration:?}")]
    UpstreamTimeout { target: String, duration: Duration },

    /// 扩展名不在白名单内
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// 文件不存在或无法打开
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// 目标路径试图跳出根目录
    #[error("Path escapes the served root: {0}")]
    PathTraversal(String),

    /// 请求体超过配置上限
    #[error("Request body of {length} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { length: u64, limit: u64 },

    /// 无法创建目标文件
    #[error("Failed to create {path}: {source}")]
    FileCreateFailure {
        path: String,
        #[source]
        source: io::Error,
    },

    /// 请求体写入文件时不完整或出错
    #[error("Stored {copied} of {expected} body bytes")]
    BodyCopyFailure { copied: u64, expected: u64 },

    /// 客户端发送请求头过慢
    #[error("Request head not received within {duration:?}")]
    RequestTimeout { duration: Duration },

    /// 与客户端之间的 I/O 失败，无法再写响应
    #[error("Client I/O error: {0}")]
    ClientIo(#[source] io::Error),

    /// 响应头已经发出后中断
    #[error("Response truncated after {sent} bytes: {reason}")]
    ResponseTruncated { sent: u64, reason: String },
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, ServeError>;

impl ServeError {
    /// 创建请求行错误
    pub fn malformed(line: impl Into<String>) -> Self {
        Self::MalformedRequestLine(line.into())
    }

    /// 创建连接上游失败错误
    pub fn dial_failure(target: impl Into<String>, source: io::Error) -> Self {
        Self::DialFailure {
            target: target.into(),
            source,
        }
    }

    /// 创建上游响应错误
    pub fn upstream_read(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::UpstreamReadFailure {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// 映射为发给客户端的状态码
    ///
    /// `None` 表示不再写任何字节，直接关闭连接
    pub fn status(&self) -> Option<StatusCode> {
        let status = match self {
            Self::MalformedRequestLine(_)
            | Self::UnsupportedFileType(_)
            | Self::PathTraversal(_) => StatusCode::BAD_REQUEST,
            Self::MissingOrInvalidContentLength => StatusCode::LENGTH_REQUIRED,
            Self::HeadTooLarge { .. } => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            Self::UnsupportedMethod(_) => StatusCode::NOT_IMPLEMENTED,
            Self::DialFailure { .. }
            | Self::UpstreamWriteFailure { .. }
            | Self::UpstreamReadFailure { .. } => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::FileNotFound(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::FileCreateFailure { .. } | Self::BodyCopyFailure { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::RequestTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
            Self::ClientIo(_) | Self::ResponseTruncated { .. } => return None,
        };
        Some(status)
    }

    /// 是否为超时类错误
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::RequestTimeout { .. } | Self::UpstreamTimeout { .. }
        )
    }

    /// 是否为上游（代理模式）错误
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::DialFailure { .. }
                | Self::UpstreamWriteFailure { .. }
                | Self::UpstreamReadFailure { .. }
                | Self::UpstreamTimeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServeError::malformed("GET").status(),
            Some(StatusCode::BAD_REQUEST)
        );
        assert_eq!(
            ServeError::MissingOrInvalidContentLength.status(),
            Some(StatusCode::LENGTH_REQUIRED)
        );
        assert_eq!(
            ServeError::UnsupportedMethod("PUT".into()).status(),
            Some(StatusCode::NOT_IMPLEMENTED)
        );
        assert_eq!(
            ServeError::FileNotFound("/a.html".into()).status(),
            Some(StatusCode::NOT_FOUND)
        );
        assert_eq!(
            ServeError::BodyCopyFailure {
                copied: 1,
                expected: 5
            }
            .status(),
            Some(StatusCode::INTERNAL_SERVER_ERROR)
        );
    }

    #[test]
    fn test_silent_errors_have_no_status() {
        let err = ServeError::ClientIo(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(err.status().is_none());

        let err = ServeError::ResponseTruncated {
            sent: 10,
            reason: "eof".into(),
        };
        assert!(err.status().is_none());
    }

    #[test]
    fn test_dial_failure_is_bad_gateway() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err = ServeError::dial_failure("127.0.0.1:1", io_err);
        assert!(err.is_upstream());
        assert!(!err.is_timeout());
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
        assert!(err.to_string().contains("127.0.0.1:1"));
    }

    #[test]
    fn test_timeouts() {
        let err = ServeError::RequestTimeout {
            duration: Duration::from_secs(1),
        };
        assert!(err.is_timeout());
        assert_eq!(err.status(), Some(StatusCode::REQUEST_TIMEOUT));

        let err = ServeError::UpstreamTimeout {
            target: "example.com:80".into(),
            duration: Duration::from_secs(1),
        };
        assert!(err.is_timeout());
        assert!(err.is_upstream());
        assert_eq!(err.status(), Some(StatusCode::GATEWAY_TIMEOUT));
    }
}
