/// 静态文件处理器
///
/// GET 从根目录读取白名单类型的文件，POST 把 Content-Length 长度的请求体
/// 写入根目录下的文件
use async_trait::async_trait;
use http::StatusCode;
use std::path::{Component, Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use super::{copy_with_idle_timeout, with_deadline, ClientConn, Deadlines, ModeHandler};
use crate::error::{Result, ServeError};
use crate::mime;
use crate::protocol::{HeadPolicy, Method, ParsedRequest, ResponseHead};

/// 静态文件模式处理器
#[derive(Debug, Clone)]
pub struct StaticHandler {
    root: PathBuf,
    deadlines: Deadlines,
    /// 0 表示不限制
    max_body_bytes: u64,
}

impl StaticHandler {
    pub fn new(root: PathBuf, deadlines: Deadlines, max_body_bytes: u64) -> Self {
        Self {
            root,
            deadlines,
            max_body_bytes,
        }
    }

    /// 把请求目标映射到根目录下的路径
    ///
    /// 去掉查询串和片段后按 `/` 逐段归一化，`..` 越过根目录时返回 `PathTraversal`
    pub fn resolve(&self, target: &str) -> Result<PathBuf> {
        let path = target.split(['?', '#']).next().unwrap_or_default();

        let mut parts: Vec<&str> = Vec::new();
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if parts.pop().is_none() {
                        return Err(ServeError::PathTraversal(target.to_string()));
                    }
                }
                other => {
                    // 段内不允许出现平台路径语义（如 Windows 的 `C:` 或 `\`）
                    let mut components = Path::new(other).components();
                    match (components.next(), components.next()) {
                        (Some(Component::Normal(_)), None) => parts.push(other),
                        _ => return Err(ServeError::PathTraversal(target.to_string())),
                    }
                }
            }
        }

        Ok(parts
            .iter()
            .fold(self.root.clone(), |acc, part| acc.join(part)))
    }

    async fn handle_get(&self, target: &str, conn: &mut dyn ClientConn) -> Result<StatusCode> {
        let path = self.resolve(target)?;
        let content_type =
            mime::lookup(&path).ok_or_else(|| ServeError::UnsupportedFileType(target.to_string()))?;

        let mut file = File::open(&path)
            .await
            .map_err(|_| ServeError::FileNotFound(target.to_string()))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|_| ServeError::FileNotFound(target.to_string()))?;
        if !metadata.is_file() {
            return Err(ServeError::FileNotFound(target.to_string()));
        }

        let head = ResponseHead::ok()
            .content_type(content_type)
            .content_length(metadata.len());
        with_deadline(self.deadlines.io_idle, head.write_to(conn))
            .await
            .map_err(ServeError::ClientIo)?;

        let mut sent = 0;
        copy_with_idle_timeout(&mut file, conn, self.deadlines.io_idle, &mut sent)
            .await
            .map_err(|e| ServeError::ResponseTruncated {
                sent,
                reason: e.to_string(),
            })?;

        info!("Served {} ({} bytes, {})", path.display(), sent, content_type);
        Ok(head.status())
    }

    async fn handle_post(
        &self,
        target: &str,
        content_length: Option<u64>,
        conn: &mut dyn ClientConn,
    ) -> Result<StatusCode> {
        let length = content_length.ok_or(ServeError::MissingOrInvalidContentLength)?;
        let path = self.resolve(target)?;

        if self.max_body_bytes > 0 && length > self.max_body_bytes {
            return Err(ServeError::PayloadTooLarge {
                length,
                limit: self.max_body_bytes,
            });
        }

        let mut file = File::create(&path)
            .await
            .map_err(|source| ServeError::FileCreateFailure {
                path: path.display().to_string(),
                source,
            })?;

        let mut copied = 0;
        let mut body = (&mut *conn).take(length);
        let result =
            copy_with_idle_timeout(&mut body, &mut file, self.deadlines.io_idle, &mut copied).await;
        drop(file);

        if let Err(e) = &result {
            debug!("Body copy to {} failed: {}", path.display(), e);
        }
        if result.is_err() || copied < length {
            // 不留下不完整的文件
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!("Failed to remove partial file {}: {}", path.display(), e);
            }
            return Err(ServeError::BodyCopyFailure {
                copied,
                expected: length,
            });
        }

        let head = ResponseHead::ok()
            .content_type("text/plain")
            .content_length(0);
        with_deadline(self.deadlines.io_idle, head.write_to(conn))
            .await
            .map_err(ServeError::ClientIo)?;

        info!("Stored {} ({} bytes)", path.display(), copied);
        Ok(head.status())
    }
}

#[async_trait]
impl ModeHandler for StaticHandler {
    fn name(&self) -> &'static str {
        "static"
    }

    fn head_policy(&self) -> HeadPolicy {
        HeadPolicy::LengthRequiredForPost
    }

    async fn handle(
        &self,
        request: ParsedRequest,
        conn: &mut dyn ClientConn,
    ) -> Result<StatusCode> {
        match request.method {
            Method::Get => self.handle_get(&request.target, conn).await,
            Method::Post => {
                self.handle_post(&request.target, request.content_length, conn)
                    .await
            }
            Method::Other(method) => Err(ServeError::UnsupportedMethod(method)),
        }
    }
}
