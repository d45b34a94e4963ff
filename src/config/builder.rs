use anyhow::{Context, Result};

use super::{validator::ConfigValidator, RateLimitConfig, ServerConfig, SizeLimitConfig, TimeoutConfig};

/// ServerConfig Builder
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    bind_addr: Option<String>,
    bind_port: Option<u16>,
    max_connections: Option<usize>,
    timeouts: Option<TimeoutConfig>,
    limits: Option<SizeLimitConfig>,
    rate_limit: Option<RateLimitConfig>,
}

impl ServerConfigBuilder {
    /// 创建新的 Builder
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置绑定地址
    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = Some(addr.into());
        self
    }

    /// 设置绑定端口
    pub fn bind_port(mut self, port: u16) -> Self {
        self.bind_port = Some(port);
        self
    }

    /// 设置最大并发连接数
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// 设置超时
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// 设置大小限制
    pub fn limits(mut self, limits: SizeLimitConfig) -> Self {
        self.limits = Some(limits);
        self
    }

    /// 设置速率限制
    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    /// 构建 ServerConfig 并验证
    pub fn build(self) -> Result<ServerConfig> {
        let config = ServerConfig {
            bind_addr: self.bind_addr.unwrap_or_else(super::default_bind_addr),
            bind_port: self.bind_port.context("bind_port is required")?,
            max_connections: self
                .max_connections
                .unwrap_or_else(super::default_max_connections),
            timeouts: self.timeouts.unwrap_or_default(),
            limits: self.limits.unwrap_or_default(),
            rate_limit: self.rate_limit,
        };

        // 验证配置
        ConfigValidator::validate_server_config(&config)?;

        Ok(config)
    }
}
