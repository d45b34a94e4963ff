use anyhow::{bail, Result};
use tracing::warn;

use super::{AppConfig, ModeConfig, RateLimitConfig, ServerConfig, SizeLimitConfig};

/// 请求头上限的最小值，再小连请求行都放不下
const MIN_HEAD_BYTES: usize = 64;

/// 配置验证器 - 负责所有配置验证逻辑
pub struct ConfigValidator;

impl ConfigValidator {
    /// 验证端口号
    pub fn validate_port(port: u16, context: &str) -> Result<()> {
        if port == 0 {
            bail!("{}: port cannot be 0", context);
        }
        Ok(())
    }

    /// 验证地址不为空
    pub fn validate_address(addr: &str, context: &str) -> Result<()> {
        if addr.trim().is_empty() {
            bail!("{}: address cannot be empty", context);
        }
        Ok(())
    }

    /// 验证完整配置
    pub fn validate_app_config(config: &AppConfig) -> Result<()> {
        Self::validate_server_config(&config.server)?;
        Self::validate_mode_config(&config.mode)
    }

    /// 验证服务器配置
    pub fn validate_server_config(config: &ServerConfig) -> Result<()> {
        Self::validate_address(&config.bind_addr, "Server bind_addr")?;
        Self::validate_port(config.bind_port, "Server bind_port")?;

        if config.max_connections == 0 {
            bail!("max_connections must be at least 1");
        }

        Self::validate_size_limit_config(&config.limits)?;

        // 验证速率限制配置
        if let Some(ref rate_limit) = config.rate_limit {
            Self::validate_rate_limit_config(rate_limit)?;
        }

        Ok(())
    }

    /// 验证模式配置
    pub fn validate_mode_config(config: &ModeConfig) -> Result<()> {
        if let ModeConfig::Static(ref config) = config {
            if config.root.as_os_str().is_empty() {
                bail!("mode.root cannot be empty");
            }
            if !config.root.is_dir() {
                warn!(
                    "Static root {} does not exist or is not a directory, all GETs will return 404",
                    config.root.display()
                );
            }
        }
        Ok(())
    }

    /// 验证速率限制配置
    pub fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<()> {
        if config.requests_per_second == 0 {
            bail!("rate_limit.requests_per_second must be greater than 0");
        }
        if config.burst_size == 0 {
            bail!("rate_limit.burst_size must be greater than 0");
        }
        if config.burst_size < config.requests_per_second {
            warn!(
                "rate_limit.burst_size ({}) is less than requests_per_second ({}), \
                 this may cause frequent rate limiting",
                config.burst_size, config.requests_per_second
            );
        }
        Ok(())
    }

    /// 验证大小限制配置
    pub fn validate_size_limit_config(config: &SizeLimitConfig) -> Result<()> {
        if config.max_head_bytes < MIN_HEAD_BYTES {
            bail!(
                "limits.max_head_bytes must be at least {} (current: {})",
                MIN_HEAD_BYTES,
                config.max_head_bytes
            );
        }
        if config.max_upstream_head_bytes < MIN_HEAD_BYTES {
            bail!(
                "limits.max_upstream_head_bytes must be at least {} (current: {})",
                MIN_HEAD_BYTES,
                config.max_upstream_head_bytes
            );
        }
        // 建议值检查
        if config.max_body_bytes > 1024 * 1024 * 1024 {
            warn!(
                "limits.max_body_bytes is very large ({} bytes = {} MB)",
                config.max_body_bytes,
                config.max_body_bytes / (1024 * 1024)
            );
        }
        Ok(())
    }
}
