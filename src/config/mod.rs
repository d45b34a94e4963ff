// 配置管理模块 - 使用模块化设计

mod builder;
mod validator;

// 重新导出 builder 和 validator
pub use builder::ServerConfigBuilder;
pub use validator::ConfigValidator;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::limited_reader::{DEFAULT_MAX_HEAD_SIZE, DEFAULT_MAX_UPSTREAM_HEAD_SIZE};

/// 代理模式配置模板
pub const PROXY_TEMPLATE: &str = include_str!("../../templates/proxy.toml");

/// 静态文件模式配置模板
pub const STATIC_TEMPLATE: &str = include_str!("../../templates/static.toml");

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_max_connections() -> usize {
    10
}

fn default_root() -> PathBuf {
    PathBuf::from("files")
}

/// 服务器端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// 监听端口
    pub bind_port: u16,
    /// 同时处理的最大连接数
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// 超时配置（秒，0 表示不限制）
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// 大小限制
    #[serde(default)]
    pub limits: SizeLimitConfig,
    /// 速率限制配置（可选）
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
}

impl ServerConfig {
    /// 创建 Builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }

    /// 验证配置
    pub fn validate(&self) -> anyhow::Result<()> {
        ConfigValidator::validate_server_config(self)
    }

    /// `bind_addr:bind_port`
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.bind_port)
    }
}

/// 超时配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// 等待完整请求头的时间
    pub head_read_secs: u64,
    /// 连接上游的时间
    pub connect_secs: u64,
    /// 单次读写的空闲时间
    pub io_idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            head_read_secs: 30,
            connect_secs: 10,
            io_idle_secs: 60,
        }
    }
}

/// 请求大小限制配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeLimitConfig {
    /// 请求行加头部块的最大字节数
    pub max_head_bytes: usize,
    /// POST 请求体最大字节数（0 表示不限制）
    pub max_body_bytes: u64,
    /// 代理模式下上游响应头的最大字节数
    pub max_upstream_head_bytes: usize,
}

impl Default for SizeLimitConfig {
    fn default() -> Self {
        Self {
            max_head_bytes: DEFAULT_MAX_HEAD_SIZE,
            max_body_bytes: 10 * 1024 * 1024, // 10MB
            max_upstream_head_bytes: DEFAULT_MAX_UPSTREAM_HEAD_SIZE,
        }
    }
}

/// 速率限制配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// 每秒允许的新连接数
    pub requests_per_second: u32,
    /// 突发容量（允许短时间内的峰值连接数）
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 100,
            burst_size: 200,
        }
    }
}

/// 代理模式配置（目前没有可配置项）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyModeConfig {}

/// 静态文件模式配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticModeConfig {
    /// 文件根目录
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for StaticModeConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

/// 运行模式，进程启动时选定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModeConfig {
    Proxy(ProxyModeConfig),
    Static(StaticModeConfig),
}

impl ModeConfig {
    pub fn name(&self) -> &'static str {
        match self {
            ModeConfig::Proxy(_) => "proxy",
            ModeConfig::Static(_) => "static",
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub mode: ModeConfig,
}

impl AppConfig {
    /// 从 TOML 字符串解析并验证
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let mut config: AppConfig =
            toml::from_str(content).context("Failed to parse configuration")?;
        config.expand_paths()?;
        config
            .validate()
            .context("Configuration validation failed")?;
        Ok(config)
    }

    /// 从文件加载配置
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
    }

    /// 验证配置
    pub fn validate(&self) -> anyhow::Result<()> {
        ConfigValidator::validate_app_config(self)
    }

    /// 按模式名取配置模板
    pub fn template(mode: &str) -> Option<&'static str> {
        match mode {
            "proxy" => Some(PROXY_TEMPLATE),
            "static" => Some(STATIC_TEMPLATE),
            _ => None,
        }
    }

    /// 展开根目录中的 `~` 和环境变量
    fn expand_paths(&mut self) -> anyhow::Result<()> {
        if let ModeConfig::Static(ref mut config) = self.mode {
            config.root = expand_path(&config.root)?;
        }
        Ok(())
    }
}

/// 展开路径中的 `~` 和 `$VAR`
pub fn expand_path(path: &Path) -> anyhow::Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .with_context(|| format!("Failed to expand path {}", raw))?;
    Ok(PathBuf::from(expanded.into_owned()))
}
