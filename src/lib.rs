/// httpgate 库入口
///
/// 将核心模块导出为库，方便测试和复用
pub mod cli;
pub mod config;
pub mod error;
pub mod gate;
pub mod handler;
pub mod limited_reader;
pub mod mime;
pub mod protocol;
pub mod rate_limiter;
pub mod server;
pub mod stats;

// 重新导出常用类型
pub use config::{AppConfig, ModeConfig, ServerConfig};
pub use error::{Result, ServeError};
pub use gate::{ConnectionGate, ConnectionSlot};
pub use handler::{create_handler, ModeHandler, ProxyHandler, StaticHandler};
pub use limited_reader::{LimitedReader, DEFAULT_MAX_HEAD_SIZE, DEFAULT_MAX_UPSTREAM_HEAD_SIZE};
pub use rate_limiter::RateLimiter;
pub use server::{run_server, Server};
pub use stats::{ServerStats, StatsSnapshot};
