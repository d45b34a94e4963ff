use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "httpgate")]
#[command(author, version, about = "Connection-bounded HTTP forward proxy and static file server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 以正向代理模式运行
    Proxy {
        /// 监听端口
        port: u16,

        /// 监听地址
        #[arg(short, long, default_value = "0.0.0.0")]
        bind: String,

        /// 最大并发连接数
        #[arg(short, long, default_value_t = 10)]
        max_connections: usize,
    },
    /// 以静态文件模式运行
    Static {
        /// 监听端口
        port: u16,

        /// 文件根目录
        #[arg(short, long, default_value = "files")]
        root: PathBuf,

        /// 监听地址
        #[arg(short, long, default_value = "0.0.0.0")]
        bind: String,

        /// 最大并发连接数
        #[arg(short, long, default_value_t = 10)]
        max_connections: usize,
    },
    /// 按配置文件运行
    Run {
        /// 配置文件路径
        #[arg(short, long, default_value = "httpgate.toml")]
        config: String,
    },
    /// 检查配置文件格式是否正确
    Check {
        /// 配置文件路径
        #[arg(short, long)]
        config: String,

        /// 输出格式 (text, json)
        #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },
    /// 生成示例配置
    Template {
        /// 模式 (proxy, static)
        #[arg(value_parser = ["proxy", "static"])]
        template_type: String,

        /// 输出文件路径
        #[arg(short, long)]
        output: Option<String>,
    },
}
