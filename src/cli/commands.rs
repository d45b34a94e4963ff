use anyhow::Result;
use tracing::info;

use crate::config::{
    expand_path as expand_root, AppConfig, ConfigValidator, ModeConfig, ProxyModeConfig,
    ServerConfigBuilder, StaticModeConfig,
};
use crate::server;

use super::config::{check_config, expand_path};
use super::template;

/// Execute CLI commands
pub async fn execute_command(cli: &super::Cli) -> Result<()> {
    use super::Commands;

    match &cli.command {
        Commands::Proxy {
            port,
            bind,
            max_connections,
        } => {
            let config = AppConfig {
                server: ServerConfigBuilder::new()
                    .bind_addr(bind)
                    .bind_port(*port)
                    .max_connections(*max_connections)
                    .build()?,
                mode: ModeConfig::Proxy(ProxyModeConfig::default()),
            };
            server::run_server(config).await?;
        }
        Commands::Static {
            port,
            root,
            bind,
            max_connections,
        } => {
            let config = AppConfig {
                server: ServerConfigBuilder::new()
                    .bind_addr(bind)
                    .bind_port(*port)
                    .max_connections(*max_connections)
                    .build()?,
                mode: ModeConfig::Static(StaticModeConfig {
                    root: expand_root(root)?,
                }),
            };
            ConfigValidator::validate_mode_config(&config.mode)?;
            server::run_server(config).await?;
        }
        Commands::Run { config } => {
            let config_path = expand_path(config)?;
            info!("Loading configuration from: {}", config_path);
            let config = AppConfig::load(&config_path)?;
            server::run_server(config).await?;
        }
        Commands::Check { config, format } => {
            let config_path = expand_path(config)?;
            check_config(&config_path, format)?;
        }
        Commands::Template {
            template_type,
            output,
        } => {
            template::generate_config_template(template_type, output.as_deref())?;
        }
    }

    Ok(())
}
