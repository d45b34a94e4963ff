use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::{AppConfig, ModeConfig};
use crate::mime;

#[derive(Serialize)]
struct CheckResult {
    valid: bool,
    mode: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    details: serde_json::Value,
}

/// Expand path with tilde (~) and make it absolute
pub fn expand_path(path: &str) -> Result<String> {
    let expanded = shellexpand::tilde(path);
    let path_buf = PathBuf::from(expanded.as_ref());

    if path_buf.is_absolute() {
        Ok(expanded.into_owned())
    } else {
        // Convert relative path to absolute
        std::env::current_dir()
            .context("Failed to get current directory")?
            .join(&path_buf)
            .to_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid path: {}", path))
    }
}

fn print_failure(format: &str, mode: &str, error: &anyhow::Error) -> Result<()> {
    if format == "json" {
        let result = CheckResult {
            valid: false,
            mode: mode.to_string(),
            warnings: vec![],
            error: Some(format!("{:#}", error)),
            details: serde_json::json!({}),
        };
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("✗ Configuration validation failed!");
        println!("\nError details:");
        println!("{:#}", error);

        // 提供一些常见问题的提示
        println!("\nCommon issues:");
        println!("  1. Check TOML syntax (brackets, quotes, commas)");
        println!("  2. [server] needs at least bind_port (1-65535)");
        println!("  3. [mode] needs type = \"proxy\" or type = \"static\"");
        println!("  4. max_connections must be at least 1");
    }
    Ok(())
}

/// Check configuration file format
pub fn check_config(config_path: &str, format: &str) -> Result<()> {
    let path = Path::new(config_path);

    // Check if file exists
    if !path.exists() {
        let error = anyhow::anyhow!("Configuration file not found: {}", config_path);
        print_failure(format, "unknown", &error)?;
        return Err(error);
    }

    if format == "text" {
        println!("Checking configuration file: {}\n", config_path);
    }

    let config = match AppConfig::load(path) {
        Ok(config) => config,
        Err(e) => {
            print_failure(format, "unknown", &e)?;
            return Err(e);
        }
    };

    let server = &config.server;
    let mut warnings = Vec::new();
    let mut details = serde_json::json!({
        "bind_addr": server.bind_addr,
        "bind_port": server.bind_port,
        "max_connections": server.max_connections,
        "timeouts": server.timeouts,
        "limits": server.limits,
        "rate_limit": server.rate_limit,
    });

    if let ModeConfig::Static(ref static_config) = config.mode {
        details["root"] = serde_json::json!(static_config.root);
        details["extensions"] = serde_json::json!(mime::supported_extensions().collect::<Vec<_>>());
        if !static_config.root.is_dir() {
            warnings.push(format!(
                "Static root not found: {}",
                static_config.root.display()
            ));
        }
    }

    if format == "json" {
        let result = CheckResult {
            valid: true,
            mode: config.mode.name().to_string(),
            warnings,
            error: None,
            details,
        };
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("✓ Mode: {}", config.mode.name());
        println!("✓ Listen address: {}", server.listen_addr());
        println!("✓ Max connections: {}", server.max_connections);
        println!(
            "✓ Timeouts: head {}s, connect {}s, idle {}s (0 = unlimited)",
            server.timeouts.head_read_secs,
            server.timeouts.connect_secs,
            server.timeouts.io_idle_secs
        );
        println!(
            "✓ Limits: head {} bytes, body {} bytes, upstream head {} bytes",
            server.limits.max_head_bytes,
            server.limits.max_body_bytes,
            server.limits.max_upstream_head_bytes
        );
        if let Some(ref rate_limit) = server.rate_limit {
            println!(
                "✓ Rate limit: {}/s (burst {})",
                rate_limit.requests_per_second, rate_limit.burst_size
            );
        }
        if let ModeConfig::Static(ref static_config) = config.mode {
            println!("✓ Root: {}", static_config.root.display());
        }
        for warning in &warnings {
            println!("⚠ Warning: {}", warning);
        }
        println!("\n✓ Configuration is valid!");
    }

    Ok(())
}
