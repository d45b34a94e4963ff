use anyhow::{Context, Result};

use crate::config::AppConfig;

/// Generate configuration template
pub fn generate_config_template(template_type: &str, output: Option<&str>) -> Result<()> {
    let content = AppConfig::template(template_type)
        .with_context(|| format!("Unknown template type: {}", template_type))?;

    if let Some(path) = output {
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config template to {}", path))?;
        println!(
            "Generated {} configuration template: {}",
            template_type, path
        );
    } else {
        println!("{}", content);
    }

    Ok(())
}
