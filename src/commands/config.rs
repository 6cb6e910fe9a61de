use anyhow::Result;
use colored::Colorize;
use dbkit::config::{self, Config};
use dbkit::logger::redact::mask_secret;
use std::path::Path;
use tracing::info;

/// Execute the config show command
///
/// Displays the current configuration with secrets masked
pub fn show(config_path: &Path) -> Result<()> {
    println!("{}", "Loading configuration...".yellow());
    info!("Loading configuration for display");

    let cfg = config::load_config(config_path)?;
    let sanitized = sanitize_secrets(&cfg);

    println!("{}", "Current Configuration:".green().bold());
    println!();

    let toml_string = toml::to_string_pretty(&sanitized)?;
    println!("{}", toml_string);

    Ok(())
}

/// Execute the config validate command
pub fn validate(config_path: &Path) -> Result<()> {
    println!("{}", "Validating configuration...".yellow());
    info!("Validating configuration file");

    let cfg = config::load_config(config_path)?;

    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    println!("  Databases: {}", describe_databases(&cfg));
    println!("  Log Level: {}", cfg.log.level);
    println!(
        "  Log Outputs: {}",
        describe_log_outputs(&cfg.log.filename, cfg.log.console)
    );

    info!("Configuration validation successful");
    Ok(())
}

/// Copy of `cfg` safe to print
fn sanitize_secrets(cfg: &Config) -> Config {
    let mut sanitized = cfg.clone();
    if let Some(mysql) = &mut sanitized.mysql {
        mysql.password = mask_secret(&mysql.password);
    }
    sanitized
}

fn describe_databases(cfg: &Config) -> String {
    let mut names = Vec::new();
    if let Some(mysql) = &cfg.mysql {
        names.push(format!("mysql ({}:{})", mysql.host, mysql.port));
    }
    if let Some(sqlite) = &cfg.sqlite {
        names.push(format!("sqlite ({})", sqlite.path));
    }

    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

fn describe_log_outputs(filename: &str, console: bool) -> String {
    match (filename.is_empty(), console) {
        (false, true) => format!("console, {filename}"),
        (false, false) => filename.to_string(),
        (true, _) => "console".to_string(),
    }
}
