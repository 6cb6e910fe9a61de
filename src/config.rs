use crate::logger::redact::mask_secret;
use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Charset used when the MySQL config leaves it empty
pub const DEFAULT_CHARSET: &str = "utf8mb4";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub mysql: Option<MySqlConfig>,
    #[serde(default)]
    pub sqlite: Option<SqliteConfig>,
    #[serde(default)]
    pub log: LogConfig,
}

/// How to reach a MySQL server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MySqlConfig {
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub host: String,
    #[serde(default = "default_mysql_port")]
    pub port: u16,
    pub database: String,
    /// Empty means `utf8mb4`
    #[serde(default)]
    pub charset: String,
}

fn default_mysql_port() -> u16 {
    3306
}

impl MySqlConfig {
    pub fn charset(&self) -> &str {
        if self.charset.is_empty() {
            DEFAULT_CHARSET
        } else {
            &self.charset
        }
    }

    /// Connection URL for this server
    pub fn dsn(&self) -> String {
        self.format_dsn(&self.password)
    }

    /// Connection URL with the password masked, for logs and display
    pub fn redacted_dsn(&self) -> String {
        self.format_dsn(&mask_secret(&self.password))
    }

    fn format_dsn(&self, password: &str) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}?charset={}",
            self.username,
            password,
            self.host,
            self.port,
            self.database,
            self.charset()
        )
    }
}

/// Where the embedded database file lives
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SqliteConfig {
    /// File-system path, or `:memory:`
    pub path: String,
}

/// Logging facade configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// debug, info, warn, error, panic or fatal; anything else means info
    pub level: String,
    /// Log file path; empty disables the file sink
    pub filename: String,
    /// Max size of the active file in megabytes before it is rotated
    pub max_size: u64,
    /// Max number of rotated files kept (0 keeps all)
    pub max_backups: usize,
    /// Max age of rotated files in days (0 disables age pruning)
    pub max_age: u64,
    /// Gzip rotated files
    pub compress: bool,
    /// Also write to stdout
    pub console: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            filename: "./logs/app.log".to_string(),
            max_size: 100,
            max_backups: 0,
            max_age: 7,
            compress: false,
            console: true,
        }
    }
}

/// Load configuration from `path` (optional) overlaid with `DBKIT__*`
/// environment variables, e.g. `DBKIT__MYSQL__HOST`
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("DBKIT").separator("__"))
        .build()
        .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

    let cfg: Config = config
        .try_deserialize()
        .context("Failed to parse configuration")?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if let Some(mysql) = &cfg.mysql {
        if mysql.host.is_empty() {
            anyhow::bail!("MySQL host cannot be empty");
        }
        if mysql.port == 0 {
            anyhow::bail!("MySQL port cannot be 0");
        }
        if mysql.database.is_empty() {
            anyhow::bail!("MySQL database name cannot be empty");
        }
        if mysql.username.is_empty() {
            anyhow::bail!("MySQL username cannot be empty");
        }
    }

    if let Some(sqlite) = &cfg.sqlite {
        if sqlite.path.trim().is_empty() {
            anyhow::bail!("SQLite path cannot be empty");
        }
    }

    if !cfg.log.console && cfg.log.filename.is_empty() {
        anyhow::bail!("Logging needs at least one output: enable console or set a filename");
    }

    Ok(())
}
