//! Configuration loading and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default location of the project config file.
pub const DEFAULT_CONFIG_PATH: &str = "task-manager/config.yaml";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub email: EmailConfig,

    #[serde(default)]
    pub reports: ReportsConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Address to bind to.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Tasks per page in the HTML lists.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Lifetime of a login session in hours.
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind: default_bind(),
            port: default_port(),
            page_size: default_page_size(),
            session_ttl_hours: default_session_ttl_hours(),
        }
    }
}

impl ServerConfig {
    /// Session lifetime in milliseconds.
    pub fn session_ttl_ms(&self) -> i64 {
        self.session_ttl_hours * 3_600_000
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("task-manager/tasks.db")
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_page_size() -> usize {
    5
}

fn default_session_ttl_hours() -> i64 {
    336 // two weeks
}

/// Outgoing report email settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_from_address")]
    pub from_address: String,

    #[serde(default = "default_subject")]
    pub subject: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            from_address: default_from_address(),
            subject: default_subject(),
        }
    }
}

fn default_from_address() -> String {
    "tasks@task_manager.org".to_string()
}

fn default_subject() -> String {
    "Daily Report from Task Manager".to_string()
}

/// Background report job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    /// Run the hourly report check while serving.
    #[serde(default = "default_reports_enabled")]
    pub enabled: bool,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            enabled: default_reports_enabled(),
        }
    }
}

fn default_reports_enabled() -> bool {
    true
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// Load from an explicit path, the default location, or defaults, then
    /// apply environment overrides.
    pub fn load_with_env(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `TASK_MANAGER_*` overrides. Unparseable values are ignored.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db_path) = var("TASK_MANAGER_DB_PATH") {
            self.server.db_path = PathBuf::from(db_path);
        }

        if let Some(bind) = var("TASK_MANAGER_BIND") {
            self.server.bind = bind;
        }

        if let Some(port) = var("TASK_MANAGER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
        }

        if let Some(from) = var("TASK_MANAGER_EMAIL_FROM") {
            self.email.from_address = from;
        }

        if let Some(enabled) = var("TASK_MANAGER_REPORTS_ENABLED")
            && let Ok(enabled) = enabled.parse()
        {
            self.reports.enabled = enabled;
        }
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.server.db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}
