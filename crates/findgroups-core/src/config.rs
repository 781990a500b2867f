//! Configuration types and loading for the application.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use config::{Config, Environment, File, FileFormat};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::paths::{expand_str_path, write_default_config};
use crate::{AppPaths, env_prefix};

/// Microsoft identity platform host used when none is configured.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Microsoft Graph v1.0 endpoint used when none is configured.
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(
    title = "Application Configuration",
    description = "Main configuration for findgroups"
)]
pub struct AppConfig {
    /// JSON Schema reference for editor support.
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub schema: Option<String>,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Runtime behavior configuration.
    pub runtime: RuntimeConfig,

    /// Identity platform (sign-in) configuration.
    pub auth: AuthConfig,

    /// Microsoft Graph endpoint configuration.
    pub graph: GraphConfig,

    /// Custom location of the state directory.
    pub paths: PathsConfig,
}

impl AppConfig {
    /// Override the application (client) id if a value is provided.
    #[must_use]
    pub fn with_client_id_override(mut self, client_id: Option<String>) -> Self {
        if let Some(client_id) = client_id {
            self.auth.client_id = client_id;
        }
        self
    }

    /// Load configuration from file and environment, creating defaults if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read, parsed, or written.
    pub fn load(paths: &AppPaths, dry_run: bool) -> Result<Self> {
        if !paths.config_file.exists() {
            if dry_run {
                log::info!(
                    "dry-run: would create default config at {}",
                    paths.config_file.display()
                );
            } else {
                write_default_config(&paths.config_file)?;
            }
        }

        Self::load_from_path(&paths.config_file)
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    pub fn load_from_path(config_file: &Path) -> Result<Self> {
        let env_prefix = env_prefix();
        let built = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("runtime.timeout", 60_i64)?
            .set_default("runtime.fail_fast", false)?
            .set_default("auth.client_id", "")?
            .set_default("auth.tenant", "common")?
            .set_default("auth.authority_host", DEFAULT_AUTHORITY_HOST)?
            .set_default("auth.redirect_port", 0_i64)?
            .set_default("auth.interactive_timeout", 300_i64)?
            .set_default("auth.open_browser", true)?
            .set_default("auth.persist_accounts", false)?
            .set_default("graph.base_url", DEFAULT_GRAPH_BASE_URL)?
            .add_source(
                File::from(config_file)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::with_prefix(env_prefix.as_str()).separator("__"))
            .build()?;

        let mut config: Self = built.try_deserialize()?;

        if let Some(ref file) = config.logging.file {
            let expanded = expand_str_path(file)?;
            config.logging.file = Some(expanded.display().to_string());
        }

        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema: None,
            logging: LoggingConfig::default(),
            runtime: RuntimeConfig::default(),
            auth: AuthConfig::default(),
            graph: GraphConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Logging configuration")]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace).
    #[schemars(default = "default_log_level")]
    pub level: LogLevel,

    /// Optional path for log file output. Supports ~ and environment variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Log level enumeration for schema validation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only emit error-level messages.
    Error,
    /// Emit warnings and errors.
    Warn,
    /// Emit informational messages and above (default).
    #[default]
    Info,
    /// Emit debug diagnostics and above.
    Debug,
    /// Emit all messages including fine-grained traces.
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Self::Error,
            LogLevel::Warn => Self::Warn,
            LogLevel::Info => Self::Info,
            LogLevel::Debug => Self::Debug,
            LogLevel::Trace => Self::Trace,
        }
    }
}

const fn default_log_level() -> LogLevel {
    LogLevel::Info
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
        }
    }
}

/// Runtime behavior configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Runtime behavior configuration")]
pub struct RuntimeConfig {
    /// Timeout in seconds for each HTTP request (default: 60).
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1))]
    pub timeout: Option<u64>,

    /// Stop after the first failed listing instead of attempting the rest.
    pub fail_fast: bool,
}

impl RuntimeConfig {
    /// Effective HTTP request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(60).max(1))
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timeout: Some(60),
            fail_fast: false,
        }
    }
}

/// Identity platform configuration for the public client sign-in.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Microsoft identity platform sign-in configuration")]
pub struct AuthConfig {
    /// Application (client) id of the app registration. Required.
    pub client_id: String,

    /// Tenant id or domain, or one of `common`, `organizations`.
    pub tenant: String,

    /// Identity platform host.
    pub authority_host: String,

    /// Loopback port for the sign-in redirect; 0 picks a free port.
    pub redirect_port: u16,

    /// Seconds to wait for the browser sign-in to complete.
    #[schemars(range(min = 1))]
    pub interactive_timeout: u64,

    /// Open the system browser for sign-in; otherwise print the URL.
    pub open_browser: bool,

    /// Keep signed-in accounts and refresh tokens across runs.
    pub persist_accounts: bool,
}

impl AuthConfig {
    /// Authority URL, `{authority_host}/{tenant}`.
    #[must_use]
    pub fn authority(&self) -> String {
        format!(
            "{}/{}",
            self.authority_host.trim_end_matches('/'),
            self.tenant.trim_matches('/')
        )
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            tenant: "common".to_string(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            redirect_port: 0,
            interactive_timeout: 300,
            open_browser: true,
            persist_accounts: false,
        }
    }
}

/// Microsoft Graph endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Microsoft Graph endpoint configuration")]
pub struct GraphConfig {
    /// Graph API base URL including the version segment.
    pub base_url: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
        }
    }
}

/// Path override configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Custom location of the state directory")]
pub struct PathsConfig {
    /// Directory for state files (the account cache). Supports ~ and environment variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_file_is_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = AppConfig::load_from_path(&dir.path().join("absent.toml")).expect("load");
        assert_eq!(cfg.auth.tenant, "common");
        assert!(cfg.auth.client_id.is_empty());
        assert_eq!(cfg.graph.base_url, DEFAULT_GRAPH_BASE_URL);
        assert_eq!(cfg.runtime.request_timeout(), Duration::from_secs(60));
        assert!(!cfg.auth.persist_accounts);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[auth]
client_id = "11111111-2222-3333-4444-555555555555"
tenant = "contoso.onmicrosoft.com"
redirect_port = 8400

[logging]
level = "debug"
"#,
        )
        .expect("write config");

        let cfg = AppConfig::load_from_path(&path).expect("load");
        assert_eq!(cfg.auth.client_id, "11111111-2222-3333-4444-555555555555");
        assert_eq!(cfg.auth.redirect_port, 8400);
        assert_eq!(cfg.logging.level, LogLevel::Debug);
        assert_eq!(
            cfg.auth.authority(),
            "https://login.microsoftonline.com/contoso.onmicrosoft.com"
        );
        assert_eq!(cfg.auth.interactive_timeout, 300);
    }

    #[test]
    fn client_id_override_wins() {
        let cfg = AppConfig::default().with_client_id_override(Some("abc".to_string()));
        assert_eq!(cfg.auth.client_id, "abc");
        let cfg = cfg.with_client_id_override(None);
        assert_eq!(cfg.auth.client_id, "abc");
    }
}
