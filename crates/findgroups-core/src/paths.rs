//! XDG-compliant locations of the config file and the state directory that
//! holds the account cache.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::{APP_NAME, AppConfig};

/// File name of the config file inside the config directory.
pub const CONFIG_FILENAME: &str = "config.toml";

/// File name of the persisted account cache inside the state directory.
pub const ACCOUNTS_FILENAME: &str = "accounts.json";

/// Where findgroups reads its config and keeps its files.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// The TOML config file.
    pub config_file: PathBuf,
    /// Directory for application state files (account cache).
    pub state_dir: PathBuf,
}

impl AppPaths {
    /// Resolve the config file (`--config` may name a file or a directory)
    /// and the default state directory.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be determined or expanded.
    pub fn discover(override_path: Option<&Path>) -> Result<Self> {
        let config_file = match override_path.map(expand_path).transpose()? {
            Some(dir) if dir.is_dir() => dir.join(CONFIG_FILENAME),
            Some(file) => file,
            None => default_config_dir()?.join(CONFIG_FILENAME),
        };

        if config_file.file_name().is_none() || config_file.parent().is_none() {
            return Err(anyhow!(
                "{} is not usable as a config file",
                config_file.display()
            ));
        }

        Ok(Self {
            config_file,
            state_dir: default_state_dir()?,
        })
    }

    /// Replace the state directory with `paths.state_dir` from the config.
    ///
    /// # Errors
    ///
    /// Returns an error if the override cannot be expanded.
    pub fn apply_overrides(self, cfg: &AppConfig) -> Result<Self> {
        match cfg.paths.state_dir.as_deref() {
            Some(dir) => Ok(Self {
                state_dir: expand_str_path(dir)?,
                ..self
            }),
            None => Ok(self),
        }
    }

    /// Location of the persisted account cache.
    #[must_use]
    pub fn accounts_file(&self) -> PathBuf {
        self.state_dir.join(ACCOUNTS_FILENAME)
    }

    /// Create the state directory.
    ///
    /// # Errors
    ///
    /// Returns an error naming the directory that could not be created.
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.state_dir)
            .with_context(|| format!("creating state directory {}", self.state_dir.display()))
    }

    /// Report, instead of creating, the state directory under `--dry-run`.
    pub fn log_dry_run(&self) {
        log::info!(
            "dry-run: not creating state directory {}",
            self.state_dir.display()
        );
    }
}

impl std::fmt::Display for AppPaths {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "config:   {}", self.config_file.display())?;
        writeln!(f, "state:    {}", self.state_dir.display())?;
        write!(f, "accounts: {}", self.accounts_file().display())
    }
}

/// Expand a `PathBuf`, resolving ~ and environment variables.
///
/// # Errors
///
/// Returns an error if shell expansion fails.
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    path.to_str()
        .map_or_else(|| Ok(path.to_path_buf()), expand_str_path)
}

/// Expand a string path, resolving ~ and environment variables.
///
/// # Errors
///
/// Returns an error if shell expansion fails.
pub fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}

/// Resolve an XDG base directory for this application.
///
/// Order: the environment variable, the platform directory from `dirs`,
/// then `$HOME` joined with `home_fallback`.
fn xdg_app_dir(
    var: &str,
    platform: Option<PathBuf>,
    home_fallback: &[&str],
    what: &str,
) -> Result<PathBuf> {
    if let Some(dir) = env::var_os(var).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(dir) = platform {
        return Ok(dir.join(APP_NAME));
    }

    dirs::home_dir()
        .map(|home| {
            home_fallback
                .iter()
                .fold(home, |acc, seg| acc.join(seg))
                .join(APP_NAME)
        })
        .ok_or_else(|| anyhow!("unable to determine {what} directory"))
}

/// Get the default configuration directory (`XDG_CONFIG_HOME` or fallback).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_config_dir() -> Result<PathBuf> {
    xdg_app_dir("XDG_CONFIG_HOME", dirs::config_dir(), &[".config"], "configuration")
}

/// Get the default state directory (`XDG_STATE_HOME` or fallback).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_state_dir() -> Result<PathBuf> {
    xdg_app_dir("XDG_STATE_HOME", dirs::state_dir(), &[".local", "state"], "state")
}

/// Write a config file holding the defaults, creating parent directories.
///
/// # Errors
///
/// Returns an error if the directory or the file cannot be written.
pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }

    let defaults = toml::to_string_pretty(&AppConfig::default())
        .context("rendering default config as TOML")?;
    let contents = format!(
        "# {APP_NAME} configuration ({})\n\
         # Set auth.client_id to the application id of your app registration,\n\
         # or export {}__AUTH__CLIENT_ID.\n\n{defaults}",
        path.display(),
        crate::env_prefix()
    );
    fs::write(path, contents).with_context(|| format!("writing {}", path.display()))?;
    log::info!("wrote default config to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_loader() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        write_default_config(&path).expect("write default");

        let text = fs::read_to_string(&path).expect("read back");
        assert!(text.starts_with("# findgroups configuration"));
        assert!(text.contains("FINDGROUPS__AUTH__CLIENT_ID"));
        assert!(text.contains("[auth]"));
        assert!(!text.contains("profile"));
        assert!(!text.contains("data_dir"));

        let cfg = AppConfig::load_from_path(&path).expect("load");
        assert_eq!(cfg.auth.tenant, "common");
    }

    #[test]
    fn discover_accepts_directory_override() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::discover(Some(dir.path())).expect("discover");
        assert_eq!(paths.config_file, dir.path().join("config.toml"));
        assert!(paths.accounts_file().ends_with(ACCOUNTS_FILENAME));
        assert!(paths.to_string().contains("accounts: "));
    }

    #[test]
    fn config_paths_override_state_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = AppConfig::default();
        cfg.paths.state_dir = Some(dir.path().join("st").display().to_string());

        let paths = AppPaths::discover(Some(dir.path()))
            .expect("discover")
            .apply_overrides(&cfg)
            .expect("overrides");
        assert_eq!(paths.accounts_file(), dir.path().join("st").join(ACCOUNTS_FILENAME));

        paths.ensure_directories().expect("create");
        assert!(dir.path().join("st").is_dir());
        assert!(!paths.to_string().contains("data:"));
    }
}
