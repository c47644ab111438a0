//! Configuration system for sonar.
//!
//! Every setting is resolved from up to four layers, highest first:
//!
//! 1. **Explicit override** - a CLI flag such as `--db`
//! 2. **Environment variables** - `SONAR_*`
//! 3. **Config file** - `$SONAR_HOME/config.toml` (default `~/.sonar`)
//! 4. **Compiled defaults**
//!
//! # Example Configuration File
//!
//! ```toml
//! token = "sk-..."
//! api_url = "https://api.sonar.8640p.info/graphql"
//! vendor = "anthropic"
//! feed_render = "card"
//! feed_width = 100
//! ```

use crate::error::{Result, SonarError};
use crate::storage::remove_database;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

pub const DEFAULT_API_URL: &str = "https://api.sonar.8640p.info/graphql";
pub const DEFAULT_FEED_RENDER: &str = "card";
pub const DEFAULT_FEED_WIDTH: u16 = 80;
pub const MIN_FEED_WIDTH: u16 = 20;

pub const CONFIG_FILE_NAME: &str = "config.toml";

pub const ENV_HOME: &str = "SONAR_HOME";
pub const ENV_API_URL: &str = "SONAR_API_URL";
pub const ENV_API_KEY: &str = "SONAR_API_KEY";
pub const ENV_VENDOR: &str = "SONAR_AI_VENDOR";
pub const ENV_FEED_RENDER: &str = "SONAR_FEED_RENDER";
pub const ENV_FEED_WIDTH: &str = "SONAR_FEED_WIDTH";
pub const ENV_DB: &str = "SONAR_DB";

/// Pick the first available value: explicit override, environment, config
/// file, then the default.
pub fn resolve<T>(explicit: Option<T>, env: Option<T>, file: Option<T>, default: T) -> T {
    explicit.or(env).or(file).unwrap_or(default)
}

/// Read and parse an environment variable. Empty values count as unset.
fn env_value<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = lookup(name).filter(|v| !v.trim().is_empty())?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring {name}={raw:?}: {e}");
            None
        }
    }
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// AI vendor used for reply and interest generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    OpenAi,
    Anthropic,
}

impl Vendor {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = SonarError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(SonarError::invalid_argument(format!(
                "unknown vendor \"{other}\". Supported: openai, anthropic"
            ))),
        }
    }
}

/// Directory holding the config file and the default database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    home: PathBuf,
}

impl Workspace {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// `$SONAR_HOME`, or `~/.sonar`.
    ///
    /// # Errors
    ///
    /// Returns an error if neither is available.
    pub fn from_env() -> Result<Self> {
        if let Some(home) = process_env(ENV_HOME).filter(|v| !v.is_empty()) {
            return Ok(Self::new(home));
        }
        dirs::home_dir()
            .map(|home| Self::new(home.join(".sonar")))
            .ok_or_else(|| SonarError::ConfigError {
                path: PathBuf::from("~/.sonar"),
                reason: format!("could not determine home directory; set {ENV_HOME}"),
            })
    }

    #[must_use]
    pub fn home(&self) -> &Path {
        &self.home
    }

    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.home.join(CONFIG_FILE_NAME)
    }

    #[must_use]
    pub fn default_db_path(&self) -> PathBuf {
        self.home.join(crate::DEFAULT_DB_NAME)
    }

    /// Delete the config file and the database (with sidecars).
    ///
    /// Returns the paths that existed before removal.
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists but cannot be removed.
    pub fn nuke(&self, db_path: &Path) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();

        let config_path = self.config_path();
        if config_path.exists() {
            std::fs::remove_file(&config_path)
                .map_err(|e| SonarError::path_error("remove", &config_path, e))?;
            removed.push(config_path);
        }
        if db_path.exists() {
            removed.push(db_path.to_path_buf());
        }
        remove_database(db_path)?;

        info!(count = removed.len(), "Workspace reset");
        Ok(removed)
    }
}

/// Contents of `config.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bearer token. Environment variable: `SONAR_API_KEY`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable: `SONAR_API_URL`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Environment variable: `SONAR_AI_VENDOR`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<Vendor>,

    /// Environment variable: `SONAR_FEED_RENDER`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_render: Option<String>,

    /// Environment variable: `SONAR_FEED_WIDTH`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_width: Option<u16>,

    /// Database location. Environment variable: `SONAR_DB`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db: Option<PathBuf>,
}

impl Config {
    /// Load a config file. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SonarError::ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found: {}", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| SonarError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config = toml::from_str(&content).map_err(|e| SonarError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Write the config file, creating its directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SonarError::path_error("create directory", parent, e))?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| SonarError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| SonarError::path_error("write", path, e))?;
        info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Set one key from its string form. Keys are listed in
    /// [`crate::VALID_CONFIG_KEYS`]; `feed-width` style spellings are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`SonarError::InvalidArgument`] for an unknown key or a value
    /// that does not validate.
    pub fn set_key(&mut self, key: &str, value: &str) -> Result<()> {
        match normalize_key(key).as_str() {
            "token" => self.token = Some(value.to_string()),
            "api_url" => self.api_url = Some(value.to_string()),
            "vendor" => self.vendor = Some(value.parse()?),
            "feed_render" => self.feed_render = Some(value.to_string()),
            "feed_width" => self.feed_width = Some(parse_feed_width(value)?),
            "db" => self.db = Some(PathBuf::from(value)),
            _ => {
                return Err(SonarError::invalid_argument(format!(
                    "unknown config key \"{key}\""
                )));
            }
        }
        Ok(())
    }
}

/// `feed-width` and `FEED_WIDTH` both map to `feed_width`.
#[must_use]
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace('-', "_")
}

fn parse_feed_width(value: &str) -> Result<u16> {
    value
        .trim()
        .parse::<u16>()
        .ok()
        .filter(|n| *n >= MIN_FEED_WIDTH)
        .ok_or_else(|| {
            SonarError::invalid_argument(format!(
                "feed_width must be an integer >= {MIN_FEED_WIDTH}"
            ))
        })
}

/// Fully resolved settings handed to the rest of the program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub api_url: String,
    #[serde(skip)]
    pub token: Option<String>,
    pub vendor: Vendor,
    pub feed_render: String,
    pub feed_width: u16,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
}

impl Settings {
    /// Resolve settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be parsed.
    pub fn load(workspace: &Workspace, db_override: Option<PathBuf>) -> Result<Self> {
        let config = Config::load(&workspace.config_path())?;
        Ok(Self::from_sources(workspace, &config, db_override, process_env))
    }

    /// Resolve settings from explicit sources.
    pub fn from_sources(
        workspace: &Workspace,
        config: &Config,
        db_override: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let token = env_value::<String>(&env, ENV_API_KEY)
            .or_else(|| config.token.clone())
            .filter(|t| !t.is_empty());

        let feed_width = resolve(
            None,
            env_value::<u16>(&env, ENV_FEED_WIDTH).filter(|n| *n >= MIN_FEED_WIDTH),
            config.feed_width,
            DEFAULT_FEED_WIDTH,
        );

        Self {
            api_url: resolve(
                None,
                env_value(&env, ENV_API_URL),
                config.api_url.clone(),
                DEFAULT_API_URL.to_string(),
            ),
            token,
            vendor: resolve(None, env_value(&env, ENV_VENDOR), config.vendor, Vendor::OpenAi),
            feed_render: resolve(
                None,
                env_value(&env, ENV_FEED_RENDER),
                config.feed_render.clone(),
                DEFAULT_FEED_RENDER.to_string(),
            ),
            feed_width,
            db_path: resolve(
                db_override,
                env_value(&env, ENV_DB),
                config.db.clone(),
                workspace.default_db_path(),
            ),
            config_path: workspace.config_path(),
        }
    }

    #[must_use]
    pub const fn has_token(&self) -> bool {
        self.token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn resolve_precedence() {
        assert_eq!(resolve(Some(1), Some(2), Some(3), 4), 1);
        assert_eq!(resolve(None, Some(2), Some(3), 4), 2);
        assert_eq!(resolve(None, None, Some(3), 4), 3);
        assert_eq!(resolve::<i32>(None, None, None, 4), 4);
    }

    #[test]
    fn defaults_without_any_source() {
        let workspace = Workspace::new("/tmp/sonar-home");
        let settings =
            Settings::from_sources(&workspace, &Config::default(), None, env_of(&[]));

        assert_eq!(settings.api_url, DEFAULT_API_URL);
        assert_eq!(settings.vendor, Vendor::OpenAi);
        assert_eq!(settings.feed_render, "card");
        assert_eq!(settings.feed_width, 80);
        assert_eq!(settings.db_path, PathBuf::from("/tmp/sonar-home/data.db"));
        assert!(!settings.has_token());
    }

    #[test]
    fn env_beats_file_and_flag_beats_env() {
        let workspace = Workspace::new("/tmp/sonar-home");
        let config = Config {
            token: Some("file-token".to_string()),
            vendor: Some(Vendor::OpenAi),
            feed_width: Some(100),
            db: Some(PathBuf::from("/from/file.db")),
            ..Config::default()
        };
        let env = env_of(&[
            (ENV_API_KEY, "env-token"),
            (ENV_VENDOR, "anthropic"),
            (ENV_DB, "/from/env.db"),
        ]);

        let settings = Settings::from_sources(
            &workspace,
            &config,
            Some(PathBuf::from("/from/flag.db")),
            env,
        );

        assert_eq!(settings.token.as_deref(), Some("env-token"));
        assert_eq!(settings.vendor, Vendor::Anthropic);
        assert_eq!(settings.feed_width, 100);
        assert_eq!(settings.db_path, PathBuf::from("/from/flag.db"));
    }

    #[test]
    fn invalid_env_values_fall_through() {
        let workspace = Workspace::new("/tmp/sonar-home");
        let config = Config {
            feed_width: Some(120),
            ..Config::default()
        };
        let env = env_of(&[(ENV_FEED_WIDTH, "wide"), (ENV_VENDOR, "llama"), (ENV_API_KEY, "")]);

        let settings = Settings::from_sources(&workspace, &config, None, env);
        assert_eq!(settings.feed_width, 120);
        assert_eq!(settings.vendor, Vendor::OpenAi);
        assert!(settings.token.is_none());
    }

    #[test]
    fn set_key_validates_values() {
        let mut config = Config::default();
        config.set_key("vendor", "anthropic").unwrap();
        config.set_key("feed-width", "120").unwrap();
        config.set_key("feed_render", "table").unwrap();

        assert_eq!(config.vendor, Some(Vendor::Anthropic));
        assert_eq!(config.feed_width, Some(120));
        assert_eq!(config.feed_render.as_deref(), Some("table"));

        assert!(config.set_key("vendor", "llama").is_err());
        assert!(config.set_key("feed_width", "10").is_err());
        assert!(config.set_key("colour", "red").is_err());
    }

    #[test]
    fn save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = Config::default();
        config.set_key("token", "abc").unwrap();
        config.set_key("vendor", "anthropic").unwrap();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("vendor = \"anthropic\""));
        assert!(!content.contains("feed_width"));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn broken_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "token = [unterminated").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, SonarError::ConfigError { .. }));
    }

    #[test]
    fn nuke_removes_config_and_database() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(dir.path());
        let db = workspace.default_db_path();
        std::fs::write(workspace.config_path(), "token = \"x\"\n").unwrap();
        std::fs::write(&db, b"db").unwrap();
        std::fs::write(crate::storage::sidecar_path(&db, "-wal"), b"wal").unwrap();

        let removed = workspace.nuke(&db).unwrap();

        assert_eq!(removed.len(), 2);
        assert!(!workspace.config_path().exists());
        assert!(!db.exists());
        assert!(!crate::storage::sidecar_path(&db, "-wal").exists());

        assert!(workspace.nuke(&db).unwrap().is_empty());
    }
}
