//! Configuration file management for wayfarer.
//!
//! Provides a TOML-based config file at `~/.config/wayfarer/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use wayfarer_core::ReplacePolicy;
use wayfarer_core::generator::openrouter::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use wayfarer_core::lifecycle::DEFAULT_GENERATION_TIMEOUT;
use wayfarer_db::config::DbConfig;

pub const AI_PROVIDER_ENV: &str = "WAYFARER_AI_PROVIDER";
pub const AI_API_KEY_ENV: &str = "WAYFARER_AI_API_KEY";
pub const AI_BASE_URL_ENV: &str = "WAYFARER_AI_BASE_URL";
pub const AI_MODEL_ENV: &str = "WAYFARER_AI_MODEL";
pub const GENERATION_TIMEOUT_ENV: &str = "WAYFARER_GENERATION_TIMEOUT_SECS";
pub const REPLACE_POLICY_ENV: &str = "WAYFARER_REPLACE_POLICY";
pub const BIND_ENV: &str = "WAYFARER_BIND";
pub const PORT_ENV: &str = "WAYFARER_PORT";

pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub ai: AiSection,
    #[serde(default)]
    pub plans: PlansSection,
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiSection {
    pub provider: Option<AiProvider>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    /// Hard deadline for one plan generation, in seconds.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlansSection {
    pub replace_policy: Option<ReplacePolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    pub bind: Option<String>,
    pub port: Option<u16>,
}

/// Which generator backs plan generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    #[default]
    Mock,
    OpenRouter,
}

impl FromStr for AiProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mock" => Ok(Self::Mock),
            "openrouter" => Ok(Self::OpenRouter),
            other => bail!("unknown AI provider {other:?} (expected \"mock\" or \"openrouter\")"),
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the wayfarer config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/wayfarer` or `~/.config/wayfarer`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("wayfarer");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("wayfarer")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. A missing file is `Ok(None)`; a file
/// that exists but cannot be read or parsed is an error.
pub fn load_config() -> Result<Option<ConfigFile>> {
    let path = config_path();
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed to read config file at {}", path.display()));
        }
    };
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

/// Serialize and write the config file, creating parent dirs as needed.
/// The file may hold an API key, so on Unix it is owner-only before any
/// content is written.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    use std::io::Write;

    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(&path)
        .with_context(|| format!("failed to open config file at {}", path.display()))?;

    // `mode` only applies to newly created files.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    file.write_all(contents.as_bytes())
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values given on the command line; `None` means "not given".
#[derive(Debug, Default, Clone, Copy)]
pub struct CliOverrides<'a> {
    pub database_url: Option<&'a str>,
    pub bind: Option<&'a str>,
    pub port: Option<u16>,
}

#[derive(Clone)]
pub struct AiConfig {
    pub provider: AiProvider,
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub generation_timeout: Duration,
}

impl std::fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiConfig")
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("generation_timeout", &self.generation_timeout)
            .finish()
    }
}

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone)]
pub struct WayfarerConfig {
    pub db_config: DbConfig,
    pub ai: AiConfig,
    pub replace_policy: ReplacePolicy,
    pub bind: String,
    pub port: u16,
}

impl WayfarerConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `--database-url` > `WAYFARER_DATABASE_URL` > `database.url` > `DbConfig::DEFAULT_URL`
    /// - AI provider: `WAYFARER_AI_PROVIDER` > `ai.provider` > `mock`
    /// - API key: `WAYFARER_AI_API_KEY` > `ai.api_key`; required for `openrouter`
    /// - Timeout: `WAYFARER_GENERATION_TIMEOUT_SECS` > `ai.timeout_secs` > 5
    /// - Replace policy: `WAYFARER_REPLACE_POLICY` > `plans.replace_policy` > `archive`
    /// - Bind / port: `--bind` / `--port` > `WAYFARER_BIND` / `WAYFARER_PORT` > `[server]` > defaults
    pub fn resolve(cli: CliOverrides<'_>) -> Result<Self> {
        Self::resolve_with(cli, load_config()?)
    }

    /// Same as [`Self::resolve`] with an already-loaded config file.
    pub fn resolve_with(cli: CliOverrides<'_>, file: Option<ConfigFile>) -> Result<Self> {
        let file = file.as_ref();

        // DB URL resolution.
        let db_url = if let Some(url) = cli.database_url {
            url.to_string()
        } else if let Ok(url) = std::env::var(DbConfig::URL_ENV) {
            url
        } else if let Some(cfg) = file {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };
        let db_config = DbConfig::new(db_url);

        let ai_file = file.map(|f| &f.ai);

        let provider = match env_var(AI_PROVIDER_ENV) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("{AI_PROVIDER_ENV} env var is invalid"))?,
            None => ai_file.and_then(|a| a.provider).unwrap_or_default(),
        };

        let api_key = env_var(AI_API_KEY_ENV)
            .or_else(|| ai_file.and_then(|a| a.api_key.clone()))
            .filter(|k| !k.trim().is_empty());

        if provider == AiProvider::OpenRouter && api_key.is_none() {
            bail!(
                "AI API key not found; set {AI_API_KEY_ENV} or ai.api_key in {}",
                config_path().display()
            );
        }

        let base_url = env_var(AI_BASE_URL_ENV)
            .or_else(|| ai_file.and_then(|a| a.base_url.clone()))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let model = env_var(AI_MODEL_ENV)
            .or_else(|| ai_file.and_then(|a| a.model.clone()))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let generation_timeout = match env_var(GENERATION_TIMEOUT_ENV) {
            Some(raw) => Duration::from_secs(
                raw.parse()
                    .with_context(|| format!("{GENERATION_TIMEOUT_ENV} must be a whole number of seconds"))?,
            ),
            None => ai_file
                .and_then(|a| a.timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_GENERATION_TIMEOUT),
        };
        if generation_timeout.is_zero() {
            bail!("generation timeout must be at least one second");
        }

        let replace_policy = match env_var(REPLACE_POLICY_ENV) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("{REPLACE_POLICY_ENV} env var is invalid"))?,
            None => file
                .and_then(|f| f.plans.replace_policy)
                .unwrap_or_default(),
        };

        let bind = cli
            .bind
            .map(str::to_string)
            .or_else(|| env_var(BIND_ENV))
            .or_else(|| file.and_then(|f| f.server.bind.clone()))
            .unwrap_or_else(|| DEFAULT_BIND.to_string());

        let port = match (cli.port, env_var(PORT_ENV)) {
            (Some(port), _) => port,
            (None, Some(raw)) => raw
                .parse()
                .with_context(|| format!("{PORT_ENV} must be a port number"))?,
            (None, None) => file.and_then(|f| f.server.port).unwrap_or(DEFAULT_PORT),
        };

        Ok(Self {
            db_config,
            ai: AiConfig {
                provider,
                api_key,
                base_url,
                model,
                generation_timeout,
            },
            replace_policy,
            bind,
            port,
        })
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ENV: &[&str] = &[
        DbConfig::URL_ENV,
        AI_PROVIDER_ENV,
        AI_API_KEY_ENV,
        AI_BASE_URL_ENV,
        AI_MODEL_ENV,
        GENERATION_TIMEOUT_ENV,
        REPLACE_POLICY_ENV,
        BIND_ENV,
        PORT_ENV,
    ];

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        let guard = crate::test_util::lock_env();
        for name in ALL_ENV {
            unsafe { std::env::remove_var(name) };
        }
        guard
    }

    fn sample_file() -> ConfigFile {
        ConfigFile {
            database: DatabaseSection {
                url: "postgresql://filehost:5432/filedb".to_string(),
            },
            ai: AiSection {
                provider: Some(AiProvider::OpenRouter),
                api_key: Some("sk-or-file".to_string()),
                base_url: None,
                model: Some("anthropic/claude-3.5-haiku".to_string()),
                timeout_secs: Some(12),
            },
            plans: PlansSection {
                replace_policy: Some(ReplacePolicy::Reject),
            },
            server: ServerSection {
                bind: Some("0.0.0.0".to_string()),
                port: Some(9000),
            },
        }
    }

    #[test]
    fn config_file_roundtrip() {
        let original = sample_file();
        let contents = toml::to_string_pretty(&original).unwrap();
        let loaded: ConfigFile = toml::from_str(&contents).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn minimal_config_file_parses() {
        let loaded: ConfigFile = toml::from_str(
            r#"
            [database]
            url = "postgresql://localhost:5432/wayfarer"
            "#,
        )
        .unwrap();
        assert_eq!(loaded.ai, AiSection::default());
        assert_eq!(loaded.plans.replace_policy, None);
    }

    #[test]
    fn config_file_uses_lowercase_names() {
        let loaded: ConfigFile = toml::from_str(
            r#"
            [database]
            url = "postgresql://localhost:5432/wayfarer"

            [ai]
            provider = "openrouter"

            [plans]
            replace_policy = "reject"
            "#,
        )
        .unwrap();
        assert_eq!(loaded.ai.provider, Some(AiProvider::OpenRouter));
        assert_eq!(loaded.plans.replace_policy, Some(ReplacePolicy::Reject));
    }

    #[test]
    fn save_config_writes_owner_only_file() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };

        let saved = save_config(&sample_file());
        let path = config_path();
        let loaded = load_config();

        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }

        saved.unwrap();
        assert_eq!(loaded.unwrap(), Some(sample_file()));
        assert!(path.starts_with(tmp.path()));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let meta = std::fs::metadata(&path).unwrap();
            assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        }
    }

    /// Run `f` with `XDG_CONFIG_HOME` pointed at `dir`, restoring it after.
    fn with_config_home<T>(dir: &std::path::Path, f: impl FnOnce() -> T) -> T {
        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", dir) };
        let out = f();
        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }
        out
    }

    #[test]
    fn malformed_config_file_fails_resolution() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("wayfarer")).unwrap();
        std::fs::write(
            tmp.path().join("wayfarer/config.toml"),
            r#"
            [database]
            url = "postgresql://filehost:5432/filedb"

            [plans]
            replace_policy = "rejct"
            "#,
        )
        .unwrap();

        let result = with_config_home(tmp.path(), || WayfarerConfig::resolve(CliOverrides::default()));

        let msg = format!("{:#}", result.unwrap_err());
        assert!(msg.contains("failed to parse config file"), "unexpected error: {msg}");
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();

        let (loaded, resolved) = with_config_home(tmp.path(), || {
            (load_config(), WayfarerConfig::resolve(CliOverrides::default()))
        });

        assert_eq!(loaded.unwrap(), None);
        let config = resolved.unwrap();
        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
        assert_eq!(config.replace_policy, ReplacePolicy::Archive);
    }

    #[cfg(unix)]
    #[test]
    fn save_config_tightens_existing_file() {
        use std::os::unix::fs::PermissionsExt;

        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("wayfarer");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "# left by an older version\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        with_config_home(tmp.path(), || save_config(&sample_file())).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        let loaded: ConfigFile = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, sample_file());
    }

    #[test]
    fn defaults_when_nothing_set() {
        let _lock = lock_env();

        let config = WayfarerConfig::resolve_with(CliOverrides::default(), None).unwrap();
        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
        assert_eq!(config.ai.provider, AiProvider::Mock);
        assert_eq!(config.ai.api_key, None);
        assert_eq!(config.ai.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.ai.model, DEFAULT_MODEL);
        assert_eq!(config.ai.generation_timeout, Duration::from_secs(5));
        assert_eq!(config.replace_policy, ReplacePolicy::Archive);
        assert_eq!(config.bind, DEFAULT_BIND);
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn config_file_values_apply() {
        let _lock = lock_env();

        let config = WayfarerConfig::resolve_with(CliOverrides::default(), Some(sample_file())).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://filehost:5432/filedb");
        assert_eq!(config.ai.provider, AiProvider::OpenRouter);
        assert_eq!(config.ai.api_key.as_deref(), Some("sk-or-file"));
        assert_eq!(config.ai.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.ai.model, "anthropic/claude-3.5-haiku");
        assert_eq!(config.ai.generation_timeout, Duration::from_secs(12));
        assert_eq!(config.replace_policy, ReplacePolicy::Reject);
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn env_overrides_config_file() {
        let _lock = lock_env();
        unsafe { std::env::set_var(DbConfig::URL_ENV, "postgresql://env:5432/envdb") };
        unsafe { std::env::set_var(AI_API_KEY_ENV, "sk-or-env") };
        unsafe { std::env::set_var(GENERATION_TIMEOUT_ENV, "3") };
        unsafe { std::env::set_var(REPLACE_POLICY_ENV, "archive") };
        unsafe { std::env::set_var(PORT_ENV, "7000") };

        let result = WayfarerConfig::resolve_with(CliOverrides::default(), Some(sample_file()));

        for name in ALL_ENV {
            unsafe { std::env::remove_var(name) };
        }

        let config = result.unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");
        assert_eq!(config.ai.api_key.as_deref(), Some("sk-or-env"));
        assert_eq!(config.ai.generation_timeout, Duration::from_secs(3));
        assert_eq!(config.replace_policy, ReplacePolicy::Archive);
        assert_eq!(config.port, 7000);
    }

    #[test]
    fn cli_flags_override_all() {
        let _lock = lock_env();
        unsafe { std::env::set_var(DbConfig::URL_ENV, "postgresql://env:5432/envdb") };
        unsafe { std::env::set_var(BIND_ENV, "10.0.0.1") };

        let result = WayfarerConfig::resolve_with(
            CliOverrides {
                database_url: Some("postgresql://cli:5432/clidb"),
                bind: Some("::1"),
                port: Some(1234),
            },
            Some(sample_file()),
        );

        for name in ALL_ENV {
            unsafe { std::env::remove_var(name) };
        }

        let config = result.unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://cli:5432/clidb");
        assert_eq!(config.bind, "::1");
        assert_eq!(config.port, 1234);
    }

    #[test]
    fn openrouter_without_key_is_an_error() {
        let _lock = lock_env();
        unsafe { std::env::set_var(AI_PROVIDER_ENV, "openrouter") };

        let result = WayfarerConfig::resolve_with(CliOverrides::default(), None);

        unsafe { std::env::remove_var(AI_PROVIDER_ENV) };

        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("AI API key not found"), "unexpected error: {msg}");
    }

    #[test]
    fn invalid_env_values_are_reported() {
        let _lock = lock_env();
        unsafe { std::env::set_var(REPLACE_POLICY_ENV, "overwrite") };
        let result = WayfarerConfig::resolve_with(CliOverrides::default(), None);
        unsafe { std::env::remove_var(REPLACE_POLICY_ENV) };
        assert!(result.is_err());

        unsafe { std::env::set_var(GENERATION_TIMEOUT_ENV, "0") };
        let result = WayfarerConfig::resolve_with(CliOverrides::default(), None);
        unsafe { std::env::remove_var(GENERATION_TIMEOUT_ENV) };
        assert!(result.is_err());
    }

    #[test]
    fn debug_hides_api_key() {
        let _lock = lock_env();
        let config = WayfarerConfig::resolve_with(CliOverrides::default(), Some(sample_file())).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-or-file"));
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("wayfarer/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
