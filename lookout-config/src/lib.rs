//! Loader for Lookout configuration with YAML + environment overlays.
//!
//! Sources merge in the order they are added, then `LOOKOUT__`-prefixed
//! environment variables win (`LOOKOUT__TWITTER__BEARER_TOKEN` sets
//! `twitter.bearer_token`). String values get recursive `${VAR}` expansion
//! before typed deserialization. Every section has defaults, so an empty
//! source set yields a usable (if account-less) configuration.
use config::{Config, ConfigError, Environment, File};
use lookout_common::observability::{LogConfig, LogFormat};
use lookout_common::{AccountConfig, DispatchMode, FetchStrategy};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LookoutConfig {
    pub version: Option<String>,
    pub twitter: TwitterSection,
    pub accounts: Vec<AccountSpec>,
    pub limits: LimitsSection,
    pub dispatch: DispatchSection,
    pub server: ServerSection,
    pub logging: LoggingSection,
}

impl LookoutConfig {
    /// The tracked accounts, with display names filled in.
    pub fn account_configs(&self) -> Vec<AccountConfig> {
        self.accounts.iter().map(AccountSpec::to_account).collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for account in &self.accounts {
            let name = account.username.trim();
            if name.is_empty() {
                return Err(ConfigError::Message("account with empty username".into()));
            }
            if !seen.insert(name.to_ascii_lowercase()) {
                return Err(ConfigError::Message(format!(
                    "duplicate account username: {name}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TwitterSection {
    pub bearer_token: Option<String>,
    pub base_url: String,
    pub max_results: u32,
    pub max_retries: usize,
    pub timeout_secs: u64,
    pub strategy: FetchStrategy,
}

impl Default for TwitterSection {
    fn default() -> Self {
        Self {
            bearer_token: None,
            base_url: "https://api.twitter.com".into(),
            max_results: 10,
            max_retries: 3,
            timeout_secs: 15,
            strategy: FetchStrategy::Timeline,
        }
    }
}

impl TwitterSection {
    /// The bearer token, unless it is blank or an unexpanded `${...}` placeholder.
    pub fn bearer(&self) -> Option<&str> {
        self.bearer_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty() && !t.contains("${"))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountSpec {
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl AccountSpec {
    pub fn to_account(&self) -> AccountConfig {
        let username = self.username.trim();
        match self.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => AccountConfig::new(username, name),
            _ => AccountConfig::bare(username),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    pub cooldown_secs: u64,
    /// `0` disables the global quota.
    pub global_max_calls: u32,
    pub global_window_secs: u64,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            cooldown_secs: 300,
            global_max_calls: 900,
            global_window_secs: 900,
        }
    }
}

impl LimitsSection {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Ceiling and window of the global quota, if enabled.
    pub fn global_quota(&self) -> Option<(u32, Duration)> {
        (self.global_max_calls > 0)
            .then(|| (self.global_max_calls, Duration::from_secs(self.global_window_secs)))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    pub mode: DispatchMode,
    /// Pause between accounts in sequential mode.
    pub delay_ms: u64,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            mode: DispatchMode::Sequential,
            delay_ms: 1000,
        }
    }
}

impl DispatchSection {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    pub request_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
            request_timeout_secs: 60,
        }
    }
}

impl ServerSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub format: LogFormat,
    pub emit_stderr: bool,
    pub dir: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            emit_stderr: true,
            dir: None,
        }
    }
}

impl LoggingSection {
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            log_dir: self.dir.clone(),
            emit_stderr: self.emit_stderr,
            format: self.format,
            ..LogConfig::default()
        }
    }
}

/// `<config dir>/lookout/lookout.yaml`, e.g. `~/.config/lookout/lookout.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lookout").join("lookout.yaml"))
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct LookoutConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for LookoutConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl LookoutConfigLoader {
    /// Start with `LOOKOUT__` env overrides only.
    ///
    /// ```
    /// use lookout_config::LookoutConfigLoader;
    ///
    /// let config = LookoutConfigLoader::new()
    ///     .with_yaml_str("version: '1'\naccounts: []")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert!(config.accounts.is_empty());
    /// assert_eq!(config.twitter.max_retries, 3);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a required YAML/TOML/JSON file; the format is inferred by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that may be absent, so headless deployments can rely on
    /// environment variables alone.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet.
    ///
    /// ```
    /// use lookout_common::{DispatchMode, FetchStrategy};
    /// use lookout_config::LookoutConfigLoader;
    ///
    /// let cfg = LookoutConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// twitter:
    ///   strategy: search
    /// accounts:
    ///   - username: alice
    ///     display_name: Alice
    ///   - username: bob
    /// dispatch:
    ///   mode: concurrent
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.twitter.strategy, FetchStrategy::Search);
    /// assert_eq!(cfg.dispatch.mode, DispatchMode::Concurrent);
    /// let accounts = cfg.account_configs();
    /// assert_eq!(accounts[0].display_name, "Alice");
    /// assert_eq!(accounts[1].display_name, "bob");
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Merge all sources, apply env overrides, expand `${VAR}` placeholders and
    /// validate the account list.
    pub fn load(self) -> Result<LookoutConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix("LOOKOUT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: LookoutConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        typed.validate()?;
        Ok(typed)
    }
}
