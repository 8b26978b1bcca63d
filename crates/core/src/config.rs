use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    pub registry: RegistryConfig,
    pub watch: WatchConfig,
    pub deploy: DeployConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub api_base_url: String,
    pub poll_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RegistryConfig {
    pub base_url: String,
    pub page_size: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WatchConfig {
    pub interval_secs: u64,
    pub first_run_delay_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DeployConfig {
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub telegram_bot_token: Option<String>,
    pub telegram_api_base_url: Option<String>,
    pub registry_base_url: Option<String>,
    pub storage_path: Option<PathBuf>,
    pub watch_interval_secs: Option<u64>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_CONFIG_FILE: &str = "tagwatch.toml";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig {
                bot_token: String::new().into(),
                api_base_url: "https://api.telegram.org".to_string(),
                poll_timeout_secs: 30,
            },
            registry: RegistryConfig {
                base_url: "https://hub.docker.com".to_string(),
                page_size: 100,
                timeout_secs: 10,
            },
            watch: WatchConfig { interval_secs: 3600, first_run_delay_secs: 10 },
            deploy: DeployConfig { timeout_secs: 15 },
            storage: StorageConfig { path: PathBuf::from("data/tracked_repos.json") },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(telegram) = patch.telegram {
            if let Some(bot_token) = telegram.bot_token {
                self.telegram.bot_token = secret_value(bot_token);
            }
            if let Some(api_base_url) = telegram.api_base_url {
                self.telegram.api_base_url = api_base_url;
            }
            if let Some(poll_timeout_secs) = telegram.poll_timeout_secs {
                self.telegram.poll_timeout_secs = poll_timeout_secs;
            }
        }

        if let Some(registry) = patch.registry {
            if let Some(base_url) = registry.base_url {
                self.registry.base_url = base_url;
            }
            if let Some(page_size) = registry.page_size {
                self.registry.page_size = page_size;
            }
            if let Some(timeout_secs) = registry.timeout_secs {
                self.registry.timeout_secs = timeout_secs;
            }
        }

        if let Some(watch) = patch.watch {
            if let Some(interval_secs) = watch.interval_secs {
                self.watch.interval_secs = interval_secs;
            }
            if let Some(first_run_delay_secs) = watch.first_run_delay_secs {
                self.watch.first_run_delay_secs = first_run_delay_secs;
            }
        }

        if let Some(deploy) = patch.deploy {
            if let Some(timeout_secs) = deploy.timeout_secs {
                self.deploy.timeout_secs = timeout_secs;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(path) = storage.path {
                self.storage.path = path;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TAGWATCH_TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("TAGWATCH_TELEGRAM_API_BASE_URL") {
            self.telegram.api_base_url = value;
        }
        if let Some(value) = read_env("TAGWATCH_TELEGRAM_POLL_TIMEOUT_SECS") {
            self.telegram.poll_timeout_secs =
                parse_u64("TAGWATCH_TELEGRAM_POLL_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TAGWATCH_REGISTRY_BASE_URL") {
            self.registry.base_url = value;
        }
        if let Some(value) = read_env("TAGWATCH_REGISTRY_PAGE_SIZE") {
            self.registry.page_size = parse_u32("TAGWATCH_REGISTRY_PAGE_SIZE", &value)?;
        }
        if let Some(value) = read_env("TAGWATCH_REGISTRY_TIMEOUT_SECS") {
            self.registry.timeout_secs = parse_u64("TAGWATCH_REGISTRY_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TAGWATCH_WATCH_INTERVAL_SECS") {
            self.watch.interval_secs = parse_u64("TAGWATCH_WATCH_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("TAGWATCH_WATCH_FIRST_RUN_DELAY_SECS") {
            self.watch.first_run_delay_secs =
                parse_u64("TAGWATCH_WATCH_FIRST_RUN_DELAY_SECS", &value)?;
        }

        if let Some(value) = read_env("TAGWATCH_DEPLOY_TIMEOUT_SECS") {
            self.deploy.timeout_secs = parse_u64("TAGWATCH_DEPLOY_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TAGWATCH_STORAGE_PATH") {
            self.storage.path = PathBuf::from(value);
        }

        if let Some(value) = read_env("TAGWATCH_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TAGWATCH_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("TAGWATCH_SERVER_HEALTH_CHECK_PORT", &value)?;
        }

        let log_level =
            read_env("TAGWATCH_LOGGING_LEVEL").or_else(|| read_env("TAGWATCH_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TAGWATCH_LOGGING_FORMAT").or_else(|| read_env("TAGWATCH_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bot_token) = overrides.telegram_bot_token {
            self.telegram.bot_token = secret_value(bot_token);
        }
        if let Some(api_base_url) = overrides.telegram_api_base_url {
            self.telegram.api_base_url = api_base_url;
        }
        if let Some(base_url) = overrides.registry_base_url {
            self.registry.base_url = base_url;
        }
        if let Some(path) = overrides.storage_path {
            self.storage.path = path;
        }
        if let Some(interval_secs) = overrides.watch_interval_secs {
            self.watch.interval_secs = interval_secs;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_telegram(&self.telegram)?;
        validate_registry(&self.registry)?;
        validate_watch(&self.watch)?;
        validate_deploy(&self.deploy)?;
        validate_storage(&self.storage)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Path of the config file `load` would read, if one exists.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_telegram(telegram: &TelegramConfig) -> Result<(), ConfigError> {
    let bot_token = telegram.bot_token.expose_secret();
    if bot_token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "telegram.bot_token is required. Create a bot with @BotFather and copy its token"
                .to_string(),
        ));
    }

    let well_formed = bot_token.split_once(':').is_some_and(|(bot_id, secret)| {
        !bot_id.is_empty() && bot_id.bytes().all(|byte| byte.is_ascii_digit()) && !secret.is_empty()
    });
    if !well_formed {
        return Err(ConfigError::Validation(
            "telegram.bot_token must look like `<bot id>:<secret>` as issued by @BotFather"
                .to_string(),
        ));
    }

    validate_http_url("telegram.api_base_url", &telegram.api_base_url)?;
    if telegram.poll_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "telegram.poll_timeout_secs must be in range 0..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_registry(registry: &RegistryConfig) -> Result<(), ConfigError> {
    validate_http_url("registry.base_url", &registry.base_url)?;

    if registry.page_size == 0 || registry.page_size > 100 {
        return Err(ConfigError::Validation(
            "registry.page_size must be in range 1..=100".to_string(),
        ));
    }

    validate_timeout("registry.timeout_secs", registry.timeout_secs)
}

fn validate_watch(watch: &WatchConfig) -> Result<(), ConfigError> {
    if watch.interval_secs == 0 {
        return Err(ConfigError::Validation(
            "watch.interval_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_deploy(deploy: &DeployConfig) -> Result<(), ConfigError> {
    validate_timeout("deploy.timeout_secs", deploy.timeout_secs)
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    if storage.path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("storage.path must not be empty".to_string()));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{key} must start with http:// or https://")));
    }

    Ok(())
}

fn validate_timeout(key: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 || value > 300 {
        return Err(ConfigError::Validation(format!("{key} must be in range 1..=300")));
    }

    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    telegram: Option<TelegramPatch>,
    registry: Option<RegistryPatch>,
    watch: Option<WatchPatch>,
    deploy: Option<DeployPatch>,
    storage: Option<StoragePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramPatch {
    bot_token: Option<String>,
    api_base_url: Option<String>,
    poll_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RegistryPatch {
    base_url: Option<String>,
    page_size: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WatchPatch {
    interval_secs: Option<u64>,
    first_run_delay_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DeployPatch {
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
