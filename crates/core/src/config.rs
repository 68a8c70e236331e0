use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub crm: CrmConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub backend: SessionBackend,
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub report_max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CrmConfig {
    pub enabled: bool,
    pub access_token: SecretString,
    pub base_url: String,
    pub default_owner_id: String,
    pub portal_id: String,
    /// Attendees from this company are our own reps, not the customer.
    pub internal_company: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionBackend {
    Memory,
    Redis,
    Sqlite,
}

impl SessionBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
            Self::Sqlite => "sqlite",
        }
    }
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
    pub session_backend: Option<SessionBackend>,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub server_port: Option<u16>,
    pub crm_enabled: Option<bool>,
    pub crm_access_token: Option<String>,
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

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig {
                backend: SessionBackend::Memory,
                ttl_secs: 30 * 60,
                sweep_interval_secs: 60,
            },
            database: DatabaseConfig {
                url: "sqlite://debrief.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            redis: RedisConfig { url: "redis://127.0.0.1:6379".to_string() },
            llm: LlmConfig {
                api_key: String::new().into(),
                base_url: "https://api.anthropic.com".to_string(),
                model: "claude-opus-4-6".to_string(),
                max_tokens: 1024,
                report_max_tokens: 4096,
                timeout_secs: 60,
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 3001,
                graceful_shutdown_secs: 15,
            },
            crm: CrmConfig {
                enabled: false,
                access_token: String::new().into(),
                base_url: "https://api.hubapi.com".to_string(),
                default_owner_id: "211824246".to_string(),
                portal_id: "4936417".to_string(),
                internal_company: "WestRock".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for SessionBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ConfigError::Validation(format!(
                "unsupported session backend `{other}` (expected memory|redis|sqlite)"
            ))),
        }
    }
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("debrief.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn session_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.session.ttl_secs)
    }

    /// Deal link in the CRM web app.
    pub fn deal_url(&self, deal_id: &str) -> String {
        format!("https://app.hubspot.com/contacts/{}/deal/{deal_id}", self.crm.portal_id)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(session) = patch.session {
            if let Some(backend) = session.backend {
                self.session.backend = backend;
            }
            if let Some(ttl_secs) = session.ttl_secs {
                self.session.ttl_secs = ttl_secs;
            }
            if let Some(sweep_interval_secs) = session.sweep_interval_secs {
                self.session.sweep_interval_secs = sweep_interval_secs;
            }
        }

        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(redis) = patch.redis {
            if let Some(url) = redis.url {
                self.redis.url = url;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = secret_value(api_key);
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(report_max_tokens) = llm.report_max_tokens {
                self.llm.report_max_tokens = report_max_tokens;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(crm) = patch.crm {
            if let Some(enabled) = crm.enabled {
                self.crm.enabled = enabled;
            }
            if let Some(access_token) = crm.access_token {
                self.crm.access_token = secret_value(access_token);
            }
            if let Some(base_url) = crm.base_url {
                self.crm.base_url = base_url;
            }
            if let Some(default_owner_id) = crm.default_owner_id {
                self.crm.default_owner_id = default_owner_id;
            }
            if let Some(portal_id) = crm.portal_id {
                self.crm.portal_id = portal_id;
            }
            if let Some(internal_company) = crm.internal_company {
                self.crm.internal_company = internal_company;
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
        if let Some(value) = read_env("DEBRIEF_SESSION_BACKEND") {
            self.session.backend = value.parse()?;
        }
        if let Some(value) = read_env("DEBRIEF_SESSION_TTL_SECS") {
            self.session.ttl_secs = parse_u64("DEBRIEF_SESSION_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("DEBRIEF_SESSION_SWEEP_INTERVAL_SECS") {
            self.session.sweep_interval_secs =
                parse_u64("DEBRIEF_SESSION_SWEEP_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("DEBRIEF_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("DEBRIEF_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("DEBRIEF_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("DEBRIEF_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("DEBRIEF_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DEBRIEF_REDIS_URL").or_else(|| read_env("REDIS_URL")) {
            self.redis.url = value;
        }

        let api_key = read_env("DEBRIEF_LLM_API_KEY").or_else(|| read_env("ANTHROPIC_API_KEY"));
        if let Some(value) = api_key {
            self.llm.api_key = secret_value(value);
        }
        if let Some(value) = read_env("DEBRIEF_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("DEBRIEF_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("DEBRIEF_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("DEBRIEF_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("DEBRIEF_LLM_REPORT_MAX_TOKENS") {
            self.llm.report_max_tokens = parse_u32("DEBRIEF_LLM_REPORT_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("DEBRIEF_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("DEBRIEF_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DEBRIEF_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("DEBRIEF_SERVER_PORT") {
            self.server.port = parse_u16("DEBRIEF_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("DEBRIEF_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("DEBRIEF_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("DEBRIEF_CRM_ENABLED") {
            self.crm.enabled = parse_bool("DEBRIEF_CRM_ENABLED", &value)?;
        }
        let access_token =
            read_env("DEBRIEF_CRM_ACCESS_TOKEN").or_else(|| read_env("HUBSPOT_ACCESS_TOKEN"));
        if let Some(value) = access_token {
            self.crm.access_token = secret_value(value);
        }
        if let Some(value) = read_env("DEBRIEF_CRM_BASE_URL") {
            self.crm.base_url = value;
        }
        if let Some(value) = read_env("DEBRIEF_CRM_DEFAULT_OWNER_ID") {
            self.crm.default_owner_id = value;
        }
        if let Some(value) = read_env("DEBRIEF_CRM_PORTAL_ID") {
            self.crm.portal_id = value;
        }
        if let Some(value) = read_env("DEBRIEF_CRM_INTERNAL_COMPANY") {
            self.crm.internal_company = value;
        }

        let log_level = read_env("DEBRIEF_LOGGING_LEVEL").or_else(|| read_env("DEBRIEF_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DEBRIEF_LOGGING_FORMAT").or_else(|| read_env("DEBRIEF_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(backend) = overrides.session_backend {
            self.session.backend = backend;
        }
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(redis_url) = overrides.redis_url {
            self.redis.url = redis_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = secret_value(llm_api_key);
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(enabled) = overrides.crm_enabled {
            self.crm.enabled = enabled;
        }
        if let Some(access_token) = overrides.crm_access_token {
            self.crm.access_token = secret_value(access_token);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_session(&self.session)?;
        validate_database(&self.database)?;
        if self.session.backend == SessionBackend::Redis {
            validate_redis(&self.redis)?;
        }
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_crm(&self.crm)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("debrief.toml"), PathBuf::from("config/debrief.toml")]
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

const MAX_SESSION_TTL_SECS: u64 = 7 * 24 * 60 * 60;

fn validate_session(session: &SessionConfig) -> Result<(), ConfigError> {
    if session.ttl_secs == 0 || session.ttl_secs > MAX_SESSION_TTL_SECS {
        return Err(ConfigError::Validation(format!(
            "session.ttl_secs must be in range 1..={MAX_SESSION_TTL_SECS}"
        )));
    }

    if session.sweep_interval_secs == 0 || session.sweep_interval_secs > session.ttl_secs {
        return Err(ConfigError::Validation(
            "session.sweep_interval_secs must be in range 1..=session.ttl_secs".to_string(),
        ));
    }

    Ok(())
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_redis(redis: &RedisConfig) -> Result<(), ConfigError> {
    let url = redis.url.trim();
    if !url.starts_with("redis://") && !url.starts_with("rediss://") {
        return Err(ConfigError::Validation(
            "redis.url must start with redis:// or rediss:// when session.backend is redis"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.api_key is required (set DEBRIEF_LLM_API_KEY or ANTHROPIC_API_KEY)".to_string(),
        ));
    }

    if !llm.base_url.starts_with("http://") && !llm.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if llm.max_tokens == 0 || llm.report_max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens and llm.report_max_tokens must be greater than zero".to_string(),
        ));
    }

    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
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

fn validate_crm(crm: &CrmConfig) -> Result<(), ConfigError> {
    if crm.enabled && crm.access_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "crm.enabled is true but crm.access_token is missing (set HUBSPOT_ACCESS_TOKEN)"
                .to_string(),
        ));
    }

    if !crm.base_url.starts_with("http://") && !crm.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "crm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if crm.default_owner_id.trim().is_empty() || crm.portal_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crm.default_owner_id and crm.portal_id must not be empty".to_string(),
        ));
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

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    session: Option<SessionPatch>,
    database: Option<DatabasePatch>,
    redis: Option<RedisPatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    crm: Option<CrmPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    backend: Option<SessionBackend>,
    ttl_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RedisPatch {
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    report_max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct CrmPatch {
    enabled: Option<bool>,
    access_token: Option<String>,
    base_url: Option<String>,
    default_owner_id: Option<String>,
    portal_id: Option<String>,
    internal_company: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::{ExposeSecret, SecretString};
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, SessionBackend};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const TOUCHED_VARS: &[&str] = &[
        "DEBRIEF_LLM_API_KEY",
        "ANTHROPIC_API_KEY",
        "DEBRIEF_DATABASE_URL",
        "DEBRIEF_SESSION_BACKEND",
        "DEBRIEF_SESSION_TTL_SECS",
        "DEBRIEF_LOG_LEVEL",
        "DEBRIEF_LOG_FORMAT",
        "DEBRIEF_CRM_ENABLED",
        "HUBSPOT_ACCESS_TOKEN",
        "TEST_DEBRIEF_API_KEY",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_match_service_conventions() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(TOUCHED_VARS);

        env::set_var("ANTHROPIC_API_KEY", "sk-ant-test");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.server.port == 3001, "default port should be 3001")?;
            ensure(config.server.bind_address == "0.0.0.0", "default host should be 0.0.0.0")?;
            ensure(config.session.ttl_secs == 1800, "default ttl should be thirty minutes")?;
            ensure(config.session.sweep_interval_secs == 60, "sweeper should run every minute")?;
            ensure(
                config.session.backend == SessionBackend::Memory,
                "memory backend should be the default",
            )?;
            ensure(config.llm.max_tokens == 1024, "interview turns cap at 1024 tokens")?;
            ensure(config.llm.report_max_tokens == 4096, "reports cap at 4096 tokens")?;
            ensure(
                config.deal_url("77") == "https://app.hubspot.com/contacts/4936417/deal/77",
                "deal url should use the portal id",
            )?;
            Ok(())
        })();

        clear_vars(TOUCHED_VARS);
        result
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(TOUCHED_VARS);

        env::set_var("TEST_DEBRIEF_API_KEY", "sk-ant-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("debrief.toml");
            fs::write(
                &path,
                r#"
[llm]
api_key = "${TEST_DEBRIEF_API_KEY}"

[session]
backend = "sqlite"
ttl_secs = 600
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.api_key.expose_secret() == "sk-ant-from-env",
                "api key should be interpolated from environment",
            )?;
            ensure(
                config.session.backend == SessionBackend::Sqlite,
                "session backend should come from file",
            )?;
            ensure(config.session.ttl_secs == 600, "ttl should come from file")?;
            Ok(())
        })();

        clear_vars(TOUCHED_VARS);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(TOUCHED_VARS);

        env::set_var("DEBRIEF_LLM_API_KEY", "sk-ant-test");
        env::set_var("DEBRIEF_LOG_LEVEL", "warn");
        env::set_var("DEBRIEF_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(TOUCHED_VARS);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(TOUCHED_VARS);

        env::set_var("DEBRIEF_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("DEBRIEF_LLM_API_KEY", "sk-ant-from-env");
        env::set_var("DEBRIEF_SESSION_TTL_SECS", "900");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("debrief.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[llm]
api_key = "sk-ant-from-file"
model = "model-from-file"

[session]
ttl_secs = 300

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.llm.api_key.expose_secret() == "sk-ant-from-env",
                "env api key should win over file and defaults",
            )?;
            ensure(config.session.ttl_secs == 900, "env ttl should win over file")?;
            ensure(config.llm.model == "model-from-file", "file model should win over default")?;
            Ok(())
        })();

        clear_vars(TOUCHED_VARS);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(TOUCHED_VARS);

        let missing_key = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => return Err("expected validation failure but config load succeeded".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(missing_key, ConfigError::Validation(ref message) if message.contains("llm.api_key")),
            "validation failure should mention llm.api_key",
        )?;

        env::set_var("DEBRIEF_LLM_API_KEY", "sk-ant-test");
        env::set_var("DEBRIEF_CRM_ENABLED", "true");
        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected crm validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::Validation(ref message) if message.contains("crm.access_token")),
                "validation failure should mention crm.access_token",
            )?;

            env::set_var("HUBSPOT_ACCESS_TOKEN", "pat-na1-test");
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.crm.enabled, "crm should be enabled once a token is present")
        })();

        clear_vars(TOUCHED_VARS);
        result
    }

    #[test]
    fn invalid_backend_and_numbers_are_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(TOUCHED_VARS);

        env::set_var("DEBRIEF_LLM_API_KEY", "sk-ant-test");
        env::set_var("DEBRIEF_SESSION_BACKEND", "memcached");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("memcached backend should be rejected".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::Validation(ref message) if message.contains("memcached")),
                "error should name the unsupported backend",
            )?;

            env::set_var("DEBRIEF_SESSION_BACKEND", "memory");
            env::set_var("DEBRIEF_SESSION_TTL_SECS", "half-hour");
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("non-numeric ttl should be rejected".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "DEBRIEF_SESSION_TTL_SECS"),
                "error should name the env var",
            )
        })();

        clear_vars(TOUCHED_VARS);
        result
    }

    #[test]
    fn session_ttl_beyond_a_week_is_rejected() {
        let mut config = AppConfig::default();
        config.llm.api_key = SecretString::from("sk-ant-test".to_string());
        config.session.ttl_secs = 10_000_000_000_000;

        let error = config.validate().expect_err("oversized ttl should fail validation");
        assert!(
            matches!(error, ConfigError::Validation(ref message) if message.contains("session.ttl_secs")),
            "unexpected error: {error}"
        );

        config.session.ttl_secs = 7 * 24 * 60 * 60;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(TOUCHED_VARS);

        env::set_var("DEBRIEF_LLM_API_KEY", "sk-ant-secret-value");
        env::set_var("HUBSPOT_ACCESS_TOKEN", "pat-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-ant-secret-value"), "debug output should not contain api key")?;
            ensure(!debug.contains("pat-secret-value"), "debug output should not contain crm token")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(TOUCHED_VARS);
        result
    }
}
