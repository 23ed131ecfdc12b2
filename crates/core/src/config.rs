use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub operator: OperatorConfig,
    pub chat: ChatConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Chat identity allowed to run administrative commands.
    pub identity: String,
    pub dialog_replacement: DialogReplacementPolicy,
}

#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub reconnect_max_retries: u32,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub screenshot_dir: PathBuf,
    pub public_base_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
    pub qr_access_token: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// What happens when the operator starts a dialog while another one is open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogReplacementPolicy {
    /// Discard the open dialog and start the new one.
    #[default]
    Replace,
    /// Replace, but tell the operator which dialog was discarded.
    Warn,
    /// Refuse the new command until the open dialog finishes or is cancelled.
    Block,
}

impl DialogReplacementPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Warn => "warn",
            Self::Block => "block",
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

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub operator_identity: Option<String>,
    pub dialog_replacement: Option<DialogReplacementPolicy>,
    pub screenshot_dir: Option<PathBuf>,
    pub health_check_port: Option<u16>,
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
            database: DatabaseConfig {
                url: "sqlite://recarga.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            operator: OperatorConfig {
                identity: String::new(),
                dialog_replacement: DialogReplacementPolicy::Replace,
            },
            chat: ChatConfig {
                reconnect_max_retries: 5,
                reconnect_base_delay_ms: 500,
                reconnect_max_delay_ms: 30_000,
            },
            storage: StorageConfig {
                screenshot_dir: PathBuf::from("screenshots"),
                public_base_url: None,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
                qr_access_token: None,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for DialogReplacementPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "warn" => Ok(Self::Warn),
            "block" => Ok(Self::Block),
            other => Err(ConfigError::Validation(format!(
                "unsupported dialog replacement policy `{other}` (expected replace|warn|block)"
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("recarga.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Path of the file `load` would read, if any.
    pub fn discover_file(explicit_path: Option<&Path>) -> Option<PathBuf> {
        resolve_config_path(explicit_path)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
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

        if let Some(operator) = patch.operator {
            if let Some(identity) = operator.identity {
                self.operator.identity = identity;
            }
            if let Some(dialog_replacement) = operator.dialog_replacement {
                self.operator.dialog_replacement = dialog_replacement;
            }
        }

        if let Some(chat) = patch.chat {
            if let Some(max_retries) = chat.reconnect_max_retries {
                self.chat.reconnect_max_retries = max_retries;
            }
            if let Some(base_delay_ms) = chat.reconnect_base_delay_ms {
                self.chat.reconnect_base_delay_ms = base_delay_ms;
            }
            if let Some(max_delay_ms) = chat.reconnect_max_delay_ms {
                self.chat.reconnect_max_delay_ms = max_delay_ms;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(screenshot_dir) = storage.screenshot_dir {
                self.storage.screenshot_dir = screenshot_dir;
            }
            if let Some(public_base_url) = storage.public_base_url {
                self.storage.public_base_url = Some(public_base_url);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(qr_token_value) = server.qr_access_token {
                self.server.qr_access_token = Some(secret_value(qr_token_value));
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
        if let Some(value) = read_env("RECARGA_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("RECARGA_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("RECARGA_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("RECARGA_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("RECARGA_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("RECARGA_OPERATOR_IDENTITY") {
            self.operator.identity = value;
        }
        if let Some(value) = read_env("RECARGA_OPERATOR_DIALOG_REPLACEMENT") {
            self.operator.dialog_replacement = value.parse()?;
        }

        if let Some(value) = read_env("RECARGA_CHAT_RECONNECT_MAX_RETRIES") {
            self.chat.reconnect_max_retries =
                parse_u32("RECARGA_CHAT_RECONNECT_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("RECARGA_CHAT_RECONNECT_BASE_DELAY_MS") {
            self.chat.reconnect_base_delay_ms =
                parse_u64("RECARGA_CHAT_RECONNECT_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("RECARGA_CHAT_RECONNECT_MAX_DELAY_MS") {
            self.chat.reconnect_max_delay_ms =
                parse_u64("RECARGA_CHAT_RECONNECT_MAX_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("RECARGA_STORAGE_SCREENSHOT_DIR") {
            self.storage.screenshot_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("RECARGA_STORAGE_PUBLIC_BASE_URL") {
            self.storage.public_base_url = Some(value);
        }

        if let Some(value) = read_env("RECARGA_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("RECARGA_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("RECARGA_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("RECARGA_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("RECARGA_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("RECARGA_SERVER_QR_ACCESS_TOKEN") {
            self.server.qr_access_token = Some(secret_value(value));
        }

        let log_level =
            read_env("RECARGA_LOGGING_LEVEL").or_else(|| read_env("RECARGA_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("RECARGA_LOGGING_FORMAT").or_else(|| read_env("RECARGA_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(identity) = overrides.operator_identity {
            self.operator.identity = identity;
        }
        if let Some(dialog_replacement) = overrides.dialog_replacement {
            self.operator.dialog_replacement = dialog_replacement;
        }
        if let Some(screenshot_dir) = overrides.screenshot_dir {
            self.storage.screenshot_dir = screenshot_dir;
        }
        if let Some(port) = overrides.health_check_port {
            self.server.health_check_port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_operator(&self.operator)?;
        validate_chat(&self.chat)?;
        validate_storage(&self.storage)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("recarga.toml"), PathBuf::from("config/recarga.toml")]
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

fn validate_operator(operator: &OperatorConfig) -> Result<(), ConfigError> {
    let identity = operator.identity.trim();
    if identity.is_empty() {
        return Err(ConfigError::Validation(
            "operator.identity is required. Set it to the chat identity of the administrator \
             (e.g. RECARGA_OPERATOR_IDENTITY=5350000000)"
                .to_string(),
        ));
    }
    if identity.chars().any(char::is_whitespace) {
        return Err(ConfigError::Validation(
            "operator.identity must not contain whitespace".to_string(),
        ));
    }
    Ok(())
}

fn validate_chat(chat: &ChatConfig) -> Result<(), ConfigError> {
    if chat.reconnect_base_delay_ms == 0 {
        return Err(ConfigError::Validation(
            "chat.reconnect_base_delay_ms must be greater than zero".to_string(),
        ));
    }
    if chat.reconnect_max_delay_ms < chat.reconnect_base_delay_ms {
        return Err(ConfigError::Validation(
            "chat.reconnect_max_delay_ms must be >= chat.reconnect_base_delay_ms".to_string(),
        ));
    }
    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    if storage.screenshot_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("storage.screenshot_dir must not be empty".to_string()));
    }

    if let Some(base_url) = &storage.public_base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "storage.public_base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    let blank_token = server
        .qr_access_token
        .as_ref()
        .map(|token| token.expose_secret().trim().is_empty())
        .unwrap_or(false);
    if blank_token {
        return Err(ConfigError::Validation(
            "server.qr_access_token must not be blank when set".to_string(),
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
    database: Option<DatabasePatch>,
    operator: Option<OperatorPatch>,
    chat: Option<ChatPatch>,
    storage: Option<StoragePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct OperatorPatch {
    identity: Option<String>,
    dialog_replacement: Option<DialogReplacementPolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatPatch {
    reconnect_max_retries: Option<u32>,
    reconnect_base_delay_ms: Option<u64>,
    reconnect_max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    screenshot_dir: Option<PathBuf>,
    public_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    qr_access_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, DialogReplacementPolicy, LoadOptions, LogFormat,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

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
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_OPERATOR_IDENTITY", "5350000000");
        env::set_var("TEST_QR_TOKEN", "qr-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("recarga.toml");
            fs::write(
                &path,
                r#"
[operator]
identity = "${TEST_OPERATOR_IDENTITY}"

[server]
qr_access_token = "${TEST_QR_TOKEN}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.operator.identity == "5350000000",
                "operator identity should be interpolated from environment",
            )?;
            ensure(
                config.server.qr_access_token.as_ref().map(|t| t.expose_secret().to_string())
                    == Some("qr-from-env".to_string()),
                "qr token should be interpolated from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_OPERATOR_IDENTITY", "TEST_QR_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RECARGA_OPERATOR_IDENTITY", "5350000000");
        env::set_var("RECARGA_LOG_LEVEL", "warn");
        env::set_var("RECARGA_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["RECARGA_OPERATOR_IDENTITY", "RECARGA_LOG_LEVEL", "RECARGA_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RECARGA_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("RECARGA_OPERATOR_DIALOG_REPLACEMENT", "warn");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("recarga.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[operator]
identity = "5350000000"
dialog_replacement = "block"

[chat]
reconnect_max_retries = 9

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
                config.operator.dialog_replacement == DialogReplacementPolicy::Warn,
                "env dialog policy should win over file",
            )?;
            ensure(config.chat.reconnect_max_retries == 9, "file value should beat default")?;
            ensure(config.operator.identity == "5350000000", "file identity should be kept")?;
            Ok(())
        })();

        clear_vars(&["RECARGA_DATABASE_URL", "RECARGA_OPERATOR_DIALOG_REPLACEMENT"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        clear_vars(&["RECARGA_OPERATOR_IDENTITY"]);

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => return Err("expected validation failure but config load succeeded".to_string()),
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("operator.identity")
        );
        ensure(has_message, "validation failure should mention operator.identity")
    }

    #[test]
    fn invalid_public_base_url_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RECARGA_OPERATOR_IDENTITY", "5350000000");
        env::set_var("RECARGA_STORAGE_PUBLIC_BASE_URL", "files.example.com");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected storage validation failure".to_string()),
            Err(ConfigError::Validation(message)) => ensure(
                message.contains("storage.public_base_url"),
                "error should name storage.public_base_url",
            ),
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["RECARGA_OPERATOR_IDENTITY", "RECARGA_STORAGE_PUBLIC_BASE_URL"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RECARGA_OPERATOR_IDENTITY", "5350000000");
        env::set_var("RECARGA_SERVER_QR_ACCESS_TOKEN", "qr-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("qr-secret-value"), "debug output should not contain qr token")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            ensure(
                config.operator.dialog_replacement == DialogReplacementPolicy::Replace,
                "default dialog policy should be replace",
            )?;
            Ok(())
        })();

        clear_vars(&["RECARGA_OPERATOR_IDENTITY", "RECARGA_SERVER_QR_ACCESS_TOKEN"]);
        result
    }
}
