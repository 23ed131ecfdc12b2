use std::env;
use std::fs;
use std::path::Path;

use recarga_core::config::{AppConfig, LoadOptions};
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG};

const UNSET: &str = "<unset>";
const REDACTED: &str = "<redacted>";

pub fn run() -> CommandResult {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => CommandResult { exit_code: 0, output: render(&config) },
        Err(error) => CommandResult {
            exit_code: EXIT_CONFIG,
            output: format!("config validation failed: {error}"),
        },
    }
}

/// One line per effective key with the layer it came from.
pub fn render(config: &AppConfig) -> String {
    let config_file_path = AppConfig::discover_file(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let qr_token = if config.server.qr_access_token.is_some() { REDACTED } else { UNSET };
    let public_base_url = config.storage.public_base_url.as_deref().unwrap_or(UNSET);

    let entries: [(&str, String, &[&str]); 16] = [
        ("database.url", config.database.url.clone(), &["RECARGA_DATABASE_URL"]),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["RECARGA_DATABASE_MAX_CONNECTIONS"],
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["RECARGA_DATABASE_TIMEOUT_SECS"],
        ),
        ("operator.identity", config.operator.identity.clone(), &["RECARGA_OPERATOR_IDENTITY"]),
        (
            "operator.dialog_replacement",
            config.operator.dialog_replacement.as_str().to_string(),
            &["RECARGA_OPERATOR_DIALOG_REPLACEMENT"],
        ),
        (
            "chat.reconnect_max_retries",
            config.chat.reconnect_max_retries.to_string(),
            &["RECARGA_CHAT_RECONNECT_MAX_RETRIES"],
        ),
        (
            "chat.reconnect_base_delay_ms",
            config.chat.reconnect_base_delay_ms.to_string(),
            &["RECARGA_CHAT_RECONNECT_BASE_DELAY_MS"],
        ),
        (
            "chat.reconnect_max_delay_ms",
            config.chat.reconnect_max_delay_ms.to_string(),
            &["RECARGA_CHAT_RECONNECT_MAX_DELAY_MS"],
        ),
        (
            "storage.screenshot_dir",
            config.storage.screenshot_dir.display().to_string(),
            &["RECARGA_STORAGE_SCREENSHOT_DIR"],
        ),
        (
            "storage.public_base_url",
            public_base_url.to_string(),
            &["RECARGA_STORAGE_PUBLIC_BASE_URL"],
        ),
        (
            "server.bind_address",
            config.server.bind_address.clone(),
            &["RECARGA_SERVER_BIND_ADDRESS"],
        ),
        (
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            &["RECARGA_SERVER_HEALTH_CHECK_PORT"],
        ),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["RECARGA_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        ("server.qr_access_token", qr_token.to_string(), &["RECARGA_SERVER_QR_ACCESS_TOKEN"]),
        (
            "logging.level",
            config.logging.level.clone(),
            &["RECARGA_LOGGING_LEVEL", "RECARGA_LOG_LEVEL"],
        ),
        (
            "logging.format",
            config.logging.format.as_str().to_string(),
            &["RECARGA_LOGGING_FORMAT", "RECARGA_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        entries
            .into_iter()
            .map(|(key, value, env_keys)| render_line(key, &value, source(key, env_keys))),
    );
    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use super::{contains_path, field_source};

    #[test]
    fn nested_keys_are_found_in_the_file_document() {
        let doc: toml::Value =
            "[server]\nhealth_check_port = 9000\n".parse().expect("toml document");

        assert!(contains_path(&doc, "server.health_check_port"));
        assert!(!contains_path(&doc, "server.bind_address"));
        assert!(!contains_path(&doc, "logging.level"));
    }

    #[test]
    fn file_layer_is_reported_when_no_env_key_is_set() {
        let doc: toml::Value = "[storage]\nscreenshot_dir = \"shots\"\n".parse().expect("toml");

        let source = field_source(
            "storage.screenshot_dir",
            &["RECARGA_TEST_UNSET_SCREENSHOT_DIR"],
            Some(&doc),
            Some(std::path::Path::new("recarga.toml")),
        );
        assert_eq!(source, "file (recarga.toml)");

        let source = field_source("storage.public_base_url", &[], Some(&doc), None);
        assert_eq!(source, "default");
    }
}
