use std::env;
use std::sync::{Mutex, OnceLock};

use recarga_cli::commands::{config, doctor, migrate, seed};
use serde_json::Value;
use tempfile::TempDir;

const OPERATOR: &str = "5350000000@s.whatsapp.net";

/// A file-backed database so every pooled connection sees the same schema.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self { dir: tempfile::tempdir().expect("temp dir") }
    }

    fn database_url(&self) -> String {
        format!("sqlite://{}", self.dir.path().join("recarga.db").display())
    }

    fn screenshot_dir(&self) -> String {
        self.dir.path().display().to_string()
    }
}

#[test]
fn migrate_returns_success_with_valid_env() {
    let workspace = Workspace::new();
    let url = workspace.database_url();
    with_env(&[("RECARGA_OPERATOR_IDENTITY", OPERATOR), ("RECARGA_DATABASE_URL", url.as_str())], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_without_operator_identity() {
    with_env(&[], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_describes_the_demo_catalog() {
    let workspace = Workspace::new();
    let url = workspace.database_url();
    with_env(&[("RECARGA_OPERATOR_IDENTITY", OPERATOR), ("RECARGA_DATABASE_URL", url.as_str())], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");
        assert_eq!(
            payload["message"],
            "demo catalog ready: 2 products, 4 offers, 2 payment methods, 1 custom fields"
        );
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    let workspace = Workspace::new();
    let url = workspace.database_url();
    with_env(&[("RECARGA_OPERATOR_IDENTITY", OPERATOR), ("RECARGA_DATABASE_URL", url.as_str())], || {
        let first = parse_payload(&seed::run().output);
        let second = parse_payload(&seed::run().output);

        assert_eq!(first["status"], "ok");
        assert_eq!(second["status"], "ok");
        assert_eq!(first["message"], second["message"]);
    });
}

#[test]
fn seed_reports_config_failure_with_its_exit_code() {
    with_env(&[("RECARGA_OPERATOR_IDENTITY", "has spaces")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

#[test]
fn config_redacts_the_pairing_token_and_names_sources() {
    with_env(
        &[
            ("RECARGA_OPERATOR_IDENTITY", OPERATOR),
            ("RECARGA_SERVER_QR_ACCESS_TOKEN", "very-secret"),
            ("RECARGA_LOG_LEVEL", "debug"),
        ],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);

            assert!(!result.output.contains("very-secret"));
            assert!(result.output.contains(
                "- server.qr_access_token = <redacted> (source: env (RECARGA_SERVER_QR_ACCESS_TOKEN))"
            ));
            assert!(result
                .output
                .contains(&format!("- operator.identity = {OPERATOR} (source: env (RECARGA_OPERATOR_IDENTITY))")));
            assert!(result
                .output
                .contains("- logging.level = debug (source: env (RECARGA_LOG_LEVEL))"));
            assert!(result.output.contains("- storage.public_base_url = <unset> (source: default)"));
        },
    );
}

#[test]
fn doctor_json_passes_with_reachable_database() {
    let workspace = Workspace::new();
    let url = workspace.database_url();
    let screenshots = workspace.screenshot_dir();
    with_env(
        &[
            ("RECARGA_OPERATOR_IDENTITY", OPERATOR),
            ("RECARGA_DATABASE_URL", url.as_str()),
            ("RECARGA_STORAGE_SCREENSHOT_DIR", screenshots.as_str()),
        ],
        || {
            let result = doctor::run(true);
            let payload = parse_payload(&result.output);

            assert_eq!(result.exit_code, 0, "doctor output: {}", result.output);
            assert_eq!(payload["overall_status"], "pass");
            let names: Vec<&str> = payload["checks"]
                .as_array()
                .expect("checks array")
                .iter()
                .filter_map(|check| check["name"].as_str())
                .collect();
            assert_eq!(names, ["config_validation", "database_connectivity", "screenshot_dir"]);
        },
    );
}

#[test]
fn doctor_skips_dependent_checks_when_config_fails() {
    with_env(&[], || {
        let result = doctor::run(false);

        assert_ne!(result.exit_code, 0);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] config_validation:"));
        assert!(result.output.contains("- [skip] database_connectivity:"));
        assert!(result.output.contains("- [skip] screenshot_dir:"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|poison| poison.into_inner());

    let keys = [
        "RECARGA_DATABASE_URL",
        "RECARGA_DATABASE_MAX_CONNECTIONS",
        "RECARGA_DATABASE_TIMEOUT_SECS",
        "RECARGA_OPERATOR_IDENTITY",
        "RECARGA_OPERATOR_DIALOG_REPLACEMENT",
        "RECARGA_CHAT_RECONNECT_MAX_RETRIES",
        "RECARGA_CHAT_RECONNECT_BASE_DELAY_MS",
        "RECARGA_CHAT_RECONNECT_MAX_DELAY_MS",
        "RECARGA_STORAGE_SCREENSHOT_DIR",
        "RECARGA_STORAGE_PUBLIC_BASE_URL",
        "RECARGA_SERVER_BIND_ADDRESS",
        "RECARGA_SERVER_HEALTH_CHECK_PORT",
        "RECARGA_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "RECARGA_SERVER_QR_ACCESS_TOKEN",
        "RECARGA_LOGGING_LEVEL",
        "RECARGA_LOGGING_FORMAT",
        "RECARGA_LOG_LEVEL",
        "RECARGA_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
