use std::env;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use tempfile::TempDir;
use tradelane_cli::commands::{config, migrate, provision, seed};

const ROLE_VARS: [(&str, &str); 2] = [
    ("TRADELANE_MESSAGING_REQUESTER_ROLE_ID", "RL-requester"),
    ("TRADELANE_MESSAGING_PROVIDER_ROLE_ID", "RL-provider"),
];

#[test]
fn migrate_returns_success_with_valid_env() {
    let dir = TempDir::new().expect("temp dir");
    let url = database_url(&dir);

    with_env(&valid_env(&url), || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_without_role_ids() {
    with_env(&[("TRADELANE_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_loads_the_demo_directory_and_can_be_repeated() {
    let dir = TempDir::new().expect("temp dir");
    let url = database_url(&dir);

    with_env(&valid_env(&url), || {
        let first = seed::run();
        let second = seed::run();

        assert_eq!(first.exit_code, 0, "first seed failed: {}", first.output);
        assert_eq!(second.exit_code, 0, "second seed failed: {}", second.output);
        let payload = parse_payload(&second.output);
        assert_eq!(payload["command"], "seed");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("4 organizations"), "got {message}");
        assert!(message.contains("quote-demo-001"), "got {message}");
    });
}

#[test]
fn config_redacts_the_provider_token() {
    let mut vars = valid_env("sqlite::memory:");
    vars.push(("TRADELANE_MESSAGING_AUTH_TOKEN", "super-secret-token"));

    with_env(&vars, || {
        let result = config::run();

        assert_eq!(result.exit_code, 0);
        assert!(!result.output.contains("super-secret-token"));
        assert!(result.output.contains(
            "- messaging.auth_token = <redacted> (source: env (TRADELANE_MESSAGING_AUTH_TOKEN))"
        ));
        assert!(result.output.contains("- messaging.provider_role_id = RL-provider"));
        assert!(result.output.contains("- server.port = 8080 (source: default)"));
    });
}

#[test]
fn provision_for_a_user_without_memberships_is_a_no_op() {
    let dir = TempDir::new().expect("temp dir");
    let url = database_url(&dir);

    with_env(&valid_env(&url), || {
        let result = provision::run("u-nobody", &[]);
        assert_eq!(result.exit_code, 0, "provision failed: {}", result.output);

        let payload = parse_payload(&result.output);
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("0 organizations, 0 threads"), "got {message}");
    });
}

#[test]
fn provision_reports_quotes_skipped_when_the_provider_is_unreachable() {
    let dir = TempDir::new().expect("temp dir");
    let url = database_url(&dir);
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let address = listener.local_addr().expect("local addr");
    drop(listener);
    let base_url = format!("http://{address}/v1");

    let mut vars = valid_env(&url);
    vars.push(("TRADELANE_MESSAGING_BASE_URL", base_url.as_str()));
    vars.push(("TRADELANE_MESSAGING_REQUEST_TIMEOUT_MS", "500"));

    with_env(&vars, || {
        assert_eq!(seed::run().exit_code, 0);

        let result = provision::run("u-gallery", &[]);
        assert_eq!(result.exit_code, 0, "provision failed: {}", result.output);

        let payload = parse_payload(&result.output);
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("2 organizations, 0 threads"), "got {message}");
        assert!(message.contains("skipped 3"), "got {message}");
        assert!(message.contains("org-gallery/quote-demo-001"), "got {message}");
    });
}

#[test]
fn provision_rejects_a_blank_user() {
    with_env(&valid_env("sqlite::memory:"), || {
        let result = provision::run("  ", &[]);

        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_arguments");
    });
}

fn database_url(dir: &TempDir) -> String {
    format!("sqlite://{}", dir.path().join("tradelane.db").display())
}

fn valid_env(database_url: &str) -> Vec<(&'static str, &str)> {
    let mut vars: Vec<(&'static str, &str)> = ROLE_VARS.to_vec();
    vars.push(("TRADELANE_DATABASE_URL", database_url));
    vars
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "TRADELANE_DATABASE_URL",
        "TRADELANE_DATABASE_MAX_CONNECTIONS",
        "TRADELANE_DATABASE_TIMEOUT_SECS",
        "TRADELANE_MESSAGING_BASE_URL",
        "TRADELANE_MESSAGING_ACCOUNT_ID",
        "TRADELANE_MESSAGING_AUTH_TOKEN",
        "TRADELANE_MESSAGING_REQUESTER_ROLE_ID",
        "TRADELANE_MESSAGING_PROVIDER_ROLE_ID",
        "TRADELANE_MESSAGING_REQUEST_TIMEOUT_MS",
        "TRADELANE_SERVER_BIND_ADDRESS",
        "TRADELANE_SERVER_PORT",
        "TRADELANE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "TRADELANE_LOGGING_LEVEL",
        "TRADELANE_LOGGING_FORMAT",
        "TRADELANE_LOG_LEVEL",
        "TRADELANE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }
}
