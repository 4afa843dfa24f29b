use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use toml::Value;
use tradelane_core::config::{AppConfig, LoadOptions};

use crate::commands::CommandResult;

/// One rendered config field with the env variable that can override it.
struct Field {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            Some(field.env_key),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let field =
        |key: &'static str, env_key: &'static str, value: String| Field { key, env_key, value };
    let messaging = &config.messaging;

    vec![
        field("database.url", "TRADELANE_DATABASE_URL", config.database.url.clone()),
        field(
            "database.max_connections",
            "TRADELANE_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        field(
            "database.timeout_secs",
            "TRADELANE_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        field("messaging.base_url", "TRADELANE_MESSAGING_BASE_URL", messaging.base_url.clone()),
        field(
            "messaging.account_id",
            "TRADELANE_MESSAGING_ACCOUNT_ID",
            messaging.account_id.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        field(
            "messaging.auth_token",
            "TRADELANE_MESSAGING_AUTH_TOKEN",
            redact_secret(messaging.auth_token.as_ref()),
        ),
        field(
            "messaging.requester_role_id",
            "TRADELANE_MESSAGING_REQUESTER_ROLE_ID",
            messaging.requester_role_id.clone(),
        ),
        field(
            "messaging.provider_role_id",
            "TRADELANE_MESSAGING_PROVIDER_ROLE_ID",
            messaging.provider_role_id.clone(),
        ),
        field(
            "messaging.request_timeout_ms",
            "TRADELANE_MESSAGING_REQUEST_TIMEOUT_MS",
            messaging.request_timeout_ms.to_string(),
        ),
        field(
            "server.bind_address",
            "TRADELANE_SERVER_BIND_ADDRESS",
            config.server.bind_address.clone(),
        ),
        field("server.port", "TRADELANE_SERVER_PORT", config.server.port.to_string()),
        field(
            "server.graceful_shutdown_secs",
            "TRADELANE_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        field("logging.level", "TRADELANE_LOGGING_LEVEL", config.logging.level.clone()),
        field(
            "logging.format",
            "TRADELANE_LOGGING_FORMAT",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("tradelane.toml"), PathBuf::from("config/tradelane.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
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

fn redact_secret(secret: Option<&SecretString>) -> String {
    match secret.map(|secret| secret.expose_secret().trim()) {
        None => "<unset>".to_string(),
        Some("") => "<empty>".to_string(),
        Some(_) => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use secrecy::SecretString;
    use toml::Value;

    use super::{contains_path, field_source, redact_secret};

    #[test]
    fn secrets_are_never_rendered() {
        let token = SecretString::from("live-token-123".to_string());

        assert_eq!(redact_secret(Some(&token)), "<redacted>");
        assert_eq!(redact_secret(Some(&SecretString::from("  ".to_string()))), "<empty>");
        assert_eq!(redact_secret(None), "<unset>");
    }

    #[test]
    fn nested_keys_are_found_in_the_file_document() {
        let doc: Value = "[messaging]\nprovider_role_id = \"RL-1\"\n".parse().expect("toml");

        assert!(contains_path(&doc, "messaging.provider_role_id"));
        assert!(!contains_path(&doc, "messaging.base_url"));
        assert!(!contains_path(&doc, "server.port"));
    }

    #[test]
    fn file_source_names_the_file_when_the_key_is_present() {
        let doc: Value = "[server]\nport = 9090\n".parse().expect("toml");

        let source = field_source("server.port", None, Some(&doc), Some(Path::new("tradelane.toml")));
        let fallback = field_source("server.bind_address", None, Some(&doc), None);

        assert_eq!(source, "file (tradelane.toml)");
        assert_eq!(fallback, "default");
    }
}
