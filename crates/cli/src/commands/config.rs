use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use axonbot_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let sources = Sources {
        doc: load_config_file_doc(config_file_path.as_deref()),
        path: config_file_path,
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.push(sources.line(
        "slack.app_token",
        &redact_token(config.slack.app_token.expose_secret()),
        &["AXONBOT_SLACK_APP_TOKEN"],
    ));
    lines.push(sources.line(
        "slack.bot_token",
        &redact_token(config.slack.bot_token.expose_secret()),
        &["AXONBOT_SLACK_BOT_TOKEN"],
    ));
    lines.push(sources.line(
        "slack.https_proxy",
        optional(config.slack.https_proxy.as_deref()),
        &["AXONBOT_SLACK_HTTPS_PROXY"],
    ));
    lines.push(sources.line("inventory.url", &config.inventory.url, &["AXONBOT_INVENTORY_URL"]));
    lines.push(sources.line(
        "inventory.api_key",
        redact_secret(&config.inventory.api_key),
        &["AXONBOT_INVENTORY_API_KEY"],
    ));
    lines.push(sources.line(
        "inventory.api_secret",
        redact_secret(&config.inventory.api_secret),
        &["AXONBOT_INVENTORY_API_SECRET"],
    ));
    lines.push(sources.line(
        "inventory.https_proxy",
        optional(config.inventory.https_proxy.as_deref()),
        &["AXONBOT_INVENTORY_HTTPS_PROXY"],
    ));
    lines.push(sources.line(
        "inventory.timeout_secs",
        &config.inventory.timeout_secs.to_string(),
        &["AXONBOT_INVENTORY_TIMEOUT_SECS"],
    ));
    lines.push(sources.line(
        "inventory.device_fields",
        &config.inventory.device_fields,
        &["AXONBOT_DEVICE_FIELDS"],
    ));
    lines.push(sources.line(
        "inventory.user_fields",
        &config.inventory.user_fields,
        &["AXONBOT_USER_FIELDS"],
    ));
    lines.push(sources.line(
        "cache.ttl_secs",
        &config.cache.ttl_secs.to_string(),
        &["AXONBOT_CACHE_TTL_SECS"],
    ));
    lines.push(sources.line(
        "cache.max_entries",
        &config.cache.max_entries.to_string(),
        &["AXONBOT_CACHE_MAX_ENTRIES"],
    ));
    lines.push(sources.line(
        "server.bind_address",
        &config.server.bind_address,
        &["AXONBOT_SERVER_BIND_ADDRESS"],
    ));
    lines.push(sources.line(
        "server.health_check_port",
        &config.server.health_check_port.to_string(),
        &["AXONBOT_SERVER_HEALTH_CHECK_PORT"],
    ));
    lines.push(sources.line(
        "logging.level",
        &config.logging.level,
        &["AXONBOT_LOGGING_LEVEL", "AXONBOT_LOG_LEVEL"],
    ));
    lines.push(sources.line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        &["AXONBOT_LOGGING_FORMAT", "AXONBOT_LOG_FORMAT"],
    ));

    lines.join("\n")
}

/// Where a value may have come from, besides the environment.
struct Sources {
    doc: Option<Value>,
    path: Option<PathBuf>,
}

impl Sources {
    fn line(&self, key_path: &str, value: &str, env_keys: &[&str]) -> String {
        render_line(
            key_path,
            value,
            field_source(key_path, env_keys, self.doc.as_ref(), self.path.as_deref()),
        )
    }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
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

fn optional(value: Option<&str>) -> &str {
    value.unwrap_or("<unset>")
}

fn redact_secret(secret: &SecretString) -> &'static str {
    if secret.expose_secret().trim().is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
