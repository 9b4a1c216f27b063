use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use roofline_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

/// One reported setting: dotted key, rendered value and the environment
/// variables that can set it, in precedence order.
struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn field(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Field {
    Field { key, value: value.into(), env_keys }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        field("business.name", &config.business.name, &["ROOFLINE_BUSINESS_NAME"]),
        field(
            "business.service_area",
            &config.business.service_area,
            &["ROOFLINE_BUSINESS_SERVICE_AREA"],
        ),
        field("database.url", &config.database.url, &["ROOFLINE_DATABASE_URL"]),
        field(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["ROOFLINE_DATABASE_MAX_CONNECTIONS"],
        ),
        field("server.bind_address", &config.server.bind_address, &["ROOFLINE_SERVER_BIND_ADDRESS"]),
        field("server.port", config.server.port.to_string(), &["ROOFLINE_SERVER_PORT"]),
        field("pricing.tax_rate", config.pricing.tax_rate.to_string(), &["ROOFLINE_PRICING_TAX_RATE"]),
        field(
            "pricing.deposit_pct",
            config.pricing.deposit_pct.to_string(),
            &["ROOFLINE_PRICING_DEPOSIT_PCT"],
        ),
        field(
            "pricing.quote_validity_days",
            config.pricing.quote_validity_days.to_string(),
            &["ROOFLINE_PRICING_QUOTE_VALIDITY_DAYS"],
        ),
        field("pricing.currency", &config.pricing.currency, &["ROOFLINE_PRICING_CURRENCY"]),
        field(
            "payments.provider",
            format!("{:?}", config.payments.provider).to_lowercase(),
            &["ROOFLINE_PAYMENTS_PROVIDER"],
        ),
        field(
            "payments.secret_key",
            redact_secret(config.payments.secret_key.as_ref()),
            &["ROOFLINE_PAYMENTS_SECRET_KEY", "STRIPE_SECRET_KEY"],
        ),
        field(
            "payments.webhook_secret",
            redact_secret(config.payments.webhook_secret.as_ref()),
            &["ROOFLINE_PAYMENTS_WEBHOOK_SECRET", "STRIPE_WEBHOOK_SECRET"],
        ),
        field(
            "payments.api_base_url",
            &config.payments.api_base_url,
            &["ROOFLINE_PAYMENTS_API_BASE_URL"],
        ),
        field("llm.enabled", config.llm.enabled.to_string(), &["ROOFLINE_LLM_ENABLED"]),
        field(
            "llm.provider",
            format!("{:?}", config.llm.provider).to_lowercase(),
            &["ROOFLINE_LLM_PROVIDER"],
        ),
        field("llm.model", &config.llm.model, &["ROOFLINE_LLM_MODEL"]),
        field(
            "llm.base_url",
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
            &["ROOFLINE_LLM_BASE_URL"],
        ),
        field("llm.api_key", redact_secret(config.llm.api_key.as_ref()), &["ROOFLINE_LLM_API_KEY"]),
        field(
            "journal.path",
            config.journal.path.display().to_string(),
            &["ROOFLINE_JOURNAL_PATH"],
        ),
        field(
            "logging.level",
            &config.logging.level,
            &["ROOFLINE_LOGGING_LEVEL", "ROOFLINE_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["ROOFLINE_LOGGING_FORMAT", "ROOFLINE_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("roofline.toml"), PathBuf::from("config/roofline.toml")]
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

/// Keeps the Stripe-style prefix (`sk_test`, `whsec`) so operators can tell
/// which key is loaded.
fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.rsplit_once('_') {
        Some((prefix, _)) if !prefix.is_empty() => format!("{prefix}_***"),
        _ => "<redacted>".to_string(),
    }
}
