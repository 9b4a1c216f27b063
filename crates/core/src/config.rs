use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub business: BusinessConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub pricing: PricingConfig,
    pub payments: PaymentsConfig,
    pub llm: LlmConfig,
    pub journal: JournalConfig,
    pub logging: LoggingConfig,
}

/// Customer-facing identity used on invoices and in generated summaries.
#[derive(Clone, Debug)]
pub struct BusinessConfig {
    pub name: String,
    pub service_area: String,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PricingConfig {
    pub tax_rate: Decimal,
    pub emergency_multiplier: Decimal,
    pub deposit_pct: Decimal,
    pub quote_validity_days: u32,
    pub warranty_years: u32,
    pub crew_hours_per_day: u32,
    pub currency: String,
}

#[derive(Clone, Debug)]
pub struct PaymentsConfig {
    pub provider: PaymentProvider,
    pub secret_key: Option<SecretString>,
    pub webhook_secret: Option<SecretString>,
    pub api_base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub enabled: bool,
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct JournalConfig {
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    Simulated,
    Stripe,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Ollama,
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
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub payment_provider: Option<PaymentProvider>,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub llm_enabled: Option<bool>,
    pub journal_path: Option<PathBuf>,
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
            business: BusinessConfig {
                name: "Roofline Roofing".to_string(),
                service_area: "the local area".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://roofline.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            pricing: PricingConfig {
                tax_rate: Decimal::new(8, 2),
                emergency_multiplier: Decimal::new(15, 1),
                deposit_pct: Decimal::new(50, 2),
                quote_validity_days: 30,
                warranty_years: 5,
                crew_hours_per_day: 16,
                currency: "USD".to_string(),
            },
            payments: PaymentsConfig {
                provider: PaymentProvider::Simulated,
                secret_key: None,
                webhook_secret: None,
                api_base_url: "https://api.stripe.com".to_string(),
                timeout_secs: 20,
            },
            llm: LlmConfig {
                enabled: false,
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 60,
            },
            journal: JournalConfig { path: PathBuf::from("agent_memory.json") },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for PaymentProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "simulated" | "mock" => Ok(Self::Simulated),
            "stripe" => Ok(Self::Stripe),
            other => Err(ConfigError::Validation(format!(
                "unsupported payment provider `{other}` (expected simulated|stripe)"
            ))),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("roofline.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(business) = patch.business {
            if let Some(name) = business.name {
                self.business.name = name;
            }
            if let Some(service_area) = business.service_area {
                self.business.service_area = service_area;
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

        if let Some(pricing) = patch.pricing {
            if let Some(tax_rate) = pricing.tax_rate {
                self.pricing.tax_rate = tax_rate;
            }
            if let Some(emergency_multiplier) = pricing.emergency_multiplier {
                self.pricing.emergency_multiplier = emergency_multiplier;
            }
            if let Some(deposit_pct) = pricing.deposit_pct {
                self.pricing.deposit_pct = deposit_pct;
            }
            if let Some(quote_validity_days) = pricing.quote_validity_days {
                self.pricing.quote_validity_days = quote_validity_days;
            }
            if let Some(warranty_years) = pricing.warranty_years {
                self.pricing.warranty_years = warranty_years;
            }
            if let Some(crew_hours_per_day) = pricing.crew_hours_per_day {
                self.pricing.crew_hours_per_day = crew_hours_per_day;
            }
            if let Some(currency) = pricing.currency {
                self.pricing.currency = currency;
            }
        }

        if let Some(payments) = patch.payments {
            if let Some(provider) = payments.provider {
                self.payments.provider = provider;
            }
            if let Some(secret_key_value) = payments.secret_key {
                self.payments.secret_key = Some(secret_value(secret_key_value));
            }
            if let Some(webhook_secret_value) = payments.webhook_secret {
                self.payments.webhook_secret = Some(secret_value(webhook_secret_value));
            }
            if let Some(api_base_url) = payments.api_base_url {
                self.payments.api_base_url = api_base_url;
            }
            if let Some(timeout_secs) = payments.timeout_secs {
                self.payments.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(enabled) = llm.enabled {
                self.llm.enabled = enabled;
            }
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(journal) = patch.journal {
            if let Some(path) = journal.path {
                self.journal.path = path;
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
        if let Some(value) = read_env("ROOFLINE_BUSINESS_NAME") {
            self.business.name = value;
        }
        if let Some(value) = read_env("ROOFLINE_BUSINESS_SERVICE_AREA") {
            self.business.service_area = value;
        }

        if let Some(value) = read_env("ROOFLINE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("ROOFLINE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_value("ROOFLINE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ROOFLINE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_value("ROOFLINE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ROOFLINE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ROOFLINE_SERVER_PORT") {
            self.server.port = parse_value("ROOFLINE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("ROOFLINE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_value("ROOFLINE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("ROOFLINE_PRICING_TAX_RATE") {
            self.pricing.tax_rate = parse_value("ROOFLINE_PRICING_TAX_RATE", &value)?;
        }
        if let Some(value) = read_env("ROOFLINE_PRICING_DEPOSIT_PCT") {
            self.pricing.deposit_pct = parse_value("ROOFLINE_PRICING_DEPOSIT_PCT", &value)?;
        }
        if let Some(value) = read_env("ROOFLINE_PRICING_QUOTE_VALIDITY_DAYS") {
            self.pricing.quote_validity_days =
                parse_value("ROOFLINE_PRICING_QUOTE_VALIDITY_DAYS", &value)?;
        }
        if let Some(value) = read_env("ROOFLINE_PRICING_CURRENCY") {
            self.pricing.currency = value;
        }

        if let Some(value) = read_env("ROOFLINE_PAYMENTS_PROVIDER") {
            self.payments.provider = value.parse()?;
        }
        let stripe_secret =
            read_env("ROOFLINE_PAYMENTS_SECRET_KEY").or_else(|| read_env("STRIPE_SECRET_KEY"));
        if let Some(value) = stripe_secret {
            self.payments.secret_key = Some(secret_value(value));
        }
        let webhook_secret = read_env("ROOFLINE_PAYMENTS_WEBHOOK_SECRET")
            .or_else(|| read_env("STRIPE_WEBHOOK_SECRET"));
        if let Some(value) = webhook_secret {
            self.payments.webhook_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("ROOFLINE_PAYMENTS_API_BASE_URL") {
            self.payments.api_base_url = value;
        }

        if let Some(value) = read_env("ROOFLINE_LLM_ENABLED") {
            self.llm.enabled = parse_value("ROOFLINE_LLM_ENABLED", &value)?;
        }
        if let Some(value) = read_env("ROOFLINE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("ROOFLINE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("ROOFLINE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("ROOFLINE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("ROOFLINE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_value("ROOFLINE_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ROOFLINE_JOURNAL_PATH") {
            self.journal.path = PathBuf::from(value);
        }

        let log_level =
            read_env("ROOFLINE_LOGGING_LEVEL").or_else(|| read_env("ROOFLINE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ROOFLINE_LOGGING_FORMAT").or_else(|| read_env("ROOFLINE_LOG_FORMAT"));
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
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(provider) = overrides.payment_provider {
            self.payments.provider = provider;
        }
        if let Some(secret_key) = overrides.stripe_secret_key {
            self.payments.secret_key = Some(secret_value(secret_key));
        }
        if let Some(webhook_secret) = overrides.stripe_webhook_secret {
            self.payments.webhook_secret = Some(secret_value(webhook_secret));
        }
        if let Some(enabled) = overrides.llm_enabled {
            self.llm.enabled = enabled;
        }
        if let Some(journal_path) = overrides.journal_path {
            self.journal.path = journal_path;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.business.name.trim().is_empty() {
            return Err(ConfigError::Validation("business.name cannot be empty".to_string()));
        }
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_pricing(&self.pricing)?;
        validate_payments(&self.payments)?;
        validate_llm(&self.llm)?;
        validate_journal(&self.journal)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("roofline.toml"), PathBuf::from("config/roofline.toml")]
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

fn validate_pricing(pricing: &PricingConfig) -> Result<(), ConfigError> {
    if pricing.tax_rate < Decimal::ZERO || pricing.tax_rate >= Decimal::ONE {
        return Err(ConfigError::Validation(
            "pricing.tax_rate must be a fraction in 0..1 (e.g. 0.08)".to_string(),
        ));
    }

    if pricing.emergency_multiplier < Decimal::ONE {
        return Err(ConfigError::Validation(
            "pricing.emergency_multiplier must be at least 1.0".to_string(),
        ));
    }

    if pricing.deposit_pct <= Decimal::ZERO || pricing.deposit_pct > Decimal::ONE {
        return Err(ConfigError::Validation(
            "pricing.deposit_pct must be a fraction in (0, 1] (e.g. 0.50)".to_string(),
        ));
    }

    if pricing.quote_validity_days == 0 {
        return Err(ConfigError::Validation(
            "pricing.quote_validity_days must be greater than zero".to_string(),
        ));
    }

    if pricing.crew_hours_per_day == 0 || pricing.crew_hours_per_day > 24 * 8 {
        return Err(ConfigError::Validation(
            "pricing.crew_hours_per_day must be in range 1..=192".to_string(),
        ));
    }

    let currency = pricing.currency.trim();
    if currency.len() != 3 || !currency.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return Err(ConfigError::Validation(
            "pricing.currency must be a three-letter ISO code (e.g. USD)".to_string(),
        ));
    }

    Ok(())
}

fn validate_payments(payments: &PaymentsConfig) -> Result<(), ConfigError> {
    if payments.timeout_secs == 0 || payments.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "payments.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if payments.provider == PaymentProvider::Stripe {
        let secret_key =
            payments.secret_key.as_ref().map(|value| value.expose_secret().trim().to_string());
        match secret_key.as_deref() {
            None | Some("") => {
                return Err(ConfigError::Validation(
                    "payments.secret_key is required for the stripe provider. Get it from https://dashboard.stripe.com/apikeys".to_string(),
                ));
            }
            Some(key) if !key.starts_with("sk_") && !key.starts_with("rk_") => {
                let hint = if key.starts_with("pk_") {
                    " (hint: you may have used the publishable key instead of the secret key)"
                } else {
                    ""
                };
                return Err(ConfigError::Validation(format!(
                    "payments.secret_key must start with `sk_` or `rk_`{hint}"
                )));
            }
            Some(_) => {}
        }

        if !payments.api_base_url.starts_with("http://")
            && !payments.api_base_url.starts_with("https://")
        {
            return Err(ConfigError::Validation(
                "payments.api_base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if let Some(webhook_secret) = &payments.webhook_secret {
        if !webhook_secret.expose_secret().starts_with("whsec_") {
            return Err(ConfigError::Validation(
                "payments.webhook_secret must start with `whsec_`".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !llm.enabled {
        return Ok(());
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for the ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_journal(journal: &JournalConfig) -> Result<(), ConfigError> {
    if journal.path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("journal.path cannot be empty".to_string()));
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

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    business: Option<BusinessPatch>,
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    pricing: Option<PricingPatch>,
    payments: Option<PaymentsPatch>,
    llm: Option<LlmPatch>,
    journal: Option<JournalPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct BusinessPatch {
    name: Option<String>,
    service_area: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    tax_rate: Option<Decimal>,
    emergency_multiplier: Option<Decimal>,
    deposit_pct: Option<Decimal>,
    quote_validity_days: Option<u32>,
    warranty_years: Option<u32>,
    crew_hours_per_day: Option<u32>,
    currency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentsPatch {
    provider: Option<PaymentProvider>,
    secret_key: Option<String>,
    webhook_secret: Option<String>,
    api_base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    enabled: Option<bool>,
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct JournalPatch {
    path: Option<PathBuf>,
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

    use rust_decimal::Decimal;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, PaymentProvider,
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
    fn defaults_are_valid_without_any_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.pricing.tax_rate == Decimal::new(8, 2), "default tax rate is 8%")?;
        ensure(config.pricing.deposit_pct == Decimal::new(50, 2), "default deposit is 50%")?;
        ensure(
            config.payments.provider == PaymentProvider::Simulated,
            "payments default to the simulated gateway",
        )?;
        ensure(!config.llm.enabled, "llm is disabled by default")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_STRIPE_SECRET", "sk_test_from_env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("roofline.toml");
            fs::write(
                &path,
                r#"
[payments]
provider = "stripe"
secret_key = "${TEST_STRIPE_SECRET}"

[pricing]
tax_rate = "0.0725"

[business]
name = "Summit Roofing"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config
                    .payments
                    .secret_key
                    .as_ref()
                    .map(|key| key.expose_secret() == "sk_test_from_env")
                    .unwrap_or(false),
                "secret key should be loaded from environment",
            )?;
            ensure(config.pricing.tax_rate == Decimal::new(725, 4), "tax rate read from file")?;
            ensure(config.business.name == "Summit Roofing", "business name read from file")?;
            ensure(
                config.business.service_area == "the local area",
                "unset business fields keep their defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_STRIPE_SECRET"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ROOFLINE_LOG_LEVEL", "warn");
        env::set_var("ROOFLINE_LOG_FORMAT", "pretty");

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

        clear_vars(&["ROOFLINE_LOG_LEVEL", "ROOFLINE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ROOFLINE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("ROOFLINE_SERVER_PORT", "9090");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("roofline.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[server]
port = 7070

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
            ensure(config.server.port == 9090, "env port should win over file and defaults")?;
            Ok(())
        })();

        clear_vars(&["ROOFLINE_DATABASE_URL", "ROOFLINE_SERVER_PORT"]);
        result
    }

    #[test]
    fn stripe_without_secret_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                payment_provider: Some(PaymentProvider::Stripe),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected validation failure but config load succeeded".into()),
            Err(error) => error,
        };

        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("payments.secret_key")),
            "validation failure should mention payments.secret_key",
        )
    }

    #[test]
    fn publishable_key_gets_a_hint() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                payment_provider: Some(PaymentProvider::Stripe),
                stripe_secret_key: Some("pk_test_123".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected validation failure".into()),
            Err(error) => error,
        };

        ensure(error.to_string().contains("publishable key"), "hint should name publishable key")
    }

    #[test]
    fn out_of_range_tax_rate_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ROOFLINE_PRICING_TAX_RATE", "8");
        let result = AppConfig::load(LoadOptions::default());
        clear_vars(&["ROOFLINE_PRICING_TAX_RATE"]);

        ensure(
            matches!(result, Err(ConfigError::Validation(ref message)) if message.contains("tax_rate")),
            "a whole-number tax rate should be rejected",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                payment_provider: Some(PaymentProvider::Stripe),
                stripe_secret_key: Some("sk_live_secret_value".to_string()),
                stripe_webhook_secret: Some("whsec_secret_value".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .map_err(|err| format!("config load failed: {err}"))?;
        let debug = format!("{config:?}");

        ensure(!debug.contains("sk_live_secret_value"), "debug output should hide secret key")?;
        ensure(!debug.contains("whsec_secret_value"), "debug output should hide webhook secret")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }
}
