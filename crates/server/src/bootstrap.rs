use std::sync::Arc;

use roofline_agent::{HttpLlmClient, Journal, PromptBuilder, QuoteNarrator};
use roofline_core::config::{AppConfig, ConfigError, LoadOptions, PaymentProvider};
use roofline_core::estimating::{DeterministicEstimator, EstimatingPolicy};
use roofline_core::ordering::SimulatedSupplierClient;
use roofline_core::payments::{PaymentError, PaymentGateway, SimulatedPaymentGateway};
use roofline_db::{
    connect_with_settings, migrations, DbPool, SqlMaterialOrderRepository,
    SqlPaymentIntentRepository, SqlQuoteRepository,
};
use thiserror::Error;
use tracing::info;

use crate::api::AppState;
use crate::audit::TracingAuditSink;
use crate::health::HealthState;
use crate::invoice::{InvoiceError, InvoiceRenderer};
use crate::stripe::StripeGateway;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

impl Application {
    pub fn health_state(&self) -> HealthState {
        HealthState {
            db_pool: self.db_pool.clone(),
            payment_provider: self.state.gateway.provider(),
            llm_enabled: self.state.narrator.is_some(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("payment gateway setup failed: {0}")]
    Payments(#[source] PaymentError),
    #[error("llm client setup failed: {0}")]
    Llm(String),
    #[error("invoice template setup failed: {0}")]
    Invoice(#[from] InvoiceError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        quote_id = "unknown",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        quote_id = "unknown",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        quote_id = "unknown",
        "database migrations applied"
    );

    let policy = EstimatingPolicy::from(&config.pricing);
    let gateway: Arc<dyn PaymentGateway> = match config.payments.provider {
        PaymentProvider::Simulated => Arc::new(SimulatedPaymentGateway::new()),
        PaymentProvider::Stripe => {
            Arc::new(StripeGateway::from_config(&config.payments).map_err(BootstrapError::Payments)?)
        }
    };

    let narrator = if config.llm.enabled {
        let client = HttpLlmClient::from_config(&config.llm)
            .map_err(|error| BootstrapError::Llm(format!("{error:#}")))?;
        let prompts =
            PromptBuilder::from_policy(&policy, &config.business.name, &config.business.service_area);
        let journal = Arc::new(Journal::new(config.journal.path.clone()));
        Some(Arc::new(QuoteNarrator::new(Arc::new(client), prompts, journal, policy.deposit_pct)))
    } else {
        None
    };

    info!(
        event_name = "system.bootstrap.integrations_ready",
        correlation_id = "bootstrap",
        quote_id = "unknown",
        payment_provider = gateway.provider(),
        llm_enabled = narrator.is_some(),
        journal_path = %config.journal.path.display(),
        "integrations configured"
    );

    let state = AppState {
        quotes: Arc::new(SqlQuoteRepository::new(db_pool.clone())),
        orders: Arc::new(SqlMaterialOrderRepository::new(db_pool.clone())),
        payments: Arc::new(SqlPaymentIntentRepository::new(db_pool.clone())),
        gateway,
        supplier: Arc::new(SimulatedSupplierClient::new()),
        audit: Arc::new(TracingAuditSink),
        estimator: Arc::new(DeterministicEstimator::new(policy.clone())),
        webhook_secret: config.payments.webhook_secret.clone(),
        invoices: Arc::new(InvoiceRenderer::new(config.business.name.clone())?),
        narrator,
        policy,
    };

    Ok(Application { config, db_pool, state })
}

#[cfg(test)]
mod tests {
    use roofline_core::config::{ConfigOverrides, LoadOptions, PaymentProvider};

    use crate::bootstrap::bootstrap;

    fn options(overrides: ConfigOverrides) -> LoadOptions {
        LoadOptions {
            config_path: Some("does-not-exist.toml".into()),
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                ..overrides
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_for_stripe_without_secret_key() {
        let result = bootstrap(options(ConfigOverrides {
            payment_provider: Some(PaymentProvider::Stripe),
            ..ConfigOverrides::default()
        }))
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("payments.secret_key"));
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_wires_simulated_integrations() {
        let app = bootstrap(options(ConfigOverrides::default()))
            .await
            .expect("bootstrap should succeed with defaults");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('quote', 'material_order', 'payment_intent', 'webhook_event')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("tables should exist after bootstrap");
        assert_eq!(table_count, 4);

        let health = app.health_state();
        assert_eq!(health.payment_provider, "simulated");
        assert!(!health.llm_enabled);
        assert!(app.state.narrator.is_none());

        app.db_pool.close().await;
    }
}
