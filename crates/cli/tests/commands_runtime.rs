use std::env;
use std::sync::{Mutex, OnceLock};

use roofline_cli::commands::estimate::EstimateArgs;
use roofline_cli::commands::plan_order::PlanOrderArgs;
use roofline_cli::commands::{estimate, migrate, plan_order, smoke};
use roofline_core::domain::quote::{QuoteId, QuoteStatus};
use roofline_db::{connect, QuoteRepository, SqlQuoteRepository};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("ROOFLINE_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("ROOFLINE_DATABASE_URL", "postgres://localhost/roofline")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn estimate_prints_reference_quote() {
    with_env(&[("ROOFLINE_DATABASE_URL", "sqlite::memory:")], || {
        let result = estimate::run(estimate_args(false));
        assert_eq!(result.exit_code, 0, "expected successful estimate");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "estimate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["quote"]["total"], "1326.75");
        assert_eq!(payload["data"]["quote"]["status"], "issued");
        assert_eq!(payload["data"]["deposit_due"], "663.38");
        assert!(payload["message"].as_str().unwrap_or_default().contains("1326.75 USD"));
    });
}

#[test]
fn estimate_rejects_unknown_damage_type() {
    with_env(&[("ROOFLINE_DATABASE_URL", "sqlite::memory:")], || {
        let mut args = estimate_args(false);
        args.damage_type = "hail".to_string();

        let result = estimate::run(args);
        assert_eq!(result.exit_code, 7, "expected rejected input code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "invalid_input");
        assert!(payload["message"].as_str().unwrap_or_default().contains("hail"));
    });
}

#[test]
fn saved_quote_can_be_planned_once_accepted() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("roofline.db").display());

    with_env(&[("ROOFLINE_DATABASE_URL", url.as_str())], || {
        let saved = estimate::run(estimate_args(true));
        assert_eq!(saved.exit_code, 0, "expected saved estimate");
        let quote_id = parse_payload(&saved.output)["data"]["quote"]["id"]
            .as_str()
            .expect("quote id")
            .to_string();

        let premature = plan_order::run(PlanOrderArgs { quote_id: quote_id.clone(), required_by: None });
        assert_eq!(premature.exit_code, 7, "issued quotes cannot be ordered");
        let payload = parse_payload(&premature.output);
        assert_eq!(payload["error_class"], "ordering");
        assert!(payload["message"].as_str().unwrap_or_default().contains("accepted"));

        accept_quote(&url, &quote_id);

        let planned = plan_order::run(PlanOrderArgs { quote_id, required_by: None });
        assert_eq!(planned.exit_code, 0, "expected order plan");
        let payload = parse_payload(&planned.output);
        assert_eq!(payload["data"]["status"], "pending");
        assert_eq!(payload["data"]["suppliers"].as_array().map(Vec::len), Some(2));
        assert!(payload["message"].as_str().unwrap_or_default().contains("abc_supply (standard)"));
    });
}

#[test]
fn plan_order_reports_missing_quote() {
    with_env(&[("ROOFLINE_DATABASE_URL", "sqlite::memory:")], || {
        let result =
            plan_order::run(PlanOrderArgs { quote_id: "Q-missing".to_string(), required_by: None });
        assert_eq!(result.exit_code, 8, "expected not-found code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "plan-order");
        assert_eq!(payload["error_class"], "not_found");
    });
}

#[test]
fn smoke_returns_success_report_with_valid_env() {
    with_env(&[("ROOFLINE_DATABASE_URL", "sqlite::memory:")], || {
        let result = smoke::run();
        assert_eq!(result.exit_code, 0, "expected successful smoke report");

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "pass");
        assert_eq!(payload["checks"].as_array().map(Vec::len), Some(5));
    });
}

#[test]
fn smoke_flags_stripe_without_webhook_secret() {
    with_env(
        &[
            ("ROOFLINE_DATABASE_URL", "sqlite::memory:"),
            ("ROOFLINE_PAYMENTS_PROVIDER", "stripe"),
            ("ROOFLINE_PAYMENTS_SECRET_KEY", "sk_test_123"),
        ],
        || {
            let result = smoke::run();
            assert_eq!(result.exit_code, 6, "expected smoke failure code");

            let payload = parse_payload(last_line(&result.output));
            let credentials = payload["checks"]
                .as_array()
                .and_then(|checks| checks.iter().find(|check| check["name"] == "payment_credentials"))
                .cloned()
                .unwrap_or_default();
            assert_eq!(credentials["status"], "fail");
        },
    );
}

#[test]
fn smoke_returns_failure_when_config_invalid() {
    with_env(&[("ROOFLINE_DATABASE_URL", "postgres://localhost/roofline")], || {
        let result = smoke::run();
        assert_eq!(result.exit_code, 6, "expected smoke failure code");

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "fail");
    });
}

fn estimate_args(save: bool) -> EstimateArgs {
    EstimateArgs {
        damage_type: "roof_leak".to_string(),
        severity: "moderate".to_string(),
        area: 200,
        urgency: "routine".to_string(),
        customer_name: "Dana Ruiz".to_string(),
        address: "14 Elm St, Springfield".to_string(),
        email: None,
        phone: None,
        save,
    }
}

fn accept_quote(url: &str, quote_id: &str) {
    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().expect("runtime");
    runtime.block_on(async {
        let pool = connect(url).await.expect("connect");
        let repository = SqlQuoteRepository::new(pool.clone());
        let mut quote = repository
            .find_by_id(&QuoteId(quote_id.to_string()))
            .await
            .expect("lookup")
            .expect("stored quote");
        quote.transition_to(QuoteStatus::Accepted).expect("accept");
        repository.save(quote).await.expect("save");
        pool.close().await;
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn last_line(output: &str) -> &str {
    output.lines().last().unwrap_or_default()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "ROOFLINE_DATABASE_URL",
        "ROOFLINE_DATABASE_MAX_CONNECTIONS",
        "ROOFLINE_DATABASE_TIMEOUT_SECS",
        "ROOFLINE_PRICING_TAX_RATE",
        "ROOFLINE_PRICING_DEPOSIT_PCT",
        "ROOFLINE_PRICING_CURRENCY",
        "ROOFLINE_PAYMENTS_PROVIDER",
        "ROOFLINE_PAYMENTS_SECRET_KEY",
        "ROOFLINE_PAYMENTS_WEBHOOK_SECRET",
        "STRIPE_SECRET_KEY",
        "STRIPE_WEBHOOK_SECRET",
        "ROOFLINE_LLM_ENABLED",
        "ROOFLINE_LLM_PROVIDER",
        "ROOFLINE_LLM_API_KEY",
        "ROOFLINE_LOGGING_LEVEL",
        "ROOFLINE_LOGGING_FORMAT",
        "ROOFLINE_LOG_LEVEL",
        "ROOFLINE_LOG_FORMAT",
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
