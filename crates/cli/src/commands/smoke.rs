use std::time::Instant;

use chrono::Utc;
use roofline_core::config::{AppConfig, LoadOptions, PaymentProvider};
use roofline_core::domain::assessment::{DamageAssessment, DamageType, Severity, Urgency};
use roofline_core::domain::quote::CustomerInfo;
use roofline_core::estimating::{DeterministicEstimator, EstimatingPolicy, Estimator};
use roofline_db::{connect_with_settings, migrations};
use serde::Serialize;

use crate::commands::{exit_code, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.push(skipped("payment_credentials"));
            checks.push(skipped("estimator_sanity"));
            checks.push(skipped("db_connectivity"));
            checks.push(skipped("migration_visibility"));
            return finalize_report(checks, elapsed(started));
        }
    };

    checks.push(check_payment_credentials(&config));
    checks.push(check_estimator(&config));

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            checks.push(skipped("migration_visibility"));
            return finalize_report(checks, elapsed(started));
        }
    };

    let db_started = Instant::now();
    let db_result = runtime.block_on(async {
        connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
    });

    let pool = match db_result {
        Ok(pool) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Pass,
                elapsed_ms: elapsed(db_started),
                message: format!("connected using `{}`", config.database.url),
            });
            pool
        }
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: elapsed(db_started),
                message: format!("failed to connect: {error}"),
            });
            checks.push(skipped("migration_visibility"));
            return finalize_report(checks, elapsed(started));
        }
    };

    let migration_started = Instant::now();
    let migration_result = runtime.block_on(async { migrations::run_pending(&pool).await });
    runtime.block_on(async {
        pool.close().await;
    });

    match migration_result {
        Ok(()) => checks.push(SmokeCheck {
            name: "migration_visibility",
            status: SmokeStatus::Pass,
            elapsed_ms: elapsed(migration_started),
            message: "migrations are visible and executable".to_string(),
        }),
        Err(error) => checks.push(SmokeCheck {
            name: "migration_visibility",
            status: SmokeStatus::Fail,
            elapsed_ms: elapsed(migration_started),
            message: format!("migration execution failed: {error}"),
        }),
    }

    finalize_report(checks, elapsed(started))
}

/// Key format is already enforced by config validation; this only catches a
/// Stripe setup that would refuse every webhook.
fn check_payment_credentials(config: &AppConfig) -> SmokeCheck {
    let started = Instant::now();
    let (status, message) = match config.payments.provider {
        PaymentProvider::Simulated => {
            (SmokeStatus::Pass, "simulated gateway needs no credentials".to_string())
        }
        PaymentProvider::Stripe if config.payments.webhook_secret.is_none() => (
            SmokeStatus::Fail,
            "payments.webhook_secret is unset; stripe webhooks would be refused".to_string(),
        ),
        PaymentProvider::Stripe => {
            (SmokeStatus::Pass, "stripe secret key and webhook secret are set".to_string())
        }
    };
    SmokeCheck { name: "payment_credentials", status, elapsed_ms: elapsed(started), message }
}

/// Drafts a fixed reference job so a broken pricing config surfaces here
/// rather than on the first customer request.
fn check_estimator(config: &AppConfig) -> SmokeCheck {
    let started = Instant::now();
    let estimator = DeterministicEstimator::new(EstimatingPolicy::from(&config.pricing));
    let drafted = estimator.draft_quote(
        CustomerInfo {
            name: "Smoke Check".to_string(),
            address: "1 Reference Way".to_string(),
            email: None,
            phone: None,
        },
        DamageAssessment {
            damage_type: DamageType::RoofLeak,
            severity: Severity::Moderate,
            area: 200,
            urgency: Urgency::Routine,
        },
        Utc::now(),
    );

    let (status, message) = match drafted {
        Ok(quote) if quote.total.is_sign_positive() && !quote.total.is_zero() => (
            SmokeStatus::Pass,
            format!("reference quote totals {} {}", quote.total, quote.currency),
        ),
        Ok(quote) => (SmokeStatus::Fail, format!("reference quote total is {}", quote.total)),
        Err(error) => (SmokeStatus::Fail, format!("reference quote failed: {error}")),
    };
    SmokeCheck { name: "estimator_sanity", status, elapsed_ms: elapsed(started), message }
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((elapsed(started), value)),
        Err(error) => Err((elapsed(started), error)),
    }
}

fn elapsed(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult {
        exit_code: if failed { exit_code::SMOKE_FAILED } else { 0 },
        output: format!("{human}\n{machine}"),
    }
}
