use chrono::Utc;
use clap::Args;
use roofline_core::domain::assessment::DamageAssessment;
use roofline_core::domain::payment::PaymentKind;
use roofline_core::domain::quote::CustomerInfo;
use roofline_core::errors::DomainError;
use roofline_core::estimating::{DeterministicEstimator, EstimatingPolicy, Estimator};
use roofline_core::payments::payment_amount;
use roofline_db::{QuoteRepository, SqlQuoteRepository};
use serde_json::json;

use crate::commands::{build_runtime, exit_code, load_config, open_database, to_json, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct EstimateArgs {
    #[arg(long, help = "roof_leak | storm_damage | missing_shingles | flashing_damage | full_replacement")]
    pub damage_type: String,
    #[arg(long, help = "minor | moderate | severe | critical")]
    pub severity: String,
    #[arg(long, help = "Affected area in square feet")]
    pub area: u32,
    #[arg(long, default_value = "routine", help = "routine | urgent | emergency")]
    pub urgency: String,
    #[arg(long = "customer")]
    pub customer_name: String,
    #[arg(long)]
    pub address: String,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long, help = "Store the quote in the configured database")]
    pub save: bool,
}

impl EstimateArgs {
    fn assessment(&self) -> Result<DamageAssessment, DomainError> {
        Ok(DamageAssessment {
            damage_type: self.damage_type.parse()?,
            severity: self.severity.parse()?,
            area: self.area,
            urgency: self.urgency.parse()?,
        })
    }

    fn customer(&self) -> CustomerInfo {
        CustomerInfo {
            name: self.customer_name.clone(),
            address: self.address.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
        }
    }
}

pub fn run(args: EstimateArgs) -> CommandResult {
    let config = match load_config("estimate") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let policy = EstimatingPolicy::from(&config.pricing);

    let drafted = args.assessment().and_then(|assessment| {
        DeterministicEstimator::new(policy.clone()).draft_quote(args.customer(), assessment, Utc::now())
    });
    let quote = match drafted {
        Ok(quote) => quote,
        Err(error) => {
            return CommandResult::failure(
                "estimate",
                "invalid_input",
                error.to_string(),
                exit_code::REJECTED,
            );
        }
    };

    if args.save {
        let runtime = match build_runtime("estimate") {
            Ok(runtime) => runtime,
            Err(result) => return result,
        };
        let saved = runtime.block_on(async {
            let pool = open_database(&config).await?;
            let stored = SqlQuoteRepository::new(pool.clone())
                .save(quote.clone())
                .await
                .map_err(|error| ("persistence", error.to_string(), exit_code::PERSISTENCE));
            pool.close().await;
            stored
        });
        if let Err((error_class, message, code)) = saved {
            return CommandResult::failure("estimate", error_class, message, code);
        }
    }

    let deposit = payment_amount(quote.total, PaymentKind::Deposit, policy.deposit_pct);
    let message = format!(
        "quote {} totals {} {} (deposit {}); valid until {}{}",
        quote.id.0,
        quote.total,
        quote.currency,
        deposit,
        quote.valid_until.format("%Y-%m-%d"),
        if args.save { "; saved" } else { "" },
    );
    let data = json!({ "quote": to_json(&quote), "deposit_due": deposit.to_string() });

    CommandResult::success_with_data("estimate", message, Some(data))
}
