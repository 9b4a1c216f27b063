use chrono::{NaiveDate, Utc};
use clap::Args;
use roofline_core::domain::quote::QuoteId;
use roofline_core::ordering::plan_order;
use roofline_db::{QuoteRepository, SqlQuoteRepository};

use crate::commands::{build_runtime, exit_code, load_config, open_database, to_json, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct PlanOrderArgs {
    #[arg(long)]
    pub quote_id: String,
    #[arg(long, help = "Latest acceptable delivery date (YYYY-MM-DD); defaults to the quote's start date")]
    pub required_by: Option<NaiveDate>,
}

/// Plans supplier allocations for a stored quote without contacting any
/// supplier or storing the order.
pub fn run(args: PlanOrderArgs) -> CommandResult {
    let config = match load_config("plan-order") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("plan-order") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let loaded = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let found = SqlQuoteRepository::new(pool.clone())
            .find_by_id(&QuoteId(args.quote_id.clone()))
            .await
            .map_err(|error| ("persistence", error.to_string(), exit_code::PERSISTENCE));
        pool.close().await;
        found
    });

    let quote = match loaded {
        Ok(Some(quote)) => quote,
        Ok(None) => {
            return CommandResult::failure(
                "plan-order",
                "not_found",
                format!("quote `{}` was not found", args.quote_id),
                exit_code::NOT_FOUND,
            );
        }
        Err((error_class, message, code)) => {
            return CommandResult::failure("plan-order", error_class, message, code);
        }
    };

    let required_by = args.required_by.unwrap_or(quote.timeline.estimated_start);
    match plan_order(&quote, required_by, Utc::now()) {
        Ok(order) => {
            let suppliers = order
                .suppliers
                .iter()
                .map(|allocation| {
                    format!("{} ({:?})", allocation.supplier_id, allocation.shipping).to_lowercase()
                })
                .collect::<Vec<_>>()
                .join(", ");
            CommandResult::success_with_data(
                "plan-order",
                format!(
                    "order for {} can arrive by {} via {suppliers}; total cost {}",
                    quote.id.0, order.delivery_date, order.costs.total
                ),
                to_json(&order),
            )
        }
        Err(error) => CommandResult::failure(
            "plan-order",
            "ordering",
            error.to_string(),
            exit_code::REJECTED,
        ),
    }
}
