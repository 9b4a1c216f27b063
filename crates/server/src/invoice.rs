//! HTML invoices for a quote and the payment kind being collected.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tera::{Context, Tera};

use roofline_core::domain::payment::PaymentKind;
use roofline_core::domain::quote::Quote;
use roofline_core::estimating::pricing::round_money;
use roofline_core::payments::payment_amount;

const INVOICE_TEMPLATE: &str = "invoice.html";

#[derive(Debug, thiserror::Error)]
pub enum InvoiceError {
    #[error("template error: {0}")]
    Template(String),
}

pub fn register_template_filters(tera: &mut Tera) {
    tera.register_filter("money", tera_money_filter);
}

/// Formats a number or decimal string to two places. Decimals arrive as
/// strings so no float conversion happens on the way.
fn tera_money_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let amount = match value {
        tera::Value::String(raw) => Decimal::from_str(raw)
            .map_err(|error| tera::Error::msg(format!("money filter got `{raw}`: {error}")))?,
        tera::Value::Number(number) => number
            .as_i64()
            .map(Decimal::from)
            .or_else(|| number.as_f64().and_then(|float| Decimal::try_from(float).ok()))
            .ok_or_else(|| tera::Error::msg(format!("money filter got `{number}`")))?,
        tera::Value::Null => Decimal::ZERO,
        other => return Err(tera::Error::msg(format!("money filter cannot format `{other}`"))),
    };
    Ok(tera::Value::String(format!("{:.2}", round_money(amount))))
}

pub struct InvoiceRenderer {
    tera: Tera,
    business_name: String,
}

impl InvoiceRenderer {
    pub fn new(business_name: impl Into<String>) -> Result<Self, InvoiceError> {
        let mut tera = Tera::default();
        register_template_filters(&mut tera);
        tera.add_raw_template(
            INVOICE_TEMPLATE,
            include_str!("../../../templates/invoice.html.tera"),
        )
        .map_err(|error| InvoiceError::Template(error.to_string()))?;

        Ok(Self { tera, business_name: business_name.into() })
    }

    pub fn render(
        &self,
        quote: &Quote,
        kind: PaymentKind,
        deposit_pct: Decimal,
        issued_at: DateTime<Utc>,
    ) -> Result<String, InvoiceError> {
        let amount_due = payment_amount(quote.total, kind, deposit_pct);
        let balance_due = quote.total - amount_due;
        let amount_due_label = match kind {
            PaymentKind::Full => "Amount due".to_string(),
            PaymentKind::Deposit => {
                format!("Deposit due now ({}%)", (deposit_pct * Decimal::ONE_HUNDRED).normalize())
            }
        };

        let mut context = Context::new();
        context.insert("quote", quote);
        context.insert("business_name", &self.business_name);
        context.insert("issued_on", &issued_at.format("%Y-%m-%d").to_string());
        context.insert("valid_until", &quote.valid_until.format("%Y-%m-%d").to_string());
        context.insert("damage_type", &quote.assessment.damage_type.as_str().replace('_', " "));
        context.insert(
            "tax_rate",
            &format!("{}%", (quote.tax_rate * Decimal::ONE_HUNDRED).normalize()),
        );
        context.insert("amount_due_label", &amount_due_label);
        context.insert("amount_due", &amount_due.to_string());
        context.insert(
            "balance_due",
            &(balance_due > Decimal::ZERO).then(|| balance_due.to_string()),
        );

        self.tera
            .render(INVOICE_TEMPLATE, &context)
            .map_err(|error| InvoiceError::Template(format!("{error:?}")))
    }
}
