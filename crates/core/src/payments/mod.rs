//! Payment intents for a quote's full total or its deposit.
//!
//! Amounts are computed from the stored quote, never from the caller, and
//! are handed to the gateway in minor units.

pub mod webhook;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::payment::{PaymentIntent, PaymentIntentId, PaymentKind, PaymentStatus};
use crate::domain::quote::{Quote, QuoteId, QuoteStatus};
use crate::errors::{ApplicationError, DomainError};
use crate::estimating::pricing::round_money;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error("quote in status {status:?} cannot take payments")]
    QuoteNotPayable { status: QuoteStatus },
    #[error("quote validity lapsed at {valid_until}")]
    QuoteExpired { valid_until: DateTime<Utc> },
    #[error("invalid payment amount: {0}")]
    InvalidAmount(String),
    #[error("payment gateway `{provider}` failed: {message}")]
    Gateway { provider: &'static str, message: String },
}

impl From<PaymentError> for ApplicationError {
    fn from(value: PaymentError) -> Self {
        match value {
            PaymentError::Gateway { .. } => Self::Integration(value.to_string()),
            other => Self::Domain(DomainError::InvariantViolation(other.to_string())),
        }
    }
}

/// Full total, or total × `deposit_pct` rounded to cents.
pub fn payment_amount(total: Decimal, kind: PaymentKind, deposit_pct: Decimal) -> Decimal {
    match kind {
        PaymentKind::Full => total,
        PaymentKind::Deposit => round_money(total * deposit_pct),
    }
}

/// Converts a two-decimal currency amount to integer cents.
pub fn to_minor_units(amount: Decimal) -> Result<i64, PaymentError> {
    if amount <= Decimal::ZERO {
        return Err(PaymentError::InvalidAmount(format!("{amount} must be positive")));
    }
    let cents = amount * Decimal::ONE_HUNDRED;
    if cents.fract() != Decimal::ZERO {
        return Err(PaymentError::InvalidAmount(format!("{amount} has sub-cent precision")));
    }
    cents
        .to_i64()
        .ok_or_else(|| PaymentError::InvalidAmount(format!("{amount} exceeds gateway limits")))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateIntentRequest {
    pub quote_id: QuoteId,
    pub kind: PaymentKind,
    pub amount_minor: i64,
    pub currency: String,
    pub description: String,
    pub idempotency_key: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayIntent {
    pub id: String,
    pub status: PaymentStatus,
    pub client_secret: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> &'static str;

    async fn create_intent(
        &self,
        request: &CreateIntentRequest,
    ) -> Result<GatewayIntent, PaymentError>;

    async fn retrieve_intent(&self, id: &str) -> Result<GatewayIntent, PaymentError>;
}

/// Drafts a payment intent against `quote` and registers it with the
/// gateway. Quotes must be issued or accepted and still valid.
pub async fn create_payment_intent(
    gateway: &dyn PaymentGateway,
    quote: &Quote,
    kind: PaymentKind,
    deposit_pct: Decimal,
    now: DateTime<Utc>,
) -> Result<PaymentIntent, PaymentError> {
    if !matches!(quote.status, QuoteStatus::Issued | QuoteStatus::Accepted) {
        return Err(PaymentError::QuoteNotPayable { status: quote.status });
    }
    if quote.is_expired_at(now) {
        return Err(PaymentError::QuoteExpired { valid_until: quote.valid_until });
    }

    let amount = payment_amount(quote.total, kind, deposit_pct);
    let request = CreateIntentRequest {
        quote_id: quote.id.clone(),
        kind,
        amount_minor: to_minor_units(amount)?,
        currency: quote.currency.to_ascii_lowercase(),
        description: format!("{} payment for roofing quote {}", kind.as_str(), quote.id.0),
        idempotency_key: format!("{}-{}", quote.id.0, kind.as_str()),
    };
    let created = gateway.create_intent(&request).await?;

    Ok(PaymentIntent {
        id: PaymentIntentId(created.id),
        quote_id: quote.id.clone(),
        kind,
        amount,
        currency: quote.currency.clone(),
        status: created.status,
        client_secret: created.client_secret,
        created_at: now,
        updated_at: now,
    })
}

/// In-process gateway with Stripe-shaped ids and secrets. Intents start in
/// `requires_payment_method`; tests move them with [`Self::set_status`].
#[derive(Clone, Default)]
pub struct SimulatedPaymentGateway {
    intents: Arc<Mutex<HashMap<String, GatewayIntent>>>,
}

impl SimulatedPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, id: &str, status: PaymentStatus) -> bool {
        let mut intents = match self.intents.lock() {
            Ok(intents) => intents,
            Err(poisoned) => poisoned.into_inner(),
        };
        match intents.get_mut(id) {
            Some(intent) => {
                intent.status = status;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedPaymentGateway {
    fn provider(&self) -> &'static str {
        "simulated"
    }

    async fn create_intent(
        &self,
        request: &CreateIntentRequest,
    ) -> Result<GatewayIntent, PaymentError> {
        if request.amount_minor <= 0 {
            return Err(PaymentError::InvalidAmount(format!(
                "{} minor units must be positive",
                request.amount_minor
            )));
        }

        let id = format!("pi_sim_{}", Uuid::new_v4().simple());
        let intent = GatewayIntent {
            client_secret: Some(format!("{id}_secret_{}", Uuid::new_v4().simple())),
            id: id.clone(),
            status: PaymentStatus::RequiresPaymentMethod,
            amount_minor: request.amount_minor,
            currency: request.currency.clone(),
        };

        let mut intents = match self.intents.lock() {
            Ok(intents) => intents,
            Err(poisoned) => poisoned.into_inner(),
        };
        intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_intent(&self, id: &str) -> Result<GatewayIntent, PaymentError> {
        let intents = match self.intents.lock() {
            Ok(intents) => intents,
            Err(poisoned) => poisoned.into_inner(),
        };
        intents.get(id).cloned().ok_or_else(|| PaymentError::Gateway {
            provider: "simulated",
            message: format!("no such payment intent `{id}`"),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{
        create_payment_intent, payment_amount, to_minor_units, PaymentError, PaymentGateway,
        SimulatedPaymentGateway,
    };
    use crate::domain::assessment::{DamageAssessment, DamageType, Severity, Urgency};
    use crate::domain::payment::{PaymentKind, PaymentStatus};
    use crate::domain::quote::{CustomerInfo, Quote, QuoteStatus};
    use crate::estimating::{DeterministicEstimator, EstimatingPolicy, Estimator};

    fn quote() -> Quote {
        DeterministicEstimator::new(EstimatingPolicy::default())
            .draft_quote(
                CustomerInfo {
                    name: "Dana Ruiz".to_string(),
                    address: "14 Elm St".to_string(),
                    email: Some("dana@example.com".to_string()),
                    phone: None,
                },
                DamageAssessment {
                    damage_type: DamageType::RoofLeak,
                    severity: Severity::Moderate,
                    area: 200,
                    urgency: Urgency::Routine,
                },
                Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("timestamp"),
            )
            .expect("draft")
    }

    #[test]
    fn deposit_is_half_the_total_rounded_to_cents() {
        let total = Decimal::new(132_675, 2);
        assert_eq!(
            payment_amount(total, PaymentKind::Deposit, Decimal::new(50, 2)),
            Decimal::new(66_338, 2)
        );
        assert_eq!(payment_amount(total, PaymentKind::Full, Decimal::new(50, 2)), total);
    }

    #[test]
    fn minor_units_are_cents() {
        assert_eq!(to_minor_units(Decimal::new(132_675, 2)), Ok(132_675));
        assert_eq!(to_minor_units(Decimal::from(12)), Ok(1200));
        assert!(matches!(to_minor_units(Decimal::ZERO), Err(PaymentError::InvalidAmount(_))));
        assert!(matches!(
            to_minor_units(Decimal::new(10_005, 3)),
            Err(PaymentError::InvalidAmount(_))
        ));
    }

    #[tokio::test]
    async fn deposit_intent_uses_stored_quote_total() {
        let quote = quote();
        let gateway = SimulatedPaymentGateway::new();

        let intent = create_payment_intent(
            &gateway,
            &quote,
            PaymentKind::Deposit,
            Decimal::new(50, 2),
            quote.created_at,
        )
        .await
        .expect("intent");

        assert_eq!(intent.amount, Decimal::new(66_338, 2));
        assert_eq!(intent.status, PaymentStatus::RequiresPaymentMethod);
        assert!(intent.id.0.starts_with("pi_sim_"));
        assert!(intent.client_secret.as_deref().is_some_and(|secret| secret.contains("_secret_")));

        let stored = gateway.retrieve_intent(&intent.id.0).await.expect("retrieve");
        assert_eq!(stored.amount_minor, 66_338);
        assert_eq!(stored.currency, "usd");
    }

    #[tokio::test]
    async fn cancelled_and_lapsed_quotes_are_not_payable() {
        let mut quote = quote();
        let gateway = SimulatedPaymentGateway::new();
        let later = quote.valid_until + Duration::days(1);

        let lapsed =
            create_payment_intent(&gateway, &quote, PaymentKind::Full, Decimal::new(50, 2), later)
                .await
                .expect_err("lapsed");
        assert!(matches!(lapsed, PaymentError::QuoteExpired { .. }));

        quote.transition_to(QuoteStatus::Cancelled).expect("cancel");
        let cancelled = create_payment_intent(
            &gateway,
            &quote,
            PaymentKind::Full,
            Decimal::new(50, 2),
            quote.created_at,
        )
        .await
        .expect_err("cancelled");
        assert!(matches!(
            cancelled,
            PaymentError::QuoteNotPayable { status: QuoteStatus::Cancelled }
        ));
    }

    #[tokio::test]
    async fn simulated_status_changes_are_visible_on_retrieve() {
        let quote = quote();
        let gateway = SimulatedPaymentGateway::new();
        let intent = create_payment_intent(
            &gateway,
            &quote,
            PaymentKind::Full,
            Decimal::new(50, 2),
            quote.created_at,
        )
        .await
        .expect("intent");

        assert!(gateway.set_status(&intent.id.0, PaymentStatus::Succeeded));
        assert!(!gateway.set_status("pi_unknown", PaymentStatus::Succeeded));
        let stored = gateway.retrieve_intent(&intent.id.0).await.expect("retrieve");
        assert_eq!(stored.status, PaymentStatus::Succeeded);
    }
}
