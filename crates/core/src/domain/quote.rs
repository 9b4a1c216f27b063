use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::assessment::DamageAssessment;
use crate::errors::DomainError;
use crate::estimating::pricing::PricingTrace;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub String);

impl QuoteId {
    pub fn generate() -> Self {
        Self(format!("Q-{}", Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Issued,
    Accepted,
    Ordered,
    Expired,
    Cancelled,
}

impl QuoteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Issued => "issued",
            Self::Accepted => "accepted",
            Self::Ordered => "ordered",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "issued" => Some(Self::Issued),
            "accepted" => Some(Self::Accepted),
            "ordered" => Some(Self::Ordered),
            "expired" => Some(Self::Expired),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillLevel {
    Basic,
    Skilled,
    Specialist,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialLine {
    pub material: String,
    pub description: String,
    pub unit: String,
    pub quantity: u32,
    pub unit_cost: Decimal,
    pub cost: Decimal,
    pub supplier_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaborLine {
    pub task: String,
    pub skill_level: SkillLevel,
    pub hours: Decimal,
    pub rate: Decimal,
    pub cost: Decimal,
    pub emergency_adjusted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    pub start_within_days: u32,
    pub work_days: u32,
    pub estimated_start: NaiveDate,
    pub estimated_completion: NaiveDate,
}

/// A drafted repair quote. Pricing content never changes after creation;
/// only `status` moves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub status: QuoteStatus,
    pub customer: CustomerInfo,
    pub assessment: DamageAssessment,
    pub materials: Vec<MaterialLine>,
    pub labor: Vec<LaborLine>,
    pub materials_total: Decimal,
    pub labor_total: Decimal,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub timeline: Timeline,
    pub terms: Vec<String>,
    pub trace: PricingTrace,
    pub created_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

impl Quote {
    pub fn can_transition_to(&self, next: QuoteStatus) -> bool {
        matches!(
            (self.status, next),
            (QuoteStatus::Issued, QuoteStatus::Accepted)
                | (QuoteStatus::Accepted, QuoteStatus::Ordered)
                | (QuoteStatus::Issued, QuoteStatus::Expired)
                | (QuoteStatus::Accepted, QuoteStatus::Expired)
                | (QuoteStatus::Issued, QuoteStatus::Cancelled)
                | (QuoteStatus::Accepted, QuoteStatus::Cancelled)
        )
    }

    pub fn transition_to(&mut self, next: QuoteStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidQuoteTransition { from: self.status, to: next })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.valid_until
    }

    pub fn labor_hours(&self) -> Decimal {
        self.labor.iter().map(|line| line.hours).sum()
    }
}
