pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod estimating;
pub mod ordering;
pub mod payments;

pub use domain::assessment::{DamageAssessment, DamageType, Severity, Urgency};
pub use domain::order::{MaterialOrder, MaterialOrderId, OrderStatus};
pub use domain::payment::{PaymentIntent, PaymentIntentId, PaymentKind, PaymentStatus};
pub use domain::quote::{CustomerInfo, Quote, QuoteId, QuoteStatus};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use estimating::{DeterministicEstimator, EstimatingPolicy, Estimator};
