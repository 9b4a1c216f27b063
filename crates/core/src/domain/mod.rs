pub mod assessment;
pub mod order;
pub mod payment;
pub mod quote;
