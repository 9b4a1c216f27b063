//! `{key}` template substitution over a set of default business rules.
//!
//! `{{` and `}}` render as literal braces. Caller values shadow defaults.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use thiserror::Error;

use roofline_core::domain::payment::PaymentKind;
use roofline_core::domain::quote::Quote;
use roofline_core::estimating::EstimatingPolicy;
use roofline_core::payments::payment_amount;

pub const QUOTE_SUMMARY_TEMPLATE: &str = "\
You are writing on behalf of {business_name}, serving {service_area}.
Summarize roofing quote {quote_id} for {customer_name} in plain language.

Job: {damage_type} ({severity}), {area} sq ft, {urgency} urgency.
Materials: {materials_count} line items. Labor: {labor_count} tasks, {labor_hours} hours.
Subtotal {subtotal} {currency}, tax {tax}, total {total}.
A {deposit_pct} deposit of {deposit} is due at signing.
Work starts within {start_within_days} days and takes about {work_days} working days \
({estimated_start} to {estimated_completion}).
Workmanship is warrantied for {warranty_years} years. Pricing is valid until {valid_until}.

Keep every number exactly as given. Do not add prices, discounts or dates.";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("no value for placeholder `{0}`")]
    MissingKey(String),
    #[error("placeholder opened at byte {0} is never closed")]
    Unterminated(usize),
    #[error("empty placeholder at byte {0}")]
    EmptyPlaceholder(usize),
    #[error("unmatched `}}` at byte {0}; write `}}}}` for a literal brace")]
    StrayClosingBrace(usize),
}

#[derive(Clone, Debug)]
pub struct PromptBuilder {
    defaults: BTreeMap<String, String>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::from_policy(&EstimatingPolicy::default(), "Roofline Roofing", "the local service area")
    }
}

impl PromptBuilder {
    pub fn from_policy(policy: &EstimatingPolicy, business_name: &str, service_area: &str) -> Self {
        let defaults = BTreeMap::from([
            ("business_name".to_string(), business_name.to_string()),
            ("service_area".to_string(), service_area.to_string()),
            ("tax_rate".to_string(), percent(policy.tax_rate)),
            ("deposit_pct".to_string(), percent(policy.deposit_pct)),
            ("warranty_years".to_string(), policy.warranty_years.to_string()),
            ("quote_validity_days".to_string(), policy.quote_validity_days.to_string()),
            ("emergency_multiplier".to_string(), policy.emergency_multiplier.normalize().to_string()),
        ]);
        Self { defaults }
    }

    pub fn with_rule(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    pub fn defaults(&self) -> &BTreeMap<String, String> {
        &self.defaults
    }

    pub fn render(
        &self,
        template: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<String, PromptError> {
        let mut output = String::with_capacity(template.len());
        let mut chars = template.char_indices().peekable();

        while let Some((position, ch)) = chars.next() {
            match ch {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    output.push('{');
                }
                '{' => {
                    let mut key = String::new();
                    let mut closed = false;
                    for (_, next) in chars.by_ref() {
                        if next == '}' {
                            closed = true;
                            break;
                        }
                        key.push(next);
                    }
                    if !closed {
                        return Err(PromptError::Unterminated(position));
                    }

                    let key = key.trim();
                    if key.is_empty() {
                        return Err(PromptError::EmptyPlaceholder(position));
                    }
                    let value = values
                        .get(key)
                        .or_else(|| self.defaults.get(key))
                        .ok_or_else(|| PromptError::MissingKey(key.to_string()))?;
                    output.push_str(value);
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    output.push('}');
                }
                '}' => return Err(PromptError::StrayClosingBrace(position)),
                other => output.push(other),
            }
        }

        Ok(output)
    }
}

/// Substitution values describing a stored quote.
pub fn quote_context(quote: &Quote, deposit_pct: Decimal) -> BTreeMap<String, String> {
    let deposit = payment_amount(quote.total, PaymentKind::Deposit, deposit_pct);
    BTreeMap::from([
        ("quote_id".to_string(), quote.id.0.clone()),
        ("customer_name".to_string(), quote.customer.name.clone()),
        ("customer_address".to_string(), quote.customer.address.clone()),
        ("damage_type".to_string(), quote.assessment.damage_type.as_str().replace('_', " ")),
        ("severity".to_string(), quote.assessment.severity.as_str().to_string()),
        ("area".to_string(), quote.assessment.area.to_string()),
        ("urgency".to_string(), quote.assessment.urgency.as_str().to_string()),
        ("materials_count".to_string(), quote.materials.len().to_string()),
        ("labor_count".to_string(), quote.labor.len().to_string()),
        ("labor_hours".to_string(), quote.labor_hours().normalize().to_string()),
        ("subtotal".to_string(), quote.subtotal.to_string()),
        ("tax".to_string(), quote.tax.to_string()),
        ("total".to_string(), quote.total.to_string()),
        ("currency".to_string(), quote.currency.clone()),
        ("deposit".to_string(), deposit.to_string()),
        ("deposit_pct".to_string(), percent(deposit_pct)),
        ("start_within_days".to_string(), quote.timeline.start_within_days.to_string()),
        ("work_days".to_string(), quote.timeline.work_days.to_string()),
        ("estimated_start".to_string(), quote.timeline.estimated_start.to_string()),
        ("estimated_completion".to_string(), quote.timeline.estimated_completion.to_string()),
        ("valid_until".to_string(), quote.valid_until.date_naive().to_string()),
    ])
}

fn percent(fraction: Decimal) -> String {
    format!("{}%", (fraction * Decimal::ONE_HUNDRED).normalize())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use roofline_core::domain::assessment::{DamageAssessment, DamageType, Severity, Urgency};
    use roofline_core::domain::quote::CustomerInfo;
    use roofline_core::estimating::{DeterministicEstimator, EstimatingPolicy, Estimator};

    use super::{quote_context, PromptBuilder, PromptError, QUOTE_SUMMARY_TEMPLATE};

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect()
    }

    #[test]
    fn defaults_fill_business_rules() {
        let builder = PromptBuilder::default();
        let rendered = builder
            .render("Tax {tax_rate}, deposit {deposit_pct}, warranty {warranty_years}y", &values(&[]))
            .expect("render");

        assert_eq!(rendered, "Tax 8%, deposit 50%, warranty 5y");
    }

    #[test]
    fn caller_values_override_defaults() {
        let builder = PromptBuilder::default().with_rule("business_name", "Summit Roofing");
        let rendered = builder
            .render("{business_name} / {deposit_pct}", &values(&[("deposit_pct", "30%")]))
            .expect("render");

        assert_eq!(rendered, "Summit Roofing / 30%");
    }

    #[test]
    fn doubled_braces_are_literal() {
        let rendered = PromptBuilder::default()
            .render("{{\"total\": {total}}}", &values(&[("total", "1326.75")]))
            .expect("render");

        assert_eq!(rendered, "{\"total\": 1326.75}");
    }

    #[test]
    fn missing_key_is_named() {
        let error =
            PromptBuilder::default().render("Hi {customer_name}", &values(&[])).expect_err("missing");
        assert_eq!(error, PromptError::MissingKey("customer_name".to_string()));
    }

    #[test]
    fn malformed_templates_are_rejected() {
        let builder = PromptBuilder::default();
        assert_eq!(
            builder.render("total {total", &values(&[("total", "1")])),
            Err(PromptError::Unterminated(6))
        );
        assert_eq!(builder.render("a {} b", &values(&[])), Err(PromptError::EmptyPlaceholder(2)));
        assert_eq!(builder.render("a } b", &values(&[])), Err(PromptError::StrayClosingBrace(2)));
    }

    #[test]
    fn summary_template_renders_for_a_drafted_quote() {
        let policy = EstimatingPolicy::default();
        let quote = DeterministicEstimator::new(policy.clone())
            .draft_quote(
                CustomerInfo {
                    name: "Dana Ruiz".to_string(),
                    address: "14 Elm St".to_string(),
                    email: None,
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
            .expect("draft");

        let context = quote_context(&quote, Decimal::new(50, 2));
        assert_eq!(context.get("deposit").map(String::as_str), Some("663.38"));
        assert_eq!(context.get("damage_type").map(String::as_str), Some("roof leak"));

        let rendered = PromptBuilder::from_policy(&policy, "Summit Roofing", "Springfield")
            .render(QUOTE_SUMMARY_TEMPLATE, &context)
            .expect("render summary");
        assert!(rendered.contains("Summit Roofing, serving Springfield"));
        assert!(rendered.contains("total 1326.75"));
        assert!(rendered.contains("valid until 2026-04-01"));
    }
}
