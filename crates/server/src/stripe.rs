//! Stripe payment intents over the REST API.
//!
//! Requests are form-encoded with the secret key as a bearer token; the
//! `(quote, kind)` idempotency key makes retried creates return the intent
//! Stripe already holds.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use roofline_core::config::PaymentsConfig;
use roofline_core::domain::payment::PaymentStatus;
use roofline_core::payments::{CreateIntentRequest, GatewayIntent, PaymentError, PaymentGateway};

const PROVIDER: &str = "stripe";

pub struct StripeGateway {
    http: reqwest::Client,
    api_base_url: String,
    secret_key: SecretString,
}

impl StripeGateway {
    pub fn from_config(config: &PaymentsConfig) -> Result<Self, PaymentError> {
        let secret_key = config.secret_key.clone().ok_or_else(|| gateway_error(
            "payments.secret_key is not configured",
        ))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| gateway_error(format!("failed to build http client: {error}")))?;

        Ok(Self {
            http,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            secret_key,
        })
    }

    async fn decode(&self, response: reqwest::Response) -> Result<GatewayIntent, PaymentError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(gateway_error(error_message(status, &body)));
        }

        let raw: StripeIntent = response
            .json()
            .await
            .map_err(|error| gateway_error(format!("unreadable payment intent: {error}")))?;
        let status = PaymentStatus::parse(&raw.status).ok_or_else(|| {
            gateway_error(format!("payment intent `{}` has unknown status `{}`", raw.id, raw.status))
        })?;

        Ok(GatewayIntent {
            id: raw.id,
            status,
            client_secret: raw.client_secret,
            amount_minor: raw.amount,
            currency: raw.currency,
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn create_intent(
        &self,
        request: &CreateIntentRequest,
    ) -> Result<GatewayIntent, PaymentError> {
        let url = format!("{}/v1/payment_intents", self.api_base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.secret_key.expose_secret())
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&form_params(request))
            .send()
            .await
            .map_err(|error| gateway_error(format!("request to {url} failed: {error}")))?;

        self.decode(response).await
    }

    async fn retrieve_intent(&self, id: &str) -> Result<GatewayIntent, PaymentError> {
        let url = format!("{}/v1/payment_intents/{id}", self.api_base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await
            .map_err(|error| gateway_error(format!("request to {url} failed: {error}")))?;

        self.decode(response).await
    }
}

#[derive(Deserialize)]
struct StripeIntent {
    id: String,
    status: String,
    client_secret: Option<String>,
    amount: i64,
    currency: String,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
    code: Option<String>,
}

fn form_params(request: &CreateIntentRequest) -> Vec<(&'static str, String)> {
    vec![
        ("amount", request.amount_minor.to_string()),
        ("currency", request.currency.clone()),
        ("description", request.description.clone()),
        ("automatic_payment_methods[enabled]", "true".to_string()),
        ("metadata[quote_id]", request.quote_id.0.clone()),
        ("metadata[payment_kind]", request.kind.as_str().to_string()),
    ]
}

fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<StripeErrorBody>(body) {
        Ok(StripeErrorBody { error: StripeErrorDetail { message: Some(message), code } }) => {
            match code {
                Some(code) => format!("{status} ({code}): {message}"),
                None => format!("{status}: {message}"),
            }
        }
        _ => format!("{status}: {body}"),
    }
}

fn gateway_error(message: impl Into<String>) -> PaymentError {
    PaymentError::Gateway { provider: PROVIDER, message: message.into() }
}
