//! Stripe webhook verification and event decoding.
//!
//! The `Stripe-Signature` header carries `t=<unix seconds>` and one or more
//! `v1=<hex hmac>` entries. The MAC is HMAC-SHA256 keyed by the endpoint
//! secret over `"{t}.{raw body}"`.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

use crate::domain::payment::PaymentStatus;
use crate::errors::{ApplicationError, DomainError};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("signature header is malformed: {0}")]
    MalformedHeader(String),
    #[error("no v1 signature matched the payload")]
    SignatureMismatch,
    #[error("signature timestamp {timestamp} is outside the {tolerance_secs}s tolerance")]
    StaleTimestamp { timestamp: i64, tolerance_secs: i64 },
    #[error("webhook payload could not be decoded: {0}")]
    InvalidPayload(String),
}

impl From<WebhookError> for ApplicationError {
    fn from(value: WebhookError) -> Self {
        Self::Domain(DomainError::InvariantViolation(format!("webhook rejected: {value}")))
    }
}

pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now_unix: i64,
    tolerance_secs: i64,
) -> Result<(), WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                let parsed = value.parse::<i64>().map_err(|_| {
                    WebhookError::MalformedHeader(format!("timestamp `{value}` is not an integer"))
                })?;
                timestamp = Some(parsed);
            }
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| WebhookError::MalformedHeader("missing t= timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedHeader("missing v1= signature".to_string()));
    }
    if (now_unix - timestamp).abs() > tolerance_secs {
        return Err(WebhookError::StaleTimestamp { timestamp, tolerance_secs });
    }

    for signature in signatures {
        let Some(expected) = decode_hex(signature) else {
            continue;
        };
        let mac = signed_payload_mac(secret, timestamp, payload)?;
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }

    Err(WebhookError::SignatureMismatch)
}

/// Produces a header value in the same shape the gateway sends.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, WebhookError> {
    let mac = signed_payload_mac(secret, timestamp, payload)?;
    let signature = encode_hex(mac.finalize().into_bytes().as_slice());
    Ok(format!("t={timestamp},v1={signature}"))
}

fn signed_payload_mac(
    secret: &str,
    timestamp: i64,
    payload: &[u8],
) -> Result<HmacSha256, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|error| WebhookError::MalformedHeader(format!("unusable secret: {error}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn decode_hex(value: &str) -> Option<Vec<u8>> {
    if value.len() % 2 != 0 {
        return None;
    }
    (0..value.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(value.get(index..index + 2)?, 16).ok())
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WebhookEventKind {
    PaymentSucceeded,
    PaymentFailed,
    PaymentCanceled,
    PaymentProcessing,
    Other,
}

impl WebhookEventKind {
    fn from_type(event_type: &str) -> Self {
        match event_type {
            "payment_intent.succeeded" => Self::PaymentSucceeded,
            "payment_intent.payment_failed" => Self::PaymentFailed,
            "payment_intent.canceled" => Self::PaymentCanceled,
            "payment_intent.processing" => Self::PaymentProcessing,
            _ => Self::Other,
        }
    }

    /// Local status an intent moves to for this event, if any.
    pub fn target_status(self) -> Option<PaymentStatus> {
        match self {
            Self::PaymentSucceeded => Some(PaymentStatus::Succeeded),
            Self::PaymentFailed => Some(PaymentStatus::Failed),
            Self::PaymentCanceled => Some(PaymentStatus::Canceled),
            Self::PaymentProcessing => Some(PaymentStatus::Processing),
            Self::Other => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub kind: WebhookEventKind,
    pub intent_id: Option<String>,
    pub quote_id: Option<String>,
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: RawObject,
}

#[derive(Deserialize)]
struct RawObject {
    id: Option<String>,
    #[serde(default)]
    metadata: std::collections::HashMap<String, String>,
}

pub fn parse_event(payload: &[u8]) -> Result<WebhookEvent, WebhookError> {
    let raw: RawEvent = serde_json::from_slice(payload)
        .map_err(|error| WebhookError::InvalidPayload(error.to_string()))?;
    let kind = WebhookEventKind::from_type(&raw.event_type);
    let intent_id = raw.data.object.id;
    if kind != WebhookEventKind::Other && intent_id.is_none() {
        return Err(WebhookError::InvalidPayload(format!(
            "{} event carries no payment intent id",
            raw.event_type
        )));
    }

    Ok(WebhookEvent {
        id: raw.id,
        event_type: raw.event_type,
        kind,
        intent_id,
        quote_id: raw.data.object.metadata.get("quote_id").cloned(),
    })
}
