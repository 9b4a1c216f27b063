//! JSON API for the quote → payment → material order pipeline.
//!
//! - `POST /api/quotes`                          draft and store a quote
//! - `GET  /api/quotes`                          most recent quotes
//! - `GET  /api/quotes/{id}`                     fetch a quote
//! - `POST /api/quotes/{id}/accept`              accept an issued quote
//! - `POST /api/quotes/{id}/payment-intents`     full or deposit intent
//! - `GET  /api/quotes/{id}/payment-intents`     intents for a quote
//! - `GET  /api/quotes/{id}/invoice?kind=`       HTML invoice
//! - `POST /api/quotes/{id}/material-orders`     plan and submit an order
//! - `GET  /api/quotes/{id}/material-orders`     orders for a quote
//! - `POST /api/quotes/{id}/summary`             language-model summary
//! - `GET  /api/material-orders/{id}`            fetch an order
//! - `POST /api/material-orders/{id}/refresh`    poll supplier shipments
//! - `POST /api/material-orders/{id}/cancel`     cancel an order
//! - `POST /api/payments/webhook`                gateway webhook ingest
//!
//! Every handler resolves a correlation id from `x-correlation-id` (or mints
//! one) and returns it in error bodies.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use roofline_agent::narrator::{QuoteNarrator, QuoteSummary};
use roofline_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use roofline_core::domain::assessment::DamageAssessment;
use roofline_core::domain::order::{MaterialOrder, MaterialOrderId, OrderStatus};
use roofline_core::domain::payment::{PaymentIntent, PaymentIntentId, PaymentKind, PaymentStatus};
use roofline_core::domain::quote::{CustomerInfo, Quote, QuoteId, QuoteStatus};
use roofline_core::errors::{ApplicationError, DomainError, InterfaceError};
use roofline_core::estimating::{EstimatingPolicy, Estimator};
use roofline_core::ordering::{self, plan_order, SupplierClient};
use roofline_core::payments::webhook::{self, WebhookEventKind, DEFAULT_TOLERANCE_SECS};
use roofline_core::payments::{self, PaymentGateway};
use roofline_db::{MaterialOrderRepository, PaymentIntentRepository, QuoteRepository};

use crate::invoice::InvoiceRenderer;

const CORRELATION_HEADER: &str = "x-correlation-id";
const SIGNATURE_HEADER: &str = "stripe-signature";
const API_ACTOR: &str = "api";
const WEBHOOK_ACTOR: &str = "payment-webhook";
const DEFAULT_LIST_LIMIT: u32 = 20;
const MAX_LIST_LIMIT: u32 = 100;

#[derive(Clone)]
pub struct AppState {
    pub quotes: Arc<dyn QuoteRepository>,
    pub orders: Arc<dyn MaterialOrderRepository>,
    pub payments: Arc<dyn PaymentIntentRepository>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub supplier: Arc<dyn SupplierClient>,
    pub audit: Arc<dyn AuditSink>,
    pub estimator: Arc<dyn Estimator>,
    pub policy: EstimatingPolicy,
    pub webhook_secret: Option<SecretString>,
    pub invoices: Arc<InvoiceRenderer>,
    pub narrator: Option<Arc<QuoteNarrator>>,
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateQuoteRequest {
    pub customer: CustomerInfo,
    pub assessment: AssessmentRequest,
}

/// Assessment fields arrive as free text and are validated on conversion.
#[derive(Debug, Deserialize)]
pub struct AssessmentRequest {
    pub damage_type: String,
    pub severity: String,
    pub area: i64,
    pub urgency: String,
}

impl AssessmentRequest {
    fn parse(&self) -> Result<DamageAssessment, DomainError> {
        let area = u32::try_from(self.area).map_err(|_| {
            DomainError::InvalidAssessment(format!("area {} is out of range", self.area))
        })?;
        let assessment = DamageAssessment {
            damage_type: self.damage_type.parse()?,
            severity: self.severity.parse()?,
            area,
            urgency: self.urgency.parse()?,
        };
        assessment.validate()?;
        Ok(assessment)
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    pub kind: PaymentKind,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceQuery {
    pub kind: Option<PaymentKind>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlaceOrderRequest {
    /// Defaults to the quote's estimated start date.
    #[serde(default)]
    pub required_by: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelOrderRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub event_id: String,
    pub outcome: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

pub struct ApiError(InterfaceError);

impl ApiError {
    fn new(error: ApplicationError, correlation_id: &str) -> Self {
        Self(error.into_interface(correlation_id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(
                event_name = "system.api.request_failed",
                correlation_id = %self.0.correlation_id(),
                status = status.as_u16(),
                error = %self.0,
                "request failed"
            );
        } else {
            tracing::info!(
                event_name = "system.api.request_rejected",
                correlation_id = %self.0.correlation_id(),
                status = status.as_u16(),
                error = %self.0,
                "request rejected"
            );
        }

        let body = ErrorBody {
            error: self.0.user_message(),
            detail: self.0.message().to_string(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/quotes", post(create_quote).get(list_quotes))
        .route("/api/quotes/{id}", get(get_quote))
        .route("/api/quotes/{id}/accept", post(accept_quote))
        .route("/api/quotes/{id}/payment-intents", post(create_intent).get(list_intents))
        .route("/api/quotes/{id}/invoice", get(invoice))
        .route("/api/quotes/{id}/material-orders", post(place_order).get(list_orders))
        .route("/api/quotes/{id}/summary", post(summarize_quote))
        .route("/api/material-orders/{id}", get(get_order))
        .route("/api/material-orders/{id}/refresh", post(refresh_order))
        .route("/api/material-orders/{id}/cancel", post(cancel_material_order))
        .route("/api/payments/webhook", post(payment_webhook))
        .with_state(state)
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("req-{}", Uuid::new_v4().simple()))
}

/// Maps an axum body rejection onto the API error shape instead of the
/// framework's plain-text reply.
fn json_payload<T>(
    payload: Result<Json<T>, JsonRejection>,
    invalid: fn(String) -> DomainError,
) -> Result<T, ApplicationError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| {
            invalid(format!("invalid request body: {}", rejection.body_text())).into()
        })
}

/// For bodies that may be omitted: an empty body means all defaults.
fn optional_json_payload<T>(body: &[u8]) -> Result<T, ApplicationError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|error| {
        DomainError::InvariantViolation(format!("invalid request body: {error}")).into()
    })
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApplicationError> {
    query.map(|Query(value)| value).map_err(|rejection| {
        DomainError::InvariantViolation(format!("invalid query string: {}", rejection.body_text()))
            .into()
    })
}

fn audit_event(
    quote_id: Option<&QuoteId>,
    correlation_id: &str,
    event_type: &str,
    category: AuditCategory,
    actor: &str,
    outcome: AuditOutcome,
) -> AuditEvent {
    AuditEvent::new(quote_id.cloned(), correlation_id, event_type, category, actor, outcome)
}

// ---------------------------------------------------------------------------
// Quotes
// ---------------------------------------------------------------------------

async fn create_quote(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateQuoteRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Quote>)> {
    let correlation_id = correlation_id(&headers);
    let request = json_payload(payload, DomainError::InvalidAssessment)
        .map_err(|error| ApiError::new(error, &correlation_id))?;
    draft_and_store(&state, request, &correlation_id, Utc::now())
        .await
        .map(|quote| (StatusCode::CREATED, Json(quote)))
        .map_err(|error| ApiError::new(error, &correlation_id))
}

async fn draft_and_store(
    state: &AppState,
    request: CreateQuoteRequest,
    correlation_id: &str,
    now: DateTime<Utc>,
) -> Result<Quote, ApplicationError> {
    let assessment = request.assessment.parse()?;
    let quote = state.estimator.draft_quote(request.customer, assessment, now)?;
    state.quotes.save(quote.clone()).await?;

    state.audit.emit(
        audit_event(
            Some(&quote.id),
            correlation_id,
            "quote.created",
            AuditCategory::Estimating,
            API_ACTOR,
            AuditOutcome::Success,
        )
        .with_metadata("damage_type", quote.assessment.damage_type.as_str())
        .with_metadata("urgency", quote.assessment.urgency.as_str())
        .with_metadata("total", quote.total.to_string()),
    );
    Ok(quote)
}

async fn list_quotes(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Quote>>> {
    let correlation_id = correlation_id(&headers);
    let query = query_params(query).map_err(|error| ApiError::new(error, &correlation_id))?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    state
        .quotes
        .list_recent(limit)
        .await
        .map(Json)
        .map_err(|error| ApiError::new(error.into(), &correlation_id))
}

async fn get_quote(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Quote>> {
    let correlation_id = correlation_id(&headers);
    load_quote(&state, &id, &correlation_id, Utc::now())
        .await
        .map(Json)
        .map_err(|error| ApiError::new(error, &correlation_id))
}

/// Loads a quote and moves it to `expired` if its validity lapsed while it
/// was still open.
async fn load_quote(
    state: &AppState,
    id: &str,
    correlation_id: &str,
    now: DateTime<Utc>,
) -> Result<Quote, ApplicationError> {
    let mut quote = state
        .quotes
        .find_by_id(&QuoteId(id.to_string()))
        .await?
        .ok_or_else(|| ApplicationError::NotFound { entity: "quote", id: id.to_string() })?;

    if quote.is_expired_at(now) && quote.can_transition_to(QuoteStatus::Expired) {
        let previous = quote.status;
        quote.transition_to(QuoteStatus::Expired)?;
        state.quotes.save(quote.clone()).await?;
        state.audit.emit(
            audit_event(
                Some(&quote.id),
                correlation_id,
                "quote.expired",
                AuditCategory::Estimating,
                API_ACTOR,
                AuditOutcome::Success,
            )
            .with_metadata("previous_status", previous.as_str())
            .with_metadata("valid_until", quote.valid_until.to_rfc3339()),
        );
    }
    Ok(quote)
}

async fn accept_quote(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Quote>> {
    let correlation_id = correlation_id(&headers);
    let result = async {
        let mut quote = load_quote(&state, &id, &correlation_id, Utc::now()).await?;
        quote.transition_to(QuoteStatus::Accepted)?;
        state.quotes.save(quote.clone()).await?;
        state.audit.emit(audit_event(
            Some(&quote.id),
            &correlation_id,
            "quote.accepted",
            AuditCategory::Estimating,
            API_ACTOR,
            AuditOutcome::Success,
        ));
        Ok::<_, ApplicationError>(quote)
    }
    .await;

    result.map(Json).map_err(|error| ApiError::new(error, &correlation_id))
}

async fn summarize_quote(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<QuoteSummary>> {
    let correlation_id = correlation_id(&headers);
    let result = async {
        let narrator = state.narrator.as_ref().ok_or_else(|| {
            ApplicationError::Integration(
                "language model integration is disabled (llm.enabled = false)".to_string(),
            )
        })?;
        let now = Utc::now();
        let quote = load_quote(&state, &id, &correlation_id, now).await?;
        let summary = narrator.summarize(&quote, &correlation_id, now).await?;
        Ok::<_, ApplicationError>(summary)
    }
    .await;

    result.map(Json).map_err(|error| ApiError::new(error, &correlation_id))
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

async fn create_intent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<CreateIntentRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PaymentIntent>)> {
    let correlation_id = correlation_id(&headers);
    let result = async {
        let request = json_payload(payload, DomainError::InvariantViolation)?;
        let now = Utc::now();
        let quote = load_quote(&state, &id, &correlation_id, now).await?;
        let created = payments::create_payment_intent(
            state.gateway.as_ref(),
            &quote,
            request.kind,
            state.policy.deposit_pct,
            now,
        )
        .await;

        let intent = match created {
            Ok(intent) => intent,
            Err(error) => {
                state.audit.emit(
                    audit_event(
                        Some(&quote.id),
                        &correlation_id,
                        "payment.intent_rejected",
                        AuditCategory::Payment,
                        API_ACTOR,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("kind", request.kind.as_str())
                    .with_metadata("reason", error.to_string()),
                );
                return Err(error.into());
            }
        };
        state.payments.save(intent.clone()).await?;

        state.audit.emit(
            audit_event(
                Some(&quote.id),
                &correlation_id,
                "payment.intent_created",
                AuditCategory::Payment,
                API_ACTOR,
                AuditOutcome::Success,
            )
            .with_metadata("intent_id", intent.id.0.clone())
            .with_metadata("kind", intent.kind.as_str())
            .with_metadata("amount", intent.amount.to_string())
            .with_metadata("provider", state.gateway.provider()),
        );
        Ok::<_, ApplicationError>(intent)
    }
    .await;

    result
        .map(|intent| (StatusCode::CREATED, Json(intent)))
        .map_err(|error| ApiError::new(error, &correlation_id))
}

async fn list_intents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<PaymentIntent>>> {
    let correlation_id = correlation_id(&headers);
    let result = async {
        let quote = load_quote(&state, &id, &correlation_id, Utc::now()).await?;
        Ok::<_, ApplicationError>(state.payments.list_for_quote(&quote.id).await?)
    }
    .await;

    result.map(Json).map_err(|error| ApiError::new(error, &correlation_id))
}

async fn invoice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    query: Result<Query<InvoiceQuery>, QueryRejection>,
) -> ApiResult<Html<String>> {
    let correlation_id = correlation_id(&headers);
    let result = async {
        let query = query_params(query)?;
        let now = Utc::now();
        let quote = load_quote(&state, &id, &correlation_id, now).await?;
        let kind = query.kind.unwrap_or(PaymentKind::Deposit);
        state
            .invoices
            .render(&quote, kind, state.policy.deposit_pct, now)
            .map_err(|error| ApplicationError::Configuration(error.to_string()))
    }
    .await;

    result.map(Html).map_err(|error| ApiError::new(error, &correlation_id))
}

/// Applies a gateway event to the stored intent and, for a successful
/// payment, accepts the quote. Redelivered events are harmless: an intent
/// already at the target status is left alone, terminal intents never move,
/// and a redelivered success only re-checks the quote.
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let correlation_id = correlation_id(&headers);
    ingest_webhook(&state, &headers, &body, &correlation_id, Utc::now())
        .await
        .map(Json)
        .map_err(|error| ApiError::new(error, &correlation_id))
}

async fn ingest_webhook(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
    correlation_id: &str,
    now: DateTime<Utc>,
) -> Result<WebhookAck, ApplicationError> {
    match &state.webhook_secret {
        Some(secret) => {
            let signature = headers
                .get(SIGNATURE_HEADER)
                .and_then(|value| value.to_str().ok())
                .ok_or(webhook::WebhookError::MalformedHeader(
                    "missing Stripe-Signature header".to_string(),
                ))?;
            if let Err(error) = webhook::verify_signature(
                body,
                signature,
                secret.expose_secret(),
                now.timestamp(),
                DEFAULT_TOLERANCE_SECS,
            ) {
                state.audit.emit(
                    audit_event(
                        None,
                        correlation_id,
                        "payment.webhook_rejected",
                        AuditCategory::Payment,
                        WEBHOOK_ACTOR,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("reason", error.to_string()),
                );
                return Err(error.into());
            }
        }
        None if state.gateway.provider() != "simulated" => {
            return Err(ApplicationError::Configuration(
                "payments.webhook_secret must be set to accept gateway webhooks".to_string(),
            ));
        }
        None => {}
    }

    let event = webhook::parse_event(body)?;
    let mut applied = false;

    if let (Some(target), Some(intent_id)) = (event.kind.target_status(), event.intent_id.as_ref())
    {
        match state.payments.find_by_id(&PaymentIntentId(intent_id.clone())).await? {
            Some(mut intent) if intent.status != target && !intent.status.is_terminal() => {
                let previous = intent.status;
                intent.status = target;
                intent.updated_at = now;
                state.payments.save(intent.clone()).await?;
                applied = true;

                state.audit.emit(
                    audit_event(
                        Some(&intent.quote_id),
                        correlation_id,
                        "payment.status_updated",
                        AuditCategory::Payment,
                        WEBHOOK_ACTOR,
                        AuditOutcome::Success,
                    )
                    .with_metadata("intent_id", intent.id.0.clone())
                    .with_metadata("event_id", event.id.clone())
                    .with_metadata("from", previous.as_str())
                    .with_metadata("to", target.as_str()),
                );

                if event.kind == WebhookEventKind::PaymentSucceeded {
                    accept_paid_quote(state, &intent, correlation_id, now).await?;
                }
            }
            // An earlier delivery may have stored the intent and then failed
            // before the quote was accepted.
            Some(intent)
                if event.kind == WebhookEventKind::PaymentSucceeded
                    && intent.status == PaymentStatus::Succeeded =>
            {
                applied = accept_paid_quote(state, &intent, correlation_id, now).await?;
            }
            Some(intent) => {
                tracing::debug!(
                    event_name = "system.webhook.no_change",
                    correlation_id = %correlation_id,
                    quote_id = %intent.quote_id.0,
                    intent_id = %intent.id.0,
                    status = intent.status.as_str(),
                    "webhook left payment intent unchanged"
                );
            }
            None => {
                tracing::warn!(
                    event_name = "system.webhook.unknown_intent",
                    correlation_id = %correlation_id,
                    intent_id = %intent_id,
                    event_type = %event.event_type,
                    "webhook references an unknown payment intent"
                );
            }
        }
    }

    let first_delivery =
        state.payments.record_webhook_event(&event.id, &event.event_type, now).await?;
    let outcome = match (first_delivery, applied) {
        (false, _) => "duplicate",
        (true, true) => "processed",
        (true, false) => "ignored",
    };

    Ok(WebhookAck { received: true, event_id: event.id, outcome })
}

/// Moves an issued quote to `accepted` once it is paid. Returns whether the
/// quote changed. A payment that lands after the quote lapsed leaves it
/// expired and is audited for manual follow-up.
async fn accept_paid_quote(
    state: &AppState,
    intent: &PaymentIntent,
    correlation_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, ApplicationError> {
    let mut quote = load_quote(state, &intent.quote_id.0, correlation_id, now).await?;
    match quote.status {
        QuoteStatus::Issued => {}
        QuoteStatus::Expired => {
            tracing::warn!(
                event_name = "system.webhook.payment_after_expiry",
                correlation_id = %correlation_id,
                quote_id = %quote.id.0,
                intent_id = %intent.id.0,
                "payment succeeded for a lapsed quote"
            );
            state.audit.emit(
                audit_event(
                    Some(&quote.id),
                    correlation_id,
                    "payment.received_after_expiry",
                    AuditCategory::Payment,
                    WEBHOOK_ACTOR,
                    AuditOutcome::Rejected,
                )
                .with_metadata("intent_id", intent.id.0.clone())
                .with_metadata("amount", intent.amount.to_string())
                .with_metadata("valid_until", quote.valid_until.to_rfc3339()),
            );
            return Ok(false);
        }
        _ => return Ok(false),
    }

    quote.transition_to(QuoteStatus::Accepted)?;
    state.quotes.save(quote.clone()).await?;
    state.audit.emit(
        audit_event(
            Some(&quote.id),
            correlation_id,
            "quote.accepted",
            AuditCategory::Payment,
            WEBHOOK_ACTOR,
            AuditOutcome::Success,
        )
        .with_metadata("intent_id", intent.id.0.clone())
        .with_metadata("kind", intent.kind.as_str()),
    );
    Ok(true)
}

// ---------------------------------------------------------------------------
// Material orders
// ---------------------------------------------------------------------------

async fn place_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<MaterialOrder>)> {
    let correlation_id = correlation_id(&headers);
    let request = optional_json_payload::<PlaceOrderRequest>(&body)
        .map_err(|error| ApiError::new(error, &correlation_id))?;
    plan_and_submit(&state, &id, request, &correlation_id, Utc::now())
        .await
        .map(|order| (StatusCode::CREATED, Json(order)))
        .map_err(|error| ApiError::new(error, &correlation_id))
}

/// Plans an order for an accepted quote and submits it to suppliers. A
/// supplier failure leaves the pending order stored and the quote accepted,
/// so the order can be placed again; the retry supersedes that order.
async fn plan_and_submit(
    state: &AppState,
    quote_id: &str,
    request: PlaceOrderRequest,
    correlation_id: &str,
    now: DateTime<Utc>,
) -> Result<MaterialOrder, ApplicationError> {
    let mut quote = load_quote(state, quote_id, correlation_id, now).await?;
    let required_by = request.required_by.unwrap_or(quote.timeline.estimated_start);

    let mut order = match plan_order(&quote, required_by, now) {
        Ok(order) => order,
        Err(error) => {
            state.audit.emit(
                audit_event(
                    Some(&quote.id),
                    correlation_id,
                    "order.rejected",
                    AuditCategory::Ordering,
                    API_ACTOR,
                    AuditOutcome::Rejected,
                )
                .with_metadata("required_by", required_by.to_string())
                .with_metadata("reason", error.to_string()),
            );
            return Err(error.into());
        }
    };
    state.orders.save(order.clone()).await?;
    supersede_pending_orders(state, &order, correlation_id, now).await?;

    if let Err(error) = ordering::submit_order(&mut order, state.supplier.as_ref(), now).await {
        state.audit.emit(
            audit_event(
                Some(&quote.id),
                correlation_id,
                "order.submission_failed",
                AuditCategory::Ordering,
                API_ACTOR,
                AuditOutcome::Failed,
            )
            .with_metadata("order_id", order.id.0.clone())
            .with_metadata("reason", error.to_string()),
        );
        return Err(error.into());
    }
    state.orders.save(order.clone()).await?;

    quote.transition_to(QuoteStatus::Ordered)?;
    state.quotes.save(quote.clone()).await?;

    let tracking = order
        .tracking_numbers
        .iter()
        .map(|tracking| format!("{}:{}", tracking.supplier_id, tracking.number))
        .collect::<Vec<_>>()
        .join(",");
    state.audit.emit(
        audit_event(
            Some(&quote.id),
            correlation_id,
            "order.submitted",
            AuditCategory::Ordering,
            API_ACTOR,
            AuditOutcome::Success,
        )
        .with_metadata("order_id", order.id.0.clone())
        .with_metadata("delivery_date", order.delivery_date.to_string())
        .with_metadata("total_cost", order.costs.total.to_string())
        .with_metadata("tracking_numbers", tracking),
    );
    Ok(order)
}

/// Cancels pending orders left behind by earlier failed submissions for the
/// same quote, so only the newest plan stays open.
async fn supersede_pending_orders(
    state: &AppState,
    replacement: &MaterialOrder,
    correlation_id: &str,
    now: DateTime<Utc>,
) -> Result<(), ApplicationError> {
    let stale = state
        .orders
        .list_for_quote(&replacement.quote_id)
        .await?
        .into_iter()
        .filter(|order| order.status == OrderStatus::Pending && order.id != replacement.id);

    for mut order in stale {
        ordering::cancel_order(&mut order, &format!("superseded by {}", replacement.id.0), now)?;
        state.orders.save(order.clone()).await?;
        state.audit.emit(
            audit_event(
                Some(&order.quote_id),
                correlation_id,
                "order.superseded",
                AuditCategory::Ordering,
                API_ACTOR,
                AuditOutcome::Success,
            )
            .with_metadata("order_id", order.id.0.clone())
            .with_metadata("replaced_by", replacement.id.0.clone()),
        );
    }
    Ok(())
}

async fn list_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<MaterialOrder>>> {
    let correlation_id = correlation_id(&headers);
    let result = async {
        let quote = load_quote(&state, &id, &correlation_id, Utc::now()).await?;
        Ok::<_, ApplicationError>(state.orders.list_for_quote(&quote.id).await?)
    }
    .await;

    result.map(Json).map_err(|error| ApiError::new(error, &correlation_id))
}

async fn load_order(state: &AppState, id: &str) -> Result<MaterialOrder, ApplicationError> {
    state
        .orders
        .find_by_id(&MaterialOrderId(id.to_string()))
        .await?
        .ok_or_else(|| ApplicationError::NotFound { entity: "material order", id: id.to_string() })
}

async fn get_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<MaterialOrder>> {
    let correlation_id = correlation_id(&headers);
    load_order(&state, &id).await.map(Json).map_err(|error| ApiError::new(error, &correlation_id))
}

async fn refresh_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<MaterialOrder>> {
    let correlation_id = correlation_id(&headers);
    let result = async {
        let now = Utc::now();
        let mut order = load_order(&state, &id).await?;
        let previous = order.status;
        let changed =
            ordering::refresh_shipments(&mut order, state.supplier.as_ref(), now.date_naive(), now)
                .await?;
        if changed {
            state.orders.save(order.clone()).await?;
            state.audit.emit(
                audit_event(
                    Some(&order.quote_id),
                    &correlation_id,
                    "order.status_updated",
                    AuditCategory::Ordering,
                    API_ACTOR,
                    AuditOutcome::Success,
                )
                .with_metadata("order_id", order.id.0.clone())
                .with_metadata("from", previous.as_str())
                .with_metadata("to", order.status.as_str()),
            );
        }
        Ok::<_, ApplicationError>(order)
    }
    .await;

    result.map(Json).map_err(|error| ApiError::new(error, &correlation_id))
}

async fn cancel_material_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<MaterialOrder>> {
    let correlation_id = correlation_id(&headers);
    let result = async {
        let request = optional_json_payload::<CancelOrderRequest>(&body)?;
        let mut order = load_order(&state, &id).await?;
        ordering::cancel_order(&mut order, &request.reason, Utc::now())?;
        state.orders.save(order.clone()).await?;
        state.audit.emit(
            audit_event(
                Some(&order.quote_id),
                &correlation_id,
                "order.cancelled",
                AuditCategory::Ordering,
                API_ACTOR,
                AuditOutcome::Success,
            )
            .with_metadata("order_id", order.id.0.clone())
            .with_metadata("reason", request.reason.trim()),
        );
        Ok::<_, ApplicationError>(order)
    }
    .await;

    result.map(Json).map_err(|error| ApiError::new(error, &correlation_id))
}
