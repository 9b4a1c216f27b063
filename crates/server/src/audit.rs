use roofline_core::audit::{AuditEvent, AuditOutcome, AuditSink};

/// Writes audit events to the log stream. Metadata is flattened into one
/// JSON field so the json formatter keeps it queryable.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let quote_id = event.quote_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown");
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();

        match event.outcome {
            AuditOutcome::Success => tracing::info!(
                event_name = %event.event_type,
                audit_event_id = %event.event_id,
                category = event.category.as_str(),
                outcome = event.outcome.as_str(),
                actor = %event.actor,
                correlation_id = %event.correlation_id,
                quote_id = %quote_id,
                metadata = %metadata,
                "audit"
            ),
            AuditOutcome::Rejected | AuditOutcome::Failed => tracing::warn!(
                event_name = %event.event_type,
                audit_event_id = %event.event_id,
                category = event.category.as_str(),
                outcome = event.outcome.as_str(),
                actor = %event.actor,
                correlation_id = %event.correlation_id,
                quote_id = %quote_id,
                metadata = %metadata,
                "audit"
            ),
        }
    }
}
