use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use roofline_core::domain::quote::Quote;
use roofline_core::errors::ApplicationError;

use crate::journal::{Journal, JournalEntry, JournalError};
use crate::llm::LlmClient;
use crate::prompt::{quote_context, PromptBuilder, PromptError, QUOTE_SUMMARY_TEMPLATE};

pub const SUMMARY_JOURNAL_KIND: &str = "quote_summary";

#[derive(Debug, Error)]
pub enum NarratorError {
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error("language model call failed: {0}")]
    Llm(String),
    #[error(transparent)]
    Journal(#[from] JournalError),
}

impl From<NarratorError> for ApplicationError {
    fn from(value: NarratorError) -> Self {
        match value {
            NarratorError::Prompt(error) => Self::Configuration(error.to_string()),
            NarratorError::Llm(message) => Self::Integration(message),
            NarratorError::Journal(error) => Self::Persistence(error.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuoteSummary {
    pub quote_id: String,
    pub summary: String,
    pub journal_entry_id: String,
    pub generated_at: DateTime<Utc>,
}

pub struct QuoteNarrator {
    llm: Arc<dyn LlmClient>,
    prompts: PromptBuilder,
    journal: Arc<Journal>,
    deposit_pct: Decimal,
}

impl QuoteNarrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: PromptBuilder,
        journal: Arc<Journal>,
        deposit_pct: Decimal,
    ) -> Self {
        Self { llm, prompts, journal, deposit_pct }
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn render_prompt(&self, quote: &Quote) -> Result<String, PromptError> {
        self.prompts.render(QUOTE_SUMMARY_TEMPLATE, &quote_context(quote, self.deposit_pct))
    }

    /// Renders the summary prompt, asks the model and journals the exchange.
    /// Nothing is journaled when the model call fails.
    pub async fn summarize(
        &self,
        quote: &Quote,
        correlation_id: &str,
        now: DateTime<Utc>,
    ) -> Result<QuoteSummary, NarratorError> {
        let prompt = self.render_prompt(quote)?;
        let summary = self.llm.complete(&prompt).await.map_err(|error| {
            tracing::warn!(
                event_name = "system.narrator.llm_failed",
                correlation_id = %correlation_id,
                quote_id = %quote.id.0,
                error = %error,
                "quote summary generation failed"
            );
            NarratorError::Llm(format!("{error:#}"))
        })?;

        let entry = JournalEntry::new(SUMMARY_JOURNAL_KIND, prompt, summary.clone(), now)
            .with_metadata("quote_id", quote.id.0.clone())
            .with_metadata("correlation_id", correlation_id);
        let journal_entry_id = entry.id.clone();
        self.journal.append(entry).await?;

        tracing::info!(
            event_name = "system.narrator.summarized",
            correlation_id = %correlation_id,
            quote_id = %quote.id.0,
            summary_chars = summary.len(),
            "quote summary generated"
        );

        Ok(QuoteSummary {
            quote_id: quote.id.0.clone(),
            summary,
            journal_entry_id,
            generated_at: now,
        })
    }
}
