//! Language-model plumbing for Roofline.
//!
//! - `prompt` renders `{key}` templates over default business rules
//! - `llm` is the completion seam plus an HTTP client for Ollama and
//!   OpenAI-compatible servers
//! - `journal` is the append-only JSON log of model interactions
//! - `narrator` turns a stored quote into a customer-facing summary
//!
//! The model only rewords figures it is handed. Prices, dates and policy
//! outcomes always come from `roofline-core`.

pub mod journal;
pub mod llm;
pub mod narrator;
pub mod prompt;

pub use journal::{Journal, JournalEntry, JournalError};
pub use llm::{HttpLlmClient, LlmClient};
pub use narrator::{NarratorError, QuoteNarrator, QuoteSummary};
pub use prompt::{quote_context, PromptBuilder, PromptError, QUOTE_SUMMARY_TEMPLATE};
