pub mod html;
pub mod json;

use serde_json::Value;

use crate::error::MailError;
use crate::models::{Message, MessageLookup, OutputFormat};

pub use html::escape_html;

/// A message rendered for the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedOutput {
    Json(Value),
    Html(String),
}

impl RenderedOutput {
    /// Text form used by the CLI.
    pub fn into_text(self) -> Result<String, MailError> {
        match self {
            Self::Html(page) => Ok(page),
            Self::Json(value) => serde_json::to_string_pretty(&value)
                .map_err(|error| MailError::Parse(format!("encode message JSON: {error}"))),
        }
    }
}

pub fn render(format: OutputFormat, message: &Message) -> Result<RenderedOutput, MailError> {
    match format {
        OutputFormat::Json => Ok(RenderedOutput::Json(json::to_value(message)?)),
        OutputFormat::Html => Ok(RenderedOutput::Html(html::render_document(message))),
    }
}

pub fn render_lookup(
    format: OutputFormat,
    message_id: &str,
    lookup: &MessageLookup,
) -> Result<RenderedOutput, MailError> {
    match format {
        OutputFormat::Json => Ok(RenderedOutput::Json(json::lookup_value(lookup)?)),
        OutputFormat::Html => Ok(RenderedOutput::Html(html::render_lookup_document(
            message_id, lookup,
        ))),
    }
}
