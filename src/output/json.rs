use serde::Serialize;
use serde_json::{json, Value};

use crate::error::MailError;
use crate::models::{BodyNotice, BodyOrigin, Message, MessageLookup};
use crate::output::html::{lookup_fragment, simplified_fragment};

#[derive(Debug, Clone, Serialize)]
pub struct MessagePayload {
    pub send: String,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<NoticePayload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoticePayload {
    pub code: &'static str,
    pub message: String,
}

impl From<&BodyNotice> for NoticePayload {
    fn from(notice: &BodyNotice) -> Self {
        Self {
            code: notice.code(),
            message: notice.describe(),
        }
    }
}

impl From<&Message> for MessagePayload {
    fn from(message: &Message) -> Self {
        let html = match message.notice {
            Some(BodyNotice::Simplified { .. }) => simplified_fragment(message),
            _ => message.html_body.clone().unwrap_or_default(),
        };

        Self {
            send: message.sender.clone(),
            subject: message.subject.clone(),
            text: message.text_body.clone().unwrap_or_default(),
            html,
            date: message.received_at.clone(),
            notice: message.notice.as_ref().map(NoticePayload::from),
        }
    }
}

/// `{html, from}` answer for a message looked up by id.
#[derive(Debug, Clone, Serialize)]
pub struct LookupPayload {
    pub html: String,
    pub from: BodyOrigin,
}

impl From<&MessageLookup> for LookupPayload {
    fn from(lookup: &MessageLookup) -> Self {
        Self {
            html: lookup_fragment(lookup),
            from: lookup.origin,
        }
    }
}

pub fn lookup_value(lookup: &MessageLookup) -> Result<Value, MailError> {
    serde_json::to_value(LookupPayload::from(lookup))
        .map_err(|error| MailError::Parse(format!("encode lookup JSON: {error}")))
}

pub fn to_value(message: &Message) -> Result<Value, MailError> {
    if message.is_placeholder() {
        return Ok(json!({ "message": "no messages" }));
    }
    serde_json::to_value(MessagePayload::from(message))
        .map_err(|error| MailError::Parse(format!("encode message JSON: {error}")))
}

pub fn format_message(message: &Message) -> Result<String, MailError> {
    serde_json::to_string_pretty(&to_value(message)?)
        .map_err(|error| MailError::Parse(format!("encode message JSON: {error}")))
}
