use std::collections::HashMap;

use serde_json::Value;

use crate::error::MailError;
use crate::models::OutputFormat;
use crate::service::{Delivery, MailRequest};

/// Request parameters gathered from the query string and, for POST, the
/// JSON or form body. Body values override query values.
#[derive(Debug, Default, Clone)]
pub struct ParamBag {
    values: HashMap<String, Value>,
}

impl ParamBag {
    pub fn from_query(query: Option<&str>) -> Self {
        let mut bag = Self::default();
        if let Some(query) = query {
            bag.merge_form(query.as_bytes());
        }
        bag
    }

    pub fn merge_form(&mut self, body: &[u8]) {
        for (key, value) in url::form_urlencoded::parse(body).into_owned() {
            self.values.insert(key, Value::String(value));
        }
    }

    pub fn merge_json(&mut self, body: &[u8]) -> Result<(), MailError> {
        let parsed: Value = serde_json::from_slice(body)
            .map_err(|error| MailError::Validation(format!("invalid JSON body: {error}")))?;
        match parsed {
            Value::Object(map) => {
                self.values.extend(map);
                Ok(())
            }
            Value::Null => Ok(()),
            _ => Err(MailError::Validation(
                "request body must be a JSON object".to_string(),
            )),
        }
    }

    /// Dispatch on the declared content type; sniff when none is given.
    pub fn merge_body(&mut self, content_type: Option<&str>, body: &[u8]) -> Result<(), MailError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }
        let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
        if content_type.starts_with("application/json") {
            return self.merge_json(body);
        }
        if content_type.starts_with("application/x-www-form-urlencoded") {
            self.merge_form(body);
            return Ok(());
        }

        let first = body.iter().find(|byte| !byte.is_ascii_whitespace());
        if first == Some(&b'{') {
            self.merge_json(body)
        } else {
            self.merge_form(body);
            Ok(())
        }
    }

    pub fn text(&self, key: &str) -> Option<String> {
        let value = match self.values.get(key)? {
            Value::String(value) => value.trim().to_string(),
            Value::Number(value) => value.to_string(),
            Value::Bool(value) => value.to_string(),
            _ => return None,
        };
        (!value.is_empty()).then_some(value)
    }

    /// Only `"1"`, `1` or `true` switch a flag on.
    pub fn flag(&self, key: &str) -> bool {
        match self.values.get(key) {
            Some(Value::String(value)) => value.trim() == "1",
            Some(Value::Number(value)) => value.as_i64() == Some(1),
            Some(Value::Bool(value)) => *value,
            _ => false,
        }
    }
}

/// Typed view of one `/api/mail-new` call.
#[derive(Debug, Clone)]
pub struct MailParams {
    pub request: MailRequest,
    pub delivery: Delivery,
    pub password: Option<String>,
    /// Set when the caller asks for one message by id instead of the newest.
    pub message_id: Option<String>,
}

impl From<&ParamBag> for MailParams {
    fn from(bag: &ParamBag) -> Self {
        let format = bag
            .text("response_type")
            .and_then(|value| value.parse::<OutputFormat>().ok())
            .unwrap_or_default();
        let delivery = if bag.flag("download") {
            Delivery::Download
        } else if bag.flag("raw") {
            Delivery::RawSnippet
        } else {
            Delivery::Render(format)
        };

        Self {
            request: MailRequest {
                refresh_token: bag.text("refresh_token"),
                client_id: bag.text("client_id"),
                email: bag.text("email"),
                mailbox: bag.text("mailbox"),
                verbose: bag.flag("debug"),
            },
            delivery,
            message_id: bag.text("message_id").or_else(|| bag.text("id")),
            password: bag.values.get("password").and_then(|value| match value {
                Value::String(value) => Some(value.clone()),
                Value::Number(value) => Some(value.to_string()),
                _ => None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MailParams, ParamBag};
    use crate::models::OutputFormat;
    use crate::service::Delivery;

    #[test]
    fn query_parameters_are_decoded() {
        let bag = ParamBag::from_query(Some(
            "refresh_token=a%2Bb&client_id=app&mailbox=Junk+Email&response_type=HTML",
        ));
        let params = MailParams::from(&bag);
        assert_eq!(params.request.refresh_token.as_deref(), Some("a+b"));
        assert_eq!(params.request.mailbox.as_deref(), Some("Junk Email"));
        assert_eq!(params.delivery, Delivery::Render(OutputFormat::Html));
    }

    #[test]
    fn json_flags_accept_strings_numbers_and_booleans() {
        let mut bag = ParamBag::default();
        bag.merge_json(br#"{"raw": 1, "debug": true, "download": "0"}"#)
            .expect("json body");
        assert!(bag.flag("raw"));
        assert!(bag.flag("debug"));
        assert!(!bag.flag("download"));
        assert!(!bag.flag("missing"));

        let mut strings = ParamBag::default();
        strings
            .merge_json(br#"{"raw": "1", "debug": "yes", "download": 2}"#)
            .expect("json body");
        assert!(strings.flag("raw"));
        assert!(!strings.flag("debug"));
        assert!(!strings.flag("download"));
    }

    #[test]
    fn download_takes_precedence_over_raw() {
        let bag = ParamBag::from_query(Some("raw=1&download=1"));
        assert_eq!(MailParams::from(&bag).delivery, Delivery::Download);
    }

    #[test]
    fn invalid_response_type_falls_back_to_json() {
        let bag = ParamBag::from_query(Some("response_type=xml"));
        assert_eq!(
            MailParams::from(&bag).delivery,
            Delivery::Render(OutputFormat::Json)
        );
    }

    #[test]
    fn body_overrides_query_and_content_type_is_sniffed() {
        let mut bag = ParamBag::from_query(Some("mailbox=INBOX&email=a@example.com"));
        bag.merge_body(None, br#" {"mailbox": "Junk"}"#)
            .expect("sniffed json");
        bag.merge_body(
            Some("application/x-www-form-urlencoded; charset=utf-8"),
            b"client_id=app",
        )
        .expect("form body");

        let params = MailParams::from(&bag);
        assert_eq!(params.request.mailbox.as_deref(), Some("Junk"));
        assert_eq!(params.request.email.as_deref(), Some("a@example.com"));
        assert_eq!(params.request.client_id.as_deref(), Some("app"));
    }

    #[test]
    fn message_id_accepts_either_parameter_name() {
        let legacy = ParamBag::from_query(Some("message_id=%3Cabc%40example.com%3E&id=other"));
        assert_eq!(
            MailParams::from(&legacy).message_id.as_deref(),
            Some("<abc@example.com>")
        );

        let short = ParamBag::from_query(Some("id=AAMk-1"));
        assert_eq!(MailParams::from(&short).message_id.as_deref(), Some("AAMk-1"));

        let newest = ParamBag::from_query(Some("mailbox=Junk"));
        assert!(MailParams::from(&newest).message_id.is_none());
    }

    #[test]
    fn non_object_json_is_rejected() {
        let mut bag = ParamBag::default();
        assert!(bag.merge_body(Some("application/json"), b"[1,2]").is_err());
        assert!(bag.merge_body(Some("application/json"), b"{oops").is_err());
    }
}
