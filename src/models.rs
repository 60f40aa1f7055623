use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which protocol a refresh token was resolved to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Imap,
    Graph,
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Imap => write!(f, "imap"),
            Self::Graph => write!(f, "graph"),
        }
    }
}

/// Per-request OAuth2 material. Never persisted.
#[derive(Clone)]
pub struct Credential {
    pub refresh_token: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub tenant: String,
    pub mailbox_owner: Option<String>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("refresh_token", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("tenant", &self.tenant)
            .field("mailbox_owner", &self.mailbox_owner)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub backend: BackendKind,
    pub scope_confirmed: bool,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("backend", &self.backend)
            .field("scope_confirmed", &self.scope_confirmed)
            .finish()
    }
}

/// A logical folder name and the provider path or id it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderRef {
    pub logical_name: String,
    pub resolved: String,
}

/// Why the rendered body differs from the message's own HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyNotice {
    /// The HTML body exceeded the ceiling and was replaced by its text.
    Simplified { html_bytes: usize, ceiling: usize },
    /// The raw message exceeded the raw ceiling and was not parsed.
    TooLarge { raw_bytes: usize, ceiling: usize },
    /// The folder held no messages.
    NoMessages,
}

impl BodyNotice {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Simplified { .. } => "simplified",
            Self::TooLarge { .. } => "too_large",
            Self::NoMessages => "no_messages",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Simplified {
                html_bytes,
                ceiling,
            } => format!(
                "This message's HTML body is {} (limit {}); showing a simplified text view instead.",
                human_size(*html_bytes),
                human_size(*ceiling)
            ),
            Self::TooLarge { raw_bytes, ceiling } => format!(
                "This message is {} (limit {}) and is too large to render inline. \
                 Request it again with raw=1 for a source snippet or download=1 for the full .eml file.",
                human_size(*raw_bytes),
                human_size(*ceiling)
            ),
            Self::NoMessages => "This folder has no messages.".to_string(),
        }
    }
}

fn human_size(bytes: usize) -> String {
    if bytes >= 1_000_000 {
        format!("{:.1} MB", bytes as f64 / 1_000_000.0)
    } else if bytes >= 1_000 {
        format!("{:.1} KB", bytes as f64 / 1_000.0)
    } else {
        format!("{bytes} bytes")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    pub sender: String,
    pub subject: String,
    pub received_at: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub raw_size_bytes: usize,
    pub notice: Option<BodyNotice>,
}

impl Message {
    /// Placeholder produced for an empty folder.
    pub fn no_messages() -> Self {
        Self {
            notice: Some(BodyNotice::NoMessages),
            ..Self::default()
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.notice == Some(BodyNotice::NoMessages)
    }

    pub fn has_body(&self) -> bool {
        self.html_body.as_deref().is_some_and(|html| !html.trim().is_empty())
            || self.text_body.as_deref().is_some_and(|text| !text.trim().is_empty())
    }
}

/// Where the body of a message looked up by id came from.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BodyOrigin {
    GraphBodyHtml,
    GraphBodyText,
    MimeHtml,
    MimeText,
    /// Escaped leading characters of the source.
    Raw,
    NoBody,
}

impl Display for BodyOrigin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::GraphBodyHtml => "graph-body-html",
            Self::GraphBodyText => "graph-body-text",
            Self::MimeHtml => "mime-html",
            Self::MimeText => "mime-text",
            Self::Raw => "raw",
            Self::NoBody => "no-body",
        };
        f.write_str(label)
    }
}

/// A message fetched by id, with the origin of its body.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageLookup {
    pub message: Message,
    pub origin: BodyOrigin,
    /// Leading characters of the MIME source, when one was fetched.
    pub raw_snippet: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Html,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "" => Ok(Self::Json),
            "html" => Ok(Self::Html),
            other => Err(format!("invalid response_type: {other}")),
        }
    }
}
