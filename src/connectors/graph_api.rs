use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth::redact_response_body;
use crate::connectors::{
    DigestBody, FetchDepth, FetchOutcome, GraphDigest, MailboxReader, MessageContent,
};
use crate::error::MailError;
use crate::locator::locate_graph_folder;
use crate::models::{BackendKind, FolderRef};

const MESSAGE_SELECT_FIELDS: &str = "id,subject,from,receivedDateTime,body,hasAttachments";
const SOURCE_SELECT_FIELDS: &str = "id";
const LOOKUP_SELECT_FIELDS: &str = "id,internetMessageId";

/// Reads the newest message through Microsoft Graph.
#[derive(Clone)]
pub struct GraphConnector {
    client: Client,
    api_base: String,
    user: String,
    access_token: String,
}

impl std::fmt::Debug for GraphConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphConnector")
            .field("api_base", &self.api_base)
            .field("user", &self.user)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl GraphConnector {
    /// `user` is `me` for delegated tokens or a user principal / id for a
    /// fixed-mailbox deployment.
    pub fn new(
        client: Client,
        api_base: impl Into<String>,
        user: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            user: user.into(),
            access_token: access_token.into(),
        }
    }

    fn mailbox_base(&self) -> String {
        let user = self.user.trim();
        if user.is_empty() || user.eq_ignore_ascii_case("me") {
            format!("{}/me", self.api_base)
        } else {
            format!("{}/users/{}", self.api_base, user)
        }
    }

    fn newest_message_url(&self, folder: &FolderRef, select: &str) -> Result<Url, MailError> {
        let endpoint = format!(
            "{}/mailFolders/{}/messages",
            self.mailbox_base(),
            folder.resolved
        );
        let mut url = Url::parse(&endpoint)
            .map_err(|error| MailError::Connection(format!("parse graph URL {endpoint}: {error}")))?;
        url.query_pairs_mut()
            .append_pair("$top", "1")
            .append_pair("$orderby", "receivedDateTime desc")
            .append_pair("$select", select);
        Ok(url)
    }

    fn mime_url(&self, message_id: &str) -> Result<Url, MailError> {
        self.mailbox_url(&["messages", message_id, "$value"])
    }

    fn message_url(&self, message_id: &str) -> Result<Url, MailError> {
        let mut url = self.mailbox_url(&["messages", message_id])?;
        url.query_pairs_mut()
            .append_pair("$select", MESSAGE_SELECT_FIELDS);
        Ok(url)
    }

    /// OData lookup of a message by its `Message-ID` header value.
    fn internet_message_id_url(&self, internet_message_id: &str) -> Result<Url, MailError> {
        let mut url = self.mailbox_url(&["messages"])?;
        url.query_pairs_mut()
            .append_pair(
                "$filter",
                &format!(
                    "internetMessageId eq '{}'",
                    internet_message_id.replace('\'', "''")
                ),
            )
            .append_pair("$select", LOOKUP_SELECT_FIELDS);
        Ok(url)
    }

    fn mailbox_url(&self, segments: &[&str]) -> Result<Url, MailError> {
        let base = self.mailbox_base();
        let mut url = Url::parse(&base)
            .map_err(|error| MailError::Connection(format!("parse graph URL {base}: {error}")))?;
        url.path_segments_mut()
            .map_err(|_| MailError::Connection("graph base URL cannot carry a path".to_string()))?
            .extend(segments);
        Ok(url)
    }

    async fn get_json(&self, url: Url, what: &str) -> Result<Option<String>, MailError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|error| MailError::Connection(format!("request graph {what}: {error}")))?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            MailError::Connection(format!("read graph {what} response body: {error}"))
        })?;
        if !status.is_success() {
            debug!(
                %status,
                request = what,
                body = %redact_response_body(&body),
                "graph request not served"
            );
            return Ok(None);
        }
        Ok(Some(body))
    }

    /// Map an `internetMessageId` (anything with `@` or wrapped in angle
    /// brackets) onto the Graph message id. Other ids, and lookups that find
    /// nothing, come back unchanged.
    pub async fn resolve_message_id(&self, message_id: &str) -> Result<String, MailError> {
        if !looks_like_internet_message_id(message_id) {
            return Ok(message_id.to_string());
        }

        let url = self.internet_message_id_url(message_id)?;
        let Some(body) = self.get_json(url, "message lookup").await? else {
            return Ok(message_id.to_string());
        };
        let page: GraphMessagesPage = serde_json::from_str(&body).map_err(|error| {
            MailError::Connection(format!("decode graph message lookup JSON: {error}"))
        })?;

        let resolved = page
            .value
            .into_iter()
            .find_map(|message| message.id.filter(|id| !id.trim().is_empty()));
        match resolved {
            Some(id) => {
                debug!(internet_message_id = message_id, id = %id, "internet message id resolved");
                Ok(id)
            }
            None => {
                debug!(internet_message_id = message_id, "no message matched; using id as given");
                Ok(message_id.to_string())
            }
        }
    }

    /// One message by Graph id. The MIME source is fetched whenever the
    /// Graph body is not usable HTML, and its failure is an error here.
    pub async fn fetch_by_id(&self, message_id: &str) -> Result<GraphDigest, MailError> {
        let url = self.message_url(message_id)?;
        let mut digest = match self.get_json(url, "message").await? {
            Some(body) => {
                let message: GraphMessage = serde_json::from_str(&body).map_err(|error| {
                    MailError::Connection(format!("decode graph message JSON: {error}"))
                })?;
                map_graph_message(message, message_id.to_string())
            }
            None => GraphDigest {
                id: message_id.to_string(),
                ..GraphDigest::default()
            },
        };

        if needs_mime_fallback(digest.body.as_ref()) {
            debug!(message_id, "graph body is not html; fetching mime");
            digest.mime = Some(self.fetch_mime(message_id).await?);
        }
        Ok(digest)
    }

    async fn fetch_newest_listing(
        &self,
        folder: &FolderRef,
        select: &str,
    ) -> Result<Option<GraphMessage>, MailError> {
        let url = self.newest_message_url(folder, select)?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|error| MailError::Connection(format!("request graph messages: {error}")))?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            MailError::Connection(format!("read graph messages response body: {error}"))
        })?;
        if !status.is_success() {
            return Err(MailError::Connection(format!(
                "graph messages request failed: status={} body={}",
                status,
                redact_response_body(&body)
            )));
        }

        let page: GraphMessagesPage = serde_json::from_str(&body).map_err(|error| {
            MailError::Connection(format!("decode graph messages page JSON: {error}"))
        })?;
        Ok(page.value.into_iter().next())
    }

    /// Download the full MIME representation (`$value`) of one message.
    async fn fetch_mime(&self, message_id: &str) -> Result<Vec<u8>, MailError> {
        let url = self.mime_url(message_id)?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|error| MailError::Connection(format!("request graph mime: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Connection(format!(
                "mime fetch error {}: {}",
                status,
                redact_response_body(&body)
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|error| MailError::Connection(format!("read graph mime body: {error}")))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl MailboxReader for GraphConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::Graph
    }

    async fn fetch_newest(
        &self,
        mailbox: &str,
        depth: FetchDepth,
    ) -> Result<FetchOutcome, MailError> {
        let folder = locate_graph_folder(mailbox);
        debug!(
            requested = %folder.logical_name,
            resolved = %folder.resolved,
            "graph folder located"
        );

        let select = match depth {
            FetchDepth::Render => MESSAGE_SELECT_FIELDS,
            FetchDepth::Source => SOURCE_SELECT_FIELDS,
        };
        let Some(message) = self.fetch_newest_listing(&folder, select).await? else {
            return Ok(FetchOutcome::Empty { folder });
        };
        let id = message
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| MailError::Connection("graph message missing id".to_string()))?;

        if depth == FetchDepth::Source {
            let source = self.fetch_mime(&id).await?;
            return Ok(FetchOutcome::Found {
                folder,
                content: MessageContent::Source(source),
            });
        }

        let mut digest = map_graph_message(message, id);
        if needs_mime_fallback(digest.body.as_ref()) {
            debug!(message_id = %digest.id, "graph body is not html; fetching mime fallback");
            match self.fetch_mime(&digest.id).await {
                Ok(mime) => digest.mime = Some(mime),
                Err(error) => {
                    warn!(message_id = %digest.id, %error, "mime fallback unavailable; using digest only");
                }
            }
        }

        Ok(FetchOutcome::Found {
            folder,
            content: MessageContent::Digest(digest),
        })
    }
}

pub fn looks_like_internet_message_id(id: &str) -> bool {
    let id = id.trim();
    id.contains('@') || (id.starts_with('<') && id.ends_with('>'))
}

/// The digest body is only usable as-is when it is non-empty HTML.
pub(crate) fn needs_mime_fallback(body: Option<&DigestBody>) -> bool {
    match body {
        Some(body) => !(body.has_content() && body.is_html()),
        None => true,
    }
}

fn map_graph_message(message: GraphMessage, id: String) -> GraphDigest {
    let sender = message
        .from
        .as_ref()
        .map(GraphRecipient::display)
        .unwrap_or_default();

    GraphDigest {
        id,
        sender,
        subject: message.subject.unwrap_or_default(),
        received_at: message.received_date_time.unwrap_or_default(),
        body: message.body.map(|body| DigestBody {
            content_type: body.content_type,
            content: body.content,
        }),
        mime: None,
    }
}

/// Response page from the plain `/messages` list endpoint.
#[derive(Debug, Clone, Deserialize)]
struct GraphMessagesPage {
    #[serde(default)]
    value: Vec<GraphMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct GraphMessage {
    id: Option<String>,
    subject: Option<String>,
    from: Option<GraphRecipient>,
    body: Option<GraphBody>,
    #[serde(rename = "receivedDateTime")]
    received_date_time: Option<String>,
    #[serde(rename = "hasAttachments")]
    #[allow(dead_code)]
    has_attachments: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct GraphRecipient {
    #[serde(rename = "emailAddress")]
    email_address: Option<GraphEmailAddress>,
}

impl GraphRecipient {
    /// `Name <address>`, or whichever half is present.
    fn display(&self) -> String {
        let Some(email) = self.email_address.as_ref() else {
            return String::new();
        };
        let name = email
            .name
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());
        let address = email
            .address
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match (name, address) {
            (Some(name), Some(address)) if !name.eq_ignore_ascii_case(address) => {
                format!("{name} <{address}>")
            }
            (_, Some(address)) => address.to_string(),
            (Some(name), None) => name.to_string(),
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GraphEmailAddress {
    name: Option<String>,
    address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GraphBody {
    #[serde(rename = "contentType")]
    content_type: Option<String>,
    content: Option<String>,
}
