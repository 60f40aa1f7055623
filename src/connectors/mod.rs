use async_trait::async_trait;

use crate::error::MailError;
use crate::models::{BackendKind, FolderRef};

pub mod graph_api;
pub mod imap_api;

pub use graph_api::GraphConnector;
pub use imap_api::ImapConnector;

/// How much of the newest message a caller needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDepth {
    /// Whatever the backend needs to render the message.
    Render,
    /// The complete RFC 822 source.
    Source,
}

/// Body as delivered in a Graph listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestBody {
    pub content_type: Option<String>,
    pub content: Option<String>,
}

impl DigestBody {
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|kind| kind.eq_ignore_ascii_case("html"))
    }

    pub fn has_content(&self) -> bool {
        self.content
            .as_deref()
            .is_some_and(|content| !content.trim().is_empty())
    }
}

/// Pre-parsed message fields from a Graph listing, plus the MIME source when
/// the digest body could not be used directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphDigest {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub received_at: String,
    pub body: Option<DigestBody>,
    pub mime: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    /// Fully buffered RFC 822 source.
    Source(Vec<u8>),
    Digest(GraphDigest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Empty {
        folder: FolderRef,
    },
    Found {
        folder: FolderRef,
        content: MessageContent,
    },
}

impl FetchOutcome {
    pub fn folder(&self) -> &FolderRef {
        match self {
            Self::Empty { folder } | Self::Found { folder, .. } => folder,
        }
    }
}

/// Retrieves the single newest message of a folder.
#[async_trait]
pub trait MailboxReader: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn fetch_newest(&self, mailbox: &str, depth: FetchDepth)
        -> Result<FetchOutcome, MailError>;
}

/// Backend resolved once per request from the token exchange.
pub enum Backend {
    Imap(ImapConnector),
    Graph(GraphConnector),
}

#[async_trait]
impl MailboxReader for Backend {
    fn kind(&self) -> BackendKind {
        match self {
            Self::Imap(connector) => connector.kind(),
            Self::Graph(connector) => connector.kind(),
        }
    }

    async fn fetch_newest(
        &self,
        mailbox: &str,
        depth: FetchDepth,
    ) -> Result<FetchOutcome, MailError> {
        match self {
            Self::Imap(connector) => connector.fetch_newest(mailbox, depth).await,
            Self::Graph(connector) => connector.fetch_newest(mailbox, depth).await,
        }
    }
}
