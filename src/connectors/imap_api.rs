use async_trait::async_trait;
use tokio::task;
use tracing::{debug, warn};

use crate::connectors::{FetchDepth, FetchOutcome, MailboxReader, MessageContent};
use crate::error::MailError;
use crate::locator::{locate_imap_folder, ListedFolder};
use crate::models::BackendKind;

pub type Uid = u32;

/// Reads the newest message over IMAP, authenticating with XOAUTH2.
#[derive(Clone)]
pub struct ImapConnector {
    host: String,
    port: u16,
    user: String,
    access_token: String,
}

impl std::fmt::Debug for ImapConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConnector")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl ImapConnector {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            access_token: access_token.into(),
        }
    }

    fn connect(&self) -> Result<SessionGuard, MailError> {
        let client = imap::ClientBuilder::new(self.host.as_str(), self.port).connect()?;
        let auth = XOAuth2Authenticator {
            user: self.user.clone(),
            access_token: self.access_token.clone(),
        };
        let session = client
            .authenticate("XOAUTH2", &auth)
            .map_err(|(error, _client)| {
                MailError::Connection(format!("imap XOAUTH2 authentication rejected: {error}"))
            })?;
        debug!(host = %self.host, user = %self.user, "imap session authenticated");
        Ok(SessionGuard { session })
    }
}

#[async_trait]
impl MailboxReader for ImapConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::Imap
    }

    async fn fetch_newest(
        &self,
        mailbox: &str,
        _depth: FetchDepth,
    ) -> Result<FetchOutcome, MailError> {
        let connector = self.clone();
        let mailbox = mailbox.to_string();

        task::spawn_blocking(move || {
            let mut session = connector.connect()?;
            fetch_newest_in(&mut session, &mailbox)
        })
        .await
        .map_err(|error| MailError::Connection(format!("imap fetch task failed: {error}")))?
    }
}

#[derive(Clone)]
struct XOAuth2Authenticator {
    user: String,
    access_token: String,
}

impl imap::Authenticator for XOAuth2Authenticator {
    type Response = String;

    fn process(&self, _data: &[u8]) -> Self::Response {
        format!(
            "user={}\x01auth=Bearer {}\x01\x01",
            self.user, self.access_token
        )
    }
}

/// The slice of an IMAP session the newest-message fetch relies on.
pub(crate) trait FolderSession {
    fn list_folders(&mut self) -> Result<Vec<ListedFolder>, MailError>;

    /// Open a folder read-only.
    fn examine(&mut self, path: &str) -> Result<(), MailError>;

    fn search_uids(&mut self) -> Result<Vec<Uid>, MailError>;

    /// Complete RFC 822 source for one UID, fully buffered.
    fn fetch_source(&mut self, uid: Uid) -> Result<Option<Vec<u8>>, MailError>;
}

/// Owns an authenticated session and logs it out when dropped, so every exit
/// path releases the connection.
struct SessionGuard {
    session: imap::Session<imap::Connection>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        match self.session.logout() {
            Ok(()) => debug!("imap session logged out"),
            Err(error) => debug!(%error, "imap logout failed; dropping connection"),
        }
    }
}

impl FolderSession for SessionGuard {
    fn list_folders(&mut self) -> Result<Vec<ListedFolder>, MailError> {
        let names = self.session.list(None, Some("*"))?;
        Ok(names
            .iter()
            .map(|name| ListedFolder::new(name.name(), name.delimiter()))
            .collect())
    }

    fn examine(&mut self, path: &str) -> Result<(), MailError> {
        let mailbox = self.session.examine(path)?;
        debug!(folder = path, exists = mailbox.exists, "folder opened read-only");
        Ok(())
    }

    fn search_uids(&mut self) -> Result<Vec<Uid>, MailError> {
        Ok(self.session.uid_search("ALL")?.into_iter().collect())
    }

    fn fetch_source(&mut self, uid: Uid) -> Result<Option<Vec<u8>>, MailError> {
        let fetches = self.session.uid_fetch(uid.to_string(), "RFC822")?;
        let source = fetches
            .iter()
            .find(|fetch| fetch.uid == Some(uid))
            .or_else(|| fetches.iter().next())
            .and_then(|fetch| fetch.body())
            .map(<[u8]>::to_vec);
        Ok(source)
    }
}

/// UIDs are assigned in ascending order, so the greatest one is the newest
/// arrival in the folder.
pub(crate) fn newest_uid(uids: &[Uid]) -> Option<Uid> {
    uids.iter().copied().max()
}

pub(crate) fn fetch_newest_in<S: FolderSession>(
    session: &mut S,
    want: &str,
) -> Result<FetchOutcome, MailError> {
    let folders = session.list_folders()?;
    let folder = locate_imap_folder(&folders, want);
    debug!(
        requested = %folder.logical_name,
        resolved = %folder.resolved,
        listed = folders.len(),
        "imap folder located"
    );

    session.examine(&folder.resolved)?;

    let uids = session.search_uids()?;
    let Some(uid) = newest_uid(&uids) else {
        return Ok(FetchOutcome::Empty { folder });
    };
    debug!(uid, candidates = uids.len(), "newest uid selected");

    match session.fetch_source(uid)? {
        Some(source) => Ok(FetchOutcome::Found {
            folder,
            content: MessageContent::Source(source),
        }),
        None => {
            warn!(uid, folder = %folder.resolved, "server returned no body for uid");
            Err(MailError::Connection(format!(
                "imap server returned no message body for uid {uid}"
            )))
        }
    }
}
