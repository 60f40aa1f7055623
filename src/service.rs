//! One pass of the pipeline: resolve the credential, pick the backend, fetch
//! the newest message and hand it to the renderer.

use std::sync::Arc;

use reqwest::Client;

use crate::auth::{resolve_backend, resolve_static_graph};
use crate::config::AppConfig;
use crate::connectors::{
    Backend, FetchDepth, FetchOutcome, GraphConnector, ImapConnector, MailboxReader,
    MessageContent,
};
use crate::error::MailError;
use crate::locator::DEFAULT_MAILBOX;
use crate::models::{AccessToken, BackendKind, Credential, Message, OutputFormat};
use crate::normalize::{normalize, normalize_lookup, raw_snippet};
use crate::output::{render, render_lookup, RenderedOutput};

pub const DOWNLOAD_FILENAME: &str = "message.eml";

#[derive(Debug, Clone, Default)]
pub struct MailRequest {
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub email: Option<String>,
    pub mailbox: Option<String>,
    pub verbose: bool,
}

impl MailRequest {
    fn mailbox(&self) -> &str {
        self.mailbox
            .as_deref()
            .map(str::trim)
            .filter(|mailbox| !mailbox.is_empty())
            .unwrap_or(DEFAULT_MAILBOX)
    }
}

/// What the caller wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Render(OutputFormat),
    /// Leading characters of the raw source as plain text.
    RawSnippet,
    /// The full source as an attachment.
    Download,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceOutcome {
    Rendered(RenderedOutput),
    RawSnippet(String),
    Download { filename: String, source: Vec<u8> },
}

/// Shared, read-only request handler state.
#[derive(Debug, Clone)]
pub struct MailService {
    config: Arc<AppConfig>,
    client: Client,
}

impl MailService {
    pub fn new(config: AppConfig) -> Result<Self, MailError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| MailError::Connection(format!("build HTTP client: {error}")))?;
        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Reject requests that can never resolve a credential, before any
    /// network call.
    pub fn validate(&self, request: &MailRequest) -> Result<(), MailError> {
        if self.config.static_graph.is_some() {
            return Ok(());
        }
        let missing = [
            ("refresh_token", request.refresh_token.as_deref()),
            ("client_id", request.client_id.as_deref()),
        ]
        .into_iter()
        .filter(|(_, value)| value.map_or(true, |value| value.trim().is_empty()))
        .map(|(name, _)| name)
        .collect::<Vec<_>>();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(MailError::Validation(format!(
                "Missing required parameters: {}",
                missing.join(", ")
            )))
        }
    }

    pub async fn fetch_latest(
        &self,
        request: &MailRequest,
        delivery: Delivery,
    ) -> Result<ServiceOutcome, MailError> {
        self.validate(request)?;
        let verbose = request.verbose;

        let backend = self.open_backend(request).await?;
        diag!(verbose, backend = %backend.kind(), "backend resolved");

        let depth = match delivery {
            Delivery::Render(_) => FetchDepth::Render,
            Delivery::RawSnippet | Delivery::Download => FetchDepth::Source,
        };
        let outcome = backend.fetch_newest(request.mailbox(), depth).await?;
        diag!(
            verbose,
            requested = %outcome.folder().logical_name,
            folder = %outcome.folder().resolved,
            found = matches!(outcome, FetchOutcome::Found { .. }),
            "folder read"
        );

        let content = match outcome {
            FetchOutcome::Empty { .. } => {
                let format = match delivery {
                    Delivery::Render(format) => format,
                    _ => OutputFormat::Json,
                };
                return Ok(ServiceOutcome::Rendered(render(
                    format,
                    &Message::no_messages(),
                )?));
            }
            FetchOutcome::Found { content, .. } => content,
        };

        match (delivery, content) {
            (Delivery::Render(format), content) => {
                let message = normalize(content, &self.config.limits)?;
                diag!(
                    verbose,
                    bytes = message.raw_size_bytes,
                    has_html = message.html_body.is_some(),
                    notice = message.notice.as_ref().map_or("-", |notice| notice.code()),
                    "message normalized"
                );
                Ok(ServiceOutcome::Rendered(render(format, &message)?))
            }
            (Delivery::RawSnippet, MessageContent::Source(source)) => {
                diag!(verbose, bytes = source.len(), "returning raw snippet");
                Ok(ServiceOutcome::RawSnippet(raw_snippet(
                    &source,
                    self.config.limits.raw_snippet_chars,
                )))
            }
            (Delivery::Download, MessageContent::Source(source)) => {
                diag!(verbose, bytes = source.len(), "returning full source");
                Ok(ServiceOutcome::Download {
                    filename: DOWNLOAD_FILENAME.to_string(),
                    source,
                })
            }
            (_, MessageContent::Digest(_)) => Err(MailError::Connection(
                "backend returned a digest where the raw source was requested".to_string(),
            )),
        }
    }

    /// Fetch one message by Graph id or `internetMessageId` and render its
    /// body with an origin marker.
    pub async fn fetch_by_id(
        &self,
        request: &MailRequest,
        message_id: &str,
        format: OutputFormat,
    ) -> Result<RenderedOutput, MailError> {
        let message_id = message_id.trim();
        if message_id.is_empty() {
            return Err(MailError::Validation("missing message_id".to_string()));
        }
        self.validate(request)?;
        let verbose = request.verbose;

        let graph = self.open_graph(request).await?;
        let graph_id = graph.resolve_message_id(message_id).await?;
        diag!(verbose, requested = message_id, resolved = %graph_id, "message id resolved");

        let digest = graph.fetch_by_id(&graph_id).await?;
        let lookup = normalize_lookup(digest, &self.config.limits)?;
        diag!(
            verbose,
            origin = %lookup.origin,
            bytes = lookup.message.raw_size_bytes,
            "message looked up"
        );
        render_lookup(format, message_id, &lookup)
    }

    async fn open_graph(&self, request: &MailRequest) -> Result<GraphConnector, MailError> {
        let (token, graph_user) = self.resolve_token(request).await?;
        if token.backend != BackendKind::Graph {
            return Err(MailError::Validation(
                "message lookup by id requires a Graph-scoped token".to_string(),
            ));
        }
        Ok(GraphConnector::new(
            self.client.clone(),
            self.config.graph_api_base.clone(),
            graph_user,
            token.token,
        ))
    }

    async fn open_backend(&self, request: &MailRequest) -> Result<Backend, MailError> {
        let (token, graph_user) = self.resolve_token(request).await?;
        self.backend_for(token, &graph_user, request.email.as_deref())
    }

    /// The access token plus the Graph user it addresses.
    async fn resolve_token(&self, request: &MailRequest) -> Result<(AccessToken, String), MailError> {
        if let Some(credential) = self.request_credential(request) {
            let token =
                resolve_backend(&self.client, &self.config, &credential, request.verbose)
                    .await?;
            return Ok((token, "me".to_string()));
        }

        let Some(fixed) = self.config.static_graph.as_ref() else {
            return Err(MailError::Validation(
                "Missing required parameters: refresh_token, client_id".to_string(),
            ));
        };
        let credential = Credential {
            refresh_token: fixed.refresh_token.clone(),
            client_id: fixed.client_id.clone(),
            client_secret: fixed.client_secret.clone(),
            tenant: fixed.tenant_id.clone(),
            mailbox_owner: Some(fixed.user.clone()),
        };
        let token =
            resolve_static_graph(&self.client, &self.config, &credential, request.verbose)
                .await?;
        Ok((token, fixed.user.clone()))
    }

    fn request_credential(&self, request: &MailRequest) -> Option<Credential> {
        let refresh_token = non_blank(request.refresh_token.as_deref())?;
        let client_id = non_blank(request.client_id.as_deref())?;
        Some(Credential {
            refresh_token,
            client_id,
            client_secret: None,
            tenant: self.config.tenant.clone(),
            mailbox_owner: non_blank(request.email.as_deref()),
        })
    }

    fn backend_for(
        &self,
        token: AccessToken,
        graph_user: &str,
        email: Option<&str>,
    ) -> Result<Backend, MailError> {
        match token.backend {
            BackendKind::Graph => Ok(Backend::Graph(GraphConnector::new(
                self.client.clone(),
                self.config.graph_api_base.clone(),
                graph_user,
                token.token,
            ))),
            BackendKind::Imap => {
                let email = non_blank(email).ok_or_else(|| {
                    MailError::Validation("Missing required parameters: email".to_string())
                })?;
                Ok(Backend::Imap(ImapConnector::new(
                    self.config.imap_host.clone(),
                    self.config.imap_port,
                    email,
                    token.token,
                )))
            }
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::{MailRequest, MailService};
    use crate::config::{AppConfig, StaticGraphCredentials};
    use crate::connectors::{Backend, MailboxReader};
    use crate::error::MailError;
    use crate::models::{AccessToken, BackendKind, OutputFormat};

    fn service(config: AppConfig) -> MailService {
        MailService::new(config).expect("build service")
    }

    #[test]
    fn missing_credentials_are_listed() {
        let error = service(AppConfig::default())
            .validate(&MailRequest {
                client_id: Some("app".to_string()),
                ..MailRequest::default()
            })
            .expect_err("missing refresh token");
        assert_eq!(
            error.to_string(),
            "Missing required parameters: refresh_token"
        );
    }

    #[test]
    fn static_graph_config_waives_credentials() {
        let config = AppConfig {
            static_graph: Some(StaticGraphCredentials {
                tenant_id: "common".to_string(),
                client_id: "app".to_string(),
                client_secret: None,
                refresh_token: "rt".to_string(),
                user: "me".to_string(),
            }),
            ..AppConfig::default()
        };
        assert!(service(config).validate(&MailRequest::default()).is_ok());
    }

    #[test]
    fn imap_backend_requires_email() {
        let svc = service(AppConfig::default());
        let token = AccessToken {
            token: "t".to_string(),
            backend: BackendKind::Imap,
            scope_confirmed: false,
        };
        let error = svc
            .backend_for(token.clone(), "me", Some("  "))
            .err()
            .expect("email required");
        assert!(matches!(error, MailError::Validation(_)));

        let backend = svc
            .backend_for(token, "me", Some("owner@example.com"))
            .expect("imap backend");
        assert!(matches!(backend, Backend::Imap(_)));
        assert_eq!(backend.kind(), BackendKind::Imap);
    }

    #[test]
    fn graph_backend_ignores_email() {
        let svc = service(AppConfig::default());
        let backend = svc
            .backend_for(
                AccessToken {
                    token: "t".to_string(),
                    backend: BackendKind::Graph,
                    scope_confirmed: true,
                },
                "me",
                None,
            )
            .expect("graph backend");
        assert_eq!(backend.kind(), BackendKind::Graph);
    }

    #[tokio::test]
    async fn lookup_without_id_is_rejected_before_any_exchange() {
        let error = service(AppConfig::default())
            .fetch_by_id(&MailRequest::default(), "  ", OutputFormat::Json)
            .await
            .expect_err("missing id");
        assert_eq!(error.to_string(), "missing message_id");
    }

    #[test]
    fn blank_mailbox_defaults_to_inbox() {
        let request = MailRequest {
            mailbox: Some("   ".to_string()),
            ..MailRequest::default()
        };
        assert_eq!(request.mailbox(), "INBOX");
    }
}
