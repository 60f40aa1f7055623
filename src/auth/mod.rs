//! Credential/backend resolution: decides whether a refresh token belongs to
//! Microsoft Graph or must be used as a bare IMAP XOAUTH2 credential.

use reqwest::Client;
use tracing::warn;

use crate::config::AppConfig;
use crate::error::MailError;
use crate::models::{AccessToken, BackendKind, Credential};

mod token;

pub(crate) use token::redact_response_body;
use token::{exchange_refresh_token, Exchange, RefreshRequest};

pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
const GRAPH_OFFLINE_SCOPE: &str = "https://graph.microsoft.com/.default offline_access";

/// Graph permissions that let us read a message body.
const GRAPH_MAIL_SCOPES: &[&str] = &["mail.read", "mail.readwrite"];

/// Try a Graph-scoped exchange first; fall back to an unscoped
/// exchange for IMAP when Graph mail access was not granted.
pub async fn resolve_backend(
    client: &Client,
    config: &AppConfig,
    credential: &Credential,
    verbose: bool,
) -> Result<AccessToken, MailError> {
    let token_url = config.token_url_for(&credential.tenant);

    let scoped = exchange_refresh_token(
        client,
        &RefreshRequest {
            token_url: &token_url,
            client_id: &credential.client_id,
            client_secret: credential.client_secret.as_deref(),
            refresh_token: &credential.refresh_token,
            scope: Some(GRAPH_SCOPE),
        },
    )
    .await?;

    match scoped {
        Exchange::Granted {
            access_token,
            scope,
        } if scope.as_deref().is_some_and(grants_graph_mail) => {
            diag!(verbose, backend = %BackendKind::Graph, "graph mail scope confirmed");
            return Ok(AccessToken {
                token: access_token,
                backend: BackendKind::Graph,
                scope_confirmed: true,
            });
        }
        Exchange::Granted { scope, .. } => {
            diag!(
                verbose,
                scope = scope.as_deref().unwrap_or("-"),
                "graph exchange granted without mail scope; using imap"
            );
        }
        Exchange::Rejected { status, body } => {
            diag!(verbose, status, body = %body, "graph-scoped exchange rejected; using imap");
        }
    }

    let imap = exchange_refresh_token(
        client,
        &RefreshRequest {
            token_url: &token_url,
            client_id: &credential.client_id,
            client_secret: credential.client_secret.as_deref(),
            refresh_token: &credential.refresh_token,
            scope: None,
        },
    )
    .await?;

    match imap {
        Exchange::Granted { access_token, .. } => {
            diag!(verbose, backend = %BackendKind::Imap, "unscoped exchange granted");
            Ok(AccessToken {
                token: access_token,
                backend: BackendKind::Imap,
                scope_confirmed: false,
            })
        }
        Exchange::Rejected { status, body } => Err(MailError::Auth(format!(
            "token error {status}: {body}"
        ))),
    }
}

/// Exchange the process-wide Graph refresh token of a fixed-mailbox
/// deployment. Always resolves to the Graph backend.
pub async fn resolve_static_graph(
    client: &Client,
    config: &AppConfig,
    credential: &Credential,
    verbose: bool,
) -> Result<AccessToken, MailError> {
    let token_url = config.token_url_for(&credential.tenant);
    let exchange = exchange_refresh_token(
        client,
        &RefreshRequest {
            token_url: &token_url,
            client_id: &credential.client_id,
            client_secret: credential.client_secret.as_deref(),
            refresh_token: &credential.refresh_token,
            scope: Some(GRAPH_OFFLINE_SCOPE),
        },
    )
    .await?;

    match exchange {
        Exchange::Granted {
            access_token,
            scope,
        } => {
            let scope_confirmed = scope.as_deref().is_some_and(grants_graph_mail);
            diag!(verbose, scope_confirmed, "static graph token exchanged");
            if !scope_confirmed {
                warn!(
                    scope = scope.as_deref().unwrap_or("-"),
                    "static graph token lacks Mail.Read scope; continuing with graph"
                );
            }
            Ok(AccessToken {
                token: access_token,
                backend: BackendKind::Graph,
                scope_confirmed,
            })
        }
        Exchange::Rejected { status, body } => Err(MailError::Auth(format!(
            "token error {status}: {body}"
        ))),
    }
}

/// True when a space-separated scope list carries Graph mail read access.
/// Scopes may be bare (`Mail.Read`) or resource-qualified
/// (`https://graph.microsoft.com/Mail.ReadWrite`).
pub fn grants_graph_mail(scope: &str) -> bool {
    scope.split_whitespace().any(|entry| {
        let permission = entry.rsplit('/').next().unwrap_or(entry);
        GRAPH_MAIL_SCOPES
            .iter()
            .any(|wanted| permission.eq_ignore_ascii_case(wanted))
    })
}
