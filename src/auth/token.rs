use reqwest::Client;
use serde::Deserialize;

use crate::error::MailError;

const REDACTED_BODY_MAX_LEN: usize = 200;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OAuthTokenResponse {
    pub access_token: Option<String>,
    #[allow(dead_code)]
    pub token_type: Option<String>,
    #[allow(dead_code)]
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
}

/// Outcome of one refresh-token exchange.
#[derive(Debug)]
pub(crate) enum Exchange {
    Granted { access_token: String, scope: Option<String> },
    Rejected { status: u16, body: String },
}

/// One `grant_type=refresh_token` POST against the token endpoint.
pub(crate) struct RefreshRequest<'a> {
    pub token_url: &'a str,
    pub client_id: &'a str,
    pub client_secret: Option<&'a str>,
    pub refresh_token: &'a str,
    pub scope: Option<&'a str>,
}

pub(crate) async fn exchange_refresh_token(
    client: &Client,
    request: &RefreshRequest<'_>,
) -> Result<Exchange, MailError> {
    let mut form = vec![
        ("client_id", request.client_id),
        ("grant_type", "refresh_token"),
        ("refresh_token", request.refresh_token),
    ];
    if let Some(secret) = request.client_secret {
        form.push(("client_secret", secret));
    }
    if let Some(scope) = request.scope {
        form.push(("scope", scope));
    }

    let response = client
        .post(request.token_url)
        .form(&form)
        .send()
        .await
        .map_err(|error| {
            MailError::Auth(format!(
                "request oauth token from {}: {error}",
                request.token_url
            ))
        })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|error| MailError::Auth(format!("read oauth token response: {error}")))?;

    if !status.is_success() {
        return Ok(Exchange::Rejected {
            status: status.as_u16(),
            body: redact_response_body(&body),
        });
    }

    let payload: OAuthTokenResponse = serde_json::from_str(&body)
        .map_err(|error| MailError::Auth(format!("decode oauth token JSON response: {error}")))?;

    match payload.access_token.filter(|token| !token.trim().is_empty()) {
        Some(access_token) => Ok(Exchange::Granted {
            access_token,
            scope: payload.scope,
        }),
        None => Err(MailError::Auth("no access_token in token response".to_string())),
    }
}

pub(crate) fn redact_response_body(body: &str) -> String {
    let trimmed = body.trim();
    let total = trimmed.chars().count();
    if total <= REDACTED_BODY_MAX_LEN {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(REDACTED_BODY_MAX_LEN).collect();
        format!("{head}…[truncated {} bytes]", trimmed.len())
    }
}
