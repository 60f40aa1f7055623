use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("token exchange failed: {0}")]
    Auth(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("message parse failed: {0}")]
    Parse(String),
}

impl MailError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Auth(_) | Self::Connection(_) | Self::Parse(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<imap::Error> for MailError {
    fn from(error: imap::Error) -> Self {
        Self::Connection(format!("imap: {error}"))
    }
}

impl From<mailparse::MailParseError> for MailError {
    fn from(error: mailparse::MailParseError) -> Self {
        Self::Parse(error.to_string())
    }
}

impl MailError {
    pub fn log(&self) {
        if self.status().is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }
    }
}

impl IntoResponse for MailError {
    fn into_response(self) -> Response {
        self.log();
        (
            self.status(),
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::MailError;

    #[test]
    fn taxonomy_maps_to_http_status() {
        assert_eq!(
            MailError::Validation("missing".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            MailError::Unauthorized("nope".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            MailError::Auth("rejected".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            MailError::Connection("reset".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            MailError::Parse("bad mime".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn validation_message_is_passed_through() {
        let error = MailError::Validation("Missing required parameters: email".into());
        assert_eq!(error.to_string(), "Missing required parameters: email");
    }
}
