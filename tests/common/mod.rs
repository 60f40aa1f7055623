#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use mailpeek::config::AppConfig;
use mailpeek::server;
use mailpeek::service::MailService;
use serde_json::json;

pub const GRAPH_ACCESS_TOKEN: &str = "graph-access-token";
pub const IMAP_ACCESS_TOKEN: &str = "imap-access-token";

/// What the mock identity provider and Graph API hand back.
#[derive(Debug, Clone)]
pub struct Fixture {
    /// Scope reported for a Graph-scoped exchange; `None` rejects it.
    pub graph_scope: Option<String>,
    /// Whether an unscoped exchange succeeds.
    pub imap_grant: bool,
    pub digest_content_type: String,
    pub digest_content: String,
    pub mime: String,
    pub folder_empty: bool,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            graph_scope: Some(
                "https://graph.microsoft.com/Mail.ReadWrite https://graph.microsoft.com/User.Read"
                    .to_string(),
            ),
            imap_grant: true,
            digest_content_type: "text".to_string(),
            digest_content: "Hello from MIME".to_string(),
            mime: sample_mime(),
            folder_empty: false,
        }
    }
}

pub fn sample_mime() -> String {
    concat!(
        "From: \"Alex Doe\" <alex@example.com>\r\n",
        "Subject: Quarterly <Review>\r\n",
        "Date: Tue, 1 Jul 2025 10:52:37 +0200\r\n",
        "MIME-Version: 1.0\r\n",
        "Content-Type: multipart/alternative; boundary=\"b1\"\r\n",
        "\r\n",
        "--b1\r\n",
        "Content-Type: text/plain; charset=utf-8\r\n",
        "\r\n",
        "Hello from MIME\r\n",
        "--b1\r\n",
        "Content-Type: text/html; charset=utf-8\r\n",
        "\r\n",
        "<p>Hello from <b>MIME</b></p>\r\n",
        "--b1--\r\n",
    )
    .to_string()
}

async fn token(
    State(fixture): State<Arc<Fixture>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    if form.get("grant_type").map(String::as_str) != Some("refresh_token")
        || form.get("refresh_token").map(String::as_str) == Some("revoked")
    {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant" })),
        )
            .into_response();
    }

    match form.get("scope") {
        Some(scope) if scope.contains("graph.microsoft.com") => match &fixture.graph_scope {
            Some(granted) => Json(json!({
                "access_token": GRAPH_ACCESS_TOKEN,
                "token_type": "Bearer",
                "expires_in": 3600,
                "scope": granted,
            }))
            .into_response(),
            None => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid_scope" })),
            )
                .into_response(),
        },
        _ if fixture.imap_grant => Json(json!({
            "access_token": IMAP_ACCESS_TOKEN,
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "https://outlook.office.com/IMAP.AccessAsUser.All",
        }))
        .into_response(),
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant" })),
        )
            .into_response(),
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {GRAPH_ACCESS_TOKEN}");
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some(expected.as_str())
}

async fn list_messages(
    State(fixture): State<Arc<Fixture>>,
    Path(folder): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if fixture.folder_empty {
        return Json(json!({ "value": [] })).into_response();
    }
    Json(json!({
        "value": [{
            "id": format!("{folder}-newest"),
            "subject": "Quarterly <Review>",
            "from": { "emailAddress": { "name": "Alex Doe", "address": "alex@example.com" } },
            "receivedDateTime": "2025-07-01T08:52:37Z",
            "hasAttachments": false,
            "body": {
                "contentType": fixture.digest_content_type,
                "content": fixture.digest_content,
            }
        }]
    }))
    .into_response()
}

/// Graph id of the message the `$filter` lookup finds.
pub const RESOLVED_MESSAGE_ID: &str = "AAMk-resolved";
/// `internetMessageId` the mock knows about.
pub const INTERNET_MESSAGE_ID: &str = "<abc@example.com>";

fn known_message(id: &str) -> bool {
    id.ends_with("-newest") || id.starts_with("AAMk")
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": { "code": "ErrorItemNotFound" } })),
    )
        .into_response()
}

async fn message_by_id(
    State(fixture): State<Arc<Fixture>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if !known_message(&id) {
        return not_found();
    }
    Json(json!({
        "id": id,
        "subject": "Quarterly <Review>",
        "from": { "emailAddress": { "name": "Alex Doe", "address": "alex@example.com" } },
        "receivedDateTime": "2025-07-01T08:52:37Z",
        "hasAttachments": false,
        "body": {
            "contentType": fixture.digest_content_type,
            "content": fixture.digest_content,
        }
    }))
    .into_response()
}

async fn find_by_internet_message_id(
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let wanted = format!("internetMessageId eq '{INTERNET_MESSAGE_ID}'");
    if query.get("$filter") == Some(&wanted) {
        Json(json!({
            "value": [{ "id": RESOLVED_MESSAGE_ID, "internetMessageId": INTERNET_MESSAGE_ID }]
        }))
        .into_response()
    } else {
        Json(json!({ "value": [] })).into_response()
    }
}

async fn message_mime(
    State(fixture): State<Arc<Fixture>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if !known_message(&id) {
        return not_found();
    }
    fixture.mime.clone().into_response()
}

async fn spawn(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve test router");
    });
    addr
}

/// Start the mock identity provider and Graph API; returns its address.
pub async fn spawn_upstream(fixture: Fixture) -> SocketAddr {
    let router = Router::new()
        .route("/token", post(token))
        .route(
            "/v1.0/me/mailFolders/:folder/messages",
            get(list_messages),
        )
        .route("/v1.0/me/messages", get(find_by_internet_message_id))
        .route("/v1.0/me/messages/:id", get(message_by_id))
        .route("/v1.0/me/messages/:id/$value", get(message_mime))
        .with_state(Arc::new(fixture));
    spawn(router).await
}

pub fn config_for(upstream: SocketAddr) -> AppConfig {
    AppConfig {
        token_url: Some(format!("http://{upstream}/token")),
        graph_api_base: format!("http://{upstream}/v1.0"),
        imap_host: "127.0.0.1".to_string(),
        imap_port: 1,
        ..AppConfig::default()
    }
}

/// Start the real mailpeek router; returns its base URL.
pub async fn spawn_app(config: AppConfig) -> String {
    let service = MailService::new(config).expect("build mail service");
    let addr = spawn(server::router(service)).await;
    format!("http://{addr}")
}
