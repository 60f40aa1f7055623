//! HTTP front end: `/api/mail-new` (also mounted at `/`), the by-id
//! `/api/message/:id` routes and `/healthz`.

use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, Method};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::error::MailError;
use crate::models::OutputFormat;
use crate::output::html::error_page;
use crate::output::RenderedOutput;
use crate::service::{Delivery, MailService, ServiceOutcome};

pub mod params;

use params::{MailParams, ParamBag};

pub fn router(service: MailService) -> Router {
    Router::new()
        .route("/api/mail-new", get(mail_new).post(mail_new))
        .route("/", get(mail_new).post(mail_new))
        .route("/api/message/:id", get(message_by_id))
        .route("/api/message/:id/html", get(message_by_id_html))
        .route("/healthz", get(healthz))
        .with_state(service)
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(listener: TcpListener, service: MailService) -> std::io::Result<()> {
    if let Ok(address) = listener.local_addr() {
        info!(%address, "mailpeek listening");
    }
    axum::serve(listener, router(service)).await
}

async fn healthz() -> &'static str {
    "ok"
}

async fn mail_new(
    State(service): State<MailService>,
    method: Method,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!("mail_request", %request_id, %method);
    async move {
        match handle(&service, &method, &headers, query.as_deref(), &body).await {
            Ok(response) => response,
            Err(error) => error.into_response(),
        }
    }
    .instrument(span)
    .await
}

async fn handle(
    service: &MailService,
    method: &Method,
    headers: &HeaderMap,
    query: Option<&str>,
    body: &[u8],
) -> Result<Response, MailError> {
    let mut bag = ParamBag::from_query(query);
    if *method == Method::POST {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());
        bag.merge_body(content_type, body)?;
    }
    let params = MailParams::from(&bag);

    check_password(service, params.password.as_deref())?;

    if let Some(message_id) = params.message_id.as_deref() {
        let format = match params.delivery {
            Delivery::Render(format) => format,
            Delivery::RawSnippet | Delivery::Download => OutputFormat::Json,
        };
        let rendered = service
            .fetch_by_id(&params.request, message_id, format)
            .await?;
        return Ok(rendered_response(rendered));
    }

    let outcome = service
        .fetch_latest(&params.request, params.delivery)
        .await?;
    Ok(into_response(outcome))
}

async fn message_by_id(
    State(service): State<MailService>,
    Path(message_id): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    let span = info_span!("message_lookup", request_id = %Uuid::new_v4());
    async move {
        match lookup(&service, &message_id, query.as_deref(), OutputFormat::Json).await {
            Ok(response) => response,
            Err(error) => error.into_response(),
        }
    }
    .instrument(span)
    .await
}

/// Errors on this route come back as an HTML page too.
async fn message_by_id_html(
    State(service): State<MailService>,
    Path(message_id): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    let span = info_span!("message_lookup", request_id = %Uuid::new_v4());
    async move {
        match lookup(&service, &message_id, query.as_deref(), OutputFormat::Html).await {
            Ok(response) => response,
            Err(error) => {
                error.log();
                (error.status(), Html(error_page(&error.to_string()))).into_response()
            }
        }
    }
    .instrument(span)
    .await
}

async fn lookup(
    service: &MailService,
    message_id: &str,
    query: Option<&str>,
    format: OutputFormat,
) -> Result<Response, MailError> {
    let params = MailParams::from(&ParamBag::from_query(query));
    check_password(service, params.password.as_deref())?;
    let rendered = service
        .fetch_by_id(&params.request, message_id, format)
        .await?;
    Ok(rendered_response(rendered))
}

fn check_password(service: &MailService, supplied: Option<&str>) -> Result<(), MailError> {
    match service.config().access_password.as_deref() {
        Some(expected) if supplied != Some(expected) => Err(MailError::Unauthorized(
            "Unauthorized: invalid password".to_string(),
        )),
        _ => Ok(()),
    }
}

fn rendered_response(rendered: RenderedOutput) -> Response {
    match rendered {
        RenderedOutput::Json(value) => Json(value).into_response(),
        RenderedOutput::Html(page) => Html(page).into_response(),
    }
}

fn into_response(outcome: ServiceOutcome) -> Response {
    match outcome {
        ServiceOutcome::Rendered(rendered) => rendered_response(rendered),
        ServiceOutcome::RawSnippet(snippet) => {
            ([(CONTENT_TYPE, "text/plain; charset=utf-8")], snippet).into_response()
        }
        ServiceOutcome::Download { filename, source } => (
            [
                (CONTENT_TYPE, "message/rfc822".to_string()),
                (
                    CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{filename}\""),
                ),
            ],
            source,
        )
            .into_response(),
    }
}
