mod common;

use common::{config_for, sample_mime, spawn_app, spawn_upstream, Fixture};
use mailpeek::config::Limits;
use serde_json::{json, Value};

async fn get_json(url: &str) -> (u16, Value) {
    let response = reqwest::get(url).await.expect("send request");
    let status = response.status().as_u16();
    let body = response.json::<Value>().await.expect("decode JSON body");
    (status, body)
}

#[tokio::test]
async fn graph_body_without_html_falls_back_to_mime() {
    let upstream = spawn_upstream(Fixture::default()).await;
    let app = spawn_app(config_for(upstream)).await;

    let (status, body) = get_json(&format!(
        "{app}/api/mail-new?refresh_token=rt&client_id=app&mailbox=Junk"
    ))
    .await;
    assert_eq!(status, 200);

    let mime = sample_mime();
    let parsed = mailparse::parse_mail(mime.as_bytes()).expect("parse fixture mime");
    let expected_html = parsed.subparts[1].get_body().expect("html part");

    assert_eq!(body["html"], Value::String(expected_html));
    assert_eq!(body["subject"], "Quarterly <Review>");
    assert_eq!(body["send"], "Alex Doe <alex@example.com>");
    assert_eq!(body["date"], "2025-07-01T08:52:37Z");
    assert!(body["text"]
        .as_str()
        .expect("text field")
        .contains("Hello from MIME"));
    assert!(body.get("notice").is_none());
}

#[tokio::test]
async fn graph_html_body_is_used_directly() {
    let upstream = spawn_upstream(Fixture {
        digest_content_type: "html".to_string(),
        digest_content: "<div>digest body</div>".to_string(),
        mime: "this would not parse as the body".to_string(),
        ..Fixture::default()
    })
    .await;
    let app = spawn_app(config_for(upstream)).await;

    let (status, body) = get_json(&format!(
        "{app}/api/mail-new?refresh_token=rt&client_id=app"
    ))
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["html"], "<div>digest body</div>");
    assert_eq!(body["text"], "");
}

#[tokio::test]
async fn html_response_escapes_metadata() {
    let upstream = spawn_upstream(Fixture::default()).await;
    let app = spawn_app(config_for(upstream)).await;

    let response = reqwest::get(format!(
        "{app}/api/mail-new?refresh_token=rt&client_id=app&response_type=html"
    ))
    .await
    .expect("send request");
    assert_eq!(response.status().as_u16(), 200);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/html"));

    let page = response.text().await.expect("read page");
    assert!(page.starts_with("<!doctype html>"));
    assert!(page.contains("Quarterly &lt;Review&gt;"));
    assert!(page.contains("<p>Hello from <b>MIME</b></p>"));
}

#[tokio::test]
async fn empty_folder_reports_no_messages() {
    let upstream = spawn_upstream(Fixture {
        folder_empty: true,
        ..Fixture::default()
    })
    .await;
    let app = spawn_app(config_for(upstream)).await;

    let (status, body) = get_json(&format!(
        "{app}/api/mail-new?refresh_token=rt&client_id=app&mailbox=INBOX"
    ))
    .await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "message": "no messages" }));

    let page = reqwest::get(format!(
        "{app}/api/mail-new?refresh_token=rt&client_id=app&response_type=html"
    ))
    .await
    .expect("send request")
    .text()
    .await
    .expect("read page");
    assert!(page.contains("This folder has no messages."));
}

#[tokio::test]
async fn raw_returns_exactly_the_leading_snippet() {
    let mut mime = String::from("From: big@example.com\r\nSubject: big\r\n\r\n");
    mime.push_str(&"abcdefghij".repeat(1_000_000));
    let upstream = spawn_upstream(Fixture {
        mime: mime.clone(),
        ..Fixture::default()
    })
    .await;
    let app = spawn_app(config_for(upstream)).await;

    let response = reqwest::get(format!(
        "{app}/api/mail-new?refresh_token=rt&client_id=app&raw=1"
    ))
    .await
    .expect("send request");
    assert_eq!(response.status().as_u16(), 200);
    let snippet = response.text().await.expect("read snippet");
    assert_eq!(snippet.chars().count(), 60_000);
    assert_eq!(snippet, mime[..60_000]);
}

#[tokio::test]
async fn download_returns_full_source_as_attachment() {
    let upstream = spawn_upstream(Fixture::default()).await;
    let app = spawn_app(config_for(upstream)).await;

    let response = reqwest::get(format!(
        "{app}/api/mail-new?refresh_token=rt&client_id=app&raw=1&download=1"
    ))
    .await
    .expect("send request");
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok()),
        Some("message/rfc822")
    );
    assert!(response
        .headers()
        .get("content-disposition")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("attachment")));
    let bytes = response.bytes().await.expect("read source");
    assert_eq!(bytes.as_ref(), sample_mime().as_bytes());
}

#[tokio::test]
async fn oversized_raw_message_is_not_parsed() {
    let mut mime = String::from("From: big@example.com\r\nSubject: Huge attachment\r\n\r\n");
    mime.push_str(&"x".repeat(4_096));
    let upstream = spawn_upstream(Fixture {
        mime,
        ..Fixture::default()
    })
    .await;
    let mut config = config_for(upstream);
    config.limits = Limits {
        raw_ceiling_bytes: 1_024,
        ..Limits::default()
    };
    let app = spawn_app(config).await;

    let (status, body) = get_json(&format!(
        "{app}/api/mail-new?refresh_token=rt&client_id=app"
    ))
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["notice"]["code"], "too_large");
    assert_eq!(body["html"], "");
    assert_eq!(body["subject"], "Quarterly <Review>");
}

#[tokio::test]
async fn oversized_html_is_simplified() {
    let big_html = format!("<div>{}</div>", "<p>row of text</p>".repeat(500));
    let upstream = spawn_upstream(Fixture {
        digest_content_type: "html".to_string(),
        digest_content: big_html.clone(),
        ..Fixture::default()
    })
    .await;
    let mut config = config_for(upstream);
    config.limits = Limits {
        html_ceiling_bytes: 2_000,
        ..Limits::default()
    };
    let app = spawn_app(config).await;

    let (status, body) = get_json(&format!(
        "{app}/api/mail-new?refresh_token=rt&client_id=app"
    ))
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["notice"]["code"], "simplified");
    let html = body["html"].as_str().expect("html field");
    assert!(!html.contains(&big_html));
    assert!(html.contains("row of text"));
}

#[tokio::test]
async fn post_json_body_drives_the_same_pipeline() {
    let upstream = spawn_upstream(Fixture::default()).await;
    let app = spawn_app(config_for(upstream)).await;

    let response = reqwest::Client::new()
        .post(format!("{app}/api/mail-new"))
        .json(&json!({
            "refresh_token": "rt",
            "client_id": "app",
            "mailbox": "Junk",
            "debug": 1
        }))
        .send()
        .await
        .expect("send request");
    assert_eq!(response.status().as_u16(), 200);
    let body = response.json::<Value>().await.expect("decode JSON body");
    assert_eq!(body["subject"], "Quarterly <Review>");
}

#[tokio::test]
async fn rejected_refresh_token_surfaces_token_error() {
    let upstream = spawn_upstream(Fixture::default()).await;
    let app = spawn_app(config_for(upstream)).await;

    let (status, body) = get_json(&format!(
        "{app}/api/mail-new?refresh_token=revoked&client_id=app"
    ))
    .await;
    assert_eq!(status, 500);
    let error = body["error"].as_str().expect("error field");
    assert!(error.contains("token error 400"));
    assert!(error.contains("invalid_grant"));
}
