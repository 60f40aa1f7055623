use crate::models::{BodyNotice, BodyOrigin, Message, MessageLookup};

const PRE_OPEN: &str = "<pre style=\"white-space:pre-wrap;\">";
const NO_BODY_TEXT: &str = "This message has no renderable body, or only attachments.";

const STYLE: &str = "\
body{font-family:system-ui,-apple-system,Segoe UI,Roboto,Noto Sans,Arial;background:#f7f7f7;margin:0}
.wrap{max-width:960px;margin:24px auto;background:#fff;border-radius:12px;box-shadow:0 10px 24px rgba(0,0,0,.06);overflow:hidden}
.hdr{padding:18px 20px;border-bottom:1px solid #eee}.hdr h1{margin:0;font-size:20px}
.meta{padding:10px 20px;border-bottom:1px solid #f5f5f5;color:#555;font-size:14px}
.content{padding:16px 20px;min-height:300px}.label{font-weight:600;color:#333}
.warn{padding:12px;margin-bottom:12px;background:#fff3cd;border:1px solid #ffeeba;border-radius:8px;color:#856404}";

/// Escape the five HTML-significant characters.
pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

pub(crate) fn notice_banner(notice: &BodyNotice) -> String {
    format!(
        "<div class=\"warn\" data-notice=\"{}\">{}</div>",
        notice.code(),
        escape_html(&notice.describe())
    )
}

pub(crate) fn pre_text(text: &str) -> String {
    format!("{PRE_OPEN}{}</pre>", escape_html(text))
}

/// Fragment shown in place of an oversized HTML body.
pub(crate) fn simplified_fragment(message: &Message) -> String {
    let mut fragment = message
        .notice
        .as_ref()
        .map(notice_banner)
        .unwrap_or_default();
    if let Some(text) = message.text_body.as_deref() {
        fragment.push_str(&pre_text(text));
    }
    fragment
}

/// Banner(s), then the HTML body verbatim, else the text body escaped, else a
/// "nothing to show" banner.
fn content_region(message: &Message) -> String {
    let mut region = message
        .notice
        .as_ref()
        .map(notice_banner)
        .unwrap_or_default();

    if let Some(html) = message
        .html_body
        .as_deref()
        .filter(|html| !html.trim().is_empty())
    {
        region.push_str(html);
    } else if let Some(text) = message
        .text_body
        .as_deref()
        .filter(|text| !text.trim().is_empty())
    {
        region.push_str(&pre_text(text));
    } else if !message.is_placeholder() {
        region.push_str(&format!("<div class=\"warn\">{NO_BODY_TEXT}</div>"));
    }
    region
}

/// Body fragment for a message looked up by id.
pub fn lookup_fragment(lookup: &MessageLookup) -> String {
    let message = &lookup.message;
    match lookup.origin {
        BodyOrigin::Raw => {
            let mut fragment = message
                .notice
                .as_ref()
                .map(notice_banner)
                .unwrap_or_default();
            fragment.push_str(&pre_text(lookup.raw_snippet.as_deref().unwrap_or_default()));
            fragment
        }
        BodyOrigin::NoBody => pre_text(NO_BODY_TEXT),
        _ if matches!(message.notice, Some(BodyNotice::Simplified { .. })) => {
            simplified_fragment(message)
        }
        _ => match (message.html_body.as_deref(), message.text_body.as_deref()) {
            (Some(html), _) => html.to_string(),
            (None, Some(text)) => pre_text(text),
            (None, None) => pre_text(NO_BODY_TEXT),
        },
    }
}

/// Standalone document for a message looked up by id, labelled with the
/// origin of its body.
pub fn render_lookup_document(message_id: &str, lookup: &MessageLookup) -> String {
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"/>\
<meta name=\"viewport\" content=\"width=device-width,initial-scale=1\"/>\n\
<title>Message {id}</title>\n<style>\n{STYLE}\n</style></head><body>\n\
<div class=\"wrap\">\n  <div class=\"meta\">Rendered via <b>{origin}</b></div>\n\
  <div class=\"content\">{content}</div>\n</div>\n</body></html>",
        id = escape_html(message_id),
        origin = escape_html(&lookup.origin.to_string()),
        content = lookup_fragment(lookup),
    )
}

/// Plain error page for the HTML lookup route.
pub fn error_page(message: &str) -> String {
    format!("<pre>{}</pre>", escape_html(message))
}

/// Standalone HTML document for one message.
pub fn render_document(message: &Message) -> String {
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"/>\
<meta name=\"viewport\" content=\"width=device-width,initial-scale=1\"/>\n\
<title>Mail message</title>\n<style>\n{STYLE}\n</style></head><body>\n\
<div class=\"wrap\">\n  <div class=\"hdr\"><h1>Mail message</h1></div>\n  <div class=\"meta\">\n\
    <div><span class=\"label\">From: </span>{sender}</div>\n\
    <div><span class=\"label\">Subject: </span>{subject}</div>\n\
    <div><span class=\"label\">Date: </span>{date}</div>\n\
    <div style=\"margin-top:8px\" class=\"label\">Content:</div>\n  </div>\n\
  <div class=\"content\">{content}</div>\n</div>\n</body></html>",
        sender = escape_html(&message.sender),
        subject = escape_html(&message.subject),
        date = escape_html(&message.received_at),
        content = content_region(message),
    )
}
