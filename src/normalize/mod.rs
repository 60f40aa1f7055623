//! Turns fetched message content into a [`Message`]: HTML preferred, a text
//! fallback kept, size ceilings applied.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use mailparse::{addrparse, parse_headers, parse_mail, MailAddr, MailHeaderMap};
use tracing::{debug, warn};

use crate::config::Limits;
use crate::connectors::{GraphDigest, MessageContent};
use crate::error::MailError;
use crate::models::{BodyNotice, BodyOrigin, Message, MessageLookup};

mod mime;

pub fn normalize(content: MessageContent, limits: &Limits) -> Result<Message, MailError> {
    match content {
        MessageContent::Source(raw) => normalize_source(&raw, limits),
        MessageContent::Digest(digest) => normalize_digest(digest, limits),
    }
}

/// Parse a complete RFC 822 source.
pub fn normalize_source(raw: &[u8], limits: &Limits) -> Result<Message, MailError> {
    if raw.len() > limits.raw_ceiling_bytes {
        warn!(
            bytes = raw.len(),
            ceiling = limits.raw_ceiling_bytes,
            "raw message above ceiling; reading headers only"
        );
        return headers_only(raw, limits);
    }

    let parsed = parse_mail(raw)?;
    let parts = mime::extract_parts(&parsed);
    let html = parts.html.map(|html| {
        mime::inline_cid_images(
            html,
            &parts.inline,
            limits.inline_image_ceiling_bytes,
            limits.html_ceiling_bytes,
        )
    });

    let message = Message {
        sender: parsed
            .headers
            .get_first_value("From")
            .map(|value| format_sender(&value))
            .unwrap_or_default(),
        subject: parsed
            .headers
            .get_first_value("Subject")
            .unwrap_or_default(),
        received_at: parsed
            .headers
            .get_first_value("Date")
            .map(|value| format_date(&value))
            .unwrap_or_default(),
        html_body: non_blank(html),
        text_body: non_blank(parts.text),
        raw_size_bytes: raw.len(),
        notice: None,
    };
    debug!(
        bytes = raw.len(),
        has_html = message.html_body.is_some(),
        has_text = message.text_body.is_some(),
        inline_parts = parts.inline.len(),
        "mime source parsed"
    );

    Ok(apply_html_ceiling(message, limits))
}

fn headers_only(raw: &[u8], limits: &Limits) -> Result<Message, MailError> {
    let (headers, _) = parse_headers(raw)?;
    Ok(Message {
        sender: headers
            .get_first_value("From")
            .map(|value| format_sender(&value))
            .unwrap_or_default(),
        subject: headers.get_first_value("Subject").unwrap_or_default(),
        received_at: headers
            .get_first_value("Date")
            .map(|value| format_date(&value))
            .unwrap_or_default(),
        html_body: None,
        text_body: None,
        raw_size_bytes: raw.len(),
        notice: Some(BodyNotice::TooLarge {
            raw_bytes: raw.len(),
            ceiling: limits.raw_ceiling_bytes,
        }),
    })
}

/// Graph digest fields win for the envelope; the MIME source, when present,
/// supplies the body.
pub fn normalize_digest(digest: GraphDigest, limits: &Limits) -> Result<Message, MailError> {
    merge_digest(digest, limits).map(|(message, _)| message)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodySource {
    Digest,
    Mime,
}

fn merge_digest(digest: GraphDigest, limits: &Limits) -> Result<(Message, BodySource), MailError> {
    let (mut message, source) = match digest.mime.as_deref() {
        Some(mime) => {
            let parsed = normalize_source(mime, limits)?;
            if parsed.has_body() || parsed.notice.is_some() {
                (parsed, BodySource::Mime)
            } else {
                debug!(message_id = %digest.id, "mime source has no body; keeping digest body");
                (
                    apply_html_ceiling(digest_body_message(&digest), limits),
                    BodySource::Digest,
                )
            }
        }
        None => (
            apply_html_ceiling(digest_body_message(&digest), limits),
            BodySource::Digest,
        ),
    };

    if !digest.sender.is_empty() {
        message.sender = digest.sender;
    }
    if !digest.subject.is_empty() {
        message.subject = digest.subject;
    }
    if !digest.received_at.is_empty() {
        message.received_at = digest.received_at;
    }
    Ok((message, source))
}

/// Normalize a message fetched by id and record where its body came from.
/// When neither Graph nor MIME yields a body, the escaped source snippet
/// stands in.
pub fn normalize_lookup(digest: GraphDigest, limits: &Limits) -> Result<MessageLookup, MailError> {
    let raw_snippet = digest
        .mime
        .as_deref()
        .filter(|mime| !mime.is_empty())
        .map(|mime| raw_snippet(mime, limits.lookup_snippet_chars));
    let (message, source) = merge_digest(digest, limits)?;

    let has_html = message.html_body.is_some()
        || matches!(message.notice, Some(BodyNotice::Simplified { .. }));
    let has_text = message.text_body.is_some();
    let origin = match source {
        _ if matches!(message.notice, Some(BodyNotice::TooLarge { .. })) => BodyOrigin::Raw,
        BodySource::Mime if has_html => BodyOrigin::MimeHtml,
        BodySource::Mime if has_text => BodyOrigin::MimeText,
        BodySource::Digest if has_html => BodyOrigin::GraphBodyHtml,
        BodySource::Digest if has_text => BodyOrigin::GraphBodyText,
        _ if raw_snippet.is_some() => BodyOrigin::Raw,
        _ => BodyOrigin::NoBody,
    };

    Ok(MessageLookup {
        message,
        origin,
        raw_snippet,
    })
}

fn digest_body_message(digest: &GraphDigest) -> Message {
    let Some(body) = digest.body.as_ref().filter(|body| body.has_content()) else {
        return Message::default();
    };
    let content = body.content.clone().unwrap_or_default();
    let raw_size_bytes = content.len();

    if body.is_html() {
        Message {
            html_body: Some(content),
            raw_size_bytes,
            ..Message::default()
        }
    } else {
        Message {
            text_body: Some(content),
            raw_size_bytes,
            ..Message::default()
        }
    }
}

/// Replace HTML above the ceiling with its text fallback.
fn apply_html_ceiling(mut message: Message, limits: &Limits) -> Message {
    let Some(html_bytes) = message.html_body.as_ref().map(String::len) else {
        return message;
    };
    if html_bytes <= limits.html_ceiling_bytes {
        return message;
    }

    warn!(
        bytes = html_bytes,
        ceiling = limits.html_ceiling_bytes,
        "html body above ceiling; simplifying"
    );
    let html = message.html_body.take().unwrap_or_default();
    if message.text_body.is_none() {
        message.text_body = html_to_text(&html);
    }
    message.notice = Some(BodyNotice::Simplified {
        html_bytes,
        ceiling: limits.html_ceiling_bytes,
    });
    message
}

/// Plain-text rendering of an HTML fragment. `None` when the converter
/// panics or yields nothing.
pub fn html_to_text(html: &str) -> Option<String> {
    std::panic::catch_unwind(|| {
        html2text::from_read(html.as_bytes(), 120)
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    })
    .ok()
    .filter(|text| !text.is_empty())
}

/// RFC 2822 date to RFC 3339 UTC; anything unparseable passes through.
pub fn format_date(raw: &str) -> String {
    let trimmed = raw.trim();
    parse_header_date(trimmed)
        .map(|date| date.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| trimmed.to_string())
}

/// Strict RFC 2822 first, then mailparse's lenient parser. The lenient parser
/// reports garbage as the epoch, so a zero timestamp counts as a failure.
fn parse_header_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }
    mailparse::dateparse(value)
        .ok()
        .filter(|timestamp| *timestamp != 0)
        .and_then(|timestamp| Utc.timestamp_opt(timestamp, 0).single())
}

/// `Name <address>` for each address in a From header.
fn format_sender(raw: &str) -> String {
    let Ok(addresses) = addrparse(raw) else {
        return raw.trim().to_string();
    };

    let rendered = addresses
        .iter()
        .flat_map(|address| match address {
            MailAddr::Single(single) => vec![single.clone()],
            MailAddr::Group(group) => group.addrs.clone(),
        })
        .map(|single| match single.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => format!("{name} <{}>", single.addr),
            _ => single.addr,
        })
        .collect::<Vec<_>>()
        .join(", ");

    if rendered.is_empty() {
        raw.trim().to_string()
    } else {
        rendered
    }
}

/// First `max_chars` characters of the raw source, lossily decoded.
pub fn raw_snippet(raw: &[u8], max_chars: usize) -> String {
    String::from_utf8_lossy(raw).chars().take(max_chars).collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
