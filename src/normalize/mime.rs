use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};
use regex::{Captures, Regex};
use tracing::debug;

/// An attachment that HTML may reference as `cid:<content_id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InlinePart {
    pub content_id: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Bodies and inline parts pulled out of a parsed MIME tree.
#[derive(Debug, Default)]
pub(crate) struct ExtractedParts {
    pub html: Option<String>,
    pub text: Option<String>,
    pub inline: Vec<InlinePart>,
}

pub(crate) fn extract_parts(mail: &ParsedMail<'_>) -> ExtractedParts {
    let mut parts = ExtractedParts::default();
    collect_parts(mail, &mut parts);
    parts
}

fn collect_parts(mail: &ParsedMail<'_>, parts: &mut ExtractedParts) {
    if !mail.subparts.is_empty() {
        for part in &mail.subparts {
            collect_parts(part, parts);
        }
        return;
    }

    let content_type = mail.ctype.mimetype.to_ascii_lowercase();
    let is_attachment =
        mail.get_content_disposition().disposition == DispositionType::Attachment;

    if !is_attachment {
        if content_type == "text/html" && parts.html.is_none() {
            parts.html = mail.get_body().ok();
            return;
        }
        if content_type == "text/plain" && parts.text.is_none() {
            parts.text = mail.get_body().ok();
            return;
        }
    }

    let Some(content_id) = content_id(mail) else {
        return;
    };
    match mail.get_body_raw() {
        Ok(data) if !data.is_empty() => parts.inline.push(InlinePart {
            content_id,
            mime_type: if content_type.is_empty() {
                "application/octet-stream".to_string()
            } else {
                content_type
            },
            data,
        }),
        Ok(_) => {}
        Err(error) => debug!(%error, "skipping undecodable inline part"),
    }
}

fn content_id(mail: &ParsedMail<'_>) -> Option<String> {
    let raw = mail.headers.get_first_value("Content-ID")?;
    let id = raw.trim().trim_start_matches('<').trim_end_matches('>').trim();
    (!id.is_empty()).then(|| id.to_string())
}

/// Replace whole `cid:` references with `data:` URIs. Parts above
/// `image_ceiling` are left alone, as is any substitution that would push
/// the document past `html_ceiling`.
pub(crate) fn inline_cid_images(
    html: String,
    inline: &[InlinePart],
    image_ceiling: usize,
    html_ceiling: usize,
) -> String {
    let mut html = html;
    for part in inline {
        if part.data.len() > image_ceiling {
            debug!(
                content_id = %part.content_id,
                bytes = part.data.len(),
                "inline part above ceiling; leaving cid reference"
            );
            continue;
        }

        let pattern = match Regex::new(&format!(
            r#"(?i)cid:{}(?P<end>["'\s)>;,&]|$)"#,
            regex::escape(&part.content_id)
        )) {
            Ok(pattern) => pattern,
            Err(error) => {
                debug!(%error, content_id = %part.content_id, "unusable content id");
                continue;
            }
        };
        if !pattern.is_match(&html) {
            continue;
        }

        let data_uri = format!("data:{};base64,{}", part.mime_type, STANDARD.encode(&part.data));
        let replaced = pattern
            .replace_all(&html, |caps: &Captures<'_>| format!("{data_uri}{}", &caps["end"]))
            .into_owned();
        if replaced.len() > html_ceiling {
            debug!(
                content_id = %part.content_id,
                bytes = replaced.len(),
                "inlining would exceed html ceiling; skipped"
            );
            continue;
        }
        html = replaced;
    }
    html
}
