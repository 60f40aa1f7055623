//! Maps a caller's logical folder name onto the provider's folder.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::FolderRef;

pub const DEFAULT_MAILBOX: &str = "INBOX";

/// Junk folder names seen across Outlook locales and IMAP servers.
const JUNK_ALIASES: &[&str] = &[
    "junk",
    "junk email",
    "junk-email",
    "junkemail",
    "junk e-mail",
    "junk-e-mail",
    "spam",
    "垃圾",
    "垃圾邮件",
    "垃圾郵件",
    "courrier indésirable",
    "correo no deseado",
    "posta indesiderata",
    "ongewenste e-mail",
];

fn junk_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let alternatives = JUNK_ALIASES
            .iter()
            .map(|alias| regex::escape(alias))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!("(?i)^(?:{alternatives})$")).expect("junk alias pattern is valid")
    })
}

fn is_junk_name(name: &str) -> bool {
    junk_pattern().is_match(name.trim())
}

fn leaf_segment<'a>(path: &'a str, delimiter: Option<&str>) -> &'a str {
    match delimiter.filter(|delimiter| !delimiter.is_empty()) {
        Some(delimiter) => path.rsplit(delimiter).next().unwrap_or(path),
        None => path,
    }
}

/// A folder advertised by the IMAP `LIST` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedFolder {
    /// Wire name in modified UTF-7, as `EXAMINE` expects it.
    pub path: String,
    /// Decoded UTF-8 name, used for matching.
    pub name: String,
    pub delimiter: Option<String>,
}

impl ListedFolder {
    pub fn new(path: impl Into<String>, delimiter: Option<&str>) -> Self {
        let path = path.into();
        Self {
            name: utf7_imap::decode_utf7_imap(path.clone()),
            path,
            delimiter: delimiter.map(str::to_string),
        }
    }

    fn leaf(&self) -> &str {
        leaf_segment(&self.name, self.delimiter.as_deref())
    }
}

/// Resolve `want` against the live IMAP folder tree. Never fails: anything
/// unresolved lands on the inbox. Matching runs on decoded names; the result
/// is the wire path.
pub fn locate_imap_folder(folders: &[ListedFolder], want: &str) -> FolderRef {
    let logical_name = normalize_request(want);

    let resolved = folders
        .iter()
        .find(|folder| same_name(&folder.name, &logical_name) || folder.path == logical_name)
        .map(|folder| folder.path.clone())
        .or_else(|| {
            if !is_junk_name(&logical_name) {
                return None;
            }
            folders
                .iter()
                .find(|folder| is_junk_name(&folder.name))
                .or_else(|| folders.iter().find(|folder| is_junk_name(folder.leaf())))
                .map(|folder| folder.path.clone())
        })
        .unwrap_or_else(|| inbox_path(folders));

    FolderRef {
        logical_name,
        resolved,
    }
}

fn same_name(listed: &str, wanted: &str) -> bool {
    listed.eq_ignore_ascii_case(wanted) || listed.to_lowercase() == wanted.to_lowercase()
}

fn inbox_path(folders: &[ListedFolder]) -> String {
    folders
        .iter()
        .find(|folder| folder.path.eq_ignore_ascii_case("inbox"))
        .map(|folder| folder.path.clone())
        .unwrap_or_else(|| DEFAULT_MAILBOX.to_string())
}

/// Static Graph well-known folder table.
pub fn locate_graph_folder(want: &str) -> FolderRef {
    let logical_name = normalize_request(want);
    let resolved = if logical_name.eq_ignore_ascii_case("inbox") {
        "inbox"
    } else if is_junk_name(&logical_name) {
        "junkemail"
    } else {
        "inbox"
    };

    FolderRef {
        logical_name,
        resolved: resolved.to_string(),
    }
}

fn normalize_request(want: &str) -> String {
    let trimmed = want.trim();
    if trimmed.is_empty() {
        DEFAULT_MAILBOX.to_string()
    } else {
        trimmed.to_string()
    }
}
