use std::time::Duration;

use clap::Args;

pub const DEFAULT_TENANT: &str = "consumers";
pub const DEFAULT_IMAP_HOST: &str = "outlook.office365.com";
pub const DEFAULT_IMAP_PORT: u16 = 993;
pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

pub const DEFAULT_HTML_CEILING_BYTES: usize = 1_800_000;
pub const DEFAULT_RAW_CEILING_BYTES: usize = 5_000_000;
pub const DEFAULT_INLINE_IMAGE_CEILING_BYTES: usize = 1_500_000;
pub const RAW_SNIPPET_CHARS: usize = 60_000;
pub const LOOKUP_SNIPPET_CHARS: usize = 20_000;

/// Size ceilings applied by the body normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub html_ceiling_bytes: usize,
    pub raw_ceiling_bytes: usize,
    pub inline_image_ceiling_bytes: usize,
    pub raw_snippet_chars: usize,
    /// Source characters shown when a looked-up message has no body.
    pub lookup_snippet_chars: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            html_ceiling_bytes: DEFAULT_HTML_CEILING_BYTES,
            raw_ceiling_bytes: DEFAULT_RAW_CEILING_BYTES,
            inline_image_ceiling_bytes: DEFAULT_INLINE_IMAGE_CEILING_BYTES,
            raw_snippet_chars: RAW_SNIPPET_CHARS,
            lookup_snippet_chars: LOOKUP_SNIPPET_CHARS,
        }
    }
}

/// Graph credentials for a fixed-mailbox deployment. When present, requests
/// may omit `refresh_token` and `client_id`.
#[derive(Clone)]
pub struct StaticGraphCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub refresh_token: String,
    pub user: String,
}

impl std::fmt::Debug for StaticGraphCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticGraphCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &"[REDACTED]")
            .field("user", &self.user)
            .finish()
    }
}

/// Process-wide configuration, built once at startup and shared read-only
/// with every request.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub tenant: String,
    pub token_url: Option<String>,
    pub graph_api_base: String,
    pub imap_host: String,
    pub imap_port: u16,
    pub request_timeout: Duration,
    pub access_password: Option<String>,
    pub limits: Limits,
    pub static_graph: Option<StaticGraphCredentials>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tenant: DEFAULT_TENANT.to_string(),
            token_url: None,
            graph_api_base: GRAPH_API_BASE.to_string(),
            imap_host: DEFAULT_IMAP_HOST.to_string(),
            imap_port: DEFAULT_IMAP_PORT,
            request_timeout: Duration::from_secs(30),
            access_password: None,
            limits: Limits::default(),
            static_graph: None,
        }
    }
}

impl AppConfig {
    /// Token endpoint for the given tenant, unless an explicit URL override
    /// is configured.
    pub fn token_url_for(&self, tenant: &str) -> String {
        self.token_url.clone().unwrap_or_else(|| {
            format!("https://login.microsoftonline.com/{tenant}/oauth2/v2.0/token")
        })
    }
}

#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// OAuth2 tenant used for per-request token exchanges
    #[arg(long, env = "MAILPEEK_TENANT", default_value = DEFAULT_TENANT)]
    pub tenant: String,

    /// Override the full OAuth2 token endpoint URL
    #[arg(long, env = "MAILPEEK_TOKEN_URL")]
    pub token_url: Option<String>,

    /// Microsoft Graph API base URL
    #[arg(long, env = "MAILPEEK_GRAPH_API_BASE", default_value = GRAPH_API_BASE)]
    pub graph_api_base: String,

    #[arg(long, env = "MAILPEEK_IMAP_HOST", default_value = DEFAULT_IMAP_HOST)]
    pub imap_host: String,

    #[arg(long, env = "MAILPEEK_IMAP_PORT", default_value_t = DEFAULT_IMAP_PORT)]
    pub imap_port: u16,

    /// Timeout for token endpoint and Graph calls, in seconds
    #[arg(long, env = "MAILPEEK_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Shared secret that requests must present as `password`
    #[arg(long, env = "MAILPEEK_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// HTML bodies above this size are replaced by a simplified text view
    #[arg(long, env = "MAILPEEK_MAX_HTML_BYTES", default_value_t = DEFAULT_HTML_CEILING_BYTES)]
    pub max_html_bytes: usize,

    /// Raw messages above this size are not parsed at all
    #[arg(long, env = "MAILPEEK_MAX_RAW_BYTES", default_value_t = DEFAULT_RAW_CEILING_BYTES)]
    pub max_raw_bytes: usize,

    /// Largest attachment inlined for a `cid:` reference
    #[arg(long, env = "MAILPEEK_MAX_INLINE_IMAGE_BYTES", default_value_t = DEFAULT_INLINE_IMAGE_CEILING_BYTES)]
    pub max_inline_image_bytes: usize,

    #[arg(long, env = "MAILPEEK_GRAPH_TENANT_ID")]
    pub graph_tenant_id: Option<String>,

    #[arg(long, env = "MAILPEEK_GRAPH_CLIENT_ID")]
    pub graph_client_id: Option<String>,

    #[arg(long, env = "MAILPEEK_GRAPH_CLIENT_SECRET", hide_env_values = true)]
    pub graph_client_secret: Option<String>,

    #[arg(long, env = "MAILPEEK_GRAPH_REFRESH_TOKEN", hide_env_values = true)]
    pub graph_refresh_token: Option<String>,

    /// Mailbox targeted by the static Graph credentials (`me` or a UPN)
    #[arg(long, env = "MAILPEEK_GRAPH_USER", default_value = "me")]
    pub graph_user: String,
}

impl From<ConfigArgs> for AppConfig {
    fn from(args: ConfigArgs) -> Self {
        let static_graph = match (args.graph_client_id, args.graph_refresh_token) {
            (Some(client_id), Some(refresh_token))
                if !client_id.trim().is_empty() && !refresh_token.trim().is_empty() =>
            {
                Some(StaticGraphCredentials {
                    tenant_id: non_empty(args.graph_tenant_id)
                        .unwrap_or_else(|| "common".to_string()),
                    client_id,
                    client_secret: non_empty(args.graph_client_secret),
                    refresh_token,
                    user: args.graph_user,
                })
            }
            _ => None,
        };

        Self {
            tenant: args.tenant,
            token_url: non_empty(args.token_url),
            graph_api_base: args.graph_api_base.trim_end_matches('/').to_string(),
            imap_host: args.imap_host,
            imap_port: args.imap_port,
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            access_password: non_empty(args.password),
            limits: Limits {
                html_ceiling_bytes: args.max_html_bytes,
                raw_ceiling_bytes: args.max_raw_bytes,
                inline_image_ceiling_bytes: args.max_inline_image_bytes,
                raw_snippet_chars: RAW_SNIPPET_CHARS,
                lookup_snippet_chars: LOOKUP_SNIPPET_CHARS,
            },
            static_graph,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
