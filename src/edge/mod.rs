//! Viewer-request filter that runs before a request reaches the application.
//!
//! A request passes when the viewer country is on the (usually empty) country
//! list or when the client address falls inside one of the configured IPv4
//! CIDR ranges. Everything else gets a static 403 page that echoes the
//! rejected address so operators can add it to the list.
//!
//! Malformed client addresses are evaluated as `0.0.0.0`.

pub mod cidr;
pub mod gate;

pub use cidr::{ip_in_cidr, ip_to_number, is_ip_allowed, AllowEntry, AllowListError};

use serde::Serialize;
use std::{collections::BTreeMap, net::Ipv4Addr};
use tracing::{debug, info};

/// Header set by the CDN with the viewer's ISO country code.
pub const VIEWER_COUNTRY_HEADER: &str = "cloudfront-viewer-country";

/// Office network allowed when nothing else is configured.
pub const DEFAULT_ALLOW_LIST: &[AllowEntry] = &[AllowEntry {
    ip: Ipv4Addr::new(210, 128, 54, 64),
    prefix: 27,
}];

/// Immutable access policy, built once from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgePolicy {
    pub allow_list: Vec<AllowEntry>,
    pub allowed_countries: Vec<String>,
}

impl Default for EdgePolicy {
    fn default() -> Self {
        Self {
            allow_list: DEFAULT_ALLOW_LIST.to_vec(),
            allowed_countries: Vec::new(),
        }
    }
}

impl EdgePolicy {
    #[must_use]
    pub fn new(allow_list: Vec<AllowEntry>, allowed_countries: Vec<String>) -> Self {
        Self {
            allow_list,
            allowed_countries: allowed_countries
                .into_iter()
                .map(|country| country.trim().to_ascii_uppercase())
                .filter(|country| !country.is_empty())
                .collect(),
        }
    }

    fn country_allowed(&self, country: Option<&str>) -> bool {
        country.is_some_and(|country| {
            self.allowed_countries
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(country.trim()))
        })
    }
}

/// The parts of an incoming request the filter looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewerRequest {
    pub client_ip: String,
    pub uri: String,
    /// Lower-cased header names.
    pub headers: BTreeMap<String, String>,
}

impl ViewerRequest {
    #[must_use]
    pub fn new(client_ip: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            client_ip: client_ip.into(),
            uri: uri.into(),
            headers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    fn country(&self) -> Option<&str> {
        self.headers.get(VIEWER_COUNTRY_HEADER).map(String::as_str)
    }
}

/// Response returned instead of the request when access is denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeResponse {
    pub status_code: u16,
    pub status_description: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeDecision {
    Pass(ViewerRequest),
    Reject(EdgeResponse),
}

impl EdgeDecision {
    #[must_use]
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass(_))
    }
}

/// Evaluate a viewer request against the policy.
#[must_use]
pub fn evaluate(request: ViewerRequest, policy: &EdgePolicy) -> EdgeDecision {
    if policy.country_allowed(request.country()) {
        debug!(client_ip = %request.client_ip, country = ?request.country(), "access allowed by country");
        return EdgeDecision::Pass(request);
    }

    if is_ip_allowed(&request.client_ip, &policy.allow_list) {
        debug!(client_ip = %request.client_ip, "access allowed by allow-list");
        return EdgeDecision::Pass(request);
    }

    info!(
        client_ip = %request.client_ip,
        country = request.country().unwrap_or(""),
        uri = %request.uri,
        "access denied"
    );

    EdgeDecision::Reject(forbidden(&request.client_ip))
}

/// Static 403 page echoing the rejected address.
#[must_use]
pub fn forbidden(client_ip: &str) -> EdgeResponse {
    let mut headers = BTreeMap::new();
    headers.insert(
        "content-type".to_string(),
        "text/html; charset=utf-8".to_string(),
    );

    EdgeResponse {
        status_code: 403,
        status_description: "Forbidden".to_string(),
        headers,
        body: format!("{FORBIDDEN_HEAD}{}{FORBIDDEN_TAIL}", escape_html(client_ip)),
    }
}

const FORBIDDEN_HEAD: &str = concat!(
    r#"<!DOCTYPE html><html><head><meta charset="utf-8"><title>アクセス拒否</title>"#,
    "<style>body{font-family:Arial,sans-serif;text-align:center;padding:50px;background-color:#f5f5f5}",
    ".error-container{background:white;padding:40px;border-radius:8px;box-shadow:0 2px 4px rgba(0,0,0,0.1);max-width:600px;margin:0 auto}",
    "h1{color:#d32f2f;margin-bottom:20px}p{color:#666;line-height:1.6}</style></head>",
    r#"<body><div class="error-container"><h1>アクセスが拒否されました</h1>"#,
    "<p>このサイトは許可されたIPアドレスからのみアクセス可能です。</p>",
    "<p>This site is only accessible from authorized IP addresses.</p>",
    r#"<p style="margin-top:20px;font-size:12px;color:#999">Your IP: "#,
);

const FORBIDDEN_TAIL: &str = "</p></div></body></html>";

// The address comes from the connection or a CDN header; never trust it as markup.
fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
