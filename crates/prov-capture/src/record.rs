//! Captured call records
//!
//! [`ObservedResponse`] is what the transport hands to a listener;
//! [`ApiCallRecord`] is what the stream keeps once a response has been
//! accepted as a data call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// HTTP status at or above which a call counts as failed
pub const FAILURE_STATUS: u16 = 400;

/// HTTP status the console answers with when the target already exists
pub const CONFLICT_STATUS: u16 = 409;

/// Kind of resource a response belongs to, as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Top-level page or frame navigation
    Document,
    /// Script asset
    Script,
    /// Stylesheet asset
    Stylesheet,
    /// Image asset
    Image,
    /// Font asset
    Font,
    /// Audio/video asset
    Media,
    /// XMLHttpRequest
    Xhr,
    /// `fetch()` request
    Fetch,
    /// Anything the transport could not classify
    #[default]
    Other,
}

impl ResourceKind {
    /// Whether this kind is a static page or asset load
    #[inline]
    #[must_use]
    pub fn is_asset(self) -> bool {
        matches!(
            self,
            Self::Document | Self::Script | Self::Stylesheet | Self::Image | Self::Font | Self::Media
        )
    }
}

/// A network response as delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedResponse {
    /// Request URL
    pub url: String,
    /// Request method
    pub method: String,
    /// Response status
    pub status: u16,
    /// Resource kind reported by the transport
    #[serde(default)]
    pub resource_kind: ResourceKind,
    /// Response body, when the transport could read it
    #[serde(default)]
    pub body: Option<String>,
}

impl ObservedResponse {
    /// Create new response with unknown resource kind and no body
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            status,
            resource_kind: ResourceKind::Other,
            body: None,
        }
    }

    /// With resource kind
    #[inline]
    #[must_use]
    pub fn with_kind(mut self, kind: ResourceKind) -> Self {
        self.resource_kind = kind;
        self
    }

    /// With body
    #[inline]
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Whether this response is a data call rather than a page or asset load
    ///
    /// XHR and fetch traffic always counts. Unclassified traffic counts when
    /// its path sits under an API prefix.
    #[must_use]
    pub fn is_data_call(&self) -> bool {
        match self.resource_kind {
            ResourceKind::Xhr | ResourceKind::Fetch => true,
            kind if kind.is_asset() => false,
            _ => url_path(&self.url).contains("/api/"),
        }
    }
}

fn url_path(url: &str) -> &str {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = without_scheme
        .find('/')
        .map_or("", |idx| &without_scheme[idx..]);
    path.split(['?', '#']).next().unwrap_or(path)
}

/// One captured data call
///
/// Never mutated after it has been appended to a [`CaptureStream`](crate::CaptureStream).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCallRecord {
    /// Request URL
    pub url: String,
    /// Request method
    pub method: String,
    /// Response status
    pub status: u16,
    /// Time the response was captured
    pub timestamp: DateTime<Utc>,
    /// Response body (best-effort)
    pub response_body: Option<String>,
}

impl ApiCallRecord {
    /// Build a record from an observed response, stamped now
    #[must_use]
    pub fn from_response(response: ObservedResponse) -> Self {
        Self {
            url: response.url,
            method: response.method,
            status: response.status,
            timestamp: Utc::now(),
            response_body: response.body,
        }
    }

    /// Status >= 400
    #[inline]
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status >= FAILURE_STATUS
    }

    /// Status == 409
    #[inline]
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.status == CONFLICT_STATUS
    }

    /// Whether the request URL contains `fragment`
    #[inline]
    #[must_use]
    pub fn targets(&self, fragment: &str) -> bool {
        self.url.contains(fragment)
    }
}

impl std::fmt::Display for ApiCallRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} -> {}", self.method, self.url, self.status)
    }
}
