use std::future::Future;

use reqwest::{header::ACCEPT, Client};
use thiserror::Error;
use tracing::warn;
use url::Url;

pub mod cache;

pub use cache::{FeedCache, Snapshot, SnapshotView};

/// Upstream integration failures, each distinguishable before any
/// matching happens. Caller input problems are not feed errors; they
/// surface as missing-field outcomes in the resolver.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("classroom feed unreachable ({detail})")]
    Unreachable { status: Option<u16>, detail: String },

    #[error(
        "feed returned a login/permission page instead of CSV data; \
         share the sheet as 'anyone with the link' in viewer mode"
    )]
    LoginPage { snippet: String },

    #[error("feed parsed to zero rows")]
    Empty,

    #[error("feed schema too narrow: widest row has {width} columns, expected at least {min}")]
    SchemaTooNarrow { width: usize, min: usize },
}

impl FeedError {
    /// Short diagnostic for the response `debug` field, enough for an
    /// operator to spot a misconfigured or unshared upstream sheet
    /// without server access.
    pub fn debug_token(&self) -> String {
        match self {
            FeedError::Unreachable { status: Some(code), .. } => format!("http={}", code),
            FeedError::Unreachable { status: None, .. } => "transport".to_string(),
            FeedError::LoginPage { snippet } => format!("html_in_response: {}", snippet),
            FeedError::Empty => "empty_csv".to_string(),
            FeedError::SchemaTooNarrow { width, .. } => format!("cols={}", width),
        }
    }
}

/// Where the raw feed body comes from. The cache is generic over this
/// so tests can script bodies without a network.
pub trait FeedSource: Send + Sync {
    /// Fetch the raw feed text. Transport and HTTP-status failures map
    /// to [`FeedError::Unreachable`]; body validation happens in the
    /// cache layer so every source is validated the same way.
    fn fetch(&self) -> impl Future<Output = Result<String, FeedError>> + Send;
}

/// The real thing: a plain GET against the published CSV export.
pub struct HttpFeedSource {
    client: Client,
    url: Url,
}

impl HttpFeedSource {
    pub fn new(client: Client, url: Url) -> Self {
        Self { client, url }
    }
}

impl FeedSource for HttpFeedSource {
    fn fetch(&self) -> impl Future<Output = Result<String, FeedError>> + Send {
        async move {
            let response = self
                .client
                .get(self.url.clone())
                // The publisher sometimes answers HTML unless CSV is
                // explicitly first in line.
                .header(ACCEPT, "text/csv,text/plain,*/*")
                .send()
                .await
                .map_err(|err| FeedError::Unreachable {
                    status: err.status().map(|s| s.as_u16()),
                    detail: err.to_string(),
                })?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|err| FeedError::Unreachable {
                    status: Some(status.as_u16()),
                    detail: err.to_string(),
                })?;

            if !status.is_success() {
                warn!(%status, "feed fetch returned non-success status");
                return Err(FeedError::Unreachable {
                    status: Some(status.as_u16()),
                    detail: format!("HTTP {}", status),
                });
            }
            Ok(body)
        }
    }
}
