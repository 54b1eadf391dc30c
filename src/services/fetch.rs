//! Source-image fetching.
//!
//! Ingestion pulls bytes from arbitrary externally hosted URLs. The
//! fetcher is a trait so tests can stand in an in-memory host; the
//! production implementation is a reqwest client with a bounded
//! per-request timeout and an optional injected [`TokenProvider`] for
//! upstream hosts that require bearer auth.

use crate::services::{PipelineError, PipelineResult};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::{sync::Arc, time::Duration as StdDuration};
use tokio::sync::Mutex;
use tracing::debug;

/// Downloader for externally hosted source images.
#[async_trait]
pub trait SourceFetch: Send + Sync {
    /// Fetch the full body at `url`. Timeouts and non-success statuses are
    /// reported as `PipelineError::Fetch`.
    async fn fetch_bytes(&self, url: &str) -> PipelineResult<Bytes>;
}

/// A bearer token with its expiry, as issued by the upstream auth endpoint.
#[derive(Clone, Debug)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues fresh tokens; implemented against the upstream auth endpoint in
/// production and trivially in tests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn issue(&self) -> PipelineResult<IssuedToken>;
}

/// Caching token holder injected into the fetcher.
///
/// Refreshes through its `TokenSource` whenever the cached token is absent
/// or within `skew` of expiry, so a token never gets used in the window
/// where it could expire mid-request.
pub struct TokenProvider {
    source: Arc<dyn TokenSource>,
    cached: Mutex<Option<IssuedToken>>,
    skew: Duration,
}

impl TokenProvider {
    pub fn new(source: Arc<dyn TokenSource>, skew: Duration) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
            skew,
        }
    }

    pub async fn get_token(&self) -> PipelineResult<String> {
        let mut cached = self.cached.lock().await;
        let fresh_until = Utc::now() + self.skew;
        if let Some(issued) = cached.as_ref() {
            if issued.expires_at > fresh_until {
                return Ok(issued.token.clone());
            }
        }
        debug!("refreshing upstream access token");
        let issued = self.source.issue().await?;
        let token = issued.token.clone();
        *cached = Some(issued);
        Ok(token)
    }
}

/// reqwest-backed fetcher used in production.
#[derive(Clone)]
pub struct HttpSourceFetcher {
    http: reqwest::Client,
    tokens: Option<Arc<TokenProvider>>,
}

impl HttpSourceFetcher {
    pub fn new(timeout: StdDuration, tokens: Option<Arc<TokenProvider>>) -> PipelineResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| PipelineError::Fetch {
                url: String::new(),
                reason: format!("building http client: {}", err),
            })?;
        Ok(Self { http, tokens })
    }
}

#[async_trait]
impl SourceFetch for HttpSourceFetcher {
    async fn fetch_bytes(&self, url: &str) -> PipelineResult<Bytes> {
        let fetch_err = |reason: String| PipelineError::Fetch {
            url: url.to_string(),
            reason,
        };

        let mut request = self.http.get(url);
        if let Some(tokens) = &self.tokens {
            request = request.bearer_auth(tokens.get_token().await?);
        }

        let response = request
            .send()
            .await
            .map_err(|err| fetch_err(err.to_string()))?;
        if !response.status().is_success() {
            return Err(fetch_err(format!("status {}", response.status())));
        }
        response
            .bytes()
            .await
            .map_err(|err| fetch_err(err.to_string()))
    }
}

/// One image reference as supplied by a collaborator or decoded from an
/// upstream payload.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct SourceImage {
    pub url: String,
    #[serde(default, alias = "label")]
    pub source_label: Option<String>,
}

// The upstream media API has shipped three response shapes over the years.
// Decode by trying each in fixed priority order; the first structural
// match wins and total failure is its own error case.
#[derive(Deserialize)]
struct WrappedImages {
    images: Vec<SourceImageEntry>,
}

#[derive(Deserialize)]
struct DataWrappedImages {
    data: WrappedImages,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SourceImageEntry {
    Full(SourceImage),
    BareUrl(String),
}

impl From<SourceImageEntry> for SourceImage {
    fn from(entry: SourceImageEntry) -> Self {
        match entry {
            SourceImageEntry::Full(image) => image,
            SourceImageEntry::BareUrl(url) => SourceImage {
                url,
                source_label: None,
            },
        }
    }
}

/// Decode an upstream image-list payload.
///
/// Tries `{"images": [...]}`, then `{"data": {"images": [...]}}`, then a
/// bare array. Returns `UnparseableResponse` when nothing matches.
pub fn decode_image_list(value: &serde_json::Value) -> PipelineResult<Vec<SourceImage>> {
    if let Ok(wrapped) = serde_json::from_value::<WrappedImages>(value.clone()) {
        return Ok(wrapped.images.into_iter().map(Into::into).collect());
    }
    if let Ok(wrapped) = serde_json::from_value::<DataWrappedImages>(value.clone()) {
        return Ok(wrapped.data.images.into_iter().map(Into::into).collect());
    }
    if let Ok(entries) = serde_json::from_value::<Vec<SourceImageEntry>>(value.clone()) {
        return Ok(entries.into_iter().map(Into::into).collect());
    }
    Err(PipelineError::UnparseableResponse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn decodes_each_known_shape_in_order() {
        let wrapped = json!({"images": [{"url": "https://a/1.jpg", "label": "pool"}]});
        let images = decode_image_list(&wrapped).unwrap();
        assert_eq!(images[0].url, "https://a/1.jpg");
        assert_eq!(images[0].source_label.as_deref(), Some("pool"));

        let data_wrapped = json!({"data": {"images": ["https://a/2.jpg"]}});
        let images = decode_image_list(&data_wrapped).unwrap();
        assert_eq!(images[0].url, "https://a/2.jpg");
        assert_eq!(images[0].source_label, None);

        let bare = json!([{"url": "https://a/3.jpg"}]);
        assert_eq!(decode_image_list(&bare).unwrap().len(), 1);
    }

    #[test]
    fn unknown_shape_is_a_distinct_error() {
        let err = decode_image_list(&json!({"pictures": []})).unwrap_err();
        assert!(matches!(err, PipelineError::UnparseableResponse));
    }

    struct CountingSource {
        issued: AtomicUsize,
        ttl: Duration,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn issue(&self) -> PipelineResult<IssuedToken> {
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(IssuedToken {
                token: format!("tok-{}", n),
                expires_at: Utc::now() + self.ttl,
            })
        }
    }

    #[tokio::test]
    async fn token_provider_caches_until_skew_window() {
        let source = Arc::new(CountingSource {
            issued: AtomicUsize::new(0),
            ttl: Duration::hours(1),
        });
        let provider = TokenProvider::new(source.clone(), Duration::minutes(5));

        assert_eq!(provider.get_token().await.unwrap(), "tok-1");
        // Still fresh, no second issue.
        assert_eq!(provider.get_token().await.unwrap(), "tok-1");
        assert_eq!(source.issued.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn token_provider_refreshes_inside_skew_window() {
        let source = Arc::new(CountingSource {
            issued: AtomicUsize::new(0),
            ttl: Duration::minutes(2),
        });
        // Skew larger than the ttl: every call lands inside the window.
        let provider = TokenProvider::new(source.clone(), Duration::minutes(5));

        assert_eq!(provider.get_token().await.unwrap(), "tok-1");
        assert_eq!(provider.get_token().await.unwrap(), "tok-2");
        assert_eq!(source.issued.load(Ordering::SeqCst), 2);
    }
}
