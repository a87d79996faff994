//! Tunnel url resolution.
//!
//! A [`Resolver`] asks a [`TunnelSource`] for a JSON document, pulls the
//! address out of a named field and retries with a fixed delay until it gets
//! one or runs out of attempts. Calls share no state, so the request path and
//! the refresh scheduler can resolve at the same time.

use std::{pin::Pin, sync::Arc, time::Duration};

use http::{Request, Uri};
use http_body_util::{BodyExt as _, Empty, Limited};
use hyper::body::Bytes;
use tracing::{debug, info, warn};

use crate::{
    client::HttpClient,
    config::ProxyConfig,
    error::{ProxyError, ResolveError},
    target::UpstreamTarget,
};

/// Largest tunnel document accepted from the source.
pub const MAX_DOCUMENT_BYTES: usize = 64 * 1024;

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Bytes, ResolveError>> + Send + 'a>>;

/// Remote endpoint publishing the current tunnel document.
pub trait TunnelSource: Send + Sync {
    /// Fetches the raw document once.
    fn fetch(&self) -> FetchFuture<'_>;
}

/// Fetches the tunnel document with a single http(s) GET.
pub struct HttpTunnelSource {
    client: HttpClient,
    url: Uri,
    timeout: Duration,
}

impl HttpTunnelSource {
    pub fn new(client: HttpClient, url: Uri, timeout: Duration) -> Self {
        Self {
            client,
            url,
            timeout,
        }
    }

    async fn fetch_inner(&self) -> Result<Bytes, ResolveError> {
        let request = Request::get(self.url.clone())
            .body(Empty::<Bytes>::new().map_err(|never| match never {}).boxed())
            .map_err(|e| ResolveError::transport(format!("cannot build request: {e}")))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| ResolveError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::transport(format!(
                "{} answered with status {}",
                self.url, status
            )));
        }

        let body = Limited::new(response.into_body(), MAX_DOCUMENT_BYTES)
            .collect()
            .await
            .map_err(|e| ResolveError::transport(format!("cannot read body: {e}")))?;
        Ok(body.to_bytes())
    }
}

impl TunnelSource for HttpTunnelSource {
    fn fetch(&self) -> FetchFuture<'_> {
        Box::pin(async move {
            match tokio::time::timeout(self.timeout, self.fetch_inner()).await {
                Ok(result) => result,
                Err(_) => Err(ResolveError::transport(format!(
                    "no answer from {} within {:?}",
                    self.url, self.timeout
                ))),
            }
        })
    }
}

/// Outcome of one fetch-and-parse try.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success(UpstreamTarget),
    Failed(ResolveError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionAttempt {
    /// 1-based
    pub attempt: u32,
    pub outcome: AttemptOutcome,
}

/// Resolves the current [`UpstreamTarget`] with bounded retries.
pub struct Resolver {
    source: Arc<dyn TunnelSource>,
    field: String,
    max_attempts: u32,
    retry_delay: Duration,
}

impl Resolver {
    pub fn new(
        source: Arc<dyn TunnelSource>,
        field: impl Into<String>,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            source,
            field: field.into(),
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    /// Builds a resolver fetching `config.source_url` through `client`.
    pub fn from_config(config: &ProxyConfig, client: HttpClient) -> crate::error::Result<Self> {
        let url = config
            .source_url
            .parse::<Uri>()
            .map_err(|e| ProxyError::config(format!("source_url: {e}")))?;
        let source = HttpTunnelSource::new(client, url, config.fetch_timeout());
        Ok(Self::new(
            Arc::new(source),
            config.tunnel_field.clone(),
            config.max_attempts,
            config.retry_delay(),
        ))
    }

    /// Tries up to `max_attempts` times and returns the first address found.
    ///
    /// Attempts are separated by `retry_delay`; there is no wait before the
    /// first one or after the last one.
    pub async fn resolve(&self) -> Result<UpstreamTarget, ResolveError> {
        let mut last = None;

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.retry_delay).await;
            }

            let ResolutionAttempt { outcome, .. } = self.attempt(attempt).await;
            match outcome {
                AttemptOutcome::Success(target) => {
                    info!(attempt, tunnel = %target, "Fetched tunnel url");
                    return Ok(target);
                }
                AttemptOutcome::Failed(e) => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Tunnel url fetch failed"
                    );
                    last = Some(e);
                }
            }
        }

        Err(ResolveError::Exhausted {
            attempts: self.max_attempts,
            last: Box::new(
                last.unwrap_or_else(|| ResolveError::transport("no attempt was made")),
            ),
        })
    }

    async fn attempt(&self, attempt: u32) -> ResolutionAttempt {
        debug!(attempt, "Fetching tunnel document");
        let outcome = match self.source.fetch().await {
            Ok(body) => match extract_target(&body, &self.field) {
                Ok(target) => AttemptOutcome::Success(target),
                Err(e) => AttemptOutcome::Failed(e),
            },
            Err(e) => AttemptOutcome::Failed(e),
        };
        ResolutionAttempt { attempt, outcome }
    }
}

/// Reads the address held in `field` of a JSON document.
pub fn extract_target(body: &[u8], field: &str) -> Result<UpstreamTarget, ResolveError> {
    let document = serde_json::from_slice::<serde_json::Value>(body)
        .map_err(|e| ResolveError::malformed(format!("document is not json: {e}")))?;

    let address = document
        .get(field)
        .and_then(|value| value.as_str())
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ResolveError::malformed(format!("{field} not found in document")))?;

    address.parse()
}
