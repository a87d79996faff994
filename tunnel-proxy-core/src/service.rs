//! Request dispatching to the current tunnel.
//!
//! Every inbound request goes through the same steps: look up the current
//! target, rewrite the request for the upstream, forward it and sanitize the
//! answer. A forward failure re-resolves the tunnel before the caller gets a
//! 500; the failed request itself is never replayed. A response body that
//! fails or stalls once streaming has begun triggers the same re-resolution in
//! the background.

use std::{convert::Infallible, fmt, net::SocketAddr, pin::Pin, sync::Arc, time::Duration};

use http::{HeaderValue, Method, Request, Response, StatusCode, Uri, Version, header};
use http_body_util::{BodyExt as _, Full};
use hyper::{
    body::{Bytes, Incoming},
    service::Service as HyperService,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub use crate::client::ProxyBody;
use crate::{
    body::IdleTimeoutBody,
    client::{BoxError, HttpClient},
    error::ForwardError,
    resolver::Resolver,
    sanitizer::HeaderSanitizer,
    target::{TargetStore, UpstreamTarget},
    utils::join_upstream_uri,
};

pub const UNRESOLVED_BODY: &str = "Service unavailable: Cannot determine tunnel URL";
pub const PROXY_ERROR_BODY: &str =
    "Proxy error occurred. Refreshing tunnel, please try again shortly.";

/// Where a request is in its trip through the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    TargetResolved,
    Unresolved,
    Forwarded,
    Responded,
    Errored,
}

/// Per-request bookkeeping, dropped once the response is handed back.
#[derive(Debug)]
pub struct ProxyRequestContext {
    pub from: SocketAddr,
    pub method: Method,
    pub uri: Uri,
    pub target: Option<Arc<UpstreamTarget>>,
    pub state: RequestState,
}

impl ProxyRequestContext {
    fn new<B>(from: SocketAddr, request: &Request<B>) -> Self {
        Self {
            from,
            method: request.method().clone(),
            uri: request.uri().clone(),
            target: None,
            state: RequestState::Received,
        }
    }

    fn advance(&mut self, state: RequestState) {
        debug!(
            from = %self.from,
            method = %self.method,
            uri = %self.uri,
            "{:?} -> {:?}",
            self.state,
            state
        );
        self.state = state;
    }
}

/// Re-resolves the tunnel after a forwarding failure and swaps the store
/// when the address changed.
///
/// The work runs on its own task and keeps going when the request that
/// triggered it is dropped.
#[derive(Clone)]
pub struct TunnelRefresher {
    resolver: Arc<Resolver>,
    store: Arc<TargetStore>,
}

impl TunnelRefresher {
    pub fn new(resolver: Arc<Resolver>, store: Arc<TargetStore>) -> Self {
        Self { resolver, store }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Keeps the stale target when resolution fails.
    async fn run(self) {
        match self.resolver.resolve().await {
            Ok(target) => {
                let shown = target.to_string();
                if self.store.compare_and_swap_if_different(target) {
                    info!(tunnel = %shown, "Detected expired tunnel, updated tunnel url");
                } else {
                    debug!(tunnel = %shown, "Tunnel url unchanged after proxy error");
                }
            }
            Err(e) => error!(error = %e, "Failed to update tunnel url after proxy error"),
        }
    }
}

/// Forwards requests to the target held in a [`TargetStore`].
pub struct Dispatcher {
    store: Arc<TargetStore>,
    refresher: TunnelRefresher,
    sanitizer: HeaderSanitizer,
    client: HttpClient,
    forward_timeout: Duration,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("target", &self.store.get())
            .field("forward_timeout", &self.forward_timeout)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(
        store: Arc<TargetStore>,
        resolver: Arc<Resolver>,
        sanitizer: HeaderSanitizer,
        client: HttpClient,
        forward_timeout: Duration,
    ) -> Self {
        Self {
            refresher: TunnelRefresher::new(resolver, Arc::clone(&store)),
            store,
            sanitizer,
            client,
            forward_timeout,
        }
    }

    /// Handles one inbound request. Always produces a response.
    pub async fn dispatch(&self, from: SocketAddr, request: Request<ProxyBody>) -> Response<ProxyBody> {
        let mut ctx = ProxyRequestContext::new(from, &request);
        debug!("Processing request: {} {}", ctx.method, ctx.uri);

        let Some(target) = self.store.get() else {
            ctx.advance(RequestState::Unresolved);
            warn!("No tunnel url known yet, rejecting {} {}", ctx.method, ctx.uri);
            return text_response(StatusCode::SERVICE_UNAVAILABLE, UNRESOLVED_BODY);
        };
        ctx.target = Some(Arc::clone(&target));
        ctx.advance(RequestState::TargetResolved);

        match self.forward(&mut ctx, &target, request).await {
            Ok(response) => {
                ctx.advance(RequestState::Responded);
                response
            }
            Err(e) => {
                ctx.advance(RequestState::Errored);
                error!(tunnel = %target, error = %e, "Proxy error");
                if let Err(e) = self.refresher.clone().spawn().await {
                    error!("Tunnel refresh task failed: {}", e);
                }
                text_response(StatusCode::INTERNAL_SERVER_ERROR, PROXY_ERROR_BODY)
            }
        }
    }

    async fn forward(
        &self,
        ctx: &mut ProxyRequestContext,
        target: &UpstreamTarget,
        request: Request<ProxyBody>,
    ) -> Result<Response<ProxyBody>, ForwardError> {
        let (mut parts, body) = request.into_parts();

        parts.uri = join_upstream_uri(target.uri(), &parts.uri)?;
        parts.version = Version::HTTP_11;
        parts.headers.insert(
            header::HOST,
            HeaderValue::from_str(target.authority()).map_err(http::Error::from)?,
        );
        self.sanitizer.sanitize_outbound_request(&mut parts.headers);
        debug!(upstream = %parts.uri, "Removed specified headers, forwarding");

        ctx.advance(RequestState::Forwarded);
        let request = Request::from_parts(parts, body);
        let response = tokio::time::timeout(self.forward_timeout, self.client.request(request))
            .await
            .map_err(|_| ForwardError::Timeout(self.forward_timeout))??;

        let (mut parts, body) = response.into_parts();
        self.sanitizer.sanitize_inbound_response(&mut parts.headers);
        debug!(status = %parts.status, "Received upstream response");

        let body = IdleTimeoutBody::new(body, self.forward_timeout)
            .refresh_on_error(self.refresher.clone());
        Ok(Response::from_parts(parts, body.boxed()))
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<ProxyBody> {
    let mut response = Response::new(
        Full::new(Bytes::from_static(body.as_bytes()))
            .map_err(|never| match never {})
            .boxed(),
    );
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Per-connection hyper service wrapping a shared [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct ProxyService {
    dispatcher: Arc<Dispatcher>,
    /// Peer address of the connection this service is bound to
    pub from: SocketAddr,
}

impl ProxyService {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            from: SocketAddr::from(([0, 0, 0, 0], 0)),
        }
    }
}

impl HyperService<Request<Incoming>> for ProxyService {
    type Response = Response<ProxyBody>;

    type Error = Infallible;

    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let dispatcher = Arc::clone(&self.dispatcher);
        let from = self.from;
        Box::pin(async move { Ok(dispatcher.dispatch(from, req.map(|body| body.map_err(BoxError::from).boxed())).await) })
    }
}
