use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tracing::warn;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body type used on both sides of the proxy.
pub type ProxyBody = BoxBody<Bytes, BoxError>;

/// Outbound client shared by the resolution fetch and request forwarding.
pub type HttpClient = Client<HttpsConnector<HttpConnector>, ProxyBody>;

/// Builds an http/https client trusting the platform root certificates.
///
/// When no native roots can be loaded the client still works for plain http
/// upstreams, and https handshakes fail as transport errors.
pub fn build_client() -> HttpClient {
    let builder = match HttpsConnectorBuilder::new().with_native_roots() {
        Ok(builder) => builder,
        Err(e) => {
            warn!("Cannot load native root certificates, https upstreams will fail: {}", e);
            HttpsConnectorBuilder::new().with_tls_config(
                rustls::ClientConfig::builder()
                    .with_root_certificates(rustls::RootCertStore::empty())
                    .with_no_client_auth(),
            )
        }
    };
    let connector = builder.https_or_http().enable_http1().build();

    Client::builder(TokioExecutor::new()).build(connector)
}
