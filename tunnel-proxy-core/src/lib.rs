//! Tunnel proxy - a reverse HTTP proxy following a moving upstream
//!
//! The upstream origin ("tunnel url") is published by a remote document and
//! changes over time. This library keeps track of it and forwards traffic to
//! whatever it currently is:
//! - `resolver`: fetches the tunnel url with bounded retries
//! - `target`: the shared, atomically swapped current upstream
//! - `sanitizer`: strips identifying headers and adds the marker header
//! - `service`: per-request dispatching, re-resolving the tunnel on failure
//! - `scheduler`: periodic background refresh of the tunnel url
//! - `server`: the HTTP listener
//! - `proxy`: startup wiring of all of the above
//! - `config`: configuration structures and loading
//! - `body`: idle-bounded upstream response bodies
//! - `client`: the shared outbound http/https client
//! - `error`: error types

pub mod body;
pub mod client;
pub mod config;
pub mod error;
pub mod proxy;
pub mod resolver;
pub mod sanitizer;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod target;
pub mod utils;
pub use hyper;

pub use config::ProxyConfig;
pub use error::{ForwardError, ProxyError, ResolveError, Result};
pub use proxy::TunnelProxy;
pub use resolver::{Resolver, TunnelSource};
pub use sanitizer::HeaderSanitizer;
pub use scheduler::{RefreshScheduler, SchedulerHandle};
pub use service::{Dispatcher, ProxyService};
pub use target::{TargetStore, UpstreamTarget};
