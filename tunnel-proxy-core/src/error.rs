//! Error types shared across the proxy components.
//!
//! Every failure is contained at the component that produced it: resolution
//! errors end up in logs or a 5xx reply, forward errors trigger re-resolution.
//! Only configuration errors and a failed startup resolution are allowed to
//! stop the process.

use thiserror::Error;

/// Failure of a single resolution attempt, or of the whole attempt budget.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    /// The resolution source could not be reached, timed out or replied
    /// with a non-success status.
    #[error("transport error: {0}")]
    Transport(String),

    /// The source replied but the document did not carry a usable address.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Every attempt failed.
    #[error("tunnel resolution exhausted after {attempts} attempts, last error: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<ResolveError>,
    },
}

impl ResolveError {
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport(reason.into())
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }
}

/// Failure while streaming a request to the current upstream.
#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("upstream transport error: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("upstream did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("upstream body sent nothing for {0:?}")]
    BodyIdle(std::time::Duration),

    #[error("cannot build upstream uri: {0}")]
    InvalidUri(#[from] http::Error),
}

/// Crate level error.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot determine initial tunnel url: {0}")]
    Resolve(#[from] ResolveError),
}

impl ProxyError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
