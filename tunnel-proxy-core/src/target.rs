//! The current upstream address and the store that holds it.

use std::{fmt, str::FromStr, sync::Arc};

use arc_swap::ArcSwapOption;
use http::Uri;

use crate::error::ResolveError;

/// Absolute `http`/`https` address of the upstream origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget(Uri);

impl UpstreamTarget {
    pub fn uri(&self) -> &Uri {
        &self.0
    }

    /// `host[:port]` of the upstream, used as the forwarded `Host` header.
    pub fn authority(&self) -> &str {
        // Construction guarantees an authority.
        self.0.authority().map(|a| a.as_str()).unwrap_or_default()
    }
}

impl FromStr for UpstreamTarget {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ResolveError::malformed("empty tunnel address"));
        }
        let uri = trimmed
            .parse::<Uri>()
            .map_err(|e| ResolveError::malformed(format!("invalid tunnel address {trimmed:?}: {e}")))?;
        let Some(authority) = uri.authority() else {
            return Err(ResolveError::malformed(format!(
                "tunnel address {trimmed:?} is not an absolute http(s) url"
            )));
        };
        // The authority is sent verbatim as the Host header.
        if authority.as_str().contains('@') {
            return Err(ResolveError::malformed(format!(
                "tunnel address {trimmed:?} must not carry user info"
            )));
        }
        match uri.scheme_str() {
            Some("http") | Some("https") => Ok(Self(uri)),
            _ => Err(ResolveError::malformed(format!(
                "tunnel address {trimmed:?} is not an absolute http(s) url"
            ))),
        }
    }
}

impl fmt::Display for UpstreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-wide holder of the current [`UpstreamTarget`].
///
/// Reads are lock-free and never wait on network activity. Writers replace
/// the whole value atomically, so a reader sees either the old or the new
/// target. Concurrent writers are last-write-wins.
#[derive(Debug, Default)]
pub struct TargetStore {
    current: ArcSwapOption<UpstreamTarget>,
}

impl TargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(target: UpstreamTarget) -> Self {
        Self {
            current: ArcSwapOption::from_pointee(target),
        }
    }

    /// Last stored target, `None` until the first successful resolution.
    pub fn get(&self) -> Option<Arc<UpstreamTarget>> {
        self.current.load_full()
    }

    pub fn set(&self, target: UpstreamTarget) {
        self.current.store(Some(Arc::new(target)));
    }

    /// Stores `target` only when it differs from the current value.
    ///
    /// Returns `true` when the store was updated.
    pub fn compare_and_swap_if_different(&self, target: UpstreamTarget) -> bool {
        if self.current.load().as_deref() == Some(&target) {
            return false;
        }

        let target = Arc::new(target);
        let mut changed = false;
        self.current.rcu(|current| {
            changed = current.as_deref() != Some(&*target);
            if changed {
                Some(Arc::clone(&target))
            } else {
                current.clone()
            }
        });
        changed
    }
}
