//! Header rewriting that hides the proxy from both ends.
//!
//! The rule set is fixed when the sanitizer is built. Header names are kept as
//! [`HeaderName`]s, which `http` stores lowercased, so removal matches any
//! casing the client or upstream used, and `HeaderMap::remove` drops every
//! duplicate of a name at once.

use http::{HeaderMap, HeaderName, HeaderValue};
use tracing::trace;

use crate::{
    config::ProxyConfig,
    error::{ProxyError, Result},
};

/// What a [`HeaderRule`] does with its header.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderAction {
    StripFromRequest,
    StripFromResponse,
    InjectIntoRequest(HeaderValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderRule {
    pub name: HeaderName,
    pub action: HeaderAction,
}

/// Applies the configured [`HeaderRule`]s to outbound requests and inbound
/// responses.
#[derive(Debug, Clone)]
pub struct HeaderSanitizer {
    rules: Vec<HeaderRule>,
}

impl HeaderSanitizer {
    /// Builds the rule set: every deny-listed name is stripped in both
    /// directions, then the marker header is injected into requests.
    pub fn new<I, S>(deny_list: I, marker_name: &str, marker_value: &str) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules = Vec::new();
        for name in deny_list {
            let name = parse_name(name.as_ref())?;
            rules.push(HeaderRule {
                name: name.clone(),
                action: HeaderAction::StripFromRequest,
            });
            rules.push(HeaderRule {
                name,
                action: HeaderAction::StripFromResponse,
            });
        }

        let value = HeaderValue::from_str(marker_value).map_err(|_| {
            ProxyError::config(format!("invalid marker header value {marker_value:?}"))
        })?;
        rules.push(HeaderRule {
            name: parse_name(marker_name)?,
            action: HeaderAction::InjectIntoRequest(value),
        });

        Ok(Self { rules })
    }

    pub fn from_config(config: &ProxyConfig) -> Result<Self> {
        Self::new(
            &config.deny_headers,
            &config.marker_header.name,
            &config.marker_header.value,
        )
    }

    pub fn rules(&self) -> &[HeaderRule] {
        &self.rules
    }

    /// Strips deny-listed headers, then sets the marker header, replacing any
    /// value the client may have sent under the same name.
    pub fn sanitize_outbound_request(&self, headers: &mut HeaderMap) {
        for rule in &self.rules {
            if rule.action == HeaderAction::StripFromRequest && headers.remove(&rule.name).is_some() {
                trace!(header = %rule.name, "Stripped request header");
            }
        }
        for rule in &self.rules {
            if let HeaderAction::InjectIntoRequest(value) = &rule.action {
                headers.insert(rule.name.clone(), value.clone());
            }
        }
    }

    /// Strips deny-listed headers from an upstream response.
    pub fn sanitize_inbound_response(&self, headers: &mut HeaderMap) {
        for rule in &self.rules {
            if rule.action == HeaderAction::StripFromResponse && headers.remove(&rule.name).is_some() {
                trace!(header = %rule.name, "Stripped response header");
            }
        }
    }
}

fn parse_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ProxyError::config(format!("invalid header name {name:?}")))
}
