use std::{fs, net::SocketAddr, path::Path, time::Duration};

use http::Uri;
use serde::{Deserialize, Serialize};

use crate::error::{ProxyError, Result};

/// Header injected into every forwarded request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MarkerHeader {
    pub name: String,
    pub value: String,
}

impl Default for MarkerHeader {
    fn default() -> Self {
        Self {
            name: "X-Pinggy-No-Screen".to_string(),
            value: "true".to_string(),
        }
    }
}

/// Proxy configuration, read from YAML. Missing keys fall back to defaults.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Address the proxy listens on
    pub listen: SocketAddr,
    /// Document holding the current tunnel url
    pub source_url: String,
    /// JSON field of the document carrying the address
    pub tunnel_field: String,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub fetch_timeout_secs: u64,
    pub forward_timeout_secs: u64,
    pub refresh_interval_secs: u64,
    /// Headers never passed across the proxy, matched case-insensitively
    pub deny_headers: Vec<String>,
    pub marker_header: MarkerHeader,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 3000)),
            source_url: "https://raw.githubusercontent.com/NitinBot001/Audio-url-new-js/refs/heads/main/instance.json".to_string(),
            tunnel_field: "tunnel_url".to_string(),
            max_attempts: 5,
            retry_delay_secs: 3,
            fetch_timeout_secs: 10,
            forward_timeout_secs: 30,
            refresh_interval_secs: 5 * 60,
            deny_headers: [
                "User-Agent",
                "Upgrade-Insecure-Requests",
                "sec-ch-ua",
                "sec-ch-ua-mobile",
                "sec-ch-ua-platform",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            marker_header: MarkerHeader::default(),
        }
    }
}

impl ProxyConfig {
    /// Loads and validates a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| ProxyError::config(format!("cannot parse yaml: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks scalar settings. Header names and values are checked when the
    /// [`HeaderSanitizer`](crate::sanitizer::HeaderSanitizer) is built.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ProxyError::config("max_attempts must be at least 1"));
        }
        if self.refresh_interval_secs == 0 {
            return Err(ProxyError::config("refresh_interval_secs must be positive"));
        }
        if self.fetch_timeout_secs == 0 || self.forward_timeout_secs == 0 {
            return Err(ProxyError::config("timeouts must be positive"));
        }
        if self.tunnel_field.is_empty() {
            return Err(ProxyError::config("tunnel_field must not be empty"));
        }

        let uri = self
            .source_url
            .parse::<Uri>()
            .map_err(|e| ProxyError::config(format!("source_url {:?}: {e}", self.source_url)))?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(ProxyError::config(format!(
                "source_url {:?} must be absolute",
                self.source_url
            )));
        }

        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}
