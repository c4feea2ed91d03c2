//! CAS server and client settings.
//!
//! Read-only to the engine. The web layer extracts a [`ServerConfig`] from
//! Rocket's figment under the `cas` key, e.g. in `Rocket.toml`:
//!
//! ```toml
//! [default.cas]
//! version = "2.0"
//! hostname = "cas.example.edu"
//! path = "/cas"
//! service_url = "https://app.example.edu/casservice"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{CasError, Result};
use crate::proxy_chain::AllowedChains;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum ProtocolVersion {
    #[serde(rename = "1.0")]
    V1,
    #[default]
    #[serde(rename = "2.0")]
    V2,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub version: ProtocolVersion,
    pub hostname: String,
    pub port: Option<u16>,
    pub path: String,
    /// PEM bundle used to verify the CAS server. When unset, certificate
    /// verification is disabled.
    pub ca_cert: Option<PathBuf>,
    /// Absolute URL CAS redirects back to with a ticket.
    pub service_url: String,
    pub timeout_secs: u64,
    /// Where CAS should send the browser after logout.
    pub logout_destination: Option<String>,
    /// How long a login is remembered for single logout and proxying.
    pub session_ttl_secs: u64,
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Ask CAS for a proxy-granting ticket on every validation.
    pub initialize: bool,
    /// Accept proxy tickets, validating them against `chains`.
    pub can_be_proxied: bool,
    /// One allowed chain per line, one token per hop.
    pub chains: String,
    /// Absolute URL of the proxy callback endpoint.
    pub callback_url: Option<String>,
    pub pgt_wait_ms: u64,
    pub pgt_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: ProtocolVersion::default(),
            hostname: String::new(),
            port: None,
            path: String::new(),
            ca_cert: None,
            service_url: String::new(),
            timeout_secs: 10,
            logout_destination: None,
            session_ttl_secs: 8 * 3600,
            proxy: ProxyConfig::default(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            initialize: false,
            can_be_proxied: false,
            chains: String::new(),
            callback_url: None,
            pgt_wait_ms: 2000,
            pgt_ttl_secs: 300,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn new(hostname: impl Into<String>, service_url: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            service_url: service_url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn with_ca_cert(mut self, ca_cert: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(ca_cert.into());
        self
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = proxy;
        self
    }

    #[must_use]
    pub fn with_logout_destination(mut self, destination: impl Into<String>) -> Self {
        self.logout_destination = Some(destination.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl_secs = ttl.as_secs();
        self
    }

    pub fn verifies_tls(&self) -> bool {
        self.ca_cert.is_some()
    }

    /// `proxyValidate` is only used when other services may proxy to us.
    pub fn accepts_proxies(&self) -> bool {
        self.version == ProtocolVersion::V2 && self.proxy.can_be_proxied
    }

    /// Proxy mode needs the 2.0 protocol; a 1.0 server never issues PGTs.
    pub fn initializes_proxy(&self) -> bool {
        self.version == ProtocolVersion::V2 && self.proxy.initialize
    }

    /// Checks everything the engine needs before it can talk to CAS.
    pub fn validate(&self) -> Result<()> {
        if self.hostname.trim().is_empty() {
            return Err(CasError::Configuration("CAS server hostname is not set".into()));
        }
        Url::parse(&self.service_url)
            .map_err(|e| CasError::Configuration(format!("invalid service_url {:?}: {e}", self.service_url)))?;

        if self.initializes_proxy() {
            let callback = self.proxy.callback_url.as_deref().ok_or_else(|| {
                CasError::Configuration("proxy.initialize is set but proxy.callback_url is missing".into())
            })?;
            let url = Url::parse(callback)
                .map_err(|e| CasError::Configuration(format!("invalid proxy.callback_url {callback:?}: {e}")))?;
            if url.scheme() != "https" {
                return Err(CasError::Configuration("proxy.callback_url must use https".into()));
            }
        }

        if self.accepts_proxies() {
            AllowedChains::parse(&self.proxy.chains)?;
        }
        Ok(())
    }
}

impl ProxyConfig {
    pub fn pgt_wait(&self) -> Duration {
        Duration::from_millis(self.pgt_wait_ms)
    }

    pub fn pgt_ttl(&self) -> Duration {
        Duration::from_secs(self.pgt_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ServerConfig {
        ServerConfig::new("cas.example.com", "https://app.example.com/casservice")
    }

    #[test]
    fn missing_hostname_is_a_configuration_error() {
        let err = ServerConfig::new("", "https://app.example.com/casservice").validate().unwrap_err();
        assert!(matches!(err, CasError::Configuration(_)));
    }

    #[test]
    fn relative_service_url_is_rejected() {
        let err = ServerConfig::new("cas.example.com", "/casservice").validate().unwrap_err();
        assert!(matches!(err, CasError::Configuration(_)));
    }

    #[test]
    fn proxy_initialization_requires_callback() {
        let config = base().with_proxy(ProxyConfig { initialize: true, ..ProxyConfig::default() });
        assert!(config.validate().is_err());

        let config = base().with_proxy(ProxyConfig {
            initialize: true,
            callback_url: Some("https://app.example.com/casproxycallback".into()),
            ..ProxyConfig::default()
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn proxy_flags_need_protocol_two() {
        let proxy = ProxyConfig {
            initialize: true,
            can_be_proxied: true,
            callback_url: Some("https://app.example.com/casproxycallback".into()),
            ..ProxyConfig::default()
        };
        let config = base().with_version(ProtocolVersion::V1).with_proxy(proxy);
        assert!(!config.initializes_proxy());
        assert!(!config.accepts_proxies());
    }

    #[test]
    fn bad_allow_list_regex_is_reported() {
        let config = base().with_proxy(ProxyConfig {
            can_be_proxied: true,
            chains: "/https:\\/\\/(unclosed/".into(),
            ..ProxyConfig::default()
        });
        assert!(matches!(config.validate(), Err(CasError::Configuration(_))));
    }

    #[test]
    fn missing_ca_cert_means_insecure() {
        assert!(!base().verifies_tls());
        assert!(base().with_ca_cert("/etc/ssl/cas.pem").verifies_tls());
    }
}
