//! Blocking HTTP used to reach the CAS server and proxied services.

use isahc::config::{CaCertificate, Configurable, RedirectPolicy, SslOption};
use isahc::http::header::SET_COOKIE;
use isahc::{HttpClient, ReadResponseExt};
use thiserror::Error;
use tracing::warn;

use crate::config::ServerConfig;
use crate::error::{CasError, Result};

#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, TLS or timeout failure reported by the HTTP client.
    #[error(transparent)]
    Http(#[from] isahc::Error),

    #[error("failed to read response body: {0}")]
    Body(#[from] std::io::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("{0}")]
    Unavailable(String),
}

/// What the engine needs from a response: status, body text and raw
/// `Set-Cookie` header values in the order they were received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub set_cookies: Vec<String>,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self { status: 200, body: body.into(), set_cookies: Vec::new() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait HttpTransport: Send + Sync {
    fn get(&self, url: &str) -> std::result::Result<HttpResponse, TransportError>;
}

/// [`HttpTransport`] backed by isahc. Redirects are not followed so cookies
/// set by the first hop of a proxied service are captured.
pub struct IsahcTransport {
    client: HttpClient,
}

impl IsahcTransport {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let builder = HttpClient::builder()
            .timeout(config.timeout())
            .redirect_policy(RedirectPolicy::None);

        let builder = match &config.ca_cert {
            Some(path) => builder.ssl_ca_certificate(CaCertificate::file(path)),
            None => builder,
        };
        let builder = if config.verifies_tls() {
            builder
        } else {
            warn!(
                hostname = %config.hostname,
                "no CA certificate configured; CAS server certificate verification is DISABLED"
            );
            builder.ssl_options(SslOption::DANGER_ACCEPT_INVALID_CERTS | SslOption::DANGER_ACCEPT_INVALID_HOSTS)
        };

        let client = builder
            .build()
            .map_err(|e| CasError::Configuration(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl HttpTransport for IsahcTransport {
    fn get(&self, url: &str) -> std::result::Result<HttpResponse, TransportError> {
        let mut response = self.client.get(url)?;
        let set_cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_owned)
            .collect();
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(HttpResponse { status, body, set_cookies })
    }
}

/// Scripted transport for unit tests: answers by URL prefix and records
/// every URL requested.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        routes: Mutex<Vec<(String, Option<HttpResponse>)>>,
        requests: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn respond(self, prefix: &str, response: HttpResponse) -> Self {
            self.routes.lock().unwrap().push((prefix.to_owned(), Some(response)));
            self
        }

        pub(crate) fn fail(self, prefix: &str) -> Self {
            self.routes.lock().unwrap().push((prefix.to_owned(), None));
            self
        }

        pub(crate) fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl HttpTransport for ScriptedTransport {
        fn get(&self, url: &str) -> std::result::Result<HttpResponse, TransportError> {
            self.requests.lock().unwrap().push(url.to_owned());
            let routes = self.routes.lock().unwrap();
            match routes.iter().find(|(prefix, _)| url.starts_with(prefix.as_str())) {
                Some((_, Some(response))) => Ok(response.clone()),
                Some((_, None)) => Err(TransportError::Unavailable("connection refused".into())),
                None => Err(TransportError::Unavailable(format!("no route for {url}"))),
            }
        }
    }
}
