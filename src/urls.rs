//! CAS server and service URL construction.
//!
//! Pure functions over a [`ServerConfig`]; nothing here performs I/O. The
//! `service` value is always the full absolute callback URL, percent-encoded
//! once as a query value, so query parameters carried by the service URL end
//! up double-encoded in the outer URL. CAS servers compare the service URL
//! byte-for-byte between login and validation, so the encoding must not
//! change between the two.

use url::Url;

use crate::config::{ProtocolVersion, ServerConfig};
use crate::error::{CasError, Result};

/// Query parameters merged into the service URL, e.g. a `returnto` deep link.
///
/// Keeps insertion order; setting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceParameters(Vec<(String, String)>);

impl ServiceParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, or removes it when `value` is `None`.
    pub fn set(&mut self, key: impl Into<String>, value: Option<String>) -> &mut Self {
        let key = key.into();
        let position = self.0.iter().position(|(k, _)| *k == key);
        match (position, value) {
            (Some(i), Some(value)) => self.0[i].1 = value,
            (Some(i), None) => {
                self.0.remove(i);
            }
            (None, Some(value)) => self.0.push((key, value)),
            (None, None) => {}
        }
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.set(key, Some(value.into()))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ServiceParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

fn query<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    pairs
        .into_iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// `https://{hostname}[:port]{path}/`, with the port left out when it is the
/// HTTPS default.
pub fn server_base_url(config: &ServerConfig) -> Result<String> {
    let hostname = config.hostname.trim();
    if hostname.is_empty() {
        return Err(CasError::Configuration("CAS server hostname is not set".into()));
    }

    let mut url = format!("https://{hostname}");
    if let Some(port) = config.port.filter(|port| *port != 0 && *port != 443) {
        url.push_str(&format!(":{port}"));
    }
    let path = config.path.trim().trim_matches('/');
    if !path.is_empty() {
        url.push('/');
        url.push_str(path);
    }
    url.push('/');
    Ok(url)
}

/// This service's own callback URL with `params` appended to its query.
pub fn service_url(config: &ServerConfig, params: &ServiceParameters) -> Result<String> {
    let service = config.service_url.trim();
    if service.is_empty() {
        return Err(CasError::Configuration("service_url is not set".into()));
    }
    if params.is_empty() {
        return Ok(service.to_owned());
    }
    let sep = if service.contains('?') { "&" } else { "?" };
    Ok(format!("{service}{sep}{}", query(params.iter())))
}

pub fn login_url(config: &ServerConfig, params: &ServiceParameters, gateway: bool) -> Result<String> {
    let base = server_base_url(config)?;
    let service = service_url(config, params)?;
    let mut pairs = Vec::with_capacity(2);
    if gateway {
        pairs.push(("gateway", "true"));
    }
    pairs.push(("service", service.as_str()));
    Ok(format!("{base}login?{}", query(pairs)))
}

/// The validation endpoint for the configured protocol, carrying `pgtUrl`
/// when this client initializes as a proxy.
pub fn validate_url(config: &ServerConfig, ticket: &str, params: &ServiceParameters) -> Result<String> {
    let base = server_base_url(config)?;
    let service = service_url(config, params)?;
    let endpoint = match config.version {
        ProtocolVersion::V1 => "validate",
        ProtocolVersion::V2 if config.accepts_proxies() => "proxyValidate",
        ProtocolVersion::V2 => "serviceValidate",
    };

    let mut pairs = vec![("service", service.as_str()), ("ticket", ticket)];
    if config.initializes_proxy() {
        let callback = config
            .proxy
            .callback_url
            .as_deref()
            .ok_or_else(|| CasError::Configuration("proxy.callback_url is not set".into()))?;
        pairs.push(("pgtUrl", callback));
    }
    Ok(format!("{base}{endpoint}?{}", query(pairs)))
}

pub fn proxy_url(config: &ServerConfig, pgt: &str, target_service: &str) -> Result<String> {
    let base = server_base_url(config)?;
    Ok(format!("{base}proxy?{}", query([("pgt", pgt), ("targetService", target_service)])))
}

/// CAS 2.0 servers read the post-logout destination from `url`; other
/// versions use `service`. A relative destination is resolved against the
/// service URL.
pub fn logout_url(config: &ServerConfig, destination: Option<&str>) -> Result<String> {
    let base = format!("{}logout", server_base_url(config)?);
    let Some(destination) = destination.map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(base);
    };

    let destination = match Url::parse(destination) {
        Ok(url) => url.to_string(),
        Err(_) => Url::parse(&config.service_url)
            .and_then(|service| service.join(destination))
            .map_err(|e| CasError::Configuration(format!("invalid logout destination {destination:?}: {e}")))?
            .to_string(),
    };
    let key = match config.version {
        ProtocolVersion::V2 => "url",
        ProtocolVersion::V1 => "service",
    };
    Ok(format!("{base}?{}", query([(key, destination.as_str())])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyConfig;
    use rstest::rstest;

    fn config(version: ProtocolVersion, initialize: bool, can_be_proxied: bool) -> ServerConfig {
        ServerConfig::new("example.com", "https://example.com/client")
            .with_port(443)
            .with_path("/cas")
            .with_version(version)
            .with_proxy(ProxyConfig {
                initialize,
                can_be_proxied,
                callback_url: Some("https://example.com/casproxycallback".into()),
                ..ProxyConfig::default()
            })
    }

    fn returnto() -> ServiceParameters {
        [("returnto", "node/1")].into_iter().collect()
    }

    #[rstest]
    #[case(Some(443), "/cas", "https://example.com/cas/")]
    #[case(None, "/cas/", "https://example.com/cas/")]
    #[case(Some(8443), "/cas", "https://example.com:8443/cas/")]
    #[case(None, "", "https://example.com/")]
    #[case(None, "cas//", "https://example.com/cas/")]
    fn base_url(#[case] port: Option<u16>, #[case] path: &str, #[case] expected: &str) {
        let mut config = ServerConfig::new("example.com", "https://example.com/client").with_path(path);
        config.port = port;
        assert_eq!(server_base_url(&config).unwrap(), expected);
    }

    #[rstest]
    #[case(ServiceParameters::new(), false, "https://example.com/cas/login?service=https%3A%2F%2Fexample.com%2Fclient")]
    #[case(returnto(), false, "https://example.com/cas/login?service=https%3A%2F%2Fexample.com%2Fclient%3Freturnto%3Dnode%252F1")]
    #[case(ServiceParameters::new(), true, "https://example.com/cas/login?gateway=true&service=https%3A%2F%2Fexample.com%2Fclient")]
    #[case(returnto(), true, "https://example.com/cas/login?gateway=true&service=https%3A%2F%2Fexample.com%2Fclient%3Freturnto%3Dnode%252F1")]
    fn login(#[case] params: ServiceParameters, #[case] gateway: bool, #[case] expected: &str) {
        let config = config(ProtocolVersion::V2, false, false);
        assert_eq!(login_url(&config, &params, gateway).unwrap(), expected);
    }

    #[rstest]
    #[case(ProtocolVersion::V1, false, false, "validate?service=https%3A%2F%2Fexample.com%2Fclient&ticket=ST-1")]
    #[case(ProtocolVersion::V2, false, false, "serviceValidate?service=https%3A%2F%2Fexample.com%2Fclient&ticket=ST-1")]
    #[case(ProtocolVersion::V2, false, true, "proxyValidate?service=https%3A%2F%2Fexample.com%2Fclient&ticket=ST-1")]
    #[case(
        ProtocolVersion::V2,
        true,
        false,
        "serviceValidate?service=https%3A%2F%2Fexample.com%2Fclient&ticket=ST-1&pgtUrl=https%3A%2F%2Fexample.com%2Fcasproxycallback"
    )]
    #[case(
        ProtocolVersion::V2,
        true,
        true,
        "proxyValidate?service=https%3A%2F%2Fexample.com%2Fclient&ticket=ST-1&pgtUrl=https%3A%2F%2Fexample.com%2Fcasproxycallback"
    )]
    fn validate(
        #[case] version: ProtocolVersion,
        #[case] initialize: bool,
        #[case] can_be_proxied: bool,
        #[case] expected: &str,
    ) {
        let config = config(version, initialize, can_be_proxied);
        let url = validate_url(&config, "ST-1", &ServiceParameters::new()).unwrap();
        assert_eq!(url, format!("https://example.com/cas/{expected}"));
    }

    #[test]
    fn validate_keeps_nested_service_params() {
        let config = config(ProtocolVersion::V1, false, false);
        let url = validate_url(&config, "ST-2", &returnto()).unwrap();
        assert_eq!(
            url,
            "https://example.com/cas/validate?service=https%3A%2F%2Fexample.com%2Fclient%3Freturnto%3Dnode%252F1&ticket=ST-2"
        );
    }

    #[test]
    fn proxy_request_url() {
        let config = config(ProtocolVersion::V2, true, false);
        let url = proxy_url(&config, "PGT-42", "https://backend.example.com/api?x=1").unwrap();
        assert_eq!(
            url,
            "https://example.com/cas/proxy?pgt=PGT-42&targetService=https%3A%2F%2Fbackend.example.com%2Fapi%3Fx%3D1"
        );
    }

    #[test]
    fn service_url_appends_to_existing_query() {
        let config = ServerConfig::new("example.com", "https://example.com/index.php?q=cas");
        assert_eq!(service_url(&config, &returnto()).unwrap(), "https://example.com/index.php?q=cas&returnto=node%2F1");
    }

    #[rstest]
    #[case(ProtocolVersion::V2, None, "https://example.com/cas/logout")]
    #[case(ProtocolVersion::V2, Some("https://example.com/bye"), "https://example.com/cas/logout?url=https%3A%2F%2Fexample.com%2Fbye")]
    #[case(ProtocolVersion::V1, Some("https://example.com/bye"), "https://example.com/cas/logout?service=https%3A%2F%2Fexample.com%2Fbye")]
    #[case(ProtocolVersion::V2, Some("/goodbye"), "https://example.com/cas/logout?url=https%3A%2F%2Fexample.com%2Fgoodbye")]
    fn logout(#[case] version: ProtocolVersion, #[case] destination: Option<&str>, #[case] expected: &str) {
        let config = config(version, false, false);
        assert_eq!(logout_url(&config, destination).unwrap(), expected);
    }

    #[test]
    fn missing_hostname_fails_without_io() {
        let config = ServerConfig::new("  ", "https://example.com/client");
        let err = login_url(&config, &ServiceParameters::new(), false).unwrap_err();
        assert!(matches!(err, CasError::Configuration(_)));
    }

    #[test]
    fn parameters_replace_in_place_and_remove() {
        let mut params = ServiceParameters::new();
        params.insert("a", "1").insert("b", "2").insert("a", "3");
        assert_eq!(params.iter().collect::<Vec<_>>(), vec![("a", "3"), ("b", "2")]);
        params.set("a", None);
        assert_eq!(params.get("a"), None);
        assert_eq!(params.get("b"), Some("2"));
    }
}
