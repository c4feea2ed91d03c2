#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use cas_client::{CasClient, HttpResponse, HttpTransport, ProxyConfig, ServerConfig, TransportError};

pub const VALIDATE: &str = "https://cas.example.com/cas/serviceValidate?";
pub const PROXY: &str = "https://cas.example.com/cas/proxy?";

/// A CAS server that answers by URL prefix and remembers what was asked.
#[derive(Default)]
pub struct FakeCas {
    routes: Mutex<Vec<(String, HttpResponse)>>,
    requests: Mutex<Vec<String>>,
}

impl FakeCas {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, prefix: &str, response: HttpResponse) {
        self.routes.lock().unwrap().push((prefix.to_owned(), response));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl HttpTransport for FakeCas {
    fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(url.to_owned());
        self.routes
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, response)| response.clone())
            .ok_or_else(|| TransportError::Unavailable(format!("no route for {url}")))
    }
}

pub fn config() -> ServerConfig {
    ServerConfig::new("cas.example.com", "https://app.example.com/casservice").with_path("/cas")
}

pub fn proxy_config() -> ServerConfig {
    config().with_proxy(ProxyConfig {
        initialize: true,
        callback_url: Some("https://app.example.com/casproxycallback".into()),
        pgt_wait_ms: 50,
        ..ProxyConfig::default()
    })
}

pub fn client(config: ServerConfig, cas: &Arc<FakeCas>) -> CasClient {
    CasClient::with_transport(config, cas.clone()).unwrap()
}

pub fn success(inner: &str) -> HttpResponse {
    HttpResponse::ok(format!(
        "<cas:serviceResponse xmlns:cas='http://www.yale.edu/tp/cas'>\
           <cas:authenticationSuccess>{inner}</cas:authenticationSuccess>\
         </cas:serviceResponse>"
    ))
}

pub fn logout_request(ticket: &str) -> String {
    format!(
        r#"<samlp:LogoutRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="LR-1" Version="2.0" IssueInstant="2026-10-16T10:00:00Z"><saml:NameID xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion">@NOT_USED@</saml:NameID><samlp:SessionIndex>{ticket}</samlp:SessionIndex></samlp:LogoutRequest>"#
    )
}
