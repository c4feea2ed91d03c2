//! Service ticket validation, protocol 1.0 (plain text) and 2.0 (XML).

use std::collections::BTreeMap;
use std::sync::Arc;

use roxmltree::Node;
use serde::Serialize;

use crate::config::{ProtocolVersion, ServerConfig};
use crate::error::{CasError, Result};
use crate::proxy_chain::{verify_proxy_chain, ProxyChain};
use crate::transport::{HttpResponse, HttpTransport, TransportError};
use crate::urls::{self, ServiceParameters};
use crate::xml;

/// The principal CAS vouched for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CasIdentity {
    pub username: String,
    /// Every value of a repeated attribute, in document order.
    pub attributes: BTreeMap<String, Vec<String>>,
    /// Set only when this client initializes as a proxy.
    pub pgt_iou: Option<String>,
    /// Proxies the ticket passed through; empty when it was not proxied.
    pub proxies: ProxyChain,
}

impl CasIdentity {
    pub fn new(username: impl Into<String>) -> Self {
        Self { username: username.into(), ..Self::default() }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(|values| values.first()).map(String::as_str)
    }
}

pub struct TicketValidator {
    transport: Arc<dyn HttpTransport>,
}

impl TicketValidator {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Asks the CAS server whether `ticket` was issued for this service.
    ///
    /// Each call is independent. A failed request (including a timeout) and a
    /// non-2xx reply without a readable body are reported as
    /// [`CasError::CasUnreachable`], apart from protocol failures.
    pub fn validate(&self, config: &ServerConfig, ticket: &str, params: &ServiceParameters) -> Result<CasIdentity> {
        let url = urls::validate_url(config, ticket, params)?;
        let response = self.transport.get(&url).map_err(CasError::CasUnreachable)?;
        interpret(config, &response)
    }
}

fn interpret(config: &ServerConfig, response: &HttpResponse) -> Result<CasIdentity> {
    let outcome = match config.version {
        ProtocolVersion::V1 => parse_v1(&response.body),
        ProtocolVersion::V2 => parse_v2(config, &response.body),
    };
    match outcome {
        Err(CasError::MalformedResponse(_)) if !response.is_success() => {
            Err(CasError::CasUnreachable(TransportError::Status(response.status)))
        }
        outcome => outcome,
    }
}

/// `yes\n<username>\n` or `no\n\n`.
pub fn parse_v1(body: &str) -> Result<CasIdentity> {
    let body = body.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines = body.split('\n');

    match lines.next().map(str::trim) {
        Some("yes") => {}
        Some("no") => return Err(CasError::TicketRejected),
        _ => return Err(CasError::malformed("first line is neither \"yes\" nor \"no\"")),
    }

    let username = lines.next().map(str::trim).unwrap_or_default();
    if username.is_empty() {
        return Err(CasError::malformed("no user found in ticket validation response"));
    }
    Ok(CasIdentity::new(username))
}

/// `serviceResponse` document from `serviceValidate` or `proxyValidate`.
///
/// The proxy chain is checked before the PGTIOU is read, so a rejected chain
/// never yields a proxy-granting ticket.
pub fn parse_v2(config: &ServerConfig, body: &str) -> Result<CasIdentity> {
    let doc = xml::parse(body)?;
    let root = doc.root();

    if let Some(failure) = xml::find(root, "authenticationFailure") {
        return Err(CasError::AuthenticationFailure {
            code: failure.attribute("code").unwrap_or_default().trim().to_owned(),
            message: xml::text_content(failure),
        });
    }

    let success = xml::find(root, "authenticationSuccess")
        .ok_or_else(|| CasError::malformed("neither authenticationSuccess nor authenticationFailure present"))?;

    let username = xml::child_text(success, "user")
        .ok_or_else(|| CasError::malformed("no user found in ticket validation response"))?;

    let mut proxies = ProxyChain::default();
    if config.accepts_proxies() {
        if let Some(list) = xml::child(success, "proxies") {
            proxies = list
                .children()
                .filter(|n| xml::is_element(n, "proxy"))
                .map(xml::text_content)
                .collect();
            if !proxies.is_empty() {
                verify_proxy_chain(&proxies, &config.proxy.chains)?;
            }
        }
    }

    let pgt_iou = if config.initializes_proxy() {
        Some(xml::child_text(success, "proxyGrantingTicket").ok_or(CasError::MissingPgtIou)?)
    } else {
        None
    };

    let attributes = xml::child(success, "attributes").map(flatten_attributes).unwrap_or_default();

    Ok(CasIdentity { username, attributes, pgt_iou, proxies })
}

/// `<cas:memberOf>a</cas:memberOf><cas:memberOf>b</cas:memberOf>` becomes
/// `memberOf => [a, b]`. The `<cas:attribute name=".." value=".."/>` form is
/// accepted as well.
fn flatten_attributes(attributes: Node<'_, '_>) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for element in attributes.children().filter(Node::is_element) {
        let (key, value) = match (element.tag_name().name(), element.attribute("name")) {
            ("attribute", Some(name)) => (
                name.to_owned(),
                element
                    .attribute("value")
                    .map(str::to_owned)
                    .unwrap_or_else(|| xml::text_content(element)),
            ),
            (tag, _) => (tag.to_owned(), xml::text_content(element)),
        };
        map.entry(key).or_default().push(value);
    }
    map
}
