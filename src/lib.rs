//! Client side of the Central Authentication Service (CAS) protocol.
//!
//! The engine validates service tickets (protocol 1.0 and 2.0), builds the
//! CAS server URLs, handles proxy-granting tickets and proxy authentication,
//! and keeps the ticket/session bookkeeping needed for single logout. The
//! [`web`] module mounts it on Rocket.

pub mod client;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logout;
pub mod pgt;
pub mod proxy;
pub mod proxy_chain;
pub mod transport;
pub mod urls;
pub mod validate;
pub mod web;
mod xml;

pub use client::{CasClient, Login};
pub use config::{ProtocolVersion, ProxyConfig, ServerConfig};
pub use error::{CasError, ErrorKind, Result};
pub use ledger::{session_digest, LoginRecord, SessionTicketLedger};
pub use logout::{LogoutCoordinator, LogoutOutcome, SessionManager};
pub use pgt::{PgtMapping, ProxyGrantStore};
pub use proxy::{ProxyAuthenticator, ProxyCookie, ProxySession};
pub use proxy_chain::{verify_proxy_chain, AllowedChains, ProxyChain};
pub use transport::{HttpResponse, HttpTransport, IsahcTransport, TransportError};
pub use urls::ServiceParameters;
pub use validate::{CasIdentity, TicketValidator};
