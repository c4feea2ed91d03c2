//! Error types for the CAS protocol engine.

use thiserror::Error;

use crate::transport::TransportError;

/// Coarse classification of a [`CasError`], used by callers to decide what to
/// do next without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Network or TLS failure. Possibly transient.
    Transport,
    /// Malformed or unexpected server response.
    Protocol,
    /// The server explicitly refused the ticket or proxy request.
    Rejected,
    /// Missing or invalid settings, or session state that cannot proxy.
    Configuration,
    /// The reported proxy chain is not on the allow-list.
    Trust,
}

#[derive(Debug, Error)]
pub enum CasError {
    #[error("request to CAS server failed: {0}")]
    CasUnreachable(TransportError),

    #[error("request to target service failed: {0}")]
    TargetUnreachable(TransportError),

    /// The target service answered the proxy ticket with a 4xx.
    #[error("target service refused the proxy ticket (HTTP {0})")]
    TargetRejected(u16),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("ticket rejected")]
    TicketRejected,

    #[error("error code {code}: {message}")]
    AuthenticationFailure { code: String, message: String },

    #[error("proxy request refused, error code {code}: {message}")]
    ProxyFailure { code: String, message: String },

    #[error("proxy chain did not match allowed list")]
    ProxyChainRejected,

    #[error("proxy initialized but no PGTIOU provided")]
    MissingPgtIou,

    #[error("PGT not resolved for {0}")]
    PgtNotResolved(String),

    #[error("invalid or malformed ticket")]
    MalformedProxyTicket,

    #[error("session state not sufficient for proxying")]
    InsufficientSession,

    #[error("missing proxy callback parameter: {0}")]
    MissingCallbackParameter(&'static str),

    #[error("invalid logout request: {0}")]
    InvalidLogoutRequest(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CasError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CasError::CasUnreachable(_) | CasError::TargetUnreachable(_) => ErrorKind::Transport,
            CasError::MalformedResponse(_)
            | CasError::MissingPgtIou
            | CasError::PgtNotResolved(_)
            | CasError::MalformedProxyTicket
            | CasError::MissingCallbackParameter(_)
            | CasError::InvalidLogoutRequest(_) => ErrorKind::Protocol,
            CasError::TicketRejected
            | CasError::AuthenticationFailure { .. }
            | CasError::ProxyFailure { .. }
            | CasError::TargetRejected(_) => ErrorKind::Rejected,
            CasError::ProxyChainRejected => ErrorKind::Trust,
            CasError::InsufficientSession | CasError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Only transport failures are worth retrying; everything else needs a new
    /// ticket or a fix on one side of the exchange.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    /// True when the server (or our trust policy) refused the principal.
    pub fn is_rejection(&self) -> bool {
        matches!(self.kind(), ErrorKind::Rejected | ErrorKind::Trust)
    }

    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        CasError::MalformedResponse(detail.into())
    }
}

pub type Result<T> = std::result::Result<T, CasError>;
