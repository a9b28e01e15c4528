use std::time::Duration;

use hypercli_protocol::{ErrorShape, error_codes};

/// Error reported by the gateway or raised by the RPC layer itself.
///
/// `code` is one of the client codes in
/// [`hypercli_protocol::error_codes`] or a server-supplied code passed
/// through verbatim.
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct GatewayError {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl GatewayError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub(crate) fn not_connected() -> Self {
        Self::new(error_codes::NOT_CONNECTED, "Not connected to gateway")
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::new(error_codes::PROTOCOL, message)
    }

    pub(crate) fn rpc_timeout(method: &str, after: Duration) -> Self {
        Self::new(
            error_codes::TIMEOUT,
            format!("RPC {method} timed out after {after:?}"),
        )
    }

    pub(crate) fn stream_timeout(method: &str, after: Duration) -> Self {
        Self::new(
            error_codes::TIMEOUT,
            format!("streaming {method} timed out after {after:?}"),
        )
    }

    pub(crate) fn handshake_timeout(after: Duration) -> Self {
        Self::new(
            error_codes::TIMEOUT,
            format!("handshake timed out after {after:?}"),
        )
    }

    /// Build from a wire error, substituting defaults for fields the server
    /// omitted.
    pub(crate) fn from_shape_or(
        shape: Option<ErrorShape>,
        default_code: &str,
        default_message: impl Into<String>,
    ) -> Self {
        match shape {
            Some(shape) => Self {
                code: if shape.code.is_empty() {
                    default_code.into()
                } else {
                    shape.code
                },
                message: if shape.message.is_empty() {
                    default_message.into()
                } else {
                    shape.message
                },
                details: shape.details,
            },
            None => Self::new(default_code, default_message),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Tungstenite(Box<tokio_tungstenite::tungstenite::Error>),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
}

impl Error {
    /// The protocol-level error, when this is one.
    pub fn as_gateway(&self) -> Option<&GatewayError> {
        match self {
            Self::Gateway(err) => Some(err),
            _ => None,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Tungstenite(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
