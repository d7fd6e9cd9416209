//! Oracle error type

use thiserror::Error;
use transfer_gateway::{ErrorKind, GatewayError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// Typed rejection from the gateway or the chain source
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The gateway node could not be reached
    #[error("Gateway node request failed: {message}")]
    Transport { message: String },

    /// The gateway node answered with something that is not a typed error
    #[error("Unexpected gateway node response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },

    #[error("Signing failed: {reason}")]
    Signing { reason: String },
}

impl OracleError {
    /// Failure category; transport problems are always transient
    pub fn kind(&self) -> ErrorKind {
        match self {
            OracleError::Gateway(e) => e.kind(),
            OracleError::Transport { .. } => ErrorKind::Transient,
            OracleError::UnexpectedResponse { status, .. } if *status >= 500 => {
                ErrorKind::Transient
            }
            OracleError::UnexpectedResponse { .. } | OracleError::Signing { .. } => {
                ErrorKind::Policy
            }
        }
    }

    pub fn gateway(&self) -> Option<&GatewayError> {
        match self {
            OracleError::Gateway(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(e: reqwest::Error) -> Self {
        OracleError::Transport {
            message: e.to_string(),
        }
    }
}
