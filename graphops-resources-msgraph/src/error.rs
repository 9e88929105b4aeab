use std::fmt;

use graphops_dynamic::DecodeError;

use crate::{credentials::CredentialError, rest::Method};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A resource identifier string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to parse ID {input:?}: {reason}")]
pub struct ParseError {
    pub input: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(input: &str, reason: impl Into<String>) -> ParseError {
        ParseError {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// A request did not succeed, after any retries.
///
/// `status` is absent when no response was received at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationError {
    pub method: Method,
    pub path: String,
    pub status: Option<u16>,
    pub body: String,
    pub message: String,
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(
                f,
                "Request failed with {} for: {} {:?}: {}",
                status, self.method, self.path, self.body
            ),
            None => write!(
                f,
                "Request failed for: {} {:?}: {}",
                self.method, self.path, self.message
            ),
        }
    }
}

impl std::error::Error for OperationError {}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Parse response body failed for: {method} {path:?}: {body}")]
    Decode {
        method: Method,
        path: String,
        body: String,
        #[source]
        source: DecodeError,
    },

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error("Unexpected response for: {method} {path:?}: {message}: {body}")]
    ResponseShape {
        method: Method,
        path: String,
        body: String,
        message: String,
    },

    #[error("Request cancelled: {method} {path:?}")]
    Cancelled { method: Method, path: String },

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("Failed to parse access token: {0}")]
    Token(String),

    #[error("Invalid provider configuration: {0}")]
    Config(String),

    #[error("Invalid resource inputs: {0}")]
    Input(String),
}

impl Error {
    /// The HTTP status of a failed request, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Operation(e) => e.status,
            _ => None,
        }
    }
}
