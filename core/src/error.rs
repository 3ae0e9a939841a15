//! Error types for the REST client.
//!
//! # Design
//! A request that never produced a response (`Transport`, `Aborted`) is an
//! error; a response with an unsuccessful status is not. Those arrive as a
//! normal [`Response`](crate::Response) with `success == false`, so callers
//! and middleware can tell "no answer" apart from "a 4xx/5xx answer".

use thiserror::Error;

use crate::abort::AbortToken;

/// Errors produced by [`RestClient`](crate::RestClient) and its collaborators.
#[derive(Debug, Error)]
pub enum Error {
    /// The transport failed before a response arrived (DNS, connect, I/O).
    #[error("transport error: {0}")]
    Transport(String),

    /// The request's abort token was cancelled, manually or by a timeout.
    #[error("request aborted (token {token})")]
    Aborted {
        /// Token the request was registered under.
        token: AbortToken,
    },

    /// `abort` was called with a token that has no in-flight requests.
    #[error("unknown abort token: {0}")]
    UnknownToken(AbortToken),

    /// A payload or query could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Raised by user middleware.
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// True for errors caused by an abort token firing.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
