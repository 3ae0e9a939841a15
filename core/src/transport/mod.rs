//! The network capability the client is built on.
//!
//! # Design
//! A [`Transport`] performs exactly one round-trip and knows nothing about
//! base URLs, middleware or abort tokens. Aborting is done by the caller:
//! the dispatcher races `send` against the request's abort signal and drops
//! the `send` future when the signal wins. Tests swap in their own
//! implementation instead of patching any global.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::Error;
use crate::http::{HttpRequest, HttpResponse};

#[cfg(feature = "ureq")]
mod blocking;

#[cfg(feature = "ureq")]
pub use blocking::UreqTransport;

/// Executes HTTP requests.
///
/// Return `Ok` for every response that arrived, whatever its status; return
/// `Err` only when no response could be obtained.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, Error>;
}
