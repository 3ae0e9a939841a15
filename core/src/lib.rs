//! Small REST client over an injectable HTTP transport.
//!
//! # Overview
//! [`RestClient`] prepends a base URL to every endpoint, merges client-wide
//! options with per-call overrides, encodes JSON payloads and query strings,
//! and normalizes every response to `{ success, status, body }`. Requests can
//! be grouped under an [`AbortToken`] and aborted together, manually or by a
//! timeout. A single middleware can reshape every result.
//!
//! # Design
//! - The network call sits behind the [`Transport`] trait and is injected at
//!   construction; [`UreqTransport`] is the default (feature `ureq`).
//! - Abort tokens live in a per-client [`AbortRegistry`], never in globals.
//! - Configuration layers are a fixed value or a producer ([`Source`]).
//! - A response with a 4xx/5xx status is still `Ok`; only requests that got
//!   no response at all are `Err`.
//!
//! ```no_run
//! use fetch_rest::{ClientConfig, RequestOptions, RestClient};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), fetch_rest::Error> {
//! let client = RestClient::new(
//!     ClientConfig::new("https://api.example.com").header("Accept", "application/json"),
//! );
//! let users = client
//!     .get_with("/users", &json!({"limit": 20}), RequestOptions::new())
//!     .await?;
//! assert!(users.success);
//! # Ok(())
//! # }
//! ```

pub mod abort;
pub mod body;
pub mod client;
pub mod error;
pub mod http;
pub mod id;
pub mod middleware;
pub mod options;
pub mod query;
pub mod response;
pub mod transport;

pub use abort::{AbortRegistry, AbortToken};
pub use body::{Body, Payload};
pub use client::RestClient;
pub use error::Error;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use middleware::ResponseFuture;
pub use options::{
    CachePolicy, ClientConfig, Credentials, FetchOptions, Headers, Mode, Redirect,
    RequestOptions, Source,
};
pub use response::Response;
pub use transport::Transport;
#[cfg(feature = "ureq")]
pub use transport::UreqTransport;
