//! The normalized response every request resolves to.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::body::Body;
use crate::error::Error;
use crate::http::HttpResponse;

/// Result of a request that reached the server, whatever its status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// `true` iff `status` is in 200..=299.
    pub success: bool,
    pub status: u16,
    pub body: Body,
}

impl Response {
    /// Deserialize a JSON body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        self.body.json()
    }
}

impl From<HttpResponse> for Response {
    fn from(raw: HttpResponse) -> Self {
        Self {
            success: raw.is_success(),
            status: raw.status,
            body: Body::decode(raw.body),
        }
    }
}
