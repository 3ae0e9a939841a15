//! HTTP transport types exchanged with a [`Transport`](crate::Transport).
//!
//! # Design
//! These types describe a single round-trip as plain data. The dispatcher
//! builds an `HttpRequest` after merging options, and the transport answers
//! with an `HttpResponse`. The base URL, abort token and timeout never appear
//! here: they are consumed by the dispatcher before the request is built.
//!
//! All fields use owned types so values can move across tasks freely.

use std::fmt;

use crate::options::FetchOptions;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Absolute URL: base URL, endpoint and any query string.
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// `None` means "send no body", which differs from an empty body.
    pub body: Option<String>,
    /// Transport options left over after merging.
    pub options: FetchOptions,
}

impl HttpRequest {
    /// First header value matching `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// `None` when the transport reports that the response has no body.
    pub body: Option<Vec<u8>>,
}

impl HttpResponse {
    /// Fetch's notion of `ok`: status in 200..=299.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
