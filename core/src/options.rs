//! Client-wide configuration, per-call overrides and the merge between them.
//!
//! # Design
//! Both layers may be given as a fixed value or as a producer invoked on
//! every request ([`Source`]), which lets values such as an auth header
//! change between calls. Merging is field-by-field whole-value override,
//! except for headers, which merge key by key when both layers set them.
//!
//! Both layers deserialize from camelCase JSON, e.g.
//! `{"apiUrl": "https://api.example.com", "headers": {"Accept": "application/json"}, "timeout": 5000}`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::abort::AbortToken;

/// Header name to value. Names are kept exactly as given.
pub type Headers = BTreeMap<String, String>;

/// How the transport handles 3xx responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Redirect {
    Follow,
    /// Return the 3xx response as-is.
    Manual,
    /// Fail the request on a 3xx response.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Credentials {
    Omit,
    SameOrigin,
    Include,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    Default,
    NoStore,
    Reload,
    NoCache,
    ForceCache,
    OnlyIfCached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    Cors,
    NoCors,
    SameOrigin,
    Navigate,
}

/// Options forwarded untouched to the transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<Redirect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CachePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keepalive: Option<bool>,
}

impl FetchOptions {
    /// Fields set in `local` replace the ones in `self`.
    fn overlay(self, local: FetchOptions) -> FetchOptions {
        FetchOptions {
            redirect: local.redirect.or(self.redirect),
            credentials: local.credentials.or(self.credentials),
            cache: local.cache.or(self.cache),
            mode: local.mode.or(self.mode),
            referrer: local.referrer.or(self.referrer),
            keepalive: local.keepalive.or(self.keepalive),
        }
    }
}

/// Client-wide defaults. A base URL is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub api_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,
    #[serde(flatten)]
    pub fetch: FetchOptions,
    /// Default timeout applied to every request.
    #[serde(default, with = "millis", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_token: Option<AbortToken>,
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            headers: None,
            fetch: FetchOptions::default(),
            timeout: None,
            abort_token: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(Headers::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn fetch(mut self, fetch: FetchOptions) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Overrides for a single call. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,
    #[serde(flatten)]
    pub fetch: FetchOptions,
    #[serde(default, with = "millis", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// Requests sharing a token are aborted together.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_token: Option<AbortToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(Headers::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn fetch(mut self, fetch: FetchOptions) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn abort_token(mut self, token: impl Into<AbortToken>) -> Self {
        self.abort_token = Some(token.into());
        self
    }
}

/// A configuration layer: either a fixed value or a producer called afresh
/// on every request.
pub enum Source<T> {
    Static(T),
    Producer(Arc<dyn Fn() -> T + Send + Sync>),
}

impl<T: Clone> Source<T> {
    pub fn producer<F>(produce: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Source::Producer(Arc::new(produce))
    }

    /// Current value. Producers are never cached.
    pub fn resolve(&self) -> T {
        match self {
            Source::Static(value) => value.clone(),
            Source::Producer(produce) => produce(),
        }
    }
}

impl<T> From<T> for Source<T> {
    fn from(value: T) -> Self {
        Source::Static(value)
    }
}

impl<T: Default> Default for Source<T> {
    fn default() -> Self {
        Source::Static(T::default())
    }
}

impl<T: Clone> Clone for Source<T> {
    fn clone(&self) -> Self {
        match self {
            Source::Static(value) => Source::Static(value.clone()),
            Source::Producer(produce) => Source::Producer(Arc::clone(produce)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Source<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Source::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

/// Fully merged options for one call.
///
/// `api_url`, `timeout` and `abort_token` are consumed by the dispatcher;
/// only `headers` and `fetch` reach the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub api_url: String,
    pub headers: Option<Headers>,
    pub fetch: FetchOptions,
    pub timeout: Option<Duration>,
    pub abort_token: Option<AbortToken>,
}

/// Overlay `local` on `global`.
pub fn merge(global: ClientConfig, local: RequestOptions) -> EffectiveConfig {
    let headers = match (global.headers, local.headers) {
        (Some(mut merged), Some(local)) => {
            merged.extend(local);
            Some(merged)
        }
        (global, local) => local.or(global),
    };

    EffectiveConfig {
        api_url: local.api_url.unwrap_or(global.api_url),
        headers,
        fetch: global.fetch.overlay(local.fetch),
        timeout: local.timeout.or(global.timeout),
        abort_token: local.abort_token.or(global.abort_token),
    }
}

/// `Option<Duration>` as whole milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => serializer.serialize_u64(duration.as_millis() as u64),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
