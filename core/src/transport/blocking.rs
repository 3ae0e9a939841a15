//! [`Transport`] backed by a blocking `ureq` agent.
//!
//! Each request runs on tokio's blocking pool. When the dispatcher aborts a
//! request it stops waiting for the result; the worker thread finishes the
//! round-trip in the background and its result is discarded.

use std::fmt;

use async_trait::async_trait;
use ureq::Agent;

use super::Transport;
use crate::error::Error;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::options::{CachePolicy, FetchOptions, Redirect};

const MAX_REDIRECTS: u32 = 10;

/// HTTP/1.1 transport using `ureq`.
///
/// 4xx/5xx responses are returned as data rather than errors. The `redirect`,
/// `cache` and `referrer` fetch options are honoured; the other options only
/// make sense in a browser and are ignored.
#[derive(Clone)]
pub struct UreqTransport {
    following: Agent,
    not_following: Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        Self {
            following: agent(MAX_REDIRECTS),
            not_following: agent(0),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UreqTransport")
    }
}

fn agent(max_redirects: u32) -> Agent {
    Agent::config_builder()
        .http_status_as_error(false)
        .max_redirects(max_redirects)
        .build()
        .new_agent()
}

#[async_trait]
impl Transport for UreqTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let agent = match request.options.redirect {
            Some(Redirect::Manual | Redirect::Error) => self.not_following.clone(),
            Some(Redirect::Follow) | None => self.following.clone(),
        };

        tokio::task::spawn_blocking(move || execute(&agent, request))
            .await
            .map_err(|err| Error::Transport(err.to_string()))?
    }
}

fn execute(agent: &Agent, request: HttpRequest) -> Result<HttpResponse, Error> {
    let HttpRequest {
        method,
        url,
        mut headers,
        body,
        options,
    } = request;
    apply_fetch_headers(&mut headers, &options);

    let result = match (method, body) {
        (HttpMethod::Get, _) => with_headers(agent.get(&url), &headers).call(),
        (HttpMethod::Delete, None) => with_headers(agent.delete(&url), &headers).call(),
        (HttpMethod::Delete, Some(body)) => with_headers(agent.delete(&url), &headers)
            .force_send_body()
            .send(body.as_bytes()),
        (HttpMethod::Post, Some(body)) => {
            with_headers(agent.post(&url), &headers).send(body.as_bytes())
        }
        (HttpMethod::Post, None) => with_headers(agent.post(&url), &headers).send_empty(),
        (HttpMethod::Put, Some(body)) => {
            with_headers(agent.put(&url), &headers).send(body.as_bytes())
        }
        (HttpMethod::Put, None) => with_headers(agent.put(&url), &headers).send_empty(),
        (HttpMethod::Patch, Some(body)) => {
            with_headers(agent.patch(&url), &headers).send(body.as_bytes())
        }
        (HttpMethod::Patch, None) => with_headers(agent.patch(&url), &headers).send_empty(),
    };
    let mut response = result.map_err(|err| Error::Transport(err.to_string()))?;

    let status = response.status().as_u16();
    if options.redirect == Some(Redirect::Error) && (300..400).contains(&status) {
        return Err(Error::Transport(format!(
            "redirect ({status}) from {url} not allowed"
        )));
    }

    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let bytes = response
        .body_mut()
        .read_to_vec()
        .map_err(|err| Error::Transport(err.to_string()))?;

    Ok(HttpResponse {
        status,
        headers,
        body: (!bytes.is_empty()).then_some(bytes),
    })
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

/// Headers fetch itself would add for the given options.
fn apply_fetch_headers(headers: &mut Vec<(String, String)>, options: &FetchOptions) {
    if matches!(
        options.cache,
        Some(CachePolicy::NoStore | CachePolicy::NoCache | CachePolicy::Reload)
    ) {
        set_default(headers, "Cache-Control", "no-cache");
        set_default(headers, "Pragma", "no-cache");
    }
    if let Some(referrer) = &options.referrer {
        set_default(headers, "Referer", referrer);
    }
}

fn set_default(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    if !headers.iter().any(|(key, _)| key.eq_ignore_ascii_case(name)) {
        headers.push((name.to_string(), value.to_string()));
    }
}
