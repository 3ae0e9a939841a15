//! Request dispatch: option merging, abort handling and the middleware hook.
//!
//! # Design
//! Every request method does its bookkeeping eagerly: options are resolved,
//! the payload is encoded and the request is registered under its abort
//! token before the future is returned. Aborting therefore works even on a
//! request that has not been polled yet, and a timeout counts from the call. The round-trip itself happens when
//! the future runs, and its result goes through the installed middleware.
//!
//! Transport failures and aborts are returned as `Err`. Any response that
//! arrived, successful or not, is returned as a [`Response`].

use std::fmt;
use std::sync::Arc;

use futures::future;
use futures::FutureExt;
use serde::Serialize;

use crate::abort::{AbortRegistry, AbortToken};
use crate::body::Payload;
use crate::error::Error;
use crate::http::{HttpMethod, HttpRequest};
use crate::middleware::{self, Chain, ResponseFuture};
use crate::options::{merge, ClientConfig, EffectiveConfig, RequestOptions, Source};
use crate::query;
use crate::response::Response;
use crate::transport::Transport;
#[cfg(feature = "ureq")]
use crate::transport::UreqTransport;

/// REST client bound to a base URL.
///
/// `T` is what requests resolve to: [`Response`] until a middleware that
/// reshapes results is installed with [`RestClient::middleware`].
pub struct RestClient<T = Response> {
    config: Source<ClientConfig>,
    transport: Arc<dyn Transport>,
    registry: Arc<AbortRegistry>,
    middleware: Chain<T>,
}

#[cfg(feature = "ureq")]
impl RestClient {
    /// Client using the blocking [`UreqTransport`].
    pub fn new(config: impl Into<Source<ClientConfig>>) -> Self {
        Self::with_transport(config, UreqTransport::new())
    }
}

impl RestClient {
    pub fn with_transport<R>(config: impl Into<Source<ClientConfig>>, transport: R) -> Self
    where
        R: Transport + 'static,
    {
        Self {
            config: config.into(),
            transport: Arc::new(transport),
            registry: Arc::new(AbortRegistry::new()),
            middleware: middleware::identity(),
        }
    }
}

impl<T> RestClient<T> {
    /// Install `transform` as the client's middleware, replacing the current
    /// one. It receives every request's pending [`Response`].
    pub fn middleware<U, F, Fut>(self, transform: F) -> RestClient<U>
    where
        F: Fn(ResponseFuture) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<U, Error>> + Send + 'static,
    {
        RestClient {
            config: self.config,
            transport: self.transport,
            registry: self.registry,
            middleware: middleware::chain(transform),
        }
    }

    pub fn get(&self, endpoint: &str) -> ResponseFuture<T> {
        self.get_with(endpoint, &(), RequestOptions::default())
    }

    /// GET with `query` appended to the endpoint as a query string.
    pub fn get_with<Q>(
        &self,
        endpoint: &str,
        query: &Q,
        options: impl Into<Source<RequestOptions>>,
    ) -> ResponseFuture<T>
    where
        Q: Serialize + ?Sized,
    {
        match query::encode(query) {
            Ok(query) => self.request(
                HttpMethod::Get,
                &format!("{endpoint}{query}"),
                Payload::Empty,
                options.into(),
            ),
            Err(err) => (self.middleware)(future::ready(Err(err)).boxed()),
        }
    }

    pub fn post(&self, endpoint: &str, payload: impl Into<Payload>) -> ResponseFuture<T> {
        self.post_with(endpoint, payload, RequestOptions::default())
    }

    pub fn post_with(
        &self,
        endpoint: &str,
        payload: impl Into<Payload>,
        options: impl Into<Source<RequestOptions>>,
    ) -> ResponseFuture<T> {
        self.request(HttpMethod::Post, endpoint, payload.into(), options.into())
    }

    pub fn put(&self, endpoint: &str, payload: impl Into<Payload>) -> ResponseFuture<T> {
        self.put_with(endpoint, payload, RequestOptions::default())
    }

    pub fn put_with(
        &self,
        endpoint: &str,
        payload: impl Into<Payload>,
        options: impl Into<Source<RequestOptions>>,
    ) -> ResponseFuture<T> {
        self.request(HttpMethod::Put, endpoint, payload.into(), options.into())
    }

    pub fn patch(&self, endpoint: &str, payload: impl Into<Payload>) -> ResponseFuture<T> {
        self.patch_with(endpoint, payload, RequestOptions::default())
    }

    pub fn patch_with(
        &self,
        endpoint: &str,
        payload: impl Into<Payload>,
        options: impl Into<Source<RequestOptions>>,
    ) -> ResponseFuture<T> {
        self.request(HttpMethod::Patch, endpoint, payload.into(), options.into())
    }

    pub fn delete(&self, endpoint: &str, payload: impl Into<Payload>) -> ResponseFuture<T> {
        self.delete_with(endpoint, payload, RequestOptions::default())
    }

    pub fn delete_with(
        &self,
        endpoint: &str,
        payload: impl Into<Payload>,
        options: impl Into<Source<RequestOptions>>,
    ) -> ResponseFuture<T> {
        self.request(HttpMethod::Delete, endpoint, payload.into(), options.into())
    }

    /// A fresh token for grouping requests. Nothing is registered until a
    /// request uses it.
    pub fn abort_token(&self) -> AbortToken {
        self.registry.issue()
    }

    /// Abort every in-flight request registered under `token`.
    ///
    /// Fails with [`Error::UnknownToken`] if no request is registered under
    /// it, including when they have all finished.
    pub fn abort(&self, token: &AbortToken) -> Result<(), Error> {
        self.registry.cancel(token)
    }

    /// Whether any request is still registered under `token`.
    ///
    /// `abort(token)` succeeds exactly when this is `true`.
    pub fn is_pending(&self, token: &AbortToken) -> bool {
        self.registry.is_registered(token)
    }

    fn request(
        &self,
        method: HttpMethod,
        endpoint: &str,
        payload: Payload,
        options: Source<RequestOptions>,
    ) -> ResponseFuture<T> {
        (self.middleware)(self.dispatch(method, endpoint, payload, options))
    }

    fn dispatch(
        &self,
        method: HttpMethod,
        endpoint: &str,
        payload: Payload,
        options: Source<RequestOptions>,
    ) -> ResponseFuture {
        let EffectiveConfig {
            api_url,
            headers,
            fetch,
            timeout,
            abort_token,
        } = merge(self.config.resolve(), options.resolve());

        let body = match payload.into_body() {
            Ok(body) => body,
            Err(err) => return future::ready(Err(err)).boxed(),
        };

        let registration = if abort_token.is_some() || timeout.is_some() {
            let token = abort_token.unwrap_or_else(|| self.registry.issue());
            Some(self.registry.register(token))
        } else {
            None
        };

        // The timer counts from the call. Without a runtime it starts on first poll.
        let mut deferred_timer = None;
        if let (Some(registration), Some(timeout)) = (&registration, timeout) {
            let token = registration.token().clone();
            if tokio::runtime::Handle::try_current().is_ok() {
                self.registry.cancel_after(token, timeout);
            } else {
                deferred_timer = Some((token, timeout));
            }
        }

        let request = HttpRequest {
            method,
            url: format!("{api_url}{endpoint}"),
            headers: headers.unwrap_or_default().into_iter().collect(),
            body,
            options: fetch,
        };
        let transport = Arc::clone(&self.transport);
        let registry = Arc::clone(&self.registry);

        async move {
            tracing::debug!(method = %request.method, url = %request.url, "dispatching request");

            let result = match registration {
                Some(registration) => {
                    if let Some((token, timeout)) = deferred_timer {
                        registry.cancel_after(token, timeout);
                    }
                    registration.guard(transport.send(request)).await
                }
                None => transport.send(request).await,
            };

            match result {
                Ok(raw) => Ok(Response::from(raw)),
                Err(err) if err.is_aborted() => {
                    tracing::debug!("{}", err);
                    Err(err)
                }
                Err(err) => {
                    tracing::warn!("Http transport error: {}", err);
                    Err(err)
                }
            }
        }
        .boxed()
    }
}

impl<T> Clone for RestClient<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            transport: Arc::clone(&self.transport),
            registry: Arc::clone(&self.registry),
            middleware: Arc::clone(&self.middleware),
        }
    }
}

impl<T> fmt::Debug for RestClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("config", &self.config)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::body::Body;
    use crate::http::HttpResponse;
    use crate::options::FetchOptions;

    #[derive(Debug, Clone)]
    enum Reply {
        Status(u16, Option<&'static str>),
        Fail,
        Hang,
    }

    /// Records every request and answers with a fixed reply.
    #[derive(Debug, Clone)]
    struct MockTransport {
        reply: Reply,
        requests: Arc<Mutex<Vec<HttpRequest>>>,
    }

    impl MockTransport {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn last(&self) -> HttpRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
            self.requests.lock().unwrap().push(request);
            match self.reply {
                Reply::Status(status, body) => Ok(HttpResponse {
                    status,
                    headers: Vec::new(),
                    body: body.map(|b| b.as_bytes().to_vec()),
                }),
                Reply::Fail => Err(Error::Transport("Network request failed.".to_string())),
                Reply::Hang => std::future::pending().await,
            }
        }
    }

    fn client(reply: Reply) -> (RestClient, MockTransport) {
        let transport = MockTransport::new(reply);
        let client = RestClient::with_transport(
            ClientConfig::new("https://testapi.com"),
            transport.clone(),
        );
        (client, transport)
    }

    fn tagging(name: &'static str) -> impl Fn(ResponseFuture) -> ResponseFuture + Send + Sync {
        move |pending| {
            async move {
                let mut response = pending.await?;
                if let Body::Json(Value::Object(map)) = &mut response.body {
                    map.insert(name.to_string(), Value::Bool(true));
                }
                Ok(response)
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn get_targets_base_url_and_endpoint() {
        let (client, transport) = client(Reply::Status(200, None));
        client.get("/users").await.unwrap();

        let request = transport.last();
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.url, "https://testapi.com/users");
        assert_eq!(request.body, None);
        assert_eq!(request.options, FetchOptions::default());
    }

    #[tokio::test]
    async fn get_appends_query_string() {
        let (client, transport) = client(Reply::Status(200, None));
        client
            .get_with(
                "/search",
                &json!({"limit": 20, "skip": 10, "sort": "desc"}),
                RequestOptions::default(),
            )
            .await
            .unwrap();

        let request = transport.last();
        assert_eq!(request.url, "https://testapi.com/search?limit=20&skip=10&sort=desc");
        assert_eq!(request.body, None);
    }

    #[tokio::test]
    async fn global_headers_are_sent() {
        let transport = MockTransport::new(Reply::Status(200, None));
        let client = RestClient::with_transport(
            ClientConfig::new("https://testapi.com")
                .header("Accept", "application/json")
                .header("Content-Type", "application/json"),
            transport.clone(),
        );
        client.get("/users").await.unwrap();

        let request = transport.last();
        assert_eq!(request.header("Accept"), Some("application/json"));
        assert_eq!(request.header("Content-Type"), Some("application/json"));
    }

    #[tokio::test]
    async fn local_options_override_global_ones() {
        let transport = MockTransport::new(Reply::Status(200, None));
        let client = RestClient::with_transport(
            ClientConfig::new("https://testapi.com")
                .header("Accept", "application/json")
                .header("Content-Type", "application/json"),
            transport.clone(),
        );
        client
            .get_with(
                "/users",
                &(),
                RequestOptions::new()
                    .api_url("https://superapi.com")
                    .header("Accept", "text/xml"),
            )
            .await
            .unwrap();

        let request = transport.last();
        assert_eq!(request.url, "https://superapi.com/users");
        assert_eq!(request.header("Accept"), Some("text/xml"));
        assert_eq!(request.header("Content-Type"), Some("application/json"));
    }

    #[tokio::test]
    async fn config_producer_is_read_per_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let transport = MockTransport::new(Reply::Status(200, None));
        let client = RestClient::with_transport(
            Source::producer(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                ClientConfig::new("https://testapi.com").header("Authorization", format!("token-{n}"))
            }),
            transport.clone(),
        );

        client.get("/me").await.unwrap();
        assert_eq!(transport.last().header("Authorization"), Some("token-1"));
        client.get("/me").await.unwrap();
        assert_eq!(transport.last().header("Authorization"), Some("token-2"));
    }

    #[tokio::test]
    async fn options_producer_is_accepted() {
        let (client, transport) = client(Reply::Status(200, None));
        client
            .post_with(
                "/users",
                (),
                Source::producer(|| RequestOptions::new().header("X-Request", "fresh")),
            )
            .await
            .unwrap();
        assert_eq!(transport.last().header("X-Request"), Some("fresh"));
    }

    #[tokio::test]
    async fn json_payload_is_serialized() {
        let (client, transport) = client(Reply::Status(200, None));
        client.post("/users", json!({"userId": 214121})).await.unwrap();

        let request = transport.last();
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.body.as_deref(), Some(r#"{"userId":214121}"#));
    }

    #[tokio::test]
    async fn text_payload_passes_through() {
        let (client, transport) = client(Reply::Status(200, None));
        let payload = "userid=214121&paid=true&registered=true";
        client.put("/users/1", payload).await.unwrap();
        assert_eq!(transport.last().body.as_deref(), Some(payload));
    }

    #[tokio::test]
    async fn missing_payload_sends_no_body() {
        let (client, transport) = client(Reply::Status(204, None));
        client.delete("/users/1", ()).await.unwrap();

        let request = transport.last();
        assert_eq!(request.method, HttpMethod::Delete);
        assert_eq!(request.body, None);

        client.patch("/users/1", Value::Null).await.unwrap();
        assert_eq!(transport.last().method, HttpMethod::Patch);
        assert_eq!(transport.last().body, None);
    }

    #[tokio::test]
    async fn json_response_is_parsed() {
        let (client, _) = client(Reply::Status(200, Some(r#"{"data":"12345"}"#)));
        let response = client.get("/users").await.unwrap();
        assert!(response.success);
        assert_eq!(response.status, 200);
        assert_eq!(response.body, Body::Json(json!({"data": "12345"})));
    }

    #[tokio::test]
    async fn unsuccessful_status_is_a_response() {
        let (client, _) = client(Reply::Status(404, None));
        let response = client.get("/users/2617281").await.unwrap();
        assert_eq!(
            response,
            Response {
                success: false,
                status: 404,
                body: Body::Null,
            }
        );

        let (client, _) = self::client(Reply::Status(404, Some("Not Found")));
        let response = client.get("/users/2617281").await.unwrap();
        assert_eq!(response.body, Body::Text("Not Found".to_string()));
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let (client, _) = client(Reply::Fail);
        let err = client.get("/users").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn abort_cancels_every_request_sharing_a_token() {
        let (client, _) = client(Reply::Hang);
        let token = client.abort_token();
        let options = RequestOptions::new().abort_token(token.clone());

        let first = tokio::spawn(client.get_with("/a", &(), options.clone()));
        let second = tokio::spawn(client.post_with("/b", json!({"x": 1}), options));
        tokio::task::yield_now().await;
        assert!(client.is_pending(&token));

        client.abort(&token).unwrap();
        assert!(!client.is_pending(&token));

        for handle in [first, second] {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, Error::Aborted { token: t } if t == token));
        }
        assert!(matches!(client.abort(&token), Err(Error::UnknownToken(_))));
    }

    #[tokio::test]
    async fn abort_applies_before_first_poll() {
        let (client, transport) = client(Reply::Hang);
        let token = client.abort_token();
        let pending = client.get_with("/a", &(), RequestOptions::new().abort_token(token.clone()));

        client.abort(&token).unwrap();
        assert!(pending.await.unwrap_err().is_aborted());
        assert!(transport.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn finished_request_releases_its_token() {
        let (client, _) = client(Reply::Status(200, None));
        let token = client.abort_token();
        client
            .get_with("/a", &(), RequestOptions::new().abort_token(token.clone()))
            .await
            .unwrap();

        assert!(!client.is_pending(&token));
        let err = client.abort(&token).unwrap_err();
        assert_eq!(err.to_string(), format!("unknown abort token: {token}"));
    }

    #[tokio::test]
    async fn failed_request_releases_its_token() {
        let (client, _) = client(Reply::Fail);
        let token = AbortToken::from("custom");
        let options = RequestOptions::new().abort_token(token.clone());
        assert!(client.get_with("/a", &(), options).await.is_err());
        assert!(!client.is_pending(&token));
    }

    #[tokio::test]
    async fn dropped_request_releases_its_token() {
        let (client, _) = client(Reply::Hang);
        let token = client.abort_token();
        let pending = client.get_with("/a", &(), RequestOptions::new().abort_token(token.clone()));
        assert!(client.is_pending(&token));
        drop(pending);
        assert!(!client.is_pending(&token));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_aborts_request() {
        let (client, _) = client(Reply::Hang);
        let err = client
            .get_with("/slow", &(), RequestOptions::new().timeout(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(err.is_aborted());
    }

    #[tokio::test(start_paused = true)]
    async fn global_timeout_applies() {
        let transport = MockTransport::new(Reply::Hang);
        let client = RestClient::with_transport(
            ClientConfig::new("https://testapi.com").timeout(Duration::from_millis(250)),
            transport,
        );
        let started = tokio::time::Instant::now();
        assert!(client.get("/slow").await.unwrap_err().is_aborted());
        assert!(started.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_from_the_call_not_the_first_poll() {
        let (client, _) = client(Reply::Hang);
        let pending =
            client.get_with("/slow", &(), RequestOptions::new().timeout(Duration::from_millis(100)));

        tokio::time::sleep(Duration::from_millis(500)).await;
        let polled = tokio::time::Instant::now();
        assert!(pending.await.unwrap_err().is_aborted());
        assert_eq!(polled.elapsed(), Duration::ZERO);
    }

    #[test]
    fn timeout_built_outside_a_runtime_starts_on_first_poll() {
        let (client, _) = client(Reply::Hang);
        let pending =
            client.get_with("/slow", &(), RequestOptions::new().timeout(Duration::from_millis(100)));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        runtime.block_on(async {
            let polled = tokio::time::Instant::now();
            assert!(pending.await.unwrap_err().is_aborted());
            assert!(polled.elapsed() >= Duration::from_millis(100));
        });
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_after_completion_is_harmless() {
        let (client, _) = client(Reply::Status(200, None));
        let token = client.abort_token();
        let options = RequestOptions::new()
            .abort_token(token.clone())
            .timeout(Duration::from_millis(100));

        let response = client.get_with("/fast", &(), options).await.unwrap();
        assert!(response.success);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!client.is_pending(&token));
        assert!(matches!(client.abort(&token), Err(Error::UnknownToken(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_cancels_whole_token_group() {
        let (client, _) = client(Reply::Hang);
        let token = client.abort_token();
        let plain = client.get_with("/a", &(), RequestOptions::new().abort_token(token.clone()));
        let timed = client.get_with(
            "/b",
            &(),
            RequestOptions::new()
                .abort_token(token.clone())
                .timeout(Duration::from_millis(50)),
        );

        let (plain, timed) = tokio::join!(plain, timed);
        assert!(plain.unwrap_err().is_aborted());
        assert!(timed.unwrap_err().is_aborted());
    }

    #[tokio::test]
    async fn middleware_reshapes_every_response() {
        let (client, _) = client(Reply::Status(200, Some(r#"{"id":1}"#)));
        let client = client.middleware(tagging("fromMiddleware"));

        for _ in 0..2 {
            let response = client.get("/users/1").await.unwrap();
            assert_eq!(response.body, Body::Json(json!({"id": 1, "fromMiddleware": true})));
        }
    }

    #[tokio::test]
    async fn second_middleware_replaces_first() {
        let (client, _) = client(Reply::Status(200, Some(r#"{"id":1}"#)));
        let client = client.middleware(tagging("first")).middleware(tagging("second"));

        let response = client.get("/users/1").await.unwrap();
        assert_eq!(response.body, Body::Json(json!({"id": 1, "second": true})));
    }

    #[tokio::test]
    async fn middleware_can_change_result_type() {
        let (client, _) = client(Reply::Status(201, None));
        let client = client.middleware(|pending| async move { pending.await.map(|r| r.status) });
        assert_eq!(client.post("/users", json!({})).await.unwrap(), 201);
    }

    #[tokio::test]
    async fn middleware_can_recover_from_transport_failure() {
        let (client, _) = client(Reply::Fail);
        let client = client.middleware(|pending| async move {
            Ok(pending.await.unwrap_or(Response {
                success: false,
                status: 0,
                body: Body::Null,
            }))
        });
        let response = client.get("/users").await.unwrap();
        assert_eq!(response.status, 0);
    }

    #[tokio::test]
    async fn middleware_can_rethrow() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let (client, _) = client(Reply::Fail);
        let client = client.middleware(move |pending| {
            let counter = Arc::clone(&counter);
            async move {
                pending.await.map_err(|err| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Error::Custom(format!("logged: {err}"))
                })
            }
        });

        let err = client.get("/users").await.unwrap_err();
        assert_eq!(err.to_string(), "logged: transport error: Network request failed.");
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_query_goes_through_middleware() {
        let (client, transport) = client(Reply::Status(200, None));
        let client = client.middleware(|pending| async move {
            match pending.await {
                Err(Error::Serialization(_)) => Ok(-1),
                other => other.map(|r| i32::from(r.status)),
            }
        });
        assert_eq!(client.get_with("/x", &[1, 2], RequestOptions::new()).await.unwrap(), -1);
        assert!(transport.requests.lock().unwrap().is_empty());
    }
}
