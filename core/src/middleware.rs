//! The response transform installed on a client.
//!
//! A middleware receives the pending result of every request and returns a
//! pending value of its own choosing. It may recover from errors, log and
//! re-raise them, or reshape successful responses. A client holds exactly
//! one; installing another replaces it.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::Error;
use crate::response::Response;

/// A pending request result.
pub type ResponseFuture<T = Response> = BoxFuture<'static, Result<T, Error>>;

/// Type-erased middleware producing `T`.
pub(crate) type Chain<T> = Arc<dyn Fn(ResponseFuture) -> ResponseFuture<T> + Send + Sync>;

/// Returns the dispatcher's future untouched.
pub(crate) fn identity() -> Chain<Response> {
    Arc::new(|pending| pending)
}

pub(crate) fn chain<T, F, Fut>(transform: F) -> Chain<T>
where
    F: Fn(ResponseFuture) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, Error>> + Send + 'static,
{
    Arc::new(move |pending| transform(pending).boxed())
}

#[cfg(test)]
mod tests {
    use futures::future;

    use super::*;
    use crate::body::Body;

    fn ok_response() -> ResponseFuture {
        future::ready(Ok(Response {
            success: true,
            status: 200,
            body: Body::Null,
        }))
        .boxed()
    }

    #[tokio::test]
    async fn identity_passes_result_through() {
        let response = identity()(ok_response()).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn chain_can_recover_from_errors() {
        let recover = chain(|pending: ResponseFuture| async move {
            Ok::<_, Error>(pending.await.map(|r| r.status).unwrap_or(0))
        });
        let failed = future::ready(Err(Error::Transport("refused".to_string()))).boxed();
        assert_eq!(recover(failed).await.unwrap(), 0);
        assert_eq!(recover(ok_response()).await.unwrap(), 200);
    }
}
