//! Abort tokens shared between in-flight requests.
//!
//! # Design
//! An [`AbortRegistry`] maps each [`AbortToken`] to the cancellation handles
//! of the requests registered under it, in registration order. Aborting a
//! token removes its entry first and only then signals the handles, so the
//! token reads as unregistered as soon as `cancel` returns.
//!
//! Every handle is owned by a [`Registration`] guard. When the request
//! finishes (or its future is dropped) the guard removes its handle, and the
//! entry disappears with the last one. Cancelling a finished token therefore
//! reports [`Error::UnknownToken`].
//!
//! Timeout timers go through [`AbortRegistry::cancel_if_present`], which
//! treats an already-gone token as a no-op.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::id::UniqueIdFactory;

const TOKEN_PREFIX: &str = "fetch-rest-abort-";

/// Opaque key grouping requests for joint cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AbortToken(String);

impl AbortToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AbortToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AbortToken {
    fn from(token: &str) -> Self {
        AbortToken(token.to_string())
    }
}

impl From<String> for AbortToken {
    fn from(token: String) -> Self {
        AbortToken(token)
    }
}

#[derive(Debug)]
struct Handle {
    id: u64,
    signal: CancellationToken,
}

#[derive(Debug, Default)]
struct Entries {
    next_handle: u64,
    by_token: HashMap<AbortToken, Vec<Handle>>,
}

/// Registry of abort tokens for one client.
#[derive(Debug)]
pub struct AbortRegistry {
    ids: UniqueIdFactory,
    entries: Mutex<Entries>,
}

impl Default for AbortRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortRegistry {
    pub fn new() -> Self {
        Self {
            ids: UniqueIdFactory::new(TOKEN_PREFIX),
            entries: Mutex::new(Entries::default()),
        }
    }

    // Registry state stays consistent across a panic in a caller, so a
    // poisoned lock is safe to reuse.
    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A token that is not currently registered. Nothing is reserved.
    pub fn issue(&self) -> AbortToken {
        let entries = self.lock();
        loop {
            let token = AbortToken(self.ids.next_id());
            if !entries.by_token.contains_key(&token) {
                return token;
            }
        }
    }

    /// Add a new handle under `token`, creating the entry if needed.
    pub fn register(self: &Arc<Self>, token: AbortToken) -> Registration {
        let signal = CancellationToken::new();
        let mut entries = self.lock();
        entries.next_handle += 1;
        let id = entries.next_handle;
        entries
            .by_token
            .entry(token.clone())
            .or_default()
            .push(Handle {
                id,
                signal: signal.clone(),
            });
        drop(entries);

        tracing::trace!(%token, handle = id, "registered request");
        Registration {
            registry: Arc::downgrade(self),
            token,
            id,
            signal,
        }
    }

    /// Abort every request registered under `token`.
    ///
    /// Fails with [`Error::UnknownToken`] when nothing is registered.
    pub fn cancel(&self, token: &AbortToken) -> Result<(), Error> {
        if self.cancel_if_present(token) {
            Ok(())
        } else {
            Err(Error::UnknownToken(token.clone()))
        }
    }

    /// Abort `token` if it is registered. Returns whether anything was aborted.
    pub fn cancel_if_present(&self, token: &AbortToken) -> bool {
        let Some(handles) = self.lock().by_token.remove(token) else {
            return false;
        };

        tracing::debug!(%token, handles = handles.len(), "aborting requests");
        for handle in handles {
            handle.signal.cancel();
        }
        true
    }

    /// Abort `token` once `after` elapses. Must be called inside a tokio runtime.
    pub fn cancel_after(self: &Arc<Self>, token: AbortToken, after: Duration) {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let Some(registry) = registry.upgrade() else {
                return;
            };
            if registry.cancel_if_present(&token) {
                tracing::debug!(%token, ?after, "request timed out");
            } else {
                tracing::trace!(%token, "timeout fired after requests finished");
            }
        });
    }

    /// Whether any in-flight request is registered under `token`. A token
    /// reports `false` once its last request finishes or is aborted.
    pub fn is_registered(&self, token: &AbortToken) -> bool {
        self.lock().by_token.contains_key(token)
    }

    #[cfg(test)]
    fn handle_count(&self, token: &AbortToken) -> usize {
        self.lock().by_token.get(token).map_or(0, Vec::len)
    }

    fn release(&self, token: &AbortToken, id: u64) {
        let mut entries = self.lock();
        let Some(handles) = entries.by_token.get_mut(token) else {
            return;
        };
        handles.retain(|handle| handle.id != id);
        if handles.is_empty() {
            entries.by_token.remove(token);
        }
    }
}

/// One request's membership under an abort token.
///
/// Dropping the registration removes its handle from the registry.
#[derive(Debug)]
pub struct Registration {
    registry: Weak<AbortRegistry>,
    token: AbortToken,
    id: u64,
    signal: CancellationToken,
}

impl Registration {
    pub fn token(&self) -> &AbortToken {
        &self.token
    }

    pub fn is_aborted(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// Drive `operation` until it finishes or the token is aborted, whichever
    /// comes first. An aborted operation is dropped and yields [`Error::Aborted`].
    pub async fn guard<F, T>(self, operation: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        tokio::select! {
            biased;
            _ = self.signal.cancelled() => Err(Error::Aborted {
                token: self.token.clone(),
            }),
            result = operation => result,
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.release(&self.token, self.id);
        }
    }
}
