//! Deduplication of concurrent async calls by key.
//!
//! While a call for `key` is in flight, further calls for the same key
//! attach to it instead of starting a new one. The in-flight entry is
//! removed by the call itself when it settles, on success and on error
//! alike, so a later call after settlement starts fresh.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::error::{EmbedError, Result};

type SharedCall<V> = Shared<BoxFuture<'static, std::result::Result<V, Arc<EmbedError>>>>;
type CallFn<V> = dyn Fn(String) -> BoxFuture<'static, Result<V>> + Send + Sync;

pub struct UniqueAsync<V>
where
    V: Clone + Send + Sync + 'static,
{
    call: Arc<CallFn<V>>,
    in_flight: Arc<Mutex<HashMap<String, SharedCall<V>>>>,
}

impl<V> UniqueAsync<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(call: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        Self {
            call: Arc::new(move |key: String| -> BoxFuture<'static, Result<V>> { call(key).boxed() }),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run the call for `key`, or join the one already running.
    pub async fn call(&self, key: &str) -> Result<V> {
        let pending = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(key) {
                Some(pending) => pending.clone(),
                None => {
                    let pending = self.start(key);
                    in_flight.insert(key.to_string(), pending.clone());
                    pending
                }
            }
        };

        pending.await.map_err(EmbedError::Shared)
    }

    /// Number of keys currently in flight.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    fn start(&self, key: &str) -> SharedCall<V> {
        let call = (self.call)(key.to_string());
        let in_flight = Arc::clone(&self.in_flight);
        let key = key.to_string();

        async move {
            let outcome = call.await.map_err(Arc::new);
            lock(&in_flight).remove(&key);
            outcome
        }
        .boxed()
        .shared()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(calls: Arc<AtomicUsize>) -> UniqueAsync<String> {
        UniqueAsync::new(move |key: String| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok(format!("value-{key}"))
            }
        })
    }

    #[tokio::test]
    async fn unique_params_debounce() {
        let calls = Arc::new(AtomicUsize::new(0));
        let unique = counting(Arc::clone(&calls));

        let (a, b, c, d) = tokio::join!(
            unique.call("1"),
            unique.call("1"),
            unique.call("7"),
            unique.call("1")
        );

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(a.unwrap(), "value-1");
        assert_eq!(b.unwrap(), "value-1");
        assert_eq!(c.unwrap(), "value-7");
        assert_eq!(d.unwrap(), "value-1");
        assert_eq!(unique.in_flight(), 0);
    }

    #[tokio::test]
    async fn settled_key_starts_a_new_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let unique = counting(Arc::clone(&calls));

        unique.call("a").await.unwrap();
        unique.call("a").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn errors_reach_every_waiter_and_clear_the_entry() {
        let unique: UniqueAsync<u32> = UniqueAsync::new(|_key: String| async {
            tokio::task::yield_now().await;
            Err(EmbedError::Content("boom".into()))
        });

        let (a, b, c) = tokio::join!(unique.call("a"), unique.call("a"), unique.call("a"));
        for outcome in [a, b, c] {
            let err = outcome.unwrap_err();
            assert_eq!(err.code(), "ECONTENT");
            assert_eq!(err.to_string(), "boom");
        }
        assert_eq!(unique.in_flight(), 0);
    }
}
