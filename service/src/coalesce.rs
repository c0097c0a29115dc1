//! Request coalescing: at most one computation per key is in flight, and everybody who asks for
//! the key while it runs gets a copy of its result.
//!
//! This does not cache anything once the computation is over. Owners that want a value to stick
//! store the result themselves and check their copy before asking again.

use futures::future::{BoxFuture, FutureExt, Shared};
use futures::lock::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

pub struct Coalescer<K, V> {
    inflight: Mutex<HashMap<K, Shared<BoxFuture<'static, V>>>>,
}

impl<K, V> Coalescer<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Join the computation in flight for `key`, or start one with `compute`.
    ///
    /// The computation is driven by whoever awaits it, so it keeps going as long as at least one
    /// caller is still waiting.
    pub async fn get_or_compute<F, Fut>(&self, key: K, compute: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let shared = {
            let mut inflight = self.inflight.lock().await;
            match inflight.get(&key) {
                Some(shared) => shared.clone(),
                None => {
                    let shared = compute().boxed().shared();
                    inflight.insert(key.clone(), shared.clone());
                    shared
                }
            }
        };

        let value = shared.clone().await;

        let mut inflight = self.inflight.lock().await;
        let finished = inflight
            .get(&key)
            .map_or(false, |current| current.ptr_eq(&shared));
        if finished {
            inflight.remove(&key);
        }
        value
    }

    pub async fn in_flight(&self) -> usize {
        self.inflight.lock().await.len()
    }
}

impl<K, V> Default for Coalescer<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
