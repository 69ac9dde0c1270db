//! Task coalescing for concurrent lookups.
//!
//! N concurrent calls over overlapping id sets issue at most one handler
//! invocation per missing id. Callers resolve as soon as *their* ids are
//! satisfied; ids never returned by the handler are silently omitted from
//! results; a failed batch releases its ids for later retries.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use futures::channel::oneshot;
use futures::future::{Future, Shared};
use futures::FutureExt;

use crate::error::{Error, ErrorKind, Result};

type SharedResult<V> = std::result::Result<Option<V>, Arc<Error>>;
type PendingFuture<V> = Shared<oneshot::Receiver<SharedResult<V>>>;

pub struct TaskCoalescer<I, V> {
    inner: Mutex<Inner<I, V>>,
}

struct Inner<I, V> {
    futures: HashMap<I, PendingFuture<V>>,
    senders: HashMap<I, oneshot::Sender<SharedResult<V>>>,
}

impl<I, V> Default for TaskCoalescer<I, V> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                futures: HashMap::new(),
                senders: HashMap::new(),
            }),
        }
    }
}

impl<I, V> TaskCoalescer<I, V>
where
    I: Clone + Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `ids` through `handler`, deduplicating against in-flight
    /// lookups. The handler only ever sees ids nobody else is fetching.
    /// The result preserves the order of `ids`, skipping ids the handler
    /// did not resolve.
    pub async fn run<H, F>(&self, handler: H, ids: &[I]) -> Result<Vec<V>>
    where
        H: FnOnce(Vec<I>) -> F,
        F: Future<Output = Result<Vec<(I, V)>>>,
    {
        let (missing, pending) = self.claim(ids);

        if !missing.is_empty() {
            let outcome = handler(missing.clone()).await;
            let senders = self.release(&missing);
            match outcome {
                Ok(values) => {
                    let mut by_id: HashMap<I, V> = values.into_iter().collect();
                    for (id, sender) in senders {
                        let _ = sender.send(Ok(by_id.remove(&id)));
                    }
                }
                Err(error) => {
                    let shared = Arc::new(error);
                    for (_, sender) in senders {
                        let _ = sender.send(Err(shared.clone()));
                    }
                }
            }
        }

        // Await every id in input order; futures are shared, so this only
        // blocks on lookups that are genuinely still in flight.
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let future = pending
                .get(id)
                .expect("every requested id has a pending future")
                .clone();
            match future.await {
                Ok(Ok(Some(value))) => results.push(value),
                Ok(Ok(None)) => {}
                Ok(Err(error)) => {
                    let mut propagated = Error::new(error.kind, error.message.clone());
                    propagated.server_code = error.server_code.clone();
                    return Err(propagated);
                }
                Err(_canceled) => {
                    return Err(Error::new(
                        ErrorKind::OperationCanceled,
                        "coalesced lookup was dropped",
                    ))
                }
            }
        }
        Ok(results)
    }

    /// Split `ids` into those this call must fetch itself and a map of the
    /// shared futures every requested id resolves through.
    #[allow(clippy::type_complexity)]
    fn claim(&self, ids: &[I]) -> (Vec<I>, HashMap<I, PendingFuture<V>>) {
        let mut inner = self.inner.lock().expect("coalescer mutex poisoned");
        let mut missing = Vec::new();
        let mut pending = HashMap::new();
        for id in ids {
            if pending.contains_key(id) {
                continue; // duplicate id within one call
            }
            let future = match inner.futures.get(id) {
                Some(future) => future.clone(),
                None => {
                    let (sender, receiver) = oneshot::channel();
                    let future = receiver.shared();
                    inner.futures.insert(id.clone(), future.clone());
                    inner.senders.insert(id.clone(), sender);
                    missing.push(id.clone());
                    future
                }
            };
            pending.insert(id.clone(), future);
        }
        (missing, pending)
    }

    /// Drop the batch from the in-flight set and hand back its senders.
    /// Later calls for the same ids will fetch again.
    fn release(&self, ids: &[I]) -> Vec<(I, oneshot::Sender<SharedResult<V>>)> {
        let mut inner = self.inner.lock().expect("coalescer mutex poisoned");
        ids.iter()
            .filter_map(|id| {
                inner.futures.remove(id);
                inner.senders.remove(id).map(|sender| (id.clone(), sender))
            })
            .collect()
    }
}
