//! Concurrent image-pull deduplication.
//!
//! At most one pull command per image reference is in flight at any instant:
//! the first caller for an image starts the actual pull, later callers
//! arriving while it is still running join it and receive the same outcome.
//! The entry is dropped once the pull settles, so the next call starts a
//! fresh pull.

use crate::error::{ClientError, Result};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

type SharedPull = Shared<BoxFuture<'static, std::result::Result<(), Arc<ClientError>>>>;

/// Deduplicates concurrent pull requests per image reference.
#[derive(Default)]
pub struct PullCache {
    in_flight: Arc<DashMap<String, SharedPull>>,
}

impl PullCache {
    /// Create an empty pull cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `pull` for `image`, joining an already-in-flight pull for the
    /// same image instead of starting a second one.
    ///
    /// # Errors
    ///
    /// Fails with the pull's error; callers that joined an in-flight pull
    /// see it wrapped in [`ClientError::Pull`].
    pub async fn pull_through<F, Fut>(&self, image: &str, pull: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let shared = match self.in_flight.entry(image.to_string()) {
            Entry::Occupied(entry) => {
                debug!(image, "joining in-flight pull");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let map = Arc::clone(&self.in_flight);
                let key = image.to_string();
                let work = pull();
                let shared = async move {
                    let result = work.await.map_err(Arc::new);
                    // Settle first, then clear the entry so a later call
                    // starts a fresh pull.
                    map.remove(&key);
                    result
                }
                .boxed()
                .shared();
                entry.insert(shared.clone());
                shared
            }
        };

        shared.await.map_err(ClientError::Pull)
    }

    /// Number of images with a pull currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
