//! Reference data cache.
//!
//! Statuses and users are fetched lazily with the admin key and memoized for
//! the lifetime of the cache. Each list is a single-flight cell: callers that
//! arrive while the first fetch is in flight await that fetch instead of
//! issuing their own. A failed fetch leaves the cell empty, so the next
//! caller starts over.
//!
//! Populated lists are never mutated. [`ReferenceCache::reset`] swaps in
//! fresh cells; callers still awaiting an old cell finish against it.

use crate::client::TrackerClient;
use crate::error::Result;
use crate::model::{ReferenceData, Status, User};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;
use tracing::debug;

type Cell<T> = Arc<OnceCell<Arc<Vec<T>>>>;

/// Process-wide memo of the tracker's statuses and users.
#[derive(Debug, Default)]
pub struct ReferenceCache {
    statuses: Mutex<Cell<Status>>,
    users: Mutex<Cell<User>>,
}

fn current<T>(slot: &Mutex<Cell<T>>) -> Cell<T> {
    Arc::clone(&slot.lock().unwrap_or_else(PoisonError::into_inner))
}

fn replace<T>(slot: &Mutex<Cell<T>>) {
    let mut guard: MutexGuard<'_, Cell<T>> = slot.lock().unwrap_or_else(PoisonError::into_inner);
    *guard = Arc::new(OnceCell::new());
}

impl ReferenceCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All issue statuses, fetched on first use.
    ///
    /// # Errors
    ///
    /// Returns the classified fetch failure; nothing is cached in that case.
    pub async fn statuses(&self, client: &TrackerClient) -> Result<Arc<Vec<Status>>> {
        let cell = current(&self.statuses);
        let statuses = cell
            .get_or_try_init(|| async {
                let statuses = client.statuses().await?;
                debug!(count = statuses.len(), "Fetched Statuses");
                Ok::<_, crate::error::ClassifiedError>(Arc::new(statuses))
            })
            .await?;
        Ok(Arc::clone(statuses))
    }

    /// All users, fetched on first use.
    ///
    /// # Errors
    ///
    /// Returns the classified fetch failure; nothing is cached in that case.
    pub async fn users(&self, client: &TrackerClient) -> Result<Arc<Vec<User>>> {
        let cell = current(&self.users);
        let users = cell
            .get_or_try_init(|| async {
                let users = client.users().await?;
                debug!(count = users.len(), "Fetched Users");
                Ok::<_, crate::error::ClassifiedError>(Arc::new(users))
            })
            .await?;
        Ok(Arc::clone(users))
    }

    /// Both lists, fetching whichever is missing concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first classified fetch failure.
    pub async fn load(&self, client: &TrackerClient) -> Result<ReferenceData> {
        let (statuses, users) = tokio::try_join!(self.statuses(client), self.users(client))?;
        Ok(ReferenceData {
            statuses: statuses.as_ref().clone(),
            users: users.as_ref().clone(),
        })
    }

    /// Both lists if both are already populated; never fetches.
    #[must_use]
    pub fn snapshot(&self) -> Option<ReferenceData> {
        let statuses = current(&self.statuses);
        let users = current(&self.users);
        Some(ReferenceData {
            statuses: statuses.get()?.as_ref().clone(),
            users: users.get()?.as_ref().clone(),
        })
    }

    /// Whether both lists are populated.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        current(&self.statuses).initialized() && current(&self.users).initialized()
    }

    /// Forget both lists; the next lookup refetches them.
    pub fn reset(&self) {
        replace(&self.statuses);
        replace(&self.users);
        debug!("Reference data cache reset");
    }
}
