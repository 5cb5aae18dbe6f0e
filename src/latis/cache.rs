//! # Deduplicating tabular data source
//!
//! [`TabularDataSource`] sits in front of a [`TabularFetcher`] and guarantees that identical
//! [`LatisQuery`] values share one underlying request, whether it is still in flight or
//! already resolved.
//!
//! Each call to [`TabularDataSource::fetch`] returns a [`DataRequest`], a future resolving to
//! the shared table. A request can be abandoned with [`DataRequest::abort`] (or simply by
//! dropping it). The underlying fetch is cancelled only once every handle sharing it has been
//! abandoned before completion; otherwise it continues for the remaining callers.
//!
//! Resolved entries are kept for the whole session. Failed and cancelled entries are removed
//! so that a later call can retry.

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use futures::{
    future::{abortable, AbortHandle, BoxFuture, Shared},
    FutureExt,
};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    latis::{LatisQuery, TabularFetcher, TabularResult},
    maven_errors::MavenError,
};

pub type TableOutcome = Result<Arc<TabularResult>, MavenError>;

type SharedFetch = Shared<BoxFuture<'static, TableOutcome>>;

struct CacheEntry {
    id: u64,
    future: SharedFetch,
    abort: AbortHandle,
    live_handles: usize,
}

type Entries = Arc<Mutex<HashMap<LatisQuery, CacheEntry>>>;

pub struct TabularDataSource {
    fetcher: Arc<dyn TabularFetcher>,
    entries: Entries,
    next_id: AtomicU64,
}

impl std::fmt::Debug for TabularDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabularDataSource")
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

impl TabularDataSource {
    pub fn new(fetcher: Arc<dyn TabularFetcher>) -> Self {
        TabularDataSource {
            fetcher,
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Request a table, joining the pending or resolved request for the same query if any.
    ///
    /// Arguments
    /// ---------
    /// * `query`: dataset, format, selection and filters of the request
    ///
    /// Return
    /// ------
    /// * a [`DataRequest`] handle; awaiting it yields the shared table
    pub fn fetch(&self, query: LatisQuery) -> DataRequest {
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get_mut(&query) {
            entry.live_handles += 1;
            debug!(dataset = %query.dataset, live = entry.live_handles, "joining cached request");
            return DataRequest {
                id: entry.id,
                future: entry.future.clone(),
                query,
                entries: self.entries.clone(),
                finished: false,
            };
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let fetcher = self.fetcher.clone();
        let fetch_query = query.clone();
        let (request, abort) = abortable(async move {
            fetcher.fetch_table(&fetch_query).await.map(Arc::new)
        });
        let future: SharedFetch = request
            .map(|outcome| outcome.unwrap_or(Err(MavenError::Aborted)))
            .boxed()
            .shared();

        entries.insert(
            query.clone(),
            CacheEntry {
                id,
                future: future.clone(),
                abort,
                live_handles: 1,
            },
        );

        DataRequest {
            id,
            future,
            query,
            entries: self.entries.clone(),
            finished: false,
        }
    }

    /// Number of queries currently held (pending or resolved)
    pub fn cached_len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn contains(&self, query: &LatisQuery) -> bool {
        self.entries.lock().contains_key(query)
    }
}

/// One caller's handle on a possibly shared request.
///
/// Dropping an unfinished handle counts as [`abort`](DataRequest::abort).
#[must_use = "a DataRequest does nothing unless awaited"]
pub struct DataRequest {
    id: u64,
    future: SharedFetch,
    query: LatisQuery,
    entries: Entries,
    finished: bool,
}

impl DataRequest {
    pub fn query(&self) -> &LatisQuery {
        &self.query
    }

    /// Give up on this request. The underlying fetch is cancelled if no other caller is
    /// still waiting on it.
    pub fn abort(self) {
        drop(self)
    }

    /// Drop this handle's share of the entry. `resolved` is set once the handle has seen the
    /// outcome: its own `Shared` clone no longer holds it, so the entry's copy is checked too.
    fn release(&mut self, resolved: bool) {
        if self.finished {
            return;
        }
        self.finished = true;

        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&self.query) else {
            return;
        };
        if entry.id != self.id {
            return;
        }
        entry.live_handles = entry.live_handles.saturating_sub(1);
        if entry.live_handles == 0 && !resolved && entry.future.peek().is_none() {
            entry.abort.abort();
            entries.remove(&self.query);
            warn!(dataset = %self.query.dataset, "request aborted by every caller");
        }
    }

    fn evict_failed(&self) {
        let mut entries = self.entries.lock();
        if entries.get(&self.query).is_some_and(|entry| entry.id == self.id) {
            entries.remove(&self.query);
        }
    }
}

impl Future for DataRequest {
    type Output = TableOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let outcome = match self.future.poll_unpin(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(outcome) => outcome,
        };
        if let Err(err) = &outcome {
            debug!(dataset = %self.query.dataset, %err, "request failed, evicting");
            self.evict_failed();
        }
        self.release(true);
        Poll::Ready(outcome)
    }
}

impl Drop for DataRequest {
    fn drop(&mut self) {
        self.release(false);
    }
}
