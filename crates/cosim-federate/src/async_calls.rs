//! AsyncCallCoordinator - Holder for in-flight background operations
//!
//! Each `*_async` call of a federate spawns one background thread that runs
//! the blocking Core call and reports back over a channel. The coordinator
//! keeps one slot per operation kind plus a table of in-flight queries.
//!
//! The coordinator enforces nothing on its own: the federate's atomic state
//! transitions guarantee that at most one lifecycle or time operation is
//! outstanding, so a slot is only written while its pending state is held.
//!
//! # Example
//!
//! ```
//! use cosim_federate::Pending;
//!
//! let mut pending = Pending::spawn("answer", || 6 * 7).unwrap();
//! while !pending.is_ready() {
//!     std::thread::yield_now();
//! }
//! assert_eq!(pending.join().unwrap(), 42);
//! ```

use crate::sync::lock;
use cosim_core::{Core, Error, IterationResult, IterationTime, QueryId, Result, Time};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::debug;

/// Sentinel returned when completing an unknown query
pub const INVALID_QUERY: &str = "#invalid";

/// How long a finished query waits for `query_complete` before it is dropped
pub const QUERY_RETENTION: Duration = Duration::from_secs(300);

/// A value being computed on a background thread
///
/// `is_ready` polls without blocking and caches the value once it arrives;
/// `join` blocks until it does.
pub struct Pending<T> {
    name: String,
    rx: Receiver<T>,
    ready: Option<T>,
    lost: bool,
    handle: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Pending<T> {
    /// Run `task` on a new thread
    pub fn spawn<F>(name: &str, task: F) -> Result<Self>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name(format!("cosim-{}", name))
            .spawn(move || {
                // the receiver may already be gone if the federate was dropped
                let _ = tx.send(task());
            })
            .map_err(|e| Error::AsyncTaskLost(format!("{}: {}", name, e)))?;

        Ok(Self {
            name: name.to_string(),
            rx,
            ready: None,
            lost: false,
            handle: Some(handle),
        })
    }
}

impl<T> Pending<T> {
    /// Non-blocking check for completion
    ///
    /// A task that died without reporting counts as complete; `join` then
    /// returns the failure.
    pub fn is_ready(&mut self) -> bool {
        if self.ready.is_some() || self.lost {
            return true;
        }
        match self.rx.try_recv() {
            Ok(value) => {
                self.ready = Some(value);
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.lost = true;
                true
            }
        }
    }

    /// Block until the task finishes and take its value
    pub fn join(mut self) -> Result<T> {
        let value = match self.ready.take() {
            Some(value) => Ok(value),
            None => self
                .rx
                .recv()
                .map_err(|_| Error::AsyncTaskLost(format!("{} ended without a result", self.name))),
        };
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        value
    }
}

impl<T> std::fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pending")
            .field("name", &self.name)
            .field("ready", &self.ready.is_some())
            .finish()
    }
}

/// Outcome of an asynchronous entry into executing mode
///
/// When started from startup the task also enters initializing mode, and
/// the federate runs its initialization hook once the result is collected.
#[derive(Debug)]
pub(crate) struct ExecAttempt {
    pub(crate) from_startup: bool,
    pub(crate) initialized: bool,
    pub(crate) result: Result<IterationResult>,
}

/// A single optional in-flight operation
#[derive(Debug)]
pub(crate) struct Slot<T>(Mutex<Option<Pending<T>>>);

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self(Mutex::new(None))
    }
}

impl<T> Slot<T> {
    /// Hold the slot while a pending state is entered and its task spawned
    pub(crate) fn guard(&self) -> MutexGuard<'_, Option<Pending<T>>> {
        lock(&self.0)
    }

    pub(crate) fn take(&self) -> Option<Pending<T>> {
        lock(&self.0).take()
    }

    pub(crate) fn is_ready(&self) -> bool {
        lock(&self.0).as_mut().map(Pending::is_ready).unwrap_or(false)
    }
}

/// Pending futures of one federate
///
/// Queries started with `query_async` and never completed are dropped once
/// they have finished and are older than the retention age, so the table
/// stays bounded.
#[derive(Debug)]
pub struct AsyncCallCoordinator {
    pub(crate) init: Slot<Result<()>>,
    pub(crate) exec: Slot<ExecAttempt>,
    pub(crate) time: Slot<Result<Time>>,
    pub(crate) iterative: Slot<Result<IterationTime>>,
    pub(crate) finalize: Slot<Result<()>>,
    queries: Mutex<HashMap<QueryId, (Instant, Pending<String>)>>,
    next_query: AtomicU64,
    query_retention: Duration,
}

impl Default for AsyncCallCoordinator {
    fn default() -> Self {
        Self::with_query_retention(QUERY_RETENTION)
    }
}

impl AsyncCallCoordinator {
    /// Create a coordinator with nothing in flight
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a coordinator that drops uncollected queries after `retention`
    pub fn with_query_retention(retention: Duration) -> Self {
        Self {
            init: Slot::default(),
            exec: Slot::default(),
            time: Slot::default(),
            iterative: Slot::default(),
            finalize: Slot::default(),
            queries: Mutex::new(HashMap::new()),
            next_query: AtomicU64::new(0),
            query_retention: retention,
        }
    }

    /// Start a query on a background thread and return its id
    pub fn query_async(&self, core: Arc<dyn Core>, target: &str, query: &str) -> Result<QueryId> {
        let id = QueryId(self.next_query.fetch_add(1, Ordering::Relaxed));
        let (target, query) = (target.to_string(), query.to_string());
        debug!(%id, %target, %query, "query_async");
        let pending = Pending::spawn("query", move || core.query(&target, &query))?;
        let mut queries = lock(&self.queries);
        self.prune_queries(&mut queries);
        queries.insert(id, (Instant::now(), pending));
        Ok(id)
    }

    fn prune_queries(&self, queries: &mut HashMap<QueryId, (Instant, Pending<String>)>) {
        let retention = self.query_retention;
        queries.retain(|id, (started, pending)| {
            let stale = started.elapsed() >= retention && pending.is_ready();
            if stale {
                debug!(%id, "dropping uncollected query");
            }
            !stale
        });
    }

    /// Block on a query and remove it
    ///
    /// Unknown or expired ids answer [`INVALID_QUERY`].
    pub fn query_complete(&self, id: QueryId) -> String {
        let pending = lock(&self.queries).remove(&id);
        match pending {
            Some((_, pending)) => pending.join().unwrap_or_else(|e| {
                debug!(%id, error = %e, "query task lost");
                INVALID_QUERY.to_string()
            }),
            None => INVALID_QUERY.to_string(),
        }
    }

    /// Non-blocking check for a query result; unknown ids are not complete
    pub fn is_query_completed(&self, id: QueryId) -> bool {
        lock(&self.queries)
            .get_mut(&id)
            .map(|(_, pending)| pending.is_ready())
            .unwrap_or(false)
    }

    /// Number of queries not yet completed
    pub fn queries_in_flight(&self) -> usize {
        lock(&self.queries).len()
    }
}
