//! Bounded-concurrency dispatch of asynchronous operations
//!
//! The dispatcher turns a stream of items into one spawned operation per item
//! while holding at most `max_in_flight` of them outstanding:
//! - Each item acquires a permit from a counting semaphore before its
//!   operation is created; the dispatch loop parks while none are free.
//! - Running operations are registered in a concurrent pending map.
//! - On completion (success, failure, timeout or panic) the entry is removed
//!   and the permit is released exactly once, via a drop guard.
//! - [`Drain`] waits until no registered operation is outstanding.

use dashmap::DashMap;
use futures::{FutureExt, Stream, StreamExt};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};

use crate::{Error, Result};

pub mod sink;

pub use sink::{FailureSink, LogFailures};

pub const DEFAULT_MAX_IN_FLIGHT: usize = 100;
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum number of operations outstanding at once
    pub max_in_flight: usize,
    /// Upper bound on a single operation's lifetime (`None` = unbounded)
    pub operation_timeout: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            operation_timeout: Some(DEFAULT_OPERATION_TIMEOUT),
        }
    }
}

impl DispatchConfig {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            max_in_flight,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }
}

/// An operation that has been started and has not finished yet
#[derive(Debug, Clone, Copy)]
pub struct PendingOperation {
    /// Position of the item in its input stream
    pub index: u64,
    pub started_at: Instant,
}

/// Cumulative operation counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl DispatchStats {
    /// Counts accumulated after `earlier` was taken
    pub fn since(&self, earlier: &DispatchStats) -> DispatchStats {
        DispatchStats {
            dispatched: self.dispatched.saturating_sub(earlier.dispatched),
            succeeded: self.succeeded.saturating_sub(earlier.succeeded),
            failed: self.failed.saturating_sub(earlier.failed),
        }
    }

    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed
    }
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// State touched by both the dispatch loop and completing operations
struct Shared {
    pending: DashMap<u64, PendingOperation>,
    in_flight: watch::Sender<usize>,
    counters: Counters,
}

/// Releases an operation's slot when dropped
struct InFlight {
    ticket: u64,
    shared: Arc<Shared>,
    permit: Option<OwnedSemaphorePermit>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.shared.pending.remove(&self.ticket);
        // Budget goes back before the count drops so a finished drain
        // always observes a fully released budget.
        drop(self.permit.take());
        self.shared.in_flight.send_modify(|n| *n -= 1);
    }
}

/// Fans a stream out into concurrently running operations, at most
/// `max_in_flight` at a time.
pub struct BoundedDispatcher {
    config: DispatchConfig,
    permits: Arc<Semaphore>,
    shared: Arc<Shared>,
    tickets: AtomicU64,
}

impl BoundedDispatcher {
    pub fn new(config: DispatchConfig) -> Result<Self> {
        if config.max_in_flight == 0 {
            return Err(Error::InvalidRequest(
                "max_in_flight must be at least 1".to_string(),
            ));
        }

        let (in_flight, _) = watch::channel(0);
        Ok(Self {
            permits: Arc::new(Semaphore::new(config.max_in_flight)),
            shared: Arc::new(Shared {
                pending: DashMap::new(),
                in_flight,
                counters: Counters::default(),
            }),
            tickets: AtomicU64::new(0),
            config,
        })
    }

    /// Dispatch one operation per item of `items`, in stream order.
    ///
    /// `factory` receives the item's zero-based position and the item, and
    /// returns the operation to run. The call parks whenever the budget is
    /// exhausted and returns once the stream ends; operations may still be
    /// running at that point, so await the returned [`Drain`] for completion.
    ///
    /// A stream error or a factory error stops consumption and is returned;
    /// operations already started keep running. Failures of the operations
    /// themselves go to `sink` and never abort the dispatch.
    pub async fn dispatch<S, T, F, Fut>(
        &self,
        items: S,
        mut factory: F,
        sink: impl FailureSink + 'static,
    ) -> Result<Drain>
    where
        S: Stream<Item = Result<T>>,
        F: FnMut(u64, T) -> Result<Fut>,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let sink: Arc<dyn FailureSink> = Arc::new(sink);
        let mut items = std::pin::pin!(items);
        let mut index = 0u64;

        while let Some(item) = items.next().await {
            let item = item?;

            let permit = self
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| Error::internal("dispatch budget closed"))?;

            // On error the permit is dropped here, before the error surfaces.
            let operation = factory(index, item).map_err(|e| Error::Dispatch {
                index,
                source: Box::new(e),
            })?;

            self.launch(index, operation, permit, sink.clone());
            index += 1;
        }

        tracing::debug!(dispatched = index, "Input stream exhausted");
        Ok(self.drain_handle())
    }

    fn launch<Fut>(
        &self,
        index: u64,
        operation: Fut,
        permit: OwnedSemaphorePermit,
        sink: Arc<dyn FailureSink>,
    ) where
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        self.shared.pending.insert(
            ticket,
            PendingOperation {
                index,
                started_at: Instant::now(),
            },
        );
        self.shared.in_flight.send_modify(|n| *n += 1);
        self.shared
            .counters
            .dispatched
            .fetch_add(1, Ordering::Relaxed);

        let guard = InFlight {
            ticket,
            shared: self.shared.clone(),
            permit: Some(permit),
        };
        let timeout = self.config.operation_timeout;

        tokio::spawn(async move {
            match run_operation(index, operation, timeout).await {
                Ok(()) => {
                    guard.shared.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                }
                Err(error) => {
                    guard.shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                    sink.record_failure(index, error);
                }
            }
            drop(guard);
        });
    }

    /// Handle for awaiting the operations outstanding at the time of the wait
    pub fn drain_handle(&self) -> Drain {
        Drain {
            in_flight: self.shared.in_flight.subscribe(),
        }
    }

    /// Wait until no operation is outstanding.
    pub async fn drain(&self) -> Result<()> {
        self.drain_handle().wait().await
    }

    /// Operations started and not yet finalized
    pub fn in_flight(&self) -> usize {
        *self.shared.in_flight.borrow()
    }

    /// Currently unused budget units
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn max_in_flight(&self) -> usize {
        self.config.max_in_flight
    }

    pub fn stats(&self) -> DispatchStats {
        let counters = &self.shared.counters;
        DispatchStats {
            dispatched: counters.dispatched.load(Ordering::Relaxed),
            succeeded: counters.succeeded.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Snapshot of the pending operations, ordered by start time
    pub fn pending_operations(&self) -> Vec<PendingOperation> {
        let mut pending: Vec<_> = self.shared.pending.iter().map(|e| *e.value()).collect();
        pending.sort_by_key(|op| op.started_at);
        pending
    }
}

async fn run_operation<Fut>(index: u64, operation: Fut, timeout: Option<Duration>) -> Result<()>
where
    Fut: Future<Output = Result<()>>,
{
    let guarded = AssertUnwindSafe(operation).catch_unwind();
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(Error::OperationTimeout {
                    index,
                    timeout: limit,
                })
            }
        },
        None => guarded.await,
    };

    outcome.unwrap_or(Err(Error::OperationPanicked { index }))
}

/// Barrier over a dispatcher's outstanding operations.
///
/// Completes when the in-flight count is observed at zero. Operations
/// dispatched while waiting extend the wait, so stop feeding the dispatcher
/// before relying on this as a full drain.
#[derive(Debug, Clone)]
pub struct Drain {
    in_flight: watch::Receiver<usize>,
}

impl Drain {
    pub async fn wait(mut self) -> Result<()> {
        self.in_flight
            .wait_for(|n| *n == 0)
            .await
            .map(|_| ())
            .map_err(|_| Error::internal("dispatcher dropped with operations pending"))
    }
}
