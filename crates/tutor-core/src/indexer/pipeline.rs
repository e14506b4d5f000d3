//! Bounded parallel fan-out with per-task deadlines.
//!
//! Each task runs on its own named thread. The orchestrator keeps at most
//! `workers` tasks inside their deadline at once and waits for every task to
//! finish, time out or panic before returning, so callers always see the
//! complete result set. A task past its deadline gives its slot back
//! immediately: its thread is detached and whatever it eventually returns is
//! dropped. Read-only preparation work that needs no deadline goes through
//! [`parallel_map`] on a Rayon pool instead.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::errors::{TutorError, TutorResult};

/// Polling interval for cancellation while no deadline is closer.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Cooperative cancellation flag shared between a caller and running work.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> TutorResult<()> {
        if self.is_cancelled() {
            Err(TutorError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// How one task ended.
#[derive(Debug, PartialEq)]
pub enum TaskOutcome<T> {
    Completed(T),
    Panicked(String),
    TimedOut,
}

type Report<T> = (usize, thread::Result<T>);

pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn outcome<T>(result: thread::Result<T>) -> TaskOutcome<T> {
    match result {
        Ok(value) => TaskOutcome::Completed(value),
        Err(payload) => TaskOutcome::Panicked(panic_message(payload.as_ref())),
    }
}

/// Start `item` on a fresh thread. When no thread can be spawned the item
/// is handed back so the caller can run it inline.
fn spawn_task<I, T, F>(
    index: usize,
    item: I,
    work: &Arc<F>,
    tx: &Sender<Report<T>>,
) -> Result<(), Option<I>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> T + Send + Sync + 'static,
{
    let slot = Arc::new(Mutex::new(Some(item)));
    let task_slot = Arc::clone(&slot);
    let work = Arc::clone(work);
    let tx = tx.clone();
    let spawned = thread::Builder::new()
        .name(format!("tutor-analysis-{index}"))
        .spawn(move || {
            let Some(item) = task_slot.lock().take() else {
                return;
            };
            let result = catch_unwind(AssertUnwindSafe(|| work(item)));
            // the receiver is gone once the run returned or was cancelled
            let _ = tx.send((index, result));
        });
    match spawned {
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::warn!(error = %e, "worker thread unavailable, analyzing inline");
            let item = slot.lock().take();
            Err(item)
        }
    }
}

/// Run `work` over every item with at most `workers` tasks running inside
/// their deadline.
///
/// Outcomes are returned in item order. Returns `Cancelled` as soon as the
/// token is observed cancelled; tasks not yet started never start and
/// outstanding results are discarded.
pub fn run_bounded<I, T, F>(
    items: Vec<I>,
    workers: usize,
    timeout: Duration,
    cancel: &CancellationToken,
    work: F,
) -> TutorResult<Vec<TaskOutcome<T>>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> T + Send + Sync + 'static,
{
    cancel.check()?;
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let total = items.len();
    let width = workers.max(1);
    let work = Arc::new(work);
    let (tx, rx) = mpsc::channel::<Report<T>>();
    let mut pending = items.into_iter().enumerate();
    let mut outcomes: Vec<Option<TaskOutcome<T>>> = (0..total).map(|_| None).collect();
    let mut running: HashMap<usize, Instant> = HashMap::new();
    let mut remaining = total;

    while remaining > 0 {
        cancel.check()?;
        while running.len() < width {
            let Some((index, item)) = pending.next() else {
                break;
            };
            match spawn_task(index, item, &work, &tx) {
                Ok(()) => {
                    running.insert(index, Instant::now());
                }
                Err(Some(item)) => {
                    outcomes[index] = Some(outcome(catch_unwind(AssertUnwindSafe(|| work(item)))));
                    remaining -= 1;
                }
                Err(None) => {
                    outcomes[index] = Some(TaskOutcome::Panicked("worker thread unavailable".into()));
                    remaining -= 1;
                }
            }
        }
        if remaining == 0 {
            break;
        }

        let now = Instant::now();
        let wait = running
            .values()
            .map(|started| (*started + timeout).saturating_duration_since(now))
            .min()
            .map_or(CANCEL_POLL, |d| d.min(CANCEL_POLL));

        // `tx` is still held here, so the only receive error is a timeout.
        if let Ok((index, result)) = rx.recv_timeout(wait) {
            // A late result for a task already marked timed out is dropped.
            if running.remove(&index).is_some() {
                outcomes[index] = Some(outcome(result));
                remaining -= 1;
            }
        }

        let now = Instant::now();
        running.retain(|&index, started| {
            if now.duration_since(*started) < timeout {
                return true;
            }
            tracing::debug!(index, "task passed its deadline, releasing its slot");
            outcomes[index] = Some(TaskOutcome::TimedOut);
            remaining -= 1;
            false
        });
    }

    Ok(outcomes
        .into_iter()
        .map(|o| o.unwrap_or(TaskOutcome::TimedOut))
        .collect())
}

/// Map `f` over `items` on a Rayon pool of `workers` threads, keeping item
/// order. Falls back to a sequential map when the pool cannot be built.
pub fn parallel_map<I, T, F>(items: &[I], workers: usize, f: F) -> Vec<T>
where
    I: Sync,
    T: Send,
    F: Fn(&I) -> T + Send + Sync,
{
    match rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("tutor-probe-{i}"))
        .build()
    {
        Ok(pool) => pool.install(|| items.par_iter().map(&f).collect()),
        Err(e) => {
            tracing::warn!(error = %e, "thread pool unavailable, running sequentially");
            items.iter().map(f).collect()
        }
    }
}
