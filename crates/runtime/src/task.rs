//! Task contracts.
//!
//! Work is either *awaited* (the caller owns the future and must observe its
//! result) or *detached* (handed to a [`Spawn`] implementation; failures are
//! logged and dropped). The two never share a code path, so a detached
//! failure cannot leak into an awaited result.

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Executor seam for fire-and-forget work.
pub trait Spawn: Send + Sync {
    fn spawn_detached(&self, task: BoxFuture<'static, ()>);
}

/// Spawns detached tasks onto the ambient tokio runtime.
#[derive(Debug, Default, Copy, Clone)]
pub struct TokioSpawner;

impl Spawn for TokioSpawner {
    fn spawn_detached(&self, task: BoxFuture<'static, ()>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(task);
            }
            Err(_) => warn!("no tokio runtime available, detached task dropped"),
        }
    }
}

/// Holds detached tasks until the owner explicitly runs them.
///
/// Gives tests a deterministic point at which background work happens.
#[cfg(any(test, feature = "testing"))]
#[derive(Default)]
pub struct ManualSpawner {
    pending: Mutex<Vec<BoxFuture<'static, ()>>>,
}

#[cfg(any(test, feature = "testing"))]
impl ManualSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Runs every queued task to completion, including tasks queued while
    /// running. Returns how many tasks ran.
    pub async fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let batch = std::mem::take(&mut *self.pending.lock());
            if batch.is_empty() {
                return ran;
            }
            for task in batch {
                task.await;
                ran += 1;
            }
        }
    }

    /// Drops queued tasks without running them.
    pub fn discard_pending(&self) -> usize {
        let mut pending = self.pending.lock();
        let n = pending.len();
        pending.clear();
        n
    }
}

#[cfg(any(test, feature = "testing"))]
impl Spawn for ManualSpawner {
    fn spawn_detached(&self, task: BoxFuture<'static, ()>) {
        self.pending.lock().push(task);
    }
}

/// Turns a fallible future into a detached task whose error is only logged.
pub fn detach<T, E, F>(label: &'static str, fut: F) -> BoxFuture<'static, ()>
where
    T: Send + 'static,
    E: Display + Send + 'static,
    F: Future<Output = Result<T, E>> + Send + 'static,
{
    Box::pin(async move {
        match fut.await {
            Ok(_) => debug!(task = label, "detached task finished"),
            Err(err) => warn!(task = label, %err, "detached task failed (ignored)"),
        }
    })
}
