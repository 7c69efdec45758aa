//! Group - panic を安全に扱うタスクグループ
//!
//! A collection of subtasks working on parts of the same job. The first
//! subtask to fail (by returning an error or by panicking) decides the
//! outcome of every [`Group::wait`]; errors from subtasks that fail later are
//! dropped, for the whole life of the group.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tokio::sync::Notify;
use tracing::debug;

use crate::call::{call_async, call_with_result};
use crate::context::Context;
use crate::error::Error;
use crate::fault::Fault;

/// A set of guarded subtasks with first-failure-wins error aggregation.
///
/// A default-constructed group is valid: it waits for all subtasks and
/// returns the first error, but has no context to cancel. Use
/// [`Group::with_context`] to get a context that is cancelled on the first
/// failure.
///
/// To launch from inside a subtask, share the group behind an `Arc`.
///
/// ```ignore
/// let (group, ctx) = Group::<Error>::with_context(&Context::background());
/// for url in urls {
///     let ctx = ctx.clone();
///     group.launch(async move { fetch(&ctx, url).await });
/// }
/// group.wait().await?;
/// ```
pub struct Group<E = Error> {
    tracker: OnceLock<Arc<Tracker<E>>>,
}

struct Tracker<E> {
    context: Option<Context>,
    first_error: Mutex<Option<E>>,
    outstanding: AtomicUsize,
    idle: Notify,
}

impl<E> Tracker<E> {
    fn new(context: Option<Context>) -> Self {
        Self {
            context,
            first_error: Mutex::new(None),
            outstanding: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    fn record(&self, err: E) {
        let mut first = self.first_error.lock().unwrap_or_else(PoisonError::into_inner);
        if first.is_some() {
            debug!("subtask error dropped: group already failed");
            return;
        }
        *first = Some(err);
        drop(first);

        if let Some(context) = &self.context {
            context.cancel();
        }
    }

    fn first_error(&self) -> Option<E>
    where
        E: Clone,
    {
        self.first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn start(self: &Arc<Self>) -> Outstanding<E> {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        Outstanding(Arc::clone(self))
    }
}

/// Counts one running subtask; dropping it marks the subtask done, even when
/// the runtime drops the task without running it to completion.
struct Outstanding<E>(Arc<Tracker<E>>);

impl<E> Outstanding<E> {
    fn finish(self, result: Result<(), E>) {
        if let Err(err) = result {
            self.0.record(err);
        }
    }
}

impl<E> Drop for Outstanding<E> {
    fn drop(&mut self) {
        if self.0.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl<E> Group<E> {
    /// A group without a context.
    pub fn new() -> Self {
        Self {
            tracker: OnceLock::new(),
        }
    }

    /// A group plus a context derived from `parent`.
    ///
    /// The derived context is cancelled the first time a subtask fails or
    /// the first time [`wait`](Self::wait) returns, whichever happens first.
    pub fn with_context(parent: &Context) -> (Self, Context) {
        let context = parent.child();
        let tracker = Arc::new(Tracker::new(Some(context.clone())));
        (
            Self {
                tracker: OnceLock::from(tracker),
            },
            context,
        )
    }

    /// The derived context, for groups built with [`with_context`](Self::with_context).
    pub fn context(&self) -> Option<&Context> {
        self.tracker.get().and_then(|t| t.context.as_ref())
    }

    // 全ての入口はここを通る
    fn tracker(&self) -> &Arc<Tracker<E>> {
        self.tracker.get_or_init(|| Arc::new(Tracker::new(None)))
    }
}

impl<E> Group<E>
where
    E: From<Fault> + Send + 'static,
{
    /// Run `future` as a new Tokio task.
    ///
    /// A panic inside it is converted into `E` and treated like any other
    /// failure.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn launch<F>(&self, future: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
    {
        let running = self.tracker().start();
        tokio::spawn(async move {
            let result = call_async(future).await;
            running.finish(result);
        });
    }

    /// Run a blocking closure on Tokio's blocking pool as a subtask.
    pub fn launch_blocking<F>(&self, f: F)
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
    {
        let running = self.tracker().start();
        tokio::task::spawn_blocking(move || {
            let result = call_with_result(f);
            running.finish(result);
        });
    }

    /// Wait for every subtask launched so far (including ones launched by
    /// other subtasks while waiting), then return the first error.
    ///
    /// Once the group has failed, every call (concurrent or later) returns
    /// that same error.
    pub async fn wait(&self) -> Result<(), E>
    where
        E: Clone,
    {
        let tracker = self.tracker();
        loop {
            // 先に登録してから数を確認する（通知の取りこぼし防止）
            let idle = tracker.idle.notified();
            if tracker.outstanding.load(Ordering::Acquire) == 0 {
                break;
            }
            idle.await;
        }

        if let Some(context) = &tracker.context {
            context.cancel();
        }
        match tracker.first_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<E> Default for Group<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for Group<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let outstanding = self
            .tracker
            .get()
            .map(|t| t.outstanding.load(Ordering::Relaxed));
        f.debug_struct("Group")
            .field("initialized", &outstanding.is_some())
            .field("outstanding", &outstanding.unwrap_or(0))
            .field("has_context", &self.context().is_some())
            .finish()
    }
}
