//! Unsupervised background work.
//!
//! Nobody awaits the result of these tasks, so a panic inside them is handed
//! to [`dispatch_fault`] instead of being returned.

use std::future::Future;
use std::thread;

use tokio::task::JoinHandle;

use crate::call::guard;
use crate::handler::dispatch_fault;
use crate::hook;

/// Spawn `future` on the current Tokio runtime.
///
/// The returned handle may be dropped; the task keeps running. It always
/// resolves to `Ok(())`, even if the future panicked.
///
/// # Panics
/// Panics if called outside a Tokio runtime, like [`tokio::spawn`].
pub fn spawn<F>(future: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(fault) = guard(future).await {
            dispatch_fault(fault);
        }
    })
}

/// Run a blocking closure on Tokio's blocking pool.
pub fn spawn_blocking<F>(f: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        if let Err(fault) = hook::catch(f) {
            dispatch_fault(fault);
        }
    })
}

/// Run `f` on a new OS thread. Usable without a Tokio runtime.
pub fn spawn_thread<F>(f: F) -> thread::JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::spawn(move || {
        if let Err(fault) = hook::catch(f) {
            dispatch_fault(fault);
        }
    })
}
