//! Global fault handler
//!
//! Faults raised in unsupervised background tasks have nobody to return to,
//! so they end up here. The handler slot is an atomically swappable
//! reference; reads and writes never block each other.
//!
//! Without a handler, faults are logged through `tracing`. When the
//! application has no subscriber either, the record goes to stderr.

use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwapOption;
use tracing::dispatcher::{self, Dispatch};
use tracing::error;
use tracing::subscriber::NoSubscriber;
use tracing_subscriber::fmt::MakeWriter;

use crate::fault::Fault;
use crate::hook;

struct Handler(Box<dyn Fn(Fault) + Send + Sync>);

static HANDLER: ArcSwapOption<Handler> = ArcSwapOption::const_empty();

static STDERR: LazyLock<Dispatch> = LazyLock::new(|| fallback_dispatch(std::io::stderr));

fn fallback_dispatch<W>(writer: W) -> Dispatch
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    Dispatch::new(
        tracing_subscriber::fmt()
            .with_writer(writer)
            .with_ansi(false)
            .finish(),
    )
}

fn has_subscriber() -> bool {
    dispatcher::get_default(|dispatch| !dispatch.is::<NoSubscriber>())
}

/// Run `log` against the current subscriber, or against `fallback` when
/// nothing is listening.
fn log_with_fallback(fallback: &Dispatch, log: impl FnOnce()) {
    if has_subscriber() {
        log();
    } else {
        dispatcher::with_default(fallback, log);
    }
}

/// Install the process-wide handler for faults from [`spawn`](crate::spawn)
/// and friends, replacing any previous one.
///
/// Faults dispatched after this returns see the new handler. Dispatches
/// already in flight may still use the old one.
pub fn set_fault_handler<F>(handler: F)
where
    F: Fn(Fault) + Send + Sync + 'static,
{
    HANDLER.store(Some(Arc::new(Handler(Box::new(handler)))));
}

/// Remove the handler; faults are logged again.
pub fn clear_fault_handler() {
    HANDLER.store(None);
}

pub fn has_fault_handler() -> bool {
    HANDLER.load().is_some()
}

/// Deliver a fault to the global handler, or log it when none is set.
///
/// Never panics: a panic inside the handler is intercepted and logged
/// together with the fault that was being handled.
pub fn dispatch_fault(fault: Fault) {
    let Some(handler) = HANDLER.load_full() else {
        log_with_fallback(&STDERR, || error!(fault_id = %fault.id(), "{fault:#}"));
        return;
    };

    // handler に所有権を渡す前に控えておく
    let original = fault.detach();

    if let Err(handler_fault) = hook::catch(move || (handler.0)(fault)) {
        log_with_fallback(&STDERR, || {
            error!(
                fault_id = %handler_fault.id(),
                original_fault_id = %original.id(),
                "panic in fault handler: {handler_fault:#}\noriginal: {original:#}"
            )
        });
    }
}
