//! Panic interception.
//!
//! A single panic hook is installed on first use. It chains to whatever hook
//! was installed before it, so panics outside a guarded scope behave exactly
//! as they would without this crate. Inside a guarded scope the hook records
//! the backtrace and the panic location on the panicking thread; the
//! interception point then picks them up when building a [`Fault`].
//!
//! A record is only used for the panic that produced it. User code may catch
//! a panic itself and raise a different one with `resume_unwind`, which does
//! not run the hook, so every record carries the payload's type and text and
//! is dropped when its scope ends.

use std::any::{Any, TypeId};
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use crate::config;
use crate::fault::{Fault, payload_as_str};

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
    static CAPTURED: RefCell<Option<Captured>> = const { RefCell::new(None) };
}

static INSTALL: Once = Once::new();

/// What the hook saw at the panic site.
pub(crate) struct Captured {
    pub(crate) backtrace: Backtrace,
    pub(crate) location: Option<String>,
    depth: usize,
    payload_type: TypeId,
    payload_text: Option<String>,
}

impl Captured {
    fn matches(&self, depth: usize, payload: &(dyn Any + Send)) -> bool {
        self.depth == depth
            && self.payload_type == (*payload).type_id()
            && self.payload_text.as_deref() == payload_as_str(payload)
    }
}

fn depth() -> usize {
    // thread teardown 中は 0 扱い
    DEPTH.try_with(Cell::get).unwrap_or(0)
}

pub(crate) fn install() {
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let depth = depth();
            if depth == 0 {
                previous(info);
                return;
            }

            let settings = config::settings();
            let payload = info.payload();
            let captured = Captured {
                backtrace: settings.backtrace.capture(),
                location: info.location().map(|l| l.to_string()),
                depth,
                payload_type: (*payload).type_id(),
                payload_text: payload_as_str(payload).map(str::to_string),
            };
            let _ = CAPTURED.try_with(|slot| {
                if let Ok(mut slot) = slot.try_borrow_mut() {
                    *slot = Some(captured);
                }
            });

            if !settings.quiet {
                previous(info);
            }
        }));
    });
}

/// Marks the current thread as being inside a guarded scope until dropped.
pub(crate) struct Scope {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl Scope {
    pub(crate) fn enter() -> Self {
        install();
        let depth = DEPTH.with(|d| {
            d.set(d.get() + 1);
            d.get()
        });
        discard_from(depth);
        Self {
            _not_send: std::marker::PhantomData,
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        discard_from(depth());
        let _ = DEPTH.try_with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Forget a record left at `depth` or deeper.
fn discard_from(depth: usize) {
    let _ = CAPTURED.try_with(|slot| {
        if let Ok(mut slot) = slot.try_borrow_mut()
            && slot.as_ref().is_some_and(|c| c.depth >= depth)
        {
            *slot = None;
        }
    });
}

/// Take what the hook recorded for `payload`, if it was raised at the
/// current depth. A record for any other panic is discarded.
pub(crate) fn take_captured(payload: &(dyn Any + Send)) -> Option<Captured> {
    let depth = depth();
    CAPTURED
        .try_with(|slot| {
            let captured = slot.try_borrow_mut().ok()?.take()?;
            captured.matches(depth, payload).then_some(captured)
        })
        .ok()
        .flatten()
}

/// Run `f` inside a guarded scope, converting a panic into a [`Fault`].
pub(crate) fn catch<R>(f: impl FnOnce() -> R) -> Result<R, Fault> {
    let _scope = Scope::enter();
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(Fault::capture)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_tracks_nested_scopes() {
        assert_eq!(depth(), 0);
        {
            let _outer = Scope::enter();
            assert_eq!(depth(), 1);
            {
                let _inner = Scope::enter();
                assert_eq!(depth(), 2);
            }
            assert_eq!(depth(), 1);
        }
        assert_eq!(depth(), 0);
    }

    #[test]
    fn catch_passes_value_through() {
        let value = catch(|| 7).unwrap();
        assert_eq!(value, 7);
        assert_eq!(depth(), 0);
    }

    #[test]
    fn catch_records_panic_location() {
        let fault = catch::<()>(|| panic!("located")).unwrap_err();
        let location = fault.location().unwrap();
        assert!(location.contains("hook.rs"), "location={location}");
        assert_eq!(depth(), 0);
    }

    #[test]
    fn inner_catch_does_not_leak_into_outer() {
        let outer = catch::<()>(|| {
            let inner = catch::<()>(|| panic!("inner"));
            assert!(inner.is_err());
            std::panic::resume_unwind(Box::new("outer"));
        })
        .unwrap_err();
        assert_eq!(outer.to_string(), "panic: outer");
        // resume_unwind は hook を通らない
        assert!(outer.location().is_none());
    }

    #[test]
    fn swallowed_panic_does_not_describe_a_later_one() {
        let fault = catch::<()>(|| {
            let swallowed = panic::catch_unwind(|| -> () { panic!("swallowed") });
            assert!(swallowed.is_err());
            panic::resume_unwind(Box::new("resumed"));
        })
        .unwrap_err();
        assert_eq!(fault.payload_str(), Some("resumed"));
        assert!(fault.location().is_none());
    }

    #[derive(Debug)]
    struct Marker;

    #[test]
    fn record_does_not_outlive_its_scope() {
        // 同じ型の payload でも、前のスコープの記録は使われない
        let swallowed = catch(|| panic::catch_unwind(|| -> () { panic::panic_any(Marker) }).is_err());
        assert!(swallowed.unwrap());

        let fault = catch::<()>(|| panic::resume_unwind(Box::new(Marker))).unwrap_err();
        assert!(fault.is::<Marker>());
        assert!(fault.location().is_none());
    }

    #[test]
    fn record_is_reused_for_the_matching_panic() {
        let fault = catch::<()>(|| panic!("formatted {}", 42)).unwrap_err();
        assert_eq!(fault.payload_str(), Some("formatted 42"));
        assert!(fault.location().unwrap().contains("hook.rs"));
    }
}
