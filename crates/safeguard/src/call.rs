//! Guarded calls - 呼び出し元のタスク内で panic を Err に変換する
//!
//! Nothing in here spawns: the guarded code runs on the caller's task/thread.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::fault::Fault;
use crate::hook;

/// Run `f`, turning a panic into `Err(E::from(fault))`.
///
/// Errors returned by `f` itself pass through unchanged.
///
/// ```ignore
/// let result: Result<(), safeguard::Error> = safeguard::call(|| {
///     let v: Vec<u8> = Vec::new();
///     let _ = v[3];
///     Ok(())
/// });
/// assert!(result.unwrap_err().is_fault());
/// ```
pub fn call<F, E>(f: F) -> Result<(), E>
where
    F: FnOnce() -> Result<(), E>,
    E: From<Fault>,
{
    call_with_result(f)
}

/// Like [`call`], for functions that also produce a value.
pub fn call_with_result<F, T, E>(f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: From<Fault>,
{
    match hook::catch(f) {
        Ok(result) => result,
        Err(fault) => Err(E::from(fault)),
    }
}

/// Wrap a future so that a panic while polling it resolves to `Err(Fault)`.
pub fn guard<F: Future>(future: F) -> Guarded<F> {
    Guarded {
        inner: Box::pin(future),
    }
}

/// Async counterpart of [`call_with_result`].
pub async fn call_async<F, T, E>(future: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<Fault>,
{
    match guard(future).await {
        Ok(result) => result,
        Err(fault) => Err(E::from(fault)),
    }
}

/// Future returned by [`guard`].
///
/// Each poll of the inner future runs inside a guarded scope. Once it has
/// resolved (normally or by panicking) it must not be polled again.
#[must_use = "futures do nothing unless polled"]
pub struct Guarded<F> {
    inner: Pin<Box<F>>,
}

impl<F: Future> Future for Guarded<F> {
    type Output = Result<F::Output, Fault>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = &mut self.get_mut().inner;
        match hook::catch(|| inner.as_mut().poll(cx)) {
            Ok(Poll::Ready(output)) => Poll::Ready(Ok(output)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(fault) => Poll::Ready(Err(fault)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::cell::Cell;

    #[derive(Debug, Clone, PartialEq)]
    struct Payload(&'static str);

    #[test]
    fn call_passes_native_error_through() {
        let result: Result<(), Error> = call(|| Err(Error::other("native")));
        let err = result.unwrap_err();
        assert!(!err.is_fault());
        assert_eq!(err.to_string(), "native");
    }

    #[test]
    fn call_passes_success_through() {
        let result: Result<(), Error> = call(|| Ok(()));
        assert!(result.is_ok());
    }

    #[test]
    fn call_converts_panic_with_payload_identity() {
        let result: Result<(), Error> = call(|| std::panic::panic_any(Payload("original")));
        let fault = result.unwrap_err().into_fault().unwrap();
        assert_eq!(fault.downcast::<Payload>(), Some(Payload("original")));
    }

    #[test]
    fn call_intercepts_panics_in_nested_functions() {
        fn deep(n: usize) -> usize {
            if n == 0 {
                let v: Vec<usize> = Vec::new();
                return v[n];
            }
            deep(n - 1)
        }
        let result: Result<usize, Error> = call_with_result(|| Ok(deep(5)));
        let err = result.unwrap_err();
        assert!(err.to_string().starts_with("panic: index out of bounds"));
    }

    #[test]
    fn call_with_result_returns_value() {
        let result: Result<&str, Error> = call_with_result(|| Ok("value"));
        assert_eq!(result.unwrap(), "value");
    }

    #[test]
    fn call_with_result_on_panic_has_no_value() {
        let result: Result<u32, Error> = call_with_result(|| panic!("no value"));
        assert_eq!(result.unwrap_err().to_string(), "panic: no value");
    }

    #[test]
    fn body_runs_exactly_once() {
        let runs = Cell::new(0);
        let result: Result<(), Error> = call(|| {
            runs.set(runs.get() + 1);
            panic!("once");
        });
        assert!(result.is_err());
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn caller_error_type_can_absorb_faults() {
        #[derive(Debug)]
        enum AppError {
            Crashed(String),
        }
        impl From<Fault> for AppError {
            fn from(fault: Fault) -> Self {
                AppError::Crashed(fault.to_string())
            }
        }

        let result: Result<(), AppError> = call(|| panic!("custom"));
        let AppError::Crashed(msg) = result.unwrap_err();
        assert_eq!(msg, "panic: custom");
    }

    #[tokio::test]
    async fn guard_converts_panic_after_await() {
        let result = guard(async {
            tokio::task::yield_now().await;
            panic!("after yield");
        })
        .await;
        let fault = result.map(|_: ()| ()).unwrap_err();
        assert_eq!(fault.payload_str(), Some("after yield"));
        assert!(fault.location().is_some());
    }

    #[tokio::test]
    async fn call_async_passes_values_and_errors() {
        let ok: Result<u8, Error> = call_async(async { Ok(3) }).await;
        assert_eq!(ok.unwrap(), 3);

        let native: Result<u8, Error> = call_async(async { Err(Error::other("nope")) }).await;
        assert!(!native.unwrap_err().is_fault());

        let faulted: Result<u8, Error> = call_async(async { panic!("async boom") }).await;
        assert!(faulted.unwrap_err().is_fault());
    }
}
