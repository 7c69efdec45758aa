//! Context - 協調的キャンセルの伝播
//!
//! A cancellation signal shared between tasks. Cancelling a context cancels
//! every context derived from it; it never affects the parent. Cancellation
//! is advisory: tasks observe it by polling [`Context::is_cancelled`] or
//! awaiting [`Context::cancelled`].

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::watch;

#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: watch::Sender<bool>,
    parent: Option<Context>,
}

impl Context {
    /// A root context that is never cancelled unless [`cancel`](Self::cancel)
    /// is called on it.
    pub fn background() -> Self {
        Self::with_parent(None)
    }

    fn with_parent(parent: Option<Context>) -> Self {
        let (cancelled, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner { cancelled, parent }),
        }
    }

    /// Derive a context that is cancelled when this one is.
    pub fn child(&self) -> Self {
        Self::with_parent(Some(self.clone()))
    }

    /// Derive a context that is additionally cancelled after `timeout`.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let child = self.child();
        let timer = child.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => timer.cancel(),
                _ = timer.cancelled() => {}
            }
        });
        child
    }

    /// Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.send_if_modified(|cancelled| {
            let changed = !*cancelled;
            *cancelled = true;
            changed
        });
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.borrow()
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(Context::is_cancelled)
    }

    /// Resolves once this context or any ancestor is cancelled.
    pub async fn cancelled(&self) {
        self.wait_cancelled().await
    }

    fn wait_cancelled(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut own = self.inner.cancelled.subscribe();
            match &self.inner.parent {
                None => {
                    // sender は self が保持しているので Err にはならない
                    let _ = own.wait_for(|cancelled| *cancelled).await;
                }
                Some(parent) => {
                    tokio::select! {
                        _ = own.wait_for(|cancelled| *cancelled) => {}
                        _ = parent.wait_cancelled() => {}
                    }
                }
            }
        })
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[test]
    fn background_starts_live() {
        let ctx = Context::background();
        assert!(!ctx.is_cancelled());
        ctx.cancel();
        ctx.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn parent_cancel_reaches_grandchild() {
        let root = Context::background();
        let grandchild = root.child().child();
        root.cancel();
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn child_cancel_does_not_reach_parent() {
        let root = Context::background();
        let child = root.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!root.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_wakes_on_parent_cancel() {
        let root = Context::background();
        let child = root.child();

        let waiter = tokio::spawn(async move { child.cancelled().await });
        tokio::task::yield_now().await;
        root.cancel();

        timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancelled_returns_immediately_when_already_cancelled() {
        let ctx = Context::background();
        ctx.cancel();
        timeout(Duration::from_millis(100), ctx.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_cancels_child_only() {
        let root = Context::background();
        let ctx = root.with_timeout(Duration::from_secs(5));
        assert!(!ctx.is_cancelled());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(ctx.is_cancelled());
        assert!(!root.is_cancelled());
    }
}
