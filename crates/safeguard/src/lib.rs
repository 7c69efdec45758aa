//! safeguard
//!
//! Panic を普通のエラー値に変換するためのユーティリティ。
//!
//! # Modules
//! - **fault**: [`Fault`], the error a panic turns into (payload, location, stack trace)
//! - **call**: guarded calls on the current task ([`call`], [`call_with_result`], [`guard`])
//! - **spawn**: unsupervised background work ([`spawn`], [`spawn_blocking`], [`spawn_thread`])
//! - **group**: [`Group`], first-failure-wins task groups
//! - **context**: [`Context`], cooperative cancellation for groups
//! - **handler**: the process-wide fault handler ([`set_fault_handler`])
//! - **config**: capture [`Settings`]
//!
//! Interception relies on unwinding; with `panic = "abort"` nothing can be
//! caught.
//!
//! ```ignore
//! use safeguard::{Context, Error, Group};
//!
//! safeguard::set_fault_handler(|fault| report(fault.report()));
//!
//! let (group, ctx) = Group::<Error>::with_context(&Context::background());
//! group.launch(async move { work(&ctx).await });
//! if let Err(Error::Fault(fault)) = group.wait().await {
//!     eprintln!("{fault:#}");
//! }
//! ```

pub mod call;
pub mod config;
pub mod context;
pub mod error;
pub mod fault;
pub mod group;
pub mod handler;
mod hook;
pub mod spawn;

#[cfg(test)]
mod test_support;

pub use self::call::{Guarded, call, call_async, call_with_result, guard};
pub use self::config::{BacktraceMode, Settings, configure, settings};
pub use self::context::Context;
pub use self::error::{BoxError, Error};
pub use self::fault::{Fault, FaultId, FaultReport, Frame, Payload, StackTrace};
pub use self::group::Group;
pub use self::handler::{clear_fault_handler, dispatch_fault, has_fault_handler, set_fault_handler};
pub use self::spawn::{spawn, spawn_blocking, spawn_thread};
