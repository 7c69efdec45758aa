//! Fault - 捕捉した panic を表すエラー型
//!
//! A [`Fault`] is created at the moment a panic is intercepted. It keeps the
//! original panic payload untouched so it can be inspected or re-raised.
//! Clones share the payload.

pub mod id;
pub mod report;
pub mod trace;

use std::any::Any;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::config;
use crate::error::Error;
use crate::hook;

pub use self::id::FaultId;
pub use self::report::FaultReport;
pub use self::trace::{Frame, StackTrace};

/// A panic converted into an ordinary error value.
///
/// - `{}` renders the terse message, e.g. `panic: index out of bounds`.
/// - `{:#}` renders the message, the panic location and the stack trace.
///
/// A panic payload is only `Send`, so it is kept behind a lock; that makes
/// `Fault` `Send + Sync + Clone` and lets it travel inside
/// `Box<dyn Error + Send + Sync>`. The price is that payload access goes
/// through [`Fault::payload`], a lock guard.
#[derive(Clone)]
pub struct Fault {
    id: FaultId,
    payload: Arc<Mutex<Box<dyn Any + Send>>>,
    text: Option<String>,
    message: String,
    location: Option<String>,
    stack: Arc<StackTrace>,
    captured_at: DateTime<Utc>,
}

impl Fault {
    /// Build a fault from a panic payload, e.g. the `Err` of
    /// [`std::panic::catch_unwind`].
    ///
    /// If the panic was raised inside a guarded scope, the stack trace and
    /// location recorded at the panic site are used. Otherwise the stack is
    /// captured here.
    pub fn capture(payload: Box<dyn Any + Send>) -> Self {
        let (backtrace, location) = match hook::take_captured(payload.as_ref()) {
            Some(captured) => (captured.backtrace, captured.location),
            None => (config::settings().backtrace.capture(), None),
        };
        let text = payload_as_str(payload.as_ref()).map(str::to_string);
        let message = format!("panic: {}", render_payload(payload.as_ref()));

        Self {
            id: FaultId::generate(),
            payload: Arc::new(Mutex::new(payload)),
            text,
            message,
            location,
            stack: Arc::new(StackTrace::new(backtrace)),
            captured_at: Utc::now(),
        }
    }

    pub fn id(&self) -> FaultId {
        self.id
    }

    /// `panic: <payload>`
    pub fn message(&self) -> &str {
        &self.message
    }

    /// `file:line:col` of the panic site, when the panic went through the hook.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn stack_trace(&self) -> &StackTrace {
        &self.stack
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// The value originally passed to `panic!` / `panic_any`.
    ///
    /// The guard locks the payload shared by all clones of this fault; do not
    /// call other payload accessors while holding it.
    pub fn payload(&self) -> Payload<'_> {
        Payload {
            guard: self.payload.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// A copy of the payload if it is a `T`.
    pub fn downcast<T: Any + Clone>(&self) -> Option<T> {
        self.payload().downcast_ref::<T>().cloned()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.payload().is::<T>()
    }

    /// The panic message when the payload is a string, as it was at capture.
    pub fn payload_str(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Take the payload back. Fails, returning the fault, while clones of it
    /// are still alive.
    pub fn into_payload(self) -> Result<Box<dyn Any + Send>, Fault> {
        let Fault {
            id,
            payload,
            text,
            message,
            location,
            stack,
            captured_at,
        } = self;
        match Arc::try_unwrap(payload) {
            Ok(payload) => Ok(payload.into_inner().unwrap_or_else(PoisonError::into_inner)),
            Err(payload) => Err(Fault {
                id,
                payload,
                text,
                message,
                location,
                stack,
                captured_at,
            }),
        }
    }

    /// Re-raise the original panic.
    ///
    /// If clones still share the payload, the fault itself is raised instead.
    pub fn resume(self) -> ! {
        match self.into_payload() {
            Ok(payload) => std::panic::resume_unwind(payload),
            Err(fault) => std::panic::resume_unwind(Box::new(fault)),
        }
    }

    pub fn report(&self) -> FaultReport {
        FaultReport::from_fault(self)
    }

    /// Everything needed to render this fault, without the payload.
    pub(crate) fn detach(&self) -> Detached {
        Detached {
            id: self.id,
            message: self.message.clone(),
            location: self.location.clone(),
            stack: Arc::clone(&self.stack),
        }
    }
}

/// Locked access to a fault's payload, see [`Fault::payload`].
pub struct Payload<'a> {
    guard: MutexGuard<'a, Box<dyn Any + Send>>,
}

impl Deref for Payload<'_> {
    type Target = dyn Any + Send;

    fn deref(&self) -> &Self::Target {
        &**self.guard
    }
}

impl DerefMut for Payload<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut **self.guard
    }
}

/// Rendering-only copy of a [`Fault`], kept after the fault itself has been
/// handed off.
pub(crate) struct Detached {
    id: FaultId,
    message: String,
    location: Option<String>,
    stack: Arc<StackTrace>,
}

impl Detached {
    pub(crate) fn id(&self) -> FaultId {
        self.id
    }
}

impl fmt::Display for Detached {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_fault(f, self.id, &self.message, self.location.as_deref(), &self.stack)
    }
}

fn write_fault(
    f: &mut fmt::Formatter<'_>,
    id: FaultId,
    message: &str,
    location: Option<&str>,
    stack: &StackTrace,
) -> fmt::Result {
    f.write_str(message)?;
    if f.alternate() {
        write!(f, "\nfault id: {id}")?;
        if let Some(location) = location {
            write!(f, "\n  at {location}")?;
        }
        write!(f, "\nstack backtrace:\n{stack}")?;
    }
    Ok(())
}

pub(crate) fn payload_as_str(payload: &(dyn Any + Send)) -> Option<&str> {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
}

fn render_payload(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload_as_str(payload) {
        return s.to_string();
    }
    if let Some(err) = payload.downcast_ref::<Box<dyn std::error::Error + Send + Sync>>() {
        return err.to_string();
    }
    if let Some(fault) = payload.downcast_ref::<Fault>() {
        return fault.message.clone();
    }
    if let Some(err) = payload.downcast_ref::<Error>() {
        return err.to_string();
    }
    // std と同じ表記
    "Box<dyn Any>".to_string()
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_fault(f, self.id, &self.message, self.location.as_deref(), &self.stack)
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fault")
            .field("id", &self.id)
            .field("message", &self.message)
            .field("location", &self.location)
            .field("captured_at", &self.captured_at)
            .field("stack", &*self.stack)
            .finish_non_exhaustive()
    }
}

impl std::error::Error for Fault {}
