//! Stack traces captured alongside a fault.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;

use serde::{Deserialize, Serialize};

/// One resolved stack frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub symbol: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// The call stack recorded when a panic was intercepted.
///
/// Symbol resolution is deferred until the trace is rendered or
/// [`frames`](Self::frames) is called.
pub struct StackTrace {
    backtrace: Backtrace,
}

impl StackTrace {
    pub(crate) fn new(backtrace: Backtrace) -> Self {
        Self { backtrace }
    }

    pub fn status(&self) -> BacktraceStatus {
        self.backtrace.status()
    }

    pub fn is_captured(&self) -> bool {
        self.status() == BacktraceStatus::Captured
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Frames ordered from the innermost call outwards.
    ///
    /// Empty when no trace was captured.
    pub fn frames(&self) -> Vec<Frame> {
        if !self.is_captured() {
            return Vec::new();
        }
        parse_frames(&self.backtrace.to_string())
    }
}

// std renders each frame as "  N: symbol" followed by zero or more "at file:line:col" lines.
fn parse_frames(rendered: &str) -> Vec<Frame> {
    let mut frames: Vec<Frame> = Vec::new();
    for line in rendered.lines() {
        let line = line.trim();
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut()
                && frame.location.is_none()
            {
                frame.location = Some(location.to_string());
            }
            continue;
        }
        let Some((index, symbol)) = line.split_once(": ") else {
            continue;
        };
        if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) {
            frames.push(Frame {
                symbol: symbol.to_string(),
                location: None,
            });
        }
    }
    frames
}

impl fmt::Display for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status() {
            BacktraceStatus::Captured => fmt::Display::fmt(&self.backtrace, f),
            BacktraceStatus::Disabled => f.write_str("<backtrace disabled>"),
            _ => f.write_str("<backtrace unsupported>"),
        }
    }
}

impl fmt::Debug for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackTrace")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
