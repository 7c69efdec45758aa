//! Settings - 横断的な挙動の設定
//!
//! Process-wide knobs for how faults are captured. They are read on every
//! interception, so swapping them takes effect for the next panic.

use std::backtrace::Backtrace;
use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

/// How much stack information to record when a panic is intercepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BacktraceMode {
    /// Always capture, regardless of environment variables.
    #[default]
    Force,
    /// Follow `RUST_BACKTRACE` / `RUST_LIB_BACKTRACE`.
    Env,
    /// Never capture.
    Disabled,
}

impl BacktraceMode {
    pub(crate) fn capture(self) -> Backtrace {
        match self {
            BacktraceMode::Force => Backtrace::force_capture(),
            BacktraceMode::Env => Backtrace::capture(),
            BacktraceMode::Disabled => Backtrace::disabled(),
        }
    }
}

/// Settings for fault interception.
///
/// Can be embedded in an application's own config file:
///
/// ```ignore
/// [safeguard]
/// backtrace = "env"
/// quiet = false
/// ```
///
/// or set in code:
///
/// ```ignore
/// safeguard::configure(Settings {
///     backtrace: BacktraceMode::Env,
///     ..Settings::default()
/// });
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Settings {
    pub backtrace: BacktraceMode,

    /// Keep intercepted panics away from the previously installed panic hook
    /// (which by default prints to stderr).
    pub quiet: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backtrace: BacktraceMode::Force,
            quiet: true,
        }
    }
}

static SETTINGS: LazyLock<ArcSwap<Settings>> =
    LazyLock::new(|| ArcSwap::from_pointee(Settings::default()));

/// Replace the process-wide settings.
pub fn configure(settings: Settings) {
    SETTINGS.store(Arc::new(settings));
}

/// Current process-wide settings.
pub fn settings() -> Arc<Settings> {
    SETTINGS.load_full()
}
