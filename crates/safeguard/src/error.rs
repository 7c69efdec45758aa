use std::sync::Arc;

use thiserror::Error;

use crate::fault::Fault;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error returned by guarded code.
///
/// Guarded entry points accept any error type implementing `From<Fault>`;
/// this enum is the ready-made one. Match on [`Error::Fault`] to tell an
/// intercepted panic apart from an error the code returned itself.
///
/// Cheap to clone, so every [`Group::wait`](crate::Group::wait) can report
/// the same failure.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Fault(#[from] Fault),

    #[error(transparent)]
    Other(Arc<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn other(err: impl Into<BoxError>) -> Self {
        let err: BoxError = err.into();
        Error::Other(Arc::from(err))
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Error::Fault(_))
    }

    pub fn as_fault(&self) -> Option<&Fault> {
        match self {
            Error::Fault(fault) => Some(fault),
            Error::Other(_) => None,
        }
    }

    pub fn into_fault(self) -> Result<Fault, Self> {
        match self {
            Error::Fault(fault) => Ok(fault),
            other => Err(other),
        }
    }
}
