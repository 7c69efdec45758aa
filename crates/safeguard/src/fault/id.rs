//! Fault identifiers.
//!
//! ULID なので生成順にソートでき、ログ行同士の突き合わせに使える。

use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique id assigned to every captured fault, rendered as `fault-<ulid>`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FaultId(Ulid);

impl FaultId {
    pub(crate) fn generate() -> Self {
        Self(Ulid::new())
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for FaultId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for FaultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fault-{}", self.0)
    }
}
