use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Position of an entry in the replicated log.
///
/// Terms and indexes start at 1; the all-zero value is the "not yet assigned" sentinel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId {
    pub term: u64,
    pub index: u64,
}

impl OpId {
    pub const fn new(
        term: u64,
        index: u64,
    ) -> Self {
        Self { term, index }
    }

    /// Sentinel returned before consensus has assigned a slot.
    pub const fn invalid() -> Self {
        Self { term: 0, index: 0 }
    }

    pub fn is_valid(&self) -> bool {
        self.term > 0 && self.index > 0
    }
}

impl fmt::Display for OpId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}.{}", self.term, self.index)
    }
}

/// Hybrid logical/physical timestamp used for MVCC visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HybridTime(u64);

impl HybridTime {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HybridTime {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{{ ht: {} }}", self.0)
    }
}
