//! Write-ahead log seam.
//!
//! The on-disk layout belongs to the log implementation. The driver only appends the
//! commit record of an applied operation and needs to know whether it became durable.

#[cfg(test)]
use mockall::automock;

use crate::CommitRecord;
use crate::Result;

#[cfg_attr(test, automock)]
pub trait Log: Send + Sync + 'static {
    /// Durably appends the commit record. Returns once the record is persisted.
    fn append_commit(
        &self,
        record: CommitRecord,
    ) -> Result<()>;
}
