use thiserror::Error;

use crate::common::types::{TableId, TransactionId};
use crate::storage::file::StorageError;

#[derive(Error, Debug)]
pub enum CacheError {
    /// Lock acquisition cannot succeed: the transaction was picked as a
    /// deadlock victim or its wait timed out. The caller is expected to
    /// roll the transaction back via [`crate::PageCache::abort`] and may
    /// retry it from the start.
    #[error("{0} aborted waiting for a page lock")]
    TransactionAborted(TransactionId),

    /// Eviction found no clean page: every resident page is pinned by an
    /// uncommitted transaction. Backpressure; retry after other
    /// transactions finish.
    #[error("page cache exhausted: all {0} resident pages are dirty")]
    CacheExhausted(usize),

    #[error("no table registered under id {0}")]
    UnknownTable(TableId),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
