use thiserror::Error;

use crate::common::types::{Page, PageId, PagePtr, TableId, TransactionId};
use crate::storage::cache::{CacheError, PageCache};
use crate::storage::heap::tuple::Tuple;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} is beyond the end of its backing file")]
    PageOutOfBounds(PageId),
    #[error("{0} has no free slot")]
    PageFull(PageId),
    #[error("tuple does not match the table schema")]
    SchemaMismatch,
    #[error("tuple is not stored in this table")]
    TupleNotFound,
}

/// Backing file for one table: a sequence of fixed-size pages addressed by
/// page number.
///
/// The tuple-level operations go through the page cache rather than
/// straight to disk: they fetch every page they touch with
/// [`crate::common::types::LockMode::Exclusive`], so locking is implicit,
/// and they return the page instances they mutated so the cache can mark
/// them dirty.
pub trait TableFile: Send + Sync {
    /// Identifier of the table this file backs.
    fn table_id(&self) -> TableId;

    /// Read one page from disk. Page numbers beyond the current extent
    /// read as all zeroes.
    fn read_page(&self, pid: PageId) -> Result<Page, StorageError>;

    /// Write one page at offset `page_no * page_size()`. Fails with
    /// [`StorageError::PageOutOfBounds`] for a non-append write past the
    /// current extent.
    fn write_page(&self, page: &Page) -> Result<(), StorageError>;

    /// Number of whole pages currently in the file.
    fn num_pages(&self) -> Result<u32, StorageError>;

    /// Place `tuple` on a page with free space, extending the file if
    /// every page is full. Sets the tuple's record ID and returns the
    /// mutated pages.
    fn insert_tuple(
        &self,
        cache: &PageCache,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> Result<Vec<PagePtr>, CacheError>;

    /// Remove `tuple` from the page recorded in its record ID and return
    /// the mutated pages.
    fn delete_tuple(
        &self,
        cache: &PageCache,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PagePtr>, CacheError>;
}
