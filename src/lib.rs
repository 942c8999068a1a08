// Rowan Database Engine - transactional page cache core

pub mod catalog;
pub mod common;
pub mod storage;
pub mod transaction;

// Re-export key items for convenient access
pub use catalog::Catalog;
pub use storage::cache::{CacheError, DeadlockPolicy, PageCache};
pub use storage::file::{StorageError, TableFile};
pub use storage::heap::HeapFile;
pub use transaction::locks::LockManager;
