pub mod error;
pub mod manager;

pub use error::CacheError;
pub use manager::{DeadlockPolicy, PageCache};
