// RowanDB Transaction Management Module

pub mod locks;

// Public exports
pub use locks::LockManager;
