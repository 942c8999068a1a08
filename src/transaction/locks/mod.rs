pub mod manager;

pub use manager::LockManager;
