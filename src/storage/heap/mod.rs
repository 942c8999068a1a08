pub mod file;
pub mod layout;
pub mod tuple;

pub use file::HeapFile;
