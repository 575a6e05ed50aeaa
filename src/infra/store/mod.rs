//! Job store backends.

pub mod file;
pub mod memory;
pub mod mongo;

pub use file::FileStore;
pub use memory::InMemoryStore;
pub use mongo::MongoStore;
