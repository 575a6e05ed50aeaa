//! Infrastructure adapters for queue store backends.

pub mod store;

pub use store::{FileStore, InMemoryStore, MongoStore};
