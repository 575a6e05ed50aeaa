//! Builders to construct runner components from configuration.

pub mod store_builder;

pub use store_builder::{build_store, StoreTarget};
