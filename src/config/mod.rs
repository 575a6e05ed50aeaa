//! Configuration models for the runner and its store connection.

pub mod runner;
pub mod secrets;

pub use runner::RunnerConfig;
pub use secrets::read_connection_string;
