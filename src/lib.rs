/// Inari - event-sourced publishing backend
///
/// Posts and media are recorded as immutable events in a blob store. The
/// relational tables behind the read model are a projection of that log and
/// can be rebuilt from it at any time.

pub mod blob_store;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod eventlog;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod publisher;
pub mod read_model;

pub use error::{InariError, InariResult};
