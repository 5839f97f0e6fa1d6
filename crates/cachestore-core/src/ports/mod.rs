//! Ports implemented by the storage adapters

pub mod storage;

pub use storage::{CacheStore, DurableStore};
