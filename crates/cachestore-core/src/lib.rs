//! Cachestore Core Library
//!
//! Storage ports and the error type shared by the durable and cache tiers.

// Re-export pure types from cachestore-types
pub use cachestore_types::*;

pub mod error;
pub mod ports;

pub use error::{Result, StoreError};
pub use ports::{CacheStore, DurableStore};
