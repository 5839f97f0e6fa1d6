//! Business logic services

pub mod store_coordinator;

pub use store_coordinator::{InsertOutcome, Retrieved, Source, StoreCoordinator, StoreTimeouts};
