//! HTTP handlers

pub mod health;
pub mod profiles;

pub use health::live;
