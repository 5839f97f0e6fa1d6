//! Cachestore Types
//!
//! Pure data types shared by the storage core and the server.

pub mod profile;

pub use profile::{Profile, ValidationError, MAX_EMAIL_LEN, MAX_NAME_LEN, MAX_UID_LEN};
