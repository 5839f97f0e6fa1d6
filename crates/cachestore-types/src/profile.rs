//! Profile types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest accepted `uid`, matching the primary key column width.
pub const MAX_UID_LEN: usize = 64;
pub const MAX_NAME_LEN: usize = 128;
pub const MAX_EMAIL_LEN: usize = 254;

/// A user profile. `uid` is the lookup key in both storage tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub age: u32,
}

/// Shape violations found by [`Profile::validate`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("uid must not be empty")]
    EmptyUid,

    #[error("uid contains whitespace or control characters")]
    InvalidUid,

    #[error("{field} is too long: {len} characters (max {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

impl Profile {
    pub fn new(
        uid: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        age: u32,
    ) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            email: email.into(),
            age,
        }
    }

    /// Check that every field fits the persisted schema.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.uid.is_empty() {
            return Err(ValidationError::EmptyUid);
        }
        if self
            .uid
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(ValidationError::InvalidUid);
        }
        check_len("uid", &self.uid, MAX_UID_LEN)?;
        check_len("name", &self.name, MAX_NAME_LEN)?;
        check_len("email", &self.email, MAX_EMAIL_LEN)?;
        Ok(())
    }

    /// Encode as the cache wire value
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len > max {
        return Err(ValidationError::TooLong { field, len, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ann() -> Profile {
        Profile::new("u1", "Ann", "ann@x.com", 30)
    }

    #[test]
    fn test_valid_profile() {
        assert_eq!(ann().validate(), Ok(()));
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_value(ann()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"uid": "u1", "name": "Ann", "email": "ann@x.com", "age": 30})
        );
    }

    #[test]
    fn test_rejects_empty_uid() {
        let mut p = ann();
        p.uid.clear();
        assert_eq!(p.validate(), Err(ValidationError::EmptyUid));
    }

    #[test]
    fn test_rejects_uid_with_whitespace() {
        let mut p = ann();
        p.uid = "u 1".to_string();
        assert_eq!(p.validate(), Err(ValidationError::InvalidUid));

        p.uid = "u1\n".to_string();
        assert_eq!(p.validate(), Err(ValidationError::InvalidUid));
    }

    #[test]
    fn test_rejects_long_fields() {
        let mut p = ann();
        p.uid = "x".repeat(MAX_UID_LEN + 1);
        assert!(matches!(
            p.validate(),
            Err(ValidationError::TooLong { field: "uid", .. })
        ));

        let mut p = ann();
        p.email = "e".repeat(MAX_EMAIL_LEN + 1);
        assert_eq!(
            p.validate(),
            Err(ValidationError::TooLong {
                field: "email",
                len: MAX_EMAIL_LEN + 1,
                max: MAX_EMAIL_LEN
            })
        );
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let mut p = ann();
        p.name = "é".repeat(MAX_NAME_LEN);
        assert_eq!(p.validate(), Ok(()));
    }

    #[test]
    fn test_negative_age_is_rejected_at_decode() {
        let result: serde_json::Result<Profile> = serde_json::from_str(
            r#"{"uid": "u1", "name": "Ann", "email": "ann@x.com", "age": -1}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_field_is_rejected_at_decode() {
        let result: serde_json::Result<Profile> =
            serde_json::from_str(r#"{"uid": "u1", "name": "Ann", "age": 3}"#);
        assert!(result.is_err());
    }
}
