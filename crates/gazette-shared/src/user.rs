//! Author accounts. A user's id is the PeerId derived from their public
//! key, so authors are addressable on the overlay like any node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// PeerId string derived from `public_key`.
    pub id: String,
    pub username: String,
    /// Argon2 PHC hash. Internal record only; this type never crosses an
    /// external surface.
    pub password_hash: String,
    /// Base64 Ed25519 public key.
    pub public_key: String,
    /// Encrypted private key (v1 keystore envelope).
    pub private_key: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn validate(&self) -> Result<()> {
        let len = self.username.chars().count();
        if len < 3 {
            return Err(DomainError::InvalidUser(
                "username must be at least 3 characters".into(),
            ));
        }
        if len > 50 {
            return Err(DomainError::InvalidUser(
                "username must be at most 50 characters".into(),
            ));
        }
        if self.password_hash.is_empty() {
            return Err(DomainError::InvalidUser("password is required".into()));
        }
        if self.public_key.is_empty() {
            return Err(DomainError::InvalidUser("public key is required".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserRegisterRequest {
    pub username: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> User {
        let now = Utc::now();
        User {
            id: "12D3KooW".into(),
            username: "alice".into(),
            password_hash: "$argon2id$stub".into(),
            public_key: "cHVia2V5".into(),
            private_key: "ZW5j".into(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn valid_user_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn short_username_rejected() {
        let mut u = sample();
        u.username = "ab".into();
        assert!(u.validate().is_err());
    }

    #[test]
    fn json_round_trip_keeps_key_material() {
        let user = sample();
        let text = serde_json::to_string(&user).unwrap();
        let back: User = serde_json::from_str(&text).unwrap();
        assert_eq!(back, user);
        assert_eq!(back.private_key, user.private_key);
    }
}
