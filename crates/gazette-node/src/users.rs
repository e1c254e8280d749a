//! Author registration and key custody.
//!
//! Registration generates the author's Ed25519 keypair and encrypts the
//! private key with material derived from the stored password hash, so
//! article signing never needs a live session.

use std::sync::Arc;

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use tracing::info;

use gazette_shared::user::UserRegisterRequest;
use gazette_shared::{keystore, DomainError, Identity, User};
use gazette_store::UserRepository;

use crate::error::{NodeError, Result};

pub struct UserService {
    repo: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self { repo }
    }

    pub fn register(&self, req: &UserRegisterRequest) -> Result<User> {
        if req.password.chars().count() < 8 {
            return Err(DomainError::InvalidUser(
                "password must be at least 8 characters".into(),
            )
            .into());
        }

        let hash = hash_password(&req.password)?;
        let author = Identity::generate();
        let private_key = keystore::encrypt_private_key(author.secret_bytes(), hash.as_bytes())?;

        let now = Utc::now();
        let user = User {
            id: author.user_id(),
            username: req.username.clone(),
            password_hash: hash,
            public_key: author.public_key_base64(),
            private_key,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        user.validate()?;
        self.repo.create(&user)?;

        info!(user_id = %user.id, username = %user.username, "registered user");
        Ok(user)
    }

    /// Make sure this node has an author account of its own, so locally
    /// authored articles always have a signing identity. Created once with
    /// a random password; signing later only needs the stored hash bytes.
    pub fn ensure_node_user(&self, peer_id: &str) -> Result<User> {
        let suffix: String = peer_id
            .chars()
            .rev()
            .take(8)
            .collect::<String>()
            .chars()
            .rev()
            .collect();
        let username = format!("node-{suffix}");

        match self.repo.get_by_username(&username) {
            Ok(user) => return Ok(user),
            Err(gazette_store::StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        self.register(&UserRegisterRequest {
            username,
            password: format!("{}{}", uuid::Uuid::new_v4(), uuid::Uuid::new_v4()),
        })
    }

    pub fn get(&self, id: &str) -> Result<User> {
        Ok(self.repo.get_by_id(id)?)
    }

    pub fn get_by_username(&self, username: &str) -> Result<User> {
        Ok(self.repo.get_by_username(username)?)
    }

    pub fn verify_password(&self, user: &User, password: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(&user.password_hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    /// Decrypt the author's signing identity using the stored hash bytes.
    pub fn signing_identity(&self, user: &User) -> Result<Identity> {
        let secret =
            keystore::decrypt_private_key(&user.private_key, user.password_hash.as_bytes())?;
        let author = Identity::from_secret_bytes(&secret);
        if author.public_key_base64() != user.public_key {
            return Err(DomainError::InvalidKey.into());
        }
        Ok(author)
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| NodeError::Domain(DomainError::InvalidUser("failed to hash password".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazette_store::{open_stores, StoreMode};

    fn service() -> (UserService, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let stores = open_stores(StoreMode::Sqlite, dir.path()).unwrap();
        (UserService::new(stores.users), dir)
    }

    fn request(name: &str) -> UserRegisterRequest {
        UserRegisterRequest {
            username: name.into(),
            password: "correct horse".into(),
        }
    }

    #[test]
    fn register_and_sign() {
        let (service, _dir) = service();
        let user = service.register(&request("alice")).unwrap();

        assert!(user.id.starts_with("12D3KooW"));
        assert!(!user.public_key.is_empty());

        let author = service.signing_identity(&user).unwrap();
        assert_eq!(author.public_key_base64(), user.public_key);
        assert_eq!(author.user_id(), user.id);
    }

    #[test]
    fn duplicate_username_conflicts() {
        let (service, _dir) = service();
        service.register(&request("alice")).unwrap();
        let err = service.register(&request("alice")).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn short_password_rejected() {
        let (service, _dir) = service();
        let err = service
            .register(&UserRegisterRequest {
                username: "alice".into(),
                password: "short".into(),
            })
            .unwrap_err();
        assert!(matches!(
            err,
            NodeError::Domain(DomainError::InvalidUser(_))
        ));
    }

    #[test]
    fn ensure_node_user_is_idempotent() {
        let (service, _dir) = service();
        let first = service.ensure_node_user("12D3KooWAbCdEfGh").unwrap();
        let second = service.ensure_node_user("12D3KooWAbCdEfGh").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.username, "node-AbCdEfGh");
    }

    #[test]
    fn password_verification() {
        let (service, _dir) = service();
        let user = service.register(&request("alice")).unwrap();
        assert!(service.verify_password(&user, "correct horse"));
        assert!(!service.verify_password(&user, "wrong"));
    }
}
