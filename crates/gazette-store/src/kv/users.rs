use std::sync::Arc;

use sled::transaction::ConflictableTransactionResult;
use sled::Transactional;

use gazette_shared::User;

use crate::error::{Result, StoreError};
use crate::kv::KvDatabase;
use crate::repo::UserRepository;

pub struct KvUserRepo {
    users: sled::Tree,
    by_name: sled::Tree,
}

impl KvUserRepo {
    pub fn new(db: Arc<KvDatabase>) -> Result<Self> {
        Ok(Self {
            users: db.tree("users")?,
            by_name: db.tree("users_name")?,
        })
    }
}

impl UserRepository for KvUserRepo {
    fn create(&self, user: &User) -> Result<()> {
        if self.by_name.contains_key(user.username.as_bytes())?
            || self.users.contains_key(user.id.as_bytes())?
        {
            return Err(StoreError::Conflict("user"));
        }
        let data = serde_json::to_vec(user)?;

        (&self.users, &self.by_name)
            .transaction(|(users, by_name)| -> ConflictableTransactionResult<(), ()> {
                users.insert(user.id.as_bytes(), data.as_slice())?;
                by_name.insert(user.username.as_bytes(), user.id.as_bytes())?;
                Ok(())
            })
            .map_err(|e| match e {
                sled::transaction::TransactionError::Storage(e) => StoreError::Sled(e),
                sled::transaction::TransactionError::Abort(()) => StoreError::Conflict("user"),
            })?;
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> Result<User> {
        let raw = self.users.get(id.as_bytes())?.ok_or(StoreError::NotFound)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    fn get_by_username(&self, username: &str) -> Result<User> {
        let id = self
            .by_name
            .get(username.as_bytes())?
            .ok_or(StoreError::NotFound)?;
        let raw = self.users.get(&id)?.ok_or(StoreError::NotFound)?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn repo() -> (KvUserRepo, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(KvDatabase::open(&dir.path().join("kv")).unwrap());
        (KvUserRepo::new(db).unwrap(), dir)
    }

    fn user(name: &str) -> User {
        let now = Utc::now();
        User {
            id: format!("peer-{name}"),
            username: name.into(),
            password_hash: "$argon2id$hash".into(),
            public_key: "cHVi".into(),
            private_key: "ZW5j".into(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn create_get_round_trip() {
        let (repo, _dir) = repo();
        let u = user("alice");
        repo.create(&u).unwrap();
        assert_eq!(repo.get_by_id(&u.id).unwrap().username, "alice");
        assert_eq!(repo.get_by_username("alice").unwrap().id, u.id);
    }

    #[test]
    fn duplicate_username_is_conflict() {
        let (repo, _dir) = repo();
        repo.create(&user("alice")).unwrap();
        let mut dup = user("alice");
        dup.id = "peer-other".into();
        assert!(matches!(repo.create(&dup), Err(StoreError::Conflict(_))));
    }

    #[test]
    fn unknown_user_is_not_found() {
        let (repo, _dir) = repo();
        assert!(matches!(
            repo.get_by_username("nobody"),
            Err(StoreError::NotFound)
        ));
    }
}
