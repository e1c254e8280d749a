use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use gazette_shared::User;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::repo::UserRepository;
use crate::sqlite::map_conflict;

const COLUMNS: &str =
    "id, username, password_hash, public_key, private_key, is_active, created_at, updated_at";

pub struct SqliteUserRepo {
    db: Arc<Database>,
}

impl SqliteUserRepo {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl UserRepository for SqliteUserRepo {
    fn create(&self, user: &User) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO users ({COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                params![
                    user.id,
                    user.username,
                    user.password_hash,
                    user.public_key,
                    user.private_key,
                    user.is_active as i64,
                    user.created_at.to_rfc3339(),
                    user.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| map_conflict(e, "user"))?;
            Ok(())
        })
    }

    fn get_by_id(&self, id: &str) -> Result<User> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                row_to_user,
            )
            .map_err(not_found)
        })
    }

    fn get_by_username(&self, username: &str) -> Result<User> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                row_to_user,
            )
            .map_err(not_found)
        })
    }
}

fn not_found(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        other => StoreError::Sqlite(other),
    }
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let created_str: String = row.get(6)?;
    let updated_str: String = row.get(7)?;
    let is_active: i64 = row.get(5)?;

    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        public_key: row.get(3)?,
        private_key: row.get(4)?,
        is_active: is_active != 0,
        created_at: parse_ts(&created_str, 6)?,
        updated_at: parse_ts(&updated_str, 7)?,
    })
}

fn parse_ts(value: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}
