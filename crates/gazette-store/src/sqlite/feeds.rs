use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use uuid::Uuid;

use gazette_shared::Feed;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::repo::FeedRepository;
use crate::sqlite::map_conflict;

const COLUMNS: &str = "id, name, pointer_key, pointer_address, last_cid, last_sync, \
                       sync_interval, created_at, updated_at";

pub struct SqliteFeedRepo {
    db: Arc<Database>,
}

impl SqliteFeedRepo {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl FeedRepository for SqliteFeedRepo {
    fn create(&self, feed: &Feed) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO feeds ({COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    feed.id.to_string(),
                    feed.name,
                    feed.pointer_key,
                    feed.pointer_address,
                    feed.last_cid,
                    feed.last_sync.map(|ts| ts.to_rfc3339()),
                    feed.sync_interval_minutes,
                    feed.created_at.to_rfc3339(),
                    feed.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| map_conflict(e, "feed"))?;
            Ok(())
        })
    }

    fn get_by_name(&self, name: &str) -> Result<Feed> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM feeds WHERE name = ?1"),
                params![name],
                row_to_feed,
            )
            .map_err(not_found)
        })
    }

    fn list(&self) -> Result<Vec<Feed>> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {COLUMNS} FROM feeds ORDER BY name"))?;
            let rows = stmt.query_map([], row_to_feed)?;
            let mut feeds = Vec::new();
            for row in rows {
                feeds.push(row?);
            }
            Ok(feeds)
        })
    }

    fn update(&self, feed: &Feed) -> Result<()> {
        self.db.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE feeds SET pointer_key = ?2, pointer_address = ?3, last_cid = ?4, \
                 last_sync = ?5, sync_interval = ?6, updated_at = ?7 WHERE id = ?1",
                params![
                    feed.id.to_string(),
                    feed.pointer_key,
                    feed.pointer_address,
                    feed.last_cid,
                    feed.last_sync.map(|ts| ts.to_rfc3339()),
                    feed.sync_interval_minutes,
                    feed.updated_at.to_rfc3339(),
                ],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    fn delete(&self, id: Uuid) -> Result<bool> {
        self.db.with_conn(|conn| {
            let affected =
                conn.execute("DELETE FROM feeds WHERE id = ?1", params![id.to_string()])?;
            Ok(affected > 0)
        })
    }

    fn list_due_for_sync(&self, now: DateTime<Utc>) -> Result<Vec<Feed>> {
        Ok(self.list()?.into_iter().filter(|f| f.due_for_sync(now)).collect())
    }
}

fn not_found(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        other => StoreError::Sqlite(other),
    }
}

fn row_to_feed(row: &Row<'_>) -> rusqlite::Result<Feed> {
    let id_str: String = row.get(0)?;
    let last_sync_str: Option<String> = row.get(5)?;
    let created_str: String = row.get(7)?;
    let updated_str: String = row.get(8)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let last_sync = match last_sync_str {
        Some(value) => Some(parse_ts(&value, 5)?),
        None => None,
    };

    Ok(Feed {
        id,
        name: row.get(1)?,
        pointer_key: row.get(2)?,
        pointer_address: row.get(3)?,
        last_cid: row.get(4)?,
        last_sync,
        sync_interval_minutes: row.get(6)?,
        created_at: parse_ts(&created_str, 7)?,
        updated_at: parse_ts(&updated_str, 8)?,
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
