use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, types::Value, Row};
use uuid::Uuid;

use gazette_shared::{Article, ArticleListFilter};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::repo::ArticleRepository;

const COLUMNS: &str = "id, cid, title, body, author, author_pubkey, origin, signature, \
                       timestamp, tags, category, version, created_at, updated_at";

pub struct SqliteArticleRepo {
    db: Arc<Database>,
}

impl SqliteArticleRepo {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl ArticleRepository for SqliteArticleRepo {
    fn upsert(&self, article: &Article) -> Result<()> {
        let tags = serde_json::to_string(&article.tags)?;
        self.db.with_conn(|conn| {
            conn.execute(
                &format!("INSERT OR REPLACE INTO articles ({COLUMNS}) \
                          VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"),
                params![
                    article.id.to_string(),
                    article.cid,
                    article.title,
                    article.body,
                    article.author,
                    article.author_pubkey,
                    article.origin,
                    article.signature,
                    article.timestamp.to_rfc3339(),
                    tags,
                    article.category,
                    article.version,
                    article.created_at.to_rfc3339(),
                    article.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    fn get_by_id(&self, id: Uuid) -> Result<Article> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM articles WHERE id = ?1"),
                params![id.to_string()],
                row_to_article,
            )
            .map_err(not_found)
        })
    }

    fn get_by_cid(&self, cid: &str) -> Result<Article> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM articles WHERE cid = ?1"),
                params![cid],
                row_to_article,
            )
            .map_err(not_found)
        })
    }

    fn exists(&self, id: Uuid) -> Result<bool> {
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM articles WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    fn delete(&self, id: Uuid) -> Result<bool> {
        self.db.with_conn(|conn| {
            let affected =
                conn.execute("DELETE FROM articles WHERE id = ?1", params![id.to_string()])?;
            Ok(affected > 0)
        })
    }

    fn list(&self, filter: &ArticleListFilter) -> Result<(Vec<Article>, u64)> {
        let filter = filter.clone().normalized();
        let (where_clause, args) = build_where(&filter);

        self.db.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM articles{where_clause}"),
                params_from_iter(args.iter()),
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM articles{where_clause} \
                 ORDER BY timestamp DESC LIMIT ?{} OFFSET ?{}",
                args.len() + 1,
                args.len() + 2,
            ))?;
            let mut all_args = args.clone();
            all_args.push(Value::Integer(filter.limit as i64));
            all_args.push(Value::Integer(filter.offset() as i64));

            let rows = stmt.query_map(params_from_iter(all_args.iter()), row_to_article)?;
            let mut articles = Vec::new();
            for row in rows {
                articles.push(row?);
            }
            Ok((articles, total as u64))
        })
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<Article>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM articles ORDER BY timestamp DESC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit as i64], row_to_article)?;
            let mut articles = Vec::new();
            for row in rows {
                articles.push(row?);
            }
            Ok(articles)
        })
    }

    fn list_recent_since(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<Article>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM articles WHERE timestamp > ?1 \
                 ORDER BY timestamp DESC LIMIT ?2"
            ))?;
            let rows =
                stmt.query_map(params![since.to_rfc3339(), limit as i64], row_to_article)?;
            let mut articles = Vec::new();
            for row in rows {
                articles.push(row?);
            }
            Ok(articles)
        })
    }

    fn list_by_author(&self, author: &str, page: u32, limit: u32) -> Result<(Vec<Article>, u64)> {
        let filter = ArticleListFilter {
            author: Some(author.to_string()),
            page,
            limit,
            ..Default::default()
        };
        self.list(&filter)
    }
}

fn build_where(filter: &ArticleListFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut args: Vec<Value> = Vec::new();

    if let Some(ref author) = filter.author {
        args.push(Value::Text(author.clone()));
        clauses.push(format!("author = ?{}", args.len()));
    }
    if let Some(ref category) = filter.category {
        args.push(Value::Text(category.clone()));
        clauses.push(format!("category = ?{}", args.len()));
    }
    if let Some(ref tag) = filter.tag {
        // tags column is a JSON array of strings
        args.push(Value::Text(format!("%\"{tag}\"%")));
        clauses.push(format!("tags LIKE ?{}", args.len()));
    }
    if let Some(from) = filter.from {
        args.push(Value::Text(from.to_rfc3339()));
        clauses.push(format!("timestamp >= ?{}", args.len()));
    }
    if let Some(to) = filter.to {
        args.push(Value::Text(to.to_rfc3339()));
        clauses.push(format!("timestamp <= ?{}", args.len()));
    }

    if clauses.is_empty() {
        (String::new(), args)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), args)
    }
}

fn not_found(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        other => StoreError::Sqlite(other),
    }
}

fn row_to_article(row: &Row<'_>) -> rusqlite::Result<Article> {
    let id_str: String = row.get(0)?;
    let ts_str: String = row.get(8)?;
    let tags_str: String = row.get(9)?;
    let created_str: String = row.get(12)?;
    let updated_str: String = row.get(13)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let timestamp = parse_ts(&ts_str, 8)?;
    let tags: Vec<String> = serde_json::from_str(&tags_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let created_at = parse_ts(&created_str, 12)?;
    let updated_at = parse_ts(&updated_str, 13)?;

    Ok(Article {
        id,
        cid: row.get(1)?,
        title: row.get(2)?,
        body: row.get(3)?,
        author: row.get(4)?,
        author_pubkey: row.get(5)?,
        origin: row.get(6)?,
        signature: row.get(7)?,
        timestamp,
        tags,
        category: row.get(10)?,
        version: row.get(11)?,
        created_at,
        updated_at,
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
