//! `SQLite` persistence for state, images and suggestions.
#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)] // SQLite uses i64 for rowids

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::media::{ImageItem, MediaLibrary, MissingAltPage, MissingAltQuery, NewImage, ORDER_MODULUS};
use crate::state::StateStore;
use crate::suggestion::{
    NewSuggestion, SuggestionCounts, SuggestionRecord, SuggestionStatus, SuggestionStore,
};
use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const SCHEMA_VERSION: i32 = 1;

/// Code points Rust treats as whitespace (`char::is_whitespace`). SQLite's
/// one-argument `TRIM` only strips spaces.
pub(super) const WHITESPACE_CODE_POINTS: &[u32] = &[
    0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x20, 0x85, 0xA0, 0x1680, 0x2000, 0x2001, 0x2002, 0x2003,
    0x2004, 0x2005, 0x2006, 0x2007, 0x2008, 0x2009, 0x200A, 0x2028, 0x2029, 0x202F, 0x205F,
    0x3000,
];

/// Images lacking alt text. Whitespace-only alt text counts as missing, with
/// the same whitespace set as [`ImageItem::has_alt_text`].
fn missing_alt() -> String {
    let chars: Vec<String> = WHITESPACE_CODE_POINTS.iter().map(u32::to_string).collect();
    format!(
        "mime_type LIKE 'image/%' AND TRIM(alt_text, char({})) = ''",
        chars.join(", ")
    )
}

const IMAGE_COLUMNS: &str = "id, url, mime_type, title, caption, description, alt_text";
const SUGGESTION_COLUMNS: &str = "id, image_id, alt_text, status, model, created_at, applied_at, \
    request_payload, response_body, duration_secs";

pub struct SqliteStore {
    db: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    pub fn open(path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let db = Connection::open(path)?;
        // WAL lets a status query read while a scan is writing.
        db.execute_batch("PRAGMA journal_mode=WAL;")?;
        db.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::init(db, clock)
    }

    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, clock)
    }

    fn init(db: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        init_schema(&db)?;
        Ok(Self {
            db: Mutex::new(db),
            clock,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    pub fn add_image(&self, image: &NewImage) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            r"
            INSERT INTO images (url, mime_type, title, caption, description, alt_text, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                image.url,
                image.mime_type,
                image.title,
                image.caption,
                image.description,
                image.alt_text,
                self.now_millis()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_images(&self, limit: usize, offset: usize) -> Result<Vec<ImageItem>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {IMAGE_COLUMNS} FROM images ORDER BY id LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], image_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn init_schema(db: &Connection) -> Result<()> {
    let version: i32 = db.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    // Migration v0 -> v1: Initial schema
    if version < SCHEMA_VERSION {
        db.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS kv_state (
                key         TEXT PRIMARY KEY,
                value       TEXT NOT NULL,
                expires_at  INTEGER
            );

            CREATE TABLE IF NOT EXISTS images (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                url         TEXT NOT NULL,
                mime_type   TEXT NOT NULL,
                title       TEXT NOT NULL DEFAULT '',
                caption     TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                alt_text    TEXT NOT NULL DEFAULT '',
                created_at  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS suggestions (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                image_id        INTEGER NOT NULL,
                alt_text        TEXT NOT NULL,
                status          TEXT NOT NULL DEFAULT 'pending',
                model           TEXT NOT NULL,
                created_at      INTEGER NOT NULL,
                applied_at      INTEGER,
                request_payload TEXT NOT NULL DEFAULT '',
                response_body   TEXT NOT NULL DEFAULT '',
                duration_secs   REAL NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_suggestions_image_status
                ON suggestions(image_id, status);

            CREATE INDEX IF NOT EXISTS idx_suggestions_created
                ON suggestions(created_at DESC);

            PRAGMA user_version = 1;
            ",
        )?;
    }
    Ok(())
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn image_from_row(row: &Row<'_>) -> rusqlite::Result<ImageItem> {
    Ok(ImageItem {
        id: row.get(0)?,
        url: row.get(1)?,
        mime_type: row.get(2)?,
        title: row.get(3)?,
        caption: row.get(4)?,
        description: row.get(5)?,
        alt_text: row.get(6)?,
    })
}

fn suggestion_from_row(row: &Row<'_>) -> rusqlite::Result<SuggestionRecord> {
    let status: String = row.get(3)?;
    let status = status.parse::<SuggestionStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into())
    })?;
    Ok(SuggestionRecord {
        id: row.get(0)?,
        image_id: row.get(1)?,
        alt_text: row.get(2)?,
        status,
        model: row.get(4)?,
        created_at: from_millis(row.get(5)?),
        applied_at: row.get::<_, Option<i64>>(6)?.map(from_millis),
        request_payload: row.get(7)?,
        response_body: row.get(8)?,
        duration_secs: row.get(9)?,
    })
}

fn decode_value(key: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| {
        tracing::warn!(key, error = %e, "Corrupt state entry");
        Error::Serialization(e)
    })
}

impl StateStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT value FROM kv_state WHERE key = ?1 \
                 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, self.now_millis()],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|raw| decode_value(key, &raw)).transpose()
    }

    fn set(&self, key: &str, value: Value, ttl: Option<TimeDelta>) -> Result<()> {
        let expires_at = ttl.map(|ttl| self.now_millis() + ttl.num_milliseconds());
        self.conn().execute(
            r"
            INSERT INTO kv_state (key, value, expires_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            ",
            params![key, value.to_string(), expires_at],
        )?;
        Ok(())
    }

    fn set_if_absent(&self, key: &str, value: Value, ttl: Option<TimeDelta>) -> Result<bool> {
        let now = self.now_millis();
        let expires_at = ttl.map(|ttl| now + ttl.num_milliseconds());

        let mut conn = self.conn();
        // IMMEDIATE takes the write lock up front, so two processes cannot
        // both see the key as absent.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "DELETE FROM kv_state WHERE key = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2",
            params![key, now],
        )?;
        let inserted = tx.execute(
            "INSERT INTO kv_state (key, value, expires_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO NOTHING",
            params![key, value.to_string(), expires_at],
        )?;
        tx.commit()?;
        Ok(inserted == 1)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM kv_state WHERE key = ?1", params![key])?;
        Ok(())
    }
}

impl MediaLibrary for SqliteStore {
    fn missing_alt_page(&self, query: MissingAltQuery) -> Result<MissingAltPage> {
        let conn = self.conn();
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM images WHERE {}", missing_alt()),
            [],
            |row| row.get(0),
        )?;

        let seed = (query.seed % ORDER_MODULUS) as i64;
        let after = query.after.map_or(-1, |after| after as i64);
        let missing_alt = missing_alt();
        let mut stmt = conn.prepare(&format!(
            r"
            SELECT {IMAGE_COLUMNS}, sort_key FROM (
                SELECT {IMAGE_COLUMNS}, ((id % {ORDER_MODULUS}) * ?1) % {ORDER_MODULUS} AS sort_key
                FROM images WHERE {missing_alt}
            )
            WHERE sort_key > ?2
            ORDER BY sort_key
            LIMIT ?3
            "
        ))?;
        let rows = stmt.query_map(params![seed, after, query.limit as i64], |row| {
            Ok((image_from_row(row)?, row.get::<_, i64>(7)?))
        })?;
        let rows = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        let next = if query.limit > 0 && rows.len() == query.limit {
            rows.last().map(|(_, key)| *key as u64)
        } else {
            None
        };
        Ok(MissingAltPage {
            total: total as usize,
            items: rows.into_iter().map(|(image, _)| image).collect(),
            next,
        })
    }

    fn get_image(&self, id: i64) -> Result<Option<ImageItem>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = ?1"),
                params![id],
                image_from_row,
            )
            .optional()?)
    }

    fn set_alt_text(&self, id: i64, alt_text: &str) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE images SET alt_text = ?2 WHERE id = ?1",
            params![id, alt_text],
        )?;
        Ok(changed == 1)
    }

    fn example_alt_texts(&self, limit: usize) -> Result<Vec<(String, String)>> {
        let conn = self.conn();
        let missing_alt = missing_alt();
        let mut stmt = conn.prepare(&format!(
            "SELECT title, alt_text FROM images \
             WHERE mime_type LIKE 'image/%' AND NOT ({missing_alt}) \
             ORDER BY id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl SuggestionStore for SqliteStore {
    fn insert(&self, suggestion: &NewSuggestion) -> Result<SuggestionRecord> {
        let id = {
            let conn = self.conn();
            conn.execute(
                r"
                INSERT INTO suggestions
                    (image_id, alt_text, status, model, created_at, request_payload, response_body, duration_secs)
                VALUES (?1, ?2, 'pending', ?3, ?4, ?5, ?6, ?7)
                ",
                params![
                    suggestion.image_id,
                    suggestion.alt_text,
                    suggestion.model,
                    suggestion.created_at.timestamp_millis(),
                    suggestion.request_payload,
                    suggestion.response_body,
                    suggestion.duration_secs
                ],
            )?;
            conn.last_insert_rowid()
        };
        SuggestionStore::get(self, id)?
            .ok_or_else(|| Error::NotFound(format!("suggestion {id} after insert")))
    }

    fn get(&self, id: i64) -> Result<Option<SuggestionRecord>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {SUGGESTION_COLUMNS} FROM suggestions WHERE id = ?1"),
                params![id],
                suggestion_from_row,
            )
            .optional()?)
    }

    fn latest_for_image(
        &self,
        image_id: i64,
        status: SuggestionStatus,
    ) -> Result<Option<SuggestionRecord>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {SUGGESTION_COLUMNS} FROM suggestions \
                     WHERE image_id = ?1 AND status = ?2 \
                     ORDER BY created_at DESC, id DESC LIMIT 1"
                ),
                params![image_id, status.as_str()],
                suggestion_from_row,
            )
            .optional()?)
    }

    fn resolve(&self, id: i64, status: SuggestionStatus, at: DateTime<Utc>) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE suggestions SET status = ?2, applied_at = ?3 \
             WHERE id = ?1 AND status = 'pending'",
            params![id, status.as_str(), at.timestamp_millis()],
        )?;
        Ok(changed == 1)
    }

    fn list(
        &self,
        status: Option<SuggestionStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SuggestionRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUGGESTION_COLUMNS} FROM suggestions \
             WHERE ?1 IS NULL OR status = ?1 \
             ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt.query_map(
            params![status.map(SuggestionStatus::as_str), limit as i64, offset as i64],
            suggestion_from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn counts(&self) -> Result<SuggestionCounts> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM suggestions GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut counts = SuggestionCounts::default();
        for row in rows {
            let (status, count) = row?;
            let count = count as u64;
            match status.parse::<SuggestionStatus>() {
                Ok(SuggestionStatus::Pending) => counts.pending += count,
                Ok(SuggestionStatus::Applied) => counts.applied += count,
                Ok(SuggestionStatus::Rejected) => counts.rejected += count,
                Err(e) => tracing::warn!(error = %e, "Ignoring unknown suggestion status"),
            }
            counts.total += count;
        }
        Ok(counts)
    }
}
