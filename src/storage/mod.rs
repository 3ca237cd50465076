use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ConfigPaths, StorageOptions, ThemeMode};

mod schema;

/// Store key holding the serialized note collection.
pub const NOTES_KEY: &str = "penguin-notes-data";
/// Store key holding the scratch draft buffer.
pub const SCRATCH_KEY: &str = "penguin-draft-content";
/// Store key holding the literal theme string (`dark` / `light`).
pub const THEME_KEY: &str = "penguin-theme";

/// One note as it is persisted. The collection is stored as a JSON array of
/// these under [`NOTES_KEY`], with camelCase field names so the on-disk shape
/// stays portable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A stored value that exists but does not parse. Callers downgrade these to
/// defaults; the variants keep the log lines precise.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed note collection: {0}")]
    Notes(#[from] serde_json::Error),
    #[error("unrecognised theme value {0:?}")]
    Theme(String),
}

#[derive(Clone)]
pub struct StorageHandle {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl StorageHandle {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM kv WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .with_context(|| format!("reading store key {key:?}"))?;
            Ok(value)
        })
    }

    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .with_context(|| format!("writing store key {key:?}"))?;
            Ok(())
        })
    }

    /// Loads the note collection. `Ok(None)` means the key has never been
    /// written; a present-but-malformed value surfaces as a
    /// [`DecodeError::Notes`] inside the error chain.
    pub fn load_notes(&self) -> Result<Option<Vec<Note>>> {
        match self.get(NOTES_KEY)? {
            Some(raw) => {
                let notes = serde_json::from_str::<Vec<Note>>(&raw)
                    .map_err(DecodeError::Notes)
                    .context("decoding note collection")?;
                Ok(Some(notes))
            }
            None => Ok(None),
        }
    }

    pub fn save_notes(&self, notes: &[Note]) -> Result<()> {
        let payload = serde_json::to_string(notes).context("encoding note collection")?;
        self.put(NOTES_KEY, &payload)
    }

    pub fn load_scratch(&self) -> Result<Option<String>> {
        self.get(SCRATCH_KEY)
    }

    pub fn save_scratch(&self, content: &str) -> Result<()> {
        self.put(SCRATCH_KEY, content)
    }

    pub fn load_theme(&self) -> Result<Option<ThemeMode>> {
        match self.get(THEME_KEY)? {
            Some(raw) => {
                let mode = ThemeMode::from_store(&raw)
                    .ok_or_else(|| DecodeError::Theme(raw))
                    .context("decoding theme preference")?;
                Ok(Some(mode))
            }
            None => Ok(None),
        }
    }

    pub fn save_theme(&self, mode: ThemeMode) -> Result<()> {
        self.put(THEME_KEY, mode.as_store())
    }
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> Result<StorageHandle> {
    let db_path = &paths.database_path;
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    Ok(StorageHandle {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}
