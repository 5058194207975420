pub mod models;
pub mod repositories;

use crate::config::{ForumConfig, StorageBackend};
use anyhow::{anyhow, Context, Result};
use repositories::{ForumData, MemoryRepositories, Repositories, SqliteRepositories};
use rusqlite::Connection;
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub(crate) const MIGRATIONS: &str = r#"
    PRAGMA journal_mode = WAL;
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        credential TEXT NOT NULL,
        avatar_url TEXT,
        created_at TEXT NOT NULL,
        karma INTEGER NOT NULL DEFAULT 0,
        email_verified INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS communities (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE COLLATE NOCASE,
        display_name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        icon_url TEXT,
        banner_url TEXT,
        is_nsfw INTEGER NOT NULL DEFAULT 0,
        subscribers INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS posts (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        body_kind TEXT NOT NULL,
        body_value TEXT NOT NULL,
        community TEXT NOT NULL,
        author_id TEXT NOT NULL,
        author_name TEXT NOT NULL,
        created_at TEXT NOT NULL,
        upvotes INTEGER NOT NULL DEFAULT 0,
        downvotes INTEGER NOT NULL DEFAULT 0,
        comment_count INTEGER NOT NULL DEFAULT 0,
        is_stickied INTEGER NOT NULL DEFAULT 0,
        is_locked INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS comments (
        id TEXT PRIMARY KEY,
        post_id TEXT NOT NULL,
        author_id TEXT NOT NULL,
        author_name TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL,
        upvotes INTEGER NOT NULL DEFAULT 0,
        downvotes INTEGER NOT NULL DEFAULT 0,
        parent_id TEXT,
        level INTEGER NOT NULL DEFAULT 0,
        FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_posts_community ON posts(community COLLATE NOCASE);
    CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id);
    CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id);
    CREATE INDEX IF NOT EXISTS idx_comments_author ON comments(author_id);
"#;

/// Handle to the configured storage adapter. Cloning shares the same store.
#[derive(Clone)]
pub struct Database {
    backend: Backend,
    newly_created: bool,
}

#[derive(Clone)]
enum Backend {
    Sqlite(Arc<Mutex<Connection>>),
    Memory(Arc<Mutex<ForumData>>),
    JsonFile {
        data: Arc<Mutex<ForumData>>,
        path: PathBuf,
    },
}

impl Database {
    pub fn connect(config: &ForumConfig) -> Result<Self> {
        match config.storage {
            StorageBackend::Sqlite => {
                let newly_created = !config.paths.db_path.exists();
                let conn = Connection::open(&config.paths.db_path).with_context(|| {
                    format!("failed to open {}", config.paths.db_path.display())
                })?;
                Ok(Self::from_connection(conn, newly_created))
            }
            StorageBackend::Json => Self::json_file(&config.paths.json_path),
            StorageBackend::Memory => Ok(Self::in_memory()),
        }
    }

    pub fn from_connection(conn: Connection, newly_created: bool) -> Self {
        Self {
            backend: Backend::Sqlite(Arc::new(Mutex::new(conn))),
            newly_created,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(Mutex::new(ForumData::default()))),
            newly_created: true,
        }
    }

    /// Loads the JSON mirror at `path`, starting empty when it does not exist yet.
    pub fn json_file(path: &Path) -> Result<Self> {
        let newly_created = !path.exists();
        let data = if newly_created {
            ForumData::default()
        } else {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?
        };
        Ok(Self {
            backend: Backend::JsonFile {
                data: Arc::new(Mutex::new(data)),
                path: path.to_path_buf(),
            },
            newly_created,
        })
    }

    pub fn storage_kind(&self) -> StorageBackend {
        match self.backend {
            Backend::Sqlite(_) => StorageBackend::Sqlite,
            Backend::Memory(_) => StorageBackend::Memory,
            Backend::JsonFile { .. } => StorageBackend::Json,
        }
    }

    /// Applies the schema. Returns whether the store was freshly created.
    pub fn ensure_migrations(&self) -> Result<bool> {
        if let Backend::Sqlite(conn) = &self.backend {
            let guard = conn
                .lock()
                .map_err(|_| anyhow!("database mutex poisoned"))?;
            guard.execute_batch(MIGRATIONS)?;
        }
        Ok(self.newly_created)
    }

    /// Runs `f` as one atomic unit of work. A failing closure leaves the
    /// store exactly as it was before the call.
    pub fn with_repositories<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&dyn Repositories) -> std::result::Result<T, E>,
        E: From<anyhow::Error>,
    {
        match &self.backend {
            Backend::Sqlite(conn) => {
                let guard = conn
                    .lock()
                    .map_err(|_| anyhow!("database mutex poisoned"))?;
                let tx = guard
                    .unchecked_transaction()
                    .context("failed to open transaction")?;
                let value = f(&SqliteRepositories::new(&tx))?;
                tx.commit().context("failed to commit transaction")?;
                Ok(value)
            }
            Backend::Memory(data) => with_collections(data, None, f),
            Backend::JsonFile { data, path } => with_collections(data, Some(path), f),
        }
    }
}

fn with_collections<T, E, F>(
    data: &Mutex<ForumData>,
    mirror: Option<&Path>,
    f: F,
) -> std::result::Result<T, E>
where
    F: FnOnce(&dyn Repositories) -> std::result::Result<T, E>,
    E: From<anyhow::Error>,
{
    let mut guard = data
        .lock()
        .map_err(|_| anyhow!("forum data mutex poisoned"))?;
    let snapshot = guard.clone();
    let cell = RefCell::new(std::mem::take(&mut *guard));
    let dirty = Cell::new(false);
    let outcome = f(&MemoryRepositories::new(&cell, &dirty));
    match outcome {
        Ok(value) => {
            let updated = cell.into_inner();
            if let (true, Some(path)) = (dirty.get(), mirror) {
                if let Err(err) = write_json(path, &updated) {
                    *guard = snapshot;
                    return Err(err.into());
                }
            }
            *guard = updated;
            Ok(value)
        }
        Err(err) => {
            *guard = snapshot;
            Err(err)
        }
    }
}

fn write_json(path: &Path, data: &ForumData) -> Result<()> {
    let encoded = serde_json::to_vec_pretty(data)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, encoded).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;
    tracing::debug!(path = %path.display(), "json store persisted");
    Ok(())
}
