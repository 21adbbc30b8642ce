//! SQLite-backed [`ApplauseStore`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OpenFlags, OptionalExtension, TransactionBehavior, params};

use super::schema;
use super::{ApplauseStore, ToggleOutcome};
use crate::canonical::CanonicalUrl;
use crate::digest::UrlDigest;
use crate::error::{Error, Result};
use crate::identity::{ActorId, MEMBER_ACTOR_TYPE};

const SELECT_COUNT: &str = "SELECT clap_count FROM applause_counts WHERE url_hash = ?1";

const SELECT_MEMBER: &str = "SELECT 1 FROM applause_actor_claps
     WHERE url_hash = ?1 AND actor_type = ?2 AND actor = ?3";

const INSERT_MEMBER: &str = "INSERT OR IGNORE INTO applause_actor_claps
     (url_hash, actor_type, actor, claps, updated_at)
     VALUES (?1, ?2, ?3, 1, CURRENT_TIMESTAMP)";

const DELETE_MEMBER: &str = "DELETE FROM applause_actor_claps
     WHERE url_hash = ?1 AND actor_type = ?2 AND actor = ?3";

const UPSERT_COUNT: &str = "INSERT INTO applause_counts (url_hash, url, clap_count, updated_at)
     VALUES (?1, ?2, 1, CURRENT_TIMESTAMP)
     ON CONFLICT(url_hash) DO UPDATE SET
         clap_count = clap_count + 1,
         updated_at = CURRENT_TIMESTAMP";

const DECREMENT_COUNT: &str = "UPDATE applause_counts
     SET clap_count = MAX(0, clap_count - 1),
         updated_at = CURRENT_TIMESTAMP
     WHERE url_hash = ?1";

/// Configuration for the SQLite store.
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
}

impl Default for SqliteStoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("/data/applause.db"),
        }
    }
}

/// Read connections opened alongside the writer for file databases.
const READ_CONNECTIONS: usize = 4;

/// Applause store over SQLite.
///
/// All writes go through one mutex-guarded connection and begin `IMMEDIATE`
/// to take the write lock up front. File databases also get a small set of
/// read-only connections, so reads run concurrently with each other and with
/// the writer under WAL. In-memory databases read through the writer.
pub struct SqliteStore {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
}

impl SqliteStore {
    /// Open or create the database described by `config`.
    pub fn open(config: SqliteStoreConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let writer = Connection::open(&config.db_path).map_err(Error::storage("open"))?;

        writer
            .execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(Error::storage("pragma"))?;

        schema::init_schema(&writer).map_err(Error::storage("init_schema"))?;

        let readers = (0..READ_CONNECTIONS)
            .map(|_| {
                Connection::open_with_flags(
                    &config.db_path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )
                .map(Mutex::new)
                .map_err(Error::storage("open_reader"))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            db_path = %config.db_path.display(),
            readers = readers.len(),
            "applause database opened"
        );

        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::storage("open"))?;
        schema::init_schema(&conn).map_err(Error::storage("init_schema"))?;

        Ok(Self {
            writer: Mutex::new(conn),
            readers: Vec::new(),
            next_reader: AtomicUsize::new(0),
        })
    }

    /// Lock a connection for a read: an idle reader if there is one, else the
    /// next reader in turn, else the writer when no readers exist.
    fn reader(&self) -> MutexGuard<'_, Connection> {
        if self.readers.is_empty() {
            return self.writer.lock();
        }
        if let Some(idle) = self.readers.iter().find_map(|reader| reader.try_lock()) {
            return idle;
        }
        let next = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        self.readers[next].lock()
    }
}

impl ApplauseStore for SqliteStore {
    fn get_count(&self, digest: &UrlDigest) -> Result<u64> {
        let conn = self.reader();
        count_in(&conn, digest).map_err(Error::storage("get_count"))
    }

    fn get_membership(&self, digest: &UrlDigest, actor: &ActorId) -> Result<bool> {
        let conn = self.reader();
        membership_in(&conn, digest, actor).map_err(Error::storage("get_membership"))
    }

    fn clap(&self, digest: &UrlDigest, url: &CanonicalUrl, actor: &ActorId) -> Result<()> {
        in_write_tx(&mut self.writer.lock(), |tx| clap_in(tx, digest, url, actor))
            .map(|_| ())
            .map_err(Error::storage("clap"))
    }

    fn unclap(&self, digest: &UrlDigest, actor: &ActorId) -> Result<()> {
        in_write_tx(&mut self.writer.lock(), |tx| unclap_in(tx, digest, actor))
            .map(|_| ())
            .map_err(Error::storage("unclap"))
    }

    fn toggle(
        &self,
        digest: &UrlDigest,
        url: &CanonicalUrl,
        actor: &ActorId,
    ) -> Result<ToggleOutcome> {
        let outcome = in_write_tx(&mut self.writer.lock(), |tx| {
            let clapped = if membership_in(tx, digest, actor)? {
                unclap_in(tx, digest, actor)?;
                false
            } else {
                clap_in(tx, digest, url, actor)?;
                true
            };
            let count = count_in(tx, digest)?;
            Ok(ToggleOutcome { count, clapped })
        })
        .map_err(Error::storage("toggle"))?;

        tracing::debug!(%digest, clapped = outcome.clapped, count = outcome.count, "toggled");
        Ok(outcome)
    }
}

/// Run `f` inside an `IMMEDIATE` transaction. Dropping the transaction on
/// error rolls it back.
fn in_write_tx<T>(
    conn: &mut Connection,
    f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
) -> rusqlite::Result<T> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

fn count_in(conn: &Connection, digest: &UrlDigest) -> rusqlite::Result<u64> {
    let count: Option<i64> = conn
        .query_row(SELECT_COUNT, [digest], |row| row.get(0))
        .optional()?;
    Ok(count.unwrap_or(0).max(0) as u64)
}

fn membership_in(conn: &Connection, digest: &UrlDigest, actor: &ActorId) -> rusqlite::Result<bool> {
    conn.query_row(
        SELECT_MEMBER,
        params![digest, MEMBER_ACTOR_TYPE, actor.as_str()],
        |_| Ok(()),
    )
    .optional()
    .map(|row| row.is_some())
}

/// Insert the membership row and bump the count. The count only moves when
/// the insert created a row, so a repeated clap never double counts.
fn clap_in(
    conn: &Connection,
    digest: &UrlDigest,
    url: &CanonicalUrl,
    actor: &ActorId,
) -> rusqlite::Result<bool> {
    let inserted = conn.execute(
        INSERT_MEMBER,
        params![digest, MEMBER_ACTOR_TYPE, actor.as_str()],
    )?;
    if inserted == 0 {
        return Ok(false);
    }
    conn.execute(UPSERT_COUNT, params![digest, url.as_str()])?;
    Ok(true)
}

fn unclap_in(conn: &Connection, digest: &UrlDigest, actor: &ActorId) -> rusqlite::Result<bool> {
    let deleted = conn.execute(
        DELETE_MEMBER,
        params![digest, MEMBER_ACTOR_TYPE, actor.as_str()],
    )?;
    if deleted == 0 {
        return Ok(false);
    }
    conn.execute(DECREMENT_COUNT, [digest])?;
    Ok(true)
}
