use rusqlite::{Connection, OpenFlags};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Hands out a fresh, exclusively owned connection per call.
pub trait DataSource: fmt::Debug + Send + Sync {
    fn acquire(&self) -> rusqlite::Result<Connection>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteTarget {
    File(PathBuf),
    /// A named shared-cache in-memory database, addressed by URI.
    InMemory(String),
}

static NEXT_MEMORY_DB: AtomicU64 = AtomicU64::new(0);

fn memory_flags() -> OpenFlags {
    OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
}

/// SQLite data source for a database file or an in-memory database.
///
/// Every connection from one in-memory source (and its clones) opens the same
/// shared-cache database. The source holds an extra connection for as long as
/// it lives, so committed data survives after every session has released its
/// own connection. Separate `in_memory()` sources never see each other's data.
///
/// Shared-cache connections lock per table and report contention as
/// `SQLITE_LOCKED` right away; the busy timeout only applies to file databases.
#[derive(Debug, Clone)]
pub struct SqliteDataSource {
    target: SqliteTarget,
    busy_timeout: Duration,
    anchor: Arc<Mutex<Option<Connection>>>,
}

impl SqliteDataSource {
    /// `:memory:` selects an in-memory database; anything else is a file path.
    pub fn new(path: &str) -> Self {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::open(path)
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self::with_target(SqliteTarget::File(path.as_ref().to_path_buf()))
    }

    pub fn in_memory() -> Self {
        let id = NEXT_MEMORY_DB.fetch_add(1, Ordering::Relaxed);
        Self::with_target(SqliteTarget::InMemory(format!(
            "file:rust_sqlite_orm_mem_{}_{id}?mode=memory&cache=shared",
            std::process::id()
        )))
    }

    fn with_target(target: SqliteTarget) -> Self {
        Self {
            target,
            busy_timeout: Duration::from_secs(5),
            anchor: Arc::default(),
        }
    }

    /// How long a connection waits on a locked database before failing with `SQLITE_BUSY`.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn target(&self) -> &SqliteTarget {
        &self.target
    }

    /// Opens the in-memory database once and keeps it alive with this source.
    fn ensure_anchor(&self, uri: &str) -> rusqlite::Result<()> {
        let mut anchor = self.anchor.lock().unwrap_or_else(PoisonError::into_inner);
        if anchor.is_none() {
            log::debug!("opening in-memory database {uri}");
            *anchor = Some(Connection::open_with_flags(uri, memory_flags())?);
        }
        Ok(())
    }
}

impl DataSource for SqliteDataSource {
    fn acquire(&self) -> rusqlite::Result<Connection> {
        let connection = match &self.target {
            SqliteTarget::File(path) => Connection::open(path)?,
            SqliteTarget::InMemory(uri) => {
                self.ensure_anchor(uri)?;
                Connection::open_with_flags(uri, memory_flags())?
            }
        };
        connection.busy_timeout(self.busy_timeout)?;
        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_path_selects_a_private_shared_cache_database() {
        let first = SqliteDataSource::new(":memory:");
        let second = SqliteDataSource::in_memory();
        match (first.target(), second.target()) {
            (SqliteTarget::InMemory(a), SqliteTarget::InMemory(b)) => {
                assert_ne!(a, b);
                assert!(a.contains("mode=memory&cache=shared"));
            }
            other => panic!("unexpected targets: {other:?}"),
        }
        assert_eq!(first.clone().target(), first.target());
    }

    #[test]
    fn in_memory_data_outlives_its_connections() -> rusqlite::Result<()> {
        let source = SqliteDataSource::in_memory();
        {
            let conn = source.acquire()?;
            conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (7);")?;
        }
        let conn = source.clone().acquire()?;
        let x: i64 = conn.query_row("SELECT x FROM t", [], |row| row.get(0))?;
        assert_eq!(x, 7);
        Ok(())
    }
}
