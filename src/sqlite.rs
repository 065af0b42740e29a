use indexmap::{IndexMap, IndexSet};
use rusqlite::{Connection, Params};
use std::hash::Hash;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{BeginFailure, BeginMode, Config};
use crate::datasource::{DataSource, SqliteDataSource};
use crate::entity::{Entity, EntityRegistry, EntitySource};
use crate::error::{Error, Result, RowError, ScriptError, TransactionError};
use crate::script::{FileScriptSource, ScriptSource};
use crate::shape::{
    self, ArrayListShaper, ArrayShaper, ColumnListShaper, ColumnSetShaper, CountShaper,
    EntityListShaper, EntityMapShaper, EntityShaper, KeyedShaper, MapListShaper, MapShaper, Row,
    ScalarShaper, Shaper,
};
use crate::value::{FromValue, Value};

/// Shared entry point: configuration, data source and entity registry.
///
/// Cheap to clone. Each unit of work opens its own [`Session`].
#[derive(Debug, Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    database_type: Option<String>,
    data_source: Option<Arc<dyn DataSource>>,
    registry: Arc<EntityRegistry>,
    scripts: Arc<dyn ScriptSource>,
    begin_mode: BeginMode,
    on_begin_failure: BeginFailure,
}

impl Database {
    /// Builds the entity registry, then the data source described by `config`.
    ///
    /// A registry failure is fatal. When no database type is configured the
    /// returned database is disabled and refuses to open sessions.
    pub fn from_config(config: &Config, entities: &dyn EntitySource) -> Result<Self> {
        let registry = EntityRegistry::build(entities)?;
        let db = &config.database;

        let data_source: Option<Arc<dyn DataSource>> = match config.database_type() {
            None => {
                log::debug!("no database type configured, database support disabled");
                None
            }
            Some(kind) if kind.eq_ignore_ascii_case("sqlite") => Some(Arc::new(
                SqliteDataSource::new(&db.path)
                    .with_busy_timeout(Duration::from_millis(db.busy_timeout_ms)),
            )),
            Some(other) => {
                return Err(Error::Config(format!(
                    "unsupported database type `{other}`"
                )))
            }
        };

        Ok(Self {
            inner: Arc::new(Inner {
                database_type: config.database_type().map(str::to_string),
                data_source,
                registry: Arc::new(registry),
                scripts: Arc::new(FileScriptSource::new(&db.script_root)),
                begin_mode: db.begin_mode,
                on_begin_failure: db.on_begin_failure,
            }),
        })
    }

    /// An enabled SQLite database over an explicit data source.
    pub fn new(data_source: impl DataSource + 'static, registry: EntityRegistry) -> Self {
        Self {
            inner: Arc::new(Inner {
                database_type: Some("sqlite".to_string()),
                data_source: Some(Arc::new(data_source)),
                registry: Arc::new(registry),
                scripts: Arc::new(FileScriptSource::default()),
                begin_mode: BeginMode::default(),
                on_begin_failure: BeginFailure::default(),
            }),
        }
    }

    /// A database with support switched off.
    pub fn disabled(registry: EntityRegistry) -> Self {
        Self {
            inner: Arc::new(Inner {
                database_type: None,
                data_source: None,
                registry: Arc::new(registry),
                scripts: Arc::new(FileScriptSource::default()),
                begin_mode: BeginMode::default(),
                on_begin_failure: BeginFailure::default(),
            }),
        }
    }

    pub fn with_begin_mode(self, begin_mode: BeginMode) -> Self {
        self.map_inner(|inner| inner.begin_mode = begin_mode)
    }

    pub fn with_begin_failure(self, on_begin_failure: BeginFailure) -> Self {
        self.map_inner(|inner| inner.on_begin_failure = on_begin_failure)
    }

    pub fn with_script_source(self, scripts: impl ScriptSource + 'static) -> Self {
        self.map_inner(|inner| inner.scripts = Arc::new(scripts))
    }

    fn map_inner(self, f: impl FnOnce(&mut Inner)) -> Self {
        let mut inner = Arc::try_unwrap(self.inner).unwrap_or_else(|shared| Inner {
            database_type: shared.database_type.clone(),
            data_source: shared.data_source.clone(),
            registry: shared.registry.clone(),
            scripts: shared.scripts.clone(),
            begin_mode: shared.begin_mode,
            on_begin_failure: shared.on_begin_failure,
        });
        f(&mut inner);
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn database_type(&self) -> Option<&str> {
        self.inner.database_type.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.data_source.is_some()
    }

    pub fn data_source(&self) -> Option<&Arc<dyn DataSource>> {
        self.inner.data_source.as_ref()
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.inner.registry
    }

    /// Opens a unit of work. No connection is acquired until it is needed.
    pub fn session(&self) -> Result<Session<'_>> {
        let data_source = self.inner.data_source.as_deref().ok_or(Error::Disabled)?;
        Ok(Session {
            db: &self.inner,
            data_source,
            connection: None,
        })
    }
}

/// One unit of work: at most one connection and at most one transaction.
///
/// The connection is acquired lazily and reused by every call until the
/// transaction is committed or rolled back, or the session is dropped.
#[derive(Debug)]
pub struct Session<'db> {
    db: &'db Inner,
    data_source: &'db dyn DataSource,
    connection: Option<Connection>,
}

impl<'db> Session<'db> {
    /// The bound connection, acquiring one from the data source if needed.
    pub fn connection(&mut self) -> Result<&Connection> {
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => {
                let connection = self.data_source.acquire().map_err(|err| {
                    log::error!("failed to acquire connection: {err}");
                    Error::ConnectionAcquisition(err)
                })?;
                log::debug!("connection bound to session");
                connection
            }
        };
        let connection: &Connection = self.connection.insert(connection);
        Ok(connection)
    }

    pub fn is_bound(&self) -> bool {
        self.connection.is_some()
    }

    /// True when a connection is bound and auto-commit is off.
    pub fn in_transaction(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|connection| !connection.is_autocommit())
    }

    pub fn begin_transaction(&mut self) -> Result<()> {
        if self.in_transaction() {
            return Err(Error::transaction("begin", TransactionError::AlreadyActive));
        }

        let statement = self.db.begin_mode.statement();
        let on_failure = self.db.on_begin_failure;
        let connection = self.connection()?;
        if let Err(err) = connection.execute_batch(statement) {
            log::error!("failed to begin transaction: {err}");
            if on_failure == BeginFailure::Unbind {
                self.connection = None;
            }
            return Err(Error::transaction("begin", err));
        }

        log::debug!("transaction started ({statement})");
        Ok(())
    }

    pub fn commit_transaction(&mut self) -> Result<()> {
        self.finish("commit", "COMMIT")
    }

    pub fn rollback_transaction(&mut self) -> Result<()> {
        self.finish("rollback", "ROLLBACK")
    }

    // The connection is unbound before anything can fail.
    fn finish(&mut self, action: &'static str, statement: &str) -> Result<()> {
        let connection = self
            .connection
            .take()
            .ok_or_else(|| Error::transaction(action, TransactionError::NotBound))?;

        let outcome = match connection.execute_batch(statement) {
            Ok(()) => connection.close().map_err(|(_, err)| err),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => {
                log::debug!("transaction {action} complete, connection released");
                Ok(())
            }
            Err(err) => {
                log::error!("transaction {action} failed: {err}");
                Err(Error::transaction(action, err))
            }
        }
    }

    /// Runs `sql` and hands the complete result set to `shaper`.
    ///
    /// All `query_*` methods go through here.
    pub fn query_with<S: Shaper, P: Params>(
        &mut self,
        sql: &str,
        params: P,
        shaper: S,
    ) -> Result<S::Output> {
        let connection = self.connection()?;
        let shaped = shape::fetch(connection, sql, params)
            .map_err(RowError::from)
            .and_then(|rows| shaper.shape(rows));

        match shaped {
            Ok(output) => {
                log::debug!("SQL - {sql}");
                Ok(output)
            }
            Err(source) => {
                log::error!("query failed: {source}; sql: {sql}");
                Err(Error::Query {
                    sql: sql.to_string(),
                    source,
                })
            }
        }
    }

    /// First row as an entity, translating columns through the registry.
    pub fn query_entity<T: Entity, P: Params>(&mut self, sql: &str, params: P) -> Result<Option<T>> {
        let db = self.db;
        let translation = db.registry.get::<T>();
        self.query_with(sql, params, EntityShaper::<T>::new(translation))
    }

    pub fn query_entity_list<T: Entity, P: Params>(&mut self, sql: &str, params: P) -> Result<Vec<T>> {
        let db = self.db;
        let translation = db.registry.get::<T>();
        self.query_with(sql, params, EntityListShaper::<T>::new(translation))
    }

    /// Entities keyed by the first selected column. No column translation is applied.
    pub fn query_entity_map<K, T, P>(&mut self, sql: &str, params: P) -> Result<IndexMap<K, T>>
    where
        K: FromValue + Eq + Hash,
        T: Entity,
        P: Params,
    {
        self.query_with(sql, params, EntityMapShaper::<K, T>::default())
    }

    pub fn query_array<P: Params>(&mut self, sql: &str, params: P) -> Result<Option<Vec<Value>>> {
        self.query_with(sql, params, ArrayShaper)
    }

    pub fn query_array_list<P: Params>(&mut self, sql: &str, params: P) -> Result<Vec<Vec<Value>>> {
        self.query_with(sql, params, ArrayListShaper)
    }

    pub fn query_map<P: Params>(&mut self, sql: &str, params: P) -> Result<Option<Row>> {
        self.query_with(sql, params, MapShaper)
    }

    pub fn query_map_list<P: Params>(&mut self, sql: &str, params: P) -> Result<Vec<Row>> {
        self.query_with(sql, params, MapListShaper)
    }

    /// First column of the first row; `None` when no row matches.
    pub fn query_field<T: FromValue, P: Params>(&mut self, sql: &str, params: P) -> Result<Option<T>> {
        self.query_with(sql, params, ScalarShaper::<T>::default())
    }

    pub fn query_field_list<T: FromValue, P: Params>(&mut self, sql: &str, params: P) -> Result<Vec<T>> {
        self.query_with(sql, params, ColumnListShaper::<T>::default())
    }

    pub fn query_field_set<T, P>(&mut self, sql: &str, params: P) -> Result<IndexSet<T>>
    where
        T: FromValue + Eq + Hash,
        P: Params,
    {
        self.query_with(sql, params, ColumnSetShaper::<T>::default())
    }

    /// Full rows keyed by the value of `column`.
    pub fn query_field_map<K, P>(&mut self, column: &str, sql: &str, params: P) -> Result<IndexMap<K, Row>>
    where
        K: FromValue + Eq + Hash,
        P: Params,
    {
        self.query_with(sql, params, KeyedShaper::<K>::new(column))
    }

    pub fn query_count<P: Params>(&mut self, sql: &str, params: P) -> Result<u64> {
        self.query_with(sql, params, CountShaper)
    }

    /// Executes an INSERT, UPDATE or DELETE and returns the affected row count.
    pub fn update<P: Params>(&mut self, sql: &str, params: P) -> Result<usize> {
        let connection = self.connection()?;
        match connection.execute(sql, params) {
            Ok(rows) => {
                log::debug!("SQL - {sql}");
                Ok(rows)
            }
            Err(source) => {
                log::error!("update failed: {source}; sql: {sql}");
                Err(Error::Update {
                    sql: sql.to_string(),
                    source,
                })
            }
        }
    }

    /// Executes an insert and returns the generated rowid if exactly one row went in.
    pub fn insert_return_pk<P: Params>(&mut self, sql: &str, params: P) -> Result<Option<i64>> {
        let connection = self.connection()?;
        let outcome = connection
            .prepare(sql)
            .and_then(|mut stmt| stmt.execute(params))
            .map(|rows| (rows == 1).then(|| connection.last_insert_rowid()));

        match outcome {
            Ok(key) => {
                log::debug!("SQL - {sql}");
                Ok(key)
            }
            Err(source) => {
                log::error!("insert failed: {source}; sql: {sql}");
                Err(Error::Insert {
                    sql: sql.to_string(),
                    source,
                })
            }
        }
    }

    /// Runs a script of one statement per line, stopping at the first failure.
    ///
    /// Blank lines and `--` comments are skipped. Statements that already ran
    /// are only undone if the caller wrapped this call in a transaction.
    pub fn init_sql(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let script_error = |source: ScriptError| {
            log::error!("sql script {} failed: {source}", path.display());
            Error::Script {
                path: path.to_path_buf(),
                source,
            }
        };

        let lines = self
            .db
            .scripts
            .read_lines(path)
            .map_err(|err| script_error(ScriptError::Read(err)))?;

        for (index, line) in lines.iter().enumerate() {
            let sql = line.trim();
            if sql.is_empty() || sql.starts_with("--") {
                continue;
            }
            self.update(sql, []).map_err(|err| {
                script_error(ScriptError::Statement {
                    line: index + 1,
                    source: Box::new(err),
                })
            })?;
        }
        Ok(())
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if self.in_transaction() {
            log::warn!("session dropped with an open transaction, rolling back");
        }
    }
}
