use std::path::PathBuf;
use thiserror::Error;

use crate::value::Value;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the registry, the session and its query family.
#[derive(Debug, Error)]
pub enum Error {
    /// The entity registry could not be built. Fatal at startup.
    #[error("entity registry initialization failed: {0}")]
    Initialization(String),

    #[error("invalid database configuration: {0}")]
    Config(String),

    #[error("database support is disabled; set `database.type` to enable it")]
    Disabled,

    #[error("failed to acquire a database connection")]
    ConnectionAcquisition(#[source] rusqlite::Error),

    #[error("cannot {action} transaction")]
    Transaction {
        action: &'static str,
        #[source]
        reason: TransactionError,
    },

    #[error("query failed: {sql}")]
    Query {
        sql: String,
        #[source]
        source: RowError,
    },

    #[error("update failed: {sql}")]
    Update {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("insert failed: {sql}")]
    Insert {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("sql script `{}` failed", path.display())]
    Script {
        path: PathBuf,
        #[source]
        source: ScriptError,
    },
}

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("a transaction is already in progress")]
    AlreadyActive,

    #[error("no connection is bound to the session")]
    NotBound,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Failure while fetching or shaping a result set.
#[derive(Debug, Error)]
pub enum RowError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("column `{0}` not found in result set")]
    MissingColumn(String),

    #[error("cannot convert {} value {value:?} into {target}", value.type_name())]
    Conversion { value: Value, target: &'static str },

    #[error("cannot map row into `{entity}`")]
    Entity {
        entity: &'static str,
        #[source]
        source: serde::de::value::Error,
    },
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to read script")]
    Read(#[from] std::io::Error),

    #[error("statement on line {line} failed")]
    Statement {
        line: usize,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn transaction(action: &'static str, reason: impl Into<TransactionError>) -> Self {
        Error::Transaction {
            action,
            reason: reason.into(),
        }
    }
}
