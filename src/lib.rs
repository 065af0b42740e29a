//! Entity mapping and SQLite execution helpers for the Runar ecosystem.
//!
//! # Intention
//!
//! - Translate database columns to entity fields once, at startup.
//! - Give every unit of work its own connection and transaction through a [`Session`].
//! - Shape raw result sets into entities, rows, scalars or keyed maps.
//!
//! # Architectural Boundaries
//!
//! - SQL is written by the caller; there is no query builder or schema migration.
//! - Connection handling beyond "open a connection" belongs to the [`DataSource`].

pub mod config;
pub mod datasource;
mod de;
pub mod entity;
pub mod error;
pub mod script;
pub mod shape;
pub mod sqlite;
pub mod value;

pub use config::{BeginFailure, BeginMode, Config, DatabaseConfig};
pub use datasource::{DataSource, SqliteDataSource};
pub use entity::{
    camel_to_underscore, ColumnMap, Entity, EntityCatalog, EntityInfo, EntityRegistry,
    EntitySource, Field,
};
pub use error::{Error, Result, RowError, ScriptError, TransactionError};
pub use script::{FileScriptSource, ScriptSource};
pub use shape::{Row, RowSet, Shaper};
pub use sqlite::{Database, Session};
pub use value::{FromValue, Value};
