#![allow(dead_code)]

use rust_sqlite_orm::{Database, Entity, EntityCatalog, EntityRegistry, Field, SqliteDataSource};
use serde::Deserialize;
use std::time::Duration;
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub user_name: String,
    pub email: String,
    #[serde(default)]
    pub age: Option<i64>,
}

impl Entity for User {
    fn fields() -> &'static [Field] {
        const FIELDS: &[Field] = &[
            Field::new("id"),
            Field::new("userName"),
            Field::new("email"),
            Field::new("age"),
        ];
        FIELDS
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub order_no: String,
    pub created_at: String,
}

impl Entity for Order {
    fn fields() -> &'static [Field] {
        const FIELDS: &[Field] = &[
            Field::new("id"),
            Field::with_column("orderNo", "order_number"),
            Field::new("createdAt"),
        ];
        FIELDS
    }
}

/// Columns match fields one to one, so it never enters the registry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub label: String,
}

impl Entity for Tag {
    fn fields() -> &'static [Field] {
        const FIELDS: &[Field] = &[Field::new("id"), Field::new("label")];
        FIELDS
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn catalog() -> EntityCatalog {
    EntityCatalog::new()
        .register::<User>()
        .register::<Order>()
        .register::<Tag>()
}

pub fn registry() -> EntityRegistry {
    EntityRegistry::build(&catalog()).expect("registry builds")
}

pub const SCHEMA: &str = r#"
    CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        user_name TEXT NOT NULL,
        email TEXT UNIQUE NOT NULL,
        age INTEGER
    );
    CREATE INDEX idx_users_email ON users(email);
    CREATE TABLE orders (
        id INTEGER PRIMARY KEY,
        order_number TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE TABLE tags (
        id INTEGER PRIMARY KEY,
        label TEXT NOT NULL
    );
"#;

/// File-backed database with the test schema, so several sessions share data.
pub fn create_temp_db() -> (Database, NamedTempFile) {
    create_temp_db_with_timeout(Duration::from_secs(5))
}

pub fn create_temp_db_with_timeout(busy_timeout: Duration) -> (Database, NamedTempFile) {
    init_logger();
    let temp_file = NamedTempFile::new().expect("temp file");
    let source = SqliteDataSource::open(temp_file.path()).with_busy_timeout(busy_timeout);
    let db = Database::new(source, registry());

    let mut session = db.session().expect("session");
    session
        .connection()
        .expect("connection")
        .execute_batch(SCHEMA)
        .expect("schema");
    drop(session);

    (db, temp_file)
}

pub fn seed_users(db: &Database) {
    let mut session = db.session().expect("session");
    for (name, email, age) in [
        ("John Doe", "john@example.com", Some(30)),
        ("Jane Roe", "jane@example.com", Some(25)),
        ("Max Moe", "max@example.com", None),
    ] {
        session
            .update(
                "INSERT INTO users (user_name, email, age) VALUES (?1, ?2, ?3)",
                rusqlite::params![name, email, age],
            )
            .expect("seed user");
    }
}
