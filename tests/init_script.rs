mod common;

use rust_sqlite_orm::{Error, FileScriptSource, ScriptError, ScriptSource};
use std::fs;
use std::io;
use std::path::Path;

#[test]
fn runs_every_statement_in_order() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join("seed.sql"),
        "-- seed data\n\
         INSERT INTO tags (label) VALUES ('one')\n\
         \n\
         INSERT INTO tags (label) VALUES ('two')\n\
         UPDATE tags SET label = upper(label) WHERE label = 'two'\n",
    )?;

    let (db, _file) = common::create_temp_db();
    let db = db.with_script_source(FileScriptSource::new(dir.path()));
    let mut session = db.session()?;
    session.init_sql("seed.sql")?;

    let labels: Vec<String> = session.query_field_list("SELECT label FROM tags ORDER BY id", [])?;
    assert_eq!(labels, ["one", "TWO"]);
    Ok(())
}

#[test]
fn stops_at_first_failing_statement() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join("broken.sql"),
        "INSERT INTO tags (label) VALUES ('first')\n\
         INSERT INTO missing (label) VALUES ('second')\n\
         INSERT INTO tags (label) VALUES ('third')\n",
    )?;

    let (db, _file) = common::create_temp_db();
    let db = db.with_script_source(FileScriptSource::new(dir.path()));
    let mut session = db.session()?;

    let err = session.init_sql("broken.sql").unwrap_err();
    match err {
        Error::Script {
            path,
            source: ScriptError::Statement { line, source },
        } => {
            assert_eq!(path, Path::new("broken.sql"));
            assert_eq!(line, 2);
            assert!(matches!(*source, Error::Update { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // The first statement stays applied, the third never ran.
    let labels: Vec<String> = session.query_field_list("SELECT label FROM tags", [])?;
    assert_eq!(labels, ["first"]);
    Ok(())
}

#[test]
fn transaction_undoes_partial_script() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join("broken.sql"),
        "INSERT INTO tags (label) VALUES ('first')\nNOT SQL AT ALL\n",
    )?;

    let (db, _file) = common::create_temp_db();
    let db = db.with_script_source(FileScriptSource::new(dir.path()));
    let mut session = db.session()?;

    session.begin_transaction()?;
    assert!(session.init_sql("broken.sql").is_err());
    session.rollback_transaction()?;

    assert_eq!(session.query_count("SELECT count(*) FROM tags", [])?, 0);
    Ok(())
}

#[test]
fn missing_script_is_a_script_error() -> anyhow::Result<()> {
    let (db, _file) = common::create_temp_db();
    let dir = tempfile::tempdir()?;
    let db = db.with_script_source(FileScriptSource::new(dir.path()));
    let mut session = db.session()?;

    let err = session.init_sql("absent.sql").unwrap_err();
    assert!(matches!(
        err,
        Error::Script {
            source: ScriptError::Read(_),
            ..
        }
    ));
    Ok(())
}

#[derive(Debug)]
struct StaticScript(&'static [&'static str]);

impl ScriptSource for StaticScript {
    fn read_lines(&self, _path: &Path) -> io::Result<Vec<String>> {
        Ok(self.0.iter().map(|line| line.to_string()).collect())
    }
}

#[test]
fn custom_script_source_is_used() -> anyhow::Result<()> {
    let (db, _file) = common::create_temp_db();
    let db = db.with_script_source(StaticScript(&[
        "INSERT INTO tags (label) VALUES ('a')",
        "   ",
        "INSERT INTO tags (label) VALUES ('b')",
    ]));
    let mut session = db.session()?;
    session.init_sql("anything.sql")?;
    assert_eq!(session.query_count("SELECT count(*) FROM tags", [])?, 2);
    Ok(())
}
