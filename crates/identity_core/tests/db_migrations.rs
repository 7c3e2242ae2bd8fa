use identity_core::db::migrations::latest_version;
use identity_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "contacts");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contacts.sqlite");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "contacts");
}

#[test]
fn open_db_creates_missing_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("nested").join("contacts.sqlite");

    let conn = open_db(&path).unwrap();
    assert!(path.exists());
    assert_eq!(schema_version(&conn), latest_version());
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn schema_rejects_unknown_link_precedence() {
    let conn = open_db_in_memory().unwrap();

    let result = conn.execute(
        "INSERT INTO contacts (email, link_precedence, created_at, updated_at)
         VALUES ('a@x.com', 'tertiary', 1, 1);",
        [],
    );
    assert!(result.is_err());
}

#[test]
fn schema_rejects_secondary_without_link_and_primary_with_link() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO contacts (email, link_precedence, created_at, updated_at)
         VALUES ('a@x.com', 'primary', 1, 1);",
        [],
    )
    .unwrap();

    let orphan = conn.execute(
        "INSERT INTO contacts (email, link_precedence, created_at, updated_at)
         VALUES ('b@x.com', 'secondary', 2, 2);",
        [],
    );
    assert!(orphan.is_err());

    let linked_primary = conn.execute(
        "INSERT INTO contacts (email, linked_id, link_precedence, created_at, updated_at)
         VALUES ('c@x.com', 1, 'primary', 3, 3);",
        [],
    );
    assert!(linked_primary.is_err());
}

#[test]
fn schema_enforces_link_target_foreign_key() {
    let conn = open_db_in_memory().unwrap();

    let result = conn.execute(
        "INSERT INTO contacts (email, linked_id, link_precedence, created_at, updated_at)
         VALUES ('a@x.com', 42, 'secondary', 1, 1);",
        [],
    );
    assert!(result.is_err());
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
