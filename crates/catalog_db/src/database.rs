use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::info;

/// Default location of the catalog file, created on first use.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://store.db?mode=rwc";

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS location (
        id INTEGER PRIMARY KEY,
        root_map_id INTEGER,
        name TEXT NOT NULL DEFAULT '',
        full_name TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS map (
        map_id INTEGER PRIMARY KEY,
        resource_location_id INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS category (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS resource_map (
        id INTEGER PRIMARY KEY,
        park_id INTEGER NOT NULL,
        map_id INTEGER NOT NULL,
        location_id INTEGER,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        category TEXT,
        capacity INTEGER NOT NULL DEFAULT 0,
        max_stay INTEGER NOT NULL DEFAULT 0,
        photos TEXT NOT NULL DEFAULT '[]',
        attr TEXT NOT NULL DEFAULT '[]'
    )
    "#,
    "CREATE INDEX IF NOT EXISTS resource_map_park ON resource_map (park_id)",
    r#"
    CREATE TABLE IF NOT EXISTS attribute_definition (
        id INTEGER PRIMARY KEY,
        definition TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        name TEXT PRIMARY KEY,
        body TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
];

/// Creates a connection pool to the SQLite catalog and makes sure the schema exists.
pub async fn create_connection_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Creates a private in-memory catalog, mostly useful for tests.
///
/// The pool is capped at a single connection since every SQLite memory
/// connection would otherwise see its own empty database.
pub async fn create_memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Creates every catalog table that does not exist yet.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// Tests the database connection by executing a simple query.
pub async fn test_connection(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let row = sqlx::query("SELECT 1 as test").fetch_one(pool).await?;

    let test_value: i32 = row.get("test");
    info!("Catalog connection successful, test value: {}", test_value);

    Ok(())
}
