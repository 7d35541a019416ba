//! Database layer
//!
//! Supports SQLite (default, single-file deployment) and Postgres (hosted
//! deployments). The driver is selected from configuration; repositories
//! write their SQL once with `?` placeholders and dispatch on [`Backend`].
//!
//! ```ignore
//! use townsquare::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, postgres_sql, Backend, DatabasePool, DynDatabasePool,
    PostgresDatabase, SqliteDatabase,
};
