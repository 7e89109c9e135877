//! Database layer
//!
//! SQLite is the default backend; MySQL is selected with
//! `database.driver: mysql`. Repositories talk to either through the
//! [`DatabasePool`] trait and branch on [`DatabasePool::driver`] where the
//! SQL differs.
//!
//! ```ignore
//! use blogline::config::DatabaseConfig;
//! use blogline::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
