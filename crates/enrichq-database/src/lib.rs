//! # enrichq-database
//!
//! The durable job store: the [`JobStore`] contract, a PostgreSQL
//! implementation backed by sqlx, and an in-memory implementation for
//! tests and single-node deployments.

pub mod connection;
pub mod memory;
pub mod migration;
pub mod postgres;
pub mod store;

pub use connection::DatabasePool;
pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;
pub use store::JobStore;
