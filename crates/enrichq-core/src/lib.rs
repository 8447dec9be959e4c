//! # enrichq-core
//!
//! Core crate for the enrichment job queue. Contains the configuration
//! schema, the cache provider trait, and the unified error system.
//!
//! This crate has **no** internal dependencies on other enrichq crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;

pub use error::AppError;
pub use result::AppResult;
