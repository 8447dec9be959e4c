//! Core traits defined in `enrichq-core` and implemented by other crates.

pub mod cache;

pub use cache::CacheProvider;
