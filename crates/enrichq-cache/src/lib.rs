//! # enrichq-cache
//!
//! TTL'd key-value providers for the enrichment queue. Supports two modes:
//!
//! - **memory**: In-process cache using [moka](https://crates.io/crates/moka)
//!   with a per-entry expiry
//! - **redis**: Redis-backed cache using the [redis](https://crates.io/crates/redis) crate
//!
//! The provider is selected at runtime based on configuration. The
//! [`ProgressChannel`] is built on top of whichever provider is active.

pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod progress;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use progress::ProgressChannel;
pub use provider::CacheManager;
