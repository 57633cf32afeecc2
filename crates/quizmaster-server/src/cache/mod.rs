//! Response caching for the quiz platform's read routes.
//!
//! ## Architecture
//!
//! - **Key generator**: a deterministic hash over actor, path, sorted query
//!   parameters and (for mutating methods) the request body.
//! - **Store adapter**: one [`CacheStore`] capability interface over an
//!   in-process DashMap or a Redis pool.
//! - **Response middleware**: short-circuits reads on a hit, memoizes only
//!   fully-successful (200, non-empty) responses.
//! - **Invalidation middleware**: deletes matching entries after a write
//!   handler reports success, by pattern scan or exact key.
//!
//! ## Graceful Degradation
//!
//! The cache is a performance layer with no availability requirement: every
//! store error is logged and treated as a miss or no-op, and the live
//! response is always served.

pub mod backend;
pub mod invalidate;
pub mod key;
pub mod middleware;

pub use backend::{CacheError, CacheHandle, CacheStore, CachedEntry, MemoryCache, RedisCache};
pub use invalidate::{KeyInvalidation, PatternInvalidation, invalidate_key, invalidate_pattern};
pub use key::{generate_key, sorted_query_pairs};
pub use middleware::{ResponseCache, response_cache};
