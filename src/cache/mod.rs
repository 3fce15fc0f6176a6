//! Generic query cache for entity collections.
//!
//! This module is entity-agnostic. It provides:
//! - A keyed in-memory cache with a configurable stale time
//! - Stale-while-revalidate reads that never block on the network
//! - At most one fetch in flight per key, shared by every caller
//! - Bounded retries with backoff for failed reads
//! - Subscriptions that fire on every change of an entry

mod client;
mod retry;
mod subscription;
mod traits;

pub use client::{CacheOptions, QueryClient, QueryFn};
pub use retry::RetryPolicy;
pub use subscription::Subscription;
pub use traits::{Cacheable, QueryKey, QuerySnapshot, QueryStatus};
