//! Memoization - decorating callables with a cache backend

mod decorator;
mod instance;
mod locks;
mod memoized;
mod memoizer;

pub use decorator::{CacheDecorator, CacheOptions, DEFAULT_TTL};
pub use instance::InstanceCache;
pub use locks::{KeyGuard, KeyLocks};
pub use memoized::Memoized;
pub use memoizer::{Computed, Memoizer};
