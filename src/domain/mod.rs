//! Domain layer - key derivation, backend abstraction and errors

pub mod cache;
pub mod error;

pub use cache::{
    Cache, CacheExt, CacheKey, CallArgs, CallArguments, KeyBuilder, KeyError, KeyStrategy,
    QualifiedName, Signature,
};
pub use error::DomainError;
