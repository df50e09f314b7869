//! Cache domain - key derivation and the backend abstraction

mod arguments;
mod key;
mod repository;
mod signature;

pub use arguments::{ArgSlot, Bound, BoundArgs, CallArgs, CallArguments, write_canonical};
pub use key::{
    ArgumentsKey, CacheKey, DEFAULT_KEY_VERSION, FnKey, KeyBuilder, KeyError, KeyStrategy,
    StaticKey,
};
pub use repository::{Cache, CacheExt, escape_glob, glob_to_regex};
pub use signature::{Param, ParamKind, QualifiedName, Signature};

#[cfg(test)]
pub use repository::mock::MockCache;
