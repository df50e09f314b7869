//! Callable wrapper that routes calls through a [`Memoizer`]

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

use serde::{Serialize, de::DeserializeOwned};

use crate::domain::DomainError;
use crate::domain::cache::CallArguments;

use super::memoizer::Memoizer;

/// A function paired with the memoizer that caches it
///
/// `I` is the function's single input, usually a tuple of its arguments.
pub struct Memoized<I, F> {
    memoizer: Memoizer,
    func: F,
    _input: PhantomData<fn(I)>,
}

impl<I, F> fmt::Debug for Memoized<I, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("memoizer", &self.memoizer)
            .finish_non_exhaustive()
    }
}

impl<I, F> Memoized<I, F>
where
    I: CallArguments,
{
    pub fn new(memoizer: Memoizer, func: F) -> Self {
        Self {
            memoizer,
            func,
            _input: PhantomData,
        }
    }

    /// Calls the wrapped function unless a cached result exists
    pub async fn call<Fut, T, E>(&self, input: I) -> Result<T, E>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let args = input.call_args();
        self.memoizer
            .get_or_compute(&args, || (self.func)(input))
            .await
    }

    /// Drops the cached result for `input`
    pub async fn cache_delete(&self, input: &I) -> Result<bool, DomainError> {
        self.memoizer.delete(&input.call_args()).await
    }

    pub async fn cache_exists(&self, input: &I) -> Result<bool, DomainError> {
        self.memoizer.exists(&input.call_args()).await
    }

    /// Drops every cached result of this function
    pub async fn cache_clear(&self) -> Result<usize, DomainError> {
        self.memoizer.clear().await
    }

    pub fn memoizer(&self) -> &Memoizer {
        &self.memoizer
    }
}
