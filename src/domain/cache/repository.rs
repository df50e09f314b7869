//! Cache backend trait definition

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Serialize, de::DeserializeOwned};

use crate::domain::DomainError;

/// Storage capability consumed by the memoizer
///
/// Keys are opaque identifiers; backends must not interpret them. Values are
/// JSON strings so the trait stays dyn-compatible; use [`CacheExt`] for typed
/// access. A `ttl` of `None` stores the entry without expiry.
#[async_trait]
pub trait Cache: Send + Sync + Debug {
    /// Gets a raw JSON value, `None` when absent or expired
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError>;

    /// Sets a raw JSON value with an optional TTL
    async fn set_raw(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), DomainError>;

    /// Deletes a value, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool, DomainError>;

    /// Deletes every key matching a glob pattern (`*` and `?` wildcards)
    async fn delete_pattern(&self, pattern: &str) -> Result<usize, DomainError>;

    /// Checks if a live entry exists for the key
    async fn exists(&self, key: &str) -> Result<bool, DomainError> {
        Ok(self.get_raw(key).await?.is_some())
    }

    /// Gets the remaining TTL for a key, `None` when absent or without expiry
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, DomainError>;

    /// Clears all entries from the cache
    async fn clear(&self) -> Result<(), DomainError>;

    /// Returns approximate number of entries in the cache
    async fn size(&self) -> Result<usize, DomainError>;
}

/// Extension trait providing typed get/set operations
pub trait CacheExt: Cache {
    /// Gets a typed value from the cache
    fn get<'a, V>(
        &'a self,
        key: &'a str,
    ) -> impl std::future::Future<Output = Result<Option<V>, DomainError>> + Send
    where
        V: DeserializeOwned + Send,
    {
        async move {
            match self.get_raw(key).await? {
                Some(data) => {
                    let value: V = serde_json::from_str(&data).map_err(|e| {
                        DomainError::serialization(format!(
                            "Failed to deserialize cache value: {}",
                            e
                        ))
                    })?;
                    Ok(Some(value))
                }
                None => Ok(None),
            }
        }
    }

    /// Sets a typed value in the cache with an optional TTL
    fn set<'a, V>(
        &'a self,
        key: &'a str,
        value: &'a V,
        ttl: Option<Duration>,
    ) -> impl std::future::Future<Output = Result<(), DomainError>> + Send
    where
        V: Serialize + Send + Sync,
    {
        async move {
            let data = serde_json::to_string(value).map_err(|e| {
                DomainError::serialization(format!("Failed to serialize cache value: {}", e))
            })?;
            self.set_raw(key, &data, ttl).await
        }
    }
}

// Blanket implementation for all types implementing Cache
impl<T: Cache + ?Sized> CacheExt for T {}

/// Compiles a glob pattern into an anchored regex
///
/// `*` matches any run of characters, `?` matches one character and `\`
/// escapes the next character. Everything else is literal.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, DomainError> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');

    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    expr.push_str(&regex::escape(next.encode_utf8(&mut [0; 4])));
                }
            }
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }

    expr.push('$');

    Regex::new(&expr).map_err(|e| DomainError::cache(format!("Invalid pattern: {}", e)))
}

/// Escapes glob metacharacters so `literal` only matches itself
pub fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());

    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_is_anchored() {
        let regex = glob_to_regex("app:load:*").unwrap();

        assert!(regex.is_match("app:load:v1:abc"));
        assert!(!regex.is_match("xapp:load:v1:abc"));
        assert!(!regex.is_match("app:loader"));
    }

    #[test]
    fn test_glob_treats_regex_metacharacters_literally() {
        let regex = glob_to_regex("a.b+c:*").unwrap();

        assert!(regex.is_match("a.b+c:1"));
        assert!(!regex.is_match("aXb+c:1"));
        assert!(!regex.is_match("a.bbc:1"));
    }

    #[test]
    fn test_glob_question_mark() {
        let regex = glob_to_regex("user:?").unwrap();

        assert!(regex.is_match("user:1"));
        assert!(!regex.is_match("user:12"));
    }

    #[test]
    fn test_escape_glob_round_trips_through_matcher() {
        let literal = "weird[ns]*?:";
        let pattern = format!("{}*", escape_glob(literal));
        let regex = glob_to_regex(&pattern).unwrap();

        assert!(regex.is_match("weird[ns]*?:v1:abc"));
        assert!(!regex.is_match("weirdn*?:v1:abc"));
    }
}
