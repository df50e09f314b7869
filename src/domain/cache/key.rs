//! Cache key generation strategies

use std::collections::BTreeSet;
use std::fmt::{self, Debug};
use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::arguments::{BoundArgs, CallArgs, write_canonical};
use super::signature::Signature;
use crate::domain::DomainError;

/// Version folded into keys when none is configured
pub const DEFAULT_KEY_VERSION: u32 = 1;

/// Reasons a call cannot be given a cache key
///
/// Every variant is recoverable: the memoizer calls straight through.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KeyError {
    #[error("Unkeyable argument '{argument}': {reason}")]
    Unkeyable { argument: String, reason: String },

    #[error("Cannot bind arguments for {callable}: {reason}")]
    Binding { callable: String, reason: String },

    #[error("Caching skipped by key strategy")]
    Skipped,
}

impl KeyError {
    pub fn unkeyable(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unkeyable {
            argument: argument.into(),
            reason: reason.into(),
        }
    }
}

impl From<KeyError> for DomainError {
    fn from(error: KeyError) -> Self {
        DomainError::validation(error.to_string())
    }
}

/// Derived, immutable identifier of one cached call
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Produces the argument-dependent suffix of a cache key
pub trait KeyStrategy: Send + Sync + Debug {
    fn generate(&self, args: &BoundArgs) -> Result<String, KeyError>;
}

/// Hex SHA-256 of the canonical argument form (the default)
#[derive(Debug, Clone, Default)]
pub struct ArgumentsKey;

impl KeyStrategy for ArgumentsKey {
    fn generate(&self, args: &BoundArgs) -> Result<String, KeyError> {
        let canonical = args.canonical()?;
        Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
    }
}

/// Ignores arguments so every call shares one entry
///
/// With a bucket argument, the value of that argument selects one of several
/// entries instead.
#[derive(Debug, Clone, Default)]
pub struct StaticKey {
    bucket: Option<String>,
}

impl StaticKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(bucket: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
        }
    }
}

impl KeyStrategy for StaticKey {
    fn generate(&self, args: &BoundArgs) -> Result<String, KeyError> {
        let value = self.bucket.as_deref().and_then(|name| args.value(name));

        Ok(match value {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                let mut out = String::new();
                write_canonical(other, &mut out);
                out
            }
        })
    }
}

/// Caller-supplied strategy
pub struct FnKey<F>(pub F);

impl<F> Debug for FnKey<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnKey(<closure>)")
    }
}

impl<F> KeyStrategy for FnKey<F>
where
    F: Fn(&BoundArgs) -> Result<String, KeyError> + Send + Sync,
{
    fn generate(&self, args: &BoundArgs) -> Result<String, KeyError> {
        (self.0)(args)
    }
}

/// Maps a call to its [`CacheKey`]
///
/// Keys have the form `<namespace>v<version>:<suffix>`. The namespace is the
/// callable's qualified prefix unless overridden, so distinct callables never
/// share keys even when their arguments encode identically.
///
/// A malformed signature never produces keys: every build fails with
/// [`KeyError::Binding`] and calls go straight through.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    signature: Signature,
    invalid: Option<String>,
    namespace: String,
    version: u32,
    ignored: BTreeSet<String>,
    strategy: Arc<dyn KeyStrategy>,
}

impl KeyBuilder {
    pub fn new(signature: Signature) -> Self {
        let invalid = signature.validate().err().map(|e| e.to_string());

        if let Some(reason) = &invalid {
            tracing::warn!(
                callable = %signature.name(),
                reason = %reason,
                "Invalid signature, caching disabled"
            );
        }

        Self {
            namespace: signature.name().prefix(),
            invalid,
            signature,
            version: DEFAULT_KEY_VERSION,
            ignored: BTreeSet::new(),
            strategy: Arc::new(ArgumentsKey),
        }
    }

    /// Replaces the qualified-name namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let mut namespace = namespace.into();

        if !namespace.ends_with(':') {
            namespace.push(':');
        }

        self.namespace = namespace;
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Excludes parameters from key derivation
    pub fn ignoring<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn KeyStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Prefix shared by every key this builder produces
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn build(&self, args: &CallArgs) -> Result<CacheKey, KeyError> {
        if let Some(reason) = &self.invalid {
            return Err(KeyError::Binding {
                callable: self.signature.name().to_string(),
                reason: reason.clone(),
            });
        }

        let mut bound = self.signature.bind(args)?;
        bound.remove_all(&self.ignored);

        let suffix = self.strategy.generate(&bound)?;

        Ok(CacheKey(format!("{}v{}:{}", self.namespace, self.version, suffix)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn slow_add() -> KeyBuilder {
        KeyBuilder::new(Signature::function("demo", "slow_add").param("a").param("b"))
    }

    #[test]
    fn test_key_layout() {
        let key = slow_add().build(&CallArgs::new().arg(&2).arg(&3)).unwrap();

        let (prefix, digest) = key.as_str().rsplit_once(':').unwrap();
        assert_eq!(prefix, "demo:slow_add:v1");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_same_call_same_key() {
        let builder = slow_add();
        let first = builder.build(&CallArgs::new().arg(&2).arg(&3)).unwrap();
        let second = builder.build(&CallArgs::new().arg(&2).arg(&3)).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_positional_order_is_significant() {
        let builder = slow_add();
        let forward = builder.build(&CallArgs::new().arg(&1).arg(&2)).unwrap();
        let reversed = builder.build(&CallArgs::new().arg(&2).arg(&1)).unwrap();

        assert_ne!(forward, reversed);
    }

    #[test]
    fn test_keyword_order_is_not_significant() {
        let builder = slow_add();
        let ab = builder.build(&CallArgs::new().kwarg("a", &1).kwarg("b", &2)).unwrap();
        let ba = builder.build(&CallArgs::new().kwarg("b", &2).kwarg("a", &1)).unwrap();

        assert_eq!(ab, ba);
    }

    #[test]
    fn test_argument_style_equivalence() {
        let builder = slow_add();
        let mixed = builder.build(&CallArgs::new().arg(&1).kwarg("b", &2)).unwrap();
        let named = builder.build(&CallArgs::new().kwarg("a", &1).kwarg("b", &2)).unwrap();

        assert_eq!(mixed, named);
    }

    #[test]
    fn test_default_filling_matches_explicit_default() {
        let builder = KeyBuilder::new(
            Signature::function("demo", "f")
                .param("x")
                .param_with_default("y", json!(2)),
        );

        let implicit = builder.build(&CallArgs::new().arg(&1)).unwrap();
        let explicit = builder.build(&CallArgs::new().arg(&1).kwarg("y", &2)).unwrap();

        assert_eq!(implicit, explicit);
    }

    #[test]
    fn test_namespace_isolation() {
        let add = slow_add();
        let mul = KeyBuilder::new(Signature::function("demo", "slow_mul").param("a").param("b"));

        let args = CallArgs::new().arg(&2).arg(&3);
        assert_ne!(add.build(&args).unwrap(), mul.build(&args).unwrap());
    }

    #[test]
    fn test_zero_argument_key_is_constant() {
        let builder = KeyBuilder::new(Signature::function("demo", "now"));

        let first = builder.build(&CallArgs::new()).unwrap();
        let second = builder.build(&CallArgs::new()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_null_and_value_differ() {
        let builder = KeyBuilder::new(
            Signature::function("demo", "f").param_with_default("x", json!(0)),
        );

        let null = builder
            .build(&CallArgs::new().arg(&Option::<i32>::None))
            .unwrap();
        let absent = builder.build(&CallArgs::new()).unwrap();
        assert_ne!(null, absent);
    }

    #[test]
    fn test_version_busts_keys() {
        let args = CallArgs::new().arg(&2).arg(&3);
        let v1 = slow_add().build(&args).unwrap();
        let v2 = slow_add().with_version(2).build(&args).unwrap();

        assert_ne!(v1, v2);
        assert!(v2.as_str().starts_with("demo:slow_add:v2:"));
    }

    #[test]
    fn test_namespace_override() {
        let key = slow_add()
            .with_namespace("arith")
            .build(&CallArgs::new().arg(&2).arg(&3))
            .unwrap();

        assert!(key.as_str().starts_with("arith:v1:"));
    }

    #[test]
    fn test_ignored_arguments_do_not_affect_key() {
        let builder = KeyBuilder::new(
            Signature::function("demo", "report")
                .param("account")
                .param("requested_at"),
        )
        .ignoring(["requested_at"]);

        let morning = builder.build(&CallArgs::new().arg(&7).arg(&1_000)).unwrap();
        let evening = builder.build(&CallArgs::new().arg(&7).arg(&9_000)).unwrap();
        assert_eq!(morning, evening);
    }

    #[test]
    fn test_ignored_argument_may_be_opaque() {
        let builder = KeyBuilder::new(Signature::function("demo", "f").param("x").param("conn"))
            .ignoring(["conn"]);

        let key = builder.build(&CallArgs::new().arg(&1).opaque_arg("socket handle"));
        assert!(key.is_ok());
    }

    #[test]
    fn test_opaque_argument_is_unkeyable() {
        let builder = KeyBuilder::new(Signature::function("demo", "f").param("x"));

        let err = builder
            .build(&CallArgs::new().opaque_arg("file handle"))
            .unwrap_err();
        assert_eq!(err, KeyError::unkeyable("x", "file handle"));
    }

    #[test]
    fn test_invalid_signature_never_builds() {
        let duplicate = KeyBuilder::new(Signature::function("demo", "f").param("x").param("x"));
        let err = duplicate.build(&CallArgs::new().arg(&1).arg(&2)).unwrap_err();
        assert!(
            matches!(err, KeyError::Binding { ref reason, .. } if reason.contains("Duplicate"))
        );

        let late_receiver =
            KeyBuilder::new(Signature::method("demo", "Svc", "f").param("x").receiver("self"));
        let err = late_receiver
            .build(&CallArgs::new().receiver(&1).arg(&2))
            .unwrap_err();
        assert!(matches!(err, KeyError::Binding { .. }));
    }

    #[test]
    fn test_keyword_only_after_rest_shares_key() {
        let builder = KeyBuilder::new(
            Signature::function("demo", "f")
                .param("a")
                .rest("args")
                .param_with_default("flag", json!(false)),
        );

        let implicit = builder.build(&CallArgs::new().arg(&1).arg(&2).arg(&3)).unwrap();
        let explicit = builder
            .build(&CallArgs::new().arg(&1).arg(&2).arg(&3).kwarg("flag", &false))
            .unwrap();

        assert_eq!(implicit, explicit);
    }

    #[test]
    fn test_static_key_with_bucket() {
        let builder = KeyBuilder::new(
            Signature::function("demo", "settings")
                .param_with_default("cachekey", json!(null)),
        )
        .with_strategy(Arc::new(StaticKey::with_bucket("cachekey")));

        let shared = builder.build(&CallArgs::new()).unwrap();
        let bucket = builder.build(&CallArgs::new().kwarg("cachekey", &"eu")).unwrap();

        assert_eq!(shared.as_str(), "demo:settings:v1:");
        assert_eq!(bucket.as_str(), "demo:settings:v1:eu");
    }

    #[test]
    fn test_fn_key_can_skip() {
        let builder = KeyBuilder::new(Signature::function("demo", "f").param("x")).with_strategy(
            Arc::new(FnKey(|args: &BoundArgs| match args.value("x") {
                Some(Value::Bool(true)) => Err(KeyError::Skipped),
                _ => ArgumentsKey.generate(args),
            })),
        );

        assert_eq!(
            builder.build(&CallArgs::new().arg(&true)),
            Err(KeyError::Skipped)
        );
        assert!(builder.build(&CallArgs::new().arg(&false)).is_ok());
    }
}
