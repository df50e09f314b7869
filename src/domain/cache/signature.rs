//! Callable identity and declared parameter lists

use std::collections::HashSet;
use std::fmt;

use serde_json::Value;

use crate::domain::DomainError;

/// Stable identity of a cached callable
///
/// Built from names rather than addresses so keys survive process restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    module: String,
    owner: Option<String>,
    name: String,
}

impl QualifiedName {
    /// Identity of a free function, usually `module_path!()` plus its name
    pub fn function(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            owner: None,
            name: name.into(),
        }
    }

    /// Identity of a method or associated function on `owner`
    pub fn method(
        module: impl Into<String>,
        owner: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            owner: Some(owner.into()),
            name: name.into(),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Checks that the prefix can be split back into its parts
    ///
    /// The module may hold `::` paths but no `.`; owner and name hold neither
    /// `.` nor `:`.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.module.is_empty() || self.name.is_empty() {
            return Err(DomainError::validation(format!(
                "Callable '{}' needs a module and a name",
                self
            )));
        }

        if self.module.contains('.') {
            return Err(DomainError::validation(format!(
                "Module '{}' must not contain '.'",
                self.module
            )));
        }

        let segments = self.owner.iter().chain(std::iter::once(&self.name));

        for segment in segments {
            if segment.is_empty() || segment.contains(['.', ':']) {
                return Err(DomainError::validation(format!(
                    "Invalid segment '{}' in callable '{}'",
                    segment, self
                )));
            }
        }

        Ok(())
    }

    /// Key namespace for this callable: `module[.owner]:name:`
    pub fn prefix(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}.{}:{}:", self.module, owner, self.name),
            None => format!("{}:{}:", self.module, self.name),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.owner {
            Some(owner) => write!(f, "{}::{}::{}", self.module, owner, self.name),
            None => write!(f, "{}::{}", self.module, self.name),
        }
    }
}

/// How a declared parameter accepts arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// The bound instance; supplied through [`CallArgs::receiver`](super::CallArgs::receiver)
    Receiver,
    /// Fillable by position or by keyword
    Named,
    /// Collects surplus positional arguments
    Rest,
    /// Collects keywords that match no named parameter
    Keywords,
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    name: String,
    kind: ParamKind,
    default: Option<Value>,
}

impl Param {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }
}

/// Declared parameter list of a cached callable
///
/// ```
/// use memocache::domain::cache::{QualifiedName, Signature};
/// use serde_json::json;
///
/// let signature = Signature::new(QualifiedName::function("billing", "quote"))
///     .param("customer")
///     .param_with_default("currency", json!("EUR"))
///     .keywords("options");
///
/// assert_eq!(signature.params().len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    name: QualifiedName,
    params: Vec<Param>,
}

impl Signature {
    pub fn new(name: QualifiedName) -> Self {
        Self {
            name,
            params: Vec::new(),
        }
    }

    /// Shorthand for a free function signature
    pub fn function(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(QualifiedName::function(module, name))
    }

    /// Shorthand for a method signature; add the receiver with [`Self::receiver`]
    pub fn method(
        module: impl Into<String>,
        owner: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::new(QualifiedName::method(module, owner, name))
    }

    /// Declares the bound instance parameter (conventionally `self`)
    pub fn receiver(self, name: impl Into<String>) -> Self {
        self.push(name, ParamKind::Receiver, None)
    }

    /// Declares a required parameter
    pub fn param(self, name: impl Into<String>) -> Self {
        self.push(name, ParamKind::Named, None)
    }

    /// Declares a parameter whose value is `default` when not supplied
    pub fn param_with_default(self, name: impl Into<String>, default: Value) -> Self {
        self.push(name, ParamKind::Named, Some(default))
    }

    /// Declares a catch-all for surplus positional arguments
    pub fn rest(self, name: impl Into<String>) -> Self {
        self.push(name, ParamKind::Rest, None)
    }

    /// Declares a catch-all for unknown keyword arguments
    pub fn keywords(self, name: impl Into<String>) -> Self {
        self.push(name, ParamKind::Keywords, None)
    }

    fn push(mut self, name: impl Into<String>, kind: ParamKind, default: Option<Value>) -> Self {
        self.params.push(Param {
            name: name.into(),
            kind,
            default,
        });
        self
    }

    pub fn name(&self) -> &QualifiedName {
        &self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub(crate) fn param_named(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Checks that the declaration is well formed
    ///
    /// The qualified name must be unambiguous and parameter names unique.
    /// The receiver comes first, each catch-all appears at most once and
    /// nothing follows the keyword catch-all.
    pub fn validate(&self) -> Result<(), DomainError> {
        self.name.validate()?;

        let mut seen = HashSet::new();

        for (index, param) in self.params.iter().enumerate() {
            if !seen.insert(param.name.as_str()) {
                return Err(DomainError::validation(format!(
                    "Duplicate parameter '{}' in {}",
                    param.name, self.name
                )));
            }

            if param.kind == ParamKind::Receiver && index != 0 {
                return Err(DomainError::validation(format!(
                    "Receiver '{}' must be the first parameter of {}",
                    param.name, self.name
                )));
            }
        }

        let count = |kind: ParamKind| self.params.iter().filter(|p| p.kind == kind).count();

        for kind in [ParamKind::Receiver, ParamKind::Rest, ParamKind::Keywords] {
            if count(kind) > 1 {
                return Err(DomainError::validation(format!(
                    "{} declares more than one {:?} parameter",
                    self.name, kind
                )));
            }
        }

        if let Some(position) = self.params.iter().position(|p| p.kind == ParamKind::Keywords) {
            if position + 1 != self.params.len() {
                return Err(DomainError::validation(format!(
                    "Keyword catch-all must be the last parameter of {}",
                    self.name
                )));
            }
        }

        Ok(())
    }
}
