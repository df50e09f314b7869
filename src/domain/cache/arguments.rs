//! Call-site arguments, binding to declared parameters and canonical encoding

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;

use super::key::KeyError;
use super::signature::{ParamKind, Signature};

/// One captured argument value
#[derive(Debug, Clone, PartialEq)]
pub enum ArgSlot {
    /// Serialized through serde
    Value(Value),
    /// Has no stable representation; carries the reason
    Opaque(String),
}

impl ArgSlot {
    fn capture<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Self::Value(value),
            Err(e) => Self::Opaque(e.to_string()),
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Opaque(_) => None,
        }
    }
}

/// Arguments as supplied at one call site
///
/// Capture never fails: a value that cannot be serialized is kept as an
/// opaque slot and only surfaces as [`KeyError::Unkeyable`] when a key is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    receiver: Option<ArgSlot>,
    positional: Vec<ArgSlot>,
    keywords: Vec<(String, ArgSlot)>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bound instance's key contribution
    pub fn receiver<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.receiver = Some(ArgSlot::capture(value));
        self
    }

    /// Marks the bound instance as having no stable representation
    pub fn opaque_receiver(mut self, reason: impl Into<String>) -> Self {
        self.receiver = Some(ArgSlot::Opaque(reason.into()));
        self
    }

    /// Appends a positional argument
    pub fn arg<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.positional.push(ArgSlot::capture(value));
        self
    }

    /// Appends a positional argument with no stable representation
    pub fn opaque_arg(mut self, reason: impl Into<String>) -> Self {
        self.positional.push(ArgSlot::Opaque(reason.into()));
        self
    }

    /// Adds a keyword argument
    pub fn kwarg<T: Serialize + ?Sized>(mut self, name: impl Into<String>, value: &T) -> Self {
        self.keywords.push((name.into(), ArgSlot::capture(value)));
        self
    }

    /// Adds a keyword argument with no stable representation
    pub fn opaque_kwarg(mut self, name: impl Into<String>, reason: impl Into<String>) -> Self {
        self.keywords.push((name.into(), ArgSlot::Opaque(reason.into())));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_none() && self.positional.is_empty() && self.keywords.is_empty()
    }
}

/// A value bound to one declared parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Single(ArgSlot),
    Rest(Vec<ArgSlot>),
    Keywords(BTreeMap<String, ArgSlot>),
}

/// Arguments after binding, in declaration order with defaults filled in
#[derive(Debug, Clone, PartialEq)]
pub struct BoundArgs {
    entries: Vec<(String, Bound)>,
}

impl BoundArgs {
    pub fn entries(&self) -> &[(String, Bound)] {
        &self.entries
    }

    /// Serialized value bound to a named parameter or catch-all keyword
    pub fn value(&self, name: &str) -> Option<&Value> {
        for (param, bound) in &self.entries {
            match bound {
                Bound::Single(slot) if param == name => return slot.as_value(),
                Bound::Keywords(map) => {
                    if let Some(slot) = map.get(name) {
                        return slot.as_value();
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Drops parameters (and catch-all keywords) whose names are listed
    pub fn remove_all(&mut self, names: &BTreeSet<String>) {
        if names.is_empty() {
            return;
        }

        self.entries.retain(|(name, _)| !names.contains(name));

        for (_, bound) in &mut self.entries {
            if let Bound::Keywords(map) = bound {
                map.retain(|name, _| !names.contains(name));
            }
        }
    }

    /// Canonical text used as digest input
    ///
    /// `[[name, value], ...]` in declaration order; object keys are sorted at
    /// every depth. Fails on the first opaque slot.
    pub fn canonical(&self) -> Result<String, KeyError> {
        let mut out = String::from("[");

        for (index, (name, bound)) in self.entries.iter().enumerate() {
            if index > 0 {
                out.push(',');
            }
            out.push('[');
            write_string(name, &mut out);
            out.push(',');

            match bound {
                Bound::Single(slot) => write_slot(name, slot, &mut out)?,
                Bound::Rest(slots) => {
                    out.push('[');
                    for (i, slot) in slots.iter().enumerate() {
                        if i > 0 {
                            out.push(',');
                        }
                        write_slot(name, slot, &mut out)?;
                    }
                    out.push(']');
                }
                Bound::Keywords(map) => {
                    out.push('{');
                    for (i, (key, slot)) in map.iter().enumerate() {
                        if i > 0 {
                            out.push(',');
                        }
                        write_string(key, &mut out);
                        out.push(':');
                        write_slot(key, slot, &mut out)?;
                    }
                    out.push('}');
                }
            }

            out.push(']');
        }

        out.push(']');
        Ok(out)
    }
}

fn write_slot(name: &str, slot: &ArgSlot, out: &mut String) -> Result<(), KeyError> {
    match slot {
        ArgSlot::Value(value) => {
            write_canonical(value, out);
            Ok(())
        }
        ArgSlot::Opaque(reason) => Err(KeyError::unkeyable(name, reason.clone())),
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push_str(&Value::String(s.to_string()).to_string());
}

/// Writes `value` as compact JSON with object keys sorted
pub fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, item)) in fields.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

impl Signature {
    /// Binds call-site arguments to the declared parameters
    ///
    /// Positional values fill named parameters in order, keywords bind by
    /// name and missing parameters take their defaults, so `f(1, y=2)` and
    /// `f(x=1, y=2)` bind identically. Named parameters after the rest list
    /// only bind by keyword.
    pub fn bind(&self, args: &CallArgs) -> Result<BoundArgs, KeyError> {
        let mut slots: Vec<Option<Bound>> = vec![None; self.params().len()];

        let rest_index = self.params().iter().position(|p| p.kind() == ParamKind::Rest);
        let keywords_index = self
            .params()
            .iter()
            .position(|p| p.kind() == ParamKind::Keywords);

        match (
            self.params().iter().position(|p| p.kind() == ParamKind::Receiver),
            &args.receiver,
        ) {
            (Some(index), Some(slot)) => slots[index] = Some(Bound::Single(slot.clone())),
            (Some(_), None) => return Err(self.binding_error("missing receiver")),
            (None, Some(_)) => {
                return Err(self.binding_error("receiver supplied to a callable without one"));
            }
            (None, None) => {}
        }

        // Named parameters declared after the rest list are keyword-only
        let named: Vec<usize> = self
            .params()
            .iter()
            .enumerate()
            .take(rest_index.unwrap_or(usize::MAX))
            .filter(|(_, p)| p.kind() == ParamKind::Named)
            .map(|(i, _)| i)
            .collect();

        let mut positional = args.positional.iter();

        for &index in &named {
            match positional.next() {
                Some(slot) => slots[index] = Some(Bound::Single(slot.clone())),
                None => break,
            }
        }

        let surplus: Vec<ArgSlot> = positional.cloned().collect();

        if !surplus.is_empty() {
            match rest_index {
                Some(index) => slots[index] = Some(Bound::Rest(surplus)),
                None => {
                    return Err(self.binding_error(format!(
                        "takes {} positional arguments but {} were given",
                        named.len(),
                        args.positional.len()
                    )));
                }
            }
        }

        let mut extra = BTreeMap::new();

        for (name, slot) in &args.keywords {
            let target = self
                .params()
                .iter()
                .position(|p| p.name() == name && p.kind() == ParamKind::Named);

            match target {
                Some(index) => {
                    if slots[index].is_some() {
                        return Err(self.binding_error(format!(
                            "got multiple values for argument '{}'",
                            name
                        )));
                    }
                    slots[index] = Some(Bound::Single(slot.clone()));
                }
                None if keywords_index.is_some() => {
                    if extra.insert(name.clone(), slot.clone()).is_some() {
                        return Err(self.binding_error(format!(
                            "got multiple values for keyword '{}'",
                            name
                        )));
                    }
                }
                None => {
                    return Err(self.binding_error(format!(
                        "got an unexpected keyword argument '{}'",
                        name
                    )));
                }
            }
        }

        let mut entries = Vec::with_capacity(slots.len());

        for (param, slot) in self.params().iter().zip(slots) {
            let bound = match (slot, param.kind()) {
                (Some(bound), _) => bound,
                (None, ParamKind::Named) => match param.default() {
                    Some(default) => Bound::Single(ArgSlot::Value(default.clone())),
                    None => {
                        return Err(self.binding_error(format!(
                            "missing required argument '{}'",
                            param.name()
                        )));
                    }
                },
                (None, ParamKind::Rest) => Bound::Rest(Vec::new()),
                (None, ParamKind::Keywords) => Bound::Keywords(std::mem::take(&mut extra)),
                (None, ParamKind::Receiver) => {
                    return Err(self.binding_error("missing receiver"));
                }
            };
            entries.push((param.name().to_string(), bound));
        }

        Ok(BoundArgs { entries })
    }

    fn binding_error(&self, reason: impl Into<String>) -> KeyError {
        KeyError::Binding {
            callable: self.name().to_string(),
            reason: reason.into(),
        }
    }
}

/// Inputs that describe themselves as call-site arguments
///
/// Tuples of serializable values map to positional arguments. Implement it
/// on an input struct to pass keywords or a receiver.
pub trait CallArguments {
    fn call_args(&self) -> CallArgs;
}

impl CallArguments for CallArgs {
    fn call_args(&self) -> CallArgs {
        self.clone()
    }
}

impl CallArguments for () {
    fn call_args(&self) -> CallArgs {
        CallArgs::new()
    }
}

macro_rules! impl_call_arguments_for_tuple {
    ($($name:ident),+) => {
        impl<$($name: Serialize),+> CallArguments for ($($name,)+) {
            #[allow(non_snake_case)]
            fn call_args(&self) -> CallArgs {
                let ($($name,)+) = self;
                CallArgs::new()$(.arg($name))+
            }
        }
    };
}

impl_call_arguments_for_tuple!(A);
impl_call_arguments_for_tuple!(A, B);
impl_call_arguments_for_tuple!(A, B, C);
impl_call_arguments_for_tuple!(A, B, C, D);
impl_call_arguments_for_tuple!(A, B, C, D, E);
impl_call_arguments_for_tuple!(A, B, C, D, E, F);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn a_function() -> Signature {
        Signature::function("lib::test_cache", "a_function")
            .param("a")
            .param("b")
            .param_with_default("c", json!(3))
            .param_with_default("d", json!(4))
    }

    fn values(bound: &BoundArgs) -> Vec<Value> {
        bound
            .entries()
            .iter()
            .map(|(_, b)| match b {
                Bound::Single(ArgSlot::Value(v)) => v.clone(),
                other => panic!("unexpected binding {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_defaults_are_filled_in() {
        let bound = a_function()
            .bind(&CallArgs::new().arg(&1).arg(&2).kwarg("d", &44))
            .unwrap();

        assert_eq!(values(&bound), vec![json!(1), json!(2), json!(3), json!(44)]);
    }

    #[test]
    fn test_binding_is_independent_of_keyword_order() {
        let bound = a_function()
            .bind(
                &CallArgs::new()
                    .arg(&1)
                    .kwarg("d", &44)
                    .kwarg("c", &33)
                    .kwarg("b", &22),
            )
            .unwrap();

        assert_eq!(values(&bound), vec![json!(1), json!(22), json!(33), json!(44)]);
    }

    #[test]
    fn test_positional_and_keyword_forms_bind_identically() {
        let signature = Signature::function("m", "f").param("x").param("y");

        let mixed = signature.bind(&CallArgs::new().arg(&1).kwarg("y", &2)).unwrap();
        let keywords = signature
            .bind(&CallArgs::new().kwarg("x", &1).kwarg("y", &2))
            .unwrap();

        assert_eq!(mixed.canonical().unwrap(), keywords.canonical().unwrap());
    }

    #[test]
    fn test_missing_required_argument() {
        let err = a_function().bind(&CallArgs::new().arg(&1)).unwrap_err();
        assert!(matches!(err, KeyError::Binding { .. }));
        assert!(err.to_string().contains("'b'"));
    }

    #[test]
    fn test_multiple_values_for_argument() {
        let err = a_function()
            .bind(&CallArgs::new().arg(&1).arg(&2).kwarg("a", &3))
            .unwrap_err();
        assert!(err.to_string().contains("multiple values"));
    }

    #[test]
    fn test_unexpected_keyword() {
        let err = a_function()
            .bind(&CallArgs::new().arg(&1).arg(&2).kwarg("zzz", &3))
            .unwrap_err();
        assert!(err.to_string().contains("unexpected keyword"));
    }

    #[test]
    fn test_surplus_positional_without_rest() {
        let signature = Signature::function("m", "f").param("x");
        let err = signature
            .bind(&CallArgs::new().arg(&1).arg(&2))
            .unwrap_err();
        assert!(err.to_string().contains("1 positional arguments but 2"));
    }

    #[test]
    fn test_rest_and_keywords_catch_all() {
        let signature = Signature::function("m", "f")
            .param("x")
            .rest("args")
            .keywords("kwargs");

        let bound = signature
            .bind(
                &CallArgs::new()
                    .arg(&1)
                    .arg(&2)
                    .arg(&3)
                    .kwarg("zeta", &true)
                    .kwarg("alpha", &"a"),
            )
            .unwrap();

        assert_eq!(
            bound.canonical().unwrap(),
            r#"[["x",1],["args",[2,3]],["kwargs",{"alpha":"a","zeta":true}]]"#
        );
        assert_eq!(bound.value("alpha"), Some(&json!("a")));
    }

    #[test]
    fn test_params_after_rest_are_keyword_only() {
        let signature = Signature::function("m", "f")
            .param("a")
            .rest("args")
            .param_with_default("flag", json!(false));

        let implicit = signature
            .bind(&CallArgs::new().arg(&1).arg(&2).arg(&3))
            .unwrap();
        let explicit = signature
            .bind(&CallArgs::new().arg(&1).arg(&2).arg(&3).kwarg("flag", &false))
            .unwrap();

        assert_eq!(
            implicit.canonical().unwrap(),
            r#"[["a",1],["args",[2,3]],["flag",false]]"#
        );
        assert_eq!(implicit.canonical().unwrap(), explicit.canonical().unwrap());
    }

    #[test]
    fn test_keyword_only_without_default_is_required() {
        let signature = Signature::function("m", "f").rest("args").param("mode");

        let err = signature.bind(&CallArgs::new().arg(&1)).unwrap_err();
        assert!(err.to_string().contains("missing required argument 'mode'"));

        let bound = signature
            .bind(&CallArgs::new().arg(&1).kwarg("mode", &"fast"))
            .unwrap();
        assert_eq!(bound.value("mode"), Some(&json!("fast")));
    }

    #[test]
    fn test_absent_and_null_keywords_differ() {
        let signature = Signature::function("m", "f").keywords("kwargs");

        let absent = signature.bind(&CallArgs::new()).unwrap();
        let null = signature
            .bind(&CallArgs::new().kwarg("flag", &Option::<i32>::None))
            .unwrap();

        assert_ne!(absent.canonical().unwrap(), null.canonical().unwrap());
    }

    #[test]
    fn test_receiver_binding() {
        let signature = Signature::method("m", "Account", "balance")
            .receiver("self")
            .param("currency");

        let bound = signature
            .bind(&CallArgs::new().receiver(&json!({"id": 7})).arg(&"EUR"))
            .unwrap();
        assert_eq!(bound.value("self"), Some(&json!({"id": 7})));

        let err = signature.bind(&CallArgs::new().arg(&"EUR")).unwrap_err();
        assert!(err.to_string().contains("missing receiver"));
    }

    #[test]
    fn test_canonical_sorts_nested_maps() {
        let mut first = HashMap::new();
        let mut second = HashMap::new();
        for (k, v) in [("b", 2), ("a", 1), ("c", 3)] {
            first.insert(k, v);
        }
        for (k, v) in [("c", 3), ("a", 1), ("b", 2)] {
            second.insert(k, v);
        }

        let signature = Signature::function("m", "f").param("m");
        let one = signature.bind(&CallArgs::new().arg(&first)).unwrap();
        let two = signature.bind(&CallArgs::new().arg(&second)).unwrap();

        assert_eq!(one.canonical().unwrap(), r#"[["m",{"a":1,"b":2,"c":3}]]"#);
        assert_eq!(one.canonical().unwrap(), two.canonical().unwrap());
    }

    #[test]
    fn test_opaque_slot_is_unkeyable() {
        let mut map = HashMap::new();
        map.insert((1, 2), "tuple keys do not serialize to JSON");

        let signature = Signature::function("m", "f").param("lookup");
        let bound = signature.bind(&CallArgs::new().arg(&map)).unwrap();

        let err = bound.canonical().unwrap_err();
        assert!(matches!(err, KeyError::Unkeyable { ref argument, .. } if argument == "lookup"));
    }

    #[test]
    fn test_remove_all_drops_params_and_keywords() {
        let signature = Signature::function("m", "f")
            .param("x")
            .param("now")
            .keywords("kwargs");

        let mut bound = signature
            .bind(&CallArgs::new().arg(&1).arg(&12345).kwarg("trace_id", &"abc"))
            .unwrap();

        let ignored: BTreeSet<String> = ["now", "trace_id"].iter().map(|s| s.to_string()).collect();
        bound.remove_all(&ignored);

        assert_eq!(bound.canonical().unwrap(), r#"[["x",1],["kwargs",{}]]"#);
    }

    #[test]
    fn test_tuple_call_arguments() {
        let args = (2, "three", vec![4]).call_args();
        let expected = CallArgs::new().arg(&2).arg(&"three").arg(&vec![4]);
        assert_eq!(args, expected);
        assert!(().call_args().is_empty());
    }
}
