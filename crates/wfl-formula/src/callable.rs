//! Variable resolution for formulas
//!
//! Every name a formula reads is looked up through a [`FormulaCallable`].
//! Hosts implement the trait on their own objects; the engine supplies a few
//! concrete callables for maps, list members and scope composition.

use crate::error::{EvalError, EvalResult};
use crate::variant::Variant;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// How a callable input may be accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormulaAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// A name exposed by a callable, for introspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaInput {
    pub name: String,
    pub access: FormulaAccess,
}

impl FormulaInput {
    pub fn new(name: impl Into<String>, access: FormulaAccess) -> Self {
        Self {
            name: name.into(),
            access,
        }
    }
}

/// An object whose fields formulas can read by name
pub trait FormulaCallable {
    /// Resolve `key`; unknown names resolve to null
    fn query_value(&self, key: &str) -> EvalResult<Variant>;

    /// Write `key`. Callables are read-only unless they override this.
    fn set_value(&self, key: &str, _value: Variant) -> EvalResult<()> {
        Err(EvalError::ReadOnly(key.to_string()))
    }

    /// Names this callable exposes
    fn get_inputs(&self) -> Vec<FormulaInput> {
        Vec::new()
    }
}

/// A string-keyed table of values with an optional fallback callable
///
/// Keys missing from the table are resolved through the fallback, which
/// allows callables to be chained.
#[derive(Default)]
pub struct MapCallable {
    values: RefCell<BTreeMap<String, Variant>>,
    fallback: Option<Rc<dyn FormulaCallable>>,
}

impl MapCallable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a map that consults `fallback` for names it does not hold
    pub fn with_fallback(fallback: Rc<dyn FormulaCallable>) -> Self {
        Self {
            values: RefCell::default(),
            fallback: Some(fallback),
        }
    }

    /// Add a value, builder style
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<Variant>) -> &mut Self {
        self.values.get_mut().insert(key.into(), value.into());
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.borrow().is_empty()
    }
}

impl FromIterator<(String, Variant)> for MapCallable {
    fn from_iter<I: IntoIterator<Item = (String, Variant)>>(iter: I) -> Self {
        Self {
            values: RefCell::new(iter.into_iter().collect()),
            fallback: None,
        }
    }
}

impl FormulaCallable for MapCallable {
    fn query_value(&self, key: &str) -> EvalResult<Variant> {
        if let Some(value) = self.values.borrow().get(key) {
            return Ok(value.clone());
        }
        match &self.fallback {
            Some(fallback) => fallback.query_value(key),
            None => Ok(Variant::Null),
        }
    }

    fn set_value(&self, key: &str, value: Variant) -> EvalResult<()> {
        self.values.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    fn get_inputs(&self) -> Vec<FormulaInput> {
        self.values
            .borrow()
            .keys()
            .map(|key| FormulaInput::new(key.clone(), FormulaAccess::ReadWrite))
            .collect()
    }
}

/// Two callables layered: `local` first, then `global`
pub struct DotCallable<'a> {
    local: &'a dyn FormulaCallable,
    global: &'a dyn FormulaCallable,
}

impl<'a> DotCallable<'a> {
    pub fn new(local: &'a dyn FormulaCallable, global: &'a dyn FormulaCallable) -> Self {
        Self { local, global }
    }
}

impl FormulaCallable for DotCallable<'_> {
    fn query_value(&self, key: &str) -> EvalResult<Variant> {
        let value = self.local.query_value(key)?;
        if value.is_null() {
            self.global.query_value(key)
        } else {
            Ok(value)
        }
    }

    fn get_inputs(&self) -> Vec<FormulaInput> {
        let mut inputs = self.local.get_inputs();
        for input in self.global.get_inputs() {
            if !inputs.iter().any(|i| i.name == input.name) {
                inputs.push(input);
            }
        }
        inputs
    }
}

/// Read-only view of a list's `size`, `empty`, `first` and `last`
pub struct ListCallable {
    items: Rc<Vec<Variant>>,
}

impl ListCallable {
    pub fn new(items: Rc<Vec<Variant>>) -> Self {
        Self { items }
    }
}

impl FormulaCallable for ListCallable {
    fn query_value(&self, key: &str) -> EvalResult<Variant> {
        Ok(match key {
            "size" => Variant::Int(self.items.len() as i64),
            "empty" => Variant::from(self.items.is_empty()),
            "first" => self.items.first().cloned().unwrap_or_default(),
            "last" => self.items.last().cloned().unwrap_or_default(),
            _ => Variant::Null,
        })
    }

    fn get_inputs(&self) -> Vec<FormulaInput> {
        ["size", "empty", "first", "last"]
            .into_iter()
            .map(|name| FormulaInput::new(name, FormulaAccess::ReadOnly))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_map_callable_lookup_and_fallback() {
        let mut outer = MapCallable::new();
        outer.add("side", 2).add("name", "Konrad");

        let mut inner = MapCallable::with_fallback(Rc::new(outer));
        inner.add("hitpoints", 33);

        assert_eq!(inner.query_value("hitpoints").unwrap(), Variant::Int(33));
        assert_eq!(inner.query_value("side").unwrap(), Variant::Int(2));
        assert_eq!(
            inner.query_value("name").unwrap(),
            Variant::String("Konrad".into())
        );
        assert_eq!(inner.query_value("missing").unwrap(), Variant::Null);
    }

    #[test]
    fn test_map_callable_set_value() {
        let map = MapCallable::new();
        map.set_value("moves", Variant::Int(5)).unwrap();
        assert_eq!(map.query_value("moves").unwrap(), Variant::Int(5));
        assert_eq!(
            map.get_inputs(),
            vec![FormulaInput::new("moves", FormulaAccess::ReadWrite)]
        );
    }

    #[test]
    fn test_list_callable_rejects_writes() {
        let list = ListCallable::new(Rc::new(vec![Variant::Int(1)]));
        assert_eq!(
            list.set_value("size", Variant::Int(3)),
            Err(EvalError::ReadOnly("size".into()))
        );
    }

    #[test]
    fn test_list_callable_members() {
        let list = ListCallable::new(Rc::new(vec![
            Variant::Int(4),
            Variant::Int(5),
            Variant::Int(6),
        ]));
        assert_eq!(list.query_value("size").unwrap(), Variant::Int(3));
        assert_eq!(list.query_value("empty").unwrap(), Variant::Int(0));
        assert_eq!(list.query_value("first").unwrap(), Variant::Int(4));
        assert_eq!(list.query_value("last").unwrap(), Variant::Int(6));

        let empty = ListCallable::new(Rc::new(Vec::new()));
        assert_eq!(empty.query_value("empty").unwrap(), Variant::Int(1));
        assert_eq!(empty.query_value("first").unwrap(), Variant::Null);
    }

    #[test]
    fn test_dot_callable_prefers_local() {
        let mut local = MapCallable::new();
        local.add("x", 1);
        let mut global = MapCallable::new();
        global.add("x", 10).add("y", 20);

        let dot = DotCallable::new(&local, &global);
        assert_eq!(dot.query_value("x").unwrap(), Variant::Int(1));
        assert_eq!(dot.query_value("y").unwrap(), Variant::Int(20));
        let names: Vec<_> = dot.get_inputs().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["x".to_string(), "y".to_string()]);
    }
}
