//! Built-in and user-defined formula functions

pub mod general;
pub mod list;
pub mod math;
pub mod text;

use crate::ast::Expression;
use crate::callable::{DotCallable, FormulaCallable, MapCallable};
use crate::error::{EvalError, EvalResult};
use crate::evaluator::Evaluator;
use crate::variant::Variant;
use ahash::AHashMap;
use std::sync::OnceLock;

/// Function implementation signature
///
/// Arguments arrive unevaluated so that functions like `if` can be lazy and
/// higher-order functions can re-evaluate an argument per element.
pub type FunctionImpl =
    fn(&[Expression], &dyn FormulaCallable, &Evaluator<'_>) -> EvalResult<Variant>;

/// Built-in function definition
pub struct FunctionDef {
    pub name: &'static str,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    pub implementation: FunctionImpl,
}

impl FunctionDef {
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.map_or(true, |max| count <= max)
    }

    /// Human readable arity, for error messages
    pub fn arity(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{}..{}", self.min_args, max),
            None => format!("{}+", self.min_args),
        }
    }
}

/// Registry of built-in functions
pub struct FunctionRegistry {
    functions: AHashMap<&'static str, FunctionDef>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    /// Create a new registry with all built-in functions
    pub fn new() -> Self {
        let mut registry = Self {
            functions: AHashMap::new(),
        };

        registry.register_general_functions();
        registry.register_math_functions();
        registry.register_list_functions();
        registry.register_text_functions();

        registry
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Register a function
    pub fn register(&mut self, def: FunctionDef) {
        self.functions.insert(def.name, def);
    }

    /// Names of every registered function, in no particular order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.functions.keys().copied()
    }

    fn add(
        &mut self,
        name: &'static str,
        min_args: usize,
        max_args: Option<usize>,
        implementation: FunctionImpl,
    ) {
        self.register(FunctionDef {
            name,
            min_args,
            max_args,
            implementation,
        });
    }

    fn register_general_functions(&mut self) {
        self.add("if", 2, None, general::fn_if);
        self.add("switch", 3, None, general::fn_switch);
        self.add("type", 1, Some(1), general::fn_type);
        self.add("dir", 1, Some(1), general::fn_dir);
        self.add("debug_print", 1, Some(2), general::fn_debug_print);
        self.add("null", 0, Some(0), general::fn_null);
    }

    fn register_math_functions(&mut self) {
        self.add("abs", 1, Some(1), math::fn_abs);
        self.add("min", 1, None, math::fn_min);
        self.add("max", 1, None, math::fn_max);
        self.add("sum", 1, Some(2), math::fn_sum);
        self.add("floor", 1, Some(1), math::fn_floor);
        self.add("ceil", 1, Some(1), math::fn_ceil);
        self.add("round", 1, Some(1), math::fn_round);
        self.add("sgn", 1, Some(1), math::fn_sgn);
        self.add("as_decimal", 1, Some(1), math::fn_as_decimal);
    }

    fn register_list_functions(&mut self) {
        self.add("size", 1, Some(1), list::fn_size);
        self.add("head", 1, Some(1), list::fn_head);
        self.add("tail", 1, Some(1), list::fn_tail);
        self.add("reverse", 1, Some(1), list::fn_reverse);
        self.add("sort", 1, Some(2), list::fn_sort);
        self.add("filter", 2, Some(3), list::fn_filter);
        self.add("map", 2, Some(3), list::fn_map);
        self.add("find", 2, Some(3), list::fn_find);
        self.add("choose", 2, Some(3), list::fn_choose);
        self.add("index_of", 2, Some(2), list::fn_index_of);
        self.add("keys", 1, Some(1), list::fn_keys);
        self.add("values", 1, Some(1), list::fn_values);
        self.add("tolist", 1, Some(1), list::fn_tolist);
        self.add("tomap", 1, Some(2), list::fn_tomap);
    }

    fn register_text_functions(&mut self) {
        self.add("contains_string", 2, Some(2), text::fn_contains_string);
        self.add("str_upper", 1, Some(1), text::fn_str_upper);
        self.add("str_lower", 1, Some(1), text::fn_str_lower);
        self.add("length", 1, Some(1), text::fn_length);
        self.add("substring", 2, Some(3), text::fn_substring);
    }
}

static BUILTINS: OnceLock<FunctionRegistry> = OnceLock::new();

/// The process-wide built-in function registry
pub fn builtins() -> &'static FunctionRegistry {
    BUILTINS.get_or_init(FunctionRegistry::new)
}

/// A function declared with `def` (or registered by the host)
#[derive(Debug, Clone, PartialEq)]
pub struct UserFunction {
    pub name: String,
    pub args: Vec<String>,
    pub body: Expression,
    /// When present and falsy for a call, the call yields null
    pub precondition: Option<Expression>,
}

/// User-defined functions visible to a formula
///
/// Entries shadow built-ins of the same name.
#[derive(Debug, Clone, Default)]
pub struct FunctionSymbolTable {
    functions: AHashMap<String, UserFunction>,
}

impl FunctionSymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function from its parts, replacing any previous definition
    pub fn register_function(
        &mut self,
        name: impl Into<String>,
        body: Expression,
        precondition: Option<Expression>,
        args: Vec<String>,
    ) {
        let name = name.into();
        self.add_function(UserFunction {
            name,
            args,
            body,
            precondition,
        });
    }

    pub fn add_function(&mut self, function: UserFunction) {
        tracing::debug!(name = %function.name, args = function.args.len(), "registering function");
        self.functions.insert(function.name.clone(), function);
    }

    pub fn get(&self, name: &str) -> Option<&UserFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Sorted names of the registered functions
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

// === Helpers shared by the built-ins ===

/// Evaluate the argument at `index`
fn arg(
    args: &[Expression],
    index: usize,
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    match args.get(index) {
        Some(expr) => ev.evaluate(expr, ctx),
        None => Ok(Variant::Null),
    }
}

fn list_arg(
    function: &str,
    args: &[Expression],
    index: usize,
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Vec<Variant>> {
    let value = arg(args, index, ctx, ev)?;
    match value.as_list() {
        Some(items) => Ok(items.to_vec()),
        None => Err(EvalError::argument(
            function,
            format!("expected a list, got {}", value.type_name()),
        )),
    }
}

fn string_arg(
    function: &str,
    args: &[Expression],
    index: usize,
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<String> {
    let value = arg(args, index, ctx, ev)?;
    match value.as_str() {
        Some(s) => Ok(s.to_string()),
        None => Err(EvalError::argument(
            function,
            format!("expected a string, got {}", value.type_name()),
        )),
    }
}

/// Per-element callback for the higher-order functions
///
/// `f(items, predicate)`: the last argument is the per-element expression;
/// `f(items, name, predicate)` binds the element to `name` instead of
/// `value`.
struct ElementScope<'e> {
    value_name: String,
    expr: &'e Expression,
}

impl<'e> ElementScope<'e> {
    fn from_args(function: &str, args: &'e [Expression]) -> EvalResult<Self> {
        match args {
            [_, expr] => Ok(Self {
                value_name: "value".to_string(),
                expr,
            }),
            [_, Expression::Identifier(name), expr] => Ok(Self {
                value_name: name.clone(),
                expr,
            }),
            [_, other, _] => Err(EvalError::argument(
                function,
                format!("expected an element name, got {}", other),
            )),
            _ => Err(EvalError::argument(function, "wrong number of arguments")),
        }
    }

    /// Evaluate the per-element expression for a list element
    fn eval_item(
        &self,
        item: &Variant,
        index: usize,
        ctx: &dyn FormulaCallable,
        ev: &Evaluator<'_>,
    ) -> EvalResult<Variant> {
        let mut locals = MapCallable::new();
        locals
            .add(self.value_name.clone(), item.clone())
            .add("index", index);
        ev.evaluate(self.expr, &DotCallable::new(&locals, ctx))
    }

    /// Evaluate the per-element expression for a map entry
    fn eval_entry(
        &self,
        key: &Variant,
        value: &Variant,
        ctx: &dyn FormulaCallable,
        ev: &Evaluator<'_>,
    ) -> EvalResult<Variant> {
        let mut locals = MapCallable::new();
        locals
            .add("key", key.clone())
            .add(self.value_name.clone(), value.clone());
        ev.evaluate(self.expr, &DotCallable::new(&locals, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_registry_lookup() {
        let registry = builtins();
        let def = registry.get("if").unwrap();
        assert_eq!(def.name, "if");
        assert!(def.accepts(2));
        assert!(def.accepts(7));
        assert!(!def.accepts(1));
        assert_eq!(def.arity(), "2+");
        assert_eq!(registry.get("abs").unwrap().arity(), "1");
        assert_eq!(registry.get("sort").unwrap().arity(), "1..2");
        assert!(registry.get("IF").is_none());
    }

    #[test]
    fn test_registry_names() {
        let mut names: Vec<_> = builtins().names().collect();
        names.sort();
        assert!(names.contains(&"choose"));
        assert!(names.contains(&"substring"));
        assert_eq!(names.len(), builtins().functions.len());
    }

    #[test]
    fn test_symbol_table() {
        let mut table = FunctionSymbolTable::new();
        assert!(table.is_empty());
        table.register_function(
            "double",
            Expression::Identifier("x".into()),
            None,
            vec!["x".into()],
        );
        table.register_function("alpha", Expression::Null, None, Vec::new());

        assert!(table.contains("double"));
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("double").unwrap().args, vec!["x".to_string()]);
        assert_eq!(
            table.function_names(),
            vec!["alpha".to_string(), "double".to_string()]
        );
    }
}
