//! Formula evaluator
//!
//! Walks an expression tree against a [`FormulaCallable`] context.

use crate::ast::{BinaryOperator, Expression, StringLiteral, StringPiece, UnaryOperator, WhereClause};
use crate::callable::{DotCallable, FormulaAccess, FormulaCallable, FormulaInput, ListCallable, MapCallable};
use crate::debugger::FormulaDebugger;
use crate::error::{EvalError, EvalResult};
use crate::functions::{builtins, FunctionSymbolTable, UserFunction};
use crate::options::FormulaOptions;
use crate::random::{roll_dice, RandomSource};
use crate::variant::Variant;
use ahash::AHashMap;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

/// State shared by every node of one evaluation
pub struct Evaluator<'r> {
    symbols: &'r FunctionSymbolTable,
    rng: RefCell<&'r mut dyn RandomSource>,
    debugger: Option<RefCell<&'r mut FormulaDebugger>>,
    call_depth: Cell<usize>,
    max_call_depth: usize,
    depth: Cell<usize>,
    max_nesting: usize,
}

impl<'r> Evaluator<'r> {
    pub fn new(
        symbols: &'r FunctionSymbolTable,
        rng: &'r mut dyn RandomSource,
        debugger: Option<&'r mut FormulaDebugger>,
        options: &FormulaOptions,
    ) -> Self {
        Self {
            symbols,
            rng: RefCell::new(rng),
            debugger: debugger.map(RefCell::new),
            call_depth: Cell::new(0),
            max_call_depth: options.max_call_depth,
            depth: Cell::new(0),
            max_nesting: options.max_nesting,
        }
    }

    pub fn symbols(&self) -> &FunctionSymbolTable {
        self.symbols
    }

    /// Evaluate `expr` with names resolved through `ctx`
    ///
    /// Nodes nested deeper than `max_nesting`, counting through user function
    /// bodies, fail with [`EvalError::NestingTooDeep`].
    pub fn evaluate(&self, expr: &Expression, ctx: &dyn FormulaCallable) -> EvalResult<Variant> {
        let depth = self.depth.get();
        if depth >= self.max_nesting {
            return Err(EvalError::NestingTooDeep(self.max_nesting));
        }
        self.depth.set(depth + 1);
        let result = match &self.debugger {
            None => self.evaluate_node(expr, ctx),
            Some(debugger) => {
                let entry = debugger.borrow_mut().enter(expr);
                let result = self.evaluate_node(expr, ctx);
                debugger.borrow_mut().exit(entry, &result);
                result
            }
        };
        self.depth.set(depth);
        result
    }

    fn evaluate_node(&self, expr: &Expression, ctx: &dyn FormulaCallable) -> EvalResult<Variant> {
        match expr {
            // === Literals ===
            Expression::Null => Ok(Variant::Null),
            Expression::Integer(n) => Ok(Variant::Int(*n)),
            Expression::Decimal(d) => Ok(Variant::Decimal(*d)),
            Expression::String(literal) => Ok(self.evaluate_string(literal, ctx)),
            Expression::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.evaluate(item, ctx))
                    .collect::<EvalResult<Vec<_>>>()?;
                Ok(Variant::list(values))
            }
            Expression::Map(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    map.insert(self.evaluate(key, ctx)?, self.evaluate(value, ctx)?);
                }
                Ok(Variant::map(map))
            }

            // === Names ===
            Expression::Identifier(name) => ctx.query_value(name),

            // === Operators ===
            Expression::Unary { op, operand } => {
                let value = self.evaluate(operand, ctx)?;
                match op {
                    UnaryOperator::Not => Ok(Variant::from(!value.as_bool())),
                    UnaryOperator::Negate => value.negate(),
                }
            }
            Expression::Binary { op, left, right } => self.evaluate_binary(*op, left, right, ctx),
            Expression::Dot { left, right } => self.evaluate_dot(left, right, ctx),
            Expression::Index { left, key } => {
                let container = self.evaluate(left, ctx)?;
                let key = self.evaluate(key, ctx)?;
                match &container {
                    Variant::List(items) => {
                        let index = key.to_int()?;
                        usize::try_from(index)
                            .ok()
                            .and_then(|i| items.get(i))
                            .cloned()
                            .ok_or(EvalError::IndexOutOfRange {
                                index,
                                len: items.len(),
                            })
                    }
                    Variant::Map(entries) => Ok(entries.get(&key).cloned().unwrap_or_default()),
                    _ => Ok(Variant::Null),
                }
            }

            // === Functions ===
            Expression::FunctionCall { name, args } => self.call_function(name, args, ctx),
            Expression::FunctionList => {
                let mut names: Vec<String> = builtins().names().map(str::to_string).collect();
                names.extend(self.symbols.function_names());
                names.sort();
                names.dedup();
                Ok(Variant::list(names.into_iter().map(Variant::from).collect()))
            }

            Expression::Where { body, clauses } => {
                let scope = WhereVariables::new(ctx, clauses, self);
                self.evaluate(body, &scope)
            }
        }
    }

    fn evaluate_binary(
        &self,
        op: BinaryOperator,
        left: &Expression,
        right: &Expression,
        ctx: &dyn FormulaCallable,
    ) -> EvalResult<Variant> {
        let left_val = self.evaluate(left, ctx)?;

        // Short-circuit: the right operand is only evaluated when needed
        match op {
            BinaryOperator::And if !left_val.as_bool() => return Ok(left_val),
            BinaryOperator::Or if left_val.as_bool() => return Ok(left_val),
            _ => {}
        }

        let right_val = self.evaluate(right, ctx)?;

        match op {
            // Not short-circuited, so the right operand decides
            BinaryOperator::And | BinaryOperator::Or => Ok(right_val),

            // Comparison operators
            BinaryOperator::Equal => Ok(Variant::from(left_val == right_val)),
            BinaryOperator::NotEqual => Ok(Variant::from(left_val != right_val)),
            BinaryOperator::LessThan => Ok(Variant::from(left_val < right_val)),
            BinaryOperator::GreaterThan => Ok(Variant::from(left_val > right_val)),
            BinaryOperator::LessEqual => Ok(Variant::from(left_val <= right_val)),
            BinaryOperator::GreaterEqual => Ok(Variant::from(left_val >= right_val)),

            BinaryOperator::Range => left_val.build_range(&right_val),
            BinaryOperator::Concat => Ok(left_val.concatenate(&right_val)),

            // Arithmetic operators
            BinaryOperator::Add => left_val.add(&right_val),
            BinaryOperator::Subtract => left_val.sub(&right_val),
            BinaryOperator::Multiply => left_val.mul(&right_val),
            BinaryOperator::Divide => left_val.div(&right_val),
            BinaryOperator::Modulo => left_val.rem(&right_val),
            BinaryOperator::Power => left_val.pow(&right_val),
            BinaryOperator::Dice => {
                let rolls = left_val.to_int()?;
                let faces = right_val.to_int()?;
                let mut rng = self.rng.borrow_mut();
                Ok(Variant::Int(roll_dice(&mut **rng, rolls, faces)?))
            }

            BinaryOperator::ListAdd => left_val.list_elements_add(&right_val),
            BinaryOperator::ListSubtract => left_val.list_elements_sub(&right_val),
            BinaryOperator::ListMultiply => left_val.list_elements_mul(&right_val),
            BinaryOperator::ListDivide => left_val.list_elements_div(&right_val),
        }
    }

    /// `left.right`: objects and lists put their members in scope for
    /// `right`; any other value passes through unchanged
    fn evaluate_dot(
        &self,
        left: &Expression,
        right: &Expression,
        ctx: &dyn FormulaCallable,
    ) -> EvalResult<Variant> {
        let left_val = self.evaluate(left, ctx)?;
        match &left_val {
            Variant::Callable(callable) => {
                let scope = DotCallable::new(callable.as_ref(), ctx);
                self.evaluate(right, &scope)
            }
            Variant::List(items) => {
                let members = ListCallable::new(items.clone());
                let scope = DotCallable::new(&members, ctx);
                self.evaluate(right, &scope)
            }
            _ => Ok(left_val),
        }
    }

    fn evaluate_string(&self, literal: &StringLiteral, ctx: &dyn FormulaCallable) -> Variant {
        let mut text = String::new();
        for piece in &literal.pieces {
            match piece {
                StringPiece::Text(s) => text.push_str(s),
                // Each substitution degrades to an empty string on its own
                StringPiece::Formula(expr) => match self.evaluate(expr, ctx) {
                    Ok(value) => text.push_str(&value.as_string()),
                    Err(e) => {
                        tracing::warn!(substitution = %expr, error = %e, "string substitution failed");
                    }
                },
            }
        }
        Variant::String(text)
    }

    fn call_function(
        &self,
        name: &str,
        args: &[Expression],
        ctx: &dyn FormulaCallable,
    ) -> EvalResult<Variant> {
        if let Some(function) = self.symbols.get(name) {
            return self.call_user_function(function, args, ctx);
        }

        let def = builtins()
            .get(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;
        (def.implementation)(args, ctx, self)
    }

    fn call_user_function(
        &self,
        function: &UserFunction,
        args: &[Expression],
        ctx: &dyn FormulaCallable,
    ) -> EvalResult<Variant> {
        if args.len() != function.args.len() {
            return Err(EvalError::ArgumentCount {
                function: function.name.clone(),
                expected: function.args.len().to_string(),
                actual: args.len(),
            });
        }

        let mut locals = MapCallable::new();
        for (name, arg) in function.args.iter().zip(args) {
            locals.add(name.clone(), self.evaluate(arg, ctx)?);
        }

        let depth = self.call_depth.get();
        if depth >= self.max_call_depth {
            return Err(EvalError::CallDepthExceeded(self.max_call_depth));
        }
        self.call_depth.set(depth + 1);
        let result = self.evaluate_user_body(function, &locals);
        self.call_depth.set(depth);
        result
    }

    fn evaluate_user_body(
        &self,
        function: &UserFunction,
        locals: &MapCallable,
    ) -> EvalResult<Variant> {
        if let Some(precondition) = &function.precondition {
            if !self.evaluate(precondition, locals)?.as_bool() {
                return Ok(Variant::Null);
            }
        }
        self.evaluate(&function.body, locals)
    }
}

enum Binding {
    InProgress,
    Ready(Variant),
}

/// Scope created by a `where` expression
///
/// Clause values are evaluated on first lookup and cached for the rest of
/// the evaluation. Clauses see each other and the enclosing scope.
pub struct WhereVariables<'a, 'r> {
    base: &'a dyn FormulaCallable,
    clauses: &'a [WhereClause],
    evaluator: &'a Evaluator<'r>,
    cache: RefCell<AHashMap<String, Binding>>,
}

impl<'a, 'r> WhereVariables<'a, 'r> {
    pub fn new(
        base: &'a dyn FormulaCallable,
        clauses: &'a [WhereClause],
        evaluator: &'a Evaluator<'r>,
    ) -> Self {
        Self {
            base,
            clauses,
            evaluator,
            cache: RefCell::new(AHashMap::new()),
        }
    }
}

impl FormulaCallable for WhereVariables<'_, '_> {
    fn query_value(&self, key: &str) -> EvalResult<Variant> {
        let clause = match self.clauses.iter().find(|c| c.name == key) {
            Some(clause) => clause,
            None => return self.base.query_value(key),
        };

        match self.cache.borrow().get(key) {
            Some(Binding::Ready(value)) => return Ok(value.clone()),
            Some(Binding::InProgress) => return Err(EvalError::CyclicBinding(key.to_string())),
            None => {}
        }

        self.cache
            .borrow_mut()
            .insert(key.to_string(), Binding::InProgress);
        let result = self.evaluator.evaluate(&clause.value, self);
        match &result {
            Ok(value) => {
                self.cache
                    .borrow_mut()
                    .insert(key.to_string(), Binding::Ready(value.clone()));
            }
            Err(_) => {
                self.cache.borrow_mut().remove(key);
            }
        }
        result
    }

    fn get_inputs(&self) -> Vec<FormulaInput> {
        let mut inputs: Vec<FormulaInput> = self
            .clauses
            .iter()
            .map(|c| FormulaInput::new(c.name.clone(), FormulaAccess::ReadOnly))
            .collect();
        inputs.extend(self.base.get_inputs());
        inputs
    }
}
