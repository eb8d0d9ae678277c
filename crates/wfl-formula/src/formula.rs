//! The compiled formula facade

use crate::ast::Expression;
use crate::callable::{FormulaCallable, MapCallable};
use crate::debugger::FormulaDebugger;
use crate::error::{EvalError, EvalResult, FormulaError, FormulaErrorKind, FormulaResult};
use crate::evaluator::Evaluator;
use crate::functions::FunctionSymbolTable;
use crate::options::FormulaOptions;
use crate::parser::compile;
use crate::random::RandomSource;
use crate::variant::Variant;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A compiled formula
///
/// Compiling happens once; the result can be evaluated any number of times
/// against different contexts.
///
/// # Example
/// ```rust
/// use wfl_formula::{Formula, MapCallable, Variant};
///
/// let formula = Formula::new("hitpoints * 2 where hitpoints = 21").unwrap();
/// assert_eq!(formula.evaluate(&MapCallable::new()), Variant::Int(42));
/// ```
#[derive(Debug)]
pub struct Formula {
    source: String,
    expression: Expression,
    symbols: Rc<RefCell<FunctionSymbolTable>>,
    owns_symbols: bool,
    files: Vec<Rc<str>>,
    options: FormulaOptions,
}

impl Formula {
    /// Compile `source` with its own function symbol table
    pub fn new(source: &str) -> FormulaResult<Self> {
        Self::with_options(source, FormulaOptions::default(), None)
    }

    /// Compile `source` against a symbol table shared with other formulas
    ///
    /// Functions the formula defines become visible to every formula using
    /// the same table.
    pub fn with_symbols(
        source: &str,
        symbols: Rc<RefCell<FunctionSymbolTable>>,
    ) -> FormulaResult<Self> {
        Self::with_options(source, FormulaOptions::default(), Some(symbols))
    }

    pub fn with_options(
        source: &str,
        options: FormulaOptions,
        symbols: Option<Rc<RefCell<FunctionSymbolTable>>>,
    ) -> FormulaResult<Self> {
        let owns_symbols = symbols.is_none();
        let symbols = symbols.unwrap_or_default();

        let compiled = {
            let mut table = symbols.try_borrow_mut().map_err(|_| {
                FormulaError::new(
                    FormulaErrorKind::SymbolTableBusy,
                    source,
                    options.filename.as_str(),
                    options.first_line,
                )
            })?;
            compile(source, &options, &mut table)?
        };
        tracing::trace!(formula = %compiled.expression, "compiled formula");

        Ok(Self {
            source: source.to_string(),
            expression: compiled.expression,
            symbols,
            owns_symbols,
            files: compiled.files,
            options,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Whether the symbol table was created for this formula alone
    pub fn owns_symbols(&self) -> bool {
        self.owns_symbols
    }

    pub fn symbols(&self) -> &Rc<RefCell<FunctionSymbolTable>> {
        &self.symbols
    }

    /// Names of the `fai`/`wfl` regions in the source
    pub fn files(&self) -> &[Rc<str>] {
        &self.files
    }

    pub fn options(&self) -> &FormulaOptions {
        &self.options
    }

    /// Evaluate against `ctx`, rolling dice with the thread RNG
    ///
    /// Evaluation errors are logged and yield null.
    pub fn evaluate(&self, ctx: &dyn FormulaCallable) -> Variant {
        let mut rng = rand::thread_rng();
        self.evaluate_with(ctx, &mut rng, None)
    }

    /// Evaluate against an empty context
    pub fn evaluate_default(&self) -> Variant {
        self.evaluate(&MapCallable::new())
    }

    /// Evaluate with an explicit random source and optional debugger
    ///
    /// Evaluation errors are logged and yield null.
    pub fn evaluate_with(
        &self,
        ctx: &dyn FormulaCallable,
        rng: &mut dyn RandomSource,
        debugger: Option<&mut FormulaDebugger>,
    ) -> Variant {
        match self.execute(ctx, rng, debugger) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(formula = %self.source, error = %e, "formula evaluation failed");
                Variant::Null
            }
        }
    }

    /// Evaluate, returning evaluation errors to the caller
    pub fn execute(
        &self,
        ctx: &dyn FormulaCallable,
        rng: &mut dyn RandomSource,
        debugger: Option<&mut FormulaDebugger>,
    ) -> EvalResult<Variant> {
        let symbols = self
            .symbols
            .try_borrow()
            .map_err(|_| EvalError::SymbolTableBusy)?;
        let evaluator = Evaluator::new(&symbols, rng, debugger, &self.options);
        evaluator.evaluate(&self.expression, ctx)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
