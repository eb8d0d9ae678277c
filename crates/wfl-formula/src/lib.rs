//! # wfl-formula
//!
//! An embeddable interpreter for WFL, a small dynamically typed expression
//! language for game AI and UI data binding.
//!
//! This crate provides:
//! - Tokenizing and parsing (text → expression tree)
//! - Tree-walking evaluation against host objects ([`FormulaCallable`])
//! - `where` bindings, user functions (`def`) and string substitution
//! - A built-in function library
//!
//! ## Example
//!
//! ```rust
//! use wfl_formula::{Formula, MapCallable, Variant};
//!
//! let mut unit = MapCallable::new();
//! unit.add("hitpoints", 12).add("max_hitpoints", 40);
//!
//! let formula = Formula::new("max_hitpoints - hitpoints").unwrap();
//! assert_eq!(formula.evaluate(&unit), Variant::Int(28));
//! ```

pub mod ast;
pub mod callable;
pub mod debugger;
pub mod error;
pub mod evaluator;
pub mod formula;
pub mod functions;
pub mod options;
pub mod parser;
pub mod random;
pub mod tokenizer;
pub mod variant;

pub use ast::{BinaryOperator, Expression, StringLiteral, StringPiece, UnaryOperator, WhereClause};
pub use callable::{
    DotCallable, FormulaAccess, FormulaCallable, FormulaInput, ListCallable, MapCallable,
};
pub use debugger::{FormulaDebugger, TraceEntry, TraceOutcome};
pub use error::{EvalError, EvalResult, FormulaError, FormulaErrorKind, FormulaResult, TokenError};
pub use evaluator::{Evaluator, WhereVariables};
pub use formula::Formula;
pub use functions::{builtins, FunctionRegistry, FunctionSymbolTable, UserFunction};
pub use options::FormulaOptions;
pub use random::{roll_dice, RandomSource};
pub use tokenizer::{tokenize, Token, TokenKind, Tokenizer};
pub use variant::{Variant, VariantType};
