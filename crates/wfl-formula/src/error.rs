//! Formula error types

use thiserror::Error;

/// Result type for compiling formulas
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Result type for evaluating formulas
pub type EvalResult<T> = std::result::Result<T, EvalError>;

/// Errors raised while scanning formula text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// A character that starts no known token
    #[error("Unrecognized token: '{fragment}'")]
    Unrecognized { fragment: String, offset: usize },

    /// A string literal without its closing quote
    #[error("Unterminated string literal: {fragment}")]
    UnterminatedString { fragment: String, offset: usize },
}

impl TokenError {
    /// The offending piece of source text
    pub fn fragment(&self) -> &str {
        match self {
            TokenError::Unrecognized { fragment, .. }
            | TokenError::UnterminatedString { fragment, .. } => fragment,
        }
    }

    /// Byte offset of the fragment in the scanned text
    pub fn offset(&self) -> usize {
        match self {
            TokenError::Unrecognized { offset, .. }
            | TokenError::UnterminatedString { offset, .. } => *offset,
        }
    }
}

/// Category of a compile-time formula error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaErrorKind {
    #[error("{0}")]
    Token(TokenError),

    #[error("Empty expression")]
    EmptyExpression,

    #[error("Unexpected operator: '{0}'")]
    UnexpectedOperator(String),

    #[error("Unexpected token: '{0}'")]
    UnexpectedToken(String),

    #[error("Mismatched brackets")]
    MismatchedBrackets,

    #[error("Invalid number literal: {0}")]
    InvalidNumber(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("Invalid function definition: {0}")]
    InvalidDefinition(String),

    #[error("Unterminated function definition")]
    UnterminatedDefinition,

    #[error("Where clause has no 'name=' before its value")]
    MissingWhereName,

    #[error("Duplicate where clause name: {0}")]
    DuplicateWhereName(String),

    #[error("List literal mixes map entries and plain items")]
    MixedListAndMap,

    #[error("Unterminated string substitution")]
    UnterminatedSubstitution,

    #[error("Inclusion marker '{0}' must be followed by a quoted name")]
    InvalidInclusion(String),

    #[error("Unterminated inclusion region: {0}")]
    UnterminatedInclusion(String),

    #[error("Inclusion end without a matching start")]
    UnmatchedInclusionEnd,

    #[error("Duplicate inclusion: {0}")]
    DuplicateInclusion(String),

    #[error("Expression is nested more than {0} levels deep")]
    NestingTooDeep(usize),

    #[error("Function symbol table is already borrowed")]
    SymbolTableBusy,
}

/// A compile-time error with the source location it was found in
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Formula error in {filename}:{line}\nIn formula {formula}\nError: {kind}")]
pub struct FormulaError {
    pub kind: FormulaErrorKind,
    /// Source text of the outermost expression that failed to compile
    pub formula: String,
    pub filename: String,
    pub line: usize,
}

impl FormulaError {
    pub fn new(
        kind: FormulaErrorKind,
        formula: impl Into<String>,
        filename: impl Into<String>,
        line: usize,
    ) -> Self {
        Self {
            kind,
            formula: formula.into(),
            filename: filename.into(),
            line,
        }
    }

    /// Multi-line, user-facing description of the error
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Errors that can occur while evaluating a compiled formula
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// Operand kinds the operation is not defined for
    #[error("Type error: {0}")]
    Type(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Integer overflow in {0}")]
    Overflow(&'static str),

    #[error("Index {index} out of range for list of size {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("Invalid argument to {function}: {message}")]
    Argument { function: String, message: String },

    /// Attempt to write a value the callable does not accept writes for
    #[error("Cannot set read-only value: {0}")]
    ReadOnly(String),

    /// A where clause that depends on its own value
    #[error("Where clause '{0}' refers to itself")]
    CyclicBinding(String),

    #[error("Maximum call depth of {0} exceeded")]
    CallDepthExceeded(usize),

    /// Evaluation nested deeper than the configured limit
    #[error("Maximum nesting depth of {0} exceeded")]
    NestingTooDeep(usize),

    /// A range or dice roll larger than evaluation will build
    #[error("{what} of {size} exceeds the limit of {limit}")]
    TooLarge {
        what: &'static str,
        size: u64,
        limit: u64,
    },

    #[error("Function symbol table is being modified")]
    SymbolTableBusy,
}

impl EvalError {
    pub(crate) fn argument(function: &str, message: impl Into<String>) -> Self {
        EvalError::Argument {
            function: function.to_string(),
            message: message.into(),
        }
    }
}
