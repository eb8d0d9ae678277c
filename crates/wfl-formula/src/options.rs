//! Compilation and evaluation options

/// Options for compiling and evaluating a formula
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaOptions {
    /// File name reported in diagnostics (default: "formula")
    pub filename: String,
    /// Line number of the first source line (default: 1)
    pub first_line: usize,
    /// Maximum nesting of user-defined function calls (default: 64)
    pub max_call_depth: usize,
    /// Maximum expression nesting, checked when parsing and again during
    /// evaluation where user function calls stack up (default: 256)
    pub max_nesting: usize,
}

impl Default for FormulaOptions {
    fn default() -> Self {
        Self {
            filename: "formula".to_string(),
            first_line: 1,
            max_call_depth: 64,
            max_nesting: 256,
        }
    }
}

impl FormulaOptions {
    /// Options attributing diagnostics to `filename`
    pub fn for_file(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Default::default()
        }
    }
}
