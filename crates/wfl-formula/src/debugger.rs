//! Execution tracing
//!
//! A [`FormulaDebugger`] passed to an evaluation records every expression
//! node that was evaluated, how deeply it was nested and what it produced.

use crate::ast::Expression;
use crate::error::EvalResult;
use crate::variant::Variant;
use std::fmt;

/// Result recorded for one evaluated node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceOutcome {
    /// Evaluation has not finished (or never returned)
    Pending,
    Value(String),
    Error(String),
}

/// One evaluated node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub depth: usize,
    pub expression: String,
    pub outcome: TraceOutcome,
}

/// Records an execution trace
#[derive(Debug, Default)]
pub struct FormulaDebugger {
    trace: Vec<TraceEntry>,
    depth: usize,
}

impl FormulaDebugger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    pub fn clear(&mut self) {
        self.trace.clear();
        self.depth = 0;
    }

    pub(crate) fn enter(&mut self, expression: &Expression) -> usize {
        self.trace.push(TraceEntry {
            depth: self.depth,
            expression: expression.to_string(),
            outcome: TraceOutcome::Pending,
        });
        self.depth += 1;
        self.trace.len() - 1
    }

    pub(crate) fn exit(&mut self, entry: usize, result: &EvalResult<Variant>) {
        self.depth = self.depth.saturating_sub(1);
        if let Some(entry) = self.trace.get_mut(entry) {
            entry.outcome = match result {
                Ok(value) => TraceOutcome::Value(value.to_debug_string()),
                Err(e) => TraceOutcome::Error(e.to_string()),
            };
        }
    }
}

impl fmt::Display for FormulaDebugger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.trace {
            let indent = "  ".repeat(entry.depth);
            match &entry.outcome {
                TraceOutcome::Pending => writeln!(f, "{}{}", indent, entry.expression)?,
                TraceOutcome::Value(v) => writeln!(f, "{}{} = {}", indent, entry.expression, v)?,
                TraceOutcome::Error(e) => {
                    writeln!(f, "{}{} failed: {}", indent, entry.expression, e)?
                }
            }
        }
        Ok(())
    }
}
