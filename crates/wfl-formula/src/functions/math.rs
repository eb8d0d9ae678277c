//! Math functions

use super::{arg, list_arg};
use crate::ast::Expression;
use crate::callable::FormulaCallable;
use crate::error::{EvalError, EvalResult};
use crate::evaluator::Evaluator;
use crate::variant::{Variant, DECIMAL_SCALE};

fn numeric_arg(
    function: &str,
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let value = arg(args, 0, ctx, ev)?;
    if value.is_numeric() || value.is_null() {
        Ok(value)
    } else {
        Err(EvalError::argument(
            function,
            format!("expected a number, got {}", value.type_name()),
        ))
    }
}

/// ABS function
pub fn fn_abs(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    match numeric_arg("abs", args, ctx, ev)? {
        Variant::Int(n) => n.checked_abs().map(Variant::Int).ok_or(EvalError::Overflow("abs")),
        Variant::Decimal(d) => d
            .checked_abs()
            .map(Variant::Decimal)
            .ok_or(EvalError::Overflow("abs")),
        other => Ok(other),
    }
}

/// Evaluate every argument, flattening list arguments one level
fn flatten_args(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Vec<Variant>> {
    let mut values = Vec::new();
    for expr in args {
        match ev.evaluate(expr, ctx)? {
            Variant::List(items) => values.extend(items.iter().cloned()),
            value => values.push(value),
        }
    }
    Ok(values)
}

/// MIN function
pub fn fn_min(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    Ok(flatten_args(args, ctx, ev)?.into_iter().min().unwrap_or_default())
}

/// MAX function
pub fn fn_max(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    Ok(flatten_args(args, ctx, ev)?.into_iter().max().unwrap_or_default())
}

/// SUM function: `sum(list, [init])`
pub fn fn_sum(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let items = list_arg("sum", args, 0, ctx, ev)?;
    let mut total = match args.get(1) {
        Some(init) => ev.evaluate(init, ctx)?,
        None => Variant::Int(0),
    };
    for item in &items {
        total = total.add(item)?;
    }
    Ok(total)
}

/// FLOOR function
pub fn fn_floor(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    match numeric_arg("floor", args, ctx, ev)? {
        Variant::Decimal(d) => Ok(Variant::Int(d.div_euclid(DECIMAL_SCALE))),
        other => Ok(Variant::Int(other.to_int()?)),
    }
}

/// CEIL function
pub fn fn_ceil(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    match numeric_arg("ceil", args, ctx, ev)? {
        Variant::Decimal(d) => {
            let floor = d.div_euclid(DECIMAL_SCALE);
            let ceil = if d.rem_euclid(DECIMAL_SCALE) == 0 {
                floor
            } else {
                floor + 1
            };
            Ok(Variant::Int(ceil))
        }
        other => Ok(Variant::Int(other.to_int()?)),
    }
}

/// ROUND function: half away from zero
pub fn fn_round(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    match numeric_arg("round", args, ctx, ev)? {
        Variant::Decimal(d) => {
            let whole = d / DECIMAL_SCALE;
            let frac = (d % DECIMAL_SCALE).abs();
            let rounded = if frac >= DECIMAL_SCALE / 2 {
                whole + d.signum()
            } else {
                whole
            };
            Ok(Variant::Int(rounded))
        }
        other => Ok(Variant::Int(other.to_int()?)),
    }
}

/// SGN function
pub fn fn_sgn(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let value = numeric_arg("sgn", args, ctx, ev)?;
    Ok(Variant::Int(value.to_decimal()?.signum()))
}

/// AS_DECIMAL function
pub fn fn_as_decimal(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let value = numeric_arg("as_decimal", args, ctx, ev)?;
    Ok(Variant::Decimal(value.to_decimal()?))
}
