//! Control flow and introspection functions

use super::arg;
use crate::ast::Expression;
use crate::callable::FormulaCallable;
use crate::error::EvalResult;
use crate::evaluator::Evaluator;
use crate::variant::Variant;

/// IF function
///
/// `if(cond, then, [cond2, then2, ...], [else])`. Only the selected branch
/// is evaluated; a missing else yields null.
pub fn fn_if(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let mut pairs = args.chunks_exact(2);
    for pair in pairs.by_ref() {
        if ev.evaluate(&pair[0], ctx)?.as_bool() {
            return ev.evaluate(&pair[1], ctx);
        }
    }
    match pairs.remainder() {
        [otherwise] => ev.evaluate(otherwise, ctx),
        _ => Ok(Variant::Null),
    }
}

/// SWITCH function
///
/// `switch(value, case, result, ..., [default])`
pub fn fn_switch(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let value = arg(args, 0, ctx, ev)?;
    let mut cases = args[1..].chunks_exact(2);
    for case in cases.by_ref() {
        if ev.evaluate(&case[0], ctx)? == value {
            return ev.evaluate(&case[1], ctx);
        }
    }
    match cases.remainder() {
        [default] => ev.evaluate(default, ctx),
        _ => Ok(Variant::Null),
    }
}

/// TYPE function: the kind name of a value
pub fn fn_type(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    Ok(Variant::from(arg(args, 0, ctx, ev)?.type_name()))
}

/// DIR function: the input names an object exposes
pub fn fn_dir(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let value = arg(args, 0, ctx, ev)?;
    let names = match value.as_callable() {
        Some(callable) => callable
            .get_inputs()
            .into_iter()
            .map(|input| Variant::from(input.name))
            .collect(),
        None => Vec::new(),
    };
    Ok(Variant::list(names))
}

/// DEBUG_PRINT function
///
/// Logs `[label: ]value` and returns the value unchanged.
pub fn fn_debug_print(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let (label, value) = match args {
        [label, value] => (
            Some(ev.evaluate(label, ctx)?.as_string()),
            ev.evaluate(value, ctx)?,
        ),
        _ => (None, arg(args, 0, ctx, ev)?),
    };
    match label {
        Some(label) => tracing::debug!("{}: {}", label, value.to_debug_string()),
        None => tracing::debug!("{}", value.to_debug_string()),
    }
    Ok(value)
}

/// NULL function
pub fn fn_null(
    _args: &[Expression],
    _ctx: &dyn FormulaCallable,
    _ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    Ok(Variant::Null)
}

#[cfg(test)]
mod tests {
    use crate::callable::MapCallable;
    use crate::formula::Formula;
    use crate::variant::Variant;
    use pretty_assertions::assert_eq;

    fn eval(formula: &str) -> Variant {
        Formula::new(formula).unwrap().evaluate_default()
    }

    #[test]
    fn test_if() {
        assert_eq!(eval("if(1, 'yes', 'no')"), Variant::from("yes"));
        assert_eq!(eval("if(0, 'yes', 'no')"), Variant::from("no"));
        assert_eq!(eval("if(0, 'yes')"), Variant::Null);
        assert_eq!(eval("if(0, 1, 1, 2, 3)"), Variant::Int(2));
        assert_eq!(eval("if(0, 1, 0, 2, 3)"), Variant::Int(3));
        // The branch not taken is never evaluated
        assert_eq!(eval("if(1, 5, 1/0)"), Variant::Int(5));
    }

    #[test]
    fn test_switch() {
        assert_eq!(eval("switch(2, 1, 'a', 2, 'b')"), Variant::from("b"));
        assert_eq!(eval("switch(9, 1, 'a', 2, 'b', 'z')"), Variant::from("z"));
        assert_eq!(eval("switch(9, 1, 'a')"), Variant::Null);
    }

    #[test]
    fn test_type() {
        assert_eq!(eval("type(1)"), Variant::from("int"));
        assert_eq!(eval("type(1.5)"), Variant::from("decimal"));
        assert_eq!(eval("type('s')"), Variant::from("string"));
        assert_eq!(eval("type([1])"), Variant::from("list"));
        assert_eq!(eval("type([1 -> 2])"), Variant::from("map"));
        assert_eq!(eval("type(null())"), Variant::from("null"));
    }

    #[test]
    fn test_dir() {
        let mut unit = MapCallable::new();
        unit.add("hitpoints", 10).add("moves", 5);
        let mut ctx = MapCallable::new();
        ctx.add("unit", Variant::callable(unit));

        let result = Formula::new("dir(unit)").unwrap().evaluate(&ctx);
        assert_eq!(
            result,
            Variant::list(vec![Variant::from("hitpoints"), Variant::from("moves")])
        );
        assert_eq!(eval("dir(5)"), Variant::list(Vec::new()));
    }

    #[test]
    fn test_debug_print_passes_value_through() {
        assert_eq!(eval("debug_print(1 + 1)"), Variant::Int(2));
        assert_eq!(eval("debug_print('sum', [1, 2])"), eval("[1, 2]"));
    }
}
