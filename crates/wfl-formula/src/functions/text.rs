//! Text functions

use super::{arg, string_arg};
use crate::ast::Expression;
use crate::callable::FormulaCallable;
use crate::error::EvalResult;
use crate::evaluator::Evaluator;
use crate::variant::Variant;

/// CONTAINS_STRING function
pub fn fn_contains_string(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let haystack = string_arg("contains_string", args, 0, ctx, ev)?;
    let needle = string_arg("contains_string", args, 1, ctx, ev)?;
    Ok(Variant::from(haystack.contains(&needle)))
}

/// STR_UPPER function
pub fn fn_str_upper(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    Ok(Variant::String(
        string_arg("str_upper", args, 0, ctx, ev)?.to_uppercase(),
    ))
}

/// STR_LOWER function
pub fn fn_str_lower(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    Ok(Variant::String(
        string_arg("str_lower", args, 0, ctx, ev)?.to_lowercase(),
    ))
}

/// LENGTH function: number of characters
pub fn fn_length(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let text = string_arg("length", args, 0, ctx, ev)?;
    Ok(Variant::from(text.chars().count()))
}

/// SUBSTRING function: `substring(str, offset, [len])`
///
/// A negative offset counts from the end. Out-of-range offsets clamp to the
/// string bounds; a negative length takes characters before the offset.
pub fn fn_substring(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let text: Vec<char> = string_arg("substring", args, 0, ctx, ev)?.chars().collect();
    let len = text.len() as i64;

    let mut offset = arg(args, 1, ctx, ev)?.to_int()?;
    if offset < 0 {
        offset += len;
    }
    let offset = offset.clamp(0, len);

    let (start, end) = match args.get(2) {
        Some(expr) => {
            let count = ev.evaluate(expr, ctx)?.to_int()?;
            if count < 0 {
                (offset.saturating_add(count).max(0), offset)
            } else {
                (offset, offset.saturating_add(count).min(len))
            }
        }
        None => (offset, len),
    };

    Ok(Variant::String(
        text[start as usize..end as usize].iter().collect(),
    ))
}

#[cfg(test)]
mod tests {
    use crate::formula::Formula;
    use crate::variant::Variant;
    use pretty_assertions::assert_eq;

    fn eval(formula: &str) -> Variant {
        Formula::new(formula).unwrap().evaluate_default()
    }

    #[test]
    fn test_contains_string() {
        assert_eq!(eval("contains_string('Konrad', 'rad')"), Variant::Int(1));
        assert_eq!(eval("contains_string('Konrad', 'Rad')"), Variant::Int(0));
    }

    #[test]
    fn test_case_and_length() {
        assert_eq!(eval("str_upper('elf')"), Variant::from("ELF"));
        assert_eq!(eval("str_lower('ELF')"), Variant::from("elf"));
        assert_eq!(eval("length('héllo')"), Variant::Int(5));
        assert_eq!(eval("length(5)"), Variant::Null);
    }

    #[test]
    fn test_substring() {
        assert_eq!(eval("substring('abcdef', 2)"), Variant::from("cdef"));
        assert_eq!(eval("substring('abcdef', 1, 3)"), Variant::from("bcd"));
        assert_eq!(eval("substring('abcdef', -2)"), Variant::from("ef"));
        assert_eq!(eval("substring('abcdef', 4, -2)"), Variant::from("cd"));
        assert_eq!(eval("substring('abc', 10)"), Variant::from(""));
        assert_eq!(eval("substring('abc', 1, 99)"), Variant::from("bc"));
    }
}
