//! List and map functions

use super::{arg, list_arg, ElementScope};
use crate::ast::Expression;
use crate::callable::{DotCallable, FormulaCallable, MapCallable};
use crate::error::{EvalError, EvalResult};
use crate::evaluator::Evaluator;
use crate::variant::Variant;
use std::collections::BTreeMap;

/// SIZE function: length of a list, map or string
pub fn fn_size(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let value = arg(args, 0, ctx, ev)?;
    let size = match &value {
        Variant::List(items) => items.len(),
        Variant::Map(entries) => entries.len(),
        Variant::String(s) => s.chars().count(),
        Variant::Null => 0,
        other => {
            return Err(EvalError::argument(
                "size",
                format!("expected a list, got {}", other.type_name()),
            ))
        }
    };
    Ok(Variant::from(size))
}

/// HEAD function: first element, or null for an empty list
pub fn fn_head(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let items = list_arg("head", args, 0, ctx, ev)?;
    Ok(items.into_iter().next().unwrap_or_default())
}

/// TAIL function: every element but the first
pub fn fn_tail(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let items = list_arg("tail", args, 0, ctx, ev)?;
    Ok(Variant::list(items.into_iter().skip(1).collect()))
}

/// REVERSE function: reverses lists and strings
pub fn fn_reverse(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    match arg(args, 0, ctx, ev)? {
        Variant::List(items) => Ok(Variant::list(items.iter().rev().cloned().collect())),
        Variant::String(s) => Ok(Variant::String(s.chars().rev().collect())),
        other => Err(EvalError::argument(
            "reverse",
            format!("expected a list, got {}", other.type_name()),
        )),
    }
}

/// SORT function: `sort(list, [key])`
///
/// With a key expression, elements are ordered by the key evaluated with the
/// element bound to `value`. The sort is stable.
pub fn fn_sort(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let mut items = list_arg("sort", args, 0, ctx, ev)?;
    let key_expr = match args.get(1) {
        Some(expr) => expr,
        None => {
            items.sort();
            return Ok(Variant::list(items));
        }
    };

    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let mut locals = MapCallable::new();
        locals.add("value", item.clone());
        let key = ev.evaluate(key_expr, &DotCallable::new(&locals, ctx))?;
        keyed.push((key, item));
    }
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(Variant::list(keyed.into_iter().map(|(_, item)| item).collect()))
}

/// FILTER function: elements (or map entries) for which the expression holds
pub fn fn_filter(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let scope = ElementScope::from_args("filter", args)?;
    match arg(args, 0, ctx, ev)? {
        Variant::Map(entries) => {
            let mut kept = BTreeMap::new();
            for (key, value) in entries.iter() {
                if scope.eval_entry(key, value, ctx, ev)?.as_bool() {
                    kept.insert(key.clone(), value.clone());
                }
            }
            Ok(Variant::map(kept))
        }
        Variant::List(items) => {
            let mut kept = Vec::new();
            for (index, item) in items.iter().enumerate() {
                if scope.eval_item(item, index, ctx, ev)?.as_bool() {
                    kept.push(item.clone());
                }
            }
            Ok(Variant::list(kept))
        }
        other => Err(EvalError::argument(
            "filter",
            format!("expected a list or map, got {}", other.type_name()),
        )),
    }
}

/// MAP function: the expression applied to every element
pub fn fn_map(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let scope = ElementScope::from_args("map", args)?;
    match arg(args, 0, ctx, ev)? {
        Variant::Map(entries) => {
            let mut mapped = BTreeMap::new();
            for (key, value) in entries.iter() {
                mapped.insert(key.clone(), scope.eval_entry(key, value, ctx, ev)?);
            }
            Ok(Variant::map(mapped))
        }
        Variant::List(items) => {
            let mapped = items
                .iter()
                .enumerate()
                .map(|(index, item)| scope.eval_item(item, index, ctx, ev))
                .collect::<EvalResult<Vec<_>>>()?;
            Ok(Variant::list(mapped))
        }
        other => Err(EvalError::argument(
            "map",
            format!("expected a list or map, got {}", other.type_name()),
        )),
    }
}

/// FIND function: the first element for which the expression holds
pub fn fn_find(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let scope = ElementScope::from_args("find", args)?;
    let items = list_arg("find", args, 0, ctx, ev)?;
    for (index, item) in items.iter().enumerate() {
        if scope.eval_item(item, index, ctx, ev)?.as_bool() {
            return Ok(item.clone());
        }
    }
    Ok(Variant::Null)
}

/// CHOOSE function: the element maximizing the expression
///
/// Ties keep the earliest element.
pub fn fn_choose(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let scope = ElementScope::from_args("choose", args)?;
    let items = list_arg("choose", args, 0, ctx, ev)?;
    let mut best: Option<(Variant, &Variant)> = None;
    for (index, item) in items.iter().enumerate() {
        let score = scope.eval_item(item, index, ctx, ev)?;
        if best.as_ref().map_or(true, |(top, _)| score > *top) {
            best = Some((score, item));
        }
    }
    Ok(best.map(|(_, item)| item.clone()).unwrap_or_default())
}

/// INDEX_OF function: `index_of(value, list)`, or -1 when absent
pub fn fn_index_of(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let needle = arg(args, 0, ctx, ev)?;
    let items = list_arg("index_of", args, 1, ctx, ev)?;
    Ok(match items.iter().position(|item| *item == needle) {
        Some(index) => Variant::from(index),
        None => Variant::Int(-1),
    })
}

fn map_arg(
    function: &str,
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<BTreeMap<Variant, Variant>> {
    let value = arg(args, 0, ctx, ev)?;
    match value.as_map() {
        Some(entries) => Ok(entries.clone()),
        None => Err(EvalError::argument(
            function,
            format!("expected a map, got {}", value.type_name()),
        )),
    }
}

/// KEYS function
pub fn fn_keys(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let entries = map_arg("keys", args, ctx, ev)?;
    Ok(Variant::list(entries.into_keys().collect()))
}

/// VALUES function
pub fn fn_values(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let entries = map_arg("values", args, ctx, ev)?;
    Ok(Variant::list(entries.into_values().collect()))
}

/// TOLIST function: a map as a list of `[key, value]` pairs
pub fn fn_tolist(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let entries = map_arg("tolist", args, ctx, ev)?;
    Ok(Variant::list(
        entries
            .into_iter()
            .map(|(key, value)| Variant::list(vec![key, value]))
            .collect(),
    ))
}

/// TOMAP function
///
/// `tomap(keys, values)` zips two lists; `tomap(list)` counts occurrences
/// of each element.
pub fn fn_tomap(
    args: &[Expression],
    ctx: &dyn FormulaCallable,
    ev: &Evaluator<'_>,
) -> EvalResult<Variant> {
    let keys = list_arg("tomap", args, 0, ctx, ev)?;
    let mut map = BTreeMap::new();
    if args.len() == 2 {
        let values = list_arg("tomap", args, 1, ctx, ev)?;
        map.extend(keys.into_iter().zip(values));
    } else {
        for key in keys {
            let count = map.entry(key).or_insert(Variant::Int(0));
            *count = count.add(&Variant::Int(1))?;
        }
    }
    Ok(Variant::map(map))
}
