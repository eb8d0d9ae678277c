//! End-to-end tests: compile formulas and evaluate them against host objects

use pretty_assertions::assert_eq;
use rand::{rngs::StdRng, SeedableRng};
use std::cell::RefCell;
use std::rc::Rc;
use wfl_formula::{
    EvalError, EvalResult, Formula, FormulaAccess, FormulaCallable, FormulaDebugger,
    FormulaErrorKind, FormulaInput, FormulaOptions, FunctionSymbolTable, MapCallable, Variant,
};

fn eval(source: &str) -> Variant {
    Formula::new(source).unwrap().evaluate_default()
}

/// A host object with a writable field
struct Unit {
    name: String,
    hitpoints: RefCell<i64>,
}

impl FormulaCallable for Unit {
    fn query_value(&self, key: &str) -> EvalResult<Variant> {
        Ok(match key {
            "name" => Variant::from(self.name.as_str()),
            "hitpoints" => Variant::Int(*self.hitpoints.borrow()),
            _ => Variant::Null,
        })
    }

    fn set_value(&self, key: &str, value: Variant) -> EvalResult<()> {
        match key {
            "hitpoints" => {
                *self.hitpoints.borrow_mut() = value.to_int()?;
                Ok(())
            }
            _ => Err(EvalError::ReadOnly(key.to_string())),
        }
    }

    fn get_inputs(&self) -> Vec<FormulaInput> {
        vec![
            FormulaInput::new("name", FormulaAccess::ReadOnly),
            FormulaInput::new("hitpoints", FormulaAccess::ReadWrite),
        ]
    }
}

/// Test precedence and associativity of arithmetic
#[test]
fn test_power_and_precedence() {
    assert_eq!(eval("4^2"), Variant::Int(16));
    assert_eq!(eval("2+3^3"), Variant::Int(29));
    assert_eq!(eval("2*3^3+2"), Variant::Int(56));
    assert_eq!(eval("9^3"), Variant::Int(729));
}

/// Test nested where scoping
#[test]
fn test_where_scoping() {
    assert_eq!(eval("x*5 where x=1"), Variant::Int(5));
    assert_eq!(eval("x*(a*b where a=2,b=1) where x=5"), Variant::Int(10));
}

#[test]
fn test_string_equality() {
    assert!(eval("'abcd' = 'abcd'").as_bool());
    assert!(!eval("'abcd' = 'acd'").as_bool());
}

#[test]
fn test_not_returns_integers() {
    assert_eq!(eval("not 5").as_int(), Some(0));
    assert_eq!(eval("not 0").as_int(), Some(1));
    assert!(eval("not 5").is_int());
}

/// Test the dice operator with a reproducible random source
#[test]
fn test_dice_bounds() {
    let formula = Formula::new("3d6").unwrap();
    let ctx = MapCallable::new();
    let mut rng = StdRng::seed_from_u64(42);
    let mut seen = [false; 19];
    for _ in 0..5000 {
        let roll = formula.evaluate_with(&ctx, &mut rng, None).as_int().unwrap();
        assert!((3..=18).contains(&roll), "roll out of range: {}", roll);
        seen[roll as usize] = true;
    }
    // Both extremes show up over enough rolls
    assert!(seen[3] && seen[18]);
}

#[test]
fn test_type_error_degrades_to_null() {
    assert_eq!(eval("[1,2] + 'str'"), Variant::Null);
}

/// Evaluating twice against equal contexts gives equal results
#[test]
fn test_idempotent_evaluation() {
    let formula = Formula::new(
        "map(units, u, u.hitpoints * factor) where factor = if(bonus, 2, 1)",
    )
    .unwrap();

    let build = || {
        let mut ctx = MapCallable::new();
        let units: Vec<Variant> = [10, 20]
            .iter()
            .map(|&hp| {
                Variant::callable(Unit {
                    name: "Elvish Fighter".into(),
                    hitpoints: RefCell::new(hp),
                })
            })
            .collect();
        ctx.add("units", units).add("bonus", 1);
        ctx
    };

    let first = formula.evaluate(&build());
    let second = formula.evaluate(&build());
    assert_eq!(first, second);
    assert_eq!(
        first,
        Variant::list(vec![Variant::Int(20), Variant::Int(40)])
    );
}

#[test]
fn test_host_object_access() {
    let unit = Rc::new(Unit {
        name: "Konrad".into(),
        hitpoints: RefCell::new(33),
    });
    let mut ctx = MapCallable::with_fallback(unit.clone());
    ctx.add("damage", 8);

    let formula = Formula::new("'[name] has [hitpoints - damage] hp left'").unwrap();
    assert_eq!(
        formula.evaluate(&ctx),
        Variant::from("Konrad has 25 hp left")
    );

    unit.set_value("hitpoints", Variant::Int(9)).unwrap();
    assert_eq!(formula.evaluate(&ctx), Variant::from("Konrad has 1 hp left"));
    assert_eq!(
        unit.set_value("name", Variant::from("x")),
        Err(EvalError::ReadOnly("name".into()))
    );
}

#[test]
fn test_dir_lists_host_inputs() {
    let mut ctx = MapCallable::new();
    ctx.add(
        "leader",
        Variant::callable(Unit {
            name: "Delfador".into(),
            hitpoints: RefCell::new(42),
        }),
    );
    assert_eq!(
        Formula::new("dir(leader)").unwrap().evaluate(&ctx),
        Variant::list(vec![Variant::from("name"), Variant::from("hitpoints")])
    );
}

#[test]
fn test_user_functions_and_recursion() {
    assert_eq!(
        eval("def fib(n) if(n < 2, n, fib(n - 1) + fib(n - 2)); fib(10)"),
        Variant::Int(55)
    );
    assert_eq!(
        eval("def clamp(v, lo, hi) max(lo, min(hi, v)); [clamp(-3, 0, 9), clamp(12, 0, 9)]"),
        Variant::list(vec![Variant::Int(0), Variant::Int(9)])
    );
}

#[test]
fn test_host_registered_function_with_precondition() {
    let table = Rc::new(RefCell::new(FunctionSymbolTable::new()));
    let body = Formula::new("n / 2").unwrap();
    let guard = Formula::new("n > 0").unwrap();
    table.borrow_mut().register_function(
        "half",
        body.expression().clone(),
        Some(guard.expression().clone()),
        vec!["n".into()],
    );

    let formula = Formula::with_symbols("[half(10), half(-4)]", table).unwrap();
    assert_eq!(
        formula.evaluate_default(),
        Variant::list(vec![Variant::Int(5), Variant::Null])
    );
}

#[test]
fn test_decimal_arithmetic() {
    assert_eq!(eval("1.5 + 1"), Variant::Decimal(2500));
    assert_eq!(eval("0.1 * 3"), Variant::Decimal(300));
    assert_eq!(eval("7 / 2"), Variant::Int(3));
    assert_eq!(eval("7.0 / 2"), Variant::Decimal(3500));
    assert_eq!(eval("2 ^ -1"), Variant::Decimal(500));
    assert_eq!(eval("(1.5 + 1) .. ''"), Variant::from("2.5"));
}

#[test]
fn test_list_broadcast() {
    let ints = |v: &[i64]| Variant::list(v.iter().copied().map(Variant::Int).collect());
    assert_eq!(eval("[1, 2, 3] + [10, 20]"), ints(&[11, 22]));
    assert_eq!(eval("[1, 2, 3] * 2"), ints(&[2, 4, 6]));
    assert_eq!(eval("10 - [1, 2]"), ints(&[9, 8]));
    assert_eq!(eval("[4, 6] ./ 2"), ints(&[2, 3]));
    assert_eq!(eval("5 ~ 3"), ints(&[5, 4, 3]));
}

#[test]
fn test_formula_error_message() {
    let err = Formula::with_options(
        "a +\nfrob(2)",
        FormulaOptions::for_file("ai/recruit.fai"),
        None,
    )
    .unwrap_err();
    assert_eq!(err.kind, FormulaErrorKind::UnknownFunction("frob".into()));
    assert_eq!(
        err.message(),
        "Formula error in ai/recruit.fai:1\nIn formula a +\nfrob(2)\nError: Unknown function: frob"
    );
}

/// Run `f` on a thread with a 2 MiB stack, the common platform default
fn on_small_stack(f: impl FnOnce() + Send + 'static) {
    std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(f)
        .unwrap()
        .join()
        .unwrap();
}

#[test]
fn test_deep_recursion_fails_cleanly_on_small_stack() {
    on_small_stack(|| {
        let source = "def down(n) if(n = 0, 0, x + down(n - 1) where x = 1); down(k)";
        let options = FormulaOptions {
            max_call_depth: 100_000,
            ..Default::default()
        };
        let formula = Formula::with_options(source, options, None).unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        let mut ctx = MapCallable::new();
        ctx.add("k", 255);
        assert_eq!(
            formula.execute(&ctx, &mut rng, None),
            Err(EvalError::NestingTooDeep(256))
        );
        assert_eq!(formula.evaluate(&ctx), Variant::Null);

        ctx.add("k", 20);
        assert_eq!(formula.evaluate(&ctx), Variant::Int(20));

        // Default limits
        let formula = Formula::new(source).unwrap();
        ctx.add("k", 255);
        assert_eq!(formula.evaluate(&ctx), Variant::Null);
    });
}

#[test]
fn test_deeply_nested_source_fails_cleanly_on_small_stack() {
    on_small_stack(|| {
        let source = format!("{}1{}", "(".repeat(5000), ")".repeat(5000));
        let err = Formula::new(&source).unwrap_err();
        assert_eq!(err.kind, FormulaErrorKind::NestingTooDeep(256));

        let chain = vec!["1"; 2000].join(" + ");
        let err = Formula::new(&chain).unwrap_err();
        assert_eq!(err.kind, FormulaErrorKind::NestingTooDeep(256));

        let within = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(Formula::new(&within).unwrap().evaluate_default(), Variant::Int(1));
    });
}

#[test]
fn test_debugger_trace() {
    let formula = Formula::new("x + 1 where x = 2").unwrap();
    let mut debugger = FormulaDebugger::new();
    let mut rng = StdRng::seed_from_u64(0);
    let result = formula.evaluate_with(&MapCallable::new(), &mut rng, Some(&mut debugger));
    assert_eq!(result, Variant::Int(3));

    let rendered = debugger.to_string();
    assert!(rendered.starts_with("{where:((x + 1)) {x=2}} = 3\n"), "{}", rendered);
    assert!(rendered.contains("    x = 2\n"), "{}", rendered);
}
