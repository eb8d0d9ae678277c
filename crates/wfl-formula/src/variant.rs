//! Runtime values
//!
//! A [`Variant`] is the single dynamic value type formulas compute with.
//! There is no boolean type: comparisons and logical operators produce the
//! integers 1 and 0.

use crate::callable::FormulaCallable;
use crate::error::{EvalError, EvalResult};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Fixed-point scale of decimal values (three fractional digits)
pub const DECIMAL_SCALE: i64 = 1000;

/// Longest list the `~` operator builds
pub const MAX_RANGE_SIZE: u64 = 1_000_000;

/// A formula value
#[derive(Clone, Default)]
pub enum Variant {
    #[default]
    Null,
    Int(i64),
    /// Fixed-point decimal holding `value * 1000`
    Decimal(i64),
    String(String),
    List(Rc<Vec<Variant>>),
    Map(Rc<BTreeMap<Variant, Variant>>),
    Callable(Rc<dyn FormulaCallable>),
}

/// Kinds of values, in comparison order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantType {
    Null,
    Int,
    Decimal,
    Callable,
    List,
    String,
    Map,
}

impl VariantType {
    pub fn name(self) -> &'static str {
        match self {
            VariantType::Null => "null",
            VariantType::Int => "int",
            VariantType::Decimal => "decimal",
            VariantType::Callable => "object",
            VariantType::List => "list",
            VariantType::String => "string",
            VariantType::Map => "map",
        }
    }

    /// Ordering rank; ints and decimals share a rank
    fn rank(self) -> u8 {
        match self {
            VariantType::Null => 0,
            VariantType::Int | VariantType::Decimal => 1,
            VariantType::Callable => 2,
            VariantType::List => 3,
            VariantType::String => 4,
            VariantType::Map => 5,
        }
    }
}

impl Variant {
    /// Build a decimal from its scaled representation
    pub fn decimal(scaled: i64) -> Self {
        Variant::Decimal(scaled)
    }

    pub fn list(items: Vec<Variant>) -> Self {
        Variant::List(Rc::new(items))
    }

    pub fn map(entries: BTreeMap<Variant, Variant>) -> Self {
        Variant::Map(Rc::new(entries))
    }

    pub fn callable<C: FormulaCallable + 'static>(callable: C) -> Self {
        Variant::Callable(Rc::new(callable))
    }

    pub fn variant_type(&self) -> VariantType {
        match self {
            Variant::Null => VariantType::Null,
            Variant::Int(_) => VariantType::Int,
            Variant::Decimal(_) => VariantType::Decimal,
            Variant::String(_) => VariantType::String,
            Variant::List(_) => VariantType::List,
            Variant::Map(_) => VariantType::Map,
            Variant::Callable(_) => VariantType::Callable,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.variant_type().name()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Variant::Int(_))
    }

    pub fn is_decimal(&self) -> bool {
        matches!(self, Variant::Decimal(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Variant::Int(_) | Variant::Decimal(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Variant::String(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Variant::List(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Variant::Map(_))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Variant::Callable(_))
    }

    /// Integer value, if this is null or a number. Decimals truncate.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Variant::Null => Some(0),
            Variant::Int(n) => Some(*n),
            Variant::Decimal(d) => Some(d / DECIMAL_SCALE),
            _ => None,
        }
    }

    /// Force conversion to an integer
    pub fn to_int(&self) -> EvalResult<i64> {
        self.as_int().ok_or_else(|| {
            EvalError::Type(format!("expected an integer, found {}", self.type_name()))
        })
    }

    /// Scaled decimal value, if this is null or a number
    pub fn as_decimal(&self) -> Option<i64> {
        match self {
            Variant::Null => Some(0),
            Variant::Int(n) => n.checked_mul(DECIMAL_SCALE),
            Variant::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Force conversion to a scaled decimal
    pub fn to_decimal(&self) -> EvalResult<i64> {
        match self {
            Variant::Int(_) => self.as_decimal().ok_or(EvalError::Overflow("decimal conversion")),
            _ => self.as_decimal().ok_or_else(|| {
                EvalError::Type(format!("expected a decimal, found {}", self.type_name()))
            }),
        }
    }

    /// Truthiness
    pub fn as_bool(&self) -> bool {
        match self {
            Variant::Null => false,
            Variant::Int(n) => *n != 0,
            Variant::Decimal(d) => *d != 0,
            Variant::String(s) => !s.is_empty(),
            Variant::List(items) => !items.is_empty(),
            Variant::Map(entries) => !entries.is_empty(),
            Variant::Callable(_) => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Variant]> {
        match self {
            Variant::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<Variant, Variant>> {
        match self {
            Variant::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&Rc<dyn FormulaCallable>> {
        match self {
            Variant::Callable(c) => Some(c),
            _ => None,
        }
    }

    /// String cast, as used by concatenation and string substitution
    pub fn as_string(&self) -> String {
        match self {
            Variant::Null => String::new(),
            Variant::Int(n) => n.to_string(),
            Variant::Decimal(d) => format_decimal(*d),
            Variant::String(s) => s.clone(),
            _ => self.to_debug_string(),
        }
    }

    /// Rendering that shows the value's kind, e.g. `'text'` or `[1, 2]`
    pub fn to_debug_string(&self) -> String {
        match self {
            Variant::Null => "null()".to_string(),
            Variant::String(s) => format!("'{}'", s),
            Variant::List(items) => {
                let items: Vec<String> = items.iter().map(Variant::to_debug_string).collect();
                format!("[{}]", items.join(", "))
            }
            Variant::Map(entries) if entries.is_empty() => "[->]".to_string(),
            Variant::Map(entries) => {
                let entries: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{} -> {}", k.to_debug_string(), v.to_debug_string()))
                    .collect();
                format!("[{}]", entries.join(", "))
            }
            Variant::Callable(_) => "(object)".to_string(),
            _ => self.as_string(),
        }
    }

    // === Arithmetic ===

    pub fn add(&self, other: &Variant) -> EvalResult<Variant> {
        match (self, other) {
            (Variant::Map(a), Variant::Map(b)) => Ok(merge_maps(a, b)),
            _ if self.is_list() || other.is_list() => self.list_elements_add(other),
            _ => numeric_op(self, other, Arithmetic::Add),
        }
    }

    pub fn sub(&self, other: &Variant) -> EvalResult<Variant> {
        if self.is_list() || other.is_list() {
            return self.list_elements_sub(other);
        }
        numeric_op(self, other, Arithmetic::Sub)
    }

    pub fn mul(&self, other: &Variant) -> EvalResult<Variant> {
        if self.is_list() || other.is_list() {
            return self.list_elements_mul(other);
        }
        numeric_op(self, other, Arithmetic::Mul)
    }

    pub fn div(&self, other: &Variant) -> EvalResult<Variant> {
        if self.is_list() || other.is_list() {
            return self.list_elements_div(other);
        }
        numeric_op(self, other, Arithmetic::Div)
    }

    pub fn rem(&self, other: &Variant) -> EvalResult<Variant> {
        numeric_op(self, other, Arithmetic::Rem)
    }

    pub fn pow(&self, other: &Variant) -> EvalResult<Variant> {
        if let (Some(base), Variant::Int(exp)) = (self.int_operand(), other) {
            if *exp >= 0 {
                let result = match u32::try_from(*exp) {
                    Ok(exp) => base.checked_pow(exp),
                    // Only these bases stay in range for such exponents
                    Err(_) => match base {
                        0 | 1 => Some(base),
                        -1 if *exp % 2 == 0 => Some(1),
                        -1 => Some(-1),
                        _ => None,
                    },
                };
                return result.map(Variant::Int).ok_or(EvalError::Overflow("^"));
            }
        }

        let (base, exp) = decimal_operands(self, other, "^")?;
        let result = (base as f64 / DECIMAL_SCALE as f64).powf(exp as f64 / DECIMAL_SCALE as f64);
        if !result.is_finite() {
            return Err(EvalError::Type(format!(
                "{} ^ {} is not a number",
                self.as_string(),
                other.as_string()
            )));
        }
        let scaled = (result * DECIMAL_SCALE as f64).round();
        if scaled.abs() >= i64::MAX as f64 {
            return Err(EvalError::Overflow("^"));
        }
        Ok(Variant::Decimal(scaled as i64))
    }

    pub fn negate(&self) -> EvalResult<Variant> {
        match self {
            Variant::Null => Ok(Variant::Int(0)),
            Variant::Int(n) => n
                .checked_neg()
                .map(Variant::Int)
                .ok_or(EvalError::Overflow("negation")),
            Variant::Decimal(d) => d
                .checked_neg()
                .map(Variant::Decimal)
                .ok_or(EvalError::Overflow("negation")),
            _ => Err(EvalError::Type(format!(
                "cannot negate a {}",
                self.type_name()
            ))),
        }
    }

    /// `..`: joins lists, merges maps, otherwise joins string casts
    pub fn concatenate(&self, other: &Variant) -> Variant {
        match (self, other) {
            (Variant::List(a), Variant::List(b)) => {
                Variant::list(a.iter().chain(b.iter()).cloned().collect())
            }
            (Variant::Map(a), Variant::Map(b)) => merge_maps(a, b),
            _ => Variant::String(self.as_string() + &other.as_string()),
        }
    }

    /// `~`: inclusive integer range, descending when `self > other`
    pub fn build_range(&self, other: &Variant) -> EvalResult<Variant> {
        let start = self.to_int()?;
        let end = other.to_int()?;
        let size = start.abs_diff(end).saturating_add(1);
        if size > MAX_RANGE_SIZE {
            return Err(EvalError::TooLarge {
                what: "range",
                size,
                limit: MAX_RANGE_SIZE,
            });
        }
        let items = if start <= end {
            (start..=end).map(Variant::Int).collect()
        } else {
            (end..=start).rev().map(Variant::Int).collect()
        };
        Ok(Variant::list(items))
    }

    // === Element-wise list arithmetic ===

    pub fn list_elements_add(&self, other: &Variant) -> EvalResult<Variant> {
        self.list_elements(other, Variant::add)
    }

    pub fn list_elements_sub(&self, other: &Variant) -> EvalResult<Variant> {
        self.list_elements(other, Variant::sub)
    }

    pub fn list_elements_mul(&self, other: &Variant) -> EvalResult<Variant> {
        self.list_elements(other, Variant::mul)
    }

    pub fn list_elements_div(&self, other: &Variant) -> EvalResult<Variant> {
        self.list_elements(other, Variant::div)
    }

    /// Apply `op` pairwise over two lists (truncated to the shorter one),
    /// or between every element of a list and a scalar
    fn list_elements(
        &self,
        other: &Variant,
        op: fn(&Variant, &Variant) -> EvalResult<Variant>,
    ) -> EvalResult<Variant> {
        let items = match (self, other) {
            (Variant::List(a), Variant::List(b)) => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| op(x, y))
                .collect::<EvalResult<Vec<_>>>()?,
            (Variant::List(a), scalar) => a
                .iter()
                .map(|x| op(x, scalar))
                .collect::<EvalResult<Vec<_>>>()?,
            (scalar, Variant::List(b)) => b
                .iter()
                .map(|y| op(scalar, y))
                .collect::<EvalResult<Vec<_>>>()?,
            _ => return op(self, other),
        };
        Ok(Variant::list(items))
    }

    fn int_operand(&self) -> Option<i64> {
        match self {
            Variant::Null => Some(0),
            Variant::Int(n) => Some(*n),
            _ => None,
        }
    }

    fn scaled(&self) -> i128 {
        match self {
            Variant::Int(n) => *n as i128 * DECIMAL_SCALE as i128,
            Variant::Decimal(d) => *d as i128,
            _ => 0,
        }
    }
}

#[derive(Clone, Copy)]
enum Arithmetic {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl Arithmetic {
    fn symbol(self) -> &'static str {
        match self {
            Arithmetic::Add => "+",
            Arithmetic::Sub => "-",
            Arithmetic::Mul => "*",
            Arithmetic::Div => "/",
            Arithmetic::Rem => "%",
        }
    }
}

fn numeric_op(left: &Variant, right: &Variant, op: Arithmetic) -> EvalResult<Variant> {
    let symbol = op.symbol();

    if let (Some(a), Some(b)) = (left.int_operand(), right.int_operand()) {
        let result = match op {
            Arithmetic::Add => a.checked_add(b),
            Arithmetic::Sub => a.checked_sub(b),
            Arithmetic::Mul => a.checked_mul(b),
            Arithmetic::Div | Arithmetic::Rem if b == 0 => return Err(EvalError::DivisionByZero),
            Arithmetic::Div => a.checked_div(b),
            Arithmetic::Rem => a.checked_rem(b),
        };
        return result.map(Variant::Int).ok_or(EvalError::Overflow(symbol));
    }

    let (a, b) = decimal_operands(left, right, symbol)?;
    let result = match op {
        Arithmetic::Add => a.checked_add(b),
        Arithmetic::Sub => a.checked_sub(b),
        Arithmetic::Mul => i64::try_from(a as i128 * b as i128 / DECIMAL_SCALE as i128).ok(),
        Arithmetic::Div | Arithmetic::Rem if b == 0 => return Err(EvalError::DivisionByZero),
        Arithmetic::Div => i64::try_from(a as i128 * DECIMAL_SCALE as i128 / b as i128).ok(),
        Arithmetic::Rem => a.checked_rem(b),
    };
    result.map(Variant::Decimal).ok_or(EvalError::Overflow(symbol))
}

fn decimal_operands(left: &Variant, right: &Variant, symbol: &str) -> EvalResult<(i64, i64)> {
    match (left.as_decimal(), right.as_decimal()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ if left.is_numeric() && right.is_numeric() => Err(EvalError::Overflow("decimal conversion")),
        _ => Err(EvalError::Type(format!(
            "cannot apply '{}' to {} and {}",
            symbol,
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn merge_maps(a: &BTreeMap<Variant, Variant>, b: &BTreeMap<Variant, Variant>) -> Variant {
    let mut merged = a.clone();
    merged.extend(b.iter().map(|(k, v)| (k.clone(), v.clone())));
    Variant::map(merged)
}

/// Render a scaled decimal with at least one fractional digit
pub(crate) fn format_decimal(scaled: i64) -> String {
    let sign = if scaled < 0 { "-" } else { "" };
    let magnitude = scaled.unsigned_abs();
    let whole = magnitude / DECIMAL_SCALE as u64;
    let frac = format!("{:03}", magnitude % DECIMAL_SCALE as u64);
    let frac = frac.trim_end_matches('0');
    let frac = if frac.is_empty() { "0" } else { frac };
    format!("{}{}.{}", sign, whole, frac)
}

fn callable_address(callable: &Rc<dyn FormulaCallable>) -> usize {
    Rc::as_ptr(callable) as *const () as usize
}

impl Ord for Variant {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Variant::Null, Variant::Null) => Ordering::Equal,
            (Variant::Int(a), Variant::Int(b)) => a.cmp(b),
            (Variant::Int(_) | Variant::Decimal(_), Variant::Int(_) | Variant::Decimal(_)) => {
                self.scaled().cmp(&other.scaled())
            }
            (Variant::String(a), Variant::String(b)) => a.cmp(b),
            (Variant::List(a), Variant::List(b)) => a.iter().cmp(b.iter()),
            (Variant::Map(a), Variant::Map(b)) => a.iter().cmp(b.iter()),
            (Variant::Callable(a), Variant::Callable(b)) => {
                callable_address(a).cmp(&callable_address(b))
            }
            _ => self
                .variant_type()
                .rank()
                .cmp(&other.variant_type().rank()),
        }
    }
}

impl PartialOrd for Variant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Variant {}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_debug_string())
    }
}

impl From<i64> for Variant {
    fn from(value: i64) -> Self {
        Variant::Int(value)
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Variant::Int(value as i64)
    }
}

impl From<usize> for Variant {
    fn from(value: usize) -> Self {
        Variant::Int(value as i64)
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Int(value as i64)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(value.to_string())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::String(value)
    }
}

impl From<Vec<Variant>> for Variant {
    fn from(items: Vec<Variant>) -> Self {
        Variant::list(items)
    }
}

impl From<BTreeMap<Variant, Variant>> for Variant {
    fn from(entries: BTreeMap<Variant, Variant>) -> Self {
        Variant::map(entries)
    }
}
