//! Formula expression tree

use crate::variant::format_decimal;
use std::fmt;

/// A compiled expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    // === Literals ===
    /// `null()`
    Null,
    Integer(i64),
    /// Fixed-point decimal, scaled by 1000
    Decimal(i64),
    String(StringLiteral),
    List(Vec<Expression>),
    Map(Vec<(Expression, Expression)>),

    // === Names ===
    Identifier(String),

    // === Operators ===
    Unary {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `left.right`: evaluate `right` with `left`'s members in scope
    Dot {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `left[key]`
    Index {
        left: Box<Expression>,
        key: Box<Expression>,
    },

    // === Functions ===
    FunctionCall {
        name: String,
        args: Vec<Expression>,
    },
    /// The `functions` keyword: lists every callable function name
    FunctionList,

    /// `body where name=value, ...`
    Where {
        body: Box<Expression>,
        clauses: Vec<WhereClause>,
    },
}

/// One `name=value` binding of a where expression
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub name: String,
    pub value: Expression,
}

/// A string literal, split into plain text and `[...]` substitutions
#[derive(Debug, Clone, PartialEq)]
pub struct StringLiteral {
    /// Text between the quotes, exactly as written
    pub raw: String,
    pub pieces: Vec<StringPiece>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StringPiece {
    Text(String),
    Formula(Box<Expression>),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Logical
    And,
    Or,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,

    // Lists and strings
    Range,
    Concat,

    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    Dice,

    // Element-wise list arithmetic
    ListAdd,
    ListSubtract,
    ListMultiply,
    ListDivide,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Negate,
}

impl BinaryOperator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "and" => BinaryOperator::And,
            "or" => BinaryOperator::Or,
            "=" => BinaryOperator::Equal,
            "!=" => BinaryOperator::NotEqual,
            "<" => BinaryOperator::LessThan,
            ">" => BinaryOperator::GreaterThan,
            "<=" => BinaryOperator::LessEqual,
            ">=" => BinaryOperator::GreaterEqual,
            "~" => BinaryOperator::Range,
            ".." => BinaryOperator::Concat,
            "+" => BinaryOperator::Add,
            "-" => BinaryOperator::Subtract,
            "*" => BinaryOperator::Multiply,
            "/" => BinaryOperator::Divide,
            "%" => BinaryOperator::Modulo,
            "^" => BinaryOperator::Power,
            "d" => BinaryOperator::Dice,
            ".+" => BinaryOperator::ListAdd,
            ".-" => BinaryOperator::ListSubtract,
            ".*" => BinaryOperator::ListMultiply,
            "./" => BinaryOperator::ListDivide,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::Range => "~",
            BinaryOperator::Concat => "..",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Power => "^",
            BinaryOperator::Dice => "d",
            BinaryOperator::ListAdd => ".+",
            BinaryOperator::ListSubtract => ".-",
            BinaryOperator::ListMultiply => ".*",
            BinaryOperator::ListDivide => "./",
        }
    }
}

impl UnaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOperator::Not => "not",
            UnaryOperator::Negate => "-",
        }
    }
}

/// Binding strength of an operator token; higher binds tighter
pub fn precedence(symbol: &str) -> Option<u8> {
    Some(match symbol {
        "not" => 1,
        "where" => 2,
        "or" => 3,
        "and" => 4,
        "=" | "!=" | "<" | ">" | "<=" | ">=" => 5,
        "~" => 6,
        "+" | "-" | ".." | ".+" | ".-" => 7,
        "*" | "/" | ".*" | "./" => 8,
        "%" => 9,
        "^" => 10,
        "d" => 11,
        "." => 12,
        _ => return None,
    })
}

/// Only `^` groups to the right
pub fn is_right_associative(symbol: &str) -> bool {
    symbol == "^"
}

fn write_list<T>(
    f: &mut fmt::Formatter<'_>,
    items: &[T],
    mut write_item: impl FnMut(&mut fmt::Formatter<'_>, &T) -> fmt::Result,
) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write_item(f, item)?;
    }
    Ok(())
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Null => f.write_str("null()"),
            Expression::Integer(n) => write!(f, "{}", n),
            Expression::Decimal(d) => f.write_str(&format_decimal(*d)),
            Expression::String(s) => write!(f, "'{}'", s.raw),
            Expression::List(items) => {
                f.write_str("[")?;
                write_list(f, items, |f, item| write!(f, "{}", item))?;
                f.write_str("]")
            }
            Expression::Map(entries) if entries.is_empty() => f.write_str("[->]"),
            Expression::Map(entries) => {
                f.write_str("[")?;
                write_list(f, entries, |f, (k, v)| write!(f, "{} -> {}", k, v))?;
                f.write_str("]")
            }
            Expression::Identifier(name) => f.write_str(name),
            Expression::Unary {
                op: UnaryOperator::Not,
                operand,
            } => write!(f, "(not {})", operand),
            Expression::Unary {
                op: UnaryOperator::Negate,
                operand,
            } => write!(f, "(-{})", operand),
            Expression::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expression::Dot { left, right } => write!(f, "({} . {})", left, right),
            Expression::Index { left, key } => write!(f, "{}[{}]", left, key),
            Expression::FunctionCall { name, args } => {
                write!(f, "{}(", name)?;
                write_list(f, args, |f, arg| write!(f, "{}", arg))?;
                f.write_str(")")
            }
            Expression::FunctionList => f.write_str("functions"),
            Expression::Where { body, clauses } => {
                write!(f, "{{where:({}) {{", body)?;
                write_list(f, clauses, |f, clause| {
                    write!(f, "{}={}", clause.name, clause.value)
                })?;
                f.write_str("}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_symbols_round_trip() {
        for symbol in [
            "and", "or", "=", "!=", "<", ">", "<=", ">=", "~", "..", "+", "-", "*", "/", "%",
            "^", "d", ".+", ".-", ".*", "./",
        ] {
            let op = BinaryOperator::from_symbol(symbol).unwrap();
            assert_eq!(op.symbol(), symbol);
            assert!(precedence(symbol).is_some());
        }
        assert_eq!(BinaryOperator::from_symbol("not"), None);
    }

    #[test]
    fn test_precedence_order() {
        let order = ["not", "where", "or", "and", "=", "~", "+", "*", "%", "^", "d", "."];
        for pair in order.windows(2) {
            assert!(precedence(pair[0]) < precedence(pair[1]), "{:?}", pair);
        }
        assert!(is_right_associative("^"));
        assert!(!is_right_associative("-"));
    }

    #[test]
    fn test_display() {
        let expr = Expression::Binary {
            op: BinaryOperator::Add,
            left: Box::new(Expression::Integer(1)),
            right: Box::new(Expression::Unary {
                op: UnaryOperator::Negate,
                operand: Box::new(Expression::Decimal(2500)),
            }),
        };
        assert_eq!(expr.to_string(), "(1 + (-2.5))");

        let call = Expression::FunctionCall {
            name: "max".into(),
            args: vec![Expression::Identifier("a".into()), Expression::Null],
        };
        assert_eq!(call.to_string(), "max(a, null())");

        let where_expr = Expression::Where {
            body: Box::new(Expression::Identifier("x".into())),
            clauses: vec![WhereClause {
                name: "x".into(),
                value: Expression::Integer(1),
            }],
        };
        assert_eq!(where_expr.to_string(), "{where:(x) {x=1}}");
        assert_eq!(Expression::Map(Vec::new()).to_string(), "[->]");
    }
}
