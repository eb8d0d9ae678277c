//! Formula parser
//!
//! An operator-precedence parser working over ranges of a token array. Each
//! call finds the loosest-binding operator outside of brackets, splits the
//! range there and recurses into both halves; ranges without such an
//! operator are literals, names, calls or bracketed forms.

use crate::ast::{
    is_right_associative, precedence, BinaryOperator, Expression, StringLiteral, StringPiece,
    UnaryOperator, WhereClause,
};
use crate::error::{FormulaError, FormulaErrorKind, FormulaResult};
use crate::functions::{builtins, FunctionSymbolTable, UserFunction};
use crate::options::FormulaOptions;
use crate::tokenizer::{Token, TokenKind, Tokenizer};
use crate::variant::DECIMAL_SCALE;
use std::rc::Rc;

/// The result of compiling a formula
#[derive(Debug)]
pub struct Compiled {
    pub expression: Expression,
    /// Names of the regions marked with `fai`/`wfl`, in order of appearance
    pub files: Vec<Rc<str>>,
}

/// Compile `source` into an expression tree
///
/// Functions declared with `def` are added to `symbols`.
///
/// # Example
/// ```rust
/// use wfl_formula::{parser::compile, FormulaOptions, FunctionSymbolTable};
///
/// let mut symbols = FunctionSymbolTable::new();
/// let compiled = compile("1 + 2 * 3", &FormulaOptions::default(), &mut symbols).unwrap();
/// assert_eq!(compiled.expression.to_string(), "(1 + (2 * 3))");
/// ```
pub fn compile(
    source: &str,
    options: &FormulaOptions,
    symbols: &mut FunctionSymbolTable,
) -> FormulaResult<Compiled> {
    let file: Rc<str> = Rc::from(options.filename.as_str());
    let (tokens, files) = scan(source, file.clone(), options.first_line)?;
    tracing::trace!(tokens = tokens.len(), "tokenized formula");

    let mut parser = Parser::new(source, tokens, symbols);
    parser.origin = (file, options.first_line);
    parser.max_nesting = options.max_nesting;
    let expression = parser.parse_all()?;
    Ok(Compiled { expression, files })
}

/// Tokenize `source`, dropping trivia and applying inclusion markers
fn scan<'a>(
    source: &'a str,
    file: Rc<str>,
    first_line: usize,
) -> FormulaResult<(Vec<Token<'a>>, Vec<Rc<str>>)> {
    let mut tokenizer = Tokenizer::new(source, file.clone(), first_line);
    let mut raw = Vec::new();
    while let Some(token) = tokenizer.next_token() {
        match token {
            Ok(token) if token.kind.is_trivia() => {}
            Ok(token) => raw.push(token),
            Err(e) => {
                let line = source_line(source, e.offset());
                return Err(FormulaError::new(
                    FormulaErrorKind::Token(e),
                    line,
                    file.as_ref(),
                    tokenizer.line(),
                ));
            }
        }
    }

    // Each open region: (name, line of its marker)
    let mut regions: Vec<(Rc<str>, usize)> = Vec::new();
    let mut files: Vec<Rc<str>> = Vec::new();
    let mut tokens = Vec::with_capacity(raw.len());
    let mut iter = raw.into_iter();

    while let Some(mut token) = iter.next() {
        if token.is_keyword("fai") || token.is_keyword("wfl") {
            let marker = token;
            let name = match iter.next() {
                Some(t) if t.kind == TokenKind::StringLiteral => unquote(t.text).to_string(),
                _ => {
                    return Err(located(
                        FormulaErrorKind::InvalidInclusion(marker.text.to_string()),
                        source_line(source, marker.offset),
                        &marker,
                    ))
                }
            };
            if files.iter().any(|f| f.as_ref() == name) {
                return Err(located(
                    FormulaErrorKind::DuplicateInclusion(name),
                    source_line(source, marker.offset),
                    &marker,
                ));
            }
            let name: Rc<str> = Rc::from(name);
            files.push(name.clone());
            regions.push((name, marker.line));
            continue;
        }

        if token.is_keyword("faiend") || token.is_keyword("wflend") {
            if regions.pop().is_none() {
                return Err(located(
                    FormulaErrorKind::UnmatchedInclusionEnd,
                    source_line(source, token.offset),
                    &token,
                ));
            }
            continue;
        }

        if let Some((name, marker_line)) = regions.last() {
            token.line = token.line - marker_line + 1;
            token.file = name.clone();
        }
        tokens.push(token);
    }

    if let Some((name, marker_line)) = regions.pop() {
        return Err(FormulaError::new(
            FormulaErrorKind::UnterminatedInclusion(name.to_string()),
            source,
            file.as_ref(),
            marker_line,
        ));
    }

    Ok((tokens, files))
}

fn located(kind: FormulaErrorKind, formula: &str, token: &Token<'_>) -> FormulaError {
    FormulaError::new(kind, formula, token.file.as_ref(), token.line)
}

/// The full source line containing byte `offset`
fn source_line(source: &str, offset: usize) -> &str {
    let offset = offset.min(source.len());
    let start = source[..offset].rfind('\n').map_or(0, |i| i + 1);
    let end = source[offset..]
        .find('\n')
        .map_or(source.len(), |i| offset + i);
    &source[start..end]
}

fn unquote(text: &str) -> &str {
    text.strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .unwrap_or(text)
}

fn is_operator(token: &Token<'_>) -> bool {
    match token.kind {
        TokenKind::Operator => true,
        TokenKind::Keyword => matches!(token.text, "not" | "where" | "and" | "or"),
        _ => false,
    }
}

struct Parser<'a, 's> {
    source: &'a str,
    tokens: Vec<Token<'a>>,
    symbols: &'s mut FunctionSymbolTable,
    /// Functions whose bodies are being parsed, so they can recurse
    defining: Vec<String>,
    /// Location reported when there are no tokens to point at
    origin: (Rc<str>, usize),
    depth: usize,
    max_nesting: usize,
}

impl<'a, 's> Parser<'a, 's> {
    fn new(
        source: &'a str,
        tokens: Vec<Token<'a>>,
        symbols: &'s mut FunctionSymbolTable,
    ) -> Self {
        Self {
            source,
            tokens,
            symbols,
            defining: Vec::new(),
            origin: (Rc::from("formula"), 1),
            depth: 0,
            max_nesting: usize::MAX,
        }
    }

    fn parse_all(&mut self) -> FormulaResult<Expression> {
        self.check_brackets()?;
        self.parse_expression(0, self.tokens.len())
    }

    /// Every bracket has a partner of the same shape
    fn check_brackets(&self) -> FormulaResult<()> {
        let mut open: Vec<usize> = Vec::new();
        for (i, token) in self.tokens.iter().enumerate() {
            match token.kind {
                TokenKind::LParens | TokenKind::LSquare => open.push(i),
                TokenKind::RParens | TokenKind::RSquare => {
                    let expected = if token.kind == TokenKind::RParens {
                        TokenKind::LParens
                    } else {
                        TokenKind::LSquare
                    };
                    match open.pop() {
                        Some(j) if self.tokens[j].kind == expected => {}
                        _ => return Err(self.error_at(FormulaErrorKind::MismatchedBrackets, i)),
                    }
                }
                _ => {}
            }
        }
        match open.pop() {
            Some(j) => Err(self.error_at(FormulaErrorKind::MismatchedBrackets, j)),
            None => Ok(()),
        }
    }

    // === Error helpers ===

    /// Source text covered by tokens `i1..i2`
    fn span(&self, i1: usize, i2: usize) -> &'a str {
        if i1 >= i2 || i2 > self.tokens.len() {
            return "";
        }
        &self.source[self.tokens[i1].offset..self.tokens[i2 - 1].end()]
    }

    fn error(&self, kind: FormulaErrorKind, i1: usize, i2: usize) -> FormulaError {
        let anchor = i1.min(self.tokens.len().saturating_sub(1));
        match self.tokens.get(anchor) {
            Some(token) => {
                FormulaError::new(kind, self.span(i1, i2), token.file.as_ref(), token.line)
            }
            None => FormulaError::new(kind, self.source, self.origin.0.as_ref(), self.origin.1),
        }
    }

    fn error_at(&self, kind: FormulaErrorKind, i: usize) -> FormulaError {
        self.error(kind, i, i + 1)
    }

    // === Structure helpers ===

    fn kind(&self, i: usize) -> Option<TokenKind> {
        self.tokens.get(i).map(|t| t.kind)
    }

    /// Bracket depth change caused by token `i`
    fn depth_delta(&self, i: usize) -> i32 {
        match self.tokens[i].kind {
            TokenKind::LParens | TokenKind::LSquare => 1,
            TokenKind::RParens | TokenKind::RSquare => -1,
            _ => 0,
        }
    }

    /// Index of the bracket closing the one opened at `open`
    fn matching_close(&self, open: usize, i2: usize) -> Option<usize> {
        let mut depth = 0;
        for i in open..i2 {
            depth += self.depth_delta(i);
            if depth == 0 {
                return Some(i);
            }
        }
        None
    }

    /// Index of the bracket opening the one closed at `close`
    fn matching_open(&self, i1: usize, close: usize) -> Option<usize> {
        let mut depth = 0;
        for i in (i1..=close).rev() {
            depth += self.depth_delta(i);
            if depth == 0 {
                return Some(i);
            }
        }
        None
    }

    /// Positions of top-level tokens of `kind` within `i1..i2`
    fn top_level(&self, i1: usize, i2: usize, kind: TokenKind) -> Vec<usize> {
        let mut depth = 0;
        let mut found = Vec::new();
        for i in i1..i2 {
            if depth == 0 && self.tokens[i].kind == kind {
                found.push(i);
            }
            depth += self.depth_delta(i);
        }
        found
    }

    /// Split `i1..i2` into comma separated sub-ranges
    fn split_commas(&self, i1: usize, i2: usize) -> Vec<(usize, usize)> {
        let mut ranges = Vec::new();
        let mut start = i1;
        for comma in self.top_level(i1, i2, TokenKind::Comma) {
            ranges.push((start, comma));
            start = comma + 1;
        }
        ranges.push((start, i2));
        ranges
    }

    // === Expressions ===

    /// Parse tokens `i1..i2`, attributing failures to this range's source
    fn parse_expression(&mut self, i1: usize, i2: usize) -> FormulaResult<Expression> {
        if self.depth >= self.max_nesting {
            return Err(self.error(FormulaErrorKind::NestingTooDeep(self.max_nesting), i1, i2));
        }
        self.depth += 1;
        let result = self.parse_range(i1, i2);
        self.depth -= 1;

        result.map_err(|mut e| {
            if i1 < i2 {
                let token = &self.tokens[i1];
                e.formula = self.span(i1, i2).to_string();
                e.filename = token.file.to_string();
                e.line = token.line;
            }
            e
        })
    }

    fn parse_range(&mut self, i1: usize, i2: usize) -> FormulaResult<Expression> {
        if i1 >= i2 {
            return Err(self.error(FormulaErrorKind::EmptyExpression, i1, i2));
        }

        if self.tokens[i1].is_keyword("def") {
            return self.parse_definition(i1, i2);
        }

        match self.find_operator(i1, i2) {
            Some(op) => self.parse_operator(i1, op, i2),
            None => self.parse_operand(i1, i2),
        }
    }

    /// The loosest-binding operator outside brackets in `i1..i2`
    ///
    /// Equal precedence resolves to the rightmost operator (left
    /// associativity), except for `^` which resolves to the leftmost.
    /// Operators directly after another operator are unary and skipped.
    fn find_operator(&self, i1: usize, i2: usize) -> Option<usize> {
        let mut depth = 0;
        let mut best: Option<(usize, u8)> = None;

        for i in i1..i2 {
            let token = &self.tokens[i];
            if depth == 0 && is_operator(token) {
                let unary_position = i > i1 && is_operator(&self.tokens[i - 1]);
                if let (false, Some(prec)) = (unary_position, precedence(token.text)) {
                    let better = match best {
                        None => true,
                        Some((_, best_prec)) if prec < best_prec => true,
                        Some((_, best_prec)) => {
                            prec == best_prec && !is_right_associative(token.text)
                        }
                    };
                    if better {
                        best = Some((i, prec));
                    }
                }
            }
            depth += self.depth_delta(i);
        }

        best.map(|(i, _)| i)
    }

    fn parse_operator(&mut self, i1: usize, op: usize, i2: usize) -> FormulaResult<Expression> {
        let symbol = self.tokens[op].text;

        if op == i1 {
            let op = match symbol {
                "-" => UnaryOperator::Negate,
                "not" => UnaryOperator::Not,
                _ => {
                    return Err(
                        self.error(FormulaErrorKind::UnexpectedOperator(symbol.to_string()), i1, i2)
                    )
                }
            };
            let operand = self.parse_expression(i1 + 1, i2)?;
            return Ok(Expression::Unary {
                op,
                operand: Box::new(operand),
            });
        }

        match symbol {
            "where" => self.parse_where(i1, op, i2),
            "." => Ok(Expression::Dot {
                left: Box::new(self.parse_expression(i1, op)?),
                right: Box::new(self.parse_expression(op + 1, i2)?),
            }),
            _ => {
                let binary = BinaryOperator::from_symbol(symbol).ok_or_else(|| {
                    self.error(FormulaErrorKind::UnexpectedOperator(symbol.to_string()), op, op + 1)
                })?;
                Ok(Expression::Binary {
                    op: binary,
                    left: Box::new(self.parse_expression(i1, op)?),
                    right: Box::new(self.parse_expression(op + 1, i2)?),
                })
            }
        }
    }

    /// `body where name = value, ...`
    fn parse_where(&mut self, i1: usize, op: usize, i2: usize) -> FormulaResult<Expression> {
        let body = self.parse_expression(i1, op)?;
        let mut clauses: Vec<WhereClause> = Vec::new();

        for (c1, c2) in self.split_commas(op + 1, i2) {
            let named = c2 > c1 + 1
                && self.kind(c1) == Some(TokenKind::Identifier)
                && self.tokens[c1 + 1].kind == TokenKind::Operator
                && self.tokens[c1 + 1].text == "=";
            if !named {
                return Err(self.error(FormulaErrorKind::MissingWhereName, c1, c2));
            }

            let name = self.tokens[c1].text.to_string();
            if clauses.iter().any(|c| c.name == name) {
                return Err(self.error(FormulaErrorKind::DuplicateWhereName(name), c1, c2));
            }
            let value = self.parse_expression(c1 + 2, c2)?;
            clauses.push(WhereClause { name, value });
        }

        Ok(Expression::Where {
            body: Box::new(body),
            clauses,
        })
    }

    /// `def name(args) body; rest`
    fn parse_definition(&mut self, i1: usize, i2: usize) -> FormulaResult<Expression> {
        let invalid = |parser: &Self, message: &str| {
            parser.error(
                FormulaErrorKind::InvalidDefinition(message.to_string()),
                i1,
                i2,
            )
        };

        if self.kind(i1 + 1) != Some(TokenKind::Identifier) || i1 + 1 >= i2 {
            return Err(invalid(self, "expected a function name after 'def'"));
        }
        let name = self.tokens[i1 + 1].text.to_string();

        if self.kind(i1 + 2) != Some(TokenKind::LParens) || i1 + 2 >= i2 {
            return Err(invalid(self, "expected '(' after the function name"));
        }
        let close = self
            .matching_close(i1 + 2, i2)
            .ok_or_else(|| self.error(FormulaErrorKind::MismatchedBrackets, i1, i2))?;

        let mut args = Vec::new();
        if close > i1 + 3 {
            for (a1, a2) in self.split_commas(i1 + 3, close) {
                if a2 != a1 + 1 || self.tokens[a1].kind != TokenKind::Identifier {
                    return Err(invalid(self, "arguments must be plain names"));
                }
                args.push(self.tokens[a1].text.to_string());
            }
        }

        let end = self
            .top_level(close + 1, i2, TokenKind::Semicolon)
            .first()
            .copied()
            .ok_or_else(|| self.error(FormulaErrorKind::UnterminatedDefinition, i1, i2))?;

        self.defining.push(name.clone());
        let body = self.parse_expression(close + 1, end);
        self.defining.pop();

        self.symbols.add_function(UserFunction {
            name,
            args,
            body: body?,
            precondition: None,
        });

        if end + 1 == i2 {
            Ok(Expression::FunctionList)
        } else {
            self.parse_expression(end + 1, i2)
        }
    }

    /// A range with no top-level operator
    fn parse_operand(&mut self, i1: usize, i2: usize) -> FormulaResult<Expression> {
        let last = i2 - 1;

        match self.tokens[last].kind {
            TokenKind::RParens => {
                let open = self
                    .matching_open(i1, last)
                    .ok_or_else(|| self.error(FormulaErrorKind::MismatchedBrackets, i1, i2))?;
                if open == i1 {
                    return self.parse_expression(i1 + 1, last);
                }
                if open == i1 + 1 && self.tokens[i1].kind == TokenKind::Identifier {
                    return self.parse_call(i1, i2);
                }
                Err(self.error(
                    FormulaErrorKind::UnexpectedToken(self.span(i1, open).to_string()),
                    i1,
                    i2,
                ))
            }
            TokenKind::RSquare => {
                let open = self
                    .matching_open(i1, last)
                    .ok_or_else(|| self.error(FormulaErrorKind::MismatchedBrackets, i1, i2))?;
                if open == i1 {
                    return self.parse_collection(i1, i2);
                }
                Ok(Expression::Index {
                    left: Box::new(self.parse_expression(i1, open)?),
                    key: Box::new(self.parse_expression(open + 1, last)?),
                })
            }
            _ if i2 - i1 == 1 => self.parse_token(i1),
            _ => Err(self.error(
                FormulaErrorKind::UnexpectedToken(self.tokens[i1 + 1].text.to_string()),
                i1,
                i2,
            )),
        }
    }

    /// `name(args...)`
    fn parse_call(&mut self, i1: usize, i2: usize) -> FormulaResult<Expression> {
        let name = self.tokens[i1].text.to_string();
        let (a1, a2) = (i1 + 2, i2 - 1);

        let mut args = Vec::new();
        if a2 > a1 {
            for (r1, r2) in self.split_commas(a1, a2) {
                args.push(self.parse_expression(r1, r2)?);
            }
        }

        if self.symbols.contains(&name) || self.defining.contains(&name) {
            return Ok(Expression::FunctionCall { name, args });
        }

        if name == "null" && args.is_empty() {
            return Ok(Expression::Null);
        }

        match builtins().get(&name) {
            Some(def) if def.accepts(args.len()) => Ok(Expression::FunctionCall { name, args }),
            Some(def) => Err(self.error(
                FormulaErrorKind::ArgumentCount {
                    function: name,
                    expected: def.arity(),
                    actual: args.len(),
                },
                i1,
                i2,
            )),
            None => Err(self.error(FormulaErrorKind::UnknownFunction(name), i1, i2)),
        }
    }

    /// `[a, b]`, `[k -> v]` or `[->]`
    fn parse_collection(&mut self, i1: usize, i2: usize) -> FormulaResult<Expression> {
        let (c1, c2) = (i1 + 1, i2 - 1);
        if c1 == c2 {
            return Ok(Expression::List(Vec::new()));
        }
        if c2 == c1 + 1 && self.tokens[c1].kind == TokenKind::Pointer {
            return Ok(Expression::Map(Vec::new()));
        }

        let mut items = Vec::new();
        let mut entries = Vec::new();
        for (r1, r2) in self.split_commas(c1, c2) {
            match self.top_level(r1, r2, TokenKind::Pointer).first() {
                Some(&arrow) => {
                    let key = self.parse_expression(r1, arrow)?;
                    let value = self.parse_expression(arrow + 1, r2)?;
                    entries.push((key, value));
                }
                None => items.push(self.parse_expression(r1, r2)?),
            }
            if !items.is_empty() && !entries.is_empty() {
                return Err(self.error(FormulaErrorKind::MixedListAndMap, i1, i2));
            }
        }

        if entries.is_empty() {
            Ok(Expression::List(items))
        } else {
            Ok(Expression::Map(entries))
        }
    }

    /// A single-token leaf
    fn parse_token(&mut self, i: usize) -> FormulaResult<Expression> {
        let token = &self.tokens[i];
        match token.kind {
            TokenKind::Identifier => Ok(Expression::Identifier(token.text.to_string())),
            TokenKind::Integer => token.text.parse().map(Expression::Integer).map_err(|_| {
                self.error_at(FormulaErrorKind::InvalidNumber(token.text.to_string()), i)
            }),
            TokenKind::Decimal => parse_decimal(token.text).map(Expression::Decimal).ok_or_else(
                || self.error_at(FormulaErrorKind::InvalidNumber(token.text.to_string()), i),
            ),
            TokenKind::StringLiteral => self.parse_string(i),
            TokenKind::Keyword if token.text == "functions" => Ok(Expression::FunctionList),
            _ => Err(self.error_at(FormulaErrorKind::UnexpectedToken(token.text.to_string()), i)),
        }
    }

    /// Split a string literal into text and `[...]` substitutions
    fn parse_string(&mut self, i: usize) -> FormulaResult<Expression> {
        let token = self.tokens[i].clone();
        let raw = unquote(token.text);
        let raw_offset = token.offset + 1;

        let mut pieces = Vec::new();
        let mut text = String::new();
        let mut pos = 0;

        while let Some(found) = raw[pos..].find('[') {
            let open = pos + found;
            text.push_str(&raw[pos..open]);

            let rest = &raw[open..];
            let escape = if rest.starts_with("[(]") {
                Some('[')
            } else if rest.starts_with("[)]") {
                Some(']')
            } else if rest.starts_with("[']") {
                Some('\'')
            } else {
                None
            };
            if let Some(c) = escape {
                text.push(c);
                pos = open + 3;
                continue;
            }

            let close = matching_square(raw, open)
                .ok_or_else(|| self.error_at(FormulaErrorKind::UnterminatedSubstitution, i))?;
            if !text.is_empty() {
                pieces.push(StringPiece::Text(std::mem::take(&mut text)));
            }

            let inner = &raw[open + 1..close];
            let inner_offset = raw_offset + open + 1;
            let line = token.line + self.source[token.offset..inner_offset].matches('\n').count();
            let expr = self.parse_substitution(inner, token.file.clone(), line)?;
            pieces.push(StringPiece::Formula(Box::new(expr)));
            pos = close + 1;
        }
        text.push_str(&raw[pos..]);
        if !text.is_empty() {
            pieces.push(StringPiece::Text(text));
        }

        Ok(Expression::String(StringLiteral {
            raw: raw.to_string(),
            pieces,
        }))
    }

    /// Compile the formula inside a string substitution
    fn parse_substitution(
        &mut self,
        inner: &str,
        file: Rc<str>,
        line: usize,
    ) -> FormulaResult<Expression> {
        let (tokens, _) = scan(inner, file.clone(), line)?;
        let mut nested = Parser::new(inner, tokens, &mut *self.symbols);
        nested.defining = self.defining.clone();
        nested.origin = (file, line);
        nested.depth = self.depth;
        nested.max_nesting = self.max_nesting;
        nested.parse_all()
    }
}

/// Byte index of the `]` closing the `[` at `open`
fn matching_square(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text[open..].char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a decimal literal into its scaled value
///
/// Only the first three fractional digits are kept; shorter fractions are
/// padded, so `2.5` is 2500.
fn parse_decimal(text: &str) -> Option<i64> {
    let (whole, frac) = text.split_once('.')?;
    let whole: i64 = whole.parse().ok()?;
    let mut digits: String = frac.chars().take(3).collect();
    while digits.len() < 3 {
        digits.push('0');
    }
    let frac: i64 = digits.parse().ok()?;
    whole.checked_mul(DECIMAL_SCALE)?.checked_add(frac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Expression {
        let mut symbols = FunctionSymbolTable::new();
        compile(source, &FormulaOptions::default(), &mut symbols)
            .unwrap()
            .expression
    }

    fn parse_err(source: &str) -> FormulaError {
        let mut symbols = FunctionSymbolTable::new();
        compile(source, &FormulaOptions::default(), &mut symbols).unwrap_err()
    }

    fn render(source: &str) -> String {
        parse(source).to_string()
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse("42"), Expression::Integer(42));
        assert_eq!(parse("3.14"), Expression::Decimal(3140));
        assert_eq!(parse("0.5"), Expression::Decimal(500));
        assert_eq!(parse("1.23456"), Expression::Decimal(1234));
        assert_eq!(parse("null()"), Expression::Null);
        assert_eq!(parse("functions"), Expression::FunctionList);
        assert_eq!(parse("hitpoints"), Expression::Identifier("hitpoints".into()));
    }

    #[test]
    fn test_parse_precedence() {
        assert_eq!(render("1 + 2 * 3"), "(1 + (2 * 3))");
        assert_eq!(render("(1 + 2) * 3"), "((1 + 2) * 3)");
        assert_eq!(render("a or b and c"), "(a or (b and c))");
        assert_eq!(render("a = b + 1"), "(a = (b + 1))");
        assert_eq!(render("1 ~ 2 + 3"), "(1 ~ (2 + 3))");
        assert_eq!(render("a * b % c"), "(a * (b % c))");
        assert_eq!(render("2 ^ 3d6"), "(2 ^ (3 d 6))");
        assert_eq!(render("u.x + 1"), "((u . x) + 1)");
    }

    #[test]
    fn test_parse_associativity() {
        assert_eq!(render("10 - 4 - 3"), "((10 - 4) - 3)");
        assert_eq!(render("a < b = c"), "((a < b) = c)");
        assert_eq!(render("2 ^ 3 ^ 2"), "(2 ^ (3 ^ 2))");
        assert_eq!(render("a.b.c"), "((a . b) . c)");
    }

    #[test]
    fn test_parse_unary() {
        assert_eq!(render("-5"), "(-5)");
        assert_eq!(render("-2 + 3"), "((-2) + 3)");
        assert_eq!(render("2 * -3"), "(2 * (-3))");
        assert_eq!(render("not a and b"), "(not (a and b))");
        assert_eq!(render("a and not b"), "(a and (not b))");
        assert!(matches!(
            parse_err("* 2").kind,
            FormulaErrorKind::UnexpectedOperator(_)
        ));
    }

    #[test]
    fn test_parse_collections() {
        assert_eq!(render("[1, 2, 3]"), "[1, 2, 3]");
        assert_eq!(render("[]"), "[]");
        assert_eq!(render("[->]"), "[->]");
        assert_eq!(render("['a' -> 1, 'b' -> [2]]"), "['a' -> 1, 'b' -> [2]]");
        assert_eq!(render("[1, 2][0]"), "[1, 2][0]");
        assert_eq!(render("m['k']"), "m['k']");
        assert_eq!(render("head(x)[1 + 1]"), "head(x)[(1 + 1)]");
        assert_eq!(
            parse_err("[1, 'a' -> 2]").kind,
            FormulaErrorKind::MixedListAndMap
        );
    }

    #[test]
    fn test_parse_calls() {
        assert_eq!(render("max(1, a + 2)"), "max(1, (a + 2))");
        assert_eq!(render("if(a, b)"), "if(a, b)");
        assert_eq!(
            parse_err("frobnicate(1)").kind,
            FormulaErrorKind::UnknownFunction("frobnicate".into())
        );
        assert_eq!(
            parse_err("abs(1, 2)").kind,
            FormulaErrorKind::ArgumentCount {
                function: "abs".into(),
                expected: "1".into(),
                actual: 2
            }
        );
    }

    #[test]
    fn test_parse_where() {
        assert_eq!(
            render("x * 5 where x = 1"),
            "{where:((x * 5)) {x=1}}"
        );
        assert_eq!(
            render("a + b where a = 1, b = max(2, 3) where c = 0"),
            "{where:({where:((a + b)) {a=1, b=max(2, 3)}}) {c=0}}"
        );
        assert_eq!(parse_err("x where 1").kind, FormulaErrorKind::MissingWhereName);
        assert_eq!(
            parse_err("x where a = 1, a = 2").kind,
            FormulaErrorKind::DuplicateWhereName("a".into())
        );
    }

    #[test]
    fn test_parse_definition() {
        let mut symbols = FunctionSymbolTable::new();
        let compiled = compile(
            "def twice(x) x * 2; twice(4)",
            &FormulaOptions::default(),
            &mut symbols,
        )
        .unwrap();
        assert_eq!(compiled.expression.to_string(), "twice(4)");
        let twice = symbols.get("twice").unwrap();
        assert_eq!(twice.args, vec!["x".to_string()]);
        assert_eq!(twice.body.to_string(), "(x * 2)");
    }

    #[test]
    fn test_parse_nesting_limit() {
        let options = FormulaOptions {
            max_nesting: 5,
            ..Default::default()
        };
        let mut symbols = FunctionSymbolTable::new();
        let compiled = compile("((((1))))", &options, &mut symbols).unwrap();
        assert_eq!(compiled.expression, Expression::Integer(1));

        let err = compile("(((((1)))))", &options, &mut symbols).unwrap_err();
        assert_eq!(err.kind, FormulaErrorKind::NestingTooDeep(5));
        assert_eq!(err.formula, "(((((1)))))");

        // Substitutions count toward the same limit
        let err = compile("'[((((1))))]'", &options, &mut symbols).unwrap_err();
        assert_eq!(err.kind, FormulaErrorKind::NestingTooDeep(5));
    }

    #[test]
    fn test_parse_definition_only() {
        let mut symbols = FunctionSymbolTable::new();
        let compiled = compile(
            "def f(a, b) a + b;\ndef g() f(1, 2);",
            &FormulaOptions::default(),
            &mut symbols,
        )
        .unwrap();
        assert_eq!(compiled.expression, Expression::FunctionList);
        assert_eq!(
            symbols.function_names(),
            vec!["f".to_string(), "g".to_string()]
        );
    }

    #[test]
    fn test_parse_definition_errors() {
        assert_eq!(
            parse_err("def f(x) x * 2").kind,
            FormulaErrorKind::UnterminatedDefinition
        );
        assert!(matches!(
            parse_err("def (x) x;").kind,
            FormulaErrorKind::InvalidDefinition(_)
        ));
        assert!(matches!(
            parse_err("def f(1) 1;").kind,
            FormulaErrorKind::InvalidDefinition(_)
        ));
    }

    #[test]
    fn test_parse_string_pieces() {
        let expr = parse("'hp: [hitpoints]/[max_hitpoints]'");
        let literal = match expr {
            Expression::String(literal) => literal,
            other => panic!("expected a string, got {:?}", other),
        };
        assert_eq!(literal.raw, "hp: [hitpoints]/[max_hitpoints]");
        assert_eq!(
            literal.pieces,
            vec![
                StringPiece::Text("hp: ".into()),
                StringPiece::Formula(Box::new(Expression::Identifier("hitpoints".into()))),
                StringPiece::Text("/".into()),
                StringPiece::Formula(Box::new(Expression::Identifier("max_hitpoints".into()))),
            ]
        );
    }

    #[test]
    fn test_parse_string_escapes() {
        let expr = parse("'[(]x[)] it[']s'");
        let literal = match expr {
            Expression::String(literal) => literal,
            other => panic!("expected a string, got {:?}", other),
        };
        assert_eq!(literal.pieces, vec![StringPiece::Text("[x] it's".into())]);
        assert_eq!(render("'[(]x[)]'"), "'[(]x[)]'");
    }

    #[test]
    fn test_parse_string_substitution_errors() {
        assert_eq!(
            parse_err("'open [x'").kind,
            FormulaErrorKind::UnterminatedSubstitution
        );
        assert_eq!(
            parse_err("'[nope(1)]'").kind,
            FormulaErrorKind::UnknownFunction("nope".into())
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_err("").kind, FormulaErrorKind::EmptyExpression);
        assert_eq!(parse_err("1 +").kind, FormulaErrorKind::EmptyExpression);
        assert_eq!(parse_err("(1 + 2").kind, FormulaErrorKind::MismatchedBrackets);
        assert_eq!(parse_err("[1)").kind, FormulaErrorKind::MismatchedBrackets);
        assert_eq!(parse_err("1 2").kind, FormulaErrorKind::UnexpectedToken("2".into()));
        assert!(matches!(parse_err("1 $ 2").kind, FormulaErrorKind::Token(_)));
    }

    #[test]
    fn test_error_carries_outermost_span() {
        let err = parse_err("1 + (2 * foo(3))");
        assert_eq!(err.kind, FormulaErrorKind::UnknownFunction("foo".into()));
        assert_eq!(err.formula, "1 + (2 * foo(3))");
        assert_eq!(err.filename, "formula");
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_token_error_reports_source_line() {
        let err = parse_err("1 +\n2 $ 3\n+ 4");
        assert_eq!(err.formula, "2 $ 3");
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_inclusion_markers() {
        let mut symbols = FunctionSymbolTable::new();
        let source = "fai 'ai/utils.fai'\ndef inc(x) x + 1;\nfaiend\ninc(1)";
        let compiled = compile(source, &FormulaOptions::default(), &mut symbols).unwrap();
        assert_eq!(compiled.expression.to_string(), "inc(1)");
        assert_eq!(compiled.files.len(), 1);
        assert_eq!(compiled.files[0].as_ref(), "ai/utils.fai");
    }

    #[test]
    fn test_inclusion_errors_are_attributed_to_region() {
        let err = parse_err("wfl 'lib.wfl'\n1 +\n(2 * frob(3))\nwflend");
        assert_eq!(err.filename, "lib.wfl");
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_inclusion_marker_errors() {
        assert_eq!(
            parse_err("fai 'a'\n1\nfaiend\nfai 'a'\n2\nfaiend").kind,
            FormulaErrorKind::DuplicateInclusion("a".into())
        );
        assert_eq!(
            parse_err("fai 'a'\n1").kind,
            FormulaErrorKind::UnterminatedInclusion("a".into())
        );
        assert_eq!(
            parse_err("1\nwflend").kind,
            FormulaErrorKind::UnmatchedInclusionEnd
        );
        assert_eq!(
            parse_err("fai 1").kind,
            FormulaErrorKind::InvalidInclusion("fai".into())
        );
    }

    #[test]
    fn test_options_seed_diagnostics() {
        let mut symbols = FunctionSymbolTable::new();
        let options = FormulaOptions {
            filename: "units.cfg".into(),
            first_line: 40,
            ..Default::default()
        };
        let err = compile("1 +\n", &options, &mut symbols).unwrap_err();
        assert_eq!(err.filename, "units.cfg");
        assert_eq!(err.line, 40);
    }

    #[test]
    fn test_parse_decimal_helper() {
        assert_eq!(parse_decimal("2.5"), Some(2500));
        assert_eq!(parse_decimal("0.001"), Some(1));
        assert_eq!(parse_decimal("10.9999"), Some(10999));
        assert_eq!(parse_decimal("12"), None);
    }
}
