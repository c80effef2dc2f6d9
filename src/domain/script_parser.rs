//! Script parser.
//!
//! Recursive descent over the source text, producing a [`Program`]. Errors
//! carry the byte offset of the offending token so callers can render them
//! with [`ParseError::display_with_context`].
//!
//! Statements end at a newline or `;`. Inside parentheses, brackets and
//! braces newlines are plain whitespace, so long calls may span lines.

use crate::domain::error::ParseError;
use crate::domain::script_ast::{
    Arg, BinaryOp, Call, DeclKind, Expr, Program, ReturnValue, Stmt, UnaryOp,
};

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "var", "const", "return", "true", "false",
];

/// Type annotations accepted (and ignored) in front of declared names.
const TYPE_NAMES: &[&str] = &["int", "float", "bool", "string", "color"];

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.remaining().chars().nth(1)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn error(&self, message: impl Into<String>, position: usize) -> ParseError {
        ParseError {
            message: message.into(),
            position,
        }
    }

    fn skip_comment(&mut self) -> bool {
        if self.remaining().starts_with("//") {
            while let Some(ch) = self.peek() {
                if ch == '\n' {
                    break;
                }
                self.advance();
            }
            true
        } else {
            false
        }
    }

    /// Skips spaces and comments, and newlines while nested.
    fn skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                Some('\n') if self.depth > 0 => {
                    self.advance();
                }
                Some(ch) if ch != '\n' && ch.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.skip_comment() => {}
                _ => break,
            }
        }
    }

    /// Skips blank lines, comments and stray `;` between statements.
    fn skip_separators(&mut self) {
        loop {
            match self.peek() {
                Some(ch) if ch.is_whitespace() || ch == ';' => {
                    self.advance();
                }
                Some('/') if self.skip_comment() => {}
                _ => break,
            }
        }
    }

    fn found(&self) -> String {
        match self.peek() {
            Some(ch) if is_ident_start(ch) => format!("'{}'", self.peek_word()),
            Some('\n') => "end of line".to_string(),
            Some(ch) => format!("'{}'", ch),
            None => "end of input".to_string(),
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.peek() == Some(expected) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(
                format!("expected '{}', found {}", expected, self.found()),
                self.pos,
            ))
        }
    }

    fn open(&mut self, ch: char) -> Result<(), ParseError> {
        self.expect_char(ch)?;
        self.depth += 1;
        Ok(())
    }

    fn close(&mut self, ch: char) -> Result<(), ParseError> {
        self.expect_char(ch)?;
        self.depth -= 1;
        Ok(())
    }

    /// Consumes `s` unless it is immediately followed by a char in `not_before`.
    fn consume_op(&mut self, s: &str, not_before: &[char]) -> bool {
        self.skip_whitespace();
        let rest = self.remaining();
        if !rest.starts_with(s) {
            return false;
        }
        if rest[s.len()..]
            .chars()
            .next()
            .is_some_and(|c| not_before.contains(&c))
        {
            return false;
        }
        self.pos += s.len();
        true
    }

    fn peek_word(&self) -> String {
        self.remaining()
            .chars()
            .take_while(|&c| is_ident_char(c))
            .collect()
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        self.peek_word() == keyword
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();
        if self.peek_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    /// A plain identifier, no dots.
    fn parse_ident(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        if !self.peek().is_some_and(is_ident_start) {
            return Err(self.error(format!("expected name, found {}", self.found()), start));
        }
        let word = self.peek_word();
        if KEYWORDS.contains(&word.as_str()) {
            return Err(self.error(format!("'{}' is a reserved word", word), start));
        }
        self.pos += word.len();
        Ok(word)
    }

    /// An identifier with optional `.member` parts, such as `ta.sma`.
    fn parse_dotted(&mut self) -> Result<String, ParseError> {
        let mut name = self.parse_ident()?;
        while self.peek() == Some('.') && self.peek_second().is_some_and(is_ident_start) {
            self.advance();
            name.push('.');
            name.push_str(&self.peek_word());
            self.pos += self.peek_word().len();
        }
        Ok(name)
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(self.error("expected number", start));
        }

        if matches!(self.peek(), Some('e' | 'E')) {
            let save = self.pos;
            self.advance();
            if matches!(self.peek(), Some('+' | '-')) {
                self.advance();
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            } else {
                self.pos = save;
            }
        }

        let num_str = &self.input[start..self.pos];
        num_str
            .parse::<f64>()
            .map_err(|_| self.error(format!("invalid number: {}", num_str), start))
    }

    fn parse_string(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let quote = match self.advance() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error("expected string", start)),
        };
        let mut out = String::new();
        loop {
            match self.advance() {
                Some('\\') => match self.advance() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(ch) => out.push(ch),
                    None => break,
                },
                Some(ch) if ch == quote => return Ok(out),
                Some('\n') | None => break,
                Some(ch) => out.push(ch),
            }
        }
        Err(self.error("unterminated string", start))
    }

    fn parse_args(&mut self) -> Result<Vec<Arg>, ParseError> {
        self.open('(')?;
        let mut args = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(')') {
                break;
            }
            let position = self.pos;
            let save = self.pos;
            let mut name = None;
            if self.peek().is_some_and(is_ident_start) {
                let word = self.peek_word();
                if !KEYWORDS.contains(&word.as_str()) {
                    self.pos += word.len();
                    if self.consume_op("=", &['=']) {
                        name = Some(word);
                    } else {
                        self.pos = save;
                    }
                }
            }
            let value = self.parse_expr()?;
            args.push(Arg {
                name,
                value,
                position,
            });
            self.skip_whitespace();
            if self.peek() == Some(',') {
                self.advance();
            } else {
                break;
            }
        }
        self.close(')')?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();
        let position = self.pos;
        match self.peek() {
            Some(ch) if ch.is_ascii_digit() || ch == '.' => Ok(Expr::Number(self.parse_number()?)),
            Some('"' | '\'') => Ok(Expr::Str(self.parse_string()?)),
            Some('(') => {
                self.open('(')?;
                let expr = self.parse_expr()?;
                self.close(')')?;
                Ok(expr)
            }
            Some(ch) if is_ident_start(ch) => {
                if self.consume_keyword("true") {
                    return Ok(Expr::Bool(true));
                }
                if self.consume_keyword("false") {
                    return Ok(Expr::Bool(false));
                }
                let name = self.parse_dotted()?;
                if self.peek() == Some('(') {
                    let args = self.parse_args()?;
                    return Ok(Expr::Call(Call {
                        name,
                        args,
                        position,
                    }));
                }
                if name == "na" {
                    return Ok(Expr::Na);
                }
                Ok(Expr::Name { name, position })
            }
            _ => Err(self.error(
                format!("expected expression, found {}", self.found()),
                position,
            )),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            self.skip_whitespace();
            if self.peek() != Some('[') {
                return Ok(expr);
            }
            let position = self.pos;
            self.open('[')?;
            let offset = self.parse_expr()?;
            self.close(']')?;
            expr = Expr::History {
                target: Box::new(expr),
                offset: Box::new(offset),
                position,
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.consume_op("-", &[]) {
            let expr = self.parse_unary()?;
            return Ok(match expr {
                Expr::Number(n) => Expr::Number(-n),
                expr => Expr::Unary {
                    op: UnaryOp::Neg,
                    expr: Box::new(expr),
                },
            });
        }
        if self.consume_op("+", &[]) {
            return self.parse_unary();
        }
        self.parse_postfix()
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.consume_op("*", &['=']) {
                BinaryOp::Mul
            } else if self.consume_op("/", &['/', '=']) {
                BinaryOp::Div
            } else if self.consume_op("%", &['=']) {
                BinaryOp::Mod
            } else {
                return Ok(left);
            };
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.consume_op("+", &['=']) {
                BinaryOp::Add
            } else if self.consume_op("-", &['=']) {
                BinaryOp::Sub
            } else {
                return Ok(left);
            };
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = if self.consume_op("==", &[]) {
                BinaryOp::Eq
            } else if self.consume_op("!=", &[]) {
                BinaryOp::Ne
            } else if self.consume_op("<=", &[]) {
                BinaryOp::Le
            } else if self.consume_op(">=", &[]) {
                BinaryOp::Ge
            } else if self.consume_op("<", &[]) {
                BinaryOp::Lt
            } else if self.consume_op(">", &[]) {
                BinaryOp::Gt
            } else {
                return Ok(left);
            };
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.consume_keyword("not") {
            let expr = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
            });
        }
        self.parse_comparison()
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not()?;
        while self.consume_keyword("and") {
            let right = self.parse_not()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.consume_keyword("or") {
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_or()?;
        if !self.consume_op("?", &[]) {
            return Ok(cond);
        }
        self.depth += 1;
        let then = self.parse_expr()?;
        self.expect_char(':')?;
        self.depth -= 1;
        let otherwise = self.parse_expr()?;
        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_return(&mut self, position: usize) -> Result<Stmt, ParseError> {
        self.skip_whitespace();
        if self.peek() != Some('{') {
            let value = ReturnValue::Single(self.parse_expr()?);
            return Ok(Stmt::Return { value, position });
        }
        self.open('{')?;
        let mut fields: Vec<(String, Expr)> = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                break;
            }
            let key_pos = self.pos;
            let key = match self.peek() {
                Some('"' | '\'') => self.parse_string()?,
                _ => self.parse_ident()?,
            };
            if fields.iter().any(|(k, _)| *k == key) {
                return Err(self.error(format!("duplicate key '{}'", key), key_pos));
            }
            let value = if self.consume_op(":", &['=']) {
                self.parse_expr()?
            } else {
                Expr::Name {
                    name: key.clone(),
                    position: key_pos,
                }
            };
            fields.push((key, value));
            self.skip_whitespace();
            if self.peek() == Some(',') {
                self.advance();
            } else {
                break;
            }
        }
        self.close('}')?;
        Ok(Stmt::Return {
            value: ReturnValue::Named(fields),
            position,
        })
    }

    fn parse_tuple(&mut self, position: usize) -> Result<Stmt, ParseError> {
        self.open('[')?;
        let mut names = vec![self.parse_ident()?];
        while self.consume_op(",", &[]) {
            names.push(self.parse_ident()?);
        }
        self.close(']')?;
        if !self.consume_op("=", &['=']) {
            return Err(self.error(
                format!("expected '=' after tuple, found {}", self.found()),
                self.pos,
            ));
        }
        self.skip_whitespace();
        let call_pos = self.pos;
        match self.parse_expr()? {
            Expr::Call(call) => Ok(Stmt::Tuple {
                names,
                call,
                position,
            }),
            _ => Err(self.error("tuple assignment needs a function call", call_pos)),
        }
    }

    /// Skips a leading type annotation such as `float` in `var float x = 0`.
    fn skip_type_name(&mut self) {
        self.skip_whitespace();
        let word = self.peek_word();
        if !TYPE_NAMES.contains(&word.as_str()) {
            return;
        }
        let save = self.pos;
        self.pos += word.len();
        self.skip_whitespace();
        if !self.peek().is_some_and(is_ident_start) {
            self.pos = save;
        }
    }

    fn parse_decl(&mut self, kind: DeclKind, position: usize) -> Result<Stmt, ParseError> {
        self.skip_type_name();
        let name = self.parse_ident()?;
        if !self.consume_op("=", &['=']) {
            return Err(self.error(
                format!("expected '=' after '{}', found {}", name, self.found()),
                self.pos,
            ));
        }
        let value = self.parse_expr()?;
        Ok(Stmt::Decl {
            kind,
            name,
            value,
            position,
        })
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        self.skip_whitespace();
        let position = self.pos;

        if self.consume_keyword("return") {
            return self.parse_return(position);
        }
        if self.consume_keyword("var") {
            return self.parse_decl(DeclKind::Var, position);
        }
        if self.consume_keyword("const") {
            return self.parse_decl(DeclKind::Const, position);
        }
        if self.peek() == Some('[') {
            return self.parse_tuple(position);
        }

        if self.peek().is_some_and(is_ident_start) {
            self.skip_type_name();
            let word = self.peek_word();
            if !KEYWORDS.contains(&word.as_str()) {
                self.pos += word.len();
                if self.consume_op(":=", &[]) {
                    let value = self.parse_expr()?;
                    return Ok(Stmt::Reassign {
                        name: word,
                        value,
                        position,
                    });
                }
                if self.consume_op("=", &['=']) {
                    let value = self.parse_expr()?;
                    return Ok(Stmt::Decl {
                        kind: DeclKind::Let,
                        name: word,
                        value,
                        position,
                    });
                }
            }
            self.pos = position;
        }

        Ok(Stmt::Expr(self.parse_expr()?))
    }

    fn parse(&mut self) -> Result<Program, ParseError> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            if self.pos >= self.input.len() {
                break;
            }
            statements.push(self.parse_statement()?);
            self.skip_whitespace();
            match self.peek() {
                None | Some('\n' | ';') => {}
                Some(_) => {
                    return Err(self.error(
                        format!("unexpected {} after statement", self.found()),
                        self.pos,
                    ));
                }
            }
        }
        Ok(Program { statements })
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn parse(input: &str) -> Result<Program, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(input: &str) -> Stmt {
        let program = parse(input).unwrap();
        assert_eq!(program.statements.len(), 1, "{:?}", program);
        program.statements.into_iter().next().unwrap()
    }

    fn expr(input: &str) -> Expr {
        match single(input) {
            Stmt::Expr(e) => e,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    fn ident(n: &str, position: usize) -> Expr {
        Expr::Name {
            name: n.to_string(),
            position,
        }
    }

    #[test]
    fn parse_let_declaration() {
        match single("fast = ta.sma(close, 10)") {
            Stmt::Decl {
                kind: DeclKind::Let,
                name,
                value: Expr::Call(call),
                ..
            } => {
                assert_eq!(name, "fast");
                assert_eq!(call.name, "ta.sma");
                assert_eq!(call.args.len(), 2);
                assert_eq!(call.args[0].value, ident("close", 14));
                assert_eq!(call.args[1].value, Expr::Number(10.0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parse_var_with_type_and_reassign() {
        let program = parse("var float count = 0\ncount := count + 1").unwrap();
        assert!(matches!(
            &program.statements[0],
            Stmt::Decl { kind: DeclKind::Var, name, value: Expr::Number(n), .. }
                if name == "count" && *n == 0.0
        ));
        assert!(matches!(
            &program.statements[1],
            Stmt::Reassign { name, value: Expr::Binary { op: BinaryOp::Add, .. }, .. }
                if name == "count"
        ));
    }

    #[test]
    fn parse_const() {
        assert!(matches!(
            single("const len = 14"),
            Stmt::Decl { kind: DeclKind::Const, .. }
        ));
    }

    #[test]
    fn precedence_mul_over_add() {
        assert_eq!(
            expr("1 + 2 * 3"),
            binary(
                BinaryOp::Add,
                Expr::Number(1.0),
                binary(BinaryOp::Mul, Expr::Number(2.0), Expr::Number(3.0))
            )
        );
    }

    #[test]
    fn precedence_and_over_or_and_not_over_comparison() {
        let e = expr("not a > b or c and d");
        match e {
            Expr::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => {
                assert!(matches!(
                    *left,
                    Expr::Unary { op: UnaryOp::Not, ref expr }
                        if matches!(**expr, Expr::Binary { op: BinaryOp::Gt, .. })
                ));
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::And, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn ternary_is_right_associative() {
        match expr("a ? 1 : b ? 2 : 3") {
            Expr::Ternary { otherwise, .. } => {
                assert!(matches!(*otherwise, Expr::Ternary { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn history_reference() {
        assert_eq!(
            expr("close[1]"),
            Expr::History {
                target: Box::new(ident("close", 0)),
                offset: Box::new(Expr::Number(1.0)),
                position: 5,
            }
        );
    }

    #[test]
    fn negative_literal_folds() {
        assert_eq!(expr("-2.5"), Expr::Number(-2.5));
        assert!(matches!(expr("-close"), Expr::Unary { op: UnaryOp::Neg, .. }));
    }

    #[test]
    fn number_with_exponent() {
        assert_eq!(expr("1e3"), Expr::Number(1000.0));
        assert_eq!(expr(".5"), Expr::Number(0.5));
    }

    #[test]
    fn na_literal_and_call() {
        assert_eq!(expr("na"), Expr::Na);
        assert!(matches!(expr("na(close)"), Expr::Call(Call { ref name, .. }) if name == "na"));
    }

    #[test]
    fn named_arguments() {
        match expr("plot(fast, \"fast\", color = color.new(\"#ff0000\", 50), linewidth=2)") {
            Expr::Call(call) => {
                assert_eq!(call.args.len(), 4);
                assert_eq!(call.args[0].name, None);
                assert_eq!(call.args[1].value, Expr::Str("fast".into()));
                assert_eq!(call.args[2].name.as_deref(), Some("color"));
                assert_eq!(call.args[3].name.as_deref(), Some("linewidth"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn equality_argument_is_positional() {
        match expr("f(a == b)") {
            Expr::Call(call) => {
                assert_eq!(call.args[0].name, None);
                assert!(matches!(call.args[0].value, Expr::Binary { op: BinaryOp::Eq, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn tuple_assignment() {
        match single("[st, dir] = ta.supertrend(3, 10)") {
            Stmt::Tuple { names, call, .. } => {
                assert_eq!(names, vec!["st", "dir"]);
                assert_eq!(call.name, "ta.supertrend");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn return_named_with_shorthand() {
        match single("return { fast: a + 1, slow }") {
            Stmt::Return {
                value: ReturnValue::Named(fields),
                ..
            } => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].0, "fast");
                assert_eq!(fields[1].0, "slow");
                assert!(matches!(fields[1].1, Expr::Name { ref name, .. } if name == "slow"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn return_scalar() {
        assert!(matches!(
            single("return close"),
            Stmt::Return {
                value: ReturnValue::Single(_),
                ..
            }
        ));
    }

    #[test]
    fn multiline_call_and_comments() {
        let src = "// header\nx = ta.sma(\n    close, // source\n    10\n)\n\nreturn x // done\n";
        let program = parse(src).unwrap();
        assert_eq!(program.statements.len(), 2);
    }

    #[test]
    fn semicolons_separate_statements() {
        let program = parse("a = 1; b = 2;return a + b").unwrap();
        assert_eq!(program.statements.len(), 3);
    }

    #[test]
    fn empty_source_is_empty_program() {
        assert!(parse("  \n// nothing\n").unwrap().statements.is_empty());
    }

    #[test]
    fn error_on_trailing_tokens() {
        let err = parse("x = 1 2").unwrap_err();
        assert_eq!(err.position, 6);
        assert!(err.message.contains("unexpected"));
    }

    #[test]
    fn error_on_unclosed_call() {
        let err = parse("x = ta.sma(close, 10").unwrap_err();
        assert!(err.message.contains("expected ')'"));
    }

    #[test]
    fn error_on_reserved_name() {
        let err = parse("var and = 1").unwrap_err();
        assert!(err.message.contains("reserved"));
    }

    #[test]
    fn error_on_unterminated_string() {
        let err = parse("plot(close, \"oops)").unwrap_err();
        assert_eq!(err.message, "unterminated string");
        assert_eq!(err.position, 12);
    }

    #[test]
    fn error_on_duplicate_key() {
        let err = parse("return { a: 1, a: 2 }").unwrap_err();
        assert!(err.message.contains("duplicate key"));
    }
}
