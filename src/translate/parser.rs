//! Formula parser
//!
//! Converts tokens into an AST using recursive descent with Tableau's
//! operator precedence (lowest first): OR, AND, NOT, comparison, + -,
//! * / %, ^, unary minus.

use super::tokenizer::{Token, TokenKind, Tokenizer};
use super::TranslateError;
use chrono::NaiveDate;

/// A bracketed field reference, optionally qualified by its data source
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub source: Option<String>,
    pub name: String,
}

impl std::fmt::Display for FieldRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            Some(source) => write!(f, "[{}].[{}]", source, self.name),
            None => write!(f, "[{}]", self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
}

/// Abstract syntax tree for a calculation formula
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(String),
    Text(String),
    Boolean(bool),
    Null,
    Date(NaiveDate),
    Field(FieldRef),
    Negate(Box<Expr>),
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        /// Operator was written with surrounding whitespace
        spaced: bool,
    },
    /// Parenthesized sub-expression, kept to preserve the author's grouping
    Group(Box<Expr>),
    Call {
        name: String,
        args: Vec<Expr>,
    },
    /// IF .. THEN .. ELSEIF .. ELSE .. END
    If {
        branches: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
    /// CASE subject WHEN value THEN result .. ELSE .. END
    Case {
        subject: Box<Expr>,
        arms: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
}

impl Expr {
    /// Every field reference in the expression, in source order
    pub fn references(&self) -> Vec<&FieldRef> {
        let mut refs = Vec::new();
        self.walk(&mut |expr| {
            if let Expr::Field(field) = expr {
                refs.push(field);
            }
        });
        refs
    }

    /// Names of every function called inside the expression, itself included
    pub fn calls(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.walk(&mut |expr| {
            if let Expr::Call { name, .. } = expr {
                names.push(name.as_str());
            }
        });
        names
    }

    /// Pre-order traversal
    fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Negate(inner) | Expr::Not(inner) | Expr::Group(inner) => inner.walk(visit),
            Expr::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::Call { args, .. } => args.iter().for_each(|a| a.walk(visit)),
            Expr::If {
                branches,
                otherwise,
            } => {
                for (condition, result) in branches {
                    condition.walk(visit);
                    result.walk(visit);
                }
                if let Some(other) = otherwise {
                    other.walk(visit);
                }
            }
            Expr::Case {
                subject,
                arms,
                otherwise,
            } => {
                subject.walk(visit);
                for (value, result) in arms {
                    value.walk(visit);
                    result.walk(visit);
                }
                if let Some(other) = otherwise {
                    other.walk(visit);
                }
            }
            Expr::Field(_)
            | Expr::Number(_)
            | Expr::Text(_)
            | Expr::Boolean(_)
            | Expr::Null
            | Expr::Date(_) => {}
        }
    }

    /// The expression with any enclosing parentheses removed
    pub fn ungrouped(&self) -> &Expr {
        match self {
            Expr::Group(inner) => inner.ungrouped(),
            other => other,
        }
    }
}

/// Parse a formula. Blank formulas yield `None`.
pub fn parse_formula(formula: &str) -> Result<Option<Expr>, TranslateError> {
    let tokens = Tokenizer::new(formula).tokenize()?;
    if tokens.is_empty() {
        return Ok(None);
    }
    Parser::new(tokens).parse().map(Some)
}

/// Parser for formula tokens
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// Parse the tokens into an AST
    pub fn parse(mut self) -> Result<Expr, TranslateError> {
        if self.tokens.is_empty() {
            return Err(TranslateError::syntax("empty expression", 0));
        }
        let expr = self.or_expr()?;

        if let Some(token) = self.peek() {
            return Err(TranslateError::syntax(
                format!("unexpected {} after expression", describe(&token.kind)),
                token.position,
            ));
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    /// Position for errors: current token, or end of input
    fn here(&self) -> usize {
        self.peek()
            .map(|t| t.position)
            .or_else(|| self.tokens.last().map(|t| t.position + 1))
            .unwrap_or(0)
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(
            self.peek(),
            Some(Token { kind: TokenKind::Identifier(id), .. }) if id.eq_ignore_ascii_case(keyword)
        )
    }

    fn match_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), TranslateError> {
        if self.match_keyword(keyword) {
            Ok(())
        } else {
            Err(TranslateError::syntax(format!("expected {keyword}"), self.here()))
        }
    }

    fn expect(&mut self, expected: TokenKind) -> Result<(), TranslateError> {
        match self.peek() {
            Some(token) if token.kind == expected => {
                self.position += 1;
                Ok(())
            }
            _ => Err(TranslateError::syntax(
                format!("expected {}", describe(&expected)),
                self.here(),
            )),
        }
    }

    /// If the current token is one of `ops`, consume it and return it with its spacing
    fn match_operator(&mut self, ops: &[&str]) -> Option<(String, bool)> {
        if let Some(Token {
            kind: TokenKind::Operator(op),
            spaced,
            ..
        }) = self.peek()
        {
            if ops.contains(&op.as_str()) {
                let matched = (op.clone(), *spaced);
                self.position += 1;
                return Some(matched);
            }
        }
        None
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr, spaced: bool) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            spaced,
        }
    }

    fn or_expr(&mut self) -> Result<Expr, TranslateError> {
        let mut left = self.and_expr()?;
        while self.match_keyword("OR") {
            let right = self.and_expr()?;
            left = Self::binary(BinaryOp::Or, left, right, true);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, TranslateError> {
        let mut left = self.not_expr()?;
        while self.match_keyword("AND") {
            let right = self.not_expr()?;
            left = Self::binary(BinaryOp::And, left, right, true);
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, TranslateError> {
        if self.match_keyword("NOT") {
            let operand = self.not_expr()?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, TranslateError> {
        let mut left = self.additive()?;
        while let Some((op, spaced)) =
            self.match_operator(&["=", "==", "!=", "<>", "<", "<=", ">", ">="])
        {
            let op = match op.as_str() {
                "=" | "==" => BinaryOp::Equal,
                "!=" | "<>" => BinaryOp::NotEqual,
                "<" => BinaryOp::Less,
                "<=" => BinaryOp::LessEqual,
                ">" => BinaryOp::Greater,
                _ => BinaryOp::GreaterEqual,
            };
            let right = self.additive()?;
            left = Self::binary(op, left, right, spaced);
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, TranslateError> {
        let mut left = self.multiplicative()?;
        while let Some((op, spaced)) = self.match_operator(&["+", "-"]) {
            let op = if op == "+" {
                BinaryOp::Add
            } else {
                BinaryOp::Subtract
            };
            let right = self.multiplicative()?;
            left = Self::binary(op, left, right, spaced);
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, TranslateError> {
        let mut left = self.power()?;
        while let Some((op, spaced)) = self.match_operator(&["*", "/", "%"]) {
            let op = match op.as_str() {
                "*" => BinaryOp::Multiply,
                "/" => BinaryOp::Divide,
                _ => BinaryOp::Modulo,
            };
            let right = self.power()?;
            left = Self::binary(op, left, right, spaced);
        }
        Ok(left)
    }

    fn power(&mut self) -> Result<Expr, TranslateError> {
        let mut left = self.unary()?;
        while let Some((_, spaced)) = self.match_operator(&["^"]) {
            let right = self.unary()?;
            left = Self::binary(BinaryOp::Power, left, right, spaced);
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, TranslateError> {
        if self.match_operator(&["-"]).is_some() {
            let operand = self.unary()?;
            return Ok(Expr::Negate(Box::new(operand)));
        }
        if self.match_operator(&["+"]).is_some() {
            return self.unary();
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, TranslateError> {
        let position = self.here();
        let token = self
            .advance()
            .ok_or_else(|| TranslateError::syntax("unexpected end of formula", position))?;

        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Text(s) => Ok(Expr::Text(s)),
            TokenKind::Date(d) => parse_date(&d),
            TokenKind::Field { source, name } => Ok(Expr::Field(FieldRef { source, name })),
            TokenKind::OpenParen => {
                let inner = self.or_expr()?;
                self.expect(TokenKind::CloseParen)?;
                Ok(Expr::Group(Box::new(inner)))
            }
            TokenKind::OpenBrace => Err(self.level_of_detail()),
            TokenKind::Identifier(ident) => self.identifier(ident, token.position),
            other => Err(TranslateError::syntax(
                format!("unexpected {}", describe(&other)),
                token.position,
            )),
        }
    }

    fn identifier(&mut self, ident: String, position: usize) -> Result<Expr, TranslateError> {
        let upper = ident.to_ascii_uppercase();
        match upper.as_str() {
            "IF" => return self.if_expr(),
            "CASE" => return self.case_expr(),
            "TRUE" => return Ok(Expr::Boolean(true)),
            "FALSE" => return Ok(Expr::Boolean(false)),
            "NULL" => return Ok(Expr::Null),
            _ => {}
        }

        if matches!(self.peek(), Some(Token { kind: TokenKind::OpenParen, .. })) {
            self.position += 1;
            let args = self.arguments()?;
            return Ok(Expr::Call { name: upper, args });
        }

        Err(TranslateError::syntax(
            format!("unexpected identifier '{ident}'"),
            position,
        ))
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, TranslateError> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token { kind: TokenKind::CloseParen, .. })) {
            self.position += 1;
            return Ok(args);
        }
        loop {
            args.push(self.or_expr()?);
            match self.advance() {
                Some(Token { kind: TokenKind::Comma, .. }) => continue,
                Some(Token { kind: TokenKind::CloseParen, .. }) => return Ok(args),
                _ => {
                    return Err(TranslateError::syntax(
                        "expected ',' or ')' in argument list",
                        self.here(),
                    ))
                }
            }
        }
    }

    fn if_expr(&mut self) -> Result<Expr, TranslateError> {
        let mut branches = Vec::new();
        loop {
            let condition = self.or_expr()?;
            self.expect_keyword("THEN")?;
            let result = self.or_expr()?;
            branches.push((condition, result));
            if !self.match_keyword("ELSEIF") {
                break;
            }
        }

        let otherwise = if self.match_keyword("ELSE") {
            Some(Box::new(self.or_expr()?))
        } else {
            None
        };
        self.expect_keyword("END")?;

        Ok(Expr::If {
            branches,
            otherwise,
        })
    }

    fn case_expr(&mut self) -> Result<Expr, TranslateError> {
        let subject = self.or_expr()?;
        let mut arms = Vec::new();
        while self.match_keyword("WHEN") {
            let value = self.or_expr()?;
            self.expect_keyword("THEN")?;
            let result = self.or_expr()?;
            arms.push((value, result));
        }
        if arms.is_empty() {
            return Err(TranslateError::syntax("CASE without WHEN", self.here()));
        }

        let otherwise = if self.match_keyword("ELSE") {
            Some(Box::new(self.or_expr()?))
        } else {
            None
        };
        self.expect_keyword("END")?;

        Ok(Expr::Case {
            subject: Box::new(subject),
            arms,
            otherwise,
        })
    }

    /// `{FIXED ...}` and friends have no measure equivalent
    fn level_of_detail(&self) -> TranslateError {
        let keyword = match self.peek() {
            Some(Token {
                kind: TokenKind::Identifier(id),
                ..
            }) => id.to_ascii_uppercase(),
            _ => "table-scoped".to_string(),
        };
        TranslateError::Unsupported(format!(
            "level-of-detail expression ({{{keyword} ...}}) has no direct measure equivalent"
        ))
    }
}

fn parse_date(text: &str) -> Result<Expr, TranslateError> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(Expr::Date)
        .map_err(|_| {
            TranslateError::Unsupported(format!(
                "date literal #{text}# (only #YYYY-MM-DD# is supported)"
            ))
        })
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Number(n) => format!("number {n}"),
        TokenKind::Text(s) => format!("string \"{s}\""),
        TokenKind::Date(d) => format!("date #{d}#"),
        TokenKind::Field { source, name } => FieldRef {
            source: source.clone(),
            name: name.clone(),
        }
        .to_string(),
        TokenKind::Identifier(id) => format!("'{id}'"),
        TokenKind::Operator(op) => format!("'{op}'"),
        TokenKind::OpenParen => "'('".to_string(),
        TokenKind::CloseParen => "')'".to_string(),
        TokenKind::Comma => "','".to_string(),
        TokenKind::OpenBrace => "'{'".to_string(),
        TokenKind::CloseBrace => "'}'".to_string(),
        TokenKind::Colon => "':'".to_string(),
    }
}
