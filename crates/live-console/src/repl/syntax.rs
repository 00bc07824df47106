//! Tokenizer and recursive-descent parser for console input lines.

use super::EvalError;

const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    True,
    False,
    None,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    tok: Tok,
    column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Name(String),
    List(Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Attr(Box<Expr>, String),
    Call(Box<Expr>, Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Expr(Expr),
    Assign(String, Expr),
}

/// Parses one input line into a statement.
pub fn parse(line: &str) -> Result<Statement, EvalError> {
    let tokens = tokenize(line)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        end_column: line.chars().count() + 1,
    };
    let statement = parser.statement()?;
    if let Some(token) = parser.peek_token() {
        return Err(syntax(token.column, "unexpected trailing input"));
    }
    Ok(statement)
}

fn syntax(column: usize, message: impl Into<String>) -> EvalError {
    EvalError::Syntax {
        column,
        message: message.into(),
    }
}

fn tokenize(line: &str) -> Result<Vec<Token>, EvalError> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let column = i + 1;

        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '#' {
            break;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()))
        {
            let start = i;
            let mut is_float = false;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '_') {
                i += 1;
            }
            if i < chars.len() && chars[i] == '.' {
                is_float = true;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    is_float = true;
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().filter(|c| **c != '_').collect();
            let tok = if is_float {
                Tok::Float(
                    text.parse()
                        .map_err(|_| syntax(column, format!("invalid number '{}'", text)))?,
                )
            } else {
                Tok::Int(
                    text.parse()
                        .map_err(|_| syntax(column, "integer literal too large"))?,
                )
            };
            tokens.push(Token { tok, column });
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            let tok = match word.as_str() {
                "and" => Tok::And,
                "or" => Tok::Or,
                "not" => Tok::Not,
                "True" => Tok::True,
                "False" => Tok::False,
                "None" => Tok::None,
                _ => Tok::Ident(word),
            };
            tokens.push(Token { tok, column });
            continue;
        }

        if c == '\'' || c == '"' {
            let quote = c;
            let mut value = String::new();
            i += 1;
            loop {
                let Some(&ch) = chars.get(i) else {
                    return Err(syntax(column, "unterminated string literal"));
                };
                i += 1;
                if ch == quote {
                    break;
                }
                if ch != '\\' {
                    value.push(ch);
                    continue;
                }
                let Some(&escaped) = chars.get(i) else {
                    return Err(syntax(column, "unterminated string literal"));
                };
                i += 1;
                match escaped {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '0' => value.push('\0'),
                    '\\' => value.push('\\'),
                    '\'' => value.push('\''),
                    '"' => value.push('"'),
                    other => {
                        value.push('\\');
                        value.push(other);
                    }
                }
            }
            tokens.push(Token {
                tok: Tok::Str(value),
                column,
            });
            continue;
        }

        let next = chars.get(i + 1).copied();
        let (tok, width) = match (c, next) {
            ('*', Some('*')) => (Tok::StarStar, 2),
            ('/', Some('/')) => (Tok::SlashSlash, 2),
            ('=', Some('=')) => (Tok::EqEq, 2),
            ('!', Some('=')) => (Tok::NotEq, 2),
            ('<', Some('=')) => (Tok::Le, 2),
            ('>', Some('=')) => (Tok::Ge, 2),
            ('+', _) => (Tok::Plus, 1),
            ('-', _) => (Tok::Minus, 1),
            ('*', _) => (Tok::Star, 1),
            ('/', _) => (Tok::Slash, 1),
            ('%', _) => (Tok::Percent, 1),
            ('(', _) => (Tok::LParen, 1),
            (')', _) => (Tok::RParen, 1),
            ('[', _) => (Tok::LBracket, 1),
            (']', _) => (Tok::RBracket, 1),
            (',', _) => (Tok::Comma, 1),
            ('.', _) => (Tok::Dot, 1),
            ('=', _) => (Tok::Assign, 1),
            ('<', _) => (Tok::Lt, 1),
            ('>', _) => (Tok::Gt, 1),
            (other, _) => {
                return Err(syntax(column, format!("invalid character '{}'", other)));
            }
        };
        tokens.push(Token { tok, column });
        i += width;
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    end_column: usize,
}

impl Parser {
    fn peek_token(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek(&self) -> Option<&Tok> {
        self.peek_token().map(|t| &t.tok)
    }

    fn column(&self) -> usize {
        self.peek_token().map_or(self.end_column, |t| t.column)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<(), EvalError> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(syntax(self.column(), format!("expected {}", what)))
        }
    }

    fn enter(&mut self) -> Result<(), EvalError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(syntax(self.column(), "expression nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Each link of a left-associative chain nests the tree one level
    /// deeper, so it counts against the same budget as parentheses.
    fn link(&mut self, links: &mut usize) -> Result<(), EvalError> {
        self.enter()?;
        *links += 1;
        Ok(())
    }

    fn unlink(&mut self, links: usize) {
        self.depth -= links;
    }

    fn statement(&mut self) -> Result<Statement, EvalError> {
        if let (Some(Tok::Ident(name)), Some(Tok::Assign)) = (
            self.tokens.first().map(|t| &t.tok),
            self.tokens.get(1).map(|t| &t.tok),
        ) {
            let name = name.clone();
            self.pos = 2;
            let value = self.expression()?;
            return Ok(Statement::Assign(name, value));
        }
        if self.tokens.is_empty() {
            return Err(syntax(1, "empty input"));
        }
        Ok(Statement::Expr(self.expression()?))
    }

    fn expression(&mut self) -> Result<Expr, EvalError> {
        self.enter()?;
        let result = self.or_expr();
        self.leave();
        result
    }

    fn or_expr(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.and_expr()?;
        let mut links = 0;
        while self.eat(&Tok::Or) {
            self.link(&mut links)?;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.unlink(links);
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.not_expr()?;
        let mut links = 0;
        while self.eat(&Tok::And) {
            self.link(&mut links)?;
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.unlink(links);
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, EvalError> {
        if self.eat(&Tok::Not) {
            self.enter()?;
            let operand = self.not_expr();
            self.leave();
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, EvalError> {
        let left = self.arith()?;
        let op = match self.peek() {
            Some(Tok::EqEq) => BinaryOp::Eq,
            Some(Tok::NotEq) => BinaryOp::NotEq,
            Some(Tok::Lt) => BinaryOp::Lt,
            Some(Tok::Le) => BinaryOp::Le,
            Some(Tok::Gt) => BinaryOp::Gt,
            Some(Tok::Ge) => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.arith()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn arith(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.term()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinaryOp::Add,
                Some(Tok::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            self.link(&mut links)?;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.unlink(links);
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.factor()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinaryOp::Mul,
                Some(Tok::Slash) => BinaryOp::Div,
                Some(Tok::SlashSlash) => BinaryOp::FloorDiv,
                Some(Tok::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.pos += 1;
            self.link(&mut links)?;
            let right = self.factor()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.unlink(links);
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr, EvalError> {
        let op = match self.peek() {
            Some(Tok::Minus) => UnaryOp::Neg,
            Some(Tok::Plus) => UnaryOp::Pos,
            _ => return self.power(),
        };
        self.pos += 1;
        self.enter()?;
        let operand = self.factor();
        self.leave();
        Ok(Expr::Unary(op, Box::new(operand?)))
    }

    fn power(&mut self) -> Result<Expr, EvalError> {
        let base = self.postfix()?;
        if self.eat(&Tok::StarStar) {
            self.enter()?;
            let exponent = self.factor();
            self.leave();
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent?)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, EvalError> {
        let mut expr = self.atom()?;
        let mut links = 0;
        loop {
            if matches!(self.peek(), Some(Tok::LParen | Tok::LBracket | Tok::Dot)) {
                self.link(&mut links)?;
            }
            match self.peek() {
                Some(Tok::LParen) => {
                    self.pos += 1;
                    let args = self.sequence(Tok::RParen, "')'")?;
                    expr = Expr::Call(Box::new(expr), args);
                }
                Some(Tok::LBracket) => {
                    self.pos += 1;
                    let index = self.expression()?;
                    self.expect(Tok::RBracket, "']'")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                Some(Tok::Dot) => {
                    self.pos += 1;
                    let column = self.column();
                    match self.advance().map(|t| t.tok) {
                        Some(Tok::Ident(name)) => expr = Expr::Attr(Box::new(expr), name),
                        _ => return Err(syntax(column, "expected attribute name after '.'")),
                    }
                }
                _ => break,
            }
        }
        self.unlink(links);
        Ok(expr)
    }

    fn sequence(&mut self, close: Tok, what: &str) -> Result<Vec<Expr>, EvalError> {
        let mut items = Vec::new();
        if self.eat(&close) {
            return Ok(items);
        }
        loop {
            items.push(self.expression()?);
            if self.eat(&close) {
                return Ok(items);
            }
            self.expect(Tok::Comma, &format!("',' or {}", what))?;
            if self.eat(&close) {
                return Ok(items);
            }
        }
    }

    fn atom(&mut self) -> Result<Expr, EvalError> {
        let column = self.column();
        let Some(token) = self.advance() else {
            return Err(syntax(column, "unexpected end of input"));
        };
        let expr = match token.tok {
            Tok::Int(i) => Expr::Literal(Literal::Int(i)),
            Tok::Float(f) => Expr::Literal(Literal::Float(f)),
            Tok::Str(s) => Expr::Literal(Literal::Str(s)),
            Tok::True => Expr::Literal(Literal::Bool(true)),
            Tok::False => Expr::Literal(Literal::Bool(false)),
            Tok::None => Expr::Literal(Literal::None),
            Tok::Ident(name) => Expr::Name(name),
            Tok::LParen => {
                let inner = self.expression()?;
                self.expect(Tok::RParen, "')'")?;
                inner
            }
            Tok::LBracket => Expr::List(self.sequence(Tok::RBracket, "']'")?),
            _ => return Err(syntax(token.column, "invalid syntax")),
        };
        Ok(expr)
    }
}
