//! Lexer and parser for bench scripts.
//!
//! ```text
//! module  := item*
//! item    := "fn" IDENT "(" (IDENT ("," IDENT)*)? ")" block
//! block   := "{" stmt* expr? "}"
//! stmt    := "let" IDENT "=" expr ";" | IDENT "=" expr ";"
//!          | "while" expr block | if | expr ";"
//! expr    := if | cmp
//! if      := "if" expr block ("else" (block | if))?
//! cmp     := sum (("==" | "!=" | "<" | ">" | "<=" | ">=") sum)?
//! sum     := term (("+" | "-") term)*
//! term    := unary (("*" | "/" | "%") unary)*
//! unary   := "-" unary | atom
//! atom    := INT | IDENT | IDENT "(" args ")" | "(" expr ")" | block
//! ```
//!
//! `#` starts a comment that runs to the end of the line.

use super::ScriptError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Tok {
    Int(i64),
    Ident(String),
    Fn,
    Let,
    While,
    If,
    Else,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Int(i64),
    Var { name: String, line: usize },
    Call { name: String, args: Vec<Expr>, line: usize },
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    If { cond: Box<Expr>, then: Block, otherwise: Option<Block> },
    Block(Block),
}

#[derive(Debug, Clone)]
pub(crate) enum Stmt {
    Let { name: String, value: Expr },
    Assign { name: String, value: Expr, line: usize },
    While { cond: Expr, body: Block },
    Expr(Expr),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Block {
    pub stmts: Vec<Stmt>,
    pub tail: Option<Box<Expr>>,
}

#[derive(Debug, Clone)]
pub(crate) struct FnDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
    pub line: usize,
}

pub(crate) fn tokenize(src: &str) -> Result<Vec<(Tok, usize)>, ScriptError> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    let mut line = 1;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b'\n' => {
                line += 1;
                i += 1;
            }
            b' ' | b'\t' | b'\r' => i += 1,
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'0'..=b'9' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'_') {
                    i += 1;
                }
                let digits: String = src[start..i].chars().filter(|&c| c != '_').collect();
                let v = digits.parse::<i64>().map_err(|e| ScriptError::Syntax {
                    line,
                    message: format!("bad integer literal `{}`: {e}", &src[start..i]),
                })?;
                out.push((Tok::Int(v), line));
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                let tok = match &src[start..i] {
                    "fn" => Tok::Fn,
                    "let" => Tok::Let,
                    "while" => Tok::While,
                    "if" => Tok::If,
                    "else" => Tok::Else,
                    word => Tok::Ident(word.to_string()),
                };
                out.push((tok, line));
            }
            _ => {
                let next = bytes.get(i + 1).copied();
                let (tok, len) = match (c, next) {
                    (b'=', Some(b'=')) => (Tok::EqEq, 2),
                    (b'!', Some(b'=')) => (Tok::NotEq, 2),
                    (b'<', Some(b'=')) => (Tok::Le, 2),
                    (b'>', Some(b'=')) => (Tok::Ge, 2),
                    (b'=', _) => (Tok::Assign, 1),
                    (b'<', _) => (Tok::Lt, 1),
                    (b'>', _) => (Tok::Gt, 1),
                    (b'(', _) => (Tok::LParen, 1),
                    (b')', _) => (Tok::RParen, 1),
                    (b'{', _) => (Tok::LBrace, 1),
                    (b'}', _) => (Tok::RBrace, 1),
                    (b',', _) => (Tok::Comma, 1),
                    (b';', _) => (Tok::Semi, 1),
                    (b'+', _) => (Tok::Plus, 1),
                    (b'-', _) => (Tok::Minus, 1),
                    (b'*', _) => (Tok::Star, 1),
                    (b'/', _) => (Tok::Slash, 1),
                    (b'%', _) => (Tok::Percent, 1),
                    _ => {
                        return Err(ScriptError::Syntax {
                            line,
                            message: format!("unexpected character `{}`", c as char),
                        })
                    }
                };
                out.push((tok, line));
                i += len;
            }
        }
    }
    out.push((Tok::Eof, line));
    Ok(out)
}

pub(crate) struct Parser {
    toks: Vec<(Tok, usize)>,
    pos: usize,
}

impl Parser {
    pub fn new(src: &str) -> Result<Self, ScriptError> {
        Ok(Self {
            toks: tokenize(src)?,
            pos: 0,
        })
    }

    fn peek(&self) -> &Tok {
        &self.toks[self.pos].0
    }

    fn line(&self) -> usize {
        self.toks[self.pos].1
    }

    fn bump(&mut self) -> Tok {
        let tok = self.toks[self.pos].0.clone();
        if tok != Tok::Eof {
            self.pos += 1;
        }
        tok
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, ScriptError> {
        Err(ScriptError::Syntax {
            line: self.line(),
            message: message.into(),
        })
    }

    fn expect(&mut self, want: Tok) -> Result<(), ScriptError> {
        if *self.peek() == want {
            self.bump();
            Ok(())
        } else {
            self.error(format!("expected {:?}, found {:?}", want, self.peek()))
        }
    }

    fn ident(&mut self) -> Result<String, ScriptError> {
        if let Tok::Ident(name) = self.peek() {
            let name = name.clone();
            self.bump();
            return Ok(name);
        }
        self.error(format!("expected identifier, found {:?}", self.peek()))
    }

    pub fn module(&mut self) -> Result<Vec<FnDecl>, ScriptError> {
        let mut items = Vec::new();
        while *self.peek() != Tok::Eof {
            items.push(self.function()?);
        }
        Ok(items)
    }

    fn function(&mut self) -> Result<FnDecl, ScriptError> {
        let line = self.line();
        self.expect(Tok::Fn)?;
        let name = self.ident()?;
        self.expect(Tok::LParen)?;
        let mut params = Vec::new();
        if *self.peek() != Tok::RParen {
            loop {
                params.push(self.ident()?);
                if *self.peek() == Tok::Comma {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect(Tok::RParen)?;
        let body = self.block()?;
        Ok(FnDecl {
            name,
            params,
            body,
            line,
        })
    }

    fn block(&mut self) -> Result<Block, ScriptError> {
        self.expect(Tok::LBrace)?;
        let mut block = Block::default();
        loop {
            match self.peek() {
                Tok::RBrace => {
                    self.bump();
                    return Ok(block);
                }
                Tok::Let => {
                    self.bump();
                    let name = self.ident()?;
                    self.expect(Tok::Assign)?;
                    let value = self.expr()?;
                    self.expect(Tok::Semi)?;
                    block.stmts.push(Stmt::Let { name, value });
                }
                Tok::While => {
                    self.bump();
                    let cond = self.expr()?;
                    let body = self.block()?;
                    block.stmts.push(Stmt::While { cond, body });
                }
                Tok::Ident(_) if self.toks[self.pos + 1].0 == Tok::Assign => {
                    let line = self.line();
                    let name = self.ident()?;
                    self.bump();
                    let value = self.expr()?;
                    self.expect(Tok::Semi)?;
                    block.stmts.push(Stmt::Assign { name, value, line });
                }
                Tok::Eof => return self.error("unterminated block"),
                _ => {
                    let block_like = matches!(self.peek(), Tok::If | Tok::LBrace);
                    let e = self.expr()?;
                    match self.peek() {
                        Tok::Semi => {
                            self.bump();
                            block.stmts.push(Stmt::Expr(e));
                        }
                        Tok::RBrace => block.tail = Some(Box::new(e)),
                        _ if block_like => block.stmts.push(Stmt::Expr(e)),
                        other => {
                            return self.error(format!("expected `;` or `}}`, found {:?}", other))
                        }
                    }
                }
            }
        }
    }

    fn expr(&mut self) -> Result<Expr, ScriptError> {
        if *self.peek() == Tok::If {
            return self.if_expr();
        }
        self.comparison()
    }

    fn if_expr(&mut self) -> Result<Expr, ScriptError> {
        self.expect(Tok::If)?;
        let cond = self.expr()?;
        let then = self.block()?;
        let otherwise = if *self.peek() == Tok::Else {
            self.bump();
            if *self.peek() == Tok::If {
                Some(Block {
                    stmts: Vec::new(),
                    tail: Some(Box::new(self.if_expr()?)),
                })
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(Expr::If {
            cond: Box::new(cond),
            then,
            otherwise,
        })
    }

    fn comparison(&mut self) -> Result<Expr, ScriptError> {
        let lhs = self.sum()?;
        let op = match self.peek() {
            Tok::EqEq => BinOp::Eq,
            Tok::NotEq => BinOp::Ne,
            Tok::Lt => BinOp::Lt,
            Tok::Gt => BinOp::Gt,
            Tok::Le => BinOp::Le,
            Tok::Ge => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.bump();
        let rhs = self.sum()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn sum(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                Tok::Percent => BinOp::Rem,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        if *self.peek() == Tok::Minus {
            self.bump();
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Expr, ScriptError> {
        let line = self.line();
        match self.peek().clone() {
            Tok::Int(v) => {
                self.bump();
                Ok(Expr::Int(v))
            }
            Tok::Ident(name) => {
                self.bump();
                if *self.peek() != Tok::LParen {
                    return Ok(Expr::Var { name, line });
                }
                self.bump();
                let mut args = Vec::new();
                if *self.peek() != Tok::RParen {
                    loop {
                        args.push(self.expr()?);
                        if *self.peek() == Tok::Comma {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(Tok::RParen)?;
                Ok(Expr::Call { name, args, line })
            }
            Tok::LParen => {
                self.bump();
                let e = self.expr()?;
                self.expect(Tok::RParen)?;
                Ok(e)
            }
            Tok::LBrace => Ok(Expr::Block(self.block()?)),
            Tok::If => self.if_expr(),
            other => self.error(format!("expected expression, found {:?}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_operators_and_comments() {
        let toks: Vec<Tok> = tokenize("a <= b # trailing\n!= 1_000")
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect();
        assert_eq!(
            toks,
            vec![
                Tok::Ident("a".into()),
                Tok::Le,
                Tok::Ident("b".into()),
                Tok::NotEq,
                Tok::Int(1000),
                Tok::Eof
            ]
        );
    }

    #[test]
    fn parses_statement_if_without_semicolon() {
        let src = "fn f(a) { while a > 1 { if a > 5 { a = a - 5; } else { a = a - 1; } } a }";
        let items = Parser::new(src).unwrap().module().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].params, vec!["a".to_string()]);
        assert_eq!(items[0].body.stmts.len(), 1);
        assert!(items[0].body.tail.is_some());
    }

    #[test]
    fn reports_line_of_syntax_error() {
        let err = Parser::new("fn f() {\n  1 +\n}").unwrap().module().unwrap_err();
        assert!(matches!(err, ScriptError::Syntax { line: 3, .. }), "{err}");
    }
}
