//! Compiled bench scripts and their tree-walking evaluator.
//!
//! Compilation resolves every variable to a frame slot and every call to a function
//! index, so evaluation never looks anything up by name.

use sha2::{Digest, Sha256};
use std::collections::HashMap;

use super::syntax::{BinOp, Block, Expr, FnDecl, Parser, Stmt};
use super::ScriptError;
use crate::error::InvokeError;

/// Deepest call chain a script may build before the call fails.
pub const MAX_CALL_DEPTH: usize = 256;

#[derive(Debug)]
enum Node {
    Const(i64),
    Local(usize),
    Call(usize, Box<[Node]>),
    Neg(Box<Node>),
    Bin(BinOp, Box<Node>, Box<Node>),
    If(Box<Node>, Box<Node>, Box<Node>),
    Seq(Box<[Op]>, Box<Node>),
}

#[derive(Debug)]
enum Op {
    Set(usize, Node),
    While(Node, Node),
    Eval(Node),
}

#[derive(Debug)]
struct Function {
    name: String,
    arity: usize,
    frame_size: usize,
    body: Node,
}

/// A compiled script module.
#[derive(Debug)]
pub struct Program {
    functions: Vec<Function>,
    index: HashMap<String, usize>,
    digest: String,
}

impl Program {
    pub fn compile(src: &str) -> Result<Self, ScriptError> {
        let decls = Parser::new(src)?.module()?;

        let mut index = HashMap::new();
        for (i, d) in decls.iter().enumerate() {
            if index.insert(d.name.clone(), i).is_some() {
                return Err(ScriptError::Semantic {
                    function: d.name.clone(),
                    message: format!("line {}: defined twice", d.line),
                });
            }
        }
        let arities: Vec<usize> = decls.iter().map(|d| d.params.len()).collect();

        let functions = decls
            .iter()
            .map(|d| FnCompiler::new(&index, &arities, d).compile(d))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            functions,
            index,
            digest: hex_digest(src),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn arity(&self, function: usize) -> usize {
        self.functions[function].arity
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(|f| f.name.as_str())
    }

    /// SHA-256 of the module source, hex encoded.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Call `function` with `args`; `args.len()` must equal its arity.
    pub fn call(&self, function: usize, args: &[i64]) -> Result<i64, InvokeError> {
        let f = &self.functions[function];
        if args.len() != f.arity {
            return Err(InvokeError::Arity {
                expected: f.arity,
                actual: args.len(),
            });
        }
        let mut frame = vec![0i64; f.frame_size];
        frame[..args.len()].copy_from_slice(args);
        self.run(f, &mut frame, 0)
    }

    fn run(&self, f: &Function, frame: &mut [i64], depth: usize) -> Result<i64, InvokeError> {
        if depth >= MAX_CALL_DEPTH {
            return Err(InvokeError::Guest(format!(
                "call depth exceeded in `{}`",
                f.name
            )));
        }
        self.eval(&f.body, frame, depth)
    }

    fn eval(&self, node: &Node, frame: &mut [i64], depth: usize) -> Result<i64, InvokeError> {
        Ok(match node {
            Node::Const(v) => *v,
            Node::Local(slot) => frame[*slot],
            Node::Call(func, args) => {
                let f = &self.functions[*func];
                let mut callee = vec![0i64; f.frame_size];
                for (slot, arg) in callee.iter_mut().zip(args.iter()) {
                    *slot = self.eval(arg, frame, depth)?;
                }
                self.run(f, &mut callee, depth + 1)?
            }
            Node::Neg(e) => self.eval(e, frame, depth)?.wrapping_neg(),
            Node::Bin(op, lhs, rhs) => {
                let a = self.eval(lhs, frame, depth)?;
                let b = self.eval(rhs, frame, depth)?;
                apply(*op, a, b)?
            }
            Node::If(cond, then, otherwise) => {
                if self.eval(cond, frame, depth)? != 0 {
                    self.eval(then, frame, depth)?
                } else {
                    self.eval(otherwise, frame, depth)?
                }
            }
            Node::Seq(ops, tail) => {
                for op in ops.iter() {
                    self.exec(op, frame, depth)?;
                }
                self.eval(tail, frame, depth)?
            }
        })
    }

    fn exec(&self, op: &Op, frame: &mut [i64], depth: usize) -> Result<(), InvokeError> {
        match op {
            Op::Set(slot, e) => {
                let v = self.eval(e, frame, depth)?;
                frame[*slot] = v;
            }
            Op::While(cond, body) => {
                while self.eval(cond, frame, depth)? != 0 {
                    self.eval(body, frame, depth)?;
                }
            }
            Op::Eval(e) => {
                self.eval(e, frame, depth)?;
            }
        }
        Ok(())
    }
}

fn apply(op: BinOp, a: i64, b: i64) -> Result<i64, InvokeError> {
    Ok(match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div | BinOp::Rem if b == 0 => {
            return Err(InvokeError::Guest("division by zero".to_string()))
        }
        BinOp::Div => a.wrapping_div(b),
        BinOp::Rem => a.wrapping_rem(b),
        BinOp::Eq => i64::from(a == b),
        BinOp::Ne => i64::from(a != b),
        BinOp::Lt => i64::from(a < b),
        BinOp::Gt => i64::from(a > b),
        BinOp::Le => i64::from(a <= b),
        BinOp::Ge => i64::from(a >= b),
    })
}

fn hex_digest(src: &str) -> String {
    let digest = Sha256::digest(src.as_bytes());
    let mut s = String::with_capacity(64);
    for b in digest {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

struct FnCompiler<'a> {
    index: &'a HashMap<String, usize>,
    arities: &'a [usize],
    function: &'a str,
    scope: Vec<(String, usize)>,
    slots: usize,
}

impl<'a> FnCompiler<'a> {
    fn new(index: &'a HashMap<String, usize>, arities: &'a [usize], decl: &'a FnDecl) -> Self {
        Self {
            index,
            arities,
            function: &decl.name,
            scope: Vec::new(),
            slots: 0,
        }
    }

    fn compile(mut self, decl: &FnDecl) -> Result<Function, ScriptError> {
        for p in &decl.params {
            if self.scope.iter().any(|(n, _)| n == p) {
                return Err(self.error(format!("parameter `{p}` declared twice")));
            }
            self.declare(p);
        }
        let body = self.block(&decl.body)?;
        Ok(Function {
            name: decl.name.clone(),
            arity: decl.params.len(),
            frame_size: self.slots,
            body,
        })
    }

    fn error(&self, message: String) -> ScriptError {
        ScriptError::Semantic {
            function: self.function.to_string(),
            message,
        }
    }

    fn declare(&mut self, name: &str) -> usize {
        let slot = self.slots;
        self.slots += 1;
        self.scope.push((name.to_string(), slot));
        slot
    }

    fn local(&self, name: &str, line: usize) -> Result<usize, ScriptError> {
        self.scope
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, slot)| *slot)
            .ok_or_else(|| self.error(format!("line {line}: unknown variable `{name}`")))
    }

    // `let` bindings end with their block; their slots are not reused.
    fn block(&mut self, block: &Block) -> Result<Node, ScriptError> {
        let mark = self.scope.len();
        let mut ops = Vec::with_capacity(block.stmts.len());
        for stmt in &block.stmts {
            ops.push(self.stmt(stmt)?);
        }
        let tail = match &block.tail {
            Some(e) => self.expr(e)?,
            None => Node::Const(0),
        };
        self.scope.truncate(mark);

        Ok(if ops.is_empty() {
            tail
        } else {
            Node::Seq(ops.into_boxed_slice(), Box::new(tail))
        })
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<Op, ScriptError> {
        Ok(match stmt {
            Stmt::Let { name, value } => {
                let value = self.expr(value)?;
                Op::Set(self.declare(name), value)
            }
            Stmt::Assign { name, value, line } => {
                let slot = self.local(name, *line)?;
                Op::Set(slot, self.expr(value)?)
            }
            Stmt::While { cond, body } => Op::While(self.expr(cond)?, self.block(body)?),
            Stmt::Expr(e) => Op::Eval(self.expr(e)?),
        })
    }

    fn expr(&mut self, expr: &Expr) -> Result<Node, ScriptError> {
        Ok(match expr {
            Expr::Int(v) => Node::Const(*v),
            Expr::Var { name, line } => Node::Local(self.local(name, *line)?),
            Expr::Call { name, args, line } => {
                let func = *self.index.get(name).ok_or_else(|| {
                    self.error(format!("line {line}: unknown function `{name}`"))
                })?;
                if self.arities[func] != args.len() {
                    return Err(self.error(format!(
                        "line {line}: `{name}` takes {} argument(s), {} given",
                        self.arities[func],
                        args.len()
                    )));
                }
                let args = args
                    .iter()
                    .map(|a| self.expr(a))
                    .collect::<Result<Vec<_>, _>>()?;
                Node::Call(func, args.into_boxed_slice())
            }
            Expr::Neg(e) => Node::Neg(Box::new(self.expr(e)?)),
            Expr::Binary(op, lhs, rhs) => {
                Node::Bin(*op, Box::new(self.expr(lhs)?), Box::new(self.expr(rhs)?))
            }
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.expr(cond)?;
                let then = self.block(then)?;
                let otherwise = match otherwise {
                    Some(b) => self.block(b)?,
                    None => Node::Const(0),
                };
                Node::If(Box::new(cond), Box::new(then), Box::new(otherwise))
            }
            Expr::Block(b) => self.block(b)?,
        })
    }
}
