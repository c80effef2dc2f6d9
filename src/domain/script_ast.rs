//! Script AST data structures.
//!
//! - `Expr`: numeric, boolean and string expressions with source positions
//!   on the nodes that can fail name resolution
//! - `Arg`: positional or `name = value` call argument
//! - `Stmt`: one line of a script
//! - `Program`: the parsed script, statements in source order

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Bool(bool),
    Str(String),
    Na,
    /// Any dotted name: a built-in, a variable or a constant like `color.red`.
    Name { name: String, position: usize },
    /// `target[offset]`
    History {
        target: Box<Expr>,
        offset: Box<Expr>,
        position: usize,
    },
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call(Call),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Arg>,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Expr,
    pub position: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    /// `x = ...`, re-evaluated every bar
    Let,
    /// `const x = ...`, evaluated once
    Const,
    /// `var x = ...`, initialised once, then persists until reassigned
    Var,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReturnValue {
    Single(Expr),
    Named(Vec<(String, Expr)>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Decl {
        kind: DeclKind,
        name: String,
        value: Expr,
        position: usize,
    },
    /// `x := ...`
    Reassign {
        name: String,
        value: Expr,
        position: usize,
    },
    /// `[a, b] = call(...)`
    Tuple {
        names: Vec<String>,
        call: Call,
        position: usize,
    },
    Expr(Expr),
    Return { value: ReturnValue, position: usize },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}
