//! AST node types produced by the parser.
//!
//! Nodes are closed tagged variants. Every statement and expression carries
//! the source position of its first token so the evaluator and compiler can
//! attach locations to errors and stack traces.

use std::fmt;

/// 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl Pos {
    #[must_use]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A parsed compilation unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

/// A sequence of statements sharing one scope (function body, loop body,
/// branch arm, catch body).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

/// A statement with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `name = value`
    Assignment { name: String, value: Expr },
    /// `@name = value`, only legal inside a method body.
    InstanceAssignment { name: String, value: Expr },
    /// `target[index] = value`
    IndexAssignment {
        target: Expr,
        index: Expr,
        value: Expr,
    },
    Expression(Expr),
    Return(Option<Expr>),
    Break,
    Continue,
    While {
        condition: Expr,
        body: Block,
    },
    /// C-style `for (init; cond; update) body`; all header slots optional.
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        update: Option<Box<Stmt>>,
        body: Block,
    },
    Switch {
        value: Expr,
        cases: Vec<SwitchCase>,
        default: Option<Block>,
    },
    Try {
        body: Block,
        catches: Vec<CatchClause>,
        finally: Option<Block>,
    },
    Throw(Expr),
    Import {
        module: String,
        items: Vec<ImportItem>,
    },
    Export {
        name: String,
        value: Option<Expr>,
    },
    Class(ClassDecl),
}

/// One `case v1[, v2, ...]: body` arm. Cases never fall through.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub values: Vec<Expr>,
    pub body: Block,
}

/// One `catch ([Type] var) { body }` clause. `error_type` is `None` for a
/// catch-all clause.
#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub error_type: Option<String>,
    pub variable: String,
    pub body: Block,
    pub pos: Pos,
}

/// One imported binding, optionally renamed: `a` or `a as b`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportItem {
    pub name: String,
    pub alias: Option<String>,
}

/// `class Name [< Super] { methods }`
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub superclass: Option<String>,
    pub methods: Vec<MethodDecl>,
}

/// A method declaration inside a class body. `initialize` is the constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
    pub pos: Pos,
}

/// An expression with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Str(String),
    Identifier(String),
    /// `@name`, resolves against the receiver's instance-variable map.
    InstanceVar(String),
    Prefix {
        op: PrefixOp,
        right: Box<Expr>,
    },
    Infix {
        op: InfixOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `if` is an expression; its value is the evaluated branch's value, or
    /// null when the condition is false and there is no `else`.
    If {
        condition: Box<Expr>,
        consequence: Block,
        alternative: Option<Block>,
    },
    Array(Vec<Expr>),
    Hash(Vec<(Expr, Expr)>),
    Index {
        receiver: Box<Expr>,
        index: Box<Expr>,
    },
    Property {
        receiver: Box<Expr>,
        name: String,
    },
    Call {
        function: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `super(args)`: dispatch to the same-named method in the parent class.
    Super(Vec<Expr>),
    Function {
        params: Vec<String>,
        body: Block,
        /// Filled in by the parser when the literal is the RHS of a simple
        /// assignment, so stack traces can name the function.
        name: Option<String>,
    },
}

/// Unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    /// `!`: truthiness inversion.
    Bang,
    /// `-`: numeric negation.
    Minus,
}

impl fmt::Display for PrefixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bang => f.write_str("!"),
            Self::Minus => f.write_str("-"),
        }
    }
}

/// Binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl fmt::Display for InfixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Asterisk => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::And => "&&",
            Self::Or => "||",
        };
        f.write_str(s)
    }
}
