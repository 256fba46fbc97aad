//! Statement tree for update bodies
//!
//! A small, closed sum type over the syntax the translator understands.
//! Anything else survives as `Node::Unsupported` carrying its source text.

use std::fmt;

use crate::smt::Rational;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Real(Rational),
    Bool(bool),
    /// String literal, used as an enumeration tag
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!`: logical negation on booleans, bitwise invert on integers
    Not,
    Neg,
    /// `*x`
    Identity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Literal(Literal),
    Name(String),
    /// Field access chain including the base, e.g. `["self", "port", "value"]`
    Attribute(Vec<String>),
    /// `t1 = t2 = value`
    Assign {
        targets: Vec<Node>,
        value: Box<Node>,
    },
    /// `target op= value`
    AugAssign {
        target: Box<Node>,
        op: BinaryOp,
        value: Box<Node>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Node>,
    },
    BinOp {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    /// `a && b && c`, flattened
    BoolOp {
        op: BoolOp,
        values: Vec<Node>,
    },
    /// `left ops[0] comparators[0] ops[1] comparators[1] ...`
    Compare {
        left: Box<Node>,
        ops: Vec<CmpOp>,
        comparators: Vec<Node>,
    },
    /// `if test { body } else { orelse }` in value position
    IfExpr {
        test: Box<Node>,
        body: Box<Node>,
        orelse: Box<Node>,
    },
    /// `if` in statement position
    IfStmt {
        test: Box<Node>,
        body: Vec<Node>,
        orelse: Option<Vec<Node>>,
    },
    Return(Option<Box<Node>>),
    Block(Vec<Node>),
    Unsupported(String),
}

impl Node {
    pub fn name(name: impl Into<String>) -> Node {
        Node::Name(name.into())
    }

    pub fn attribute(path: &str) -> Node {
        Node::Attribute(path.split('.').map(str::to_string).collect())
    }

    pub fn int(value: i64) -> Node {
        Node::Literal(Literal::Int(value))
    }

    pub fn real(value: Rational) -> Node {
        Node::Literal(Literal::Real(value))
    }

    pub fn assign(target: Node, value: Node) -> Node {
        Node::Assign {
            targets: vec![target],
            value: Box::new(value),
        }
    }

    pub fn aug_assign(target: Node, op: BinaryOp, value: Node) -> Node {
        Node::AugAssign {
            target: Box::new(target),
            op,
            value: Box::new(value),
        }
    }

    pub fn binop(op: BinaryOp, left: Node, right: Node) -> Node {
        Node::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn compare(left: Node, op: CmpOp, right: Node) -> Node {
        Node::Compare {
            left: Box::new(left),
            ops: vec![op],
            comparators: vec![right],
        }
    }

    pub fn ret(value: Node) -> Node {
        Node::Return(Some(Box::new(value)))
    }

    /// Source text of unsupported syntax, the node kind otherwise
    pub fn source_text(&self) -> &str {
        match self {
            Node::Unsupported(text) => text.as_str(),
            other => other.kind(),
        }
    }

    /// Syntactic kind, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Literal(_) => "literal",
            Node::Name(_) => "name",
            Node::Attribute(_) => "attribute",
            Node::Assign { .. } => "assignment",
            Node::AugAssign { .. } => "augmented assignment",
            Node::UnaryOp { .. } => "unary operation",
            Node::BinOp { .. } => "binary operation",
            Node::BoolOp { .. } => "boolean operation",
            Node::Compare { .. } => "comparison",
            Node::IfExpr { .. } => "conditional expression",
            Node::IfStmt { .. } => "if statement",
            Node::Return(_) => "return",
            Node::Block(_) => "block",
            Node::Unsupported(_) => "unsupported syntax",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "pow",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        })
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
            UnaryOp::Identity => "*",
        })
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        })
    }
}
