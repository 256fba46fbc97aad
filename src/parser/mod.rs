//! Source inspection for update bodies
//!
//! This module contains:
//! - `ast`: the statement tree the translator dispatches over
//! - `lower`: `syn`-based parsing of Rust-syntax update functions
//! - `inspect`: read-set analysis and per-block write tables

pub mod ast;
pub mod inspect;
pub mod lower;

use thiserror::Error;

pub use ast::{BinaryOp, BoolOp, CmpOp, Literal, Node, UnaryOp};
pub use inspect::{accessed_ports, port_path, written_keys, BlockPlan};
pub use lower::{lower_expr, parse_function, FunctionKind, UpdateFunction};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("update body is neither a `fn` item nor a closure: `{0}`")]
    NotAFunction(String),

    #[error("syntax error in update body: {0}")]
    Syntax(String),

    #[error("unsupported parameter pattern `{0}`")]
    Parameter(String),
}
