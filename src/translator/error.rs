//! Translation errors

use thiserror::Error;

use crate::parser::{Node, ParseError};
use crate::smt::TermError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TranslationError {
    #[error("unsupported operator `{op}` for operands of sort ({sort})")]
    UnsupportedOperator { op: String, sort: String },

    #[error(transparent)]
    Sort(#[from] TermError),

    #[error("unknown tag `{tag}` for enumeration `{sort}`")]
    UnknownTag { tag: String, sort: String },

    #[error("string literal `{0}` is used outside of an enumeration context")]
    BareTag(String),

    #[error("cannot narrow a real value into the integer-sorted `{name}`")]
    Narrowing { name: String },

    #[error("prior value {value} of port `{port}` does not fit sort {sort}")]
    PriorValue {
        port: String,
        value: String,
        sort: String,
    },

    #[error("`if` without `else` in `{modifier}`")]
    MissingElse { modifier: String },

    #[error("`return` in `{modifier}`, which has no target port")]
    ReturnWithoutTarget { modifier: String },

    #[error("`return` without a value in `{modifier}`")]
    EmptyReturn { modifier: String },

    #[error("cannot translate {kind} `{text}` into constraints")]
    Untranslatable { kind: &'static str, text: String },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl TranslationError {
    pub(crate) fn untranslatable(node: &Node) -> Self {
        let text = match node {
            Node::Unsupported(text) => text.clone(),
            other => format!("{:?}", other),
        };
        TranslationError::Untranslatable {
            kind: node.kind(),
            text,
        }
    }
}
