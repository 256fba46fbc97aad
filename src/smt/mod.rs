//! SMT module
//!
//! This module contains:
//! - `term`: sorts, terms and the checked combinators used by the translator
//! - `rational`: exact real constants
//! - `script`: SMT-LIB script assembly
//! - `z3_backend`: satisfiability checking through Z3 (feature `z3`)

pub mod rational;
pub mod script;
pub mod term;

#[cfg(feature = "z3")]
pub mod z3_backend;

pub use rational::Rational;
pub use script::{Script, ScriptError};
pub use term::{quote_symbol, EnumSort, Op, Sort, Term, TermError};

#[cfg(feature = "z3")]
pub use z3_backend::*;
