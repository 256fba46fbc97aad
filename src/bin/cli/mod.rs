//! CLI module for crest-smt
//!
//! Handles model file discovery, modifier filtering and output formatting

pub mod discover;
pub mod filters;
pub mod output;

pub use discover::*;
pub use filters::*;
pub use output::*;
