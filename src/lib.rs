//! # crest-smt
//!
//! Symbolic translation of CREST update functions into SMT constraints.
//!
//! This crate provides:
//! - An in-memory system model (entities, ports, states, updates, influences)
//! - Parsing of Rust-syntax update bodies into a statement tree
//! - Translation of one simulation step into SMT constraints over versioned
//!   port and local variables
//! - Dependency ordering of the modifiers of an entity
//! - CLI tool (`crest-smt`) for ordering and translating model files
//!
//! ## Usage
//!
//! ```rust
//! use crest_smt::model::{Domain, ModelBuilder, PortKind, Value};
//! use crest_smt::{translate_step, BodyCache, TranslatorOptions};
//!
//! let mut b = ModelBuilder::new();
//! let heat = b.resource("heat", Domain::Real)?;
//! let room = b.entity("room", None)?;
//! let temp = b.port(room, "temp", PortKind::Output, heat, Value::Int(20))?;
//! let idle = b.state(room, "idle")?;
//! b.update(room, "cool", idle, temp, "|s, dt| s.temp.value - dt")?;
//! let model = b.build();
//!
//! let step = translate_step(&model, room, &TranslatorOptions::default(), &mut BodyCache::new(), None)?;
//! assert_eq!(step.script.constraints()[0].sexpr(), "(= temp_p0 (- 20.0 dt))");
//! # Ok::<(), crest_smt::Error>(())
//! ```

pub mod cache;
pub mod error;
pub mod model;
pub mod parser;
pub mod schedule;
pub mod smt;
pub mod step;
pub mod translator;

pub use cache::BodyCache;
pub use error::{Error, Result};
pub use model::{Model, ModelBuilder, ModelDefinition, Modifier};
pub use schedule::{build_graph, order, DependencyGraph, GraphNode, ScheduleError};
pub use step::{translate_step, ModifierConstraints, StepTranslation};
pub use translator::{translate_influence, translate_update, MissingElse, TranslationError, TranslatorOptions};
