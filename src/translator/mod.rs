//! Translator module
//!
//! This module contains:
//! - `symbols`: the per-step symbol table shared by every modifier of a step
//! - `versioning`: write counting and read/write version resolution
//! - `sorts`: sort inference for modifier-local variables
//! - `converter`: statement tree → SMT constraint translation
//! - `error`: translation errors

pub mod converter;
pub mod error;
pub mod sorts;
pub mod symbols;
pub mod versioning;

use tracing::debug;

pub use converter::{Body, Converter, Translation};
pub use error::TranslationError;
pub use symbols::{SymbolKey, SymbolTable, Version};
pub use versioning::VarKey;

use crate::model::{InfluenceId, Model, Modifier, UpdateId};
use crate::parser::UpdateFunction;
use crate::smt::{Sort, Term};

/// Handling of an `if` statement without `else`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingElse {
    /// Fail with `TranslationError::MissingElse`
    #[default]
    Reject,
    /// Translate the absent arm as an empty block
    Empty,
}

#[derive(Debug, Clone)]
pub struct TranslatorOptions {
    /// Name of the step variable
    pub dt_name: String,
    /// Sort of locals whose sort cannot be inferred
    pub local_default_sort: Sort,
    pub missing_else: MissingElse,
}

impl Default for TranslatorOptions {
    fn default() -> Self {
        TranslatorOptions {
            dt_name: "dt".to_string(),
            local_default_sort: Sort::Real,
            missing_else: MissingElse::default(),
        }
    }
}

/// Constraints of one update. `return` writes the update's target port.
pub fn translate_update(
    model: &Model,
    table: &mut SymbolTable,
    options: &TranslatorOptions,
    update: UpdateId,
    function: &UpdateFunction,
) -> Result<Body, TranslationError> {
    let record = model.update(update);
    let body = Converter::new(model, table, options, record.entity, Modifier::Update(update))
        .with_target(record.target)
        .with_function(function)
        .translate_body(&function.body)?;
    debug!(
        update = %model.modifier_name(Modifier::Update(update)),
        constraints = body.constraints.len(),
        passthrough = body.passthrough.len(),
        "translated update"
    );
    Ok(body)
}

/// `target == source`, reconciling sorts like an assignment
pub fn translate_influence(
    model: &Model,
    table: &mut SymbolTable,
    influence: InfluenceId,
) -> Result<Term, TranslationError> {
    let record = model.influence(influence);
    let target = table.port(model, record.target, Version::Current)?;
    let source = table.entry_value(model, record.source)?;
    let source = match (target.sort(), source.sort()) {
        (Sort::Real, Sort::Int) => Term::to_real(source)?,
        (Sort::Int, Sort::Real) => {
            return Err(TranslationError::Narrowing {
                name: model.modifier_name(Modifier::Influence(influence)),
            })
        }
        _ => source,
    };
    let constraint = Term::eq(target, source)?;
    table.mark_written(record.target);
    debug!(
        influence = %model.modifier_name(Modifier::Influence(influence)),
        %constraint,
        "translated influence"
    );
    Ok(constraint)
}
