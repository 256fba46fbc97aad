//! Whole-step translation
//!
//! Orders the modifiers of an entity and translates them, in that order,
//! against one symbol table, so that a port written by an earlier modifier
//! is read through its post-step variable by every later one. Subentities
//! are translated in place, following their own modifier order.

use tracing::{debug, info_span};

use crate::cache::BodyCache;
use crate::error::Result;
use crate::model::{EntityId, Model, Modifier};
use crate::schedule::order;
use crate::smt::{Rational, Script, Term};
use crate::translator::{translate_influence, translate_update, SymbolTable, TranslationError, TranslatorOptions};

/// Constraints contributed by one update or influence
#[derive(Debug, Clone, PartialEq)]
pub struct ModifierConstraints {
    pub modifier: Modifier,
    /// `entity.path.modifier`
    pub name: String,
    pub constraints: Vec<Term>,
    /// Source text of syntax passed through untranslated
    pub passthrough: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StepTranslation {
    /// In execution order, subentities expanded
    pub modifiers: Vec<ModifierConstraints>,
    /// `dt == value` when the step size is fixed
    pub step_size: Option<Term>,
    /// Every constraint of the step, preceded by the step size if fixed,
    /// plus any untranslated syntax
    pub script: Script,
    pub table: SymbolTable,
}

/// Translate one simulation step of `entity`. With `dt`, the step variable
/// is fixed to that value.
pub fn translate_step(
    model: &Model,
    entity: EntityId,
    options: &TranslatorOptions,
    cache: &mut BodyCache,
    dt: Option<Rational>,
) -> Result<StepTranslation> {
    let mut table = SymbolTable::new(options.dt_name.clone());
    table.seed_entity(model, entity)?;

    let mut modifiers = Vec::new();
    translate_entity(model, entity, options, cache, &mut table, &mut modifiers)?;

    let step_size = match dt {
        Some(dt) => Some(Term::eq(table.step(), Term::real(dt)).map_err(TranslationError::from)?),
        None => None,
    };
    let mut script = Script::new();
    script.extend(step_size.clone());
    for entry in &modifiers {
        script.extend(entry.constraints.iter().cloned());
        for text in &entry.passthrough {
            script.pass_through(format!("{}: {}", entry.name, text));
        }
    }
    debug!(
        entity = %model.entity_path(entity),
        modifiers = modifiers.len(),
        constraints = script.len(),
        untranslated = script.untranslated().len(),
        "translated step"
    );
    Ok(StepTranslation {
        modifiers,
        step_size,
        script,
        table,
    })
}

fn translate_entity(
    model: &Model,
    entity: EntityId,
    options: &TranslatorOptions,
    cache: &mut BodyCache,
    table: &mut SymbolTable,
    out: &mut Vec<ModifierConstraints>,
) -> Result<()> {
    let path = model.entity_path(entity);
    let _span = info_span!("entity", %path).entered();

    for modifier in order(model, entity, cache)? {
        let (constraints, passthrough) = match modifier {
            Modifier::Update(update) => {
                let function = cache.parse(&model.update(update).function)?;
                let body = translate_update(model, table, options, update, &function)?;
                let passthrough: Vec<String> = body.passthrough.iter().map(|n| n.source_text().to_string()).collect();
                (body.constraints, passthrough)
            }
            Modifier::Influence(influence) => (vec![translate_influence(model, table, influence)?], Vec::new()),
            Modifier::Subentity(sub) => {
                translate_entity(model, sub, options, cache, table, out)?;
                continue;
            }
        };
        out.push(ModifierConstraints {
            modifier,
            name: model.modifier_name(modifier),
            constraints,
            passthrough,
        });
    }
    Ok(())
}
