//! SMT-LIB script assembly
//!
//! Collects constraints and renders them, together with the declarations
//! they need, as a self-contained SMT-LIB v2 script. Source text that could
//! not be translated is carried along and refused at assembly.

use std::fmt::Write;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use super::term::{quote_symbol, EnumSort, Sort, Term};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("cannot assemble a script holding untranslated syntax: {}", .0.join("; "))]
    Untranslated(Vec<String>),
}

#[derive(Debug, Clone, Default)]
pub struct Script {
    constraints: Vec<Term>,
    untranslated: Vec<String>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, constraint: Term) {
        self.constraints.push(constraint);
    }

    pub fn extend(&mut self, constraints: impl IntoIterator<Item = Term>) {
        self.constraints.extend(constraints);
    }

    /// Carry source text that has no constraint
    pub fn pass_through(&mut self, text: impl Into<String>) {
        self.untranslated.push(text.into());
    }

    pub fn constraints(&self) -> &[Term] {
        &self.constraints
    }

    pub fn untranslated(&self) -> &[String] {
        &self.untranslated
    }

    /// Number of constraints
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty() && self.untranslated.is_empty()
    }

    /// Fails when any untranslated syntax was carried along
    pub fn validate(&self) -> Result<(), ScriptError> {
        if self.untranslated.is_empty() {
            Ok(())
        } else {
            Err(ScriptError::Untranslated(self.untranslated.clone()))
        }
    }

    /// Validate and render
    pub fn assemble(&self) -> Result<String, ScriptError> {
        self.validate()?;
        Ok(self.to_smtlib())
    }

    /// Enumeration sorts mentioned anywhere in the constraints
    pub fn enum_sorts(&self) -> IndexSet<Arc<EnumSort>> {
        let mut sorts = IndexSet::new();
        for c in &self.constraints {
            c.collect_enum_sorts(&mut sorts);
        }
        sorts
    }

    /// Symbolic constants mentioned anywhere in the constraints
    pub fn variables(&self) -> IndexMap<String, Sort> {
        let mut vars = IndexMap::new();
        for c in &self.constraints {
            c.collect_vars(&mut vars);
        }
        vars
    }

    /// Render the full script, ending in `(check-sat)`. Untranslated text
    /// is not rendered.
    pub fn to_smtlib(&self) -> String {
        let mut out = String::new();
        for sort in self.enum_sorts() {
            let constructors = sort
                .variants
                .iter()
                .map(|v| format!("({})", quote_symbol(v)))
                .collect::<Vec<_>>()
                .join(" ");
            let _ = writeln!(
                out,
                "(declare-datatype {} ({}))",
                quote_symbol(&sort.name),
                constructors
            );
        }
        for (name, sort) in self.variables() {
            let sort_name = match &sort {
                Sort::Enum(e) => quote_symbol(&e.name),
                other => other.to_string(),
            };
            let _ = writeln!(out, "(declare-const {} {})", quote_symbol(&name), sort_name);
        }
        for c in &self.constraints {
            let _ = writeln!(out, "(assert {})", c);
        }
        out.push_str("(check-sat)\n");
        out
    }
}

impl FromIterator<Term> for Script {
    fn from_iter<I: IntoIterator<Item = Term>>(iter: I) -> Self {
        Script {
            constraints: iter.into_iter().collect(),
            untranslated: Vec::new(),
        }
    }
}
