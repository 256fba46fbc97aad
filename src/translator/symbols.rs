//! Per-step symbol table
//!
//! Maps a port (by id), a modifier-local variable, or the step variable to
//! its versioned symbolic handles. One table is shared by every modifier
//! translated within a simulation step, so cross-modifier reads of a port
//! see the same symbols.
//!
//! Naming:
//! - port, current (post-step) value: `{port}_{pid}`
//! - port, version k: `{port}_{k}_{pid}`
//! - port, version 0: the port's concrete prior value, never a variable
//! - local: `{name}_{owner}` and `{name}_{k}_{owner}`

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::trace;

use super::TranslationError;
use crate::model::{Domain, EntityId, Model, Modifier, PortId, ResourceId, Value};
use crate::smt::{EnumSort, Rational, Sort, Term};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SymbolKey {
    /// The time step variable
    Step,
    Port(PortId),
    Local { name: String, owner: Modifier },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    /// The unversioned name
    Current,
    Index(u32),
}

impl Version {
    /// Pre-step value of a port
    pub const PRIOR: Version = Version::Index(0);
}

#[derive(Debug, Clone)]
pub struct SymbolTable {
    step_name: String,
    entries: IndexMap<SymbolKey, IndexMap<Version, Term>>,
    enum_sorts: HashMap<ResourceId, Arc<EnumSort>>,
    written: IndexSet<PortId>,
}

impl SymbolTable {
    pub fn new(step_name: impl Into<String>) -> Self {
        let mut table = SymbolTable {
            step_name: step_name.into(),
            entries: IndexMap::new(),
            enum_sorts: HashMap::new(),
            written: IndexSet::new(),
        };
        table.step();
        table
    }

    /// The real-sorted step variable
    pub fn step(&mut self) -> Term {
        let name = self.step_name.clone();
        self.entries
            .entry(SymbolKey::Step)
            .or_default()
            .entry(Version::Current)
            .or_insert_with(|| Term::var(name, Sort::Real))
            .clone()
    }

    /// Symbolic sort of a port, from its resource domain. Enumeration
    /// sorts are shared per resource.
    pub fn sort_of_port(&mut self, model: &Model, port: PortId) -> Sort {
        let resource_id = model.port(port).resource;
        let resource = model.resource(resource_id);
        match &resource.domain {
            Domain::Integer => Sort::Int,
            Domain::Real => Sort::Real,
            Domain::Boolean => Sort::Bool,
            Domain::Enumeration(tags) => Sort::Enum(
                self.enum_sorts
                    .entry(resource_id)
                    .or_insert_with(|| Arc::new(EnumSort::new(resource.name.clone(), tags.clone())))
                    .clone(),
            ),
        }
    }

    /// Handle of `port` at `version`, created on first use.
    pub fn port(&mut self, model: &Model, port: PortId, version: Version) -> Result<Term, TranslationError> {
        let key = SymbolKey::Port(port);
        if let Some(term) = self.get(&key, version) {
            return Ok(term.clone());
        }
        let sort = self.sort_of_port(model, port);
        let record = model.port(port);
        let term = match version {
            Version::Current => Term::var(format!("{}_{}", record.name, port), sort),
            Version::Index(0) => {
                constant(&record.value, &sort).ok_or_else(|| TranslationError::PriorValue {
                    port: record.name.clone(),
                    value: record.value.to_string(),
                    sort: sort.to_string(),
                })?
            }
            Version::Index(k) => Term::var(format!("{}_{}_{}", record.name, k, port), sort),
        };
        trace!(%port, ?version, symbol = %term, "created port symbol");
        self.insert(key, version, term.clone());
        Ok(term)
    }

    /// Handle of a modifier-local variable, created on first use.
    pub fn local(&mut self, name: &str, owner: Modifier, version: Version, sort: &Sort) -> Term {
        let key = SymbolKey::Local {
            name: name.to_string(),
            owner,
        };
        if let Some(term) = self.get(&key, version) {
            return term.clone();
        }
        let symbol = match version {
            Version::Current => format!("{}_{}", name, owner),
            Version::Index(k) => format!("{}_{}_{}", name, k, owner),
        };
        let term = Term::var(symbol, sort.clone());
        trace!(%owner, ?version, symbol = %term, "created local symbol");
        self.insert(key, version, term.clone());
        term
    }

    /// Value of `port` on entry to a modifier: its post-step variable if an
    /// earlier modifier of this step wrote it, otherwise its prior value.
    pub fn entry_value(&mut self, model: &Model, port: PortId) -> Result<Term, TranslationError> {
        if self.is_written(port) {
            self.port(model, port, Version::Current)
        } else {
            self.port(model, port, Version::PRIOR)
        }
    }

    pub fn mark_written(&mut self, port: PortId) {
        self.written.insert(port);
    }

    pub fn is_written(&self, port: PortId) -> bool {
        self.written.contains(&port)
    }

    pub fn written(&self) -> impl Iterator<Item = PortId> + '_ {
        self.written.iter().copied()
    }

    /// Create the current and prior handles of every port of `entity` and
    /// its subentities.
    pub fn seed_entity(&mut self, model: &Model, entity: EntityId) -> Result<(), TranslationError> {
        for port in model.ports(entity) {
            self.port(model, *port, Version::Current)?;
            self.port(model, *port, Version::PRIOR)?;
        }
        for sub in model.entities(entity) {
            self.seed_entity(model, *sub)?;
        }
        Ok(())
    }

    pub fn get(&self, key: &SymbolKey, version: Version) -> Option<&Term> {
        self.entries.get(key)?.get(&version)
    }

    /// Number of handles
    pub fn len(&self) -> usize {
        self.entries.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn symbols(&self) -> impl Iterator<Item = (&SymbolKey, Version, &Term)> {
        self.entries
            .iter()
            .flat_map(|(key, versions)| versions.iter().map(move |(v, t)| (key, *v, t)))
    }

    fn insert(&mut self, key: SymbolKey, version: Version, term: Term) {
        self.entries.entry(key).or_default().insert(version, term);
    }
}

/// Concrete value as a constant of `sort`
fn constant(value: &Value, sort: &Sort) -> Option<Term> {
    match (value, sort) {
        (Value::Int(i), Sort::Int) => Some(Term::int(*i)),
        (Value::Int(i), Sort::Real) => Some(Term::real(Rational::from_int(*i))),
        (Value::Real(r), Sort::Real) => Some(Term::real(r.clone())),
        (Value::Bool(b), Sort::Bool) => Some(Term::bool(*b)),
        (Value::Tag(tag), Sort::Enum(e)) => e.index_of(tag).map(|i| Term::tag(e.clone(), i)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelBuilder, PortKind, UpdateId};

    fn fixture() -> (Model, EntityId, PortId, PortId) {
        let (model, e, temp, mode, _) = fixture_with_update();
        (model, e, temp, mode)
    }

    fn fixture_with_update() -> (Model, EntityId, PortId, PortId, UpdateId) {
        let mut b = ModelBuilder::new();
        let real = b.resource("heat", Domain::Real).unwrap();
        let switch = b.resource("switch", Domain::Enumeration(vec!["on".into(), "off".into()])).unwrap();
        let e = b.entity("heater", None).unwrap();
        let temp = b.port(e, "temp", PortKind::Output, real, Value::Int(20)).unwrap();
        let mode = b.port(e, "mode", PortKind::Input, switch, Value::Tag("off".into())).unwrap();
        let on = b.state(e, "on").unwrap();
        let update = b.update(e, "warm", on, temp, "|h, dt| 21").unwrap();
        (b.build(), e, temp, mode, update)
    }

    #[test]
    fn test_port_handles() {
        let (model, _, temp, mode) = fixture();
        let mut table = SymbolTable::new("dt");

        let current = table.port(&model, temp, Version::Current).unwrap();
        assert_eq!(current.sexpr(), format!("temp_{}", temp));
        assert_eq!(current.sort(), Sort::Real);
        assert_eq!(table.port(&model, temp, Version::PRIOR).unwrap().sexpr(), "20.0");
        assert_eq!(
            table.port(&model, temp, Version::Index(2)).unwrap().sexpr(),
            format!("temp_2_{}", temp)
        );
        assert_eq!(table.port(&model, mode, Version::PRIOR).unwrap().sexpr(), "off");
    }

    #[test]
    fn test_entry_value_tracks_writes() {
        let (model, _, temp, _) = fixture();
        let mut table = SymbolTable::new("dt");
        assert!(table.entry_value(&model, temp).unwrap().is_constant());
        table.mark_written(temp);
        assert_eq!(
            table.entry_value(&model, temp).unwrap(),
            table.port(&model, temp, Version::Current).unwrap()
        );
    }

    #[test]
    fn test_handles_are_reused() {
        let (model, e, temp, _, update) = fixture_with_update();
        let mut table = SymbolTable::new("dt");
        table.seed_entity(&model, e).unwrap();
        let seeded = table.len();
        table.port(&model, temp, Version::Current).unwrap();
        assert_eq!(table.len(), seeded);

        let owner = Modifier::Update(update);
        let a = table.local("var", owner, Version::Index(1), &Sort::Int);
        let b = table.local("var", owner, Version::Index(1), &Sort::Int);
        assert_eq!(a, b);
        assert_eq!(a.sexpr(), "var_1_u0");
        assert_eq!(table.local("var", owner, Version::Current, &Sort::Int).sexpr(), "var_u0");
    }

    #[test]
    fn test_enum_sorts_are_shared_per_resource() {
        let (model, _, _, mode) = fixture();
        let mut table = SymbolTable::new("dt");
        let a = table.sort_of_port(&model, mode);
        let b = table.sort_of_port(&model, mode);
        match (a, b) {
            (Sort::Enum(a), Sort::Enum(b)) => assert!(Arc::ptr_eq(&a, &b)),
            other => panic!("expected enumeration sorts, got {:?}", other),
        }
    }

    #[test]
    fn test_step_variable() {
        let mut table = SymbolTable::new("delta");
        assert_eq!(table.step(), Term::var("delta", Sort::Real));
        assert_eq!(table.len(), 1);
    }
}
