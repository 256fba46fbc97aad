//! Hybrid system model: resources, ports, entities and their modifiers
//!
//! Everything lives in one arena (`Model`) and is addressed by a `Copy`
//! surrogate id handed out at construction time. Identity is always the id:
//! two ports with the same name on different entities never compare equal.
//!
//! This module contains:
//! - the arena and its read-only queries (`Model`)
//! - `ModelBuilder`: validated construction
//! - `definition`: the JSON description format

pub mod definition;

use std::fmt;

use thiserror::Error;

use crate::smt::Rational;

pub use definition::{EntityDefinition, ModelDefinition};

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(usize);

        impl $name {
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// Handle of a `Resource`
    ResourceId,
    "r"
);
arena_id!(
    /// Handle of a `Port`
    PortId,
    "p"
);
arena_id!(
    /// Handle of an `Entity`
    EntityId,
    "e"
);
arena_id!(UpdateId, "u");
arena_id!(InfluenceId, "i");
arena_id!(StateId, "s");

/// Value domain of a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Domain {
    Integer,
    Real,
    Boolean,
    /// Finite enumeration, in declaration order
    Enumeration(Vec<String>),
}

impl Domain {
    /// Check `value` against the domain, widening integers into real domains.
    pub fn admit(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (Domain::Integer, v @ Value::Int(_)) => Some(v),
            (Domain::Real, Value::Int(i)) => Some(Value::Real(Rational::from_int(i))),
            (Domain::Real, v @ Value::Real(_)) => Some(v),
            (Domain::Boolean, v @ Value::Bool(_)) => Some(v),
            (Domain::Enumeration(tags), Value::Tag(t)) if tags.contains(&t) => Some(Value::Tag(t)),
            _ => None,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Integer => f.write_str("integer"),
            Domain::Real => f.write_str("real"),
            Domain::Boolean => f.write_str("boolean"),
            Domain::Enumeration(tags) => write!(f, "{{{}}}", tags.join(", ")),
        }
    }
}

/// A concrete port value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Real(Rational),
    Bool(bool),
    Tag(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Real(r) if r.is_integer() => write!(f, "{}.0", r.numer()),
            Value::Real(r) => write!(f, "{}/{}", r.numer(), r.denom()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Tag(t) => write!(f, "\"{}\"", t),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    Input,
    Output,
    Local,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortKind::Input => f.write_str("input"),
            PortKind::Output => f.write_str("output"),
            PortKind::Local => f.write_str("local"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resource {
    pub name: String,
    pub unit: Option<String>,
    pub domain: Domain,
}

#[derive(Debug, Clone)]
pub struct Port {
    pub name: String,
    pub kind: PortKind,
    pub resource: ResourceId,
    pub value: Value,
    pub entity: EntityId,
}

#[derive(Debug, Clone)]
pub struct State {
    pub name: String,
    pub entity: EntityId,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub name: String,
    pub parent: Option<EntityId>,
    ports: Vec<PortId>,
    states: Vec<StateId>,
    current: Option<StateId>,
    updates: Vec<UpdateId>,
    influences: Vec<InfluenceId>,
    subentities: Vec<EntityId>,
}

/// State-gated rule writing one target port through a function body
#[derive(Debug, Clone)]
pub struct Update {
    pub name: String,
    pub entity: EntityId,
    pub state: StateId,
    pub target: PortId,
    /// Rust-syntax source of the body
    pub function: String,
}

/// Ordering-only edge `source -> target`
#[derive(Debug, Clone)]
pub struct Influence {
    pub name: String,
    pub entity: EntityId,
    pub source: PortId,
    pub target: PortId,
}

/// Anything that occupies a non-port node of the dependency graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Modifier {
    Update(UpdateId),
    Influence(InfluenceId),
    Subentity(EntityId),
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modifier::Update(u) => write!(f, "{}", u),
            Modifier::Influence(i) => write!(f, "{}", i),
            Modifier::Subentity(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("{kind} `{name}` is already declared in entity `{entity}`")]
    Duplicate {
        kind: &'static str,
        name: String,
        entity: String,
    },

    #[error("unknown {kind} `{name}` in entity `{entity}`")]
    Unknown {
        kind: &'static str,
        name: String,
        entity: String,
    },

    #[error("{kind} `{name}` does not belong to entity `{entity}`")]
    Foreign {
        kind: &'static str,
        name: String,
        entity: String,
    },

    #[error("value {value} of port `{port}` is outside its domain {domain}")]
    DomainMismatch {
        port: String,
        value: String,
        domain: Domain,
    },

    #[error("resource `{0}` declares an empty enumeration")]
    EmptyEnumeration(String),

    #[error("unsupported resource domain `{domain}` for resource `{resource}`")]
    UnsupportedDomain { resource: String, domain: String },
}

/// Arena owning every model component
#[derive(Debug, Clone, Default)]
pub struct Model {
    resources: Vec<Resource>,
    ports: Vec<Port>,
    entities: Vec<Entity>,
    states: Vec<State>,
    updates: Vec<Update>,
    influences: Vec<Influence>,
}

impl Model {
    pub fn resource(&self, id: ResourceId) -> &Resource {
        &self.resources[id.0]
    }

    pub fn port(&self, id: PortId) -> &Port {
        &self.ports[id.0]
    }

    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.0]
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.0]
    }

    pub fn update(&self, id: UpdateId) -> &Update {
        &self.updates[id.0]
    }

    pub fn influence(&self, id: InfluenceId) -> &Influence {
        &self.influences[id.0]
    }

    /// Entities without a parent
    pub fn roots(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities
            .iter()
            .enumerate()
            .filter(|(_, e)| e.parent.is_none())
            .map(|(i, _)| EntityId(i))
    }

    pub fn ports(&self, entity: EntityId) -> &[PortId] {
        &self.entity(entity).ports
    }

    fn ports_of_kind(&self, entity: EntityId, kind: PortKind) -> Vec<PortId> {
        self.ports(entity)
            .iter()
            .copied()
            .filter(|p| self.port(*p).kind == kind)
            .collect()
    }

    pub fn inputs(&self, entity: EntityId) -> Vec<PortId> {
        self.ports_of_kind(entity, PortKind::Input)
    }

    pub fn outputs(&self, entity: EntityId) -> Vec<PortId> {
        self.ports_of_kind(entity, PortKind::Output)
    }

    pub fn locals(&self, entity: EntityId) -> Vec<PortId> {
        self.ports_of_kind(entity, PortKind::Local)
    }

    /// Ports that can feed an influence inside `entity`: own inputs and
    /// locals, plus outputs of subentities.
    pub fn sources(&self, entity: EntityId) -> Vec<PortId> {
        let mut sources = self.inputs(entity);
        sources.extend(self.locals(entity));
        for sub in self.entities(entity) {
            sources.extend(self.outputs(*sub));
        }
        sources
    }

    /// Ports that an influence inside `entity` can write: own outputs and
    /// locals, plus inputs of subentities.
    pub fn targets(&self, entity: EntityId) -> Vec<PortId> {
        let mut targets = self.outputs(entity);
        targets.extend(self.locals(entity));
        for sub in self.entities(entity) {
            targets.extend(self.inputs(*sub));
        }
        targets
    }

    pub fn states(&self, entity: EntityId) -> &[StateId] {
        &self.entity(entity).states
    }

    pub fn current_state(&self, entity: EntityId) -> Option<StateId> {
        self.entity(entity).current
    }

    pub fn updates(&self, entity: EntityId) -> &[UpdateId] {
        &self.entity(entity).updates
    }

    /// Updates declared for the entity's current state
    pub fn active_updates(&self, entity: EntityId) -> impl Iterator<Item = UpdateId> + '_ {
        let current = self.current_state(entity);
        self.updates(entity)
            .iter()
            .copied()
            .filter(move |u| Some(self.update(*u).state) == current)
    }

    pub fn influences(&self, entity: EntityId) -> &[InfluenceId] {
        &self.entity(entity).influences
    }

    /// Direct subentities
    pub fn entities(&self, entity: EntityId) -> &[EntityId] {
        &self.entity(entity).subentities
    }

    pub fn find_state(&self, entity: EntityId, name: &str) -> Option<StateId> {
        self.states(entity)
            .iter()
            .copied()
            .find(|s| self.state(*s).name == name)
    }

    pub fn find_port(&self, entity: EntityId, name: &str) -> Option<PortId> {
        self.ports(entity)
            .iter()
            .copied()
            .find(|p| self.port(*p).name == name)
    }

    pub fn find_subentity(&self, entity: EntityId, name: &str) -> Option<EntityId> {
        self.entities(entity)
            .iter()
            .copied()
            .find(|e| self.entity(*e).name == name)
    }

    /// Resolve a dotted path such as `"sub.port"` relative to `entity`.
    pub fn resolve_port_path(&self, entity: EntityId, path: &str) -> Option<PortId> {
        let mut segments: Vec<&str> = path.split('.').collect();
        let port = segments.pop()?;
        let mut owner = entity;
        for segment in segments {
            owner = self.find_subentity(owner, segment)?;
        }
        self.find_port(owner, port)
    }

    /// Dotted path of `port` relative to `entity`, if `port` lives in
    /// `entity` or one of its descendants.
    pub fn path_to_port(&self, entity: EntityId, port: PortId) -> Option<String> {
        let mut segments = vec![self.port(port).name.clone()];
        let mut owner = self.port(port).entity;
        while owner != entity {
            segments.push(self.entity(owner).name.clone());
            owner = self.entity(owner).parent?;
        }
        segments.reverse();
        Some(segments.join("."))
    }

    /// Dotted path of `entity` from its root
    pub fn entity_path(&self, entity: EntityId) -> String {
        let mut segments = vec![self.entity(entity).name.as_str()];
        let mut current = self.entity(entity).parent;
        while let Some(parent) = current {
            segments.push(self.entity(parent).name.as_str());
            current = self.entity(parent).parent;
        }
        segments.reverse();
        segments.join(".")
    }

    /// Resolve an entity path as printed by `entity_path`.
    pub fn resolve_entity_path(&self, path: &str) -> Option<EntityId> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut entity = self.roots().find(|e| self.entity(*e).name == first)?;
        for segment in segments {
            entity = self.find_subentity(entity, segment)?;
        }
        Some(entity)
    }

    /// Human-readable name of a modifier: `entity.update`, `entity.influence`
    /// or the subentity path.
    pub fn modifier_name(&self, modifier: Modifier) -> String {
        match modifier {
            Modifier::Update(u) => {
                let update = self.update(u);
                format!("{}.{}", self.entity_path(update.entity), update.name)
            }
            Modifier::Influence(i) => {
                let influence = self.influence(i);
                format!("{}.{}", self.entity_path(influence.entity), influence.name)
            }
            Modifier::Subentity(e) => self.entity_path(e),
        }
    }

    pub fn set_current_state(&mut self, entity: EntityId, state: StateId) -> Result<(), ModelError> {
        if self.state(state).entity != entity {
            return Err(ModelError::Foreign {
                kind: "state",
                name: self.state(state).name.clone(),
                entity: self.entity(entity).name.clone(),
            });
        }
        self.entities[entity.0].current = Some(state);
        Ok(())
    }
}

/// Validated, incremental construction of a `Model`
#[derive(Debug, Default)]
pub struct ModelBuilder {
    model: Model,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn resource(&mut self, name: impl Into<String>, domain: Domain) -> Result<ResourceId, ModelError> {
        let name = name.into();
        if matches!(&domain, Domain::Enumeration(tags) if tags.is_empty()) {
            return Err(ModelError::EmptyEnumeration(name));
        }
        self.model.resources.push(Resource {
            name,
            unit: None,
            domain,
        });
        Ok(ResourceId(self.model.resources.len() - 1))
    }

    pub fn resource_with_unit(
        &mut self,
        name: impl Into<String>,
        unit: impl Into<String>,
        domain: Domain,
    ) -> Result<ResourceId, ModelError> {
        let id = self.resource(name, domain)?;
        self.model.resources[id.0].unit = Some(unit.into());
        Ok(id)
    }

    /// Add an entity, attached as a subentity of `parent` when given.
    pub fn entity(&mut self, name: impl Into<String>, parent: Option<EntityId>) -> Result<EntityId, ModelError> {
        let name = name.into();
        if let Some(parent) = parent {
            if self.model.find_subentity(parent, &name).is_some() {
                return Err(self.duplicate("subentity", &name, parent));
            }
        }
        let id = EntityId(self.model.entities.len());
        self.model.entities.push(Entity {
            name,
            parent,
            ports: Vec::new(),
            states: Vec::new(),
            current: None,
            updates: Vec::new(),
            influences: Vec::new(),
            subentities: Vec::new(),
        });
        if let Some(parent) = parent {
            self.model.entities[parent.0].subentities.push(id);
        }
        Ok(id)
    }

    pub fn port(
        &mut self,
        entity: EntityId,
        name: impl Into<String>,
        kind: PortKind,
        resource: ResourceId,
        value: Value,
    ) -> Result<PortId, ModelError> {
        let name = name.into();
        if self.model.find_port(entity, &name).is_some() {
            return Err(self.duplicate("port", &name, entity));
        }
        let domain = &self.model.resource(resource).domain;
        let value = domain
            .admit(value.clone())
            .ok_or_else(|| ModelError::DomainMismatch {
                port: name.clone(),
                value: value.to_string(),
                domain: domain.clone(),
            })?;
        let id = PortId(self.model.ports.len());
        self.model.ports.push(Port {
            name,
            kind,
            resource,
            value,
            entity,
        });
        self.model.entities[entity.0].ports.push(id);
        Ok(id)
    }

    /// Add a state. The first state of an entity becomes its current state.
    pub fn state(&mut self, entity: EntityId, name: impl Into<String>) -> Result<StateId, ModelError> {
        let name = name.into();
        if self.model.find_state(entity, &name).is_some() {
            return Err(self.duplicate("state", &name, entity));
        }
        let id = StateId(self.model.states.len());
        self.model.states.push(State { name, entity });
        let record = &mut self.model.entities[entity.0];
        record.states.push(id);
        if record.current.is_none() {
            record.current = Some(id);
        }
        Ok(id)
    }

    pub fn set_current(&mut self, entity: EntityId, state: StateId) -> Result<(), ModelError> {
        self.model.set_current_state(entity, state)
    }

    pub fn update(
        &mut self,
        entity: EntityId,
        name: impl Into<String>,
        state: StateId,
        target: PortId,
        function: impl Into<String>,
    ) -> Result<UpdateId, ModelError> {
        let name = name.into();
        if self.model.updates(entity).iter().any(|u| self.model.update(*u).name == name) {
            return Err(self.duplicate("update", &name, entity));
        }
        if self.model.state(state).entity != entity {
            let state_name = self.model.state(state).name.clone();
            return Err(self.foreign("state", &state_name, entity));
        }
        if self.model.port(target).entity != entity {
            let port_name = self.model.port(target).name.clone();
            return Err(self.foreign("port", &port_name, entity));
        }
        let id = UpdateId(self.model.updates.len());
        self.model.updates.push(Update {
            name,
            entity,
            state,
            target,
            function: function.into(),
        });
        self.model.entities[entity.0].updates.push(id);
        Ok(id)
    }

    /// Add an influence. `source` must be one of `sources(entity)` and
    /// `target` one of `targets(entity)`.
    pub fn influence(
        &mut self,
        entity: EntityId,
        name: impl Into<String>,
        source: PortId,
        target: PortId,
    ) -> Result<InfluenceId, ModelError> {
        let name = name.into();
        if self
            .model
            .influences(entity)
            .iter()
            .any(|i| self.model.influence(*i).name == name)
        {
            return Err(self.duplicate("influence", &name, entity));
        }
        if !self.model.sources(entity).contains(&source) {
            let port_name = self.model.port(source).name.clone();
            return Err(self.foreign("influence source", &port_name, entity));
        }
        if !self.model.targets(entity).contains(&target) {
            let port_name = self.model.port(target).name.clone();
            return Err(self.foreign("influence target", &port_name, entity));
        }
        let id = InfluenceId(self.model.influences.len());
        self.model.influences.push(Influence {
            name,
            entity,
            source,
            target,
        });
        self.model.entities[entity.0].influences.push(id);
        Ok(id)
    }

    pub fn build(self) -> Model {
        self.model
    }

    fn duplicate(&self, kind: &'static str, name: &str, entity: EntityId) -> ModelError {
        ModelError::Duplicate {
            kind,
            name: name.to_string(),
            entity: self.model.entity(entity).name.clone(),
        }
    }

    fn foreign(&self, kind: &'static str, name: &str, entity: EntityId) -> ModelError {
        ModelError::Foreign {
            kind,
            name: name.to_string(),
            entity: self.model.entity(entity).name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        model: Model,
        root: EntityId,
        lamp: EntityId,
        power: PortId,
        lamp_in: PortId,
        lamp_out: PortId,
        light: PortId,
    }

    fn fixture() -> Fixture {
        let mut b = ModelBuilder::new();
        let watt = b.resource_with_unit("electricity", "W", Domain::Real).unwrap();
        let lumen = b.resource("light", Domain::Integer).unwrap();

        let root = b.entity("room", None).unwrap();
        let power = b.port(root, "power", PortKind::Input, watt, Value::Int(100)).unwrap();
        let light = b.port(root, "light", PortKind::Output, lumen, Value::Int(0)).unwrap();

        let lamp = b.entity("lamp", Some(root)).unwrap();
        let lamp_in = b.port(lamp, "electricity", PortKind::Input, watt, Value::Int(0)).unwrap();
        let lamp_out = b.port(lamp, "light", PortKind::Output, lumen, Value::Int(0)).unwrap();
        b.state(lamp, "on").unwrap();

        b.influence(root, "feed", power, lamp_in).unwrap();
        b.influence(root, "shine", lamp_out, light).unwrap();

        Fixture {
            model: b.build(),
            root,
            lamp,
            power,
            lamp_in,
            lamp_out,
            light,
        }
    }

    #[test]
    fn test_sources_and_targets() {
        let f = fixture();
        assert_eq!(f.model.sources(f.root), vec![f.power, f.lamp_out]);
        assert_eq!(f.model.targets(f.root), vec![f.light, f.lamp_in]);
        assert_eq!(f.model.inputs(f.lamp), vec![f.lamp_in]);
        assert_eq!(f.model.outputs(f.lamp), vec![f.lamp_out]);
        assert!(f.model.locals(f.lamp).is_empty());
    }

    #[test]
    fn test_port_paths() {
        let f = fixture();
        assert_eq!(f.model.path_to_port(f.root, f.lamp_in).as_deref(), Some("lamp.electricity"));
        assert_eq!(f.model.path_to_port(f.root, f.power).as_deref(), Some("power"));
        assert_eq!(f.model.path_to_port(f.lamp, f.power), None);
        assert_eq!(f.model.resolve_port_path(f.root, "lamp.light"), Some(f.lamp_out));
        assert_eq!(f.model.resolve_port_path(f.root, "light"), Some(f.light));
        assert_eq!(f.model.resolve_port_path(f.root, "lamp.nothing"), None);
        assert_eq!(f.model.entity_path(f.lamp), "room.lamp");
        assert_eq!(f.model.resolve_entity_path("room.lamp"), Some(f.lamp));
    }

    #[test]
    fn test_same_names_are_distinct_ports() {
        let f = fixture();
        assert_eq!(f.model.port(f.light).name, f.model.port(f.lamp_out).name);
        assert_ne!(f.light, f.lamp_out);
    }

    #[test]
    fn test_domain_admission() {
        assert_eq!(
            Domain::Real.admit(Value::Int(3)),
            Some(Value::Real(Rational::from_int(3)))
        );
        assert_eq!(Domain::Integer.admit(Value::Real(Rational::from_int(3))), None);
        let switch = Domain::Enumeration(vec!["on".into(), "off".into()]);
        assert!(switch.admit(Value::Tag("on".into())).is_some());
        assert!(switch.admit(Value::Tag("dim".into())).is_none());
    }

    #[test]
    fn test_builder_rejects_invalid_components() {
        let mut b = ModelBuilder::new();
        let flag = b.resource("flag", Domain::Boolean).unwrap();
        let e = b.entity("e", None).unwrap();
        let other = b.entity("other", None).unwrap();
        let p = b.port(e, "p", PortKind::Output, flag, Value::Bool(false)).unwrap();
        let s_other = b.state(other, "s").unwrap();

        assert!(matches!(
            b.port(e, "p", PortKind::Input, flag, Value::Bool(true)),
            Err(ModelError::Duplicate { .. })
        ));
        assert!(matches!(
            b.port(e, "q", PortKind::Input, flag, Value::Int(1)),
            Err(ModelError::DomainMismatch { .. })
        ));
        assert!(matches!(
            b.update(e, "u", s_other, p, "|s, dt| true"),
            Err(ModelError::Foreign { .. })
        ));
        assert!(matches!(
            b.resource("empty", Domain::Enumeration(vec![])),
            Err(ModelError::EmptyEnumeration(_))
        ));
    }

    #[test]
    fn test_active_updates_follow_current_state() {
        let mut b = ModelBuilder::new();
        let r = b.resource("r", Domain::Integer).unwrap();
        let e = b.entity("e", None).unwrap();
        let p = b.port(e, "p", PortKind::Output, r, Value::Int(0)).unwrap();
        let on = b.state(e, "on").unwrap();
        let off = b.state(e, "off").unwrap();
        let u_on = b.update(e, "u_on", on, p, "|s, dt| 1").unwrap();
        let u_off = b.update(e, "u_off", off, p, "|s, dt| 2").unwrap();
        let mut model = b.build();

        assert_eq!(model.active_updates(e).collect::<Vec<_>>(), vec![u_on]);
        model.set_current_state(e, off).unwrap();
        assert_eq!(model.active_updates(e).collect::<Vec<_>>(), vec![u_off]);
    }
}
