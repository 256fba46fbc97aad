//! JSON model descriptions
//!
//! ```json
//! {
//!   "resources": [
//!     { "name": "electricity", "unit": "W", "domain": "real" },
//!     { "name": "switch", "domain": ["on", "off"] }
//!   ],
//!   "entity": {
//!     "name": "lamp",
//!     "ports": [
//!       { "name": "electricity", "kind": "input", "resource": "electricity", "value": 0 },
//!       { "name": "light", "kind": "output", "resource": "electricity", "value": 0 }
//!     ],
//!     "states": ["on", "off"],
//!     "current": "on",
//!     "updates": [
//!       { "name": "shine", "state": "on", "target": "light",
//!         "function": "|lamp, dt| lamp.electricity.value * 0.9" }
//!     ],
//!     "influences": [],
//!     "subentities": []
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{Domain, EntityId, Model, ModelBuilder, ModelError, PortKind, ResourceId, Value};
use crate::error::Error;
use crate::smt::Rational;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefinition {
    #[serde(default)]
    pub resources: Vec<ResourceDefinition>,
    pub entity: EntityDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub domain: DomainDefinition,
}

/// `"integer"`, `"real"`, `"boolean"` or a list of enumeration tags
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DomainDefinition {
    Named(String),
    Enumeration(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    #[serde(default)]
    pub ports: Vec<PortDefinition>,
    #[serde(default)]
    pub states: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    #[serde(default)]
    pub updates: Vec<UpdateDefinition>,
    #[serde(default)]
    pub influences: Vec<InfluenceDefinition>,
    #[serde(default)]
    pub subentities: Vec<EntityDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDefinition {
    pub name: String,
    pub kind: PortKindDefinition,
    pub resource: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKindDefinition {
    Input,
    Output,
    Local,
}

impl From<PortKindDefinition> for PortKind {
    fn from(kind: PortKindDefinition) -> Self {
        match kind {
            PortKindDefinition::Input => PortKind::Input,
            PortKindDefinition::Output => PortKind::Output,
            PortKindDefinition::Local => PortKind::Local,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDefinition {
    pub name: String,
    pub state: String,
    pub target: String,
    pub function: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluenceDefinition {
    pub name: String,
    /// Port path relative to the entity, e.g. `"sub.output"`
    pub source: String,
    pub target: String,
}

impl ModelDefinition {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Read a JSON model description from disk.
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Build the arena, returning it with the root entity.
    pub fn build(&self) -> Result<(Model, EntityId), ModelError> {
        let mut builder = ModelBuilder::new();
        let mut resources = HashMap::new();
        for resource in &self.resources {
            let domain = resource.domain.to_domain(&resource.name)?;
            let id = match &resource.unit {
                Some(unit) => builder.resource_with_unit(&resource.name, unit, domain)?,
                None => builder.resource(&resource.name, domain)?,
            };
            resources.insert(resource.name.clone(), id);
        }
        let root = build_entity(&mut builder, &resources, &self.entity, None)?;
        Ok((builder.build(), root))
    }
}

impl DomainDefinition {
    fn to_domain(&self, resource: &str) -> Result<Domain, ModelError> {
        match self {
            DomainDefinition::Enumeration(tags) => Ok(Domain::Enumeration(tags.clone())),
            DomainDefinition::Named(name) => match name.as_str() {
                "integer" | "int" => Ok(Domain::Integer),
                "real" | "float" => Ok(Domain::Real),
                "boolean" | "bool" => Ok(Domain::Boolean),
                other => Err(ModelError::UnsupportedDomain {
                    resource: resource.to_string(),
                    domain: other.to_string(),
                }),
            },
        }
    }
}

fn build_entity(
    builder: &mut ModelBuilder,
    resources: &HashMap<String, ResourceId>,
    def: &EntityDefinition,
    parent: Option<EntityId>,
) -> Result<EntityId, ModelError> {
    let entity = builder.entity(&def.name, parent)?;
    let unknown = |kind: &'static str, name: &str| ModelError::Unknown {
        kind,
        name: name.to_string(),
        entity: def.name.clone(),
    };

    for port in &def.ports {
        let resource = *resources
            .get(&port.resource)
            .ok_or_else(|| unknown("resource", &port.resource))?;
        let value = json_value(&port.value).ok_or_else(|| ModelError::DomainMismatch {
            port: port.name.clone(),
            value: port.value.to_string(),
            domain: builder.model().resource(resource).domain.clone(),
        })?;
        builder.port(entity, &port.name, port.kind.into(), resource, value)?;
    }

    for state in &def.states {
        builder.state(entity, state)?;
    }
    if let Some(current) = &def.current {
        let state = builder
            .model()
            .find_state(entity, current)
            .ok_or_else(|| unknown("state", current))?;
        builder.set_current(entity, state)?;
    }

    for sub in &def.subentities {
        build_entity(builder, resources, sub, Some(entity))?;
    }

    for update in &def.updates {
        let state = builder
            .model()
            .find_state(entity, &update.state)
            .ok_or_else(|| unknown("state", &update.state))?;
        let target = builder
            .model()
            .find_port(entity, &update.target)
            .ok_or_else(|| unknown("port", &update.target))?;
        builder.update(entity, &update.name, state, target, &update.function)?;
    }

    for influence in &def.influences {
        let source = builder
            .model()
            .resolve_port_path(entity, &influence.source)
            .ok_or_else(|| unknown("port", &influence.source))?;
        let target = builder
            .model()
            .resolve_port_path(entity, &influence.target)
            .ok_or_else(|| unknown("port", &influence.target))?;
        builder.influence(entity, &influence.name, source, target)?;
    }

    Ok(entity)
}

fn json_value(value: &serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::String(s) => Some(Value::Tag(s.clone())),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Value::Int(i)),
            None => Rational::parse_decimal(&n.to_string()).map(Value::Real),
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const LAMP: &str = r#"{
        "resources": [
            { "name": "electricity", "unit": "W", "domain": "real" },
            { "name": "switch", "domain": ["on", "off"] }
        ],
        "entity": {
            "name": "room",
            "ports": [
                { "name": "power", "kind": "input", "resource": "electricity", "value": 18.1 },
                { "name": "mode", "kind": "local", "resource": "switch", "value": "off" }
            ],
            "subentities": [{
                "name": "lamp",
                "ports": [
                    { "name": "electricity", "kind": "input", "resource": "electricity", "value": 0 },
                    { "name": "light", "kind": "output", "resource": "electricity", "value": 0 }
                ],
                "states": ["on", "off"],
                "current": "off",
                "updates": [
                    { "name": "shine", "state": "on", "target": "light",
                      "function": "|lamp, dt| lamp.electricity.value * 0.9" }
                ]
            }],
            "influences": [
                { "name": "feed", "source": "power", "target": "lamp.electricity" }
            ]
        }
    }"#;

    #[test]
    fn test_build_from_json() {
        let def = ModelDefinition::from_json(LAMP).unwrap();
        let (model, root) = def.build().unwrap();

        assert_eq!(model.entity(root).name, "room");
        let power = model.resolve_port_path(root, "power").unwrap();
        assert_eq!(model.port(power).value, Value::Real(Rational::new(181, 10).unwrap()));

        let lamp = model.find_subentity(root, "lamp").unwrap();
        let off = model.find_state(lamp, "off").unwrap();
        assert_eq!(model.current_state(lamp), Some(off));
        assert_eq!(model.updates(lamp).len(), 1);
        assert_eq!(model.active_updates(lamp).count(), 0);

        let light = model.resolve_port_path(root, "lamp.light").unwrap();
        assert_eq!(model.port(light).value, Value::Real(Rational::zero()));

        let influence = model.influence(model.influences(root)[0]);
        assert_eq!(influence.source, power);
        assert_eq!(model.path_to_port(root, influence.target).as_deref(), Some("lamp.electricity"));
    }

    #[test]
    fn test_unknown_domain_is_rejected() {
        let text = r#"{
            "resources": [{ "name": "text", "domain": "string" }],
            "entity": { "name": "e" }
        }"#;
        let err = ModelDefinition::from_json(text).unwrap().build().unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedDomain { .. }));
    }

    #[test]
    fn test_unknown_references_are_rejected() {
        let text = r#"{
            "resources": [{ "name": "n", "domain": "integer" }],
            "entity": {
                "name": "e",
                "ports": [{ "name": "p", "kind": "output", "resource": "n", "value": 0 }],
                "states": ["s"],
                "updates": [{ "name": "u", "state": "missing", "target": "p", "function": "|e, dt| 1" }]
            }
        }"#;
        let err = ModelDefinition::from_json(text).unwrap().build().unwrap_err();
        assert_eq!(
            err,
            ModelError::Unknown {
                kind: "state",
                name: "missing".into(),
                entity: "e".into()
            }
        );
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(LAMP.as_bytes()).unwrap();
        let definition = ModelDefinition::from_path(file.path()).unwrap();
        assert_eq!(definition.entity.name, "room");

        let mut broken = tempfile::NamedTempFile::new().unwrap();
        broken.write_all(b"{ \"entity\": ").unwrap();
        assert!(matches!(
            ModelDefinition::from_path(broken.path()),
            Err(Error::Json { .. })
        ));
        assert!(matches!(
            ModelDefinition::from_path(Path::new("/nonexistent/model.json")),
            Err(Error::Io { .. })
        ));
    }
}
