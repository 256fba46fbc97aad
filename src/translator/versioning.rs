//! Variable versioning
//!
//! Every write to a name produces a fresh version `P + 1`, where `P` is the
//! number of writes to that name on the current path through the body.
//! Reads see version `P`. With `P == 0` a port read yields the port's entry
//! value and a local read yields the unversioned name (a parameter, or a
//! value with no earlier write).
//!
//! `P` is computed from the block plan of the effective statement sequence
//! being translated plus the counts inherited from enclosing sequences.

use indexmap::IndexMap;

use crate::model::{EntityId, Model, PortId};
use crate::parser::{port_path, BlockPlan, Node};

/// A versioned name: a port (by identity) or a modifier-local variable
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VarKey {
    Port(PortId),
    Local(String),
}

/// Write counts per name, accumulated along a path
pub type Versions = IndexMap<VarKey, u32>;

/// What a name or attribute reference denotes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Port(PortId),
    Local(String),
    /// `receiver.path.value` whose path names no port of the entity
    Unresolved(String),
}

impl Resolution {
    pub fn key(self) -> VarKey {
        match self {
            Resolution::Port(port) => VarKey::Port(port),
            Resolution::Local(name) | Resolution::Unresolved(name) => VarKey::Local(name),
        }
    }
}

/// Resolve a `Name` or `Attribute` node. Attributes must have the shape
/// `receiver.path.value`; anything else does not resolve.
pub fn resolve(model: &Model, entity: EntityId, receiver: Option<&str>, node: &Node) -> Option<Resolution> {
    match node {
        Node::Name(name) => Some(Resolution::Local(name.clone())),
        Node::Attribute(segments) => {
            let path = port_path(receiver, segments)?;
            Some(match model.resolve_port_path(entity, &path) {
                Some(port) => Resolution::Port(port),
                None => Resolution::Unresolved(path),
            })
        }
        _ => None,
    }
}

/// The version a read resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadVersion {
    /// Port never written on this path: its entry value
    Entry,
    /// Local never written on this path: the unversioned name
    Current,
    Index(u32),
}

/// Position of one statement inside an effective sequence
#[derive(Debug, Clone, Copy)]
pub struct Scope<'p> {
    plan: &'p BlockPlan<VarKey>,
    index: usize,
    base: &'p Versions,
}

impl<'p> Scope<'p> {
    pub fn new(plan: &'p BlockPlan<VarKey>, index: usize, base: &'p Versions) -> Self {
        Scope { plan, index, base }
    }

    /// Writes to `key` on the path before this statement
    pub fn previous(&self, key: &VarKey) -> u32 {
        let inherited = self.base.get(key).copied().unwrap_or(0);
        inherited + self.plan.previous(key, self.index) as u32
    }

    pub fn read(&self, key: &VarKey) -> ReadVersion {
        match (self.previous(key), key) {
            (0, VarKey::Port(_)) => ReadVersion::Entry,
            (0, VarKey::Local(_)) => ReadVersion::Current,
            (p, _) => ReadVersion::Index(p),
        }
    }

    pub fn write(&self, key: &VarKey) -> u32 {
        self.previous(key) + 1
    }

    /// Write counts on the path up to (excluding) this statement
    pub fn versions(&self) -> Versions {
        let mut versions = self.base.clone();
        for key in self.plan.keys() {
            let count = self.plan.previous(key, self.index) as u32;
            if count > 0 {
                *versions.entry(key.clone()).or_insert(0) += count;
            }
        }
        versions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Domain, ModelBuilder, PortKind, Value};
    use crate::parser::{written_keys, BinaryOp};

    fn local(name: &str) -> VarKey {
        VarKey::Local(name.to_string())
    }

    fn key_of(node: &Node) -> Option<VarKey> {
        match node {
            Node::Name(name) => Some(local(name)),
            _ => None,
        }
    }

    fn plan(body: &[Node]) -> BlockPlan<VarKey> {
        let refs: Vec<&Node> = body.iter().collect();
        BlockPlan::from_writes(&refs, |n| written_keys(n, &key_of))
    }

    #[test]
    fn test_chain_of_writes() {
        // var = 15; var += 4; var *= -1; return var
        let body = vec![
            Node::assign(Node::name("var"), Node::int(15)),
            Node::aug_assign(Node::name("var"), BinaryOp::Add, Node::int(4)),
            Node::aug_assign(Node::name("var"), BinaryOp::Mul, Node::int(-1)),
            Node::ret(Node::name("var")),
        ];
        let plan = plan(&body);
        let base = Versions::new();
        let var = local("var");

        assert_eq!(Scope::new(&plan, 0, &base).write(&var), 1);
        assert_eq!(Scope::new(&plan, 1, &base).read(&var), ReadVersion::Index(1));
        assert_eq!(Scope::new(&plan, 1, &base).write(&var), 2);
        assert_eq!(Scope::new(&plan, 2, &base).write(&var), 3);
        assert_eq!(Scope::new(&plan, 3, &base).read(&var), ReadVersion::Index(3));
    }

    #[test]
    fn test_unwritten_names() {
        let body = vec![Node::assign(Node::name("x"), Node::name("param"))];
        let plan = plan(&body);
        let base = Versions::new();
        let scope = Scope::new(&plan, 0, &base);
        assert_eq!(scope.read(&local("param")), ReadVersion::Current);
        assert_eq!(scope.read(&local("x")), ReadVersion::Current);
    }

    #[test]
    fn test_inherited_counts() {
        let body = vec![
            Node::aug_assign(Node::name("y"), BinaryOp::Add, Node::int(1)),
            Node::ret(Node::name("y")),
        ];
        let plan = plan(&body);
        let mut base = Versions::new();
        base.insert(local("y"), 2);

        let first = Scope::new(&plan, 0, &base);
        assert_eq!(first.read(&local("y")), ReadVersion::Index(2));
        assert_eq!(first.write(&local("y")), 3);
        let end = Scope::new(&plan, 2, &base);
        assert_eq!(end.versions().get(&local("y")), Some(&3));
    }

    #[test]
    fn test_port_reads_default_to_entry_value() {
        let mut b = ModelBuilder::new();
        let r = b.resource("r", Domain::Integer).unwrap();
        let e = b.entity("e", None).unwrap();
        let p = b.port(e, "p", PortKind::Input, r, Value::Int(3)).unwrap();
        let model = b.build();

        let attr = Node::attribute("self.p.value");
        let resolved = resolve(&model, e, Some("self"), &attr).unwrap();
        assert_eq!(resolved, Resolution::Port(p));

        let plan = BlockPlan::<VarKey>::from_writes(&[], |_| Default::default());
        let base = Versions::new();
        assert_eq!(Scope::new(&plan, 0, &base).read(&VarKey::Port(p)), ReadVersion::Entry);

        let missing = Node::attribute("self.q.value");
        assert_eq!(
            resolve(&model, e, Some("self"), &missing),
            Some(Resolution::Unresolved("q".into()))
        );
        assert_eq!(resolve(&model, e, Some("self"), &Node::attribute("other.p.value")), None);
    }
}
