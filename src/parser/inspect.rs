//! Static queries over lowered update bodies
//!
//! - `accessed_ports`: the read set of an update, resolved to port ids
//! - `BlockPlan`: per-block write tables used for variable versioning

use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};

use super::ast::Node;
use super::lower::UpdateFunction;
use crate::model::{EntityId, Model, PortId};

/// Reduce `receiver.a.b.value` to the port path `a.b`.
pub fn port_path(receiver: Option<&str>, segments: &[String]) -> Option<String> {
    match segments {
        [base, middle @ .., last] if Some(base.as_str()) == receiver && last == "value" && !middle.is_empty() => {
            Some(middle.join("."))
        }
        _ => None,
    }
}

/// Every port read anywhere in the body, resolved against `entity`.
/// Paths that do not name a port are ignored.
pub fn accessed_ports(model: &Model, entity: EntityId, function: &UpdateFunction) -> IndexSet<PortId> {
    let mut reads = Vec::new();
    for stmt in &function.body {
        collect_reads(stmt, &mut reads);
    }
    reads
        .into_iter()
        .filter_map(|segments| port_path(function.receiver.as_deref(), segments))
        .filter_map(|path| model.resolve_port_path(entity, &path))
        .collect()
}

fn collect_reads<'a>(node: &'a Node, out: &mut Vec<&'a [String]>) {
    match node {
        Node::Literal(_) | Node::Name(_) | Node::Unsupported(_) => {}
        Node::Attribute(segments) => out.push(segments),
        Node::Assign { value, .. } => collect_reads(value, out),
        Node::AugAssign { target, value, .. } => {
            collect_reads(target, out);
            collect_reads(value, out);
        }
        Node::UnaryOp { operand, .. } => collect_reads(operand, out),
        Node::BinOp { left, right, .. } => {
            collect_reads(left, out);
            collect_reads(right, out);
        }
        Node::BoolOp { values, .. } => values.iter().for_each(|v| collect_reads(v, out)),
        Node::Compare {
            left, comparators, ..
        } => {
            collect_reads(left, out);
            comparators.iter().for_each(|c| collect_reads(c, out));
        }
        Node::IfExpr { test, body, orelse } => {
            collect_reads(test, out);
            collect_reads(body, out);
            collect_reads(orelse, out);
        }
        Node::IfStmt { test, body, orelse } => {
            collect_reads(test, out);
            body.iter().for_each(|s| collect_reads(s, out));
            orelse.iter().flatten().for_each(|s| collect_reads(s, out));
        }
        Node::Return(value) => {
            if let Some(value) = value {
                collect_reads(value, out);
            }
        }
        Node::Block(stmts) => stmts.iter().for_each(|s| collect_reads(s, out)),
    }
}

/// Keys written by one statement, in first-write order. An `if` statement
/// writes everything either arm writes.
pub fn written_keys<K, F>(node: &Node, key_of: &F) -> IndexSet<K>
where
    K: Hash + Eq,
    F: Fn(&Node) -> Option<K>,
{
    let mut keys = IndexSet::new();
    collect_writes(node, key_of, &mut keys);
    keys
}

fn collect_writes<K, F>(node: &Node, key_of: &F, out: &mut IndexSet<K>)
where
    K: Hash + Eq,
    F: Fn(&Node) -> Option<K>,
{
    match node {
        Node::Assign { targets, .. } => out.extend(targets.iter().filter_map(key_of)),
        Node::AugAssign { target, .. } => out.extend(key_of(target)),
        Node::IfStmt { body, orelse, .. } => {
            for stmt in body.iter().chain(orelse.iter().flatten()) {
                collect_writes(stmt, key_of, out);
            }
        }
        Node::Block(stmts) => stmts.iter().for_each(|s| collect_writes(s, key_of, out)),
        _ => {}
    }
}

/// Write table of one flat statement block: for every key, the ascending
/// indices of the statements that write it.
#[derive(Debug, Clone)]
pub struct BlockPlan<K> {
    writes: IndexMap<K, Vec<usize>>,
    len: usize,
}

impl<K: Hash + Eq> BlockPlan<K> {
    pub fn build<F>(stmts: &[&Node], key_of: &F) -> Self
    where
        F: Fn(&Node) -> Option<K>,
    {
        Self::from_writes(stmts, |stmt| written_keys(stmt, key_of))
    }

    /// Build from a caller-supplied per-statement write set
    pub fn from_writes<F>(stmts: &[&Node], mut writes_of: F) -> Self
    where
        F: FnMut(&Node) -> IndexSet<K>,
    {
        let mut writes: IndexMap<K, Vec<usize>> = IndexMap::new();
        for (index, stmt) in stmts.iter().enumerate() {
            for key in writes_of(stmt) {
                writes.entry(key).or_default().push(index);
            }
        }
        BlockPlan {
            writes,
            len: stmts.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn writers(&self, key: &K) -> &[usize] {
        self.writes.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Writes strictly before statement `index`
    pub fn previous(&self, key: &K, index: usize) -> usize {
        self.writers(key).partition_point(|&w| w < index)
    }

    pub fn writes(&self, key: &K) -> bool {
        self.writes.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.writes.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Domain, ModelBuilder, PortKind, Value};
    use crate::parser::ast::BinaryOp;
    use crate::parser::parse_function;

    fn local_key(node: &Node) -> Option<String> {
        match node {
            Node::Name(name) => Some(name.clone()),
            _ => None,
        }
    }

    #[test]
    fn test_port_path() {
        let segs = |p: &str| p.split('.').map(str::to_string).collect::<Vec<_>>();
        assert_eq!(port_path(Some("self"), &segs("self.port.value")).as_deref(), Some("port"));
        assert_eq!(port_path(Some("s"), &segs("s.sub.port.value")).as_deref(), Some("sub.port"));
        assert_eq!(port_path(Some("self"), &segs("other.port.value")), None);
        assert_eq!(port_path(Some("self"), &segs("self.port")), None);
        assert_eq!(port_path(Some("self"), &segs("self.value")), None);
    }

    #[test]
    fn test_block_plan_counts() {
        let body = vec![
            Node::assign(Node::name("x"), Node::int(1)),
            Node::assign(Node::name("y"), Node::name("x")),
            Node::aug_assign(Node::name("x"), BinaryOp::Add, Node::int(2)),
            Node::IfStmt {
                test: Box::new(Node::name("c")),
                body: vec![Node::assign(Node::name("x"), Node::int(3))],
                orelse: Some(vec![Node::assign(Node::name("z"), Node::int(4))]),
            },
            Node::ret(Node::name("x")),
        ];
        let refs: Vec<&Node> = body.iter().collect();
        let plan = BlockPlan::build(&refs, &local_key);

        let x = "x".to_string();
        assert_eq!(plan.writers(&x), &[0, 2, 3]);
        assert_eq!(plan.previous(&x, 2), 1);
        assert_eq!(plan.previous(&x, 3), 2);
        assert_eq!(plan.previous(&x, 4), 3);
        assert!(plan.writes(&"z".to_string()));
        assert!(!plan.writes(&"c".to_string()));
        assert_eq!(plan.len(), 5);
    }

    #[test]
    fn test_accessed_ports_excludes_writes() {
        let mut b = ModelBuilder::new();
        let r = b.resource("r", Domain::Integer).unwrap();
        let e = b.entity("e", None).unwrap();
        let a = b.port(e, "a", PortKind::Input, r, Value::Int(0)).unwrap();
        let out = b.port(e, "out", PortKind::Output, r, Value::Int(0)).unwrap();
        let sub = b.entity("sub", Some(e)).unwrap();
        let s_out = b.port(sub, "out", PortKind::Output, r, Value::Int(0)).unwrap();
        let model = b.build();

        let f = parse_function(
            "fn update(&self, dt: f64) -> i64 {
                self.out.value = 3;
                let x = self.a.value + self.sub.out.value;
                if self.a.value > 0 { x = self.missing.value; } else { x = 1; }
                x
            }",
        )
        .unwrap();
        let ports = accessed_ports(&model, e, &f);
        assert_eq!(ports.into_iter().collect::<Vec<_>>(), vec![a, s_out]);
        assert_ne!(out, s_out);
    }
}
