//! Sort inference for modifier-local variables
//!
//! Locals carry no declared type. Their sort is the join of the sorts of
//! every value assigned to them (`Int ⊔ Real = Real`). A local that is only
//! ever fed from other unknown locals takes its sort from the context it
//! flows into (a `return`, or an assignment to a port); what remains
//! unknown falls back to a configurable default.

use indexmap::IndexMap;
use tracing::trace;

use crate::parser::{BinaryOp, Literal, Node, UnaryOp};
use crate::smt::Sort;

/// Classification of a `Name` or `Attribute` leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Leaf {
    /// Sort fixed by the model (a port, the step variable)
    Sort(Sort),
    Local(String),
    Unknown,
}

pub type Classifier<'a> = dyn FnMut(&Node) -> Leaf + 'a;

/// Infer a sort for every local written in `body`. Locals whose sort cannot
/// be determined are absent from the result.
pub fn infer_local_sorts(body: &[Node], leaf: &mut Classifier<'_>, target_sort: Option<&Sort>) -> IndexMap<String, Sort> {
    let mut sorts = IndexMap::new();
    // the second pass picks up locals assigned from locals declared later
    for _ in 0..2 {
        for stmt in body {
            join_stmt(stmt, leaf, &mut sorts);
        }
    }
    for stmt in body {
        context_stmt(stmt, leaf, target_sort, &mut sorts);
    }
    trace!(?sorts, "inferred local sorts");
    sorts
}

fn record(sorts: &mut IndexMap<String, Sort>, name: String, sort: Option<Sort>) {
    let Some(sort) = sort else {
        return;
    };
    match sorts.get(&name) {
        Some(existing) => {
            if let Some(joined) = existing.join(&sort) {
                sorts.insert(name, joined);
            }
        }
        None => {
            sorts.insert(name, sort);
        }
    }
}

fn join_stmt(stmt: &Node, leaf: &mut Classifier<'_>, sorts: &mut IndexMap<String, Sort>) {
    match stmt {
        Node::Assign { targets, value } => {
            let sort = infer(value, leaf, sorts);
            for target in targets {
                if let Leaf::Local(name) = leaf(target) {
                    record(sorts, name, sort.clone());
                }
            }
        }
        Node::AugAssign { target, op, value } => {
            if let Leaf::Local(name) = leaf(&**target) {
                let current = sorts.get(&name).cloned();
                let rhs = infer(value, leaf, sorts);
                record(sorts, name, binary(*op, current, rhs));
            }
        }
        Node::IfStmt { body, orelse, .. } => {
            for s in body.iter().chain(orelse.iter().flatten()) {
                join_stmt(s, leaf, sorts);
            }
        }
        Node::Block(stmts) => stmts.iter().for_each(|s| join_stmt(s, leaf, sorts)),
        _ => {}
    }
}

fn context_stmt(stmt: &Node, leaf: &mut Classifier<'_>, target_sort: Option<&Sort>, sorts: &mut IndexMap<String, Sort>) {
    match stmt {
        Node::Return(Some(value)) => {
            if let (Some(sort), Leaf::Local(name)) = (target_sort, leaf(&**value)) {
                sorts.entry(name).or_insert_with(|| sort.clone());
            }
        }
        Node::Assign { targets, value } => {
            let Leaf::Local(name) = leaf(&**value) else {
                return;
            };
            for target in targets {
                if let Leaf::Sort(sort) = leaf(target) {
                    sorts.entry(name.clone()).or_insert(sort);
                }
            }
        }
        Node::IfStmt { body, orelse, .. } => {
            for s in body.iter().chain(orelse.iter().flatten()) {
                context_stmt(s, leaf, target_sort, sorts);
            }
        }
        Node::Block(stmts) => stmts.iter().for_each(|s| context_stmt(s, leaf, target_sort, sorts)),
        _ => {}
    }
}

/// Sort of an expression, if it can be told without translating it
pub fn infer(node: &Node, leaf: &mut Classifier<'_>, sorts: &IndexMap<String, Sort>) -> Option<Sort> {
    match node {
        Node::Literal(Literal::Int(_)) => Some(Sort::Int),
        Node::Literal(Literal::Real(_)) => Some(Sort::Real),
        Node::Literal(Literal::Bool(_)) => Some(Sort::Bool),
        Node::Literal(Literal::Str(_)) => None,
        Node::Name(_) | Node::Attribute(_) => match leaf(node) {
            Leaf::Sort(sort) => Some(sort),
            Leaf::Local(name) => sorts.get(&name).cloned(),
            Leaf::Unknown => None,
        },
        Node::UnaryOp { op, operand } => {
            let sort = infer(operand, leaf, sorts);
            match op {
                UnaryOp::Not | UnaryOp::Identity => sort,
                UnaryOp::Neg => sort.filter(Sort::is_numeric),
            }
        }
        Node::BinOp { op, left, right } => {
            let lhs = infer(left, leaf, sorts);
            let rhs = infer(right, leaf, sorts);
            binary(*op, lhs, rhs)
        }
        Node::BoolOp { .. } | Node::Compare { .. } => Some(Sort::Bool),
        Node::IfExpr { body, orelse, .. } => {
            let then = infer(body, leaf, sorts);
            let otherwise = infer(orelse, leaf, sorts);
            either(then, otherwise)
        }
        _ => None,
    }
}

fn binary(op: BinaryOp, lhs: Option<Sort>, rhs: Option<Sort>) -> Option<Sort> {
    match op {
        BinaryOp::Div => match (lhs, rhs) {
            (Some(Sort::Int), Some(Sort::Int)) => Some(Sort::Int),
            _ => Some(Sort::Real),
        },
        BinaryOp::Mod | BinaryOp::Shl | BinaryOp::Shr => Some(Sort::Int),
        _ => either(lhs, rhs),
    }
}

fn either(lhs: Option<Sort>, rhs: Option<Sort>) -> Option<Sort> {
    match (lhs, rhs) {
        (Some(a), Some(b)) => a.join(&b),
        (Some(a), None) | (None, Some(a)) => Some(a),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_function, CmpOp};
    use crate::smt::Rational;

    /// `self.r.value` is Real, `self.i.value` Int, `dt` Real, other names local
    fn classify(node: &Node) -> Leaf {
        match node {
            Node::Name(name) if name == "dt" => Leaf::Sort(Sort::Real),
            Node::Name(name) => Leaf::Local(name.clone()),
            Node::Attribute(path) if path.join(".") == "self.r.value" => Leaf::Sort(Sort::Real),
            Node::Attribute(path) if path.join(".") == "self.i.value" => Leaf::Sort(Sort::Int),
            _ => Leaf::Unknown,
        }
    }

    fn sorts_of(source: &str, target: Option<Sort>) -> IndexMap<String, Sort> {
        let f = parse_function(source).unwrap();
        infer_local_sorts(&f.body, &mut classify, target.as_ref())
    }

    #[test]
    fn test_literal_sorts() {
        let sorts = sorts_of(
            "fn u(&self, dt: f64) -> f64 { let x = 15; let y = 0.0; let b = x < 3; let z = 5; z }",
            None,
        );
        assert_eq!(sorts.get("x"), Some(&Sort::Int));
        assert_eq!(sorts.get("y"), Some(&Sort::Real));
        assert_eq!(sorts.get("b"), Some(&Sort::Bool));
        assert_eq!(sorts.get("z"), Some(&Sort::Int));
    }

    #[test]
    fn test_widening_join() {
        let sorts = sorts_of(
            "fn u(&self, dt: f64) -> f64 { let y = 0; if self.i.value > 1 { y = 50; } else { y = 0.5; } y += 4.3333; y }",
            None,
        );
        assert_eq!(sorts.get("y"), Some(&Sort::Real));
    }

    #[test]
    fn test_operator_rules() {
        let sorts = sorts_of(
            "fn u(&self, dt: f64) -> f64 { let q = 7 / 2; let r = 7 / 2.0; let m = self.r.value % 2; let s = self.i.value * dt; q }",
            None,
        );
        assert_eq!(sorts.get("q"), Some(&Sort::Int));
        assert_eq!(sorts.get("r"), Some(&Sort::Real));
        assert_eq!(sorts.get("m"), Some(&Sort::Int));
        assert_eq!(sorts.get("s"), Some(&Sort::Real));
    }

    #[test]
    fn test_forward_references_resolve_on_second_pass() {
        let body = vec![
            Node::assign(Node::name("a"), Node::name("b")),
            Node::assign(Node::name("b"), Node::real(Rational::from_int(1))),
        ];
        let sorts = infer_local_sorts(&body, &mut classify, None);
        assert_eq!(sorts.get("a"), Some(&Sort::Real));
    }

    #[test]
    fn test_context_sorts() {
        let body = vec![
            Node::assign(Node::name("a"), Node::name("p")),
            Node::assign(Node::attribute("self.i.value"), Node::name("a")),
            Node::ret(Node::name("q")),
        ];
        let sorts = infer_local_sorts(&body, &mut classify, Some(&Sort::Real));
        assert_eq!(sorts.get("a"), Some(&Sort::Int));
        assert_eq!(sorts.get("q"), Some(&Sort::Real));
        assert_eq!(sorts.get("p"), None);
    }

    #[test]
    fn test_context_does_not_override_inferred_sort() {
        let body = vec![
            Node::assign(Node::name("var"), Node::int(15)),
            Node::ret(Node::name("var")),
        ];
        let sorts = infer_local_sorts(&body, &mut classify, Some(&Sort::Real));
        assert_eq!(sorts.get("var"), Some(&Sort::Int));
    }

    #[test]
    fn test_incompatible_join_keeps_first_sort() {
        let body = vec![
            Node::assign(Node::name("b"), Node::compare(Node::int(1), CmpOp::Lt, Node::int(2))),
            Node::assign(Node::name("b"), Node::int(3)),
        ];
        let sorts = infer_local_sorts(&body, &mut classify, None);
        assert_eq!(sorts.get("b"), Some(&Sort::Bool));
    }
}
