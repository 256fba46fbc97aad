//! Statement tree → SMT term translation
//!
//! One `Converter` translates the body of one modifier against a shared
//! `SymbolTable`. Statement sequences are walked path by path: an `if`
//! statement duplicates every statement that follows it into both arms, so
//! each arm is a complete constraint sequence and the `if` becomes a single
//! `ite` over the two conjunctions.
//!
//! Ports written on a path are closed at the end of the path by equating
//! their post-step variable with their latest version.
//!
//! Syntax outside the supported subset is logged and passed through. An
//! unsupported statement contributes no constraint, and an unsupported value
//! assigned or returned as a whole leaves its handle unconstrained. Using one
//! inside a larger expression fails where that expression's term is built.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use super::sorts::{infer_local_sorts, Leaf};
use super::symbols::{SymbolTable, Version};
use super::versioning::{resolve, ReadVersion, Resolution, Scope, VarKey, Versions};
use super::{MissingElse, TranslationError, TranslatorOptions};
use crate::model::{EntityId, Model, Modifier, PortId};
use crate::parser::{written_keys, BinaryOp, BlockPlan, BoolOp, CmpOp, Literal, Node, UnaryOp, UpdateFunction};
use crate::smt::{EnumSort, Op, Sort, Term};

type Result<T> = std::result::Result<T, TranslationError>;

/// Outcome of translating a single node
#[derive(Debug, Clone, PartialEq)]
pub enum Translation {
    /// An expression
    Value(Term),
    /// A string literal with no enumeration context yet
    Tag(String),
    /// The constraints of a statement
    Constraints(Vec<Term>),
    /// Syntax the translator does not understand, returned unchanged
    Passthrough(Node),
}

/// Translated body of one modifier
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Body {
    pub constraints: Vec<Term>,
    /// Unsupported nodes, in the order they were met
    pub passthrough: Vec<Node>,
}

#[derive(Debug, Clone)]
enum Operand {
    Term(Term),
    Tag(String),
    Opaque(Node),
}

pub struct Converter<'a> {
    model: &'a Model,
    table: &'a mut SymbolTable,
    options: &'a TranslatorOptions,
    entity: EntityId,
    modifier: Modifier,
    target: Option<PortId>,
    receiver: Option<String>,
    step_param: Option<String>,
    declared: IndexMap<String, Sort>,
    local_sorts: IndexMap<String, Sort>,
    written_ports: IndexSet<PortId>,
    passthrough: Vec<Node>,
}

impl<'a> Converter<'a> {
    pub fn new(
        model: &'a Model,
        table: &'a mut SymbolTable,
        options: &'a TranslatorOptions,
        entity: EntityId,
        modifier: Modifier,
    ) -> Self {
        Converter {
            model,
            table,
            options,
            entity,
            modifier,
            target: None,
            receiver: None,
            step_param: None,
            declared: IndexMap::new(),
            local_sorts: IndexMap::new(),
            written_ports: IndexSet::new(),
            passthrough: Vec::new(),
        }
    }

    /// Port that `return` writes
    pub fn with_target(mut self, target: PortId) -> Self {
        self.target = Some(target);
        self
    }

    /// Take the receiver, step parameter and declared local sorts from a
    /// parsed function
    pub fn with_function(mut self, function: &UpdateFunction) -> Self {
        self.receiver = function.receiver.clone();
        self.step_param = function.step_param().map(str::to_string);
        self.declared = function.declared.clone();
        self
    }

    /// Translate a single node in isolation. Expressions yield a value,
    /// statements their constraints, unknown syntax is passed through.
    pub fn translate(&mut self, node: &Node) -> Result<Translation> {
        match node {
            Node::Unsupported(_) => {
                self.pass(node);
                Ok(Translation::Passthrough(node.clone()))
            }
            Node::Assign { .. } | Node::AugAssign { .. } | Node::IfStmt { .. } | Node::Return(_) | Node::Block(_) => {
                let constraints = self.sequence(vec![node], &Versions::new())?;
                Ok(Translation::Constraints(constraints))
            }
            expr => {
                let stmts = [expr];
                let plan = BlockPlan::from_writes(&stmts, |n| self.writes_of(n));
                let base = Versions::new();
                let scope = Scope::new(&plan, 0, &base);
                Ok(match self.expr(expr, &scope, None)? {
                    Operand::Term(term) => Translation::Value(term),
                    Operand::Tag(tag) => Translation::Tag(tag),
                    Operand::Opaque(node) => Translation::Passthrough(node),
                })
            }
        }
    }

    /// Translate a whole body into its constraint sequence. Every port the
    /// body writes is recorded as written in the symbol table.
    pub fn translate_body(&mut self, body: &[Node]) -> Result<Body> {
        self.prepare(body);
        let constraints = self.sequence(body.iter().collect(), &Versions::new())?;
        for port in &self.written_ports {
            self.table.mark_written(*port);
        }
        Ok(Body {
            constraints,
            passthrough: std::mem::take(&mut self.passthrough),
        })
    }

    /// Record an unsupported node once, however many paths reach it
    fn pass(&mut self, node: &Node) {
        if !self.passthrough.contains(node) {
            warn!(modifier = %self.modifier, text = node.source_text(), "passing through unsupported syntax");
            self.passthrough.push(node.clone());
        }
    }

    fn prepare(&mut self, body: &[Node]) {
        let model = self.model;
        let entity = self.entity;
        let receiver = self.receiver.as_deref();
        let step = self.step_param.as_deref();
        let table = &mut *self.table;

        let target_sort = self.target.map(|t| table.sort_of_port(model, t));
        let mut classify = |node: &Node| -> Leaf {
            if let Node::Name(name) = node {
                if Some(name.as_str()) == step {
                    return Leaf::Sort(Sort::Real);
                }
            }
            match resolve(model, entity, receiver, node) {
                Some(Resolution::Port(port)) => Leaf::Sort(table.sort_of_port(model, port)),
                Some(Resolution::Local(name)) | Some(Resolution::Unresolved(name)) => Leaf::Local(name),
                None => Leaf::Unknown,
            }
        };
        let mut sorts = infer_local_sorts(body, &mut classify, target_sort.as_ref());
        // an annotation overrides what the assigned values suggest
        for (name, sort) in &self.declared {
            sorts.insert(name.clone(), sort.clone());
        }

        let mut written = IndexSet::new();
        for stmt in body {
            for key in self.writes_of(stmt) {
                if let VarKey::Port(port) = key {
                    written.insert(port);
                }
            }
        }
        if let Some(target) = self.target {
            if contains_return(body) {
                written.insert(target);
            }
        }
        self.local_sorts = sorts;
        self.written_ports = written;
    }

    /// Translate one effective statement sequence. `base` holds the write
    /// counts inherited from enclosing sequences.
    fn sequence<'n>(&mut self, stmts: Vec<&'n Node>, base: &Versions) -> Result<Vec<Term>> {
        let stmts = flatten(stmts);
        let plan = BlockPlan::from_writes(&stmts, |n| self.writes_of(n));
        let mut out = Vec::new();

        for (index, &stmt) in stmts.iter().enumerate() {
            let scope = Scope::new(&plan, index, base);
            match stmt {
                Node::IfStmt { test, body, orelse } => {
                    let cond = self.term(test, &scope, Some(&Sort::Bool))?;
                    let versions = scope.versions();
                    let trailing = &stmts[index + 1..];
                    let then_seq: Vec<&Node> = body.iter().chain(trailing.iter().copied()).collect();
                    let else_seq: Vec<&Node> = match orelse {
                        Some(orelse) => orelse.iter().chain(trailing.iter().copied()).collect(),
                        None => match self.options.missing_else {
                            MissingElse::Reject => {
                                return Err(TranslationError::MissingElse {
                                    modifier: self.model.modifier_name(self.modifier),
                                })
                            }
                            MissingElse::Empty => trailing.to_vec(),
                        },
                    };
                    let then = self.sequence(then_seq, &versions)?;
                    let otherwise = self.sequence(else_seq, &versions)?;
                    out.push(Term::ite(cond, Term::and(then)?, Term::and(otherwise)?)?);
                    return Ok(out);
                }
                Node::Return(value) => {
                    out.extend(self.close(&scope, true)?);
                    out.extend(self.ret(value.as_deref(), &scope)?);
                    if index + 1 < stmts.len() {
                        debug!(
                            modifier = %self.modifier,
                            skipped = stmts.len() - index - 1,
                            "ignoring statements after return"
                        );
                    }
                    return Ok(out);
                }
                other => out.extend(self.statement(other, &scope)?),
            }
        }

        let end = Scope::new(&plan, stmts.len(), base);
        out.extend(self.close(&end, false)?);
        Ok(out)
    }

    fn statement(&mut self, node: &Node, scope: &Scope<'_>) -> Result<Vec<Term>> {
        match node {
            Node::Assign { targets, value } => {
                let mut handles = Vec::with_capacity(targets.len());
                for target in targets {
                    let key = self.key_of(target).ok_or_else(|| TranslationError::untranslatable(target))?;
                    let handle = self.write_handle(&key, scope.write(&key))?;
                    handles.push((key, handle));
                }
                let hint = handles.first().map(|(_, h)| h.sort());
                let value = self.expr(value, scope, hint.as_ref())?;
                if let Operand::Opaque(_) = value {
                    debug!(modifier = %self.modifier, targets = handles.len(), "leaving assignment unconstrained");
                    return Ok(Vec::new());
                }
                let mut out = Vec::with_capacity(handles.len());
                for (key, handle) in handles {
                    let bound = self.bind(&handle, &key, value.clone())?;
                    out.push(Term::eq(handle, bound)?);
                }
                Ok(out)
            }
            Node::AugAssign { target, op, value } => {
                let key = self.key_of(target).ok_or_else(|| TranslationError::untranslatable(target))?;
                let current = self.read_key(&key, scope)?;
                let rhs = self.term(value, scope, None)?;
                let combined = arithmetic(*op, current, rhs)?;
                let handle = self.write_handle(&key, scope.write(&key))?;
                let bound = self.bind(&handle, &key, Operand::Term(combined))?;
                Ok(vec![Term::eq(handle, bound)?])
            }
            Node::Unsupported(_) => {
                self.pass(node);
                Ok(Vec::new())
            }
            other => Err(TranslationError::untranslatable(other)),
        }
    }

    /// `None` when the returned value is passed through
    fn ret(&mut self, value: Option<&Node>, scope: &Scope<'_>) -> Result<Option<Term>> {
        let modifier = || self.model.modifier_name(self.modifier);
        let Some(target) = self.target else {
            return Err(TranslationError::ReturnWithoutTarget { modifier: modifier() });
        };
        let Some(value) = value else {
            return Err(TranslationError::EmptyReturn { modifier: modifier() });
        };
        let handle = self.table.port(self.model, target, Version::Current)?;
        let value = self.expr(value, scope, Some(&handle.sort()))?;
        if let Operand::Opaque(_) = value {
            return Ok(None);
        }
        let bound = self.bind(&handle, &VarKey::Port(target), value)?;
        Ok(Some(Term::eq(handle, bound)?))
    }

    /// Equate the post-step variable of every written port with the latest
    /// version visible at `scope`.
    fn close(&mut self, scope: &Scope<'_>, before_return: bool) -> Result<Vec<Term>> {
        let mut out = Vec::new();
        let ports: Vec<PortId> = self.written_ports.iter().copied().collect();
        for port in ports {
            if before_return && Some(port) == self.target {
                continue;
            }
            let current = self.table.port(self.model, port, Version::Current)?;
            let latest = self.read_key(&VarKey::Port(port), scope)?;
            if current != latest {
                out.push(Term::eq(current, latest)?);
            }
        }
        Ok(out)
    }

    fn term(&mut self, node: &Node, scope: &Scope<'_>, hint: Option<&Sort>) -> Result<Term> {
        match self.expr(node, scope, hint)? {
            Operand::Term(term) => Ok(term),
            Operand::Tag(tag) => Err(TranslationError::BareTag(tag)),
            Operand::Opaque(node) => Err(TranslationError::untranslatable(&node)),
        }
    }

    /// Translate an expression. `hint` is the sort the value flows into and
    /// only decides how string literals are read.
    fn expr(&mut self, node: &Node, scope: &Scope<'_>, hint: Option<&Sort>) -> Result<Operand> {
        match node {
            Node::Literal(Literal::Int(v)) => Ok(Operand::Term(Term::int(*v))),
            Node::Literal(Literal::Real(r)) => Ok(Operand::Term(Term::real(r.clone()))),
            Node::Literal(Literal::Bool(b)) => Ok(Operand::Term(Term::bool(*b))),
            Node::Literal(Literal::Str(tag)) => match hint {
                Some(Sort::Enum(sort)) => Ok(Operand::Term(tag_term(sort, tag)?)),
                _ => Ok(Operand::Tag(tag.clone())),
            },
            Node::Name(_) | Node::Attribute(_) => self.read(node, scope).map(Operand::Term),
            Node::UnaryOp { op, operand } => {
                if *op == UnaryOp::Identity {
                    return self.expr(operand, scope, hint);
                }
                let operand = self.term(operand, scope, None)?;
                unary(*op, operand).map(Operand::Term)
            }
            Node::BinOp { op, left, right } => {
                let lhs = self.term(left, scope, None)?;
                let rhs = self.term(right, scope, None)?;
                arithmetic(*op, lhs, rhs).map(Operand::Term)
            }
            Node::BoolOp { op, values } => {
                let terms = values
                    .iter()
                    .map(|v| self.term(v, scope, Some(&Sort::Bool)))
                    .collect::<Result<Vec<_>>>()?;
                let term = match op {
                    BoolOp::And => Term::and(terms)?,
                    BoolOp::Or => Term::or(terms)?,
                };
                Ok(Operand::Term(term))
            }
            Node::Compare { left, ops, comparators } => {
                let mut operands = Vec::with_capacity(comparators.len() + 1);
                operands.push(self.expr(left, scope, None)?);
                for comparator in comparators {
                    operands.push(self.expr(comparator, scope, None)?);
                }
                let pairs = ops
                    .iter()
                    .zip(operands.windows(2))
                    .map(|(op, pair)| compare(*op, pair[0].clone(), pair[1].clone()))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Operand::Term(Term::and(pairs)?))
            }
            Node::IfExpr { test, body, orelse } => {
                let cond = self.term(test, scope, Some(&Sort::Bool))?;
                let then = self.expr(body, scope, hint)?;
                let otherwise = self.expr(orelse, scope, hint)?;
                let (then, otherwise) = unify(then, otherwise)?;
                Ok(Operand::Term(Term::ite(cond, then, otherwise)?))
            }
            Node::Unsupported(_) => {
                self.pass(node);
                Ok(Operand::Opaque(node.clone()))
            }
            other => Err(TranslationError::untranslatable(other)),
        }
    }

    fn read(&mut self, node: &Node, scope: &Scope<'_>) -> Result<Term> {
        if let Node::Name(name) = node {
            if self.step_param.as_deref() == Some(name.as_str()) {
                return Ok(self.table.step());
            }
        }
        let key = self.key_of(node).ok_or_else(|| TranslationError::untranslatable(node))?;
        self.read_key(&key, scope)
    }

    fn read_key(&mut self, key: &VarKey, scope: &Scope<'_>) -> Result<Term> {
        match (key, scope.read(key)) {
            (VarKey::Port(port), ReadVersion::Index(k)) => self.table.port(self.model, *port, Version::Index(k)),
            (VarKey::Port(port), _) => self.table.entry_value(self.model, *port),
            (VarKey::Local(name), ReadVersion::Index(k)) => Ok(self.local(name, Version::Index(k))),
            (VarKey::Local(name), _) => Ok(self.local(name, Version::Current)),
        }
    }

    fn write_handle(&mut self, key: &VarKey, version: u32) -> Result<Term> {
        match key {
            VarKey::Port(port) => self.table.port(self.model, *port, Version::Index(version)),
            VarKey::Local(name) => Ok(self.local(name, Version::Index(version))),
        }
    }

    fn local(&mut self, name: &str, version: Version) -> Term {
        let sort = self
            .local_sorts
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.options.local_default_sort.clone());
        self.table.local(name, self.modifier, version, &sort)
    }

    /// Coerce `value` to the sort of `handle`
    fn bind(&self, handle: &Term, key: &VarKey, value: Operand) -> Result<Term> {
        let sort = handle.sort();
        let term = match value {
            Operand::Tag(tag) => match &sort {
                Sort::Enum(e) => return tag_term(e, &tag),
                _ => return Err(TranslationError::BareTag(tag)),
            },
            Operand::Term(term) => term,
            Operand::Opaque(node) => return Err(TranslationError::untranslatable(&node)),
        };
        match (&sort, term.sort()) {
            (Sort::Real, Sort::Int) => Ok(Term::to_real(term)?),
            (Sort::Int, Sort::Real) => Err(TranslationError::Narrowing {
                name: self.key_name(key),
            }),
            _ => Ok(term),
        }
    }

    fn key_name(&self, key: &VarKey) -> String {
        match key {
            VarKey::Port(port) => self
                .model
                .path_to_port(self.entity, *port)
                .unwrap_or_else(|| self.model.port(*port).name.clone()),
            VarKey::Local(name) => name.clone(),
        }
    }

    fn key_of(&self, node: &Node) -> Option<VarKey> {
        let resolution = resolve(self.model, self.entity, self.receiver.as_deref(), node)?;
        if let Resolution::Unresolved(path) = &resolution {
            warn!(modifier = %self.modifier, %path, "no such port, treating as a local variable");
        }
        Some(resolution.key())
    }

    fn quiet_key(&self, node: &Node) -> Option<VarKey> {
        resolve(self.model, self.entity, self.receiver.as_deref(), node).map(Resolution::key)
    }

    fn writes_of(&self, node: &Node) -> IndexSet<VarKey> {
        written_keys(node, &|n: &Node| self.quiet_key(n))
    }
}

fn flatten<'n>(stmts: Vec<&'n Node>) -> Vec<&'n Node> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        match stmt {
            Node::Block(inner) => out.extend(flatten(inner.iter().collect())),
            other => out.push(other),
        }
    }
    out
}

fn contains_return(body: &[Node]) -> bool {
    body.iter().any(|stmt| match stmt {
        Node::Return(_) => true,
        Node::IfStmt { body, orelse, .. } => {
            contains_return(body) || orelse.as_deref().is_some_and(contains_return)
        }
        Node::Block(stmts) => contains_return(stmts),
        _ => false,
    })
}

fn tag_term(sort: &Arc<EnumSort>, tag: &str) -> Result<Term> {
    sort.index_of(tag)
        .map(|index| Term::tag(sort.clone(), index))
        .ok_or_else(|| TranslationError::UnknownTag {
            tag: tag.to_string(),
            sort: sort.name.clone(),
        })
}

/// Widen an `Int` operand meeting a `Real` one
fn widen(lhs: Term, rhs: Term) -> Result<(Term, Term)> {
    match (lhs.sort(), rhs.sort()) {
        (Sort::Int, Sort::Real) => Ok((Term::to_real(lhs)?, rhs)),
        (Sort::Real, Sort::Int) => Ok((lhs, Term::to_real(rhs)?)),
        _ => Ok((lhs, rhs)),
    }
}

fn unify(lhs: Operand, rhs: Operand) -> Result<(Term, Term)> {
    match (lhs, rhs) {
        (Operand::Term(l), Operand::Term(r)) => widen(l, r),
        (Operand::Tag(tag), Operand::Term(r)) => match r.sort() {
            Sort::Enum(e) => Ok((tag_term(&e, &tag)?, r)),
            _ => Err(TranslationError::BareTag(tag)),
        },
        (Operand::Term(l), Operand::Tag(tag)) => match l.sort() {
            Sort::Enum(e) => {
                let r = tag_term(&e, &tag)?;
                Ok((l, r))
            }
            _ => Err(TranslationError::BareTag(tag)),
        },
        (Operand::Tag(tag), Operand::Tag(_)) => Err(TranslationError::BareTag(tag)),
        (Operand::Opaque(node), _) | (_, Operand::Opaque(node)) => Err(TranslationError::untranslatable(&node)),
    }
}

fn unsupported(op: impl ToString, sorts: &[&Term]) -> TranslationError {
    TranslationError::UnsupportedOperator {
        op: op.to_string(),
        sort: sorts.iter().map(|t| t.sort().to_string()).collect::<Vec<_>>().join(", "),
    }
}

fn unary(op: UnaryOp, operand: Term) -> Result<Term> {
    match (op, operand.sort()) {
        (UnaryOp::Not, Sort::Bool) => Ok(Term::not(operand)?),
        // bitwise invert: !x == -x - 1
        (UnaryOp::Not, Sort::Int) => Ok(Term::arith(Op::Sub, Term::neg(operand)?, Term::int(1))?),
        (UnaryOp::Neg, sort) if sort.is_numeric() => Ok(Term::neg(operand)?),
        (UnaryOp::Identity, _) => Ok(operand),
        _ => Err(unsupported(op, &[&operand])),
    }
}

fn arithmetic(op: BinaryOp, lhs: Term, rhs: Term) -> Result<Term> {
    let term = match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Pow => {
            let (lhs, rhs) = widen(lhs, rhs)?;
            let op = match op {
                BinaryOp::Add => Op::Add,
                BinaryOp::Sub => Op::Sub,
                BinaryOp::Mul => Op::Mul,
                _ => Op::Pow,
            };
            Term::arith(op, lhs, rhs)?
        }
        BinaryOp::Div => {
            if lhs.sort() == Sort::Int && rhs.sort() == Sort::Int {
                Term::arith(Op::IntDiv, lhs, rhs)?
            } else {
                let (lhs, rhs) = widen(lhs, rhs)?;
                Term::arith(Op::Div, lhs, rhs)?
            }
        }
        BinaryOp::Mod => Term::arith(Op::Mod, lhs, rhs)?,
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
            if lhs.sort() != Sort::Bool || rhs.sort() != Sort::Bool {
                return Err(unsupported(op, &[&lhs, &rhs]));
            }
            match op {
                BinaryOp::BitAnd => Term::and(vec![lhs, rhs])?,
                BinaryOp::BitOr => Term::or(vec![lhs, rhs])?,
                _ => Term::xor(lhs, rhs)?,
            }
        }
        BinaryOp::Shl | BinaryOp::Shr => return Err(unsupported(op, &[&lhs, &rhs])),
    };
    Ok(term)
}

fn compare(op: CmpOp, lhs: Operand, rhs: Operand) -> Result<Term> {
    let (lhs, rhs) = unify(lhs, rhs)?;
    let op = match op {
        CmpOp::Eq => Op::Eq,
        CmpOp::Ne => Op::Distinct,
        CmpOp::Lt => Op::Lt,
        CmpOp::Le => Op::Le,
        CmpOp::Gt => Op::Gt,
        CmpOp::Ge => Op::Ge,
    };
    Ok(Term::compare(op, lhs, rhs)?)
}
