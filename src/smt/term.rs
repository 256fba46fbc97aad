//! SMT terms: sorts, constants, symbolic variables and applications
//!
//! This is the constraint language handed to a solver backend. Terms are
//! built through checked combinators (`Term::eq`, `Term::and`, `Term::ite`,
//! `Term::arith`, ...) which reject ill-sorted operands, and are rendered as
//! SMT-LIB s-expressions the way Z3 prints them.

use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use super::rational::Rational;

/// A finite enumeration sort: one nullary constructor per variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumSort {
    pub name: String,
    pub variants: Vec<String>,
}

impl EnumSort {
    pub fn new(name: impl Into<String>, variants: Vec<String>) -> Self {
        EnumSort {
            name: name.into(),
            variants,
        }
    }

    pub fn index_of(&self, variant: &str) -> Option<usize> {
        self.variants.iter().position(|v| v == variant)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sort {
    Int,
    Real,
    Bool,
    Enum(Arc<EnumSort>),
}

impl Sort {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Sort::Int | Sort::Real)
    }

    /// Least common sort of two numeric sorts (`Int ⊔ Real = Real`).
    /// Non-numeric sorts only join with themselves.
    pub fn join(&self, other: &Sort) -> Option<Sort> {
        match (self, other) {
            (a, b) if a == b => Some(a.clone()),
            (Sort::Int, Sort::Real) | (Sort::Real, Sort::Int) => Some(Sort::Real),
            _ => None,
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Int => f.write_str("Int"),
            Sort::Real => f.write_str("Real"),
            Sort::Bool => f.write_str("Bool"),
            Sort::Enum(e) => f.write_str(&e.name),
        }
    }
}

/// Function symbols of the term language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Add,
    Sub,
    Mul,
    /// Real division `/`
    Div,
    /// Integer division `div`
    IntDiv,
    Mod,
    Pow,
    Neg,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Distinct,
    Not,
    And,
    Or,
    Xor,
    Ite,
    ToReal,
}

impl Op {
    pub fn symbol(&self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub | Op::Neg => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::IntDiv => "div",
            Op::Mod => "mod",
            Op::Pow => "^",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Eq => "=",
            Op::Distinct => "distinct",
            Op::Not => "not",
            Op::And => "and",
            Op::Or => "or",
            Op::Xor => "xor",
            Op::Ite => "ite",
            Op::ToReal => "to_real",
        }
    }

    fn is_ordering(&self) -> bool {
        matches!(self, Op::Lt | Op::Le | Op::Gt | Op::Ge)
    }
}

/// Errors raised by the term combinators
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TermError {
    #[error("`{op}` cannot be applied to ({found})")]
    SortMismatch { op: &'static str, found: String },
}

fn mismatch(op: Op, args: &[&Term]) -> TermError {
    TermError::SortMismatch {
        op: op.symbol(),
        found: args
            .iter()
            .map(|t| t.sort().to_string())
            .collect::<Vec<_>>()
            .join(", "),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Int(i64),
    Real(Rational),
    Bool(bool),
    /// A constructor of an enumeration sort
    Tag { sort: Arc<EnumSort>, index: usize },
    /// A named symbolic constant
    Var { name: String, sort: Sort },
    App { op: Op, args: Vec<Term>, sort: Sort },
}

impl Term {
    pub fn int(value: i64) -> Term {
        Term::Int(value)
    }

    pub fn real(value: Rational) -> Term {
        Term::Real(value)
    }

    pub fn bool(value: bool) -> Term {
        Term::Bool(value)
    }

    pub fn tag(sort: Arc<EnumSort>, index: usize) -> Term {
        Term::Tag { sort, index }
    }

    pub fn var(name: impl Into<String>, sort: Sort) -> Term {
        Term::Var {
            name: name.into(),
            sort,
        }
    }

    pub fn sort(&self) -> Sort {
        match self {
            Term::Int(_) => Sort::Int,
            Term::Real(_) => Sort::Real,
            Term::Bool(_) => Sort::Bool,
            Term::Tag { sort, .. } => Sort::Enum(sort.clone()),
            Term::Var { sort, .. } | Term::App { sort, .. } => sort.clone(),
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            Term::Int(_) | Term::Real(_) | Term::Bool(_) | Term::Tag { .. }
        )
    }

    pub fn op(&self) -> Option<Op> {
        match self {
            Term::App { op, .. } => Some(*op),
            _ => None,
        }
    }

    pub fn args(&self) -> &[Term] {
        match self {
            Term::App { args, .. } => args,
            _ => &[],
        }
    }

    pub fn num_args(&self) -> usize {
        self.args().len()
    }

    pub fn arg(&self, index: usize) -> Option<&Term> {
        self.args().get(index)
    }

    fn app(op: Op, args: Vec<Term>, sort: Sort) -> Term {
        Term::App { op, args, sort }
    }

    /// Equality constraint `lhs == rhs`. Never folded, so constraints keep
    /// their shape even when both sides are concrete.
    pub fn eq(lhs: Term, rhs: Term) -> Result<Term, TermError> {
        if lhs.sort() != rhs.sort() {
            return Err(mismatch(Op::Eq, &[&lhs, &rhs]));
        }
        Ok(Term::app(Op::Eq, vec![lhs, rhs], Sort::Bool))
    }

    /// Conjunction of every operand. No operand is dropped or short-circuited.
    pub fn and(terms: Vec<Term>) -> Result<Term, TermError> {
        Term::junction(Op::And, terms)
    }

    pub fn or(terms: Vec<Term>) -> Result<Term, TermError> {
        Term::junction(Op::Or, terms)
    }

    fn junction(op: Op, terms: Vec<Term>) -> Result<Term, TermError> {
        if let Some(bad) = terms.iter().find(|t| t.sort() != Sort::Bool) {
            return Err(mismatch(op, &[bad]));
        }
        if terms.is_empty() {
            return Ok(Term::Bool(op == Op::And));
        }
        Ok(Term::app(op, terms, Sort::Bool))
    }

    pub fn not(term: Term) -> Result<Term, TermError> {
        match term {
            Term::Bool(b) => Ok(Term::Bool(!b)),
            t if t.sort() == Sort::Bool => Ok(Term::app(Op::Not, vec![t], Sort::Bool)),
            t => Err(mismatch(Op::Not, &[&t])),
        }
    }

    pub fn xor(lhs: Term, rhs: Term) -> Result<Term, TermError> {
        if lhs.sort() != Sort::Bool || rhs.sort() != Sort::Bool {
            return Err(mismatch(Op::Xor, &[&lhs, &rhs]));
        }
        if let (Term::Bool(a), Term::Bool(b)) = (&lhs, &rhs) {
            return Ok(Term::Bool(a ^ b));
        }
        Ok(Term::app(Op::Xor, vec![lhs, rhs], Sort::Bool))
    }

    /// If-then-else value combinator
    pub fn ite(cond: Term, then: Term, otherwise: Term) -> Result<Term, TermError> {
        if cond.sort() != Sort::Bool || then.sort() != otherwise.sort() {
            return Err(mismatch(Op::Ite, &[&cond, &then, &otherwise]));
        }
        let sort = then.sort();
        Ok(Term::app(Op::Ite, vec![cond, then, otherwise], sort))
    }

    /// Integer-to-real widening. Integer constants become real constants.
    pub fn to_real(term: Term) -> Result<Term, TermError> {
        match term {
            Term::Int(v) => Ok(Term::Real(Rational::from_int(v))),
            t if t.sort() == Sort::Real => Ok(t),
            t if t.sort() == Sort::Int => Ok(Term::app(Op::ToReal, vec![t], Sort::Real)),
            t => Err(mismatch(Op::ToReal, &[&t])),
        }
    }

    pub fn neg(term: Term) -> Result<Term, TermError> {
        match term {
            Term::Int(v) => Ok(v
                .checked_neg()
                .map(Term::Int)
                .unwrap_or_else(|| Term::app(Op::Neg, vec![Term::Int(v)], Sort::Int))),
            Term::Real(r) => Ok(r
                .checked_neg()
                .map(Term::Real)
                .unwrap_or_else(|| Term::app(Op::Neg, vec![Term::Real(r)], Sort::Real))),
            t if t.sort().is_numeric() => {
                let sort = t.sort();
                Ok(Term::app(Op::Neg, vec![t], sort))
            }
            t => Err(mismatch(Op::Neg, &[&t])),
        }
    }

    /// Binary arithmetic over two operands of the same numeric sort.
    /// Concrete operands are folded when the result is exact and in range.
    pub fn arith(op: Op, lhs: Term, rhs: Term) -> Result<Term, TermError> {
        let sort = lhs.sort();
        let valid = sort == rhs.sort()
            && match op {
                Op::Add | Op::Sub | Op::Mul | Op::Pow => sort.is_numeric(),
                Op::Div => sort == Sort::Real,
                Op::IntDiv | Op::Mod => sort == Sort::Int,
                _ => false,
            };
        if !valid {
            return Err(mismatch(op, &[&lhs, &rhs]));
        }
        if let Some(folded) = fold_arith(op, &lhs, &rhs) {
            return Ok(folded);
        }
        Ok(Term::app(op, vec![lhs, rhs], sort))
    }

    /// Comparison. Orderings need numeric operands of one sort, `=` and
    /// `distinct` any single sort. Concrete operands are folded.
    pub fn compare(op: Op, lhs: Term, rhs: Term) -> Result<Term, TermError> {
        let sort = lhs.sort();
        let valid = sort == rhs.sort()
            && match op {
                o if o.is_ordering() => sort.is_numeric(),
                Op::Eq | Op::Distinct => true,
                _ => false,
            };
        if !valid {
            return Err(mismatch(op, &[&lhs, &rhs]));
        }
        if let Some(folded) = fold_compare(op, &lhs, &rhs) {
            return Ok(Term::Bool(folded));
        }
        Ok(Term::app(op, vec![lhs, rhs], Sort::Bool))
    }

    /// Every symbolic constant mentioned by this term, in first-use order.
    pub fn collect_vars(&self, out: &mut IndexMap<String, Sort>) {
        match self {
            Term::Var { name, sort } => {
                out.entry(name.clone()).or_insert_with(|| sort.clone());
            }
            Term::App { args, .. } => args.iter().for_each(|a| a.collect_vars(out)),
            _ => {}
        }
    }

    /// Every enumeration sort mentioned by this term.
    pub fn collect_enum_sorts(&self, out: &mut IndexSet<Arc<EnumSort>>) {
        if let Sort::Enum(e) = self.sort() {
            out.insert(e);
        }
        for arg in self.args() {
            arg.collect_enum_sorts(out);
        }
    }

    pub fn sexpr(&self) -> String {
        self.to_string()
    }
}

fn fold_arith(op: Op, lhs: &Term, rhs: &Term) -> Option<Term> {
    match (lhs, rhs) {
        (Term::Int(a), Term::Int(b)) => {
            let (a, b) = (*a, *b);
            let value = match op {
                Op::Add => a.checked_add(b)?,
                Op::Sub => a.checked_sub(b)?,
                Op::Mul => a.checked_mul(b)?,
                Op::IntDiv if b != 0 => a.checked_div_euclid(b)?,
                Op::Mod if b != 0 => a.checked_rem_euclid(b)?,
                Op::Pow if b >= 0 => a.checked_pow(u32::try_from(b).ok()?)?,
                _ => return None,
            };
            Some(Term::Int(value))
        }
        (Term::Real(a), Term::Real(b)) => {
            let value = match op {
                Op::Add => a.checked_add(b)?,
                Op::Sub => a.checked_sub(b)?,
                Op::Mul => a.checked_mul(b)?,
                Op::Div => a.checked_div(b)?,
                _ => return None,
            };
            Some(Term::Real(value))
        }
        _ => None,
    }
}

fn fold_compare(op: Op, lhs: &Term, rhs: &Term) -> Option<bool> {
    use std::cmp::Ordering;

    let ordering = match (lhs, rhs) {
        (Term::Int(a), Term::Int(b)) => a.cmp(b),
        (Term::Real(a), Term::Real(b)) => a.cmp(b),
        (Term::Bool(a), Term::Bool(b)) => return equality(op, a == b),
        (Term::Tag { index: a, .. }, Term::Tag { index: b, .. }) => return equality(op, a == b),
        _ => return None,
    };
    Some(match op {
        Op::Lt => ordering == Ordering::Less,
        Op::Le => ordering != Ordering::Greater,
        Op::Gt => ordering == Ordering::Greater,
        Op::Ge => ordering != Ordering::Less,
        Op::Eq => ordering == Ordering::Equal,
        Op::Distinct => ordering != Ordering::Equal,
        _ => return None,
    })
}

fn equality(op: Op, equal: bool) -> Option<bool> {
    match op {
        Op::Eq => Some(equal),
        Op::Distinct => Some(!equal),
        _ => None,
    }
}

/// Quote a symbol with `|...|` unless it is a legal SMT-LIB simple symbol.
pub fn quote_symbol(name: &str) -> String {
    let simple = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "~!@$%^&*_-+=<>.?/".contains(c));
    if simple {
        name.to_string()
    } else {
        format!("|{}|", name.replace('|', "_"))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Int(v) if *v < 0 => write!(f, "(- {})", v.unsigned_abs()),
            Term::Int(v) => write!(f, "{}", v),
            Term::Real(r) => write!(f, "{}", r),
            Term::Bool(b) => write!(f, "{}", b),
            Term::Tag { sort, index } => {
                let name = sort.variants.get(*index).map(String::as_str).unwrap_or("?");
                f.write_str(&quote_symbol(name))
            }
            Term::Var { name, .. } => f.write_str(&quote_symbol(name)),
            Term::App { op, args, .. } => {
                write!(f, "({}", op.symbol())?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Term {
        Term::var("x", Sort::Int)
    }

    fn y() -> Term {
        Term::var("y", Sort::Real)
    }

    #[test]
    fn test_literal_rendering() {
        assert_eq!(Term::int(15).sexpr(), "15");
        assert_eq!(Term::int(-1).sexpr(), "(- 1)");
        assert_eq!(Term::real(Rational::from_int(15)).sexpr(), "15.0");
        assert_eq!(Term::bool(true).sexpr(), "true");
    }

    #[test]
    fn test_folding_of_concrete_operands() {
        let sum = Term::arith(Op::Add, Term::int(15), Term::int(3)).unwrap();
        assert_eq!(sum, Term::int(18));

        let quotient = Term::arith(Op::IntDiv, Term::int(-7), Term::int(2)).unwrap();
        assert_eq!(quotient, Term::int(-4));

        let overflow = Term::arith(Op::Add, Term::int(i64::MAX), Term::int(1)).unwrap();
        assert_eq!(overflow.sexpr(), format!("(+ {} 1)", i64::MAX));

        let cmp = Term::compare(Op::Lt, Term::int(15), Term::int(30)).unwrap();
        assert_eq!(cmp, Term::bool(true));
    }

    #[test]
    fn test_symbolic_application() {
        let term = Term::arith(Op::Mul, x(), Term::neg(Term::int(1)).unwrap()).unwrap();
        assert_eq!(term.sexpr(), "(* x (- 1))");
        assert_eq!(term.num_args(), 2);
        assert_eq!(term.arg(0), Some(&x()));
    }

    #[test]
    fn test_sort_checks() {
        assert!(Term::arith(Op::Add, x(), y()).is_err());
        assert!(Term::arith(Op::Div, x(), x()).is_err());
        assert!(Term::arith(Op::Mod, y(), y()).is_err());
        assert!(Term::eq(x(), y()).is_err());
        assert!(Term::and(vec![x()]).is_err());
        assert!(Term::ite(x(), x(), x()).is_err());
    }

    #[test]
    fn test_to_real() {
        assert_eq!(Term::to_real(Term::int(0)).unwrap().sexpr(), "0.0");
        assert_eq!(Term::to_real(x()).unwrap().sexpr(), "(to_real x)");
        assert_eq!(Term::to_real(y()).unwrap(), y());
        assert!(Term::to_real(Term::bool(true)).is_err());
    }

    #[test]
    fn test_ite_structure() {
        let cond = Term::compare(Op::Lt, x(), Term::int(3)).unwrap();
        let ite = Term::ite(cond, Term::int(25), Term::int(35)).unwrap();
        assert_eq!(ite.sexpr(), "(ite (< x 3) 25 35)");
        assert_eq!(ite.num_args(), 3);
        assert_eq!(ite.sort(), Sort::Int);
    }

    #[test]
    fn test_enum_tags() {
        let sort = Arc::new(EnumSort::new("Switch", vec!["on".into(), "off".into()]));
        let on = Term::tag(sort.clone(), 0);
        let off = Term::tag(sort.clone(), 1);
        assert_eq!(on.sexpr(), "on");
        assert_eq!(Term::compare(Op::Eq, on.clone(), off).unwrap(), Term::bool(false));
        assert!(Term::compare(Op::Lt, on.clone(), on).is_err());
    }

    #[test]
    fn test_collect_vars() {
        let term = Term::eq(x(), Term::arith(Op::Add, x(), Term::int(1)).unwrap()).unwrap();
        let mut vars = IndexMap::new();
        term.collect_vars(&mut vars);
        assert_eq!(vars.len(), 1);
        assert_eq!(vars.get("x"), Some(&Sort::Int));
    }

    #[test]
    fn test_quote_symbol() {
        assert_eq!(quote_symbol("var_1_u0"), "var_1_u0");
        assert_eq!(quote_symbol("sub.port_p3"), "sub.port_p3");
        assert_eq!(quote_symbol("1abc"), "|1abc|");
        assert_eq!(quote_symbol("a b"), "|a b|");
    }
}
