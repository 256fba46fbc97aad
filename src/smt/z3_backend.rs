//! Z3 backend: satisfiability checking with model extraction
//!
//! Lowers a translated `Script` into Z3 ASTs, asserts every constraint and
//! reports whether the step's constraint system is satisfiable. On `sat`
//! the value of every declared symbol is read back from the model.

use std::collections::HashMap;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;
use z3::ast::{Ast, Bool, Datatype, Dynamic, Int, Real};
use z3::{Config, Context, DatatypeBuilder, DatatypeSort, SatResult, Solver};

use super::term::{EnumSort, Op, Sort, Term};
use super::{Script, ScriptError};

/// Result of a satisfiability check
#[derive(Debug, Clone)]
pub enum CheckResult {
    /// Constraints are satisfiable; symbol assignments from the model
    Sat { model: IndexMap<String, String> },
    Unsat,
    /// Solver gave up
    Unknown { reason: String },
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("cannot lower `{term}` into Z3: {reason}")]
    Lowering { term: String, reason: String },

    #[error(transparent)]
    Script(#[from] ScriptError),
}

fn lowering_error(term: &Term, reason: &str) -> BackendError {
    BackendError::Lowering {
        term: term.sexpr(),
        reason: reason.to_string(),
    }
}

/// Z3 solver wrapper
pub struct Z3Backend {
    ctx: Context,
}

impl Z3Backend {
    pub fn new() -> Self {
        let mut cfg = Config::new();
        cfg.set_model_generation(true);
        Z3Backend {
            ctx: Context::new(&cfg),
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Check the conjunction of every constraint in the script.
    pub fn check(&self, script: &Script) -> Result<CheckResult, BackendError> {
        script.validate()?;
        let solver = Solver::new(&self.ctx);
        let mut lowering = Lowering::new(&self.ctx);

        for constraint in script.constraints() {
            let lowered = lowering.lower(constraint)?;
            let assertion = lowered
                .as_bool()
                .ok_or_else(|| lowering_error(constraint, "constraint is not boolean"))?;
            solver.assert(&assertion);
        }
        debug!(constraints = script.len(), "checking with Z3");

        match solver.check() {
            SatResult::Unsat => Ok(CheckResult::Unsat),
            SatResult::Unknown => Ok(CheckResult::Unknown {
                reason: "Z3 solver returned Unknown".to_string(),
            }),
            SatResult::Sat => {
                let mut model = IndexMap::new();
                if let Some(z3_model) = solver.get_model() {
                    for (name, var) in &lowering.vars {
                        if let Some(value) = z3_model.eval(var, true) {
                            model.insert(name.clone(), value.to_string());
                        }
                    }
                }
                Ok(CheckResult::Sat { model })
            }
        }
    }
}

impl Default for Z3Backend {
    fn default() -> Self {
        Self::new()
    }
}

struct Lowering<'ctx> {
    ctx: &'ctx Context,
    datatypes: HashMap<String, DatatypeSort<'ctx>>,
    vars: IndexMap<String, Dynamic<'ctx>>,
}

impl<'ctx> Lowering<'ctx> {
    fn new(ctx: &'ctx Context) -> Self {
        Lowering {
            ctx,
            datatypes: HashMap::new(),
            vars: IndexMap::new(),
        }
    }

    fn datatype(&mut self, sort: &EnumSort) -> &DatatypeSort<'ctx> {
        let ctx = self.ctx;
        self.datatypes.entry(sort.name.clone()).or_insert_with(|| {
            let mut builder = DatatypeBuilder::new(ctx, sort.name.as_str());
            for variant in &sort.variants {
                builder = builder.variant(variant, vec![]);
            }
            builder.finish()
        })
    }

    fn lower(&mut self, term: &Term) -> Result<Dynamic<'ctx>, BackendError> {
        let ctx = self.ctx;
        match term {
            Term::Int(v) => Ok(Dynamic::from_ast(&Int::from_i64(ctx, *v))),
            Term::Real(r) => {
                let real = Real::from_real_str(ctx, &r.numer().to_string(), &r.denom().to_string())
                    .ok_or_else(|| lowering_error(term, "real constant out of range"))?;
                Ok(Dynamic::from_ast(&real))
            }
            Term::Bool(b) => Ok(Dynamic::from_ast(&Bool::from_bool(ctx, *b))),
            Term::Tag { sort, index } => {
                let datatype = self.datatype(sort);
                let variant = datatype
                    .variants
                    .get(*index)
                    .ok_or_else(|| lowering_error(term, "constructor index out of range"))?;
                Ok(variant.constructor.apply(&[]))
            }
            Term::Var { name, sort } => {
                if let Some(var) = self.vars.get(name) {
                    return Ok(var.clone());
                }
                let var = match sort {
                    Sort::Int => Dynamic::from_ast(&Int::new_const(ctx, name.as_str())),
                    Sort::Real => Dynamic::from_ast(&Real::new_const(ctx, name.as_str())),
                    Sort::Bool => Dynamic::from_ast(&Bool::new_const(ctx, name.as_str())),
                    Sort::Enum(e) => {
                        let datatype = self.datatype(e);
                        Dynamic::from_ast(&Datatype::new_const(ctx, name.as_str(), &datatype.sort))
                    }
                };
                self.vars.insert(name.clone(), var.clone());
                Ok(var)
            }
            Term::App { op, args, .. } => {
                let lowered = args
                    .iter()
                    .map(|a| self.lower(a))
                    .collect::<Result<Vec<_>, _>>()?;
                self.lower_app(term, *op, &lowered)
            }
        }
    }

    fn lower_app(
        &self,
        term: &Term,
        op: Op,
        args: &[Dynamic<'ctx>],
    ) -> Result<Dynamic<'ctx>, BackendError> {
        let ctx = self.ctx;
        let ints = || -> Option<Vec<Int<'ctx>>> { args.iter().map(|a| a.as_int()).collect() };
        let reals = || -> Option<Vec<Real<'ctx>>> { args.iter().map(|a| a.as_real()).collect() };
        let bools = || -> Option<Vec<Bool<'ctx>>> { args.iter().map(|a| a.as_bool()).collect() };
        let bad = || lowering_error(term, "operand sorts do not fit the operator");

        let result = match op {
            Op::Add | Op::Sub | Op::Mul => {
                if let Some(ints) = ints() {
                    let refs: Vec<&Int> = ints.iter().collect();
                    Dynamic::from_ast(&match op {
                        Op::Add => Int::add(ctx, &refs),
                        Op::Sub => Int::sub(ctx, &refs),
                        _ => Int::mul(ctx, &refs),
                    })
                } else {
                    let reals = reals().ok_or_else(bad)?;
                    let refs: Vec<&Real> = reals.iter().collect();
                    Dynamic::from_ast(&match op {
                        Op::Add => Real::add(ctx, &refs),
                        Op::Sub => Real::sub(ctx, &refs),
                        _ => Real::mul(ctx, &refs),
                    })
                }
            }
            Op::Div => {
                let r = reals().ok_or_else(bad)?;
                Dynamic::from_ast(&r[0].div(&r[1]))
            }
            Op::IntDiv => {
                let i = ints().ok_or_else(bad)?;
                Dynamic::from_ast(&i[0].div(&i[1]))
            }
            Op::Mod => {
                let i = ints().ok_or_else(bad)?;
                Dynamic::from_ast(&i[0].modulo(&i[1]))
            }
            Op::Pow => {
                if let Some(i) = ints() {
                    Dynamic::from_ast(&i[0].power(&i[1]))
                } else {
                    let r = reals().ok_or_else(bad)?;
                    Dynamic::from_ast(&r[0].power(&r[1]))
                }
            }
            Op::Neg => {
                if let Some(i) = ints() {
                    Dynamic::from_ast(&i[0].unary_minus())
                } else {
                    let r = reals().ok_or_else(bad)?;
                    Dynamic::from_ast(&r[0].unary_minus())
                }
            }
            Op::Lt | Op::Le | Op::Gt | Op::Ge => {
                let cmp = if let Some(i) = ints() {
                    match op {
                        Op::Lt => i[0].lt(&i[1]),
                        Op::Le => i[0].le(&i[1]),
                        Op::Gt => i[0].gt(&i[1]),
                        _ => i[0].ge(&i[1]),
                    }
                } else {
                    let r = reals().ok_or_else(bad)?;
                    match op {
                        Op::Lt => r[0].lt(&r[1]),
                        Op::Le => r[0].le(&r[1]),
                        Op::Gt => r[0].gt(&r[1]),
                        _ => r[0].ge(&r[1]),
                    }
                };
                Dynamic::from_ast(&cmp)
            }
            Op::Eq => Dynamic::from_ast(&args[0]._eq(&args[1])),
            Op::Distinct => Dynamic::from_ast(&args[0]._eq(&args[1]).not()),
            Op::Not => {
                let b = bools().ok_or_else(bad)?;
                Dynamic::from_ast(&b[0].not())
            }
            Op::And | Op::Or => {
                let b = bools().ok_or_else(bad)?;
                let refs: Vec<&Bool> = b.iter().collect();
                Dynamic::from_ast(&if op == Op::And {
                    Bool::and(ctx, &refs)
                } else {
                    Bool::or(ctx, &refs)
                })
            }
            Op::Xor => {
                let b = bools().ok_or_else(bad)?;
                Dynamic::from_ast(&b[0].xor(&b[1]))
            }
            Op::Ite => {
                let cond = args[0].as_bool().ok_or_else(bad)?;
                cond.ite(&args[1], &args[2])
            }
            Op::ToReal => {
                let i = ints().ok_or_else(bad)?;
                Dynamic::from_ast(&i[0].to_real())
            }
        };
        Ok(result)
    }
}
