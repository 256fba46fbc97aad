//! Lowering of Rust-syntax update bodies into the statement tree
//!
//! Update functions are written either as an item
//! (`fn update(&self, dt: f64) -> f64 { ... }`) or as a closure
//! (`|entity, dt| expr`). The first parameter is the receiver through which
//! ports are accessed (`receiver.port.value`), the second is the time step.

use indexmap::IndexMap;
use proc_macro2::TokenStream;
use quote::ToTokens;
use syn::{
    BinOp, Block, Expr, ExprAssign, ExprBinary, ExprClosure, ExprIf, FnArg, ItemFn, Lit, Member, Pat, Stmt, Type, UnOp,
};
use tracing::{debug, trace};

use super::ast::{self, CmpOp, Literal, Node};
use super::ParseError;
use crate::smt::{Rational, Sort};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Item,
    Closure,
}

/// A parsed update body
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateFunction {
    pub kind: FunctionKind,
    /// Name bound to the owning entity (`self` for methods)
    pub receiver: Option<String>,
    /// Remaining parameters; the first one is the time step
    pub params: Vec<String>,
    pub body: Vec<Node>,
    /// Locals bound with a type annotation (`let v: i64 = ...`)
    pub declared: IndexMap<String, Sort>,
}

impl UpdateFunction {
    pub fn step_param(&self) -> Option<&str> {
        self.params.first().map(String::as_str)
    }
}

/// Parse and lower an update function.
pub fn parse_function(source: &str) -> Result<UpdateFunction, ParseError> {
    let tokens: TokenStream = source.parse().map_err(|e: proc_macro2::LexError| ParseError::Syntax(e.to_string()))?;
    let trimmed = source.trim_start();
    if trimmed.starts_with("fn ") || trimmed.starts_with("pub ") {
        let item = syn::parse2::<ItemFn>(tokens).map_err(|e| ParseError::Syntax(e.to_string()))?;
        return from_item(&item);
    }
    match syn::parse2::<Expr>(tokens) {
        Ok(Expr::Closure(closure)) => from_closure(&closure),
        Ok(other) => Err(ParseError::NotAFunction(other.to_token_stream().to_string())),
        Err(e) => Err(ParseError::Syntax(e.to_string())),
    }
}

fn from_item(item: &ItemFn) -> Result<UpdateFunction, ParseError> {
    let mut names = Vec::new();
    for input in &item.sig.inputs {
        match input {
            FnArg::Receiver(_) => names.push("self".to_string()),
            FnArg::Typed(typed) => names.push(pat_name(&typed.pat)?),
        }
    }
    let mut names = names.into_iter();
    let mut declared = IndexMap::new();
    declared_sorts(&item.block.stmts, &mut declared);
    Ok(UpdateFunction {
        kind: FunctionKind::Item,
        receiver: names.next(),
        params: names.collect(),
        body: lower_stmts(&item.block.stmts, true),
        declared,
    })
}

fn from_closure(closure: &ExprClosure) -> Result<UpdateFunction, ParseError> {
    let names = closure
        .inputs
        .iter()
        .map(pat_name)
        .collect::<Result<Vec<_>, _>>()?;
    let mut names = names.into_iter();
    let mut declared = IndexMap::new();
    let body = match closure.body.as_ref() {
        Expr::Block(block) if block.label.is_none() => {
            declared_sorts(&block.block.stmts, &mut declared);
            lower_stmts(&block.block.stmts, true)
        }
        expr => vec![Node::ret(lower_expr(expr))],
    };
    Ok(UpdateFunction {
        kind: FunctionKind::Closure,
        receiver: names.next(),
        params: names.collect(),
        body,
        declared,
    })
}

fn pat_name(pat: &Pat) -> Result<String, ParseError> {
    match pat {
        Pat::Ident(ident) => Ok(ident.ident.to_string()),
        Pat::Type(typed) => pat_name(&typed.pat),
        Pat::Reference(reference) => pat_name(&reference.pat),
        Pat::Wild(_) => Ok("_".to_string()),
        other => Err(ParseError::Parameter(other.to_token_stream().to_string())),
    }
}

/// Collect `let name: Type` annotations of primitive types, in nested
/// blocks too.
fn declared_sorts(stmts: &[Stmt], out: &mut IndexMap<String, Sort>) {
    for stmt in stmts {
        match stmt {
            Stmt::Local(local) => {
                if let Pat::Type(typed) = &local.pat {
                    if let (Ok(name), Some(sort)) = (pat_name(&typed.pat), type_sort(&typed.ty)) {
                        out.insert(name, sort);
                    }
                }
            }
            Stmt::Expr(expr, _) => declared_in_expr(expr, out),
            Stmt::Item(_) | Stmt::Macro(_) => {}
        }
    }
}

fn declared_in_expr(expr: &Expr, out: &mut IndexMap<String, Sort>) {
    match expr {
        Expr::Block(block) => declared_sorts(&block.block.stmts, out),
        Expr::If(expr_if) => {
            declared_sorts(&expr_if.then_branch.stmts, out);
            if let Some((_, branch)) = &expr_if.else_branch {
                declared_in_expr(branch, out);
            }
        }
        _ => {}
    }
}

fn type_sort(ty: &Type) -> Option<Sort> {
    let Type::Path(path) = ty else {
        return None;
    };
    let ident = path.path.get_ident()?.to_string();
    match ident.as_str() {
        "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64" | "u128" | "usize" => {
            Some(Sort::Int)
        }
        "f32" | "f64" => Some(Sort::Real),
        "bool" => Some(Sort::Bool),
        _ => None,
    }
}

/// Lower a statement list. With `tail_returns`, a trailing expression
/// becomes a `Return`.
fn lower_stmts(stmts: &[Stmt], tail_returns: bool) -> Vec<Node> {
    let mut out = Vec::new();
    let last = stmts.len().saturating_sub(1);
    for (index, stmt) in stmts.iter().enumerate() {
        match stmt {
            Stmt::Local(local) => {
                let Some(init) = &local.init else {
                    continue;
                };
                let value = lower_expr(&init.expr);
                match pat_name(&local.pat) {
                    Ok(name) => out.push(Node::assign(Node::Name(name), value)),
                    Err(_) => out.push(unsupported(local)),
                }
            }
            Stmt::Item(_) | Stmt::Macro(_) => trace!("skipping item or macro statement"),
            Stmt::Expr(expr, semi) => {
                let tail = tail_returns && semi.is_none() && index == last;
                lower_stmt_expr(expr, tail, &mut out);
            }
        }
    }
    out
}

fn lower_stmt_expr(expr: &Expr, tail: bool, out: &mut Vec<Node>) {
    match expr {
        Expr::Assign(assign) => out.push(lower_assign(assign)),
        Expr::Binary(bin) if compound_op(&bin.op).is_some() => {
            if let Some(op) = compound_op(&bin.op) {
                out.push(Node::aug_assign(lower_expr(&bin.left), op, lower_expr(&bin.right)));
            }
        }
        Expr::Return(ret) => out.push(Node::Return(
            ret.expr.as_ref().map(|value| Box::new(lower_expr(value))),
        )),
        Expr::If(expr_if) if !(tail && is_value_if(expr_if)) => out.push(lower_if_stmt(expr_if, tail)),
        Expr::Block(block) if block.label.is_none() => out.extend(lower_stmts(&block.block.stmts, tail)),
        other if tail => out.push(Node::ret(lower_expr(other))),
        other => out.push(lower_expr(other)),
    }
}

fn lower_assign(assign: &ExprAssign) -> Node {
    let mut targets = vec![lower_expr(&assign.left)];
    let mut value = assign.right.as_ref();
    while let Expr::Assign(inner) = value {
        targets.push(lower_expr(&inner.left));
        value = inner.right.as_ref();
    }
    Node::Assign {
        targets,
        value: Box::new(lower_expr(value)),
    }
}

fn lower_if_stmt(expr_if: &ExprIf, tail: bool) -> Node {
    let orelse = expr_if.else_branch.as_ref().map(|(_, branch)| match branch.as_ref() {
        Expr::Block(block) => lower_stmts(&block.block.stmts, tail),
        Expr::If(nested) => vec![lower_if_stmt(nested, tail)],
        other => vec![lower_expr(other)],
    });
    Node::IfStmt {
        test: Box::new(lower_expr(&expr_if.cond)),
        body: lower_stmts(&expr_if.then_branch.stmts, tail),
        orelse,
    }
}

/// The single value expression of a block such as `{ x + 1 }`
fn block_value(block: &Block) -> Option<&Expr> {
    match block.stmts.as_slice() {
        [Stmt::Expr(expr, None)] if !is_statement_expr(expr) => Some(expr),
        _ => None,
    }
}

fn is_statement_expr(expr: &Expr) -> bool {
    match expr {
        Expr::Assign(_) | Expr::Return(_) => true,
        Expr::Binary(bin) => compound_op(&bin.op).is_some(),
        Expr::If(expr_if) => !is_value_if(expr_if),
        _ => false,
    }
}

fn is_value_if(expr_if: &ExprIf) -> bool {
    if block_value(&expr_if.then_branch).is_none() {
        return false;
    }
    match expr_if.else_branch.as_ref().map(|(_, e)| e.as_ref()) {
        Some(Expr::Block(block)) => block_value(&block.block).is_some(),
        Some(Expr::If(nested)) => is_value_if(nested),
        _ => false,
    }
}

/// Lower an expression in value position.
pub fn lower_expr(expr: &Expr) -> Node {
    match expr {
        Expr::Lit(lit) => lower_lit(&lit.lit).map(Node::Literal).unwrap_or_else(|| unsupported(expr)),
        Expr::Path(path) if path.qself.is_none() => match path.path.get_ident() {
            Some(ident) => Node::Name(ident.to_string()),
            None => unsupported(expr),
        },
        Expr::Field(_) => field_chain(expr)
            .map(Node::Attribute)
            .unwrap_or_else(|| unsupported(expr)),
        Expr::Unary(unary) => {
            let op = match unary.op {
                UnOp::Not(_) => ast::UnaryOp::Not,
                UnOp::Neg(_) => ast::UnaryOp::Neg,
                UnOp::Deref(_) => ast::UnaryOp::Identity,
                _ => return unsupported(expr),
            };
            Node::UnaryOp {
                op,
                operand: Box::new(lower_expr(&unary.expr)),
            }
        }
        Expr::Binary(bin) => lower_binary(expr, bin),
        Expr::Paren(paren) => lower_expr(&paren.expr),
        Expr::Group(group) => lower_expr(&group.expr),
        Expr::Cast(cast) => {
            debug!(ty = %cast.ty.to_token_stream(), "dropping `as` cast");
            lower_expr(&cast.expr)
        }
        Expr::Reference(reference) => lower_expr(&reference.expr),
        Expr::If(expr_if) => lower_if_expr(expr, expr_if),
        Expr::Block(block) if block.label.is_none() => match block_value(&block.block) {
            Some(value) => lower_expr(value),
            None => unsupported(expr),
        },
        Expr::MethodCall(call) if matches!(call.method.to_string().as_str(), "pow" | "powi" | "powf") => {
            match (call.args.len(), call.args.first()) {
                (1, Some(exponent)) => Node::binop(
                    ast::BinaryOp::Pow,
                    lower_expr(&call.receiver),
                    lower_expr(exponent),
                ),
                _ => unsupported(expr),
            }
        }
        _ => unsupported(expr),
    }
}

fn lower_if_expr(expr: &Expr, expr_if: &ExprIf) -> Node {
    let body = match block_value(&expr_if.then_branch) {
        Some(value) => lower_expr(value),
        None => return unsupported(expr),
    };
    let orelse = match expr_if.else_branch.as_ref().map(|(_, e)| e.as_ref()) {
        Some(branch) => lower_expr(branch),
        None => return unsupported(expr),
    };
    Node::IfExpr {
        test: Box::new(lower_expr(&expr_if.cond)),
        body: Box::new(body),
        orelse: Box::new(orelse),
    }
}

fn lower_binary(expr: &Expr, bin: &ExprBinary) -> Node {
    if let Some(op) = arith_op(&bin.op) {
        return Node::binop(op, lower_expr(&bin.left), lower_expr(&bin.right));
    }
    if let Some(op) = bool_op(&bin.op) {
        let mut values = Vec::new();
        flatten_bool(op, &bin.left, &mut values);
        flatten_bool(op, &bin.right, &mut values);
        return Node::BoolOp { op, values };
    }
    // `a < b < c` does not parse, so a comparison is always one pair
    if let Some(op) = cmp_op(&bin.op) {
        return Node::compare(lower_expr(&bin.left), op, lower_expr(&bin.right));
    }
    unsupported(expr)
}

fn flatten_bool(op: ast::BoolOp, expr: &Expr, values: &mut Vec<Node>) {
    match expr {
        Expr::Binary(inner) if bool_op(&inner.op) == Some(op) => {
            flatten_bool(op, &inner.left, values);
            flatten_bool(op, &inner.right, values);
        }
        other => values.push(lower_expr(other)),
    }
}

fn field_chain(expr: &Expr) -> Option<Vec<String>> {
    match expr {
        Expr::Field(field) => {
            let mut segments = field_chain(&field.base)?;
            match &field.member {
                Member::Named(ident) => segments.push(ident.to_string()),
                Member::Unnamed(_) => return None,
            }
            Some(segments)
        }
        Expr::Path(path) if path.qself.is_none() => path.path.get_ident().map(|ident| vec![ident.to_string()]),
        Expr::Paren(paren) => field_chain(&paren.expr),
        _ => None,
    }
}

fn lower_lit(lit: &Lit) -> Option<Literal> {
    match lit {
        Lit::Int(int) if matches!(int.suffix(), "f32" | "f64") => {
            Rational::parse_decimal(int.base10_digits()).map(Literal::Real)
        }
        Lit::Int(int) => int.base10_parse::<i64>().ok().map(Literal::Int),
        Lit::Float(float) => Rational::parse_decimal(float.base10_digits()).map(Literal::Real),
        Lit::Bool(b) => Some(Literal::Bool(b.value)),
        Lit::Str(s) => Some(Literal::Str(s.value())),
        _ => None,
    }
}

fn arith_op(op: &BinOp) -> Option<ast::BinaryOp> {
    use ast::BinaryOp::*;
    Some(match op {
        BinOp::Add(_) => Add,
        BinOp::Sub(_) => Sub,
        BinOp::Mul(_) => Mul,
        BinOp::Div(_) => Div,
        BinOp::Rem(_) => Mod,
        BinOp::BitAnd(_) => BitAnd,
        BinOp::BitOr(_) => BitOr,
        BinOp::BitXor(_) => BitXor,
        BinOp::Shl(_) => Shl,
        BinOp::Shr(_) => Shr,
        _ => return None,
    })
}

fn compound_op(op: &BinOp) -> Option<ast::BinaryOp> {
    use ast::BinaryOp::*;
    Some(match op {
        BinOp::AddAssign(_) => Add,
        BinOp::SubAssign(_) => Sub,
        BinOp::MulAssign(_) => Mul,
        BinOp::DivAssign(_) => Div,
        BinOp::RemAssign(_) => Mod,
        BinOp::BitAndAssign(_) => BitAnd,
        BinOp::BitOrAssign(_) => BitOr,
        BinOp::BitXorAssign(_) => BitXor,
        BinOp::ShlAssign(_) => Shl,
        BinOp::ShrAssign(_) => Shr,
        _ => return None,
    })
}

fn bool_op(op: &BinOp) -> Option<ast::BoolOp> {
    match op {
        BinOp::And(_) => Some(ast::BoolOp::And),
        BinOp::Or(_) => Some(ast::BoolOp::Or),
        _ => None,
    }
}

fn cmp_op(op: &BinOp) -> Option<CmpOp> {
    Some(match op {
        BinOp::Eq(_) => CmpOp::Eq,
        BinOp::Ne(_) => CmpOp::Ne,
        BinOp::Lt(_) => CmpOp::Lt,
        BinOp::Le(_) => CmpOp::Le,
        BinOp::Gt(_) => CmpOp::Gt,
        BinOp::Ge(_) => CmpOp::Ge,
        _ => return None,
    })
}

fn unsupported(tokens: &impl ToTokens) -> Node {
    Node::Unsupported(tokens.to_token_stream().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::{BinaryOp, BoolOp, UnaryOp};

    #[test]
    fn test_item_function() {
        let f = parse_function(
            "fn update(&self, dt: f64) -> f64 {
                let var = 15;
                var += 4;
                var *= -1;
                return var;
            }",
        )
        .unwrap();
        assert_eq!(f.kind, FunctionKind::Item);
        assert_eq!(f.receiver.as_deref(), Some("self"));
        assert_eq!(f.step_param(), Some("dt"));
        assert_eq!(
            f.body,
            vec![
                Node::assign(Node::name("var"), Node::int(15)),
                Node::aug_assign(Node::name("var"), BinaryOp::Add, Node::int(4)),
                Node::aug_assign(
                    Node::name("var"),
                    BinaryOp::Mul,
                    Node::UnaryOp {
                        op: UnaryOp::Neg,
                        operand: Box::new(Node::int(1)),
                    }
                ),
                Node::ret(Node::name("var")),
            ]
        );
    }

    #[test]
    fn test_closure_is_implicit_return() {
        let f = parse_function("|entity, dt| entity.port.value * 2.5").unwrap();
        assert_eq!(f.kind, FunctionKind::Closure);
        assert_eq!(f.receiver.as_deref(), Some("entity"));
        assert_eq!(
            f.body,
            vec![Node::ret(Node::binop(
                BinaryOp::Mul,
                Node::attribute("entity.port.value"),
                Node::real(Rational::new(5, 2).unwrap()),
            ))]
        );
    }

    #[test]
    fn test_tail_expression_returns() {
        let f = parse_function("fn update(&self, dt: f64) -> f64 { let x = 1.5; x + dt }").unwrap();
        assert_eq!(
            f.body[1],
            Node::ret(Node::binop(BinaryOp::Add, Node::name("x"), Node::name("dt")))
        );
    }

    #[test]
    fn test_if_statement_with_else_if() {
        let f = parse_function(
            "|s, dt| {
                if x < 30 { y = 50; } else if x < 40 { y = 60; } else { z = 1; }
                return y;
            }",
        )
        .unwrap();
        let Node::IfStmt { test, body, orelse } = &f.body[0] else {
            panic!("expected if statement, got {:?}", f.body[0]);
        };
        assert_eq!(**test, Node::compare(Node::name("x"), CmpOp::Lt, Node::int(30)));
        assert_eq!(body.len(), 1);
        let orelse = orelse.as_ref().unwrap();
        assert_eq!(orelse.len(), 1);
        assert!(matches!(orelse[0], Node::IfStmt { orelse: Some(_), .. }));
    }

    #[test]
    fn test_if_without_else() {
        let f = parse_function("|s, dt| { if dt > 0 { x = 1; } x }").unwrap();
        assert!(matches!(f.body[0], Node::IfStmt { orelse: None, .. }));
        assert_eq!(f.body[1], Node::ret(Node::name("x")));
    }

    #[test]
    fn test_value_if_is_conditional_expression() {
        let f = parse_function("|s, dt| { let v = if dt < 3 { 25 } else { 35 }; v }").unwrap();
        let Node::Assign { value, .. } = &f.body[0] else {
            panic!("expected assignment");
        };
        assert!(matches!(value.as_ref(), Node::IfExpr { .. }));

        let tail = parse_function("|s, dt| if dt < 3 { 25 } else { 35 }").unwrap();
        assert!(matches!(&tail.body[0], Node::Return(Some(v)) if matches!(v.as_ref(), Node::IfExpr { .. })));
    }

    #[test]
    fn test_boolean_chains_flatten() {
        let f = parse_function("|s, dt| a && b && (c || d)").unwrap();
        let Node::Return(Some(value)) = &f.body[0] else {
            panic!("expected return");
        };
        let Node::BoolOp { op, values } = value.as_ref() else {
            panic!("expected boolean operation");
        };
        assert_eq!(*op, BoolOp::And);
        assert_eq!(values.len(), 3);
        assert!(matches!(&values[2], Node::BoolOp { op: BoolOp::Or, values } if values.len() == 2));
    }

    #[test]
    fn test_pow_and_unsupported_calls() {
        let f = parse_function("|s, dt| { a = dt.powi(2); b = dt.abs(); }").unwrap();
        assert_eq!(
            f.body[0],
            Node::assign(Node::name("a"), Node::binop(BinaryOp::Pow, Node::name("dt"), Node::int(2)))
        );
        assert!(matches!(&f.body[1], Node::Assign { value, .. } if matches!(value.as_ref(), Node::Unsupported(_))));
    }

    #[test]
    fn test_literal_forms() {
        let f = parse_function("|s, dt| { a = 18.1; b = 2f64; c = true; d = \"on\"; }").unwrap();
        let values: Vec<&Node> = f
            .body
            .iter()
            .map(|n| match n {
                Node::Assign { value, .. } => value.as_ref(),
                other => other,
            })
            .collect();
        assert_eq!(*values[0], Node::real(Rational::new(181, 10).unwrap()));
        assert_eq!(*values[1], Node::real(Rational::from_int(2)));
        assert_eq!(*values[2], Node::Literal(Literal::Bool(true)));
        assert_eq!(*values[3], Node::Literal(Literal::Str("on".into())));
    }

    #[test]
    fn test_long_decimal_literal_stays_exact() {
        let f = parse_function("|s, dt| 0.10000000000000000000001").unwrap();
        let expected = Rational::parse_decimal("0.10000000000000000000001").unwrap();
        assert_eq!(f.body, vec![Node::ret(Node::real(expected))]);
    }

    #[test]
    fn test_parenthesized_comparison_is_an_operand() {
        let f = parse_function("|s, dt| (a < b) == c").unwrap();
        assert_eq!(
            f.body,
            vec![Node::ret(Node::compare(
                Node::compare(Node::name("a"), CmpOp::Lt, Node::name("b")),
                CmpOp::Eq,
                Node::name("c"),
            ))]
        );
    }

    #[test]
    fn test_type_annotations_declare_local_sorts() {
        let f = parse_function(
            "fn update(&self, dt: f64) -> f64 {
                let n: i64 = 3;
                let x = 1.5;
                if dt > 0.0 { let r: f64 = 2.0; let b: bool = true; }
                let s: String = 1;
                return x;
            }",
        )
        .unwrap();
        let declared: Vec<(&str, &Sort)> = f.declared.iter().map(|(k, v)| (k.as_str(), v)).collect();
        assert_eq!(declared, vec![("n", &Sort::Int), ("r", &Sort::Real), ("b", &Sort::Bool)]);

        let closure = parse_function("|s, dt| { let k: u32 = 2; k }").unwrap();
        assert_eq!(closure.declared.get("k"), Some(&Sort::Int));
        assert!(parse_function("|s, dt| dt").unwrap().declared.is_empty());
    }

    #[test]
    fn test_casts_are_transparent() {
        let f = parse_function("|s, dt| (dt * 2.5) as i64").unwrap();
        assert_eq!(
            f.body,
            vec![Node::ret(Node::binop(
                BinaryOp::Mul,
                Node::name("dt"),
                Node::real(Rational::new(5, 2).unwrap()),
            ))]
        );
    }

    #[test]
    fn test_rejects_non_functions() {
        assert!(matches!(parse_function("42"), Err(ParseError::NotAFunction(_))));
        assert!(matches!(parse_function("fn broken( {"), Err(ParseError::Syntax(_))));
        assert!(matches!(parse_function("|(a, b), dt| a"), Err(ParseError::Parameter(_))));
    }
}
