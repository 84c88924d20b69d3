//! Statement checking: `let`/`const` binding, assignment legality, control
//! flow, `switch` exhaustiveness, and a simple divergence analysis used to
//! enforce "returns a value on all paths" and flag unreachable code.

use super::exprs::check_expr;
use super::Checker;
use crate::ast;
use crate::checked::*;
use crate::diagnostics::DiagnosticSink;
use crate::symbols::{ScopeFlags, Symbol, VariableSymbol};
use crate::types::Type;
use rustc_hash::FxHashSet;

/// Checks a block, returning the lowered statements and whether control
/// flow is guaranteed not to fall off the end (every path returns, throws,
/// breaks, or continues). Statements after the first diverging statement
/// are still checked (so later errors still surface) but warned as dead.
pub fn check_block(c: &mut Checker, block: &ast::Block, sink: &mut DiagnosticSink) -> (CheckedBlock, bool) {
    c.scopes.push(ScopeFlags::default(), None);
    let mut out = Vec::with_capacity(block.len());
    let mut diverges = false;
    let mut warned_unreachable = false;
    for stmt in block {
        if diverges && !warned_unreachable {
            sink.warning(&c.current_file, stmt_span(stmt), "unreachable code");
            warned_unreachable = true;
        }
        let (checked, stmt_diverges) = check_stmt(c, stmt, sink);
        out.push(checked);
        diverges = diverges || stmt_diverges;
    }
    c.scopes.pop();
    (out, diverges)
}

fn stmt_span(stmt: &ast::Stmt) -> crate::source::Span {
    match stmt {
        ast::Stmt::Let { span, .. }
        | ast::Stmt::Const { span, .. }
        | ast::Stmt::Assign { span, .. }
        | ast::Stmt::Return(_, span)
        | ast::Stmt::Throw(_, span)
        | ast::Stmt::If { span, .. }
        | ast::Stmt::While { span, .. }
        | ast::Stmt::For { span, .. }
        | ast::Stmt::Switch { span, .. }
        | ast::Stmt::Defer(_, span)
        | ast::Stmt::Unsafe(_, span)
        | ast::Stmt::Break(span)
        | ast::Stmt::Continue(span) => *span,
        ast::Stmt::Expr(e) => e.span(),
    }
}

fn check_stmt(c: &mut Checker, stmt: &ast::Stmt, sink: &mut DiagnosticSink) -> (CheckedStmt, bool) {
    match stmt {
        ast::Stmt::Let { name, ty, value, is_mut, span } => {
            let expected = ty.as_ref().map(|te| {
                let gset = FxHashSet::default();
                super::resolve_type(c, te, &gset, sink, &c.current_file.clone())
            });
            let value = check_expr(c, value, expected.as_ref(), sink);
            let final_ty = expected.unwrap_or_else(|| value.ty.clone());
            if c.scopes.defined_in_current_scope(name) {
                sink.error(&c.current_file, *span, format!("'{name}' is already declared in this scope"));
            }
            c.scopes.define(
                name,
                Symbol::Variable(VariableSymbol {
                    ty: final_ty.clone(),
                    is_mutable: *is_mut,
                    is_const: false,
                    is_moved: false,
                }),
            );
            (
                CheckedStmt::Let {
                    name: name.clone(),
                    ty: final_ty,
                    value,
                    is_mut: *is_mut,
                },
                false,
            )
        }
        ast::Stmt::Const { name, ty, value, span } => {
            let expected = ty.as_ref().map(|te| {
                let gset = FxHashSet::default();
                super::resolve_type(c, te, &gset, sink, &c.current_file.clone())
            });
            let value = check_expr(c, value, expected.as_ref(), sink);
            let final_ty = expected.unwrap_or_else(|| value.ty.clone());
            if c.scopes.defined_in_current_scope(name) {
                sink.error(&c.current_file, *span, format!("'{name}' is already declared in this scope"));
            }
            c.scopes.define(
                name,
                Symbol::Variable(VariableSymbol {
                    ty: final_ty.clone(),
                    is_mutable: false,
                    is_const: true,
                    is_moved: false,
                }),
            );
            (
                CheckedStmt::Const {
                    name: name.clone(),
                    ty: final_ty,
                    value,
                },
                false,
            )
        }
        ast::Stmt::Assign { target, value, span } => {
            if let ast::Expr::Ident(name, _) = target {
                match c.scopes.lookup(name) {
                    Some(Symbol::Variable(v)) if !v.is_mutable => {
                        sink.error(&c.current_file, *span, format!("cannot assign to immutable variable '{name}'"));
                    }
                    Some(Symbol::Variable(v)) if v.is_moved => {
                        sink.error(&c.current_file, *span, format!("'{name}' was moved and cannot be assigned to"));
                    }
                    None => match super::lookup_name(c, name) {
                        super::Resolved::Const(_) => {
                            sink.error(&c.current_file, *span, format!("cannot assign to const '{name}'"));
                        }
                        super::Resolved::Unknown => {
                            sink.error(&c.current_file, *span, format!("undeclared name '{name}'"));
                        }
                        _ => {}
                    },
                    _ => {}
                }
            }
            let target_checked = check_expr(c, target, None, sink);
            let value_checked = check_expr(c, value, Some(&target_checked.ty), sink);
            (
                CheckedStmt::Assign {
                    target: target_checked,
                    value: value_checked,
                },
                false,
            )
        }
        ast::Stmt::Expr(e) => (CheckedStmt::Expr(check_expr(c, e, None, sink)), false),
        ast::Stmt::Return(value, span) => {
            let expected_ret = c.scopes.function_context().map(|ft| ft.return_type.clone());
            let checked = match (value, &expected_ret) {
                (Some(v), Some(ret)) => Some(check_expr(c, v, Some(ret), sink)),
                (Some(v), None) => Some(check_expr(c, v, None, sink)),
                (None, Some(ret)) if *ret != Type::Void => {
                    sink.error(&c.current_file, *span, "missing return value");
                    None
                }
                (None, _) => None,
            };
            (CheckedStmt::Return(checked), true)
        }
        ast::Stmt::Throw(value, span) => {
            let throws = c
                .scopes
                .function_context()
                .map(|ft| ft.throws.clone())
                .unwrap_or_default();
            let value_checked = check_expr(c, value, None, sink);
            let struct_name = match &value_checked.ty {
                Type::Struct(n) => n.clone(),
                _ => {
                    sink.error(&c.current_file, *span, "'throw' value must be a struct type");
                    String::new()
                }
            };
            let tag_index = throws
                .iter()
                .position(|t| matches!(t, Type::Struct(n) if *n == struct_name))
                .map(|i| (i + 1) as u32);
            let tag_index = match tag_index {
                Some(i) => i,
                None => {
                    sink.error(
                        &c.current_file,
                        *span,
                        format!("'{struct_name}' is not declared in this function's 'throws' list"),
                    );
                    0
                }
            };
            (
                CheckedStmt::Throw {
                    struct_name,
                    tag_index,
                    value: value_checked,
                },
                true,
            )
        }
        ast::Stmt::If { cond, then_branch, else_branch, .. } => {
            let cond_checked = check_expr(c, cond, Some(&Type::Bool), sink);
            let (then_checked, then_diverges) = check_block(c, then_branch, sink);
            let (else_checked, else_diverges) = match else_branch {
                Some(b) => {
                    let (checked, d) = check_block(c, b, sink);
                    (Some(checked), d)
                }
                None => (None, false),
            };
            let diverges = then_diverges && else_checked.is_some() && else_diverges;
            (
                CheckedStmt::If {
                    cond: cond_checked,
                    then_branch: then_checked,
                    else_branch: else_checked,
                },
                diverges,
            )
        }
        ast::Stmt::While { cond, body, .. } => {
            let cond_checked = check_expr(c, cond, Some(&Type::Bool), sink);
            c.scopes.push(ScopeFlags { is_unsafe: false, is_loop: true }, None);
            let (body_checked, _) = check_block(c, body, sink);
            c.scopes.pop();
            (
                CheckedStmt::While {
                    cond: cond_checked,
                    body: body_checked,
                },
                false,
            )
        }
        ast::Stmt::For { var, start, end, inclusive, body, span: _ } => {
            let start_checked = check_expr(c, start, Some(&Type::I32), sink);
            let end_checked = check_expr(c, end, Some(&start_checked.ty), sink);
            let elem_ty = start_checked.ty.clone();
            c.scopes.push(ScopeFlags { is_unsafe: false, is_loop: true }, None);
            c.scopes.define(
                var,
                Symbol::Variable(VariableSymbol {
                    ty: elem_ty.clone(),
                    is_mutable: false,
                    is_const: false,
                    is_moved: false,
                }),
            );
            let (body_checked, _) = check_block(c, body, sink);
            c.scopes.pop();
            (
                CheckedStmt::For {
                    var: var.clone(),
                    elem_ty,
                    start: start_checked,
                    end: end_checked,
                    inclusive: *inclusive,
                    body: body_checked,
                },
                false,
            )
        }
        ast::Stmt::Switch { subject, arms, default, span } => check_switch(c, subject, arms, default, *span, sink),
        ast::Stmt::Defer(inner, _) => {
            let (checked, _) = check_stmt(c, inner, sink);
            (CheckedStmt::Defer(Box::new(checked)), false)
        }
        ast::Stmt::Unsafe(body, _) => {
            c.scopes.push(ScopeFlags { is_unsafe: true, is_loop: false }, None);
            let (checked, diverges) = check_block(c, body, sink);
            c.scopes.pop();
            (CheckedStmt::Unsafe(checked), diverges)
        }
        ast::Stmt::Break(span) => {
            if !c.scopes.in_loop() {
                sink.error(&c.current_file, *span, "'break' outside of a loop");
            }
            (CheckedStmt::Break, true)
        }
        ast::Stmt::Continue(span) => {
            if !c.scopes.in_loop() {
                sink.error(&c.current_file, *span, "'continue' outside of a loop");
            }
            (CheckedStmt::Continue, true)
        }
    }
}

fn check_switch(
    c: &mut Checker,
    subject: &ast::Expr,
    arms: &[ast::SwitchArm],
    default: &Option<ast::Block>,
    span: crate::source::Span,
    sink: &mut DiagnosticSink,
) -> (CheckedStmt, bool) {
    let subject_checked = check_expr(c, subject, None, sink);
    let enum_name = match &subject_checked.ty {
        Type::Enum(n) => Some(n.clone()),
        _ => None,
    };

    let variants = enum_name
        .as_ref()
        .and_then(|n| c.tables.enums.get(n))
        .map(|e| e.variants.clone())
        .unwrap_or_default();

    let mut covered = Vec::new();
    let mut checked_arms = Vec::with_capacity(arms.len());
    let mut all_arms_diverge = true;

    for arm in arms {
        let mut values = Vec::with_capacity(arm.values.len());
        c.scopes.push(ScopeFlags::default(), None);
        for v in &arm.values {
            match v {
                ast::SwitchCaseValue::Const(text) => {
                    if let Some(variant) = variants.iter().find(|variant| variant.name == *text) {
                        covered.push(variant.name.clone());
                        values.push(CheckedCaseValue::Variant {
                            discriminant: variant.discriminant,
                            bindings: Vec::new(),
                        });
                    } else if let Ok(n) = text.parse::<i64>() {
                        values.push(CheckedCaseValue::Const(n));
                    } else {
                        sink.error(&c.current_file, arm.span, format!("unknown case value '{text}'"));
                    }
                }
                ast::SwitchCaseValue::Variant { name, bindings } => {
                    let variant = variants.iter().find(|variant| variant.name == *name).cloned();
                    let Some(variant) = variant else {
                        sink.error(&c.current_file, arm.span, format!("unknown variant '{name}'"));
                        continue;
                    };
                    covered.push(variant.name.clone());
                    let mut bound = Vec::with_capacity(bindings.len());
                    for (binding, (_, fty)) in bindings.iter().zip(variant.fields.iter()) {
                        c.scopes.define(
                            binding,
                            Symbol::Variable(VariableSymbol {
                                ty: fty.clone(),
                                is_mutable: false,
                                is_const: false,
                                is_moved: false,
                            }),
                        );
                        bound.push((binding.clone(), fty.clone()));
                    }
                    values.push(CheckedCaseValue::Variant {
                        discriminant: variant.discriminant,
                        bindings: bound,
                    });
                }
            }
        }
        let (body, diverges) = check_block(c, &arm.body, sink);
        c.scopes.pop();
        all_arms_diverge = all_arms_diverge && diverges;
        checked_arms.push(CheckedSwitchArm { values, body });
    }

    let default_checked = default.as_ref().map(|b| {
        c.scopes.push(ScopeFlags::default(), None);
        let (body, diverges) = check_block(c, b, sink);
        c.scopes.pop();
        (body, diverges)
    });

    if let Some(name) = &enum_name {
        if default_checked.is_none() {
            for v in &variants {
                if !covered.contains(&v.name) {
                    sink.error(&c.current_file, span, format!("switch over '{name}' does not cover variant '{}'", v.name));
                }
            }
        }
    } else if default_checked.is_none() {
        sink.error(&c.current_file, span, "switch over a non-enum type requires a 'default' clause");
    }

    let default_diverges = default_checked.as_ref().map(|(_, d)| *d).unwrap_or(false);
    let diverges = all_arms_diverge && default_checked.is_some() && default_diverges;

    (
        CheckedStmt::Switch {
            subject: subject_checked,
            arms: checked_arms,
            default: default_checked.map(|(b, _)| b),
        },
        diverges,
    )
}
