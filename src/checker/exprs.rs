//! Expression checking: literal coercion, overload resolution, operator
//! binding, generic monomorphization, and the throws/catch legality rules.
//!
//! Call arguments are first checked with no expected type to get each
//! argument's natural type (used for overload selection); once an overload
//! is chosen, a literal argument's recorded `ty` is widened to the chosen
//! parameter type in place, since a literal's `CheckedExprKind` carries the
//! same payload regardless of its final type.

use super::stmts::check_block;
use super::{Checker, FuncOverloadDef, Resolved};
use crate::ast;
use crate::checked::*;
use crate::diagnostics::DiagnosticSink;
use crate::source::Span;
use crate::symbols::{ScopeFlags, Symbol, VariableSymbol};
use crate::types::{mangle_type_name, mangle_type_suffix, FunctionType, ParamType, Type};
use rustc_hash::{FxHashMap, FxHashSet};

pub fn check_top_level_function(
    c: &mut Checker,
    f: &ast::FunctionDecl,
    method_of: Option<String>,
    sink: &mut DiagnosticSink,
) {
    let key = match &method_of {
        Some(s) => format!("{s}_{}", f.name),
        None => f.name.clone(),
    };
    let Some(idx) = c.tables.functions[&key]
        .iter()
        .position(|o| o.decl.span == f.span)
    else {
        return;
    };
    let (signature, mangled_name) = {
        let o = &c.tables.functions[&key][idx];
        (o.signature.clone(), o.mangled_name.clone())
    };
    check_function_body(c, f, &signature, &mangled_name, method_of, sink);
}

/// Checks one function body against an already-resolved (possibly
/// substituted, for a monomorphized generic) signature, and records the
/// result in the program.
fn check_function_body(
    c: &mut Checker,
    f: &ast::FunctionDecl,
    signature: &FunctionType,
    mangled_name: &str,
    method_of: Option<String>,
    sink: &mut DiagnosticSink,
) {
    let Some(body_ast) = &f.body else { return };

    c.scopes.push(ScopeFlags::default(), Some(signature.clone()));
    for p in &signature.params {
        c.scopes.define(
            &p.name,
            Symbol::Variable(VariableSymbol {
                ty: p.ty.clone(),
                is_mutable: p.is_mut,
                is_const: false,
                is_moved: false,
            }),
        );
    }

    let (body, diverges) = check_block(c, body_ast, sink);
    if signature.return_type != Type::Void && !diverges {
        sink.error(
            &c.current_file,
            f.span,
            format!(
                "function '{}' does not return a value on all paths",
                f.name
            ),
        );
    }
    c.scopes.pop();

    let throws: Vec<String> = signature
        .throws
        .iter()
        .map(|t| match t {
            Type::Struct(n) => n.clone(),
            other => other.to_string(),
        })
        .collect();

    c.program.functions.insert(
        mangled_name.to_string(),
        FunctionInfo {
            mangled_name: mangled_name.to_string(),
            module_name: c.current_module.clone(),
            params: signature
                .params
                .iter()
                .map(|p| ParamInfo {
                    name: p.name.clone(),
                    ty: p.ty.clone(),
                    is_mut: p.is_mut,
                    is_move: p.is_move,
                })
                .collect(),
            return_type: signature.return_type.clone(),
            throws,
            body,
            is_method_of: method_of,
        },
    );
    c.program.function_order.push(mangled_name.to_string());
}

pub fn check_top_level_const(c: &mut Checker, k: &ast::ConstDecl, sink: &mut DiagnosticSink) {
    let expected = c.tables.consts.get(&k.name).and_then(|d| d.ty.clone());
    let value = check_expr(c, &k.value, expected.as_ref(), sink);
    let ty = expected.unwrap_or_else(|| value.ty.clone());
    c.program.consts.insert(
        k.name.clone(),
        ConstInfo {
            name: k.name.clone(),
            ty,
            value,
        },
    );
    c.program.const_order.push(k.name.clone());
}

/// True if `expr` is a literal AST node with no explicit numeric suffix —
/// the only shape eligible for fit-based literal coercion.
fn is_unsuffixed_literal(expr: &ast::Expr) -> bool {
    match expr {
        ast::Expr::IntLiteral { suffix, .. } | ast::Expr::FloatLiteral { suffix, .. } => {
            suffix.is_none()
        }
        _ => false,
    }
}

/// Checks `expr` with an optional expected type; literal coercion is
/// applied only when `expr` is itself a literal AST node.
pub fn check_expr(
    c: &mut Checker,
    expr: &ast::Expr,
    expected: Option<&Type>,
    sink: &mut DiagnosticSink,
) -> CheckedExpr {
    let span = expr.span();
    let mut checked = check_expr_inner(c, expr, expected, sink);
    if let Some(target) = expected {
        if is_unsuffixed_literal(expr) && target != &checked.ty {
            let fits = match &*checked.kind {
                CheckedExprKind::IntLiteral(v) => {
                    target.accepts_int_literal(*v) || target.accepts_float_literal()
                }
                CheckedExprKind::FloatLiteral(_) => target.accepts_float_literal(),
                _ => false,
            };
            if fits {
                checked.ty = target.clone();
            } else if !matches!(target, Type::Error) && !matches!(checked.ty, Type::Error) {
                sink.error(
                    &c.current_file,
                    span,
                    format!(
                        "literal does not fit in type '{target}' (found literal of type '{}')",
                        checked.ty
                    ),
                );
            }
        }
    }
    checked
}

fn check_expr_inner(
    c: &mut Checker,
    expr: &ast::Expr,
    expected: Option<&Type>,
    sink: &mut DiagnosticSink,
) -> CheckedExpr {
    let span = expr.span();
    match expr {
        ast::Expr::IntLiteral { text, suffix, .. } => {
            let ty = match suffix.as_deref().and_then(Type::from_alias) {
                Some(t) => t,
                None => Type::I32,
            };
            let value = parse_int_literal(text).unwrap_or(0);
            CheckedExpr {
                kind: Box::new(CheckedExprKind::IntLiteral(value)),
                ty,
                span,
            }
        }
        ast::Expr::FloatLiteral { text, suffix, .. } => {
            let ty = match suffix.as_deref().and_then(Type::from_alias) {
                Some(t) => t,
                None => Type::F64,
            };
            let cleaned: String = text.chars().filter(|c| *c != '_').collect();
            let value: f64 = cleaned.parse().unwrap_or(0.0);
            CheckedExpr {
                kind: Box::new(CheckedExprKind::FloatLiteral(value)),
                ty,
                span,
            }
        }
        ast::Expr::StringLiteral(s, _) => CheckedExpr {
            kind: Box::new(CheckedExprKind::StringLiteral(s.clone())),
            ty: Type::String,
            span,
        },
        ast::Expr::BoolLiteral(b, _) => CheckedExpr {
            kind: Box::new(CheckedExprKind::BoolLiteral(*b)),
            ty: Type::Bool,
            span,
        },
        ast::Expr::NullLiteral(_) => CheckedExpr {
            kind: Box::new(CheckedExprKind::Null),
            ty: Type::Null,
            span,
        },
        ast::Expr::ArrayLiteral(elems, _) => check_array_literal(c, elems, expected, span, sink),
        ast::Expr::Ident(name, _) => check_ident(c, name, span, sink),
        ast::Expr::StructLiteral { name, fields, .. } => {
            check_struct_literal(c, name, fields, span, sink)
        }
        ast::Expr::FieldAccess { base, field, .. } => check_field_access(c, base, field, span, sink),
        ast::Expr::Index { base, index, .. } => check_index(c, base, index, span, sink),
        ast::Expr::Call { callee, args, .. } => {
            let (kind, ty, throws) = check_call(c, callee, args, span, sink);
            if !throws.is_empty() {
                sink.error(
                    &c.current_file,
                    span,
                    "call to a function that may throw must be wrapped in 'catch'",
                );
            }
            CheckedExpr {
                kind: Box::new(kind),
                ty,
                span,
            }
        }
        ast::Expr::MethodCall {
            receiver,
            method,
            args,
            ..
        } => {
            let (kind, ty, throws) = check_method_call(c, receiver, method, args, span, sink);
            if !throws.is_empty() {
                sink.error(
                    &c.current_file,
                    span,
                    "call to a function that may throw must be wrapped in 'catch'",
                );
            }
            CheckedExpr {
                kind: Box::new(kind),
                ty,
                span,
            }
        }
        ast::Expr::Unary { op, expr: inner, .. } => check_unary(c, *op, inner, span, sink),
        ast::Expr::Binary { op, lhs, rhs, .. } => check_binary(c, *op, lhs, rhs, span, sink),
        ast::Expr::Cast { expr: inner, ty, .. } => {
            let inner_checked = check_expr(c, inner, None, sink);
            let gset: FxHashSet<String> = FxHashSet::default();
            let target = super::resolve_type(c, ty, &gset, sink, &c.current_file.clone());
            CheckedExpr {
                kind: Box::new(CheckedExprKind::Cast {
                    expr: Box::new(inner_checked),
                    target: target.clone(),
                }),
                ty: target,
                span,
            }
        }
        ast::Expr::Move(inner, _) => {
            let inner_checked = check_expr(c, inner, expected, sink);
            if let ast::Expr::Ident(name, _) = inner.as_ref() {
                if let Some(Symbol::Variable(v)) = c.scopes.lookup_mut(name) {
                    v.is_moved = true;
                }
            }
            let ty = inner_checked.ty.clone();
            CheckedExpr {
                kind: Box::new(CheckedExprKind::Move(Box::new(inner_checked))),
                ty,
                span,
            }
        }
        ast::Expr::Catch { call, kind, .. } => check_catch(c, call, kind, span, sink),
    }
}

fn parse_int_literal(text: &str) -> Option<i128> {
    let clean: String = text.chars().filter(|ch| *ch != '_').collect();
    if let Some(rest) = clean.strip_prefix("0x") {
        i128::from_str_radix(rest, 16).ok()
    } else if let Some(rest) = clean.strip_prefix("0b") {
        i128::from_str_radix(rest, 2).ok()
    } else if let Some(rest) = clean.strip_prefix("0o") {
        i128::from_str_radix(rest, 8).ok()
    } else {
        clean.parse::<i128>().ok()
    }
}

fn check_array_literal(
    c: &mut Checker,
    elems: &[ast::Expr],
    expected: Option<&Type>,
    span: Span,
    sink: &mut DiagnosticSink,
) -> CheckedExpr {
    if elems.is_empty() {
        sink.error(&c.current_file, span, "empty array literal");
        return CheckedExpr {
            kind: Box::new(CheckedExprKind::ArrayLiteral(Vec::new())),
            ty: Type::Error,
            span,
        };
    }
    let elem_expected = match expected {
        Some(Type::Array(elem, _)) => Some(elem.as_ref().clone()),
        _ => None,
    };
    let mut checked = Vec::with_capacity(elems.len());
    for e in elems {
        checked.push(check_expr(c, e, elem_expected.as_ref(), sink));
    }
    let elem_ty = elem_expected.unwrap_or_else(|| checked[0].ty.clone());
    let len = checked.len() as u64;
    CheckedExpr {
        kind: Box::new(CheckedExprKind::ArrayLiteral(checked)),
        ty: Type::Array(Box::new(elem_ty), len),
        span,
    }
}

fn check_ident(c: &mut Checker, name: &str, span: Span, sink: &mut DiagnosticSink) -> CheckedExpr {
    match super::lookup_name(c, name) {
        Resolved::Variable(ty, _) => CheckedExpr {
            kind: Box::new(CheckedExprKind::Local(name.to_string())),
            ty,
            span,
        },
        Resolved::Const(name) => {
            let ty = c
                .program
                .consts
                .get(&name)
                .map(|i| i.ty.clone())
                .or_else(|| c.tables.consts.get(&name).and_then(|d| d.ty.clone()))
                .unwrap_or(Type::Error);
            CheckedExpr {
                kind: Box::new(CheckedExprKind::GlobalConst(name)),
                ty,
                span,
            }
        }
        Resolved::Module(m) => CheckedExpr {
            kind: Box::new(CheckedExprKind::Local(name.to_string())),
            ty: Type::Module(m),
            span,
        },
        Resolved::Function(_) => {
            sink.error(
                &c.current_file,
                span,
                format!("'{name}' is a function; call it with '{name}(...)'"),
            );
            CheckedExpr {
                kind: Box::new(CheckedExprKind::Local(name.to_string())),
                ty: Type::Error,
                span,
            }
        }
        Resolved::Unknown => {
            sink.error(&c.current_file, span, format!("undeclared name '{name}'"));
            CheckedExpr {
                kind: Box::new(CheckedExprKind::Local(name.to_string())),
                ty: Type::Error,
                span,
            }
        }
    }
}

fn check_struct_literal(
    c: &mut Checker,
    name: &str,
    fields: &[(String, ast::Expr)],
    span: Span,
    sink: &mut DiagnosticSink,
) -> CheckedExpr {
    if !c.tables.structs.contains_key(name) {
        sink.error(&c.current_file, span, format!("unknown struct '{name}'"));
        return CheckedExpr {
            kind: Box::new(CheckedExprKind::StructLiteral {
                name: name.to_string(),
                fields: Vec::new(),
            }),
            ty: Type::Error,
            span,
        };
    }

    let generics = c.tables.structs[name].decl.generics.clone();
    if generics.is_empty() {
        let field_defs = c.tables.structs[name].fields.clone();
        let mut checked = Vec::with_capacity(fields.len());
        for (fname, fvalue) in fields {
            let expected_ty = field_defs.iter().find(|(n, _)| n == fname).map(|(_, t)| t.clone());
            if expected_ty.is_none() {
                sink.error(
                    &c.current_file,
                    span,
                    format!("struct '{name}' has no field '{fname}'"),
                );
            }
            checked.push(check_expr(c, fvalue, expected_ty.as_ref(), sink));
        }
        return CheckedExpr {
            kind: Box::new(CheckedExprKind::StructLiteral {
                name: name.to_string(),
                fields: checked,
            }),
            ty: Type::Struct(name.to_string()),
            span,
        };
    }

    // Generic struct literal: infer type arguments by unifying each
    // declared (generic) field type against its supplied value's type.
    let field_src = c.tables.structs[name].decl.fields.clone();
    let mut natural = Vec::with_capacity(fields.len());
    for (fname, fvalue) in fields {
        natural.push((fname.clone(), check_expr(c, fvalue, None, sink)));
    }
    let mut bindings: FxHashMap<String, Type> = FxHashMap::default();
    for fdecl in &field_src {
        if let Some((_, value)) = natural.iter().find(|(n, _)| n == &fdecl.name) {
            let declared = super::resolve_type(
                c,
                &fdecl.ty,
                &generics.iter().cloned().collect::<FxHashSet<String>>(),
                sink,
                &c.current_file.clone(),
            );
            super::unify(&declared, &value.ty, &mut bindings);
        }
    }
    let args: Vec<Type> = generics
        .iter()
        .map(|g| bindings.get(g).cloned().unwrap_or(Type::Error))
        .collect();
    let file = c.current_file.clone();
    let mangled = super::instantiate_struct(c, name, &args, sink, &file, span);

    let field_defs = c
        .program
        .structs
        .get(&mangled)
        .map(|s| s.fields.clone())
        .unwrap_or_default();
    let mut checked = Vec::with_capacity(natural.len());
    for (fname, value) in natural {
        let expected_ty = field_defs.iter().find(|(n, _)| n == &fname).map(|(_, t)| t.clone());
        let mut value = value;
        if let Some(target) = &expected_ty {
            if target_needs_widen(&value, target) {
                value.ty = target.clone();
            }
        }
        checked.push(value);
    }
    CheckedExpr {
        kind: Box::new(CheckedExprKind::StructLiteral {
            name: mangled.clone(),
            fields: checked,
        }),
        ty: Type::Struct(mangled),
        span,
    }
}

fn target_needs_widen(value: &CheckedExpr, target: &Type) -> bool {
    target != &value.ty
        && matches!(
            &*value.kind,
            CheckedExprKind::IntLiteral(_) | CheckedExprKind::FloatLiteral(_)
        )
}

fn check_field_access(
    c: &mut Checker,
    base: &ast::Expr,
    field: &str,
    span: Span,
    sink: &mut DiagnosticSink,
) -> CheckedExpr {
    // `module.symbol` (no call) — re-resolve as a direct name in the flat
    // global namespace, same as importing it.
    if let ast::Expr::Ident(name, _) = base {
        if let Resolved::Module(_) = super::lookup_name(c, name) {
            return check_ident(c, field, span, sink);
        }
    }

    let base_checked = check_expr(c, base, None, sink);
    match &base_checked.ty {
        Type::Array(_, len) if field == "len" => CheckedExpr {
            kind: Box::new(CheckedExprKind::IntLiteral(*len as i128)),
            ty: Type::U64,
            span,
        },
        Type::Struct(sname) => {
            let fields = c
                .program
                .structs
                .get(sname)
                .map(|s| s.fields.clone())
                .unwrap_or_default();
            let ty = fields
                .iter()
                .find(|(n, _)| n == field)
                .map(|(_, t)| t.clone())
                .unwrap_or_else(|| {
                    sink.error(
                        &c.current_file,
                        span,
                        format!("struct '{sname}' has no field '{field}'"),
                    );
                    Type::Error
                });
            CheckedExpr {
                kind: Box::new(CheckedExprKind::FieldAccess {
                    base: Box::new(base_checked),
                    field: field.to_string(),
                }),
                ty,
                span,
            }
        }
        Type::Error => CheckedExpr {
            kind: Box::new(CheckedExprKind::FieldAccess {
                base: Box::new(base_checked),
                field: field.to_string(),
            }),
            ty: Type::Error,
            span,
        },
        other => {
            sink.error(
                &c.current_file,
                span,
                format!("type '{other}' has no field '{field}'"),
            );
            CheckedExpr {
                kind: Box::new(CheckedExprKind::FieldAccess {
                    base: Box::new(base_checked),
                    field: field.to_string(),
                }),
                ty: Type::Error,
                span,
            }
        }
    }
}

fn check_index(
    c: &mut Checker,
    base: &ast::Expr,
    index: &ast::Expr,
    span: Span,
    sink: &mut DiagnosticSink,
) -> CheckedExpr {
    let base_checked = check_expr(c, base, None, sink);
    let index_checked = check_expr(c, index, Some(&Type::U64), sink);

    match &base_checked.ty {
        Type::Array(elem, len) => CheckedExpr {
            kind: Box::new(CheckedExprKind::Index {
                base: Box::new(base_checked),
                index: Box::new(index_checked),
                static_length: Some(*len),
            }),
            ty: elem.as_ref().clone(),
            span,
        },
        Type::Slice(elem) => CheckedExpr {
            kind: Box::new(CheckedExprKind::Index {
                base: Box::new(base_checked),
                index: Box::new(index_checked),
                static_length: None,
            }),
            ty: elem.as_ref().clone(),
            span,
        },
        Type::Struct(sname) => {
            // `op_index` overload.
            let key = format!("{sname}_op_index");
            match resolve_overload_call(c, &key, &[index.clone()], &[index_checked.clone()], span, sink) {
                Some((mangled, ret, _throws)) => CheckedExpr {
                    kind: Box::new(CheckedExprKind::OperatorCall {
                        mangled_name: mangled,
                        receiver: Box::new(base_checked),
                        args: vec![index_checked],
                    }),
                    ty: ret,
                    span,
                },
                None => {
                    sink.error(&c.current_file, span, format!("'{sname}' does not implement 'op_index'"));
                    CheckedExpr {
                        kind: Box::new(CheckedExprKind::Index {
                            base: Box::new(base_checked),
                            index: Box::new(index_checked),
                            static_length: None,
                        }),
                        ty: Type::Error,
                        span,
                    }
                }
            }
        }
        Type::Error => CheckedExpr {
            kind: Box::new(CheckedExprKind::Index {
                base: Box::new(base_checked),
                index: Box::new(index_checked),
                static_length: None,
            }),
            ty: Type::Error,
            span,
        },
        other => {
            sink.error(&c.current_file, span, format!("type '{other}' cannot be indexed"));
            CheckedExpr {
                kind: Box::new(CheckedExprKind::Index {
                    base: Box::new(base_checked),
                    index: Box::new(index_checked),
                    static_length: None,
                }),
                ty: Type::Error,
                span,
            }
        }
    }
}

fn check_unary(
    c: &mut Checker,
    op: ast::UnaryOp,
    inner: &ast::Expr,
    span: Span,
    sink: &mut DiagnosticSink,
) -> CheckedExpr {
    let inner_checked = check_expr(c, inner, None, sink);
    if let Type::Struct(sname) = &inner_checked.ty {
        let method = match op {
            ast::UnaryOp::Neg => "op_neg",
            ast::UnaryOp::Not => "op_not",
            ast::UnaryOp::BitNot => "op_bit_not",
        };
        let key = format!("{sname}_{method}");
        if let Some((mangled, ret, _)) = resolve_overload_call(c, &key, &[], &[], span, sink) {
            return CheckedExpr {
                kind: Box::new(CheckedExprKind::UnaryOperatorCall {
                    mangled_name: mangled,
                    receiver: Box::new(inner_checked),
                }),
                ty: ret,
                span,
            };
        }
        sink.error(&c.current_file, span, format!("'{sname}' does not implement '{method}'"));
        return CheckedExpr {
            kind: Box::new(CheckedExprKind::Unary { op, expr: Box::new(inner_checked) }),
            ty: Type::Error,
            span,
        };
    }
    let ty = inner_checked.ty.clone();
    CheckedExpr {
        kind: Box::new(CheckedExprKind::Unary { op, expr: Box::new(inner_checked) }),
        ty,
        span,
    }
}

fn check_binary(
    c: &mut Checker,
    op: ast::BinaryOp,
    lhs: &ast::Expr,
    rhs: &ast::Expr,
    span: Span,
    sink: &mut DiagnosticSink,
) -> CheckedExpr {
    if matches!(op, ast::BinaryOp::LogicalAnd | ast::BinaryOp::LogicalOr) {
        let l = check_expr(c, lhs, Some(&Type::Bool), sink);
        let r = check_expr(c, rhs, Some(&Type::Bool), sink);
        let kind = if matches!(op, ast::BinaryOp::LogicalAnd) {
            CheckedExprKind::LogicalAnd(Box::new(l), Box::new(r))
        } else {
            CheckedExprKind::LogicalOr(Box::new(l), Box::new(r))
        };
        return CheckedExpr {
            kind: Box::new(kind),
            ty: Type::Bool,
            span,
        };
    }

    let l = check_expr(c, lhs, None, sink);

    // Struct-typed LHS: binds to an `op_*` method, or falls back to
    // field-wise structural comparison for `==`/`!=` without `op_eq`.
    if let Type::Struct(sname) = l.ty.clone() {
        let r = check_expr(c, rhs, Some(&l.ty), sink);
        if matches!(op, ast::BinaryOp::Eq | ast::BinaryOp::Neq) {
            let has_op_eq = c.program.structs.get(&sname).map(|s| s.has_op_eq).unwrap_or(false);
            if !has_op_eq {
                return CheckedExpr {
                    kind: Box::new(CheckedExprKind::StructEqCompare {
                        lhs: Box::new(l),
                        rhs: Box::new(r),
                        negate: matches!(op, ast::BinaryOp::Neq),
                    }),
                    ty: Type::Bool,
                    span,
                };
            }
        }
        if let Some(method) = op.method_name() {
            let key = format!("{sname}_{method}");
            let rhs_ast = vec![rhs.clone()];
            if let Some((mangled, ret, _)) = resolve_overload_call(c, &key, &rhs_ast, &[r.clone()], span, sink) {
                return CheckedExpr {
                    kind: Box::new(CheckedExprKind::OperatorCall {
                        mangled_name: mangled,
                        receiver: Box::new(l),
                        args: vec![r],
                    }),
                    ty: ret,
                    span,
                };
            }
            sink.error(&c.current_file, span, format!("'{sname}' does not implement '{method}'"));
        }
        return CheckedExpr {
            kind: Box::new(CheckedExprKind::Binary {
                op,
                lhs: Box::new(l),
                rhs: Box::new(r),
                operand_type: Type::Error,
            }),
            ty: Type::Error,
            span,
        };
    }

    let r = check_expr(c, rhs, Some(&l.ty), sink);
    let operand_type = l.ty.clone();
    let result_ty = match op {
        ast::BinaryOp::Eq
        | ast::BinaryOp::Neq
        | ast::BinaryOp::Lt
        | ast::BinaryOp::Le
        | ast::BinaryOp::Gt
        | ast::BinaryOp::Ge => Type::Bool,
        _ => l.ty.clone(),
    };
    if !matches!(l.ty, Type::Error) && !matches!(r.ty, Type::Error) && l.ty != r.ty {
        sink.error(
            &c.current_file,
            span,
            format!("type mismatch: expected '{}', found '{}'", l.ty, r.ty),
        );
    }
    CheckedExpr {
        kind: Box::new(CheckedExprKind::Binary {
            op,
            lhs: Box::new(l),
            rhs: Box::new(r),
            operand_type,
        }),
        ty: result_ty,
        span,
    }
}

/// Resolves and checks arguments against one overload set, applying
/// literal-coercion widening in place on success. Returns the chosen
/// mangled name, return type, and throws list.
fn resolve_overload_call(
    c: &mut Checker,
    key: &str,
    arg_asts: &[ast::Expr],
    arg_checked: &[CheckedExpr],
    span: Span,
    sink: &mut DiagnosticSink,
) -> Option<(String, Type, Vec<String>)> {
    let overloads = c.tables.functions.get(key)?.clone();
    let (idx, mut args) = select_overload(&overloads, arg_asts, arg_checked, &c.current_file.clone(), span, sink)?;
    widen_literals(&overloads[idx].signature, arg_asts, &mut args);
    let throws: Vec<String> = overloads[idx]
        .signature
        .throws
        .iter()
        .filter_map(|t| match t {
            Type::Struct(n) => Some(n.clone()),
            _ => None,
        })
        .collect();
    Some((
        overloads[idx].mangled_name.clone(),
        overloads[idx].signature.return_type.clone(),
        throws,
    ))
}

fn select_overload(
    overloads: &[FuncOverloadDef],
    arg_asts: &[ast::Expr],
    arg_checked: &[CheckedExpr],
    file: &std::path::Path,
    span: Span,
    sink: &mut DiagnosticSink,
) -> Option<(usize, Vec<CheckedExpr>)> {
    let mut matches = Vec::new();
    for (i, o) in overloads.iter().enumerate() {
        if o.signature.params.len() != arg_checked.len() {
            continue;
        }
        let mut coercions = 0usize;
        let mut ok = true;
        for (p, (a_ast, a_checked)) in o.signature.params.iter().zip(arg_asts.iter().zip(arg_checked.iter())) {
            if p.ty == a_checked.ty {
                continue;
            }
            if p.ty.assignable_from(&a_checked.ty) {
                continue;
            }
            if is_unsuffixed_literal(a_ast) {
                let fits = match &*a_checked.kind {
                    CheckedExprKind::IntLiteral(v) => p.ty.accepts_int_literal(*v) || p.ty.accepts_float_literal(),
                    CheckedExprKind::FloatLiteral(_) => p.ty.accepts_float_literal(),
                    _ => false,
                };
                if fits {
                    coercions += 1;
                    continue;
                }
            }
            ok = false;
            break;
        }
        if ok {
            matches.push((i, coercions));
        }
    }

    if matches.is_empty() {
        sink.error(file, span, "no matching overload for this call");
        return None;
    }
    let min = matches.iter().map(|(_, n)| *n).min().unwrap();
    let best: Vec<usize> = matches.iter().filter(|(_, n)| *n == min).map(|(i, _)| *i).collect();
    if best.len() > 1 {
        sink.error(file, span, "ambiguous call: multiple overloads match equally well");
        return None;
    }
    Some((best[0], arg_checked.to_vec()))
}

fn widen_literals(sig: &FunctionType, arg_asts: &[ast::Expr], args: &mut [CheckedExpr]) {
    for (p, (a_ast, a)) in sig.params.iter().zip(arg_asts.iter().zip(args.iter_mut())) {
        if p.ty != a.ty && is_unsuffixed_literal(a_ast) {
            if matches!(&*a.kind, CheckedExprKind::IntLiteral(_) | CheckedExprKind::FloatLiteral(_)) {
                a.ty = p.ty.clone();
            }
        }
    }
}

/// Checks a direct (non-method) call: `name(args)`. Only bare identifier
/// callees are supported — the grammar never produces any other callee
/// shape for a global function call (see `Parser::parse_postfix`).
fn check_call(
    c: &mut Checker,
    callee: &ast::Expr,
    args: &[ast::Expr],
    span: Span,
    sink: &mut DiagnosticSink,
) -> (CheckedExprKind, Type, Vec<String>) {
    let ast::Expr::Ident(name, _) = callee else {
        sink.error(&c.current_file, span, "expression is not callable");
        return (CheckedExprKind::Null, Type::Error, Vec::new());
    };

    if let Some(x) = c.program.externs.get(name).cloned() {
        let checked_args: Vec<CheckedExpr> = args
            .iter()
            .zip(x.params.iter())
            .map(|(a, p)| check_expr(c, a, Some(p), sink))
            .collect();
        if checked_args.len() != x.params.len() {
            sink.error(&c.current_file, span, format!("'{name}' expects {} argument(s)", x.params.len()));
        }
        return (
            CheckedExprKind::ExternCall { name: name.clone(), args: checked_args },
            x.return_type.clone(),
            Vec::new(),
        );
    }

    let visible_overloads: Vec<FuncOverloadDef> = c
        .tables
        .functions
        .get(name)
        .map(|os| os.iter().filter(|o| super::is_visible_overload(c, name, o)).cloned().collect())
        .unwrap_or_default();

    if visible_overloads.is_empty() {
        sink.error(&c.current_file, span, format!("undeclared function '{name}'"));
        let args: Vec<CheckedExpr> = args.iter().map(|a| check_expr(c, a, None, sink)).collect();
        return (CheckedExprKind::Call { mangled_name: name.clone(), args }, Type::Error, Vec::new());
    }

    call_named_with_overloads(c, name, visible_overloads, args, span, sink)
}

fn check_method_call(
    c: &mut Checker,
    receiver: &ast::Expr,
    method: &str,
    args: &[ast::Expr],
    span: Span,
    sink: &mut DiagnosticSink,
) -> (CheckedExprKind, Type, Vec<String>) {
    // `module.func(args)` parses identically to a method call; a receiver
    // that names an imported module is a plain qualified call, which must
    // resolve `method` as `pub` in exactly that module rather than
    // anywhere in the flat whole-program table.
    if let ast::Expr::Ident(name, _) = receiver {
        if let Resolved::Module(target_module) = super::lookup_name(c, name) {
            return check_qualified_call(c, &target_module, method, args, span, sink);
        }
    }

    let recv_checked = check_expr(c, receiver, None, sink);
    let Type::Struct(sname) = recv_checked.ty.clone() else {
        if matches!(recv_checked.ty, Type::Error) {
            let args: Vec<CheckedExpr> = args.iter().map(|a| check_expr(c, a, None, sink)).collect();
            return (
                CheckedExprKind::MethodCall {
                    mangled_name: method.to_string(),
                    receiver: Box::new(recv_checked),
                    args,
                },
                Type::Error,
                Vec::new(),
            );
        }
        sink.error(&c.current_file, span, format!("type '{}' has no method '{method}'", recv_checked.ty));
        let args: Vec<CheckedExpr> = args.iter().map(|a| check_expr(c, a, None, sink)).collect();
        return (
            CheckedExprKind::MethodCall {
                mangled_name: method.to_string(),
                receiver: Box::new(recv_checked),
                args,
            },
            Type::Error,
            Vec::new(),
        );
    };

    let key = format!("{sname}_{method}");
    let resolved_key = if c.tables.functions.contains_key(&key) {
        Some(key.clone())
    } else if let Some(base) = c.struct_bases.get(&sname).cloned() {
        let base_key = format!("{base}_{method}");
        if c.tables.functions.contains_key(&base_key) {
            monomorphize_method(c, &sname, &base, &base_key, &key, sink);
            Some(key.clone())
        } else {
            None
        }
    } else {
        None
    };

    let Some(resolved_key) = resolved_key.filter(|k| c.tables.functions.contains_key(k)) else {
        sink.error(&c.current_file, span, format!("'{sname}' has no method '{method}'"));
        let args: Vec<CheckedExpr> = args.iter().map(|a| check_expr(c, a, None, sink)).collect();
        return (
            CheckedExprKind::MethodCall {
                mangled_name: key,
                receiver: Box::new(recv_checked),
                args,
            },
            Type::Error,
            Vec::new(),
        );
    };

    // The struct's `self` parameter is the first declared parameter;
    // remaining args are what the caller supplies.
    let (kind, ty, throws) = call_named(c, &resolved_key, args, span, sink);
    let CheckedExprKind::Call { mangled_name, mut args } = kind else {
        unreachable!("call_named always returns Call");
    };
    if !args.is_empty() {
        args.remove(0);
    }
    (
        CheckedExprKind::MethodCall {
            mangled_name,
            receiver: Box::new(recv_checked),
            args,
        },
        ty,
        throws,
    )
}

/// Registers and checks every overload of a generic struct's method against
/// the struct's recorded monomorphization bindings, the first time that
/// method is called on a given instantiation.
fn monomorphize_method(c: &mut Checker, sname: &str, base: &str, base_key: &str, new_key: &str, sink: &mut DiagnosticSink) {
    let new_key = new_key.to_string();
    if c.tables.functions.contains_key(&new_key) {
        return;
    }
    let bindings = c.struct_bindings.get(sname).cloned().unwrap_or_default();
    let overloads = c.tables.functions[base_key].clone();
    let mut new_overloads = Vec::with_capacity(overloads.len());
    for o in &overloads {
        let substituted_sig = FunctionType {
            params: o
                .signature
                .params
                .iter()
                .map(|p| ParamType {
                    name: p.name.clone(),
                    ty: substitute_self(&p.ty, base, sname, &super::substitute(&p.ty, &bindings)),
                    is_mut: p.is_mut,
                    is_move: p.is_move,
                })
                .collect(),
            return_type: super::substitute(&o.signature.return_type, &bindings),
            throws: o.signature.throws.iter().map(|t| super::substitute(t, &bindings)).collect(),
        };
        let tuple: Vec<Type> = substituted_sig.params.iter().map(|p| p.ty.clone()).collect();
        let mangled_name = if overloads.len() == 1 {
            new_key.clone()
        } else {
            format!("{new_key}{}", mangle_type_suffix(&tuple))
        };
        new_overloads.push(FuncOverloadDef {
            decl: o.decl.clone(),
            module: o.module.clone(),
            is_method_of: Some(sname.to_string()),
            signature: substituted_sig,
            mangled_name,
        });
    }
    c.tables.functions.insert(new_key.clone(), new_overloads);

    let overloads = c.tables.functions[&new_key].clone();
    let saved_module = c.current_module.clone();
    let saved_file = c.current_file.clone();
    for o in &overloads {
        c.current_module = o.module.clone();
        check_function_body(c, &o.decl, &o.signature, &o.mangled_name, o.is_method_of.clone(), sink);
    }
    c.current_module = saved_module;
    c.current_file = saved_file;
}

/// `self`-typed parameters (`self: T`) name the struct itself rather than
/// one of its generic parameters, so they substitute to the concrete
/// instantiation `sname` rather than whatever `substitute` produced.
fn substitute_self(declared: &Type, base: &str, sname: &str, substituted: &Type) -> Type {
    match declared {
        Type::Struct(n) if n == base => Type::Struct(sname.to_string()),
        Type::Ptr(inner) if matches!(inner.as_ref(), Type::Struct(n) if n == base) => {
            Type::Ptr(Box::new(Type::Struct(sname.to_string())))
        }
        _ => substituted.clone(),
    }
}

/// `module.func(args)`: `func` must be `pub` in exactly `target_module`,
/// mirroring the explicit `import {name} from mod;` visibility rule
/// (§4.4's "is not exported by module" diagnostic) instead of resolving
/// against the flat whole-program table.
fn check_qualified_call(
    c: &mut Checker,
    target_module: &str,
    name: &str,
    args: &[ast::Expr],
    span: Span,
    sink: &mut DiagnosticSink,
) -> (CheckedExprKind, Type, Vec<String>) {
    let visible_overloads: Vec<FuncOverloadDef> = c
        .tables
        .functions
        .get(name)
        .map(|os| os.iter().filter(|o| o.module == target_module && o.decl.is_pub).cloned().collect())
        .unwrap_or_default();

    if visible_overloads.is_empty() {
        sink.error(&c.current_file, span, format!("'{name}' is not exported by module '{target_module}'"));
        let args: Vec<CheckedExpr> = args.iter().map(|a| check_expr(c, a, None, sink)).collect();
        return (CheckedExprKind::Call { mangled_name: name.to_string(), args }, Type::Error, Vec::new());
    }

    call_named_with_overloads(c, name, visible_overloads, args, span, sink)
}

/// Shared resolution for a direct call to a name already known to exist in
/// `tables.functions`: overload selection, and generic monomorphization
/// when the (sole) candidate declares type parameters. Used by struct
/// method dispatch, which is reached through the receiver's type rather
/// than a module-qualified name, so it is not subject to the `pub`/import
/// visibility rule applied to plain and qualified calls.
fn call_named(
    c: &mut Checker,
    name: &str,
    args: &[ast::Expr],
    span: Span,
    sink: &mut DiagnosticSink,
) -> (CheckedExprKind, Type, Vec<String>) {
    let overloads = c.tables.functions[name].clone();
    call_named_with_overloads(c, name, overloads, args, span, sink)
}

fn call_named_with_overloads(
    c: &mut Checker,
    name: &str,
    overloads: Vec<FuncOverloadDef>,
    args: &[ast::Expr],
    span: Span,
    sink: &mut DiagnosticSink,
) -> (CheckedExprKind, Type, Vec<String>) {
    let natural: Vec<CheckedExpr> = args.iter().map(|a| check_expr(c, a, None, sink)).collect();

    // Generic path: a sole overload whose declaration still has type
    // parameters is monomorphized against the call's concrete argument
    // types rather than matched as an ordinary overload.
    if overloads.len() == 1 && !overloads[0].decl.generics.is_empty() {
        return call_generic(c, name, &overloads[0], args, natural, span, sink);
    }

    let Some((idx, mut checked_args)) = select_overload(&overloads, args, &natural, &c.current_file.clone(), span, sink) else {
        return (
            CheckedExprKind::Call { mangled_name: name.to_string(), args: natural },
            Type::Error,
            Vec::new(),
        );
    };
    widen_literals(&overloads[idx].signature, args, &mut checked_args);
    let throws: Vec<String> = overloads[idx]
        .signature
        .throws
        .iter()
        .filter_map(|t| match t {
            Type::Struct(n) => Some(n.clone()),
            _ => None,
        })
        .collect();
    (
        CheckedExprKind::Call {
            mangled_name: overloads[idx].mangled_name.clone(),
            args: checked_args,
        },
        overloads[idx].signature.return_type.clone(),
        throws,
    )
}

fn call_generic(
    c: &mut Checker,
    base_name: &str,
    overload: &FuncOverloadDef,
    arg_asts: &[ast::Expr],
    natural: Vec<CheckedExpr>,
    span: Span,
    sink: &mut DiagnosticSink,
) -> (CheckedExprKind, Type, Vec<String>) {
    let mut bindings: FxHashMap<String, Type> = FxHashMap::default();
    for (p, a) in overload.signature.params.iter().zip(natural.iter()) {
        super::unify(&p.ty, &a.ty, &mut bindings);
    }
    let concrete_args: Vec<Type> = overload
        .decl
        .generics
        .iter()
        .map(|g| bindings.get(g).cloned().unwrap_or(Type::Error))
        .collect();
    let suffix: String = concrete_args.iter().map(mangle_type_name).collect::<Vec<_>>().join("_");
    let mangled = format!("{base_name}_{suffix}");

    let substituted_sig = FunctionType {
        params: overload
            .signature
            .params
            .iter()
            .map(|p| ParamType {
                name: p.name.clone(),
                ty: super::substitute(&p.ty, &bindings),
                is_mut: p.is_mut,
                is_move: p.is_move,
            })
            .collect(),
        return_type: super::substitute(&overload.signature.return_type, &bindings),
        throws: overload.signature.throws.iter().map(|t| super::substitute(t, &bindings)).collect(),
    };

    if !c.monomorphized_functions.contains(&mangled) {
        c.monomorphized_functions.insert(mangled.clone());
        let saved_module = c.current_module.clone();
        let saved_file = c.current_file.clone();
        c.current_module = overload.module.clone();
        check_function_body(
            c,
            &overload.decl,
            &substituted_sig,
            &mangled,
            overload.is_method_of.clone(),
            sink,
        );
        c.current_module = saved_module;
        c.current_file = saved_file;
    }

    let mut args = natural;
    for (i, (p, a_ast)) in substituted_sig.params.iter().zip(arg_asts.iter()).enumerate() {
        if is_unsuffixed_literal(a_ast) && p.ty != args[i].ty {
            if matches!(&*args[i].kind, CheckedExprKind::IntLiteral(_) | CheckedExprKind::FloatLiteral(_)) {
                args[i].ty = p.ty.clone();
            }
        }
    }

    let throws: Vec<String> = substituted_sig
        .throws
        .iter()
        .filter_map(|t| match t {
            Type::Struct(n) => Some(n.clone()),
            _ => None,
        })
        .collect();
    (
        CheckedExprKind::Call { mangled_name: mangled, args },
        substituted_sig.return_type,
        throws,
    )
}

fn check_catch(
    c: &mut Checker,
    call: &ast::Expr,
    kind: &ast::CatchKind,
    span: Span,
    sink: &mut DiagnosticSink,
) -> CheckedExpr {
    let (call_kind, ret_ty, throws) = match call {
        ast::Expr::Call { callee, args, .. } => check_call(c, callee, args, call.span(), sink),
        ast::Expr::MethodCall { receiver, method, args, .. } => {
            check_method_call(c, receiver, method, args, call.span(), sink)
        }
        _ => {
            sink.error(&c.current_file, span, "'catch' may only follow a function call");
            (CheckedExprKind::Null, Type::Error, Vec::new())
        }
    };
    if throws.is_empty() {
        sink.error(&c.current_file, span, "'catch' used on a call that cannot throw");
    }
    let call_checked = CheckedExpr {
        kind: Box::new(call_kind),
        ty: ret_ty.clone(),
        span: call.span(),
    };

    let checked_kind = match kind {
        ast::CatchKind::Panic => CheckedCatchKind::Panic,
        ast::CatchKind::Throw => {
            let caller_throws: Vec<String> = c
                .scopes
                .function_context()
                .map(|ft| {
                    ft.throws
                        .iter()
                        .filter_map(|t| match t {
                            Type::Struct(n) => Some(n.clone()),
                            _ => None,
                        })
                        .collect()
                })
                .unwrap_or_default();
            if caller_throws.is_empty() {
                sink.error(&c.current_file, span, "'catch throw' is only legal inside a function that itself declares 'throws'");
            }
            let mut remap = Vec::with_capacity(throws.len());
            for t in &throws {
                match caller_throws.iter().position(|n| n == t) {
                    Some(i) => remap.push((i + 1) as u32),
                    None => {
                        sink.error(
                            &c.current_file,
                            span,
                            format!("'{t}' is not in the enclosing function's throws list"),
                        );
                        remap.push(0);
                    }
                }
            }
            CheckedCatchKind::Throw { tag_remap: remap }
        }
        ast::CatchKind::Clauses { clauses, default } => {
            let mut checked_clauses = Vec::with_capacity(clauses.len());
            let mut covered = Vec::new();
            for clause in clauses {
                let Some(tag_index) = throws.iter().position(|n| n == &clause.error_type) else {
                    sink.error(
                        &c.current_file,
                        clause.span,
                        format!("'{}' is not among the throws types of this call", clause.error_type),
                    );
                    continue;
                };
                covered.push(clause.error_type.clone());
                c.scopes.push(ScopeFlags::default(), None);
                if let Some(binding) = &clause.binding {
                    c.scopes.define(
                        binding,
                        Symbol::Variable(VariableSymbol {
                            ty: Type::Struct(clause.error_type.clone()),
                            is_mutable: false,
                            is_const: false,
                            is_moved: false,
                        }),
                    );
                }
                let (body, _) = check_block(c, &clause.body, sink);
                c.scopes.pop();
                checked_clauses.push(CheckedCatchClause {
                    tag_index: (tag_index + 1) as u32,
                    struct_name: clause.error_type.clone(),
                    binding: clause.binding.clone(),
                    body,
                });
            }
            let default_checked = default.as_ref().map(|b| {
                c.scopes.push(ScopeFlags::default(), None);
                let (body, _) = check_block(c, b, sink);
                c.scopes.pop();
                body
            });
            if default_checked.is_none() {
                for t in &throws {
                    if !covered.contains(t) {
                        sink.error(
                            &c.current_file,
                            span,
                            format!("'catch' does not handle error type '{t}' and has no 'default' clause"),
                        );
                    }
                }
            }
            CheckedCatchKind::Clauses {
                clauses: checked_clauses,
                default: default_checked,
            }
        }
    };

    CheckedExpr {
        kind: Box::new(CheckedExprKind::Catch {
            call: Box::new(call_checked),
            kind: checked_kind,
        }),
        ty: ret_ty,
        span,
    }
}
