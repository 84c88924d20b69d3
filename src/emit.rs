//! Deterministic C emitter: one KIR module in, one self-contained C
//! translation unit out (the runtime prelude is inlined, not `#include`d
//! from a sibling file — the whole point is a single `.c` to hand to `cc`).
//!
//! Every `VarId` a function ever defines gets exactly one C local declared
//! up front, typed from the instruction that defines it; block bodies are
//! then just assignments and `goto`s. This keeps every block a valid jump
//! target without fighting C's "can't jump into a scope with an
//! initializer" rules.

use crate::kir::{Block, BlockId, ConstValue, Function, Instr, Module, Terminator, TypeDecl, VarId};
use crate::types::Type;
use rustc_hash::FxHashSet;
use std::fmt::Write as _;

const RUNTIME_PRELUDE: &str = include_str!("../runtime/kei_runtime.c");

pub fn emit_module(module: &Module) -> String {
    let mut out = String::new();
    out.push_str("/* generated by keic; do not edit */\n");
    out.push_str("#include <stdint.h>\n");
    out.push_str("#include <inttypes.h>\n");
    out.push_str("#include <stdbool.h>\n");
    out.push_str("#include <stddef.h>\n");
    out.push_str("#include <stdlib.h>\n");
    out.push_str("#include <string.h>\n");
    out.push_str("#include <stdio.h>\n\n");
    out.push_str(RUNTIME_PRELUDE);
    out.push('\n');

    for decl in &module.type_decls {
        emit_type_decl(&mut out, decl);
    }
    out.push('\n');

    for extern_decl in &module.externs {
        let params: Vec<String> = extern_decl.params.iter().map(|t| c_type(t)).collect();
        let _ = writeln!(
            out,
            "extern {} {}({});",
            c_type(&extern_decl.return_type),
            sanitize(&extern_decl.name),
            if params.is_empty() { "void".to_string() } else { params.join(", ") }
        );
    }
    out.push('\n');

    for global in &module.globals {
        let _ = writeln!(out, "static {} {} = {};", c_type(&global.ty), sanitize(&global.name), const_literal(&global.init));
    }
    out.push('\n');

    for f in &module.functions {
        out.push_str(&function_prototype(f));
        out.push_str(";\n");
    }
    out.push('\n');

    for f in &module.functions {
        emit_function(&mut out, f);
        out.push('\n');
    }

    out
}

fn emit_type_decl(out: &mut String, decl: &TypeDecl) {
    match decl {
        TypeDecl::Struct { name, fields } => {
            let _ = writeln!(out, "typedef struct {} {{", sanitize(name));
            for (fname, fty) in fields {
                let _ = writeln!(out, "    {};", declare(fty, fname));
            }
            let _ = writeln!(out, "}} {};\n", sanitize(name));
        }
        TypeDecl::Enum { name, base_type, is_data_enum, variants } => {
            if !is_data_enum {
                let _ = writeln!(out, "typedef {} {};", c_type(base_type), sanitize(name));
                for v in variants {
                    let _ = writeln!(out, "#define {}_{} (({}){})", sanitize(name), sanitize(&v.name), c_type(base_type), v.discriminant);
                }
                out.push('\n');
            } else {
                let _ = writeln!(out, "typedef struct {} {{", sanitize(name));
                let _ = writeln!(out, "    {} tag;", c_type(base_type));
                let _ = writeln!(out, "    union {{");
                for v in variants {
                    if v.fields.is_empty() {
                        continue;
                    }
                    let _ = writeln!(out, "        struct {{");
                    for (fname, fty) in &v.fields {
                        let _ = writeln!(out, "            {};", declare(fty, fname));
                    }
                    let _ = writeln!(out, "        }} {};", sanitize(&v.name));
                }
                let _ = writeln!(out, "    }} payload;");
                let _ = writeln!(out, "}} {};\n", sanitize(name));
                for v in variants {
                    let _ = writeln!(out, "#define {}_{} (({}){})", sanitize(name), sanitize(&v.name), c_type(base_type), v.discriminant);
                }
                out.push('\n');
            }
        }
    }
}

/// Renders a C declarator for `name: ty`, special-casing fixed arrays,
/// which in C wrap the name rather than prefix it (`int x[4]`, not
/// `int[4] x`).
fn declare(ty: &Type, name: &str) -> String {
    match ty {
        Type::Array(inner, len) => format!("{} {}[{}]", c_type(inner), sanitize(name), len),
        other => format!("{} {}", c_type(other), sanitize(name)),
    }
}

/// The type used when `ty` appears as a function parameter or return type.
/// Structs are passed by address (the lowerer already arranges this at
/// every call site) and arrays decay to a pointer to their element type.
fn c_param_type(ty: &Type) -> String {
    match ty {
        Type::Struct(name) => format!("{}*", sanitize(name)),
        Type::Array(inner, _) => format!("{}*", c_type(inner)),
        other => c_type(other),
    }
}

fn c_type(ty: &Type) -> String {
    match ty {
        Type::Int { bits, signed } => format!("{}int{}_t", if *signed { "" } else { "u" }, bits),
        Type::Float { bits: 32 } => "float".to_string(),
        Type::Float { .. } => "double".to_string(),
        Type::Bool => "bool".to_string(),
        Type::Void => "void".to_string(),
        Type::String => "kei_string".to_string(),
        Type::Null => "void*".to_string(),
        Type::CChar => "char".to_string(),
        Type::Error => "void".to_string(),
        Type::Struct(name) | Type::Enum(name) => sanitize(name),
        Type::Function(_) => "void*".to_string(),
        Type::Ptr(inner) => format!("{}*", c_type(inner)),
        Type::Array(inner, _) => format!("{}*", c_type(inner)),
        Type::Slice(inner) => format!("{}*", c_type(inner)),
        Type::Range(inner) => c_type(inner),
        Type::TypeParam(name) => sanitize(name),
        Type::Module(name) => sanitize(name),
    }
}

fn const_literal(v: &ConstValue) -> String {
    match v {
        ConstValue::Int(i) => i.to_string(),
        ConstValue::Float(f) => format!("{:?}", f),
        ConstValue::Bool(b) => b.to_string(),
        ConstValue::String(s) => format!("{{ {:?}, {} }}", s, s.as_bytes().len()),
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn function_prototype(f: &Function) -> String {
    if f.is_main {
        return "int main(void)".to_string();
    }

    let mut params: Vec<String> = f
        .params
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{} v{}", c_param_type(&p.ty), i))
        .collect();

    let mut next = f.params.len();
    if let Some(throws) = &f.throws {
        if throws.out_param.is_some() {
            params.push(format!("{}* v{}", c_type(&f.return_type), next));
            next += 1;
        }
        params.push(format!("uint8_t* v{next}"));
    }

    let return_ty = if f.throws.is_some() { "int32_t".to_string() } else { c_type(&f.return_type) };
    format!(
        "{} {}({})",
        return_ty,
        sanitize(&f.name),
        if params.is_empty() { "void".to_string() } else { params.join(", ") }
    )
}

fn emit_function(out: &mut String, f: &Function) {
    out.push_str(&function_prototype(f));
    out.push_str(" {\n");

    let mut declared: FxHashSet<VarId> = FxHashSet::default();
    for (i, _) in f.params.iter().enumerate() {
        declared.insert(VarId(i as u32));
    }
    let mut next = f.params.len() as u32;
    if let Some(throws) = &f.throws {
        if throws.out_param.is_some() {
            declared.insert(VarId(next));
            next += 1;
        }
        declared.insert(VarId(next));
    }

    let var_types = f.var_types();
    let mut ids: Vec<VarId> = var_types.keys().copied().collect();
    ids.sort();
    let alloc_vars = collect_stack_allocs(f);

    for id in ids {
        if declared.contains(&id) {
            continue;
        }
        let ty = &var_types[&id];
        if alloc_vars.contains(&id) {
            let storage = format!("v{}__storage", id.0);
            match ty {
                // A zero-length array is the lowerer's marker for an opaque
                // error-payload buffer (see lower_catch); it has no fixed
                // element type, so size it from the runtime's own constant
                // rather than trusting the declared length.
                Type::Array(inner, 0) => {
                    let _ = writeln!(out, "    uint8_t {}[KEI_ERR_BUF_SIZE];", storage);
                    let _ = writeln!(out, "    {}* v{} = ({}*){};", c_type(inner), id.0, c_type(inner), storage);
                }
                Type::Array(inner, len) => {
                    let _ = writeln!(out, "    {} {}[{}];", c_type(inner), storage, len);
                    let _ = writeln!(out, "    {}* v{} = {};", c_type(inner), id.0, storage);
                }
                other => {
                    let _ = writeln!(out, "    {};", declare(other, &storage));
                    let _ = writeln!(out, "    {}* v{} = &{};", c_type(other), id.0, storage);
                }
            }
        } else {
            let _ = writeln!(out, "    {};", declare(ty, &format!("v{}", id.0)));
        }
    }
    out.push('\n');

    for block in &f.blocks {
        emit_block(out, f, block);
    }

    out.push_str("}\n");
}

fn collect_stack_allocs(f: &Function) -> FxHashSet<VarId> {
    let mut out = FxHashSet::default();
    for block in &f.blocks {
        for instr in &block.instructions {
            if let Instr::StackAlloc { dest, .. } = instr {
                out.insert(*dest);
            }
        }
    }
    out
}

fn emit_block(out: &mut String, f: &Function, block: &Block) {
    let _ = writeln!(out, "bb{}:;", block.id.0);
    for instr in &block.instructions {
        emit_instr(out, instr);
    }
    emit_terminator(out, f, block.id, &block.terminator);
}

fn v(id: VarId) -> String {
    format!("v{}", id.0)
}

fn emit_instr(out: &mut String, instr: &Instr) {
    use Instr::*;
    match instr {
        ConstInt { dest, value, .. } => {
            let _ = writeln!(out, "    {} = {};", v(*dest), value);
        }
        ConstFloat { dest, value, .. } => {
            let _ = writeln!(out, "    {} = {:?};", v(*dest), value);
        }
        ConstBool { dest, value } => {
            let _ = writeln!(out, "    {} = {};", v(*dest), value);
        }
        ConstString { dest, value } => {
            let _ = writeln!(out, "    {} = (kei_string){{ {:?}, {} }};", v(*dest), value, value.as_bytes().len());
        }
        ConstCString { dest, value } => {
            let _ = writeln!(out, "    {} = {:?};", v(*dest), value);
        }
        ConstNull { dest, .. } => {
            let _ = writeln!(out, "    {} = 0;", v(*dest));
        }
        LoadGlobal { dest, name, .. } => {
            let _ = writeln!(out, "    {} = {};", v(*dest), sanitize(name));
        }
        StackAlloc { .. } => {}
        Load { dest, ptr, .. } => {
            let _ = writeln!(out, "    {} = *{};", v(*dest), v(*ptr));
        }
        Store { ptr, value } => {
            let _ = writeln!(out, "    *{} = {};", v(*ptr), v(*value));
        }
        BinOp { dest, op, lhs, rhs, .. } => {
            let _ = writeln!(out, "    {} = {} {} {};", v(*dest), v(*lhs), binop_str(*op), v(*rhs));
        }
        Neg { dest, value, .. } => {
            let _ = writeln!(out, "    {} = -{};", v(*dest), v(*value));
        }
        Not { dest, value } => {
            let _ = writeln!(out, "    {} = !{};", v(*dest), v(*value));
        }
        BitNot { dest, value, .. } => {
            let _ = writeln!(out, "    {} = ~{};", v(*dest), v(*value));
        }
        Cast { dest, value, target_ty } => {
            let _ = writeln!(out, "    {} = ({}){};", v(*dest), c_type(target_ty), v(*value));
        }
        Sizeof { dest, ty } => {
            let _ = writeln!(out, "    {} = sizeof({});", v(*dest), c_type(ty));
        }
        FieldPtr { dest, base, field, .. } => {
            let _ = writeln!(out, "    {} = &{}->{};", v(*dest), v(*base), sanitize(field));
        }
        IndexPtr { dest, base, index, .. } => {
            let _ = writeln!(out, "    {} = &{}[{}];", v(*dest), v(*base), v(*index));
        }
        BoundsCheck { index, length } => {
            let _ = writeln!(out, "    if ({} >= (uint64_t){}) kei_bounds_fail({}, {});", v(*index), length, v(*index), length);
        }
        Call { dest, func, args, .. } => {
            let _ = writeln!(out, "    {} = {}({});", v(*dest), sanitize(func), join_args(args));
        }
        CallVoid { func, args } => {
            let _ = writeln!(out, "    {}({});", sanitize(func), join_args(args));
        }
        CallExtern { dest, func, args, .. } => {
            let _ = writeln!(out, "    {} = {}({});", v(*dest), sanitize(func), join_args(args));
        }
        CallExternVoid { func, args } => {
            let _ = writeln!(out, "    {}({});", sanitize(func), join_args(args));
        }
        CallThrows { dest, func, args, out_ptr, err_ptr, .. } => {
            let mut all_args: Vec<String> = args.iter().map(|a| v(*a)).collect();
            if let Some(o) = out_ptr {
                all_args.push(v(*o));
            }
            all_args.push(v(*err_ptr));
            let _ = writeln!(out, "    {} = {}({});", v(*dest), sanitize(func), all_args.join(", "));
        }
        Move { dest, source, .. } => {
            let _ = writeln!(out, "    {} = *{};", v(*dest), v(*source));
        }
        Destroy { value, struct_name } => {
            let _ = writeln!(out, "    {}_destroy({});", sanitize(struct_name), v(*value));
        }
        Oncopy { value, struct_name } => {
            let _ = writeln!(out, "    {}_oncopy({});", sanitize(struct_name), v(*value));
        }
    }
}

fn join_args(args: &[VarId]) -> String {
    args.iter().map(|a| v(*a)).collect::<Vec<_>>().join(", ")
}

fn binop_str(op: crate::ast::BinaryOp) -> &'static str {
    use crate::ast::BinaryOp::*;
    match op {
        Add => "+",
        Sub => "-",
        Mul => "*",
        Div => "/",
        Mod => "%",
        Eq => "==",
        Neq => "!=",
        Lt => "<",
        Le => "<=",
        Gt => ">",
        Ge => ">=",
        And => "&",
        Or => "|",
        Xor => "^",
        Shl => "<<",
        Shr => ">>",
        LogicalAnd => "&&",
        LogicalOr => "||",
    }
}

fn emit_terminator(out: &mut String, f: &Function, _block: BlockId, term: &Terminator) {
    match term {
        Terminator::Jump(target) => {
            let _ = writeln!(out, "    goto bb{};", target.0);
        }
        Terminator::Br { cond, then_block, else_block } => {
            let _ = writeln!(out, "    if ({}) goto bb{}; else goto bb{};", v(*cond), then_block.0, else_block.0);
        }
        Terminator::Switch { value, cases, default } => {
            let _ = writeln!(out, "    switch ({}) {{", v(*value));
            for (case_val, target) in cases {
                let _ = writeln!(out, "        case {}: goto bb{};", case_val, target.0);
            }
            let _ = writeln!(out, "        default: goto bb{};", default.0);
            let _ = writeln!(out, "    }}");
        }
        Terminator::Ret(Some(value)) => {
            if f.is_main {
                let _ = writeln!(out, "    return (int){};", v(*value));
            } else {
                let _ = writeln!(out, "    return {};", v(*value));
            }
        }
        Terminator::Ret(None) | Terminator::RetVoid => {
            if f.is_main {
                let _ = writeln!(out, "    return 0;");
            } else {
                let _ = writeln!(out, "    return;");
            }
        }
        Terminator::Unreachable => {
            out.push_str("    /* unreachable */\n");
        }
    }
}
