//! Lowers a [`CheckedProgram`] into [`kir::Module`].
//!
//! One `Lowerer` per function. Every `let`/`const`/parameter binds a name to
//! a `stack_alloc` pointer rather than an SSA value directly — mem2reg
//! promotes the ones that turn out to never have their address taken. This
//! mirrors the teacher's own HIR-to-MIR style of "everything is a slot until
//! an optimizer says otherwise" (see `compiler_frontend/hir/hir_nodes.rs`).
//!
//! Convention the emitter relies on: a function's leading `VarId`s are
//! allocated, in order, for its declared parameters, then (for a `throws`
//! function) the implicit `out` pointer if the success type isn't `void`,
//! then the implicit `err` pointer. `lower_function` allocates exactly these
//! before lowering the body, so `VarId(0..params.len())` etc. line up with
//! `Function::params`/`Function::throws` positionally.

mod exprs;
mod stmts;

use crate::checked::*;
use crate::kir::{self, BlockId, Instr, Terminator, ThrowsAbi, VarId};
use crate::types::Type;
use rustc_hash::FxHashMap;

pub fn lower_program(program: &CheckedProgram) -> kir::Module {
    let mut struct_names: Vec<&String> = program.structs.keys().collect();
    struct_names.sort();
    let mut enum_names: Vec<&String> = program.enums.keys().collect();
    enum_names.sort();
    let mut extern_names: Vec<&String> = program.externs.keys().collect();
    extern_names.sort();

    let mut type_decls = Vec::new();
    for name in &struct_names {
        let info = &program.structs[*name];
        type_decls.push(kir::TypeDecl::Struct {
            name: info.name.clone(),
            fields: info.fields.clone(),
        });
    }
    for name in &enum_names {
        let info = &program.enums[*name];
        let is_data_enum = info.variants.iter().any(|v| !v.fields.is_empty());
        type_decls.push(kir::TypeDecl::Enum {
            name: info.name.clone(),
            base_type: info.base_type.clone(),
            is_data_enum,
            variants: info
                .variants
                .iter()
                .map(|v| kir::EnumVariant {
                    name: v.name.clone(),
                    discriminant: v.discriminant,
                    fields: v.fields.clone(),
                })
                .collect(),
        });
    }

    let externs = extern_names
        .iter()
        .map(|name| {
            let info = &program.externs[*name];
            kir::ExternDecl {
                name: info.name.clone(),
                params: info.params.clone(),
                return_type: info.return_type.clone(),
            }
        })
        .collect();

    let globals = program
        .const_order
        .iter()
        .map(|name| {
            let info = &program.consts[name];
            kir::Global {
                name: info.name.clone(),
                ty: info.ty.clone(),
                init: const_eval(&info.value),
            }
        })
        .collect();

    let functions = program
        .function_order
        .iter()
        .map(|name| lower_function(program, &program.functions[name]))
        .collect();

    kir::Module {
        name: "program".to_string(),
        type_decls,
        externs,
        globals,
        functions,
    }
}

/// Folds a checked constant expression into a [`kir::ConstValue`]. Top-level
/// `const` initializers are restricted by the checker to literal expressions
/// (and their unary negation), so this never needs the general evaluator.
fn const_eval(expr: &CheckedExpr) -> kir::ConstValue {
    match &*expr.kind {
        CheckedExprKind::IntLiteral(v) => kir::ConstValue::Int(*v),
        CheckedExprKind::FloatLiteral(v) => kir::ConstValue::Float(*v),
        CheckedExprKind::BoolLiteral(v) => kir::ConstValue::Bool(*v),
        CheckedExprKind::StringLiteral(v) => kir::ConstValue::String(v.clone()),
        CheckedExprKind::Unary { op: crate::ast::UnaryOp::Neg, expr: inner } => match const_eval(inner) {
            kir::ConstValue::Int(v) => kir::ConstValue::Int(-v),
            kir::ConstValue::Float(v) => kir::ConstValue::Float(-v),
            other => other,
        },
        _ => kir::ConstValue::Int(0),
    }
}

struct LoopTargets {
    break_block: BlockId,
    continue_block: BlockId,
}

pub(crate) struct Lowerer<'a> {
    program: &'a CheckedProgram,
    f: kir::Function,
    terminated: Vec<bool>,
    current: BlockId,
    scopes: Vec<FxHashMap<String, VarId>>,
    defers: Vec<Vec<CheckedStmt>>,
    loop_stack: Vec<LoopTargets>,
    out_ptr: Option<VarId>,
    err_ptr: Option<VarId>,
    error_types: Vec<String>,
}

fn lower_function(program: &CheckedProgram, info: &FunctionInfo) -> kir::Function {
    let params: Vec<kir::Param> = info
        .params
        .iter()
        .map(|p| kir::Param {
            name: p.name.clone(),
            ty: p.ty.clone(),
        })
        .collect();

    let throws = if info.throws.is_empty() {
        None
    } else {
        Some(ThrowsAbi {
            out_param: (!matches!(info.return_type, Type::Void)).then(|| "out".to_string()),
            err_param: "err".to_string(),
            error_types: info.throws.clone(),
        })
    };

    let is_main = info.mangled_name == "main";
    let mut f = kir::Function::new(info.mangled_name.clone(), params, info.return_type.clone(), throws, is_main);

    let mut param_slots: Vec<(String, VarId, Type)> = Vec::new();
    for p in &info.params {
        let v = f.fresh_var();
        param_slots.push((p.name.clone(), v, p.ty.clone()));
    }
    let out_ptr = if info.throws.is_empty() {
        None
    } else if !matches!(info.return_type, Type::Void) {
        Some(f.fresh_var())
    } else {
        None
    };
    let err_ptr = if info.throws.is_empty() { None } else { Some(f.fresh_var()) };

    let mut lowerer = Lowerer {
        program,
        f,
        terminated: Vec::new(),
        current: BlockId(0),
        scopes: Vec::new(),
        defers: Vec::new(),
        loop_stack: Vec::new(),
        out_ptr,
        err_ptr,
        error_types: info.throws.clone(),
    };

    let entry = lowerer.new_block();
    lowerer.switch_to(entry);
    lowerer.push_scope();

    // Materialize every parameter into an addressable stack slot so body
    // lowering can treat params and locals uniformly. Struct parameters
    // arrive already as a pointer (the by-address calling convention), so
    // the incoming `VarId` itself *is* the slot — no copy needed.
    for (name, value_var, ty) in param_slots {
        if matches!(ty, Type::Struct(_)) {
            lowerer.define_local(name, value_var);
        } else {
            let slot = lowerer.fresh();
            lowerer.emit(Instr::StackAlloc { dest: slot, ty: ty.clone() });
            lowerer.emit(Instr::Store { ptr: slot, value: value_var });
            lowerer.define_local(name, slot);
        }
    }

    lowerer.lower_block(&info.body);

    if !lowerer.is_terminated(lowerer.current) {
        let pending = lowerer.defers.last().cloned().unwrap_or_default();
        for stmt in pending.into_iter().rev() {
            lowerer.lower_stmt(&stmt);
        }
    }
    lowerer.scopes.pop();
    lowerer.defers.pop();
    lowerer.finish_with_implicit_return();

    lowerer.f
}

impl<'a> Lowerer<'a> {
    fn new_block(&mut self) -> BlockId {
        let id = self.f.new_block();
        self.terminated.push(false);
        id
    }

    fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    fn is_terminated(&self, block: BlockId) -> bool {
        self.terminated[block.0 as usize]
    }

    fn set_terminator(&mut self, block: BlockId, term: Terminator) {
        if !self.terminated[block.0 as usize] {
            self.f.block_mut(block).terminator = term;
            self.terminated[block.0 as usize] = true;
        }
    }

    fn emit(&mut self, instr: Instr) {
        self.f.block_mut(self.current).instructions.push(instr);
    }

    fn fresh(&mut self) -> VarId {
        self.f.fresh_var()
    }

    fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
        self.defers.push(Vec::new());
    }

    /// Pops the innermost scope, emitting its pending `defer` statements in
    /// LIFO order into the current block before returning.
    fn pop_scope(&mut self) {
        self.scopes.pop();
        let pending = self.defers.pop().unwrap_or_default();
        for stmt in pending.into_iter().rev() {
            self.lower_stmt(&stmt);
        }
    }

    fn define_local(&mut self, name: String, slot: VarId) {
        self.scopes.last_mut().expect("active scope").insert(name, slot);
    }

    fn lookup_local(&self, name: &str) -> VarId {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.get(name) {
                return *v;
            }
        }
        panic!("unresolved local '{name}' reached the lowerer; the checker should have caught this");
    }

    fn push_defer(&mut self, stmt: CheckedStmt) {
        self.defers.last_mut().expect("active scope").push(stmt);
    }

    /// Runs every pending `defer` across every live scope, innermost first —
    /// used at `return`/`break`/`continue`, which exit more than one scope
    /// at once.
    fn run_all_defers(&mut self) {
        for scope_defers in self.defers.clone().iter().rev() {
            for stmt in scope_defers.iter().rev() {
                self.lower_stmt(stmt);
            }
        }
    }

    fn finish_with_implicit_return(&mut self) {
        if self.is_terminated(self.current) {
            return;
        }
        if let Some(err) = self.err_ptr {
            let zero = self.fresh();
            self.emit(Instr::ConstInt { dest: zero, value: 0, ty: Type::I32 });
            let _ = err;
            self.set_terminator(self.current, Terminator::Ret(Some(zero)));
        } else {
            self.set_terminator(self.current, Terminator::RetVoid);
        }
    }
}
