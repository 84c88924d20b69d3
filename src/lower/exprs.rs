use super::Lowerer;
use crate::ast::UnaryOp;
use crate::checked::*;
use crate::kir::{Instr, Terminator, VarId};
use crate::types::Type;

impl<'a> Lowerer<'a> {
    /// Lowers `expr` to the `VarId` holding its value.
    pub(super) fn lower_expr(&mut self, expr: &CheckedExpr) -> VarId {
        match &*expr.kind {
            CheckedExprKind::IntLiteral(v) => {
                let dest = self.fresh();
                self.emit(Instr::ConstInt { dest, value: *v, ty: expr.ty.clone() });
                dest
            }
            CheckedExprKind::FloatLiteral(v) => {
                let dest = self.fresh();
                self.emit(Instr::ConstFloat { dest, value: *v, ty: expr.ty.clone() });
                dest
            }
            CheckedExprKind::StringLiteral(v) => {
                let dest = self.fresh();
                self.emit(Instr::ConstString { dest, value: v.clone() });
                dest
            }
            CheckedExprKind::BoolLiteral(v) => {
                let dest = self.fresh();
                self.emit(Instr::ConstBool { dest, value: *v });
                dest
            }
            CheckedExprKind::Null => {
                let dest = self.fresh();
                self.emit(Instr::ConstNull { dest, ty: expr.ty.clone() });
                dest
            }
            CheckedExprKind::ArrayLiteral(items) => {
                let slot = self.fresh();
                self.emit(Instr::StackAlloc { dest: slot, ty: expr.ty.clone() });
                let elem_ty = match &expr.ty {
                    Type::Array(inner, _) => (**inner).clone(),
                    other => other.clone(),
                };
                for (i, item) in items.iter().enumerate() {
                    let v = self.lower_expr(item);
                    let idx = self.fresh();
                    self.emit(Instr::ConstInt { dest: idx, value: i as i128, ty: Type::U64 });
                    let elem_ptr = self.fresh();
                    self.emit(Instr::IndexPtr { dest: elem_ptr, base: slot, index: idx, ty: elem_ty.clone() });
                    self.emit(Instr::Store { ptr: elem_ptr, value: v });
                }
                let dest = self.fresh();
                self.emit(Instr::Load { dest, ptr: slot, ty: expr.ty.clone() });
                dest
            }
            CheckedExprKind::Local(name) => {
                let slot = self.lookup_local(name);
                let dest = self.fresh();
                self.emit(Instr::Load { dest, ptr: slot, ty: expr.ty.clone() });
                dest
            }
            CheckedExprKind::GlobalConst(name) => {
                let dest = self.fresh();
                self.emit(Instr::LoadGlobal { dest, name: name.clone(), ty: expr.ty.clone() });
                dest
            }
            CheckedExprKind::Call { mangled_name, args } => {
                let param_tys = self.param_types_of(mangled_name);
                let arg_vars = self.lower_args(args, &param_tys);
                if matches!(expr.ty, Type::Void) {
                    self.emit(Instr::CallVoid { func: mangled_name.clone(), args: arg_vars });
                    self.fresh()
                } else {
                    let dest = self.fresh();
                    self.emit(Instr::Call { dest, func: mangled_name.clone(), args: arg_vars, ty: expr.ty.clone() });
                    dest
                }
            }
            CheckedExprKind::ExternCall { name, args } => {
                let param_tys = self.extern_param_types_of(name);
                let arg_vars = self.lower_args(args, &param_tys);
                if matches!(expr.ty, Type::Void) {
                    self.emit(Instr::CallExternVoid { func: name.clone(), args: arg_vars });
                    self.fresh()
                } else {
                    let dest = self.fresh();
                    self.emit(Instr::CallExtern { dest, func: name.clone(), args: arg_vars, ty: expr.ty.clone() });
                    dest
                }
            }
            CheckedExprKind::MethodCall { mangled_name, receiver, args } | CheckedExprKind::OperatorCall { mangled_name, receiver, args } => {
                let recv_ptr = self.lower_lvalue(receiver);
                let param_tys = self.param_types_of(mangled_name);
                // First declared param is `self`; remaining params line up
                // with the call's own argument list.
                let rest_tys = if param_tys.is_empty() { &[][..] } else { &param_tys[1..] };
                let mut arg_vars = self.lower_args(args, rest_tys);
                arg_vars.insert(0, recv_ptr);
                if matches!(expr.ty, Type::Void) {
                    self.emit(Instr::CallVoid { func: mangled_name.clone(), args: arg_vars });
                    self.fresh()
                } else {
                    let dest = self.fresh();
                    self.emit(Instr::Call { dest, func: mangled_name.clone(), args: arg_vars, ty: expr.ty.clone() });
                    dest
                }
            }
            CheckedExprKind::StructLiteral { name, fields } => {
                let slot = self.fresh();
                self.emit(Instr::StackAlloc { dest: slot, ty: expr.ty.clone() });
                let field_names = self.field_names_of(name);
                for (field_name, field_expr) in field_names.iter().zip(fields.iter()) {
                    let v = self.lower_expr(field_expr);
                    let fptr = self.fresh();
                    self.emit(Instr::FieldPtr { dest: fptr, base: slot, field: field_name.clone(), ty: field_expr.ty.clone() });
                    self.emit(Instr::Store { ptr: fptr, value: v });
                }
                let dest = self.fresh();
                self.emit(Instr::Load { dest, ptr: slot, ty: expr.ty.clone() });
                dest
            }
            CheckedExprKind::FieldAccess { base, field } => {
                let base_ptr = self.lower_lvalue(base);
                let fptr = self.fresh();
                self.emit(Instr::FieldPtr { dest: fptr, base: base_ptr, field: field.clone(), ty: expr.ty.clone() });
                let dest = self.fresh();
                self.emit(Instr::Load { dest, ptr: fptr, ty: expr.ty.clone() });
                dest
            }
            CheckedExprKind::Index { base, index, static_length } => {
                let base_ptr = self.lower_lvalue(base);
                let idx = self.lower_expr(index);
                if let Some(len) = static_length {
                    self.emit(Instr::BoundsCheck { index: idx, length: *len });
                }
                let eptr = self.fresh();
                self.emit(Instr::IndexPtr { dest: eptr, base: base_ptr, index: idx, ty: expr.ty.clone() });
                let dest = self.fresh();
                self.emit(Instr::Load { dest, ptr: eptr, ty: expr.ty.clone() });
                dest
            }
            CheckedExprKind::Unary { op, expr: inner } => {
                let v = self.lower_expr(inner);
                let dest = self.fresh();
                match op {
                    UnaryOp::Neg => self.emit(Instr::Neg { dest, value: v, ty: expr.ty.clone() }),
                    UnaryOp::Not => self.emit(Instr::Not { dest, value: v }),
                    UnaryOp::BitNot => self.emit(Instr::BitNot { dest, value: v, ty: expr.ty.clone() }),
                }
                dest
            }
            CheckedExprKind::UnaryOperatorCall { mangled_name, receiver } => {
                let recv_ptr = self.lower_lvalue(receiver);
                let dest = self.fresh();
                self.emit(Instr::Call { dest, func: mangled_name.clone(), args: vec![recv_ptr], ty: expr.ty.clone() });
                dest
            }
            CheckedExprKind::Binary { op, lhs, rhs, operand_type } => {
                let l = self.lower_expr(lhs);
                let r = self.lower_expr(rhs);
                let dest = self.fresh();
                self.emit(Instr::BinOp { dest, op: *op, lhs: l, rhs: r, ty: expr.ty.clone(), operand_ty: operand_type.clone() });
                dest
            }
            CheckedExprKind::StructEqCompare { lhs, rhs, negate } => {
                let dest = self.lower_struct_eq(lhs, rhs);
                if *negate {
                    let negated = self.fresh();
                    self.emit(Instr::Not { dest: negated, value: dest });
                    negated
                } else {
                    dest
                }
            }
            CheckedExprKind::LogicalAnd(lhs, rhs) => self.lower_short_circuit(lhs, rhs, true),
            CheckedExprKind::LogicalOr(lhs, rhs) => self.lower_short_circuit(lhs, rhs, false),
            CheckedExprKind::Cast { expr: inner, target } => {
                let v = self.lower_expr(inner);
                let dest = self.fresh();
                self.emit(Instr::Cast { dest, value: v, target_ty: target.clone() });
                dest
            }
            CheckedExprKind::Move(inner) => {
                if let CheckedExprKind::Local(name) = &*inner.kind {
                    let slot = self.lookup_local(name);
                    let dest = self.fresh();
                    self.emit(Instr::Move { dest, source: slot, ty: expr.ty.clone() });
                    dest
                } else {
                    self.lower_expr(inner)
                }
            }
            CheckedExprKind::Catch { call, kind } => self.lower_catch(call, kind, &expr.ty),
        }
    }

    /// Lowers `expr` to a `VarId` holding a *pointer* to its storage,
    /// materializing a temporary stack slot for expressions that don't
    /// naturally have one (a freshly computed call result, a struct
    /// literal used only for one field access, etc).
    pub(super) fn lower_lvalue(&mut self, expr: &CheckedExpr) -> VarId {
        match &*expr.kind {
            CheckedExprKind::Local(name) => self.lookup_local(name),
            CheckedExprKind::FieldAccess { base, field } => {
                let base_ptr = self.lower_lvalue(base);
                let fptr = self.fresh();
                self.emit(Instr::FieldPtr { dest: fptr, base: base_ptr, field: field.clone(), ty: expr.ty.clone() });
                fptr
            }
            CheckedExprKind::Index { base, index, static_length } => {
                let base_ptr = self.lower_lvalue(base);
                let idx = self.lower_expr(index);
                if let Some(len) = static_length {
                    self.emit(Instr::BoundsCheck { index: idx, length: *len });
                }
                let eptr = self.fresh();
                self.emit(Instr::IndexPtr { dest: eptr, base: base_ptr, index: idx, ty: expr.ty.clone() });
                eptr
            }
            _ => {
                let v = self.lower_expr(expr);
                let slot = self.fresh();
                self.emit(Instr::StackAlloc { dest: slot, ty: expr.ty.clone() });
                self.emit(Instr::Store { ptr: slot, value: v });
                slot
            }
        }
    }

    fn lower_args(&mut self, args: &[CheckedExpr], param_tys: &[Type]) -> Vec<VarId> {
        args.iter()
            .enumerate()
            .map(|(i, a)| {
                let by_address = param_tys.get(i).map(|t| matches!(t, Type::Struct(_))).unwrap_or(false);
                if by_address {
                    self.lower_lvalue(a)
                } else {
                    self.lower_expr(a)
                }
            })
            .collect()
    }

    fn param_types_of(&self, mangled_name: &str) -> Vec<Type> {
        self.program
            .functions
            .get(mangled_name)
            .map(|f| f.params.iter().map(|p| p.ty.clone()).collect())
            .unwrap_or_default()
    }

    fn extern_param_types_of(&self, name: &str) -> Vec<Type> {
        self.program.externs.get(name).map(|e| e.params.clone()).unwrap_or_default()
    }

    fn field_names_of(&self, struct_name: &str) -> Vec<String> {
        self.program
            .structs
            .get(struct_name)
            .map(|s| s.fields.iter().map(|(n, _)| n.clone()).collect())
            .unwrap_or_default()
    }

    fn lower_struct_eq(&mut self, lhs: &CheckedExpr, rhs: &CheckedExpr) -> VarId {
        let struct_name = match &lhs.ty {
            Type::Struct(name) => name.clone(),
            _ => unreachable!("struct equality compares struct-typed operands"),
        };
        let lhs_ptr = self.lower_lvalue(lhs);
        let rhs_ptr = self.lower_lvalue(rhs);
        let fields = self.field_names_of(&struct_name);
        let struct_info = self.program.structs.get(&struct_name).cloned();
        let field_types: Vec<Type> = struct_info.map(|s| s.fields.into_iter().map(|(_, t)| t).collect()).unwrap_or_default();

        let result_slot = self.fresh();
        self.emit(Instr::StackAlloc { dest: result_slot, ty: Type::Bool });
        let all_true = self.fresh();
        self.emit(Instr::ConstBool { dest: all_true, value: true });
        self.emit(Instr::Store { ptr: result_slot, value: all_true });

        for (field, field_ty) in fields.iter().zip(field_types.iter()) {
            let lf = self.fresh();
            self.emit(Instr::FieldPtr { dest: lf, base: lhs_ptr, field: field.clone(), ty: field_ty.clone() });
            let lv = self.fresh();
            self.emit(Instr::Load { dest: lv, ptr: lf, ty: field_ty.clone() });
            let rf = self.fresh();
            self.emit(Instr::FieldPtr { dest: rf, base: rhs_ptr, field: field.clone(), ty: field_ty.clone() });
            let rv = self.fresh();
            self.emit(Instr::Load { dest: rv, ptr: rf, ty: field_ty.clone() });
            let eq = self.fresh();
            self.emit(Instr::BinOp {
                dest: eq,
                op: crate::ast::BinaryOp::Eq,
                lhs: lv,
                rhs: rv,
                ty: Type::Bool,
                operand_ty: field_ty.clone(),
            });
            let prev = self.fresh();
            self.emit(Instr::Load { dest: prev, ptr: result_slot, ty: Type::Bool });
            let combined = self.fresh();
            self.emit(Instr::BinOp {
                dest: combined,
                op: crate::ast::BinaryOp::And,
                lhs: prev,
                rhs: eq,
                ty: Type::Bool,
                operand_ty: Type::Bool,
            });
            self.emit(Instr::Store { ptr: result_slot, value: combined });
        }

        let dest = self.fresh();
        self.emit(Instr::Load { dest, ptr: result_slot, ty: Type::Bool });
        dest
    }

    /// `&&`/`||` short-circuit via an explicit diamond and a stack-allocated
    /// merge slot, rather than a phi, since phi placement is mem2reg's job
    /// and runs later over every promotable alloca uniformly.
    fn lower_short_circuit(&mut self, lhs: &CheckedExpr, rhs: &CheckedExpr, is_and: bool) -> VarId {
        let slot = self.fresh();
        self.emit(Instr::StackAlloc { dest: slot, ty: Type::Bool });

        let lhs_var = self.lower_expr(lhs);
        self.emit(Instr::Store { ptr: slot, value: lhs_var });

        let rhs_block = self.new_block();
        let merge_block = self.new_block();
        if is_and {
            self.set_terminator(self.current, Terminator::Br { cond: lhs_var, then_block: rhs_block, else_block: merge_block });
        } else {
            self.set_terminator(self.current, Terminator::Br { cond: lhs_var, then_block: merge_block, else_block: rhs_block });
        }

        self.switch_to(rhs_block);
        let rhs_var = self.lower_expr(rhs);
        self.emit(Instr::Store { ptr: slot, value: rhs_var });
        if !self.is_terminated(self.current) {
            self.set_terminator(self.current, Terminator::Jump(merge_block));
        }

        self.switch_to(merge_block);
        let dest = self.fresh();
        self.emit(Instr::Load { dest, ptr: slot, ty: Type::Bool });
        dest
    }

    fn lower_catch(&mut self, call: &CheckedExpr, kind: &CheckedCatchKind, success_ty: &Type) -> VarId {
        let (mangled_name, args, callee_error_types) = match &*call.kind {
            CheckedExprKind::Call { mangled_name, args } => {
                let throws = self.program.functions.get(mangled_name).map(|f| f.throws.clone()).unwrap_or_default();
                (mangled_name.clone(), args.clone(), throws)
            }
            CheckedExprKind::MethodCall { mangled_name, receiver, args } => {
                let throws = self.program.functions.get(mangled_name).map(|f| f.throws.clone()).unwrap_or_default();
                let mut all_args = vec![(**receiver).clone()];
                all_args.extend(args.clone());
                (mangled_name.clone(), all_args, throws)
            }
            _ => unreachable!("catch only wraps a direct call to a throwing function"),
        };

        let out_slot = if matches!(success_ty, Type::Void) {
            None
        } else {
            let slot = self.fresh();
            self.emit(Instr::StackAlloc { dest: slot, ty: success_ty.clone() });
            Some(slot)
        };
        let err_slot = self.fresh();
        // The callee's error buffer is sized for the largest of its error
        // structs; a `bool`-sized placeholder stands in here since KIR
        // types are nominal and the true byte layout is the emitter's
        // concern, not the lowerer's.
        self.emit(Instr::StackAlloc { dest: err_slot, ty: Type::Array(Box::new(Type::CChar), 0) });

        let param_tys = self.param_types_of(&mangled_name);
        let arg_vars = self.lower_args(&args, &param_tys);

        let tag = self.fresh();
        self.emit(Instr::CallThrows {
            dest: tag,
            func: mangled_name.clone(),
            args: arg_vars,
            out_ptr: out_slot,
            err_ptr: err_slot,
            success_ty: success_ty.clone(),
            error_types: callee_error_types.clone(),
        });

        let merge_slot = if matches!(success_ty, Type::Void) {
            None
        } else {
            let slot = self.fresh();
            self.emit(Instr::StackAlloc { dest: slot, ty: success_ty.clone() });
            Some(slot)
        };

        let zero = self.fresh();
        self.emit(Instr::ConstInt { dest: zero, value: 0, ty: Type::I32 });
        let is_err = self.fresh();
        self.emit(Instr::BinOp { dest: is_err, op: crate::ast::BinaryOp::Neq, lhs: tag, rhs: zero, ty: Type::Bool, operand_ty: Type::I32 });

        let success_block = self.new_block();
        let error_block = self.new_block();
        let merge_block = self.new_block();
        self.set_terminator(self.current, Terminator::Br { cond: is_err, then_block: error_block, else_block: success_block });

        self.switch_to(success_block);
        if let (Some(out), Some(merge)) = (out_slot, merge_slot) {
            let v = self.fresh();
            self.emit(Instr::Load { dest: v, ptr: out, ty: success_ty.clone() });
            self.emit(Instr::Store { ptr: merge, value: v });
        }
        self.set_terminator(success_block, Terminator::Jump(merge_block));

        self.switch_to(error_block);
        self.lower_catch_kind(kind, tag, err_slot, &callee_error_types, merge_slot, merge_block, success_ty);

        self.switch_to(merge_block);
        match merge_slot {
            Some(slot) => {
                let dest = self.fresh();
                self.emit(Instr::Load { dest, ptr: slot, ty: success_ty.clone() });
                dest
            }
            None => self.fresh(),
        }
    }

    fn lower_catch_kind(
        &mut self,
        kind: &CheckedCatchKind,
        tag: VarId,
        err_slot: VarId,
        callee_error_types: &[String],
        merge_slot: Option<VarId>,
        merge_block: crate::kir::BlockId,
        success_ty: &Type,
    ) {
        let entry_block = self.current;
        match kind {
            CheckedCatchKind::Panic => {
                let msg = self.fresh();
                self.emit(Instr::ConstCString { dest: msg, value: "unhandled error".to_string() });
                self.emit(Instr::CallExternVoid { func: "kei_panic".to_string(), args: vec![msg] });
                self.set_terminator(entry_block, Terminator::Unreachable);
            }
            CheckedCatchKind::Throw { tag_remap } => {
                // Error struct layouts are shared byte-for-byte between
                // throws lists, so rethrowing is a raw buffer copy into
                // the caller's own `err_ptr` rather than a field-by-field
                // reconstruction.
                let own_err = self.err_ptr.expect("rethrow only lowered inside a throws function");
                self.emit(Instr::CallExternVoid {
                    func: "kei_buf_copy".to_string(),
                    args: vec![own_err, err_slot],
                });
                let _ = callee_error_types;
                let mut cases = Vec::new();
                for (callee_idx, caller_tag) in tag_remap.iter().enumerate() {
                    let case_block = self.new_block();
                    self.switch_to(case_block);
                    let tag_var = self.fresh();
                    self.emit(Instr::ConstInt { dest: tag_var, value: *caller_tag as i128, ty: Type::I32 });
                    self.set_terminator(case_block, Terminator::Ret(Some(tag_var)));
                    cases.push(((callee_idx + 1) as i64, case_block));
                }
                let default_block = self.new_block();
                self.set_terminator(default_block, Terminator::Unreachable);
                self.set_terminator(entry_block, Terminator::Switch { value: tag, cases, default: default_block });
            }
            CheckedCatchKind::Clauses { clauses, default } => {
                let mut cases = Vec::new();
                for clause in clauses {
                    let clause_block = self.new_block();
                    cases.push((clause.tag_index as i64, clause_block));
                }
                let default_block = self.new_block();
                self.set_terminator(entry_block, Terminator::Switch { value: tag, cases: cases.clone(), default: default_block });

                for (clause, (_, clause_block)) in clauses.iter().zip(cases.iter()) {
                    self.switch_to(*clause_block);
                    self.push_scope();
                    if let Some(binding) = &clause.binding {
                        let casted = self.fresh();
                        self.emit(Instr::Cast {
                            dest: casted,
                            value: err_slot,
                            target_ty: Type::Ptr(Box::new(Type::Struct(clause.struct_name.clone()))),
                        });
                        let slot = self.fresh();
                        self.emit(Instr::StackAlloc { dest: slot, ty: Type::Struct(clause.struct_name.clone()) });
                        let loaded = self.fresh();
                        self.emit(Instr::Load { dest: loaded, ptr: casted, ty: Type::Struct(clause.struct_name.clone()) });
                        self.emit(Instr::Store { ptr: slot, value: loaded });
                        self.define_local(binding.clone(), slot);
                    }
                    for s in &clause.body {
                        if self.is_terminated(self.current) {
                            break;
                        }
                        self.lower_stmt(s);
                    }
                    if !self.is_terminated(self.current) {
                        if let Some(slot) = merge_slot {
                            if !matches!(success_ty, Type::Void) {
                                let fallback = self.fresh();
                                self.emit(Instr::ConstNull { dest: fallback, ty: success_ty.clone() });
                                self.emit(Instr::Store { ptr: slot, value: fallback });
                            }
                        }
                        self.pop_scope();
                        self.set_terminator(self.current, Terminator::Jump(merge_block));
                    } else {
                        self.scopes.pop();
                        self.defers.pop();
                    }
                }

                self.switch_to(default_block);
                if let Some(body) = default {
                    self.lower_block(body);
                }
                if !self.is_terminated(self.current) {
                    self.set_terminator(self.current, Terminator::Jump(merge_block));
                }
            }
        }
    }
}
