use super::{LoopTargets, Lowerer};
use crate::checked::*;
use crate::kir::{Instr, Terminator};
use crate::types::Type;

impl<'a> Lowerer<'a> {
    pub(super) fn lower_block(&mut self, block: &CheckedBlock) {
        self.push_scope();
        for stmt in block {
            if self.is_terminated(self.current) {
                break;
            }
            self.lower_stmt(stmt);
        }
        if !self.is_terminated(self.current) {
            self.pop_scope();
        } else {
            self.scopes.pop();
            self.defers.pop();
        }
    }

    pub(super) fn lower_stmt(&mut self, stmt: &CheckedStmt) {
        match stmt {
            CheckedStmt::Let { name, ty, value, .. } => {
                let v = self.lower_expr(value);
                let slot = self.fresh();
                self.emit(Instr::StackAlloc { dest: slot, ty: ty.clone() });
                self.emit(Instr::Store { ptr: slot, value: v });
                self.define_local(name.clone(), slot);
            }
            CheckedStmt::Const { name, ty, value } => {
                let v = self.lower_expr(value);
                let slot = self.fresh();
                self.emit(Instr::StackAlloc { dest: slot, ty: ty.clone() });
                self.emit(Instr::Store { ptr: slot, value: v });
                self.define_local(name.clone(), slot);
            }
            CheckedStmt::Assign { target, value } => {
                let v = self.lower_expr(value);
                let ptr = self.lower_lvalue(target);
                self.emit(Instr::Store { ptr, value: v });
            }
            CheckedStmt::Expr(e) => {
                self.lower_expr(e);
            }
            CheckedStmt::Return(value) => {
                let result = value.as_ref().map(|v| self.lower_expr(v));
                self.run_all_defers();
                if self.is_terminated(self.current) {
                    return;
                }
                match (&self.err_ptr, &self.out_ptr, result) {
                    (Some(_err), out_ptr, Some(v)) => {
                        if let Some(out) = out_ptr {
                            self.emit(Instr::Store { ptr: *out, value: v });
                        }
                        let zero = self.fresh();
                        self.emit(Instr::ConstInt { dest: zero, value: 0, ty: Type::I32 });
                        self.set_terminator(self.current, Terminator::Ret(Some(zero)));
                    }
                    (Some(_err), _, None) => {
                        let zero = self.fresh();
                        self.emit(Instr::ConstInt { dest: zero, value: 0, ty: Type::I32 });
                        self.set_terminator(self.current, Terminator::Ret(Some(zero)));
                    }
                    (None, _, Some(v)) => {
                        self.set_terminator(self.current, Terminator::Ret(Some(v)));
                    }
                    (None, _, None) => {
                        self.set_terminator(self.current, Terminator::RetVoid);
                    }
                }
            }
            CheckedStmt::Throw { struct_name, tag_index, value } => {
                let v = self.lower_expr(value);
                self.run_all_defers();
                if self.is_terminated(self.current) {
                    return;
                }
                let err_ptr = self.err_ptr.expect("throw only lowered inside a throws function");
                let casted = self.fresh();
                self.emit(Instr::Cast {
                    dest: casted,
                    value: err_ptr,
                    target_ty: Type::Ptr(Box::new(Type::Struct(struct_name.clone()))),
                });
                self.emit(Instr::Store { ptr: casted, value: v });
                let tag = self.fresh();
                self.emit(Instr::ConstInt {
                    dest: tag,
                    value: *tag_index as i128,
                    ty: Type::I32,
                });
                self.set_terminator(self.current, Terminator::Ret(Some(tag)));
            }
            CheckedStmt::If { cond, then_branch, else_branch } => {
                let cond_var = self.lower_expr(cond);
                let then_block = self.new_block();
                let else_block = self.new_block();
                let merge_block = self.new_block();

                self.set_terminator(
                    self.current,
                    Terminator::Br { cond: cond_var, then_block, else_block },
                );

                self.switch_to(then_block);
                self.lower_block(then_branch);
                if !self.is_terminated(self.current) {
                    self.set_terminator(self.current, Terminator::Jump(merge_block));
                }

                self.switch_to(else_block);
                if let Some(else_b) = else_branch {
                    self.lower_block(else_b);
                }
                if !self.is_terminated(self.current) {
                    self.set_terminator(self.current, Terminator::Jump(merge_block));
                }

                self.switch_to(merge_block);
            }
            CheckedStmt::While { cond, body } => {
                let cond_block = self.new_block();
                let body_block = self.new_block();
                let after_block = self.new_block();

                self.set_terminator(self.current, Terminator::Jump(cond_block));

                self.switch_to(cond_block);
                let cond_var = self.lower_expr(cond);
                self.set_terminator(
                    cond_block,
                    Terminator::Br { cond: cond_var, then_block: body_block, else_block: after_block },
                );

                self.loop_stack.push(LoopTargets { break_block: after_block, continue_block: cond_block });
                self.switch_to(body_block);
                self.lower_block(body);
                if !self.is_terminated(self.current) {
                    self.set_terminator(self.current, Terminator::Jump(cond_block));
                }
                self.loop_stack.pop();

                self.switch_to(after_block);
            }
            CheckedStmt::For { var, elem_ty, start, end, inclusive, body } => {
                let start_var = self.lower_expr(start);
                let end_var = self.lower_expr(end);
                let slot = self.fresh();
                self.emit(Instr::StackAlloc { dest: slot, ty: elem_ty.clone() });
                self.emit(Instr::Store { ptr: slot, value: start_var });

                let cond_block = self.new_block();
                let body_block = self.new_block();
                let step_block = self.new_block();
                let after_block = self.new_block();

                self.set_terminator(self.current, Terminator::Jump(cond_block));

                self.switch_to(cond_block);
                let cur = self.fresh();
                self.emit(Instr::Load { dest: cur, ptr: slot, ty: elem_ty.clone() });
                let cmp = self.fresh();
                let op = if *inclusive { crate::ast::BinaryOp::Le } else { crate::ast::BinaryOp::Lt };
                self.emit(Instr::BinOp {
                    dest: cmp,
                    op,
                    lhs: cur,
                    rhs: end_var,
                    ty: Type::Bool,
                    operand_ty: elem_ty.clone(),
                });
                self.set_terminator(
                    cond_block,
                    Terminator::Br { cond: cmp, then_block: body_block, else_block: after_block },
                );

                self.loop_stack.push(LoopTargets { break_block: after_block, continue_block: step_block });
                self.switch_to(body_block);
                self.push_scope();
                self.define_local(var.clone(), slot);
                for s in body {
                    if self.is_terminated(self.current) {
                        break;
                    }
                    self.lower_stmt(s);
                }
                if !self.is_terminated(self.current) {
                    self.pop_scope();
                    self.set_terminator(self.current, Terminator::Jump(step_block));
                } else {
                    self.scopes.pop();
                    self.defers.pop();
                }
                self.loop_stack.pop();

                self.switch_to(step_block);
                let loaded = self.fresh();
                self.emit(Instr::Load { dest: loaded, ptr: slot, ty: elem_ty.clone() });
                let one = self.fresh();
                self.emit(Instr::ConstInt { dest: one, value: 1, ty: elem_ty.clone() });
                let next = self.fresh();
                self.emit(Instr::BinOp {
                    dest: next,
                    op: crate::ast::BinaryOp::Add,
                    lhs: loaded,
                    rhs: one,
                    ty: elem_ty.clone(),
                    operand_ty: elem_ty.clone(),
                });
                self.emit(Instr::Store { ptr: slot, value: next });
                self.set_terminator(step_block, Terminator::Jump(cond_block));

                self.switch_to(after_block);
            }
            CheckedStmt::Switch { subject, arms, default } => {
                self.lower_switch(subject, arms, default);
            }
            CheckedStmt::Defer(inner) => {
                self.push_defer((**inner).clone());
            }
            CheckedStmt::Unsafe(body) => {
                self.lower_block(body);
            }
            CheckedStmt::Break => {
                let target = self.loop_stack.last().expect("break inside a loop").break_block;
                self.set_terminator(self.current, Terminator::Jump(target));
            }
            CheckedStmt::Continue => {
                let target = self.loop_stack.last().expect("continue inside a loop").continue_block;
                self.set_terminator(self.current, Terminator::Jump(target));
            }
        }
    }

    fn lower_switch(&mut self, subject: &CheckedExpr, arms: &[CheckedSwitchArm], default: &Option<CheckedBlock>) {
        let subject_var = self.lower_expr(subject);
        let after_block = self.new_block();

        let mut cases = Vec::new();
        let mut arm_blocks = Vec::new();
        for arm in arms {
            let arm_block = self.new_block();
            for value in &arm.values {
                let discriminant = match value {
                    CheckedCaseValue::Const(v) => *v,
                    CheckedCaseValue::Variant { discriminant, .. } => *discriminant,
                };
                cases.push((discriminant, arm_block));
            }
            arm_blocks.push((arm_block, arm));
        }

        let default_block = self.new_block();
        self.set_terminator(self.current, Terminator::Switch { value: subject_var, cases, default: default_block });

        for (arm_block, arm) in arm_blocks {
            self.switch_to(arm_block);
            self.push_scope();
            if let Some(CheckedCaseValue::Variant { bindings, .. }) = arm.values.first() {
                for (name, ty) in bindings {
                    let field_ptr_ty = Type::Ptr(Box::new(ty.clone()));
                    let casted = self.fresh();
                    self.emit(Instr::Cast { dest: casted, value: subject_var, target_ty: field_ptr_ty });
                    let slot = self.fresh();
                    self.emit(Instr::StackAlloc { dest: slot, ty: ty.clone() });
                    let loaded = self.fresh();
                    self.emit(Instr::Load { dest: loaded, ptr: casted, ty: ty.clone() });
                    self.emit(Instr::Store { ptr: slot, value: loaded });
                    self.define_local(name.clone(), slot);
                }
            }
            for s in &arm.body {
                if self.is_terminated(self.current) {
                    break;
                }
                self.lower_stmt(s);
            }
            if !self.is_terminated(self.current) {
                self.pop_scope();
                self.set_terminator(self.current, Terminator::Jump(after_block));
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
            self.set_terminator(self.current, Terminator::Jump(after_block));
        }

        self.switch_to(after_block);
    }
}
