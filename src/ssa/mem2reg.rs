//! Promotes stack-allocated locals whose address never escapes into plain
//! SSA values, inserting phis at the iterated dominance frontier of their
//! definitions (Cytron et al.). Locals that are ever passed by address
//! (struct-by-reference args, field/index addressing) are left as real
//! `stack_alloc` slots.

use crate::kir::{BlockId, Function, Instr, Phi, Terminator, VarId};
use crate::ssa::cfg::Cfg;
use crate::types::Type;
use rustc_hash::{FxHashMap, FxHashSet};

pub fn promote(f: &mut Function) {
    let cfg = Cfg::build(f);
    let promotable = find_promotable_allocas(f);
    if promotable.is_empty() {
        return;
    }
    let alloca_types = collect_alloca_types(f, &promotable);
    let def_blocks = collect_def_blocks(f, &promotable);
    let df = cfg.dominance_frontiers();

    let phi_allocas = place_phis(f, &promotable, &alloca_types, &def_blocks, &df);
    rename(f, &cfg, &promotable, &phi_allocas);
}

/// A `stack_alloc` is promotable iff the only instructions referencing its
/// `VarId` use it strictly as a `load` pointer, a `store` pointer, or a
/// `move` source — never as an address handed to anything else.
fn find_promotable_allocas(f: &Function) -> FxHashSet<VarId> {
    let mut allocas = FxHashSet::default();
    for block in &f.blocks {
        for instr in &block.instructions {
            if let Instr::StackAlloc { dest, .. } = instr {
                allocas.insert(*dest);
            }
        }
    }
    let mut escapes = FxHashSet::default();
    for block in &f.blocks {
        for instr in &block.instructions {
            match instr {
                Instr::Load { .. } => {}
                Instr::Store { value, .. } => {
                    if allocas.contains(value) {
                        escapes.insert(*value);
                    }
                }
                Instr::Move { .. } => {}
                other => {
                    for op in other.operands() {
                        if allocas.contains(&op) {
                            escapes.insert(op);
                        }
                    }
                }
            }
        }
    }
    allocas.difference(&escapes).copied().collect()
}

fn collect_alloca_types(f: &Function, promotable: &FxHashSet<VarId>) -> FxHashMap<VarId, Type> {
    let mut out = FxHashMap::default();
    for block in &f.blocks {
        for instr in &block.instructions {
            if let Instr::StackAlloc { dest, ty } = instr {
                if promotable.contains(dest) {
                    out.insert(*dest, ty.clone());
                }
            }
        }
    }
    out
}

fn collect_def_blocks(f: &Function, promotable: &FxHashSet<VarId>) -> FxHashMap<VarId, Vec<BlockId>> {
    let mut out: FxHashMap<VarId, Vec<BlockId>> = FxHashMap::default();
    for block in &f.blocks {
        for instr in &block.instructions {
            if let Instr::Store { ptr, .. } = instr {
                if promotable.contains(ptr) {
                    out.entry(*ptr).or_default().push(block.id);
                }
            }
        }
    }
    out
}

/// Inserts an (initially empty) phi per promotable alloca at every block in
/// its iterated dominance frontier. Returns, per block, which phi
/// corresponds to which alloca — needed by `rename` since `kir::Phi` itself
/// doesn't record that association once renaming is done.
fn place_phis(
    f: &mut Function,
    promotable: &FxHashSet<VarId>,
    alloca_types: &FxHashMap<VarId, Type>,
    def_blocks: &FxHashMap<VarId, Vec<BlockId>>,
    df: &FxHashMap<BlockId, Vec<BlockId>>,
) -> FxHashMap<BlockId, FxHashMap<VarId, VarId>> {
    let mut phi_allocas: FxHashMap<BlockId, FxHashMap<VarId, VarId>> = FxHashMap::default();

    for &alloca in promotable {
        let mut has_phi: FxHashSet<BlockId> = FxHashSet::default();
        let mut worklist: Vec<BlockId> = def_blocks.get(&alloca).cloned().unwrap_or_default();
        let mut on_worklist: FxHashSet<BlockId> = worklist.iter().copied().collect();

        while let Some(block) = worklist.pop() {
            on_worklist.remove(&block);
            let empty = Vec::new();
            for &frontier_block in df.get(&block).unwrap_or(&empty) {
                if has_phi.insert(frontier_block) {
                    let dest = f.fresh_var();
                    f.block_mut(frontier_block).phis.push(Phi {
                        dest,
                        ty: alloca_types[&alloca].clone(),
                        incoming: Vec::new(),
                    });
                    phi_allocas.entry(frontier_block).or_default().insert(alloca, dest);
                    if on_worklist.insert(frontier_block) {
                        worklist.push(frontier_block);
                    }
                }
            }
        }
    }

    phi_allocas
}

struct Renamer<'a> {
    promotable: &'a FxHashSet<VarId>,
    phi_allocas: &'a FxHashMap<BlockId, FxHashMap<VarId, VarId>>,
    stacks: FxHashMap<VarId, Vec<VarId>>,
    alias: FxHashMap<VarId, VarId>,
}

impl<'a> Renamer<'a> {
    fn resolve(&self, mut v: VarId) -> VarId {
        while let Some(&next) = self.alias.get(&v) {
            if next == v {
                break;
            }
            v = next;
        }
        v
    }

    fn current(&self, alloca: VarId) -> Option<VarId> {
        self.stacks.get(&alloca).and_then(|s| s.last().copied())
    }
}

fn rename(f: &mut Function, cfg: &Cfg, promotable: &FxHashSet<VarId>, phi_allocas: &FxHashMap<BlockId, FxHashMap<VarId, VarId>>) {
    let mut renamer = Renamer {
        promotable,
        phi_allocas,
        stacks: FxHashMap::default(),
        alias: FxHashMap::default(),
    };

    rename_block(f, cfg, f.entry(), &mut renamer);
}

fn rename_block(f: &mut Function, cfg: &Cfg, block: BlockId, r: &mut Renamer) {
    let mut pushed: Vec<VarId> = Vec::new();

    if let Some(allocas) = r.phi_allocas.get(&block) {
        for (&alloca, &phi_dest) in allocas {
            r.stacks.entry(alloca).or_default().push(phi_dest);
            pushed.push(alloca);
        }
    }

    let instrs = std::mem::take(&mut f.block_mut(block).instructions);
    let mut rewritten = Vec::with_capacity(instrs.len());
    for instr in instrs {
        match instr {
            Instr::StackAlloc { dest, .. } if r.promotable.contains(&dest) => {
                // Dropped entirely once promoted; `strip_promoted_allocas`
                // double-checks nothing else still references it.
            }
            Instr::Load { dest, ptr, .. } if r.promotable.contains(&ptr) => {
                let current = r.current(ptr).expect("promotable alloca read before any store reached it");
                r.alias.insert(dest, current);
            }
            Instr::Move { dest, source, ty } if r.promotable.contains(&source) => {
                let current = r.current(source).expect("promotable alloca moved before any store reached it");
                r.alias.insert(dest, current);
                let _ = ty;
            }
            Instr::Store { ptr, value } if r.promotable.contains(&ptr) => {
                let resolved = r.resolve(value);
                r.stacks.entry(ptr).or_default().push(resolved);
                pushed.push(ptr);
            }
            other => rewritten.push(substitute_operands(other, r)),
        }
    }
    f.block_mut(block).instructions = rewritten;

    let term = substitute_terminator(f.block(block).terminator.clone(), r);
    f.block_mut(block).terminator = term;

    let empty = Vec::new();
    for &succ in cfg.succs.get(&block).unwrap_or(&empty) {
        if let Some(allocas) = r.phi_allocas.get(&succ) {
            for (&alloca, &phi_dest) in allocas.clone().iter() {
                if let Some(value) = r.current(alloca) {
                    let phi = f.block_mut(succ).phis.iter_mut().find(|p| p.dest == phi_dest).expect("phi recorded at placement time");
                    phi.incoming.push((value, block));
                }
            }
        }
    }

    let empty_children = Vec::new();
    let children = cfg.children.get(&block).unwrap_or(&empty_children).clone();
    for child in children {
        rename_block(f, cfg, child, r);
    }

    for alloca in pushed {
        r.stacks.get_mut(&alloca).expect("pushed alloca has a stack").pop();
    }
}

fn substitute_operands(instr: Instr, r: &Renamer) -> Instr {
    use Instr::*;
    match instr {
        Load { dest, ptr, ty } => Load { dest, ptr: r.resolve(ptr), ty },
        Store { ptr, value } => Store { ptr: r.resolve(ptr), value: r.resolve(value) },
        BinOp { dest, op, lhs, rhs, ty, operand_ty } => BinOp { dest, op, lhs: r.resolve(lhs), rhs: r.resolve(rhs), ty, operand_ty },
        Neg { dest, value, ty } => Neg { dest, value: r.resolve(value), ty },
        Not { dest, value } => Not { dest, value: r.resolve(value) },
        BitNot { dest, value, ty } => BitNot { dest, value: r.resolve(value), ty },
        Cast { dest, value, target_ty } => Cast { dest, value: r.resolve(value), target_ty },
        FieldPtr { dest, base, field, ty } => FieldPtr { dest, base: r.resolve(base), field, ty },
        IndexPtr { dest, base, index, ty } => IndexPtr { dest, base: r.resolve(base), index: r.resolve(index), ty },
        BoundsCheck { index, length } => BoundsCheck { index: r.resolve(index), length },
        Call { dest, func, args, ty } => Call { dest, func, args: args.into_iter().map(|a| r.resolve(a)).collect(), ty },
        CallVoid { func, args } => CallVoid { func, args: args.into_iter().map(|a| r.resolve(a)).collect() },
        CallExtern { dest, func, args, ty } => CallExtern { dest, func, args: args.into_iter().map(|a| r.resolve(a)).collect(), ty },
        CallExternVoid { func, args } => CallExternVoid { func, args: args.into_iter().map(|a| r.resolve(a)).collect() },
        CallThrows { dest, func, args, out_ptr, err_ptr, success_ty, error_types } => CallThrows {
            dest,
            func,
            args: args.into_iter().map(|a| r.resolve(a)).collect(),
            out_ptr: out_ptr.map(|p| r.resolve(p)),
            err_ptr: r.resolve(err_ptr),
            success_ty,
            error_types,
        },
        Move { dest, source, ty } => Move { dest, source: r.resolve(source), ty },
        Destroy { value, struct_name } => Destroy { value: r.resolve(value), struct_name },
        Oncopy { value, struct_name } => Oncopy { value: r.resolve(value), struct_name },
        other => other,
    }
}

fn substitute_terminator(term: Terminator, r: &Renamer) -> Terminator {
    match term {
        Terminator::Br { cond, then_block, else_block } => Terminator::Br { cond: r.resolve(cond), then_block, else_block },
        Terminator::Switch { value, cases, default } => Terminator::Switch { value: r.resolve(value), cases, default },
        Terminator::Ret(Some(v)) => Terminator::Ret(Some(r.resolve(v))),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `if cond { %a = 10 } else { %a = 20 }; return %a` — one promotable
    /// alloca written on both arms of a diamond, read after the join, so
    /// `promote` must insert exactly one phi at the join block.
    fn diamond_with_promotable_alloca() -> Function {
        let mut f = Function::new("f".into(), vec![], Type::I32, None, false);
        let entry = f.new_block();
        let then_b = f.new_block();
        let else_b = f.new_block();
        let join = f.new_block();

        let alloca = f.fresh_var();
        let cond = f.fresh_var();
        let one = f.fresh_var();
        f.block_mut(entry).instructions.push(Instr::StackAlloc { dest: alloca, ty: Type::I32 });
        f.block_mut(entry).instructions.push(Instr::ConstBool { dest: cond, value: true });
        f.block_mut(entry).instructions.push(Instr::ConstInt { dest: one, value: 1, ty: Type::I32 });
        f.block_mut(entry).instructions.push(Instr::Store { ptr: alloca, value: one });
        f.block_mut(entry).terminator = Terminator::Br { cond, then_block: then_b, else_block: else_b };

        let ten = f.fresh_var();
        f.block_mut(then_b).instructions.push(Instr::ConstInt { dest: ten, value: 10, ty: Type::I32 });
        f.block_mut(then_b).instructions.push(Instr::Store { ptr: alloca, value: ten });
        f.block_mut(then_b).terminator = Terminator::Jump(join);

        let twenty = f.fresh_var();
        f.block_mut(else_b).instructions.push(Instr::ConstInt { dest: twenty, value: 20, ty: Type::I32 });
        f.block_mut(else_b).instructions.push(Instr::Store { ptr: alloca, value: twenty });
        f.block_mut(else_b).terminator = Terminator::Jump(join);

        let loaded = f.fresh_var();
        f.block_mut(join).instructions.push(Instr::Load { dest: loaded, ptr: alloca, ty: Type::I32 });
        f.block_mut(join).terminator = Terminator::Ret(Some(loaded));

        f
    }

    #[test]
    fn promotes_diamond_alloca_to_a_single_join_phi() {
        let mut f = diamond_with_promotable_alloca();
        promote(&mut f);
        let join = f.block(BlockId(3));
        assert_eq!(join.phis.len(), 1);
        assert_eq!(join.phis[0].incoming.len(), 2);
        assert!(f.blocks.iter().all(|b| !b.instructions.iter().any(|i| matches!(i, Instr::StackAlloc { .. }))));
    }

    #[test]
    fn running_promote_twice_is_idempotent() {
        let mut once = diamond_with_promotable_alloca();
        promote(&mut once);
        let mut twice = once.clone();
        promote(&mut twice);
        assert_eq!(format!("{once:?}"), format!("{twice:?}"));
    }
}
