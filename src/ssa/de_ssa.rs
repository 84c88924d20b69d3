//! De-SSA: lowers every block's phis into copies appended to the end of
//! each predecessor, just before its terminator. A predecessor that feeds
//! more than one phi gets its copies sequenced so that a copy never
//! clobbers a value another pending copy in the same predecessor still
//! needs to read; genuine cycles are broken with a fresh temporary (the
//! "lost copy" problem).

use crate::kir::{BlockId, Function, Instr, VarId};
use crate::types::Type;
use rustc_hash::FxHashMap;

pub fn lower_phis(f: &mut Function) {
    let mut phi_types: FxHashMap<VarId, Type> = FxHashMap::default();
    let mut copies_per_pred: FxHashMap<BlockId, Vec<(VarId, VarId)>> = FxHashMap::default();

    for block in &f.blocks {
        for phi in &block.phis {
            phi_types.insert(phi.dest, phi.ty.clone());
            for &(value, pred) in &phi.incoming {
                copies_per_pred.entry(pred).or_default().push((phi.dest, value));
            }
        }
    }

    for block in &mut f.blocks {
        block.phis.clear();
    }

    for (pred, copies) in copies_per_pred {
        let mut extra_types = FxHashMap::default();
        let sequenced = sequence_parallel_copies(copies, &phi_types, f, &mut extra_types);
        for (dest, src) in sequenced {
            let ty = phi_types.get(&dest).or_else(|| extra_types.get(&dest)).cloned().unwrap_or(Type::Void);
            f.block_mut(pred).instructions.push(Instr::Cast { dest, value: src, target_ty: ty });
        }
    }
}

/// Sequentializes one predecessor's parallel phi-copies. Picks any copy
/// whose destination no other pending copy still needs to read as a
/// source and emits it; when only cycles remain, saves one destination's
/// current value to a temporary and redirects the copies waiting on it.
fn sequence_parallel_copies(
    copies: Vec<(VarId, VarId)>,
    phi_types: &FxHashMap<VarId, Type>,
    f: &mut Function,
    extra_types: &mut FxHashMap<VarId, Type>,
) -> Vec<(VarId, VarId)> {
    let mut remaining = copies;
    let mut result = Vec::new();

    while !remaining.is_empty() {
        let ready = remaining
            .iter()
            .position(|&(d, _)| !remaining.iter().any(|&(d2, s2)| d2 != d && s2 == d));

        match ready {
            Some(i) => {
                let (d, s) = remaining.remove(i);
                if d != s {
                    result.push((d, s));
                }
            }
            None => {
                let (d, _) = remaining[0];
                let ty = phi_types.get(&d).cloned().unwrap_or(Type::Void);
                let tmp = f.fresh_var();
                extra_types.insert(tmp, ty);
                result.push((tmp, d));
                for pair in remaining.iter_mut() {
                    if pair.1 == d {
                        pair.1 = tmp;
                    }
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kir::{Phi, Terminator};

    /// A join block with one phi fed by two predecessors, already placed
    /// (as `mem2reg::promote` would leave it) — exercises `lower_phis`
    /// without needing a full promotion pass.
    fn function_with_one_join_phi() -> Function {
        let mut f = Function::new("f".into(), vec![], Type::I32, None, false);
        let entry = f.new_block();
        let then_b = f.new_block();
        let else_b = f.new_block();
        let join = f.new_block();

        let cond = f.fresh_var();
        f.block_mut(entry).instructions.push(Instr::ConstBool { dest: cond, value: true });
        f.block_mut(entry).terminator = Terminator::Br { cond, then_block: then_b, else_block: else_b };

        let ten = f.fresh_var();
        f.block_mut(then_b).instructions.push(Instr::ConstInt { dest: ten, value: 10, ty: Type::I32 });
        f.block_mut(then_b).terminator = Terminator::Jump(join);

        let twenty = f.fresh_var();
        f.block_mut(else_b).instructions.push(Instr::ConstInt { dest: twenty, value: 20, ty: Type::I32 });
        f.block_mut(else_b).terminator = Terminator::Jump(join);

        let phi_dest = f.fresh_var();
        f.block_mut(join).phis.push(Phi {
            dest: phi_dest,
            ty: Type::I32,
            incoming: vec![(ten, then_b), (twenty, else_b)],
        });
        f.block_mut(join).terminator = Terminator::Ret(Some(phi_dest));

        f
    }

    #[test]
    fn lowers_phi_to_an_identity_cast_in_each_predecessor() {
        let mut f = function_with_one_join_phi();
        lower_phis(&mut f);
        assert!(f.blocks.iter().all(|b| b.phis.is_empty()));
        let then_b = f.block(BlockId(1));
        assert!(then_b.instructions.iter().any(|i| matches!(i, Instr::Cast { target_ty: Type::I32, .. })));
    }

    #[test]
    fn running_lower_phis_twice_is_idempotent() {
        let mut once = function_with_one_join_phi();
        lower_phis(&mut once);
        let mut twice = once.clone();
        lower_phis(&mut twice);
        assert_eq!(format!("{once:?}"), format!("{twice:?}"));
    }
}
