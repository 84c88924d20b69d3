//! SSA construction and destruction, run per function between lowering and
//! C emission: `mem2reg` promotes stack slots to phi-bearing SSA values,
//! `de_ssa` lowers those phis back to ordinary copies the emitter can print
//! as C assignments.

pub mod cfg;
pub mod de_ssa;
pub mod mem2reg;

use crate::kir;
use crate::trace::ssa_log;

pub fn run(module: &mut kir::Module) {
    for f in &mut module.functions {
        ssa_log!("mem2reg: {}", f.name);
        mem2reg::promote(f);
        ssa_log!("de-ssa: {}", f.name);
        de_ssa::lower_phis(f);
    }
}
