//! Control-flow graph analysis: predecessors, reverse postorder, and
//! dominators via the Cooper-Harvey-Kennedy "engineer's algorithm", plus the
//! dominance frontier each SSA pass needs for phi placement.

use crate::kir::{BlockId, Function};
use rustc_hash::FxHashMap;

pub struct Cfg {
    pub preds: FxHashMap<BlockId, Vec<BlockId>>,
    pub succs: FxHashMap<BlockId, Vec<BlockId>>,
    pub rpo: Vec<BlockId>,
    /// Immediate dominator of every block reachable from the entry; the
    /// entry block has no entry in this map.
    pub idom: FxHashMap<BlockId, BlockId>,
    pub children: FxHashMap<BlockId, Vec<BlockId>>,
}

impl Cfg {
    pub fn build(f: &Function) -> Cfg {
        let entry = f.entry();
        let mut succs = FxHashMap::default();
        let mut preds: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        for block in &f.blocks {
            let s = block.terminator.successors();
            for &succ in &s {
                preds.entry(succ).or_default().push(block.id);
            }
            succs.insert(block.id, s);
        }
        for block in &f.blocks {
            preds.entry(block.id).or_default();
        }

        let rpo = reverse_postorder(entry, &succs);
        let idom = compute_idom(entry, &rpo, &preds);
        let mut children: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        for (&b, &d) in &idom {
            children.entry(d).or_default().push(b);
        }

        Cfg { preds, succs, rpo, idom, children }
    }

    /// The dominance frontier of every block, as the set of blocks where
    /// that block's dominance "runs out" along some CFG edge.
    pub fn dominance_frontiers(&self) -> FxHashMap<BlockId, Vec<BlockId>> {
        let mut df: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        for (&b, preds) in &self.preds {
            if preds.len() < 2 {
                continue;
            }
            for &p in preds {
                let mut runner = p;
                while Some(runner) != self.idom.get(&b).copied() {
                    let entry = df.entry(runner).or_default();
                    if !entry.contains(&b) {
                        entry.push(b);
                    }
                    match self.idom.get(&runner) {
                        Some(&next) => runner = next,
                        None => break,
                    }
                }
            }
        }
        df
    }
}

fn reverse_postorder(entry: BlockId, succs: &FxHashMap<BlockId, Vec<BlockId>>) -> Vec<BlockId> {
    let mut visited = rustc_hash::FxHashSet::default();
    let mut postorder = Vec::new();
    let mut stack = vec![(entry, 0usize)];
    visited.insert(entry);
    while let Some((block, i)) = stack.pop() {
        let empty = Vec::new();
        let kids = succs.get(&block).unwrap_or(&empty);
        if i < kids.len() {
            let next = kids[i];
            stack.push((block, i + 1));
            if visited.insert(next) {
                stack.push((next, 0));
            }
        } else {
            postorder.push(block);
        }
    }
    postorder.reverse();
    postorder
}

fn compute_idom(entry: BlockId, rpo: &[BlockId], preds: &FxHashMap<BlockId, Vec<BlockId>>) -> FxHashMap<BlockId, BlockId> {
    let rpo_index: FxHashMap<BlockId, usize> = rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();
    let mut idom: FxHashMap<BlockId, BlockId> = FxHashMap::default();
    idom.insert(entry, entry);

    let mut changed = true;
    while changed {
        changed = false;
        for &b in rpo.iter() {
            if b == entry {
                continue;
            }
            let empty = Vec::new();
            let block_preds = preds.get(&b).unwrap_or(&empty);
            let mut new_idom: Option<BlockId> = None;
            for &p in block_preds {
                if !idom.contains_key(&p) {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => p,
                    Some(cur) => intersect(cur, p, &idom, &rpo_index),
                });
            }
            if let Some(computed) = new_idom {
                if idom.get(&b) != Some(&computed) {
                    idom.insert(b, computed);
                    changed = true;
                }
            }
        }
    }
    idom.remove(&entry);
    idom
}

fn intersect(mut a: BlockId, mut b: BlockId, idom: &FxHashMap<BlockId, BlockId>, rpo_index: &FxHashMap<BlockId, usize>) -> BlockId {
    while a != b {
        while rpo_index[&a] > rpo_index[&b] {
            a = idom[&a];
        }
        while rpo_index[&b] > rpo_index[&a] {
            b = idom[&b];
        }
    }
    a
}
