//! Promotion of scalar locals to SSA values.
//!
//! A local qualifies when its address is only ever the direct pointer of a
//! load or store: never stored as a value, passed to a call, or used by any
//! other instruction. Qualifying locals stop going through memory entirely:
//! phis are placed at the iterated dominance frontier of the blocks that
//! store to the local, and a renaming walk over the dominator tree replaces
//! every load with the reaching value.
//!
//! Invariance reasoning downstream only sees values, so this pass runs ahead
//! of code motion in the standard pipeline.
//!
//! Only reachable code is rewritten; accesses in dead blocks are left as
//! they are. The promoted `Local` entries themselves stay in the function's
//! table (ids index into it), they are simply no longer referenced.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::analysis::cfg::Cfg;
use crate::analysis::dom::DomTree;
use crate::ir::model::*;
use crate::opt::{Pass, PassResult};

pub struct PromoteLocals;

impl Pass for PromoteLocals {
    fn name(&self) -> &'static str {
        "promote-locals"
    }

    fn run(&mut self, func: &mut Function) -> PassResult {
        if func.blocks.is_empty() {
            return PassResult::Preserved;
        }
        let addrs = local_addrs(func);
        let promotable = find_promotable(func, &addrs);
        if promotable.is_empty() {
            return PassResult::Preserved;
        }
        log::debug!(
            "promote-locals: promoting {} local(s) in {}",
            promotable.len(),
            func.name
        );
        promote(func, &addrs, &promotable);
        PassResult::Invalidated
    }
}

/// Address values: result of each `addr` instruction, mapped to its local.
fn local_addrs(func: &Function) -> HashMap<ValueId, LocalId> {
    let mut addrs = HashMap::new();
    for block in &func.blocks {
        for inst in &block.insts {
            if let (Some(result), InstKind::AddrOfLocal { local }) = (&inst.result, &inst.kind) {
                addrs.insert(result.id, *local);
            }
        }
    }
    addrs
}

/// Scalar locals whose address never escapes, in id order.
fn find_promotable(func: &Function, addrs: &HashMap<ValueId, LocalId>) -> Vec<LocalId> {
    let mut escaped: HashSet<LocalId> = HashSet::new();
    for block in &func.blocks {
        for inst in &block.insts {
            match &inst.kind {
                // The pointer operand of a direct load or store is the one
                // blessed use of an address.
                InstKind::Load { .. } => {}
                InstKind::Store { value, .. } => {
                    if let Some(local) = addrs.get(value) {
                        escaped.insert(*local);
                    }
                }
                kind => {
                    for_each_use(kind, |value| {
                        if let Some(local) = addrs.get(&value) {
                            escaped.insert(*local);
                        }
                    });
                }
            }
        }
        block.term.for_each_use(|value| {
            if let Some(local) = addrs.get(&value) {
                escaped.insert(*local);
            }
        });
    }

    let addressed: HashSet<LocalId> = addrs.values().copied().collect();
    func.locals
        .iter()
        .filter(|local| {
            local.ty.is_scalar() && addressed.contains(&local.id) && !escaped.contains(&local.id)
        })
        .map(|local| local.id)
        .collect()
}

fn promote(func: &mut Function, addrs: &HashMap<ValueId, LocalId>, promotable: &[LocalId]) {
    let cfg = Cfg::new(func);
    let dom = DomTree::new(&cfg);
    let frontier = dom.frontier(&cfg);
    let promoted: HashSet<LocalId> = promotable.iter().copied().collect();
    let entry = cfg.entry();

    // Every local starts out as a zero/false constant seeded in the entry
    // block; a load before any store observes that, matching fresh memory.
    let mut stacks: HashMap<LocalId, Vec<ValueId>> = HashMap::new();
    let mut seeds = Vec::new();
    for &local in promotable {
        let ty = func.local(local).ty;
        let def = func.new_value(ty);
        let value = match ty {
            Type::Bool => ConstValue::Bool(false),
            _ => ConstValue::Int(0),
        };
        seeds.push(Instruction {
            result: Some(def),
            kind: InstKind::Const { value },
        });
        stacks.insert(local, vec![def.id]);
    }
    {
        let block = func.block_mut(entry);
        let at = block.insts.iter().take_while(|inst| inst.is_phi()).count();
        block.insts.splice(at..at, seeds);
    }

    // Phi placement at the iterated dominance frontier of the store blocks
    // (the entry counts as a def: it holds the seed).
    let mut store_blocks: HashMap<LocalId, Vec<BlockId>> = HashMap::new();
    for block in &func.blocks {
        if !dom.is_reachable(block.id) {
            continue;
        }
        for inst in &block.insts {
            if let InstKind::Store { ptr, .. } = &inst.kind {
                if let Some(local) = addrs.get(ptr) {
                    if promoted.contains(local) {
                        store_blocks.entry(*local).or_default().push(block.id);
                    }
                }
            }
        }
    }

    let mut placed: IndexMap<(BlockId, LocalId), ValueDef> = IndexMap::new();
    let mut placed_local: HashMap<ValueId, LocalId> = HashMap::new();
    for &local in promotable {
        let ty = func.local(local).ty;
        let mut worklist = vec![entry];
        worklist.extend(store_blocks.get(&local).into_iter().flatten().copied());
        let mut has_phi: HashSet<BlockId> = HashSet::new();
        while let Some(block) = worklist.pop() {
            for &join in &frontier[block.index()] {
                if has_phi.insert(join) {
                    let def = func.new_value(ty);
                    placed.insert((join, local), def);
                    placed_local.insert(def.id, local);
                    worklist.push(join);
                }
            }
        }
    }

    // Materialize the placed phis (incomings are filled in during renaming).
    for &block_id in cfg.blocks() {
        let phis: Vec<ValueDef> = promotable
            .iter()
            .filter_map(|&local| placed.get(&(block_id, local)).copied())
            .collect();
        if phis.is_empty() {
            continue;
        }
        let block = func.block_mut(block_id);
        let at = block.insts.iter().take_while(|inst| inst.is_phi()).count();
        block.insts.splice(
            at..at,
            phis.into_iter().map(|def| Instruction {
                result: Some(def),
                kind: InstKind::Phi {
                    incomings: Vec::new(),
                },
            }),
        );
    }

    // Renaming walk over the dominator tree, explicit stack.
    let mut children: Vec<Vec<BlockId>> = vec![Vec::new(); cfg.num_blocks()];
    for &block in cfg.blocks() {
        if let Some(idom) = dom.idom(block) {
            children[idom.index()].push(block);
        }
    }

    let mut replacement: HashMap<ValueId, ValueId> = HashMap::new();
    let resolve = |replacement: &HashMap<ValueId, ValueId>, value: ValueId| -> ValueId {
        replacement.get(&value).copied().unwrap_or(value)
    };

    struct Frame {
        block: BlockId,
        next_child: usize,
        saved: Vec<(LocalId, usize)>,
    }

    let mut frames: Vec<Frame> = Vec::new();
    let saved: Vec<(LocalId, usize)> = promotable
        .iter()
        .map(|&local| (local, stacks[&local].len()))
        .collect();
    rename_block(
        func,
        &cfg,
        addrs,
        &promoted,
        &placed,
        &placed_local,
        &mut stacks,
        &mut replacement,
        &resolve,
        entry,
    );
    frames.push(Frame {
        block: entry,
        next_child: 0,
        saved,
    });

    while let Some(frame) = frames.last_mut() {
        let kids = &children[frame.block.index()];
        if frame.next_child < kids.len() {
            let child = kids[frame.next_child];
            frame.next_child += 1;
            let saved: Vec<(LocalId, usize)> = promotable
                .iter()
                .map(|&local| (local, stacks[&local].len()))
                .collect();
            rename_block(
                func,
                &cfg,
                addrs,
                &promoted,
                &placed,
                &placed_local,
                &mut stacks,
                &mut replacement,
                &resolve,
                child,
            );
            frames.push(Frame {
                block: child,
                next_child: 0,
                saved,
            });
        } else {
            for (local, len) in &frame.saved {
                stacks
                    .get_mut(local)
                    .unwrap_or_else(|| panic!("no rename stack for local %l{}", local.0))
                    .truncate(*len);
            }
            frames.pop();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn rename_block(
    func: &mut Function,
    cfg: &Cfg,
    addrs: &HashMap<ValueId, LocalId>,
    promoted: &HashSet<LocalId>,
    placed: &IndexMap<(BlockId, LocalId), ValueDef>,
    placed_local: &HashMap<ValueId, LocalId>,
    stacks: &mut HashMap<LocalId, Vec<ValueId>>,
    replacement: &mut HashMap<ValueId, ValueId>,
    resolve: &impl Fn(&HashMap<ValueId, ValueId>, ValueId) -> ValueId,
    block_id: BlockId,
) {
    let insts = std::mem::take(&mut func.block_mut(block_id).insts);
    let mut kept = Vec::with_capacity(insts.len());

    for mut inst in insts {
        match &mut inst.kind {
            InstKind::Phi { .. } => {
                if let Some(result) = &inst.result {
                    if let Some(local) = placed_local.get(&result.id) {
                        stacks
                            .get_mut(local)
                            .unwrap_or_else(|| panic!("no rename stack for local %l{}", local.0))
                            .push(result.id);
                    }
                }
                // Pre-existing phi incomings are rewritten when the matching
                // predecessor is visited.
                kept.push(inst);
            }
            InstKind::Load { ptr } => {
                let target = addrs.get(ptr).filter(|local| promoted.contains(*local));
                match (target, &inst.result) {
                    (Some(local), Some(result)) => {
                        let top = *stacks[local]
                            .last()
                            .unwrap_or_else(|| panic!("empty rename stack for %l{}", local.0));
                        replacement.insert(result.id, top);
                    }
                    _ => {
                        for_each_use_mut(&mut inst.kind, |value| {
                            *value = resolve(replacement, *value);
                        });
                        kept.push(inst);
                    }
                }
            }
            InstKind::Store { ptr, value } => {
                match addrs.get(ptr).filter(|local| promoted.contains(*local)) {
                    Some(local) => {
                        let value = resolve(replacement, *value);
                        stacks
                            .get_mut(local)
                            .unwrap_or_else(|| panic!("no rename stack for local %l{}", local.0))
                            .push(value);
                    }
                    None => {
                        for_each_use_mut(&mut inst.kind, |value| {
                            *value = resolve(replacement, *value);
                        });
                        kept.push(inst);
                    }
                }
            }
            InstKind::AddrOfLocal { local } if promoted.contains(local) => {
                // All of its uses were loads and stores that are now gone.
            }
            _ => {
                for_each_use_mut(&mut inst.kind, |value| {
                    *value = resolve(replacement, *value);
                });
                kept.push(inst);
            }
        }
    }

    let block = func.block_mut(block_id);
    block.insts = kept;
    block.term.for_each_use_mut(|value| {
        *value = resolve(replacement, *value);
    });

    // Feed this block's reaching values into successor phis.
    for &succ in cfg.succs(block_id) {
        let mut appends: Vec<(usize, PhiIncoming)> = Vec::new();
        let succ_block = func.block(succ);
        for (at, inst) in succ_block.insts.iter().enumerate() {
            let InstKind::Phi { .. } = &inst.kind else {
                break;
            };
            let Some(result) = &inst.result else {
                continue;
            };
            if let Some(local) = placed_local.get(&result.id) {
                if placed.contains_key(&(succ, *local)) {
                    let top = *stacks[local]
                        .last()
                        .unwrap_or_else(|| panic!("empty rename stack for %l{}", local.0));
                    appends.push((
                        at,
                        PhiIncoming {
                            pred: block_id,
                            value: top,
                        },
                    ));
                }
            }
        }
        let succ_block = func.block_mut(succ);
        for (at, incoming) in appends {
            if let InstKind::Phi { incomings } = &mut succ_block.insts[at].kind {
                incomings.push(incoming);
            }
        }
        // Pre-existing phis: rewrite the incoming that flows along this edge.
        for inst in succ_block.insts.iter_mut() {
            let InstKind::Phi { incomings } = &mut inst.kind else {
                break;
            };
            for incoming in incomings.iter_mut() {
                if incoming.pred == block_id {
                    incoming.value = resolve(replacement, incoming.value);
                }
            }
        }
    }
}
