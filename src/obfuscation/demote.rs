//! Stack demotion: rewrite escaping values and phi nodes as explicit memory.
//!
//! Once the block graph gets rewritten, two kinds of values break: results
//! consumed outside their defining block (dominance may no longer hold), and
//! phi nodes (their incoming edges stop matching the new predecessor sets).
//! This pass rewrites both through explicit stack slots: allocate once in the
//! entry block, store at the definition, load at every remote use. After it
//! runs, the only cross-block data movement is through memory.
//!
//! # Anchor
//!
//! All new slots are allocated at a single stable point: a zero-cost bitcast
//! marker inserted into the entry block right after its leading allocas. A
//! dedicated marker keeps the insertion point valid while the pass itself
//! inserts more allocas around it.
//!
//! # Contract
//!
//! The entry block must have no predecessors. Violations are a bug in an
//! earlier pass and abort via assertion; there is no recovery path that
//! produces a meaningful function.

use crate::analysis::value_escapes;
use crate::ir::{
    BlockId, CastKind, Constant, Function, InstrId, Instruction, Opcode, Operand, PhiIncoming, Ty,
};

/// Counts of what one demotion run rewrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemotionStats {
    /// Escaping values backed by new stack slots.
    pub values: usize,
    /// Phi nodes replaced by stack slots.
    pub phis: usize,
}

/// Rewrites the function so no value crosses a block boundary in a virtual
/// register and no phi nodes remain. In place; a function with no escaping
/// values and no phi nodes is left unchanged. Returns how much was rewritten.
///
/// # Panics
///
/// Panics if the entry block has predecessors, or if a block that should be
/// terminated is not (both indicate IR corrupted by an earlier pass).
pub fn normalize_stack_usage(func: &mut Function) -> DemotionStats {
    let entry = func.entry();
    assert!(
        func.predecessors(entry).is_empty(),
        "entry block to function must not have predecessors"
    );

    let anchor = insert_anchor(func, entry);

    // Collect escaping instructions first, then rewrite: demotion inserts
    // loads and stores that must not feed back into the scan. Phi nodes are
    // excluded; phi demotion below rewrites every one of their uses itself,
    // and a store wedged between two phis would break the leading prefix.
    let mut worklist = Vec::new();
    for block in func.block_ids() {
        for &id in func.block(block).instructions() {
            if id == anchor || func.instr(id).is_phi() {
                continue;
            }
            let entry_alloca = block == entry && func.instr(id).opcode().is_alloca();
            if !entry_alloca && value_escapes(func, id) {
                worklist.push(id);
            }
        }
    }
    let stats = DemotionStats {
        values: worklist.len(),
        phis: 0,
    };
    for id in worklist {
        demote_value(func, id, anchor);
    }

    let mut phis = Vec::new();
    for block in func.block_ids() {
        phis.extend(func.phis(block));
    }
    let stats = DemotionStats {
        phis: phis.len(),
        ..stats
    };
    for phi in phis {
        demote_phi(func, phi, anchor);
    }

    // The anchor only exists to pin the slot insertion point; once every
    // slot is placed it has no users and can be detached again.
    func.remove_instr(anchor);
    stats
}

/// Inserts the zero-cost slot-allocation anchor after the entry block's
/// leading allocas.
fn insert_anchor(func: &mut Function, entry: BlockId) -> InstrId {
    let index = func
        .block(entry)
        .instructions()
        .iter()
        .take_while(|&&id| func.instr(id).opcode().is_alloca())
        .count();
    func.insert_at(
        entry,
        index,
        Instruction::with_name(
            Opcode::Cast {
                kind: CastKind::BitCast,
                value: Operand::Const(Constant::zero(Ty::I32)),
            },
            Ty::I32,
            "demote_anchor",
        ),
    )
}

/// Backs one escaping instruction by a stack slot: slot at the anchor, store
/// right after the definition, load at every use site.
///
/// A phi consumer is special: its use happens on the incoming edge, so the
/// load is inserted before the terminator of the matching predecessor rather
/// than at the phi itself.
fn demote_value(func: &mut Function, id: InstrId, anchor: InstrId) -> InstrId {
    let ty = func.instr(id).ty();
    let slot = func.insert_after(
        anchor,
        Instruction::alloca(ty, slot_name(func, id)),
    );

    for user in func.users_of(id) {
        if func.instr(user).is_phi() {
            reload_phi_edges(func, user, id, slot, ty);
        } else {
            let load = func.insert_before(
                user,
                Instruction::load(Operand::Instr(slot), ty, reload_name(func, id)),
            );
            func.replace_use(user, id, &Operand::Instr(load));
        }
    }

    func.insert_after(
        id,
        Instruction::store(Operand::Instr(id), Operand::Instr(slot)),
    );
    slot
}

/// Replaces every incoming edge of `phi` that carries `value` with a load
/// from `slot` placed before the terminator of that edge's predecessor.
fn reload_phi_edges(func: &mut Function, phi: InstrId, value: InstrId, slot: InstrId, ty: Ty) {
    let incoming: Vec<PhiIncoming> = match func.instr(phi).opcode() {
        Opcode::Phi { incoming } => incoming.clone(),
        _ => unreachable!("caller checked is_phi"),
    };

    for (i, inc) in incoming.iter().enumerate() {
        if inc.value().as_instr() != Some(value) {
            continue;
        }
        let term = func
            .terminator(inc.block())
            .expect("phi predecessor must be terminated");
        let load = func.insert_before(
            term,
            Instruction::load(Operand::Instr(slot), ty, reload_name(func, value)),
        );
        if let Opcode::Phi { incoming } = func.instr_mut(phi).opcode_mut() {
            incoming[i].set_value(Operand::Instr(load));
        }
    }
}

/// Replaces one phi node with a stack slot: a store before each predecessor's
/// terminator, a load where the phi stood, and the phi removed.
fn demote_phi(func: &mut Function, phi: InstrId, anchor: InstrId) -> InstrId {
    let ty = func.instr(phi).ty();
    let block = func
        .block_of(phi)
        .expect("phi must be attached to a block");
    let incoming: Vec<PhiIncoming> = match func.instr(phi).opcode() {
        Opcode::Phi { incoming } => incoming.clone(),
        other => panic!("demote_phi called on non-phi opcode {other:?}"),
    };

    let slot = func.insert_after(
        anchor,
        Instruction::alloca(ty, slot_name(func, phi)),
    );

    // One store per incoming edge, on the edge: just before the predecessor's
    // terminator.
    for inc in &incoming {
        let term = func
            .terminator(inc.block())
            .expect("phi predecessor must be terminated");
        func.insert_before(
            term,
            Instruction::store(inc.value().clone(), Operand::Instr(slot)),
        );
    }

    // Users in the phi's own block read one load at the point the phi stood
    // (the first position past the remaining phis and pads). A user in any
    // other block gets its own load at the use site instead; a single remote
    // load would itself be a cross-block register reference. Phi users cannot
    // read a load at all (their use lives on an incoming edge), so they
    // reload on the edge.
    let mut positional_load = None;
    for user in func.users_of(phi) {
        if func.instr(user).is_phi() {
            reload_phi_edges(func, user, phi, slot, ty);
        } else if func.block_of(user) == Some(block) {
            let load = *positional_load.get_or_insert_with(|| {
                let index = func.first_insertion_index(block);
                func.insert_at(
                    block,
                    index,
                    Instruction::load(Operand::Instr(slot), ty, reload_name(func, phi)),
                )
            });
            func.replace_use(user, phi, &Operand::Instr(load));
        } else {
            let load = func.insert_before(
                user,
                Instruction::load(Operand::Instr(slot), ty, reload_name(func, phi)),
            );
            func.replace_use(user, phi, &Operand::Instr(load));
        }
    }
    func.remove_instr(phi);
    slot
}

fn slot_name(func: &Function, id: InstrId) -> String {
    let name = func.instr(id).name();
    if name.is_empty() {
        format!("v{}.reg2mem", id.index())
    } else {
        format!("{name}.reg2mem")
    }
}

fn reload_name(func: &Function, id: InstrId) -> String {
    let name = func.instr(id).name();
    if name.is_empty() {
        format!("v{}.reload", id.index())
    } else {
        format!("{name}.reload")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOpKind, BlockId, CmpPred, Linkage};

    fn add(lhs: Operand, rhs: Operand) -> Instruction {
        Instruction::with_name(
            Opcode::BinOp {
                op: BinOpKind::Add,
                lhs,
                rhs,
            },
            Ty::I32,
            "sum",
        )
    }

    /// entry: %sum = add 1, 2 ; br exit
    /// exit:  ret %sum
    fn escaping_function() -> Function {
        let mut func = Function::new("f", Linkage::Internal);
        let entry = func.add_block("entry");
        let exit = func.add_block("exit");
        let sum = func.push_instr(
            entry,
            add(
                Operand::Const(Constant::i32(1)),
                Operand::Const(Constant::i32(2)),
            ),
        );
        func.push_instr(entry, Instruction::br(exit));
        func.push_instr(exit, Instruction::ret(Some(Operand::Instr(sum))));
        func
    }

    /// A diamond whose join block carries a phi over the two arms.
    fn phi_function() -> (Function, InstrId) {
        let mut func = Function::new("g", Linkage::Internal);
        let entry = func.add_block("entry");
        let left = func.add_block("left");
        let right = func.add_block("right");
        let join = func.add_block("join");

        let cond = func.push_instr(
            entry,
            Instruction::new(
                Opcode::Cmp {
                    pred: CmpPred::Eq,
                    lhs: Operand::Const(Constant::i32(0)),
                    rhs: Operand::Const(Constant::i32(0)),
                },
                Ty::I1,
            ),
        );
        func.push_instr(
            entry,
            Instruction::new(
                Opcode::CondBr {
                    cond: Operand::Instr(cond),
                    then_target: left,
                    else_target: right,
                },
                Ty::Void,
            ),
        );
        func.push_instr(left, Instruction::br(join));
        func.push_instr(right, Instruction::br(join));

        let phi = func.push_instr(
            join,
            Instruction::with_name(
                Opcode::Phi {
                    incoming: vec![
                        PhiIncoming::new(Operand::Const(Constant::i32(1)), left),
                        PhiIncoming::new(Operand::Const(Constant::i32(2)), right),
                    ],
                },
                Ty::I32,
                "merged",
            ),
        );
        func.push_instr(join, Instruction::ret(Some(Operand::Instr(phi))));
        (func, phi)
    }

    fn count_opcode(func: &Function, pred: impl Fn(&Opcode) -> bool) -> usize {
        func.block_ids()
            .flat_map(|b| func.block(b).instructions().to_vec())
            .filter(|&id| pred(func.instr(id).opcode()))
            .count()
    }

    #[test]
    fn test_escaping_value_gets_slot_store_and_load() {
        let mut func = escaping_function();
        let stats = normalize_stack_usage(&mut func);
        func.verify().expect("demoted function stays well-formed");

        assert_eq!(stats, DemotionStats { values: 1, phis: 0 });
        assert_eq!(count_opcode(&func, Opcode::is_alloca), 1);
        assert_eq!(
            count_opcode(&func, |op| matches!(op, Opcode::Store { .. })),
            1
        );
        assert_eq!(
            count_opcode(&func, |op| matches!(op, Opcode::Load { .. })),
            1
        );

        // The remote use now goes through the reload, not the register.
        let exit = BlockId::new(1);
        let ret = func.terminator(exit).unwrap();
        let Opcode::Ret { value: Some(Operand::Instr(loaded)) } = func.instr(ret).opcode() else {
            panic!("ret should return a loaded value");
        };
        assert!(matches!(func.instr(*loaded).opcode(), Opcode::Load { .. }));
        assert_eq!(func.block_of(*loaded), Some(exit));
    }

    #[test]
    fn test_phi_demotion_one_store_per_edge() {
        let (mut func, phi) = phi_function();
        let stats = normalize_stack_usage(&mut func);
        func.verify().expect("demoted function stays well-formed");

        assert_eq!(stats.phis, 1);
        assert_eq!(func.phi_count(), 0);
        assert_eq!(func.block_of(phi), None);

        // Two incoming edges -> exactly two stores, one per predecessor.
        let left = BlockId::new(1);
        let right = BlockId::new(2);
        for pred in [left, right] {
            let stores = func
                .block(pred)
                .instructions()
                .iter()
                .filter(|&&id| matches!(func.instr(id).opcode(), Opcode::Store { .. }))
                .count();
            assert_eq!(stores, 1);
        }

        // The phi's old use reads the slot through a load in the join block.
        let join = BlockId::new(3);
        let ret = func.terminator(join).unwrap();
        let Opcode::Ret { value: Some(Operand::Instr(loaded)) } = func.instr(ret).opcode() else {
            panic!("ret should return a loaded value");
        };
        assert!(matches!(func.instr(*loaded).opcode(), Opcode::Load { .. }));
    }

    #[test]
    fn test_slots_land_after_leading_allocas() {
        let mut func = escaping_function();
        let entry = BlockId::new(0);
        // Pre-existing leading alloca the new slot must not displace.
        func.insert_at(entry, 0, Instruction::alloca(Ty::I64, "local"));
        normalize_stack_usage(&mut func);

        let instrs = func.block(entry).instructions().to_vec();
        assert_eq!(func.instr(instrs[0]).name(), "local");
        assert_eq!(func.instr(instrs[1]).name(), "sum.reg2mem");
        assert!(func.instr(instrs[1]).opcode().is_alloca());
        // The marker the pass pins its insertions to is detached afterwards.
        assert!(!instrs
            .iter()
            .any(|&id| func.instr(id).name() == "demote_anchor"));
    }

    #[test]
    fn test_escape_free_function_left_unchanged() {
        let mut func = Function::new("local", Linkage::Internal);
        let entry = func.add_block("entry");
        let a = func.push_instr(
            entry,
            add(
                Operand::Const(Constant::i32(1)),
                Operand::Const(Constant::i32(2)),
            ),
        );
        func.push_instr(
            entry,
            add(Operand::Instr(a), Operand::Const(Constant::i32(3))),
        );
        func.push_instr(entry, Instruction::ret(None));

        let before = format!("{func}");
        normalize_stack_usage(&mut func);
        normalize_stack_usage(&mut func);
        // Nothing escapes and there are no phis, so both runs are no-ops.
        assert_eq!(format!("{func}"), before);
        assert_eq!(count_opcode(&func, Opcode::is_alloca), 0);
    }

    #[test]
    #[should_panic(expected = "must not have predecessors")]
    fn test_entry_with_predecessor_is_a_contract_violation() {
        let mut func = Function::new("bad", Linkage::Internal);
        let entry = func.add_block("entry");
        let looper = func.add_block("looper");
        func.push_instr(entry, Instruction::br(looper));
        // Branch back to the entry block violates the precondition.
        func.push_instr(looper, Instruction::br(entry));
        normalize_stack_usage(&mut func);
    }

    #[test]
    fn test_self_referential_phi_demotes_through_memory() {
        // A counter phi that feeds itself around the back edge:
        //   header: %i = phi [0, entry], [%i, latch]
        let mut func = Function::new("counter", Linkage::Internal);
        let entry = func.add_block("entry");
        let header = func.add_block("header");
        let latch = func.add_block("latch");
        let exit = func.add_block("exit");

        func.push_instr(entry, Instruction::br(header));
        let i = func.push_instr(
            header,
            Instruction::with_name(Opcode::Phi { incoming: vec![] }, Ty::I32, "i"),
        );
        if let Opcode::Phi { incoming } = func.instr_mut(i).opcode_mut() {
            incoming.push(PhiIncoming::new(Operand::Const(Constant::i32(0)), entry));
            incoming.push(PhiIncoming::new(Operand::Instr(i), latch));
        }
        let cond = func.push_instr(
            header,
            Instruction::new(
                Opcode::Cmp {
                    pred: CmpPred::Eq,
                    lhs: Operand::Instr(i),
                    rhs: Operand::Const(Constant::i32(0)),
                },
                Ty::I1,
            ),
        );
        func.push_instr(
            header,
            Instruction::new(
                Opcode::CondBr {
                    cond: Operand::Instr(cond),
                    then_target: latch,
                    else_target: exit,
                },
                Ty::Void,
            ),
        );
        func.push_instr(latch, Instruction::br(header));
        func.push_instr(exit, Instruction::ret(Some(Operand::Instr(i))));

        let stats = normalize_stack_usage(&mut func);
        func.verify().expect("well-formed after demotion");
        assert_eq!(stats.phis, 1);
        assert_eq!(func.phi_count(), 0);
        assert_eq!(func.block_of(i), None);

        // With the phi gone, no instruction may reference a register defined
        // in another block; every value crossing blocks goes through a slot.
        for block in func.block_ids() {
            for &id in func.block(block).instructions() {
                for operand in func.instr(id).opcode().operands() {
                    if let Operand::Instr(used) = operand {
                        assert_eq!(
                            func.block_of(*used),
                            Some(block),
                            "cross-block register reference survived demotion"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_escaping_phi_input_reloads_on_the_edge() {
        // entry defines %sum; a later block's phi consumes it on an edge.
        let mut func = Function::new("h", Linkage::Internal);
        let entry = func.add_block("entry");
        let mid = func.add_block("mid");
        let join = func.add_block("join");

        let sum = func.push_instr(
            entry,
            add(
                Operand::Const(Constant::i32(1)),
                Operand::Const(Constant::i32(2)),
            ),
        );
        func.push_instr(entry, Instruction::br(mid));
        func.push_instr(mid, Instruction::br(join));
        let phi = func.push_instr(
            join,
            Instruction::new(
                Opcode::Phi {
                    incoming: vec![PhiIncoming::new(Operand::Instr(sum), mid)],
                },
                Ty::I32,
            ),
        );
        func.push_instr(join, Instruction::ret(Some(Operand::Instr(phi))));

        normalize_stack_usage(&mut func);
        func.verify().expect("well-formed after demotion");
        assert_eq!(func.phi_count(), 0);

        // The reload of %sum must sit in `mid` (the edge's predecessor),
        // before its terminator, feeding the store for the phi slot.
        let mid_instrs = func.block(BlockId::new(1)).instructions().to_vec();
        assert!(mid_instrs.iter().any(|&id| matches!(
            func.instr(id).opcode(),
            Opcode::Load { .. }
        )));
    }
}
