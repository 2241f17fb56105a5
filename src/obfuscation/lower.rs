//! Constant-expression lowering: give every deferred computation a position.
//!
//! A constant expression is a computation over constants embedded directly in
//! an operand slot; it has no position in any block, so control-flow rewrites
//! cannot relocate or split it. Lowering materializes each one as a
//! freestanding instruction at a dominance-correct position and rewires the
//! consumer to the new result.
//!
//! Two strategies produce the same final invariant:
//!
//! - [`lower_block_constant_expressions`] walks one block and recurses into
//!   nested expressions directly; [`lower_function_constant_expressions`]
//!   drives it over every block of a function.
//! - [`lower_constant_expressions`] drives a worklist over the whole function,
//!   materializing one nesting level per step and re-enqueueing the new
//!   instruction. Termination follows from [`ConstExpr::depth`]: every
//!   materialization strictly reduces the nesting that remains.
//!
//! # Exclusions
//!
//! Landing pads and funclet pads have hard positional requirements that
//! forbid inserting instructions in front of them, and the exception-type
//! identifier intrinsic requires its operand to stay in literal constant
//! form. Their operands are left untouched.

use std::collections::VecDeque;

use crate::ir::{BlockId, ConstExpr, Function, InstrId, Instruction, Opcode, Operand};

/// Lowers every constant-expression operand in the function via a worklist.
///
/// Phi incoming values are materialized just before the matching
/// predecessor's terminator; all other operands immediately before their
/// consumer. Exception-handling instructions and calls to the
/// exception-type identifier intrinsic are skipped. Returns the number of
/// instructions materialized; running again on the result returns zero.
pub fn lower_constant_expressions(func: &mut Function) -> usize {
    let mut pending: VecDeque<InstrId> = VecDeque::new();
    for block in func.block_ids() {
        for &id in func.block(block).instructions() {
            let instr = func.instr(id);
            if instr.opcode().is_exception_handling() || instr.opcode().is_eh_typeid_for() {
                continue;
            }
            if instr.has_const_expr_operand() {
                pending.push_back(id);
            }
        }
    }

    let mut lowered = 0;
    while let Some(id) = pending.pop_front() {
        if func.instr(id).is_phi() {
            lowered += lower_phi_edges(func, id, &mut pending);
        } else {
            lowered += lower_operands(func, id, &mut pending);
        }
    }
    lowered
}

/// Materializes each constant-expression incoming value of a phi on its edge
/// and re-enqueues the new instructions.
fn lower_phi_edges(func: &mut Function, phi: InstrId, pending: &mut VecDeque<InstrId>) -> usize {
    let exprs = expr_operands(func, phi);
    let mut lowered = 0;
    for (index, expr) in exprs {
        let Opcode::Phi { incoming } = func.instr(phi).opcode() else {
            unreachable!("caller checked is_phi");
        };
        let pred = incoming[index].block();
        let term = func
            .terminator(pred)
            .expect("phi predecessor must be terminated");
        let new = func.insert_before(term, Instruction::new(expr.to_opcode(), expr.result_ty()));
        if let Opcode::Phi { incoming } = func.instr_mut(phi).opcode_mut() {
            incoming[index].set_value(Operand::Instr(new));
        }
        pending.push_back(new);
        lowered += 1;
    }
    lowered
}

/// Materializes each constant-expression operand of a non-phi instruction
/// immediately before it and re-enqueues the new instructions.
fn lower_operands(func: &mut Function, id: InstrId, pending: &mut VecDeque<InstrId>) -> usize {
    let exprs = expr_operands(func, id);
    let mut lowered = 0;
    for (index, expr) in exprs {
        let new = func.insert_before(id, Instruction::new(expr.to_opcode(), expr.result_ty()));
        *func.instr_mut(id).opcode_mut().operands_mut()[index] = Operand::Instr(new);
        pending.push_back(new);
        lowered += 1;
    }
    lowered
}

/// Lowers every constant-expression operand in the function by running
/// [`lower_block_constant_expressions`] over each block in order.
///
/// Returns the number of instructions materialized.
///
/// # Panics
///
/// Panics if any block is empty, as the per-block strategy does.
pub fn lower_function_constant_expressions(func: &mut Function) -> usize {
    let blocks: Vec<BlockId> = func.block_ids().collect();
    blocks
        .into_iter()
        .map(|block| lower_block_constant_expressions(func, block))
        .sum()
}

/// Lowers every constant-expression operand within one block, recursing into
/// nested expressions.
///
/// Pads are skipped. A phi consumer gets its replacement at the entry block's
/// first valid insertion point: the phi's logical use happens on an incoming
/// edge, and only the entry block dominates every predecessor. Everything
/// else gets its replacement immediately before the consumer. Returns the
/// number of instructions materialized.
///
/// # Panics
///
/// Panics if the block is empty; an empty block means the IR was corrupted
/// by an earlier pass.
pub fn lower_block_constant_expressions(func: &mut Function, block: BlockId) -> usize {
    assert!(
        !func.block(block).is_empty(),
        "cannot lower constant expressions in an empty block"
    );

    let snapshot = func.block(block).instructions().to_vec();
    let mut lowered = 0;
    for id in snapshot {
        if func.instr(id).opcode().is_pad() {
            continue;
        }
        let is_phi = func.instr(id).is_phi();
        for (index, expr) in expr_operands(func, id) {
            let new = if is_phi {
                let entry = func.entry();
                let mut at = func.first_insertion_index(entry);
                materialize_at(func, entry, &mut at, &expr, &mut lowered)
            } else {
                materialize_before(func, id, &expr, &mut lowered)
            };
            *func.instr_mut(id).opcode_mut().operands_mut()[index] = Operand::Instr(new);
        }
    }
    lowered
}

/// Snapshots the constant-expression operands of an instruction as
/// `(operand index, expression)` pairs.
fn expr_operands(func: &Function, id: InstrId) -> Vec<(usize, ConstExpr)> {
    func.instr(id)
        .opcode()
        .operands()
        .iter()
        .enumerate()
        .filter_map(|(index, op)| op.as_expr().map(|expr| (index, expr.clone())))
        .collect()
}

/// Recursively materializes an expression immediately before `consumer`,
/// children first so every operand of the result is already positioned.
fn materialize_before(
    func: &mut Function,
    consumer: InstrId,
    expr: &ConstExpr,
    lowered: &mut usize,
) -> InstrId {
    let mut opcode = expr.to_opcode();
    let children = nested_exprs(&opcode);
    for (index, child) in children {
        let new = materialize_before(func, consumer, &child, lowered);
        *opcode.operands_mut()[index] = Operand::Instr(new);
    }
    *lowered += 1;
    func.insert_before(consumer, Instruction::new(opcode, expr.result_ty()))
}

/// Recursively materializes an expression at a block position, advancing the
/// position so siblings and the parent land after their dependencies.
fn materialize_at(
    func: &mut Function,
    block: BlockId,
    at: &mut usize,
    expr: &ConstExpr,
    lowered: &mut usize,
) -> InstrId {
    let mut opcode = expr.to_opcode();
    let children = nested_exprs(&opcode);
    for (index, child) in children {
        let new = materialize_at(func, block, at, &child, lowered);
        *opcode.operands_mut()[index] = Operand::Instr(new);
    }
    let id = func.insert_at(block, *at, Instruction::new(opcode, expr.result_ty()));
    *at += 1;
    *lowered += 1;
    id
}

fn nested_exprs(opcode: &Opcode) -> Vec<(usize, ConstExpr)> {
    opcode
        .operands()
        .iter()
        .enumerate()
        .filter_map(|(index, op)| op.as_expr().map(|expr| (index, expr.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        BinOpKind, Callee, CallEffects, CastKind, ConstOperand, Constant, GlobalId, Intrinsic,
        Linkage, PhiIncoming, Ty,
    };

    fn gep_expr() -> ConstExpr {
        ConstExpr::GetElementPtr {
            base: ConstOperand::Global(GlobalId::new(0)),
            indices: vec![Constant::i32(0).into(), Constant::i32(4).into()],
        }
    }

    fn nested_expr() -> ConstExpr {
        // add (ptrtoint @g0 to i64), 8
        ConstExpr::BinOp {
            op: BinOpKind::Add,
            lhs: ConstExpr::Cast {
                kind: CastKind::PtrToInt,
                value: ConstOperand::Global(GlobalId::new(0)),
                to: Ty::I64,
            }
            .into(),
            rhs: Constant::i64(8).into(),
        }
    }

    /// entry: %x = add 1, 2 ; %y = add %x, gep-expr ; ret %y
    fn gep_consumer_function() -> (Function, InstrId) {
        let mut func = Function::new("f", Linkage::Internal);
        let entry = func.add_block("entry");
        let x = func.push_instr(
            entry,
            Instruction::with_name(
                Opcode::BinOp {
                    op: BinOpKind::Add,
                    lhs: Operand::Const(Constant::i32(1)),
                    rhs: Operand::Const(Constant::i32(2)),
                },
                Ty::I32,
                "x",
            ),
        );
        let y = func.push_instr(
            entry,
            Instruction::with_name(
                Opcode::BinOp {
                    op: BinOpKind::Add,
                    lhs: Operand::Instr(x),
                    rhs: Operand::Expr(gep_expr()),
                },
                Ty::I32,
                "y",
            ),
        );
        func.push_instr(entry, Instruction::ret(Some(Operand::Instr(y))));
        (func, y)
    }

    #[test]
    fn test_materialized_gep_sits_immediately_before_consumer() {
        let (mut func, y) = gep_consumer_function();
        let lowered = lower_block_constant_expressions(&mut func, BlockId::new(0));
        assert_eq!(lowered, 1);
        assert_eq!(func.const_expr_operand_count(), 0);

        let Opcode::BinOp { rhs: Operand::Instr(gep), .. } = func.instr(y).opcode() else {
            panic!("operand should be rewired to an instruction");
        };
        assert!(matches!(
            func.instr(*gep).opcode(),
            Opcode::GetElementPtr { .. }
        ));
        let (_, gep_pos) = func.position(*gep).unwrap();
        let (_, y_pos) = func.position(y).unwrap();
        assert_eq!(gep_pos + 1, y_pos);
    }

    #[test]
    fn test_worklist_resolves_nesting_one_level_per_step() {
        let mut func = Function::new("f", Linkage::Internal);
        let entry = func.add_block("entry");
        let user = func.push_instr(
            entry,
            Instruction::new(
                Opcode::BinOp {
                    op: BinOpKind::Add,
                    lhs: Operand::Expr(nested_expr()),
                    rhs: Operand::Const(Constant::i64(1)),
                },
                Ty::I64,
            ),
        );
        func.push_instr(entry, Instruction::ret(Some(Operand::Instr(user))));

        // Depth-2 expression: two materialized instructions.
        assert_eq!(lower_constant_expressions(&mut func), 2);
        assert_eq!(func.const_expr_operand_count(), 0);
        func.verify().expect("well-formed after lowering");

        // user <- add(cast-result, 8) <- ptrtoint @g0
        let Opcode::BinOp { lhs: Operand::Instr(add), .. } = func.instr(user).opcode() else {
            panic!("user operand should be an instruction");
        };
        let Opcode::BinOp { lhs: Operand::Instr(cast), .. } = func.instr(*add).opcode() else {
            panic!("materialized add should feed off the cast");
        };
        assert!(matches!(func.instr(*cast).opcode(), Opcode::Cast { .. }));
    }

    #[test]
    fn test_per_block_recursion_resolves_nesting() {
        let mut func = Function::new("f", Linkage::Internal);
        let entry = func.add_block("entry");
        let user = func.push_instr(
            entry,
            Instruction::new(
                Opcode::BinOp {
                    op: BinOpKind::Add,
                    lhs: Operand::Expr(nested_expr()),
                    rhs: Operand::Const(Constant::i64(1)),
                },
                Ty::I64,
            ),
        );
        func.push_instr(entry, Instruction::ret(Some(Operand::Instr(user))));

        assert_eq!(lower_block_constant_expressions(&mut func, entry), 2);
        assert_eq!(func.const_expr_operand_count(), 0);
        func.verify().expect("well-formed after lowering");
    }

    #[test]
    fn test_function_driver_covers_every_block() {
        let mut func = Function::new("f", Linkage::Internal);
        let entry = func.add_block("entry");
        let exit = func.add_block("exit");
        let a = func.push_instr(
            entry,
            Instruction::new(
                Opcode::BinOp {
                    op: BinOpKind::Add,
                    lhs: Operand::Expr(nested_expr()),
                    rhs: Operand::Const(Constant::i64(1)),
                },
                Ty::I64,
            ),
        );
        func.push_instr(entry, Instruction::br(exit));
        let b = func.push_instr(
            exit,
            Instruction::new(
                Opcode::Cast {
                    kind: CastKind::IntToPtr,
                    value: Operand::Expr(gep_expr()),
                },
                Ty::Ptr,
            ),
        );
        func.push_instr(exit, Instruction::ret(Some(Operand::Instr(b))));

        // Depth-2 expression in entry plus a gep in exit.
        assert_eq!(lower_function_constant_expressions(&mut func), 3);
        assert_eq!(func.const_expr_operand_count(), 0);
        func.verify().expect("well-formed after lowering");
        assert!(matches!(
            func.instr(a).opcode(),
            Opcode::BinOp { lhs: Operand::Instr(_), .. }
        ));
    }

    #[test]
    fn test_phi_incoming_expr_lowered_on_its_edge() {
        let mut func = Function::new("f", Linkage::Internal);
        let entry = func.add_block("entry");
        let body = func.add_block("body");
        func.push_instr(entry, Instruction::br(body));
        let phi = func.push_instr(
            body,
            Instruction::new(
                Opcode::Phi {
                    incoming: vec![PhiIncoming::new(Operand::Expr(gep_expr()), entry)],
                },
                Ty::Ptr,
            ),
        );
        func.push_instr(body, Instruction::ret(Some(Operand::Instr(phi))));

        assert_eq!(lower_constant_expressions(&mut func), 1);
        func.verify().expect("well-formed after lowering");

        // The gep lands in `entry`, before its terminator.
        let Opcode::Phi { incoming } = func.instr(phi).opcode() else {
            panic!("phi survives lowering");
        };
        let Operand::Instr(gep) = incoming[0].value() else {
            panic!("incoming value should be rewired");
        };
        assert_eq!(func.block_of(*gep), Some(entry));
        let (_, gep_pos) = func.position(*gep).unwrap();
        let (_, term_pos) = func.position(func.terminator(entry).unwrap()).unwrap();
        assert_eq!(gep_pos + 1, term_pos);
    }

    #[test]
    fn test_per_block_phi_consumer_materializes_in_entry() {
        let mut func = Function::new("f", Linkage::Internal);
        let entry = func.add_block("entry");
        let body = func.add_block("body");
        func.push_instr(entry, Instruction::br(body));
        let phi = func.push_instr(
            body,
            Instruction::new(
                Opcode::Phi {
                    incoming: vec![PhiIncoming::new(Operand::Expr(gep_expr()), entry)],
                },
                Ty::Ptr,
            ),
        );
        func.push_instr(body, Instruction::ret(Some(Operand::Instr(phi))));

        assert_eq!(lower_block_constant_expressions(&mut func, body), 1);
        // This strategy places the replacement in the entry block, which
        // dominates every predecessor of the phi.
        let Opcode::Phi { incoming } = func.instr(phi).opcode() else {
            panic!("phi survives lowering");
        };
        let Operand::Instr(gep) = incoming[0].value() else {
            panic!("incoming value should be rewired");
        };
        assert_eq!(func.block_of(*gep), Some(entry));
    }

    #[test]
    fn test_eh_typeid_for_keeps_literal_operand() {
        let mut func = Function::new("f", Linkage::Internal);
        let entry = func.add_block("entry");
        let call = func.push_instr(
            entry,
            Instruction::new(
                Opcode::Call {
                    callee: Callee::Intrinsic(Intrinsic::EhTypeidFor),
                    args: vec![Operand::Expr(gep_expr())],
                    effects: CallEffects::empty(),
                },
                Ty::I32,
            ),
        );
        func.push_instr(entry, Instruction::ret(Some(Operand::Instr(call))));

        assert_eq!(lower_constant_expressions(&mut func), 0);
        assert_eq!(func.const_expr_operand_count(), 1);
    }

    #[test]
    fn test_per_block_skips_pads() {
        let mut func = Function::new("f", Linkage::Internal);
        let entry = func.add_block("entry");
        func.push_instr(
            entry,
            Instruction::new(
                Opcode::LandingPad {
                    cleanup: false,
                    clauses: vec![Operand::Expr(gep_expr())],
                },
                Ty::Ptr,
            ),
        );
        func.push_instr(entry, Instruction::ret(None));

        assert_eq!(lower_block_constant_expressions(&mut func, entry), 0);
        assert_eq!(func.const_expr_operand_count(), 1);
    }

    #[test]
    fn test_lowering_is_idempotent() {
        let (mut func, _) = gep_consumer_function();
        assert_eq!(lower_constant_expressions(&mut func), 1);
        assert_eq!(lower_constant_expressions(&mut func), 0);
        assert_eq!(func.const_expr_operand_count(), 0);
    }

    #[test]
    #[should_panic(expected = "empty block")]
    fn test_empty_block_is_a_contract_violation() {
        let mut func = Function::new("bad", Linkage::Internal);
        let entry = func.add_block("entry");
        lower_block_constant_expressions(&mut func, entry);
    }
}
