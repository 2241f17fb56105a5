//! Escape analysis: which values cannot stay block-local.
//!
//! Control-flow obfuscation rewrites the block graph underneath the values
//! that flow through it - blocks are split, merged, duplicated and
//! re-targeted. A value that is only consumed inside its defining block by
//! memory-free instructions survives all of that untouched. Everything else
//! must be demoted to an explicit stack slot first:
//!
//! - **Cross-block liveness**: a consumer in another block relies on
//!   dominance that the rewrite may destroy.
//! - **Memory traffic**: a consumer that reads or writes memory may alias
//!   the slots later transforms introduce, so the value is conservatively
//!   treated as escaping even when the consumer shares the block.
//!
//! There is no third case for a consumer that is not an instruction: in
//! this IR constant expressions are closed over constants and can never
//! consume an instruction result, so every consumer of a value is itself a
//! positioned instruction.

use crate::ir::{Function, InstrId};

/// Returns `true` if the instruction's result is used outside its defining
/// block or by a memory-affecting instruction.
///
/// Detached instructions and instructions without users never escape. Pure;
/// no mutation.
///
/// # Examples
///
/// ```rust,ignore
/// use shroud::analysis::value_escapes;
///
/// for id in block_instructions {
///     if value_escapes(&func, id) {
///         // must be backed by a stack slot before rewriting blocks
///     }
/// }
/// ```
#[must_use]
pub fn value_escapes(func: &Function, id: InstrId) -> bool {
    let Some(def_block) = func.block_of(id) else {
        return false;
    };
    for user in func.users_of(id) {
        if func.block_of(user) != Some(def_block) {
            return true;
        }
        let opcode = func.instr(user).opcode();
        if opcode.may_read_memory() || opcode.may_write_memory() {
            return true;
        }
    }
    false
}
