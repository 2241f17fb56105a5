//! The in-memory IR this core analyzes and rewrites.
//!
//! This module provides an arena-owned intermediate representation tailored
//! to the needs of the normalization passes: functions own a flat instruction
//! arena, blocks hold ordered handle lists, and every cross-reference is an
//! opaque index. Inserting an instruction never invalidates a handle someone
//! else is holding, which is what lets the worklist passes rewrite the graph
//! while traversing a snapshot of it.
//!
//! # Architecture
//!
//! The module is organized into focused sub-modules:
//!
//! - [`types`] - The closed [`Ty`] type universe
//! - [`constant`] - Literal constants and deferred [`ConstExpr`] computations
//! - [`instruction`] - The [`Opcode`] enumeration with capability queries
//! - [`block`] - Basic blocks as ordered handle lists
//! - [`function`] - The instruction arena and graph queries
//! - [`module`] - The compilation unit: functions, globals, annotations
//! - [`annotations`] - The annotation side-table and its two-encoding reader
//!
//! # Usage
//!
//! ```rust,ignore
//! use shroud::ir::{Function, Instruction, Linkage, Module, Opcode, Operand, Ty};
//!
//! let mut func = Function::new("demo", Linkage::Internal);
//! let entry = func.add_block("entry");
//! func.push_instr(entry, Instruction::ret(None));
//!
//! let mut module = Module::new("demo");
//! let id = module.add_function(func);
//! module.verify()?;
//! ```

pub mod annotations;
pub mod block;
pub mod constant;
pub mod function;
pub mod instruction;
pub mod module;
pub mod types;

// Re-export primary types at module level
pub use annotations::{
    read_annotation, AnnotationEntry, AnnotationTable, DirectNoteDecoder, GepNoteDecoder,
    NoteDecoder, GLOBAL_ANNOTATIONS,
};
pub use block::{BasicBlock, BlockId};
pub use constant::{ConstExpr, ConstOperand, Constant};
pub use function::{Function, Linkage};
pub use instruction::{
    BinOpKind, CallEffects, Callee, CastKind, CmpPred, InstrId, Instruction, Intrinsic, Opcode,
    Operand, PhiIncoming,
};
pub use module::{FuncId, GlobalId, GlobalVariable, Initializer, Module};
pub use types::Ty;
