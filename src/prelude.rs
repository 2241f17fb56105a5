//! Convenient re-exports of the most commonly used types.
//!
//! Pulls the embedder-facing surface into one import: the IR building
//! blocks, the analyses, the passes and the pipeline driver.
//!
//! # Example
//!
//! ```rust,ignore
//! use shroud::prelude::*;
//!
//! let mut module = Module::new("demo");
//! let config = ObfuscationConfig::for_feature("fla").with_enabled(true);
//! let stats = Pipeline::new(config).run(&mut module)?;
//! ```

pub use crate::analysis::value_escapes;
pub use crate::ir::{
    read_annotation, AnnotationEntry, AnnotationTable, BasicBlock, BinOpKind, BlockId, CallEffects,
    Callee, CastKind, CmpPred, ConstExpr, ConstOperand, Constant, FuncId, Function, GlobalId,
    GlobalVariable, InstrId, Instruction, Intrinsic, Linkage, Module, Opcode, Operand, PhiIncoming,
    Ty,
};
pub use crate::obfuscation::{
    lower_block_constant_expressions, lower_constant_expressions,
    lower_function_constant_expressions, normalize_stack_usage, should_obfuscate, DemotionStats,
    Event, EventLog, ObfuscationConfig, Pipeline, PipelineStats,
};
pub use crate::{Error, Result};
