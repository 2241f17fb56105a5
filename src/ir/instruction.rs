//! Instructions, operands and the closed opcode enumeration.
//!
//! Every instruction is owned by a [`crate::ir::Function`] arena and referenced
//! everywhere else by an opaque [`InstrId`] handle. Passes therefore mutate the
//! graph through handles and never hold borrows across insertions - the
//! worklist style the demotion and lowering passes depend on.
//!
//! # Dispatch
//!
//! Instead of chained downcasts over an open class hierarchy, the instruction
//! kind is a single tagged enum ([`Opcode`]) with capability queries:
//! [`Opcode::is_phi`], [`Opcode::is_pad`], [`Opcode::is_exception_handling`],
//! [`Opcode::is_terminator`], [`Opcode::may_read_memory`],
//! [`Opcode::may_write_memory`]. Passes ask what an instruction *can do*, not
//! what concrete type it is.
//!
//! # Thread Safety
//!
//! All types in this module are `Send` and `Sync`.

use std::fmt;

use bitflags::bitflags;

use crate::ir::block::BlockId;
use crate::ir::constant::{ConstExpr, ConstOperand, Constant};
use crate::ir::module::{FuncId, GlobalId};
use crate::ir::types::Ty;

/// An opaque handle to an instruction inside its function's arena.
///
/// Handles stay valid across insertions and removals; a removed instruction's
/// slot is simply detached from its block and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(usize);

impl InstrId {
    /// Creates an instruction handle from a raw arena index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the raw arena index.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Binary arithmetic and bitwise operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOpKind {
    /// Integer addition
    Add,
    /// Integer subtraction
    Sub,
    /// Integer multiplication
    Mul,
    /// Unsigned division
    UDiv,
    /// Signed division
    SDiv,
    /// Bitwise and
    And,
    /// Bitwise or
    Or,
    /// Bitwise xor
    Xor,
    /// Shift left
    Shl,
    /// Logical shift right
    LShr,
    /// Arithmetic shift right
    AShr,
}

impl fmt::Display for BinOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinOpKind::Add => "add",
            BinOpKind::Sub => "sub",
            BinOpKind::Mul => "mul",
            BinOpKind::UDiv => "udiv",
            BinOpKind::SDiv => "sdiv",
            BinOpKind::And => "and",
            BinOpKind::Or => "or",
            BinOpKind::Xor => "xor",
            BinOpKind::Shl => "shl",
            BinOpKind::LShr => "lshr",
            BinOpKind::AShr => "ashr",
        };
        write!(f, "{name}")
    }
}

/// Value and pointer cast operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastKind {
    /// Reinterpret the bits without change
    BitCast,
    /// Truncate an integer
    Trunc,
    /// Zero-extend an integer
    ZExt,
    /// Sign-extend an integer
    SExt,
    /// Convert a pointer to an integer
    PtrToInt,
    /// Convert an integer to a pointer
    IntToPtr,
}

impl fmt::Display for CastKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CastKind::BitCast => "bitcast",
            CastKind::Trunc => "trunc",
            CastKind::ZExt => "zext",
            CastKind::SExt => "sext",
            CastKind::PtrToInt => "ptrtoint",
            CastKind::IntToPtr => "inttoptr",
        };
        write!(f, "{name}")
    }
}

/// Integer comparison predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpPred {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Signed less than
    Slt,
    /// Signed less or equal
    Sle,
    /// Signed greater than
    Sgt,
    /// Signed greater or equal
    Sge,
    /// Unsigned less than
    Ult,
    /// Unsigned greater than
    Ugt,
}

impl fmt::Display for CmpPred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CmpPred::Eq => "eq",
            CmpPred::Ne => "ne",
            CmpPred::Slt => "slt",
            CmpPred::Sle => "sle",
            CmpPred::Sgt => "sgt",
            CmpPred::Sge => "sge",
            CmpPred::Ult => "ult",
            CmpPred::Ugt => "ugt",
        };
        write!(f, "{name}")
    }
}

bitflags! {
    /// Memory behavior of a call.
    ///
    /// Unknown callees default to [`CallEffects::all`] - the conservative
    /// stance the escape analysis requires.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CallEffects: u8 {
        /// The callee may read from memory visible to the caller.
        const READS_MEMORY = 0b01;
        /// The callee may write to memory visible to the caller.
        const WRITES_MEMORY = 0b10;
    }
}

impl Default for CallEffects {
    fn default() -> Self {
        CallEffects::all()
    }
}

/// Compiler intrinsics this core must recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    /// The exception-type identifier lookup used by landing pads.
    ///
    /// Its operand must stay in literal constant-expression form; the
    /// lowering pass skips calls to it.
    EhTypeidFor,
}

impl fmt::Display for Intrinsic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intrinsic::EhTypeidFor => write!(f, "eh.typeid.for"),
        }
    }
}

/// The target of a call instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    /// A function in the same module.
    Function(FuncId),
    /// A recognized intrinsic.
    Intrinsic(Intrinsic),
}

/// A value operand of an instruction.
///
/// Branch targets are not operands; terminators carry their [`BlockId`]s
/// directly. The lowering pass guarantees that after it runs, no operand is
/// an [`Operand::Expr`] outside the excluded exception-handling instructions.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// The result of another instruction.
    Instr(InstrId),
    /// A literal constant.
    Const(Constant),
    /// The address of a global variable.
    Global(GlobalId),
    /// The address of a function.
    Function(FuncId),
    /// An embedded constant expression (eliminated by lowering).
    Expr(ConstExpr),
}

impl Operand {
    /// Converts a constant-expression leaf into an instruction operand.
    ///
    /// Used during materialization: literals, globals and functions map
    /// directly, nested expressions stay embedded.
    #[must_use]
    pub fn from_const_operand(op: &ConstOperand) -> Operand {
        match op {
            ConstOperand::Literal(c) => Operand::Const(c.clone()),
            ConstOperand::Global(id) => Operand::Global(*id),
            ConstOperand::Function(id) => Operand::Function(*id),
            ConstOperand::Expr(e) => Operand::Expr(e.as_ref().clone()),
        }
    }

    /// Returns the embedded constant expression, if this operand is one.
    #[must_use]
    pub fn as_expr(&self) -> Option<&ConstExpr> {
        match self {
            Operand::Expr(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the instruction this operand references, if any.
    #[must_use]
    pub fn as_instr(&self) -> Option<InstrId> {
        match self {
            Operand::Instr(id) => Some(*id),
            _ => None,
        }
    }
}

/// One incoming edge of a phi node: a value paired with the predecessor block
/// it flows in from.
#[derive(Debug, Clone, PartialEq)]
pub struct PhiIncoming {
    value: Operand,
    block: BlockId,
}

impl PhiIncoming {
    /// Creates an incoming edge.
    #[must_use]
    pub const fn new(value: Operand, block: BlockId) -> Self {
        Self { value, block }
    }

    /// Returns the incoming value.
    #[must_use]
    pub const fn value(&self) -> &Operand {
        &self.value
    }

    /// Returns the predecessor block the value arrives from.
    #[must_use]
    pub const fn block(&self) -> BlockId {
        self.block
    }

    /// Replaces the incoming value.
    pub fn set_value(&mut self, value: Operand) {
        self.value = value;
    }
}

/// The closed enumeration of instruction kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Opcode {
    /// Reserve a stack slot holding a value of the given type.
    Alloca {
        /// The type of value the slot stores
        allocated: Ty,
    },
    /// Read a value through a pointer.
    Load {
        /// The address to read from
        addr: Operand,
    },
    /// Write a value through a pointer.
    Store {
        /// The value being stored
        value: Operand,
        /// The address to write to
        addr: Operand,
    },
    /// A binary arithmetic or bitwise operation.
    BinOp {
        /// The operation
        op: BinOpKind,
        /// Left hand side
        lhs: Operand,
        /// Right hand side
        rhs: Operand,
    },
    /// A value or pointer cast; the result type is the instruction's type.
    Cast {
        /// The cast operation
        kind: CastKind,
        /// The value being cast
        value: Operand,
    },
    /// An address computation.
    GetElementPtr {
        /// The base address
        base: Operand,
        /// The index path applied to the base
        indices: Vec<Operand>,
    },
    /// An integer comparison producing an `i1`.
    Cmp {
        /// The predicate
        pred: CmpPred,
        /// Left hand side
        lhs: Operand,
        /// Right hand side
        rhs: Operand,
    },
    /// A call to a function or intrinsic.
    Call {
        /// The call target
        callee: Callee,
        /// Argument values
        args: Vec<Operand>,
        /// Conservative memory behavior of the callee
        effects: CallEffects,
    },
    /// A phi node selecting a value by incoming edge.
    ///
    /// Must appear in the leading prefix of its block.
    Phi {
        /// One entry per predecessor edge
        incoming: Vec<PhiIncoming>,
    },
    /// The pad receiving an in-flight exception (must lead its block).
    LandingPad {
        /// Whether the pad runs cleanup code
        cleanup: bool,
        /// Catch/filter clauses; may legitimately hold constant expressions
        clauses: Vec<Operand>,
    },
    /// A funclet pad for a catch handler (must lead its block).
    CatchPad {
        /// Pad arguments; may legitimately hold constant expressions
        args: Vec<Operand>,
    },
    /// The dispatch terminator selecting a catch handler.
    CatchSwitch {
        /// Candidate handler blocks
        handlers: Vec<BlockId>,
        /// Where to continue unwinding when no handler matches
        unwind: Option<BlockId>,
    },
    /// Return from a catch funclet to normal control flow.
    CatchRet {
        /// The block to resume at
        target: BlockId,
    },
    /// Unconditional branch.
    Br {
        /// The destination block
        target: BlockId,
    },
    /// Conditional branch.
    CondBr {
        /// The branch condition (an `i1`)
        cond: Operand,
        /// Destination when the condition holds
        then_target: BlockId,
        /// Destination otherwise
        else_target: BlockId,
    },
    /// Multi-way branch over an integer value.
    Switch {
        /// The scrutinee
        value: Operand,
        /// Destination when no case matches
        default: BlockId,
        /// `(case value, destination)` pairs
        cases: Vec<(Constant, BlockId)>,
    },
    /// Return from the function.
    Ret {
        /// The returned value, absent for `void` functions
        value: Option<Operand>,
    },
    /// Marks an unreachable program point.
    Unreachable,
}

impl Opcode {
    /// Returns `true` for phi nodes.
    #[must_use]
    pub const fn is_phi(&self) -> bool {
        matches!(self, Opcode::Phi { .. })
    }

    /// Returns `true` for stack slot allocations.
    #[must_use]
    pub const fn is_alloca(&self) -> bool {
        matches!(self, Opcode::Alloca { .. })
    }

    /// Returns `true` for the positional pads that must lead their block.
    ///
    /// Operands of these instructions cannot be rewritten by inserting new
    /// instructions before them, so the per-block lowering skips them.
    #[must_use]
    pub const fn is_pad(&self) -> bool {
        matches!(self, Opcode::LandingPad { .. } | Opcode::CatchPad { .. })
    }

    /// Returns `true` for every exception-handling instruction, pads and
    /// the catch dispatch/return included.
    #[must_use]
    pub const fn is_exception_handling(&self) -> bool {
        matches!(
            self,
            Opcode::LandingPad { .. }
                | Opcode::CatchPad { .. }
                | Opcode::CatchSwitch { .. }
                | Opcode::CatchRet { .. }
        )
    }

    /// Returns `true` for calls to the exception-type identifier intrinsic,
    /// whose operand must keep its literal constant form.
    #[must_use]
    pub fn is_eh_typeid_for(&self) -> bool {
        matches!(
            self,
            Opcode::Call {
                callee: Callee::Intrinsic(Intrinsic::EhTypeidFor),
                ..
            }
        )
    }

    /// Returns `true` for control-transfer instructions.
    #[must_use]
    pub const fn is_terminator(&self) -> bool {
        matches!(
            self,
            Opcode::Br { .. }
                | Opcode::CondBr { .. }
                | Opcode::Switch { .. }
                | Opcode::Ret { .. }
                | Opcode::Unreachable
                | Opcode::CatchSwitch { .. }
                | Opcode::CatchRet { .. }
        )
    }

    /// Returns `true` if executing this instruction may read from memory.
    #[must_use]
    pub fn may_read_memory(&self) -> bool {
        match self {
            Opcode::Load { .. } => true,
            Opcode::Call { effects, .. } => effects.contains(CallEffects::READS_MEMORY),
            _ => false,
        }
    }

    /// Returns `true` if executing this instruction may write to memory.
    #[must_use]
    pub fn may_write_memory(&self) -> bool {
        match self {
            Opcode::Store { .. } => true,
            Opcode::Call { effects, .. } => effects.contains(CallEffects::WRITES_MEMORY),
            _ => false,
        }
    }

    /// Returns every value operand in a stable traversal order.
    ///
    /// Phi incoming values are included; block targets are not. The order
    /// matches [`Opcode::operands_mut`] exactly, so an index obtained from one
    /// can be used with the other.
    #[must_use]
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Opcode::Alloca { .. }
            | Opcode::Unreachable
            | Opcode::Br { .. }
            | Opcode::CatchSwitch { .. }
            | Opcode::CatchRet { .. } => Vec::new(),
            Opcode::Load { addr } => vec![addr],
            Opcode::Store { value, addr } => vec![value, addr],
            Opcode::BinOp { lhs, rhs, .. } | Opcode::Cmp { lhs, rhs, .. } => vec![lhs, rhs],
            Opcode::Cast { value, .. } | Opcode::Switch { value, .. } => vec![value],
            Opcode::GetElementPtr { base, indices } => {
                let mut ops = vec![base];
                ops.extend(indices.iter());
                ops
            }
            Opcode::Call { args, .. } => args.iter().collect(),
            Opcode::Phi { incoming } => incoming.iter().map(PhiIncoming::value).collect(),
            Opcode::LandingPad { clauses, .. } => clauses.iter().collect(),
            Opcode::CatchPad { args } => args.iter().collect(),
            Opcode::CondBr { cond, .. } => vec![cond],
            Opcode::Ret { value } => value.iter().collect(),
        }
    }

    /// Returns every value operand mutably, in the same order as
    /// [`Opcode::operands`].
    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            Opcode::Alloca { .. }
            | Opcode::Unreachable
            | Opcode::Br { .. }
            | Opcode::CatchSwitch { .. }
            | Opcode::CatchRet { .. } => Vec::new(),
            Opcode::Load { addr } => vec![addr],
            Opcode::Store { value, addr } => vec![value, addr],
            Opcode::BinOp { lhs, rhs, .. } | Opcode::Cmp { lhs, rhs, .. } => vec![lhs, rhs],
            Opcode::Cast { value, .. } | Opcode::Switch { value, .. } => vec![value],
            Opcode::GetElementPtr { base, indices } => {
                let mut ops = vec![base];
                ops.extend(indices.iter_mut());
                ops
            }
            Opcode::Call { args, .. } => args.iter_mut().collect(),
            Opcode::Phi { incoming } => incoming.iter_mut().map(|inc| &mut inc.value).collect(),
            Opcode::LandingPad { clauses, .. } => clauses.iter_mut().collect(),
            Opcode::CatchPad { args } => args.iter_mut().collect(),
            Opcode::CondBr { cond, .. } => vec![cond],
            Opcode::Ret { value } => value.iter_mut().collect(),
        }
    }

    /// Returns the blocks a terminator may transfer control to.
    ///
    /// Empty for non-terminators.
    #[must_use]
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Opcode::Br { target } | Opcode::CatchRet { target } => vec![*target],
            Opcode::CondBr {
                then_target,
                else_target,
                ..
            } => vec![*then_target, *else_target],
            Opcode::Switch { default, cases, .. } => {
                let mut succs = vec![*default];
                succs.extend(cases.iter().map(|(_, block)| *block));
                succs
            }
            Opcode::CatchSwitch { handlers, unwind } => {
                let mut succs = handlers.clone();
                succs.extend(unwind.iter().copied());
                succs
            }
            _ => Vec::new(),
        }
    }
}

/// A single IR instruction: an opcode, a result type, and an optional name.
///
/// Instructions are owned by their function's arena; blocks hold ordered
/// [`InstrId`] lists. The name is purely cosmetic and feeds the textual dump.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    opcode: Opcode,
    ty: Ty,
    name: String,
}

impl Instruction {
    /// Creates an unnamed instruction.
    #[must_use]
    pub const fn new(opcode: Opcode, ty: Ty) -> Self {
        Self {
            opcode,
            ty,
            name: String::new(),
        }
    }

    /// Creates a named instruction.
    #[must_use]
    pub fn with_name(opcode: Opcode, ty: Ty, name: impl Into<String>) -> Self {
        Self {
            opcode,
            ty,
            name: name.into(),
        }
    }

    /// Returns the opcode.
    #[must_use]
    pub const fn opcode(&self) -> &Opcode {
        &self.opcode
    }

    /// Returns the opcode mutably.
    pub fn opcode_mut(&mut self) -> &mut Opcode {
        &mut self.opcode
    }

    /// Returns the result type ([`Ty::Void`] for effects and terminators).
    #[must_use]
    pub const fn ty(&self) -> Ty {
        self.ty
    }

    /// Returns the cosmetic name, which may be empty.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replaces the cosmetic name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Returns `true` if this instruction is a phi node.
    #[must_use]
    pub const fn is_phi(&self) -> bool {
        self.opcode.is_phi()
    }

    /// Returns `true` if this instruction is a control transfer.
    #[must_use]
    pub const fn is_terminator(&self) -> bool {
        self.opcode.is_terminator()
    }

    /// Returns `true` if any operand (phi incoming values included) is an
    /// embedded constant expression.
    #[must_use]
    pub fn has_const_expr_operand(&self) -> bool {
        self.opcode
            .operands()
            .iter()
            .any(|op| matches!(op, Operand::Expr(_)))
    }

    /// Shorthand for a named stack slot allocation.
    #[must_use]
    pub fn alloca(allocated: Ty, name: impl Into<String>) -> Self {
        Self::with_name(Opcode::Alloca { allocated }, Ty::Ptr, name)
    }

    /// Shorthand for a load of the given type.
    #[must_use]
    pub fn load(addr: Operand, ty: Ty, name: impl Into<String>) -> Self {
        Self::with_name(Opcode::Load { addr }, ty, name)
    }

    /// Shorthand for a store.
    #[must_use]
    pub const fn store(value: Operand, addr: Operand) -> Self {
        Self::new(Opcode::Store { value, addr }, Ty::Void)
    }

    /// Shorthand for an unconditional branch.
    #[must_use]
    pub const fn br(target: BlockId) -> Self {
        Self::new(Opcode::Br { target }, Ty::Void)
    }

    /// Shorthand for a return.
    #[must_use]
    pub const fn ret(value: Option<Operand>) -> Self {
        Self::new(Opcode::Ret { value }, Ty::Void)
    }
}
