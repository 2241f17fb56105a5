//! Functions: arena-owned instructions organized into ordered blocks.
//!
//! A [`Function`] owns every instruction in a flat arena indexed by
//! [`InstrId`]; blocks hold ordered handle lists. Graph queries
//! ([`Function::users_of`], [`Function::predecessors`]) are computed by
//! scanning the attached instructions, so there are no side tables to keep
//! coherent while passes rewrite the graph.
//!
//! # Structure
//!
//! ```text
//! Function
//! ├── arena: Vec<Instruction>   // every instruction ever created
//! ├── blocks: Vec<BasicBlock>   // ordered; blocks[0] is the entry
//! ├── name: String
//! └── linkage: Linkage
//! ```
//!
//! Removing an instruction only detaches its handle from its block; the arena
//! slot stays allocated so existing handles never dangle. Detached slots are
//! invisible to every graph query.
//!
//! # Thread Safety
//!
//! `Function` is `Send` and `Sync` once constructed.

use std::fmt;

use crate::ir::block::{BasicBlock, BlockId};
use crate::ir::instruction::{InstrId, Instruction, Opcode, Operand};
use crate::{Error, Result};

/// Linkage of a function, as far as this core cares about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Linkage {
    /// Visible outside the module.
    External,
    /// Local to the module.
    Internal,
    /// A body that exists only for inlining and is discarded afterwards.
    ///
    /// Transforming such a body would be wasted work; the eligibility gate
    /// rejects it.
    AvailableExternally,
    /// May be replaced by another definition at link time.
    Weak,
}

impl Linkage {
    /// Returns `true` for `available_externally` linkage.
    #[must_use]
    pub const fn is_available_externally(&self) -> bool {
        matches!(self, Linkage::AvailableExternally)
    }
}

/// A function under analysis or transformation.
#[derive(Debug, Clone)]
pub struct Function {
    name: String,
    linkage: Linkage,
    arena: Vec<Instruction>,
    blocks: Vec<BasicBlock>,
}

impl Function {
    /// Creates an empty function definition.
    ///
    /// A function with no blocks is a declaration; add blocks to give it a
    /// body. The first block added becomes the entry block.
    #[must_use]
    pub fn new(name: impl Into<String>, linkage: Linkage) -> Self {
        Self {
            name: name.into(),
            linkage,
            arena: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Creates a body-less declaration with external linkage.
    #[must_use]
    pub fn declaration(name: impl Into<String>) -> Self {
        Self::new(name, Linkage::External)
    }

    /// Returns the function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the linkage.
    #[must_use]
    pub const fn linkage(&self) -> Linkage {
        self.linkage
    }

    /// Returns `true` if this function has no body.
    #[must_use]
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns the entry block.
    ///
    /// # Panics
    ///
    /// Panics if the function is a declaration.
    #[must_use]
    pub fn entry(&self) -> BlockId {
        assert!(!self.blocks.is_empty(), "declaration has no entry block");
        BlockId::new(0)
    }

    /// Appends a new empty block and returns its handle.
    pub fn add_block(&mut self, label: impl Into<String>) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(BasicBlock::new(id, label));
        id
    }

    /// Returns the blocks in layout order.
    #[must_use]
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// Returns an iterator over all block handles in layout order.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(BlockId::new)
    }

    /// Returns a block by handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not belong to this function.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    /// Returns a block mutably by handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not belong to this function.
    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    /// Returns an instruction by handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not belong to this function.
    #[must_use]
    pub fn instr(&self, id: InstrId) -> &Instruction {
        &self.arena[id.index()]
    }

    /// Returns an instruction mutably by handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not belong to this function.
    pub fn instr_mut(&mut self, id: InstrId) -> &mut Instruction {
        &mut self.arena[id.index()]
    }

    /// Appends an instruction to the end of a block.
    pub fn push_instr(&mut self, block: BlockId, instruction: Instruction) -> InstrId {
        let id = self.alloc(instruction);
        self.blocks[block.index()].push(id);
        id
    }

    /// Inserts an instruction at a position within a block.
    ///
    /// # Panics
    ///
    /// Panics if `index` is past the end of the block.
    pub fn insert_at(&mut self, block: BlockId, index: usize, instruction: Instruction) -> InstrId {
        let id = self.alloc(instruction);
        self.blocks[block.index()].insert(index, id);
        id
    }

    /// Inserts an instruction immediately before an attached anchor.
    ///
    /// # Panics
    ///
    /// Panics if the anchor is detached from every block.
    pub fn insert_before(&mut self, anchor: InstrId, instruction: Instruction) -> InstrId {
        let (block, index) = self
            .position(anchor)
            .expect("insertion anchor must be attached to a block");
        self.insert_at(block, index, instruction)
    }

    /// Inserts an instruction immediately after an attached anchor.
    ///
    /// # Panics
    ///
    /// Panics if the anchor is detached from every block.
    pub fn insert_after(&mut self, anchor: InstrId, instruction: Instruction) -> InstrId {
        let (block, index) = self
            .position(anchor)
            .expect("insertion anchor must be attached to a block");
        self.insert_at(block, index + 1, instruction)
    }

    /// Detaches an instruction from its block.
    ///
    /// The arena slot stays allocated so outstanding handles never dangle;
    /// callers must have rewired every use beforehand. Returns `true` if the
    /// instruction was attached.
    pub fn remove_instr(&mut self, id: InstrId) -> bool {
        match self.block_of(id) {
            Some(block) => self.blocks[block.index()].remove(id),
            None => false,
        }
    }

    /// Returns the block an instruction is attached to, if any.
    #[must_use]
    pub fn block_of(&self, id: InstrId) -> Option<BlockId> {
        self.blocks
            .iter()
            .find(|block| block.contains(id))
            .map(BasicBlock::id)
    }

    /// Returns the block and position an instruction is attached at.
    #[must_use]
    pub fn position(&self, id: InstrId) -> Option<(BlockId, usize)> {
        self.blocks
            .iter()
            .find_map(|block| block.position_of(id).map(|index| (block.id(), index)))
    }

    /// Returns the terminator of a block, if its last instruction is one.
    #[must_use]
    pub fn terminator(&self, block: BlockId) -> Option<InstrId> {
        let last = self.blocks[block.index()].last()?;
        self.instr(last).is_terminator().then_some(last)
    }

    /// Returns the successor blocks of a block.
    #[must_use]
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        match self.terminator(block) {
            Some(term) => self.instr(term).opcode().successors(),
            None => Vec::new(),
        }
    }

    /// Returns every block whose terminator may transfer control to `block`.
    #[must_use]
    pub fn predecessors(&self, block: BlockId) -> Vec<BlockId> {
        self.block_ids()
            .filter(|&pred| self.successors(pred).contains(&block))
            .collect()
    }

    /// Returns the leading phi nodes of a block.
    #[must_use]
    pub fn phis(&self, block: BlockId) -> Vec<InstrId> {
        self.blocks[block.index()]
            .instructions()
            .iter()
            .copied()
            .take_while(|&id| self.instr(id).is_phi())
            .collect()
    }

    /// Returns the first position in a block where an ordinary instruction
    /// may be inserted: past the leading phi nodes and positional pads.
    #[must_use]
    pub fn first_insertion_index(&self, block: BlockId) -> usize {
        self.blocks[block.index()]
            .instructions()
            .iter()
            .take_while(|&&id| {
                let op = self.instr(id).opcode();
                op.is_phi() || op.is_pad()
            })
            .count()
    }

    /// Returns every attached instruction that consumes the result of `id`,
    /// in layout order, each listed once.
    #[must_use]
    pub fn users_of(&self, id: InstrId) -> Vec<InstrId> {
        let mut users = Vec::new();
        for block in &self.blocks {
            for &candidate in block.instructions() {
                if candidate == id || users.contains(&candidate) {
                    continue;
                }
                let consumes = self
                    .instr(candidate)
                    .opcode()
                    .operands()
                    .iter()
                    .any(|op| op.as_instr() == Some(id));
                if consumes {
                    users.push(candidate);
                }
            }
        }
        users
    }

    /// Replaces every operand of `user` that references `old` with `with`.
    pub fn replace_use(&mut self, user: InstrId, old: InstrId, with: &Operand) {
        for op in self.arena[user.index()].opcode_mut().operands_mut() {
            if op.as_instr() == Some(old) {
                *op = with.clone();
            }
        }
    }

    /// Replaces every use of `old` across the function with `with`.
    pub fn replace_all_uses(&mut self, old: InstrId, with: &Operand) {
        for user in self.users_of(old) {
            self.replace_use(user, old, with);
        }
    }

    /// Returns the total number of attached instructions.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(BasicBlock::len).sum()
    }

    /// Returns the total number of phi nodes across all blocks.
    #[must_use]
    pub fn phi_count(&self) -> usize {
        self.block_ids().map(|b| self.phis(b).len()).sum()
    }

    /// Counts embedded constant-expression operands across all attached
    /// instructions, phi incoming values included.
    #[must_use]
    pub fn const_expr_operand_count(&self) -> usize {
        self.blocks
            .iter()
            .flat_map(|block| block.instructions())
            .map(|&id| {
                self.instr(id)
                    .opcode()
                    .operands()
                    .iter()
                    .filter(|op| matches!(op, Operand::Expr(_)))
                    .count()
            })
            .sum()
    }

    /// Renders the SSA name of an instruction result (`%name` or `%<index>`).
    #[must_use]
    pub fn value_name(&self, id: InstrId) -> String {
        let instr = self.instr(id);
        if instr.name().is_empty() {
            format!("%{}", id.index())
        } else {
            format!("%{}", instr.name())
        }
    }

    /// Checks structural well-formedness of this function.
    ///
    /// Declarations are trivially well-formed. For definitions, every block
    /// must be non-empty and end in its only terminator, phi nodes must form
    /// a leading prefix, and every block or instruction reference must
    /// resolve.
    ///
    /// # Errors
    ///
    /// Returns the first structural defect found.
    pub fn verify(&self) -> Result<()> {
        for block in &self.blocks {
            if block.is_empty() {
                return Err(Error::EmptyBlock {
                    function: self.name.clone(),
                    block: block.label().to_string(),
                });
            }
            let last = block.last().expect("non-empty block has a last instruction");
            if !self.instr(last).is_terminator() {
                return Err(Error::MissingTerminator {
                    function: self.name.clone(),
                    block: block.label().to_string(),
                });
            }

            let mut seen_non_phi = false;
            for &id in block.instructions() {
                let instr = self.instr(id);
                if instr.is_terminator() && id != last {
                    return Err(Error::MisplacedTerminator {
                        function: self.name.clone(),
                        block: block.label().to_string(),
                    });
                }
                if instr.is_phi() {
                    if seen_non_phi {
                        return Err(Error::MisplacedPhi {
                            function: self.name.clone(),
                            block: block.label().to_string(),
                        });
                    }
                } else {
                    seen_non_phi = true;
                }

                for target in self.referenced_blocks(id) {
                    if target.index() >= self.blocks.len() {
                        return Err(Error::UnknownBlock {
                            function: self.name.clone(),
                            block: target.to_string(),
                        });
                    }
                }
                for op in instr.opcode().operands() {
                    if let Some(referenced) = op.as_instr() {
                        if referenced.index() >= self.arena.len()
                            || self.block_of(referenced).is_none()
                        {
                            return Err(Error::DanglingReference {
                                function: self.name.clone(),
                                instruction: referenced.to_string(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn referenced_blocks(&self, id: InstrId) -> Vec<BlockId> {
        let opcode = self.instr(id).opcode();
        let mut blocks = opcode.successors();
        if let Opcode::Phi { incoming } = opcode {
            blocks.extend(incoming.iter().map(|inc| inc.block()));
        }
        blocks
    }

    fn alloc(&mut self, instruction: Instruction) -> InstrId {
        let id = InstrId::new(self.arena.len());
        self.arena.push(instruction);
        id
    }

    fn fmt_operand(&self, op: &Operand, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match op {
            Operand::Instr(id) => write!(f, "{}", self.value_name(*id)),
            Operand::Const(c) => write!(f, "{c}"),
            Operand::Global(id) => write!(f, "{id}"),
            Operand::Function(id) => write!(f, "{id}"),
            Operand::Expr(e) => write!(f, "constexpr({e:?})"),
        }
    }

    fn fmt_instr(&self, id: InstrId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let instr = self.instr(id);
        write!(f, "  ")?;
        if instr.ty().is_first_class() {
            write!(f, "{} = ", self.value_name(id))?;
        }
        match instr.opcode() {
            Opcode::Alloca { allocated } => write!(f, "alloca {allocated}")?,
            Opcode::Load { addr } => {
                write!(f, "load {} ", instr.ty())?;
                self.fmt_operand(addr, f)?;
            }
            Opcode::Store { value, addr } => {
                write!(f, "store ")?;
                self.fmt_operand(value, f)?;
                write!(f, ", ")?;
                self.fmt_operand(addr, f)?;
            }
            Opcode::BinOp { op, lhs, rhs } => {
                write!(f, "{op} {} ", instr.ty())?;
                self.fmt_operand(lhs, f)?;
                write!(f, ", ")?;
                self.fmt_operand(rhs, f)?;
            }
            Opcode::Cast { kind, value } => {
                write!(f, "{kind} ")?;
                self.fmt_operand(value, f)?;
                write!(f, " to {}", instr.ty())?;
            }
            Opcode::GetElementPtr { base, indices } => {
                write!(f, "getelementptr ")?;
                self.fmt_operand(base, f)?;
                for index in indices {
                    write!(f, ", ")?;
                    self.fmt_operand(index, f)?;
                }
            }
            Opcode::Cmp { pred, lhs, rhs } => {
                write!(f, "cmp {pred} ")?;
                self.fmt_operand(lhs, f)?;
                write!(f, ", ")?;
                self.fmt_operand(rhs, f)?;
            }
            Opcode::Call { callee, args, .. } => {
                match callee {
                    crate::ir::Callee::Function(id) => write!(f, "call {id}(")?,
                    crate::ir::Callee::Intrinsic(i) => write!(f, "call @{i}(")?,
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    self.fmt_operand(arg, f)?;
                }
                write!(f, ")")?;
            }
            Opcode::Phi { incoming } => {
                write!(f, "phi ")?;
                for (i, inc) in incoming.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "[")?;
                    self.fmt_operand(inc.value(), f)?;
                    write!(f, ", {}]", inc.block())?;
                }
            }
            Opcode::LandingPad { cleanup, .. } => {
                write!(f, "landingpad")?;
                if *cleanup {
                    write!(f, " cleanup")?;
                }
            }
            Opcode::CatchPad { .. } => write!(f, "catchpad")?,
            Opcode::CatchSwitch { handlers, .. } => {
                write!(f, "catchswitch [")?;
                for (i, handler) in handlers.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{handler}")?;
                }
                write!(f, "]")?;
            }
            Opcode::CatchRet { target } => write!(f, "catchret to {target}")?,
            Opcode::Br { target } => write!(f, "br {target}")?,
            Opcode::CondBr {
                cond,
                then_target,
                else_target,
            } => {
                write!(f, "br ")?;
                self.fmt_operand(cond, f)?;
                write!(f, ", {then_target}, {else_target}")?;
            }
            Opcode::Switch {
                value,
                default,
                cases,
            } => {
                write!(f, "switch ")?;
                self.fmt_operand(value, f)?;
                write!(f, ", {default} [")?;
                for (i, (case, block)) in cases.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{case}: {block}")?;
                }
                write!(f, "]")?;
            }
            Opcode::Ret { value } => {
                write!(f, "ret")?;
                if let Some(v) = value {
                    write!(f, " ")?;
                    self.fmt_operand(v, f)?;
                }
            }
            Opcode::Unreachable => write!(f, "unreachable")?,
        }
        writeln!(f)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_declaration() {
            return writeln!(f, "declare @{}", self.name);
        }
        writeln!(f, "define @{} {{", self.name)?;
        for block in &self.blocks {
            writeln!(f, "{}:", block.label())?;
            for &id in block.instructions() {
                self.fmt_instr(id, f)?;
            }
        }
        writeln!(f, "}}")
    }
}
