use thiserror::Error;

/// The generic Error type covering all recoverable failures this library can return.
///
/// Errors are reserved for *recoverable* problems discovered while inspecting or
/// building IR - a malformed module handed in by an embedder, or a dangling
/// handle passed to a builder API. Contract violations inside the normalization
/// passes themselves (an entry block with predecessors, an empty basic block)
/// are programming errors in an earlier pass and abort via assertion instead,
/// since continuing would produce a function with undefined semantics.
///
/// # Error Categories
///
/// ## Structural Errors
/// - [`Error::EmptyBlock`] - A basic block contains no instructions
/// - [`Error::MissingTerminator`] - A block does not end in a control transfer
/// - [`Error::MisplacedTerminator`] - A control transfer in the middle of a block
/// - [`Error::MisplacedPhi`] - A phi node after a non-phi instruction
///
/// ## Reference Errors
/// - [`Error::UnknownBlock`] - A branch targets a block that does not exist
/// - [`Error::DanglingReference`] - An operand references a detached instruction
///
/// # Examples
///
/// ```rust,ignore
/// use shroud::{Error, ir::Module};
///
/// match module.verify() {
///     Ok(()) => println!("module is well-formed"),
///     Err(Error::EmptyBlock { function, block }) => {
///         eprintln!("empty block {} in '{}'", block, function);
///     }
///     Err(e) => eprintln!("malformed module: {}", e),
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A basic block contains no instructions.
    ///
    /// Every well-formed block holds at least its terminator. An empty block
    /// indicates a prior transformation detached instructions without removing
    /// the block itself.
    #[error("empty basic block {block} in function '{function}'")]
    EmptyBlock {
        /// The function containing the offending block
        function: String,
        /// The label of the empty block
        block: String,
    },

    /// A basic block does not end in a control-transfer instruction.
    #[error("block {block} in function '{function}' is not terminated")]
    MissingTerminator {
        /// The function containing the offending block
        function: String,
        /// The label of the unterminated block
        block: String,
    },

    /// A control-transfer instruction appears before the end of a block.
    #[error("terminator in the middle of block {block} in function '{function}'")]
    MisplacedTerminator {
        /// The function containing the offending block
        function: String,
        /// The label of the offending block
        block: String,
    },

    /// A phi node appears after a non-phi instruction.
    ///
    /// Phi nodes must form a leading prefix of their block; anything else
    /// breaks the edge semantics that the stack demotion pass relies on.
    #[error("phi node after non-phi instruction in block {block} of function '{function}'")]
    MisplacedPhi {
        /// The function containing the offending block
        function: String,
        /// The label of the offending block
        block: String,
    },

    /// A branch or phi edge references a block that does not exist in its function.
    #[error("reference to unknown block {block} in function '{function}'")]
    UnknownBlock {
        /// The function containing the offending reference
        function: String,
        /// The textual form of the unknown block id
        block: String,
    },

    /// An operand references an instruction that is detached from every block.
    #[error("operand references detached instruction {instruction} in function '{function}'")]
    DanglingReference {
        /// The function containing the offending operand
        function: String,
        /// The textual form of the detached instruction id
        instruction: String,
    },
}
