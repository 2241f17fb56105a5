//! Literal constants and deferred constant expressions.
//!
//! A [`Constant`] is an immediate value with a fixed bit pattern. A
//! [`ConstExpr`] is a *deferred* computation over constants - an address
//! computation, a cast, an arithmetic fold - that has no position in any
//! instruction stream. That positionlessness is exactly what makes constant
//! expressions hostile to control-flow rewriting: they cannot be relocated or
//! mutated in place, so the lowering pass converts each one into a
//! freestanding, position-addressable instruction.
//!
//! # Materialization
//!
//! [`ConstExpr::to_opcode`] produces a *flat* instruction: the expression's
//! own operation with its immediate operands, where any nested sub-expression
//! stays embedded as an [`Operand::Expr`]. The worklist lowering strategy
//! re-enqueues the materialized instruction so nesting resolves one level per
//! step; the per-block strategy recurses instead.
//!
//! # Thread Safety
//!
//! All types in this module are `Send` and `Sync`.

use std::fmt;

use crate::ir::instruction::{BinOpKind, CastKind, Opcode, Operand};
use crate::ir::module::{FuncId, GlobalId};
use crate::ir::types::Ty;

/// A literal constant value.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// An integer literal of the given type.
    Int {
        /// The integer type of the literal
        ty: Ty,
        /// The literal value, sign-extended to 64 bits
        value: i64,
    },
    /// A floating point literal of the given type.
    Float {
        /// The float type of the literal
        ty: Ty,
        /// The literal value
        value: f64,
    },
    /// The null pointer.
    NullPtr,
    /// An undefined value of the given type.
    Undef(Ty),
}

impl Constant {
    /// Returns the type of this constant.
    #[must_use]
    pub const fn ty(&self) -> Ty {
        match self {
            Constant::Int { ty, .. } | Constant::Float { ty, .. } | Constant::Undef(ty) => *ty,
            Constant::NullPtr => Ty::Ptr,
        }
    }

    /// Returns the zero value of the given type (`null` for pointers).
    #[must_use]
    pub fn zero(ty: Ty) -> Self {
        match ty {
            Ty::Ptr => Constant::NullPtr,
            _ if ty.is_float() => Constant::Float { ty, value: 0.0 },
            _ => Constant::Int { ty, value: 0 },
        }
    }

    /// Shorthand for an `i32` literal.
    #[must_use]
    pub const fn i32(value: i32) -> Self {
        Constant::Int {
            ty: Ty::I32,
            value: value as i64,
        }
    }

    /// Shorthand for an `i64` literal.
    #[must_use]
    pub const fn i64(value: i64) -> Self {
        Constant::Int { ty: Ty::I64, value }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int { ty, value } => write!(f, "{ty} {value}"),
            Constant::Float { ty, value } => write!(f, "{ty} {value}"),
            Constant::NullPtr => write!(f, "ptr null"),
            Constant::Undef(ty) => write!(f, "{ty} undef"),
        }
    }
}

/// An operand of a constant expression.
///
/// Constant expressions are closed over constants: their leaves are literals,
/// global addresses, or function addresses - never instruction results. The
/// escape analysis ([`crate::analysis::value_escapes`]) leans on this: every
/// consumer of an instruction result is itself an instruction, so there is no
/// non-instruction consumer case to answer for.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstOperand {
    /// A literal value.
    Literal(Constant),
    /// The address of a global variable.
    Global(GlobalId),
    /// The address of a function.
    Function(FuncId),
    /// A nested constant expression.
    Expr(Box<ConstExpr>),
}

impl ConstOperand {
    /// Returns the value type of this operand.
    ///
    /// Global and function addresses are pointers; nested expressions report
    /// their result type.
    #[must_use]
    pub fn ty(&self) -> Ty {
        match self {
            ConstOperand::Literal(c) => c.ty(),
            ConstOperand::Global(_) | ConstOperand::Function(_) => Ty::Ptr,
            ConstOperand::Expr(e) => e.result_ty(),
        }
    }

    /// Strips trivial pointer-cast wrappers.
    ///
    /// Front ends wrap annotation-table targets in no-op casts; resolution
    /// must look through any number of them to find the underlying function
    /// or global.
    #[must_use]
    pub fn strip_pointer_casts(&self) -> &ConstOperand {
        let mut current = self;
        while let ConstOperand::Expr(expr) = current {
            match expr.as_ref() {
                ConstExpr::Cast { value, .. } => current = value,
                _ => break,
            }
        }
        current
    }

    /// Returns the function this operand resolves to, looking through casts.
    #[must_use]
    pub fn as_function(&self) -> Option<FuncId> {
        match self.strip_pointer_casts() {
            ConstOperand::Function(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the global this operand resolves to, looking through casts.
    #[must_use]
    pub fn as_global(&self) -> Option<GlobalId> {
        match self.strip_pointer_casts() {
            ConstOperand::Global(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<Constant> for ConstOperand {
    fn from(c: Constant) -> Self {
        ConstOperand::Literal(c)
    }
}

impl From<ConstExpr> for ConstOperand {
    fn from(e: ConstExpr) -> Self {
        ConstOperand::Expr(Box::new(e))
    }
}

/// A deferred computation over constants.
///
/// Unlike an instruction, a constant expression has no position in any block
/// and carries no name. The lowering pass replaces each one reachable from an
/// instruction operand with an equivalent positioned instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstExpr {
    /// An address computation into a global or derived pointer.
    GetElementPtr {
        /// The base address
        base: ConstOperand,
        /// The index path applied to the base
        indices: Vec<ConstOperand>,
    },
    /// A value or pointer cast.
    Cast {
        /// The cast operation
        kind: CastKind,
        /// The value being cast
        value: ConstOperand,
        /// The destination type
        to: Ty,
    },
    /// A binary arithmetic or bitwise fold.
    BinOp {
        /// The operation
        op: BinOpKind,
        /// Left hand side
        lhs: ConstOperand,
        /// Right hand side
        rhs: ConstOperand,
    },
}

impl ConstExpr {
    /// Returns the result type of the deferred computation.
    #[must_use]
    pub fn result_ty(&self) -> Ty {
        match self {
            ConstExpr::GetElementPtr { .. } => Ty::Ptr,
            ConstExpr::Cast { to, .. } => *to,
            ConstExpr::BinOp { lhs, .. } => lhs.ty(),
        }
    }

    /// Materializes this expression as a single, flat instruction opcode.
    ///
    /// Nested sub-expressions remain embedded as [`Operand::Expr`] operands of
    /// the produced opcode; callers decide whether to recurse (per-block
    /// strategy) or re-enqueue (worklist strategy). Each materialization
    /// strictly reduces the remaining nesting depth, which is what guarantees
    /// termination of the worklist.
    #[must_use]
    pub fn to_opcode(&self) -> Opcode {
        match self {
            ConstExpr::GetElementPtr { base, indices } => Opcode::GetElementPtr {
                base: Operand::from_const_operand(base),
                indices: indices.iter().map(Operand::from_const_operand).collect(),
            },
            ConstExpr::Cast { kind, value, .. } => Opcode::Cast {
                kind: *kind,
                value: Operand::from_const_operand(value),
            },
            ConstExpr::BinOp { op, lhs, rhs } => Opcode::BinOp {
                op: *op,
                lhs: Operand::from_const_operand(lhs),
                rhs: Operand::from_const_operand(rhs),
            },
        }
    }

    /// Returns the maximum nesting depth of constant expressions below this one.
    ///
    /// A leaf expression has depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        let child = |op: &ConstOperand| match op {
            ConstOperand::Expr(e) => e.depth(),
            _ => 0,
        };
        let inner = match self {
            ConstExpr::GetElementPtr { base, indices } => indices
                .iter()
                .map(child)
                .max()
                .unwrap_or(0)
                .max(child(base)),
            ConstExpr::Cast { value, .. } => child(value),
            ConstExpr::BinOp { lhs, rhs, .. } => child(lhs).max(child(rhs)),
        };
        inner + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_types() {
        assert_eq!(Constant::i32(7).ty(), Ty::I32);
        assert_eq!(Constant::i64(-1).ty(), Ty::I64);
        assert_eq!(Constant::NullPtr.ty(), Ty::Ptr);
        assert_eq!(Constant::Undef(Ty::F32).ty(), Ty::F32);
    }

    #[test]
    fn test_constant_zero() {
        assert_eq!(Constant::zero(Ty::I32), Constant::i32(0));
        assert_eq!(Constant::zero(Ty::Ptr), Constant::NullPtr);
        assert_eq!(
            Constant::zero(Ty::F64),
            Constant::Float {
                ty: Ty::F64,
                value: 0.0
            }
        );
    }

    #[test]
    fn test_constant_display() {
        assert_eq!(format!("{}", Constant::i32(42)), "i32 42");
        assert_eq!(format!("{}", Constant::NullPtr), "ptr null");
    }

    #[test]
    fn test_strip_pointer_casts_direct() {
        let op = ConstOperand::Function(FuncId::new(3));
        assert_eq!(op.as_function(), Some(FuncId::new(3)));
    }

    #[test]
    fn test_strip_pointer_casts_wrapped() {
        let wrapped = ConstOperand::Expr(Box::new(ConstExpr::Cast {
            kind: CastKind::BitCast,
            value: ConstOperand::Expr(Box::new(ConstExpr::Cast {
                kind: CastKind::BitCast,
                value: ConstOperand::Function(FuncId::new(1)),
                to: Ty::Ptr,
            })),
            to: Ty::Ptr,
        }));
        assert_eq!(wrapped.as_function(), Some(FuncId::new(1)));
        assert_eq!(wrapped.as_global(), None);
    }

    #[test]
    fn test_strip_pointer_casts_stops_at_gep() {
        let gep = ConstOperand::Expr(Box::new(ConstExpr::GetElementPtr {
            base: ConstOperand::Global(GlobalId::new(0)),
            indices: vec![Constant::i32(0).into()],
        }));
        // A gep is not a trivial wrapper; it must not be stripped.
        assert_eq!(gep.as_global(), None);
    }

    #[test]
    fn test_const_expr_result_ty() {
        let gep = ConstExpr::GetElementPtr {
            base: ConstOperand::Global(GlobalId::new(0)),
            indices: vec![],
        };
        assert_eq!(gep.result_ty(), Ty::Ptr);

        let cast = ConstExpr::Cast {
            kind: CastKind::PtrToInt,
            value: ConstOperand::Global(GlobalId::new(0)),
            to: Ty::I64,
        };
        assert_eq!(cast.result_ty(), Ty::I64);

        let add = ConstExpr::BinOp {
            op: BinOpKind::Add,
            lhs: Constant::i32(1).into(),
            rhs: Constant::i32(2).into(),
        };
        assert_eq!(add.result_ty(), Ty::I32);
    }

    #[test]
    fn test_const_expr_depth() {
        let leaf = ConstExpr::Cast {
            kind: CastKind::PtrToInt,
            value: ConstOperand::Global(GlobalId::new(0)),
            to: Ty::I64,
        };
        assert_eq!(leaf.depth(), 1);

        let nested = ConstExpr::BinOp {
            op: BinOpKind::Add,
            lhs: ConstOperand::Expr(Box::new(leaf)),
            rhs: Constant::i64(4).into(),
        };
        assert_eq!(nested.depth(), 2);
    }

    #[test]
    fn test_to_opcode_is_flat() {
        let inner = ConstExpr::Cast {
            kind: CastKind::PtrToInt,
            value: ConstOperand::Global(GlobalId::new(0)),
            to: Ty::I64,
        };
        let outer = ConstExpr::BinOp {
            op: BinOpKind::Add,
            lhs: ConstOperand::Expr(Box::new(inner.clone())),
            rhs: Constant::i64(8).into(),
        };

        let opcode = outer.to_opcode();
        let Opcode::BinOp { op, lhs, rhs } = opcode else {
            panic!("expected a binop opcode");
        };
        assert_eq!(op, BinOpKind::Add);
        // The nested expression stays embedded; only one level materialized.
        assert_eq!(lhs, Operand::Expr(inner));
        assert_eq!(rhs, Operand::Const(Constant::i64(8)));
    }
}
