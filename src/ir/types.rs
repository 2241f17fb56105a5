//! The closed type system used by the normalization IR.
//!
//! Passes need to construct types on the fly (the demotion anchor needs an
//! `i32`, stack slots need a pointer type). The type universe is a closed
//! [`Ty`] enum, so types are plain `Copy` values and no shared type context
//! or interner is required.
//!
//! # Thread Safety
//!
//! All types in this module are `Send` and `Sync`.

use std::fmt;

use strum::{EnumCount, EnumIter};

/// A first-order value type.
///
/// This is deliberately a closed enumeration: the normalization passes only
/// need to know a value's storage class (integer width, float width, pointer)
/// to allocate stack slots and build cast markers, never to model aggregate
/// layout.
///
/// # Examples
///
/// ```rust,ignore
/// use shroud::ir::Ty;
///
/// assert!(Ty::I32.is_integer());
/// assert_eq!(Ty::I32.bit_width(), Some(32));
/// assert_eq!(format!("{}", Ty::Ptr), "ptr");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumCount, EnumIter)]
pub enum Ty {
    /// No value (the result type of stores, branches and other effects).
    Void,
    /// 1-bit integer (booleans, comparison results).
    I1,
    /// 8-bit integer.
    I8,
    /// 16-bit integer.
    I16,
    /// 32-bit integer.
    I32,
    /// 64-bit integer.
    I64,
    /// 32-bit IEEE float.
    F32,
    /// 64-bit IEEE float.
    F64,
    /// An untyped pointer (stack slots, globals, function addresses).
    Ptr,
}

impl Ty {
    /// Returns `true` for the integer types (including `i1`).
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        matches!(self, Ty::I1 | Ty::I8 | Ty::I16 | Ty::I32 | Ty::I64)
    }

    /// Returns `true` for the floating point types.
    #[must_use]
    pub const fn is_float(&self) -> bool {
        matches!(self, Ty::F32 | Ty::F64)
    }

    /// Returns `true` if a value of this type can be produced by an
    /// instruction and stored in a stack slot.
    #[must_use]
    pub const fn is_first_class(&self) -> bool {
        !matches!(self, Ty::Void)
    }

    /// Returns the width in bits, or `None` for `void` and `ptr`.
    #[must_use]
    pub const fn bit_width(&self) -> Option<u32> {
        match self {
            Ty::Void | Ty::Ptr => None,
            Ty::I1 => Some(1),
            Ty::I8 => Some(8),
            Ty::I16 => Some(16),
            Ty::I32 | Ty::F32 => Some(32),
            Ty::I64 | Ty::F64 => Some(64),
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Ty::Void => "void",
            Ty::I1 => "i1",
            Ty::I8 => "i8",
            Ty::I16 => "i16",
            Ty::I32 => "i32",
            Ty::I64 => "i64",
            Ty::F32 => "f32",
            Ty::F64 => "f64",
            Ty::Ptr => "ptr",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_ty_classification() {
        assert!(Ty::I1.is_integer());
        assert!(Ty::I64.is_integer());
        assert!(!Ty::F32.is_integer());
        assert!(Ty::F64.is_float());
        assert!(!Ty::Ptr.is_float());
        assert!(!Ty::Void.is_first_class());
        assert!(Ty::Ptr.is_first_class());
    }

    #[test]
    fn test_ty_bit_width() {
        assert_eq!(Ty::I1.bit_width(), Some(1));
        assert_eq!(Ty::I32.bit_width(), Some(32));
        assert_eq!(Ty::F64.bit_width(), Some(64));
        assert_eq!(Ty::Void.bit_width(), None);
        assert_eq!(Ty::Ptr.bit_width(), None);
    }

    #[test]
    fn test_ty_every_non_void_type_is_first_class() {
        for ty in Ty::iter() {
            assert_eq!(ty.is_first_class(), ty != Ty::Void);
        }
    }

    #[test]
    fn test_ty_display() {
        assert_eq!(format!("{}", Ty::I32), "i32");
        assert_eq!(format!("{}", Ty::Ptr), "ptr");
        assert_eq!(format!("{}", Ty::Void), "void");
    }
}
