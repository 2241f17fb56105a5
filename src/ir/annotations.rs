//! The module-level annotation side-table and its reader.
//!
//! Front ends attach free-text markers to functions through a well-known
//! global: an array of `(function-pointer, string-pointer)` pairs. Both
//! pointers historically come wrapped: the function side in trivial pointer
//! casts, the string side either through an intermediate `getelementptr`
//! constant expression or as a direct global reference, depending on the
//! toolchain generation. Resolution must accept both string encodings and
//! treat them as the same logical reference.
//!
//! The two encodings are handled by a small strategy interface
//! ([`NoteDecoder`]) with one implementation per physical shape, probed in
//! order, rather than duplicated inline parsing.
//!
//! # Thread Safety
//!
//! All types in this module are `Send` and `Sync`; reading is pure.

use crate::ir::constant::{ConstExpr, ConstOperand};
use crate::ir::module::{FuncId, GlobalId, Module};

/// The well-known name the front end attaches the annotation table under.
pub const GLOBAL_ANNOTATIONS: &str = "llvm.global.annotations";

/// One entry of the annotation table: a target function paired with a
/// reference to the string global holding its annotation text.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationEntry {
    target: ConstOperand,
    note: ConstOperand,
}

impl AnnotationEntry {
    /// Creates an entry from the raw constant operands the front end emitted.
    #[must_use]
    pub const fn new(target: ConstOperand, note: ConstOperand) -> Self {
        Self { target, note }
    }

    /// Returns the (possibly cast-wrapped) target function reference.
    #[must_use]
    pub const fn target(&self) -> &ConstOperand {
        &self.target
    }

    /// Returns the (possibly gep-wrapped) annotation string reference.
    #[must_use]
    pub const fn note(&self) -> &ConstOperand {
        &self.note
    }
}

/// The annotation side-table: an ordered list of entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationTable {
    entries: Vec<AnnotationEntry>,
}

impl AnnotationTable {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends an entry.
    pub fn push(&mut self, entry: AnnotationEntry) {
        self.entries.push(entry);
    }

    /// Returns the entries in table order.
    #[must_use]
    pub fn entries(&self) -> &[AnnotationEntry] {
        &self.entries
    }

    /// Returns `true` if the table holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Decodes one physical encoding of an annotation-string reference.
///
/// Implementations resolve an entry's note operand to the string global it
/// denotes, or report that the operand is not in their encoding.
pub trait NoteDecoder {
    /// Resolves the note operand to a string global, if it matches this
    /// decoder's encoding.
    fn resolve(&self, note: &ConstOperand) -> Option<GlobalId>;
}

/// Decodes the older encoding: the note is a `getelementptr` constant
/// expression whose base is the string global.
#[derive(Debug, Clone, Copy, Default)]
pub struct GepNoteDecoder;

impl NoteDecoder for GepNoteDecoder {
    fn resolve(&self, note: &ConstOperand) -> Option<GlobalId> {
        match note {
            ConstOperand::Expr(expr) => match expr.as_ref() {
                ConstExpr::GetElementPtr { base, .. } => base.as_global(),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Decodes the newer encoding: the note references the string global
/// directly (modulo trivial pointer casts).
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectNoteDecoder;

impl NoteDecoder for DirectNoteDecoder {
    fn resolve(&self, note: &ConstOperand) -> Option<GlobalId> {
        note.as_global()
    }
}

/// Reads the annotation text attached to a function.
///
/// Scans the module's annotation table; every entry whose target resolves to
/// `func` through trivial pointer casts contributes its string content,
/// lower-cased and followed by a space. A missing table, no matching entry,
/// or a note that resolves to a non-string global all yield an empty string.
///
/// # Examples
///
/// ```rust,ignore
/// use shroud::ir::read_annotation;
///
/// let text = read_annotation(&module, func);
/// if text.contains("fla") {
///     // opted in to flattening
/// }
/// ```
#[must_use]
pub fn read_annotation(module: &Module, func: FuncId) -> String {
    let Some(table) = module.annotations() else {
        return String::new();
    };

    let decoders: [&dyn NoteDecoder; 2] = [&GepNoteDecoder, &DirectNoteDecoder];
    let mut annotation = String::new();
    for entry in table.entries() {
        if entry.target().as_function() != Some(func) {
            continue;
        }
        let Some(global) = decoders.iter().find_map(|d| d.resolve(entry.note())) else {
            continue;
        };
        if let Some(text) = module.global(global).as_str() {
            annotation.push_str(&text.to_lowercase());
            annotation.push(' ');
        }
    }
    annotation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::constant::Constant;
    use crate::ir::function::{Function, Linkage};
    use crate::ir::instruction::CastKind;
    use crate::ir::module::GlobalVariable;
    use crate::ir::types::Ty;

    fn gep_note(global: GlobalId) -> ConstOperand {
        ConstExpr::GetElementPtr {
            base: ConstOperand::Global(global),
            indices: vec![Constant::i32(0).into(), Constant::i32(0).into()],
        }
        .into()
    }

    fn cast_wrapped(func: FuncId) -> ConstOperand {
        ConstExpr::Cast {
            kind: CastKind::BitCast,
            value: ConstOperand::Function(func),
            to: Ty::Ptr,
        }
        .into()
    }

    #[test]
    fn test_read_annotation_missing_table() {
        let mut module = Module::new("m");
        let func = module.add_function(Function::new("f", Linkage::Internal));
        assert_eq!(read_annotation(&module, func), "");
    }

    #[test]
    fn test_read_annotation_gep_encoding() {
        let mut module = Module::new("m");
        let func = module.add_function(Function::new("f", Linkage::Internal));
        let global = module.add_global(GlobalVariable::with_string("anno", "Fla"));
        let mut table = AnnotationTable::new();
        table.push(AnnotationEntry::new(cast_wrapped(func), gep_note(global)));
        module.set_annotations(table);

        assert_eq!(read_annotation(&module, func), "fla ");
    }

    #[test]
    fn test_read_annotation_direct_encoding() {
        let mut module = Module::new("m");
        let func = module.add_function(Function::new("f", Linkage::Internal));
        let global = module.add_global(GlobalVariable::with_string("anno", "NoBcf"));
        let mut table = AnnotationTable::new();
        table.push(AnnotationEntry::new(
            cast_wrapped(func),
            ConstOperand::Global(global),
        ));
        module.set_annotations(table);

        assert_eq!(read_annotation(&module, func), "nobcf ");
    }

    #[test]
    fn test_both_encodings_resolve_to_same_text() {
        let mut module = Module::new("m");
        let func = module.add_function(Function::new("f", Linkage::Internal));
        let global = module.add_global(GlobalVariable::with_string("anno", "Sub"));

        let mut table = AnnotationTable::new();
        table.push(AnnotationEntry::new(cast_wrapped(func), gep_note(global)));
        table.push(AnnotationEntry::new(
            cast_wrapped(func),
            ConstOperand::Global(global),
        ));
        module.set_annotations(table);

        assert_eq!(read_annotation(&module, func), "sub sub ");
    }

    #[test]
    fn test_read_annotation_skips_other_functions() {
        let mut module = Module::new("m");
        let annotated = module.add_function(Function::new("a", Linkage::Internal));
        let other = module.add_function(Function::new("b", Linkage::Internal));
        let global = module.add_global(GlobalVariable::with_string("anno", "fla"));

        let mut table = AnnotationTable::new();
        table.push(AnnotationEntry::new(
            cast_wrapped(annotated),
            ConstOperand::Global(global),
        ));
        module.set_annotations(table);

        assert_eq!(read_annotation(&module, annotated), "fla ");
        assert_eq!(read_annotation(&module, other), "");
    }

    #[test]
    fn test_read_annotation_ignores_non_string_note() {
        let mut module = Module::new("m");
        let func = module.add_function(Function::new("f", Linkage::Internal));
        let global = module.add_global(GlobalVariable::new("counter", None));
        let mut table = AnnotationTable::new();
        table.push(AnnotationEntry::new(
            cast_wrapped(func),
            ConstOperand::Global(global),
        ));
        module.set_annotations(table);

        assert_eq!(read_annotation(&module, func), "");
    }

    #[test]
    fn test_annotation_table_accessors() {
        let mut table = AnnotationTable::new();
        assert!(table.is_empty());
        table.push(AnnotationEntry::new(
            ConstOperand::Function(FuncId::new(0)),
            ConstOperand::Global(GlobalId::new(0)),
        ));
        assert_eq!(table.entries().len(), 1);
    }
}
