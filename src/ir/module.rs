//! Modules: the compilation unit holding functions, globals, and the
//! annotation side-table.
//!
//! The annotation table is populated by the front end before this core runs
//! and is strictly read-only here; see [`crate::ir::annotations`] for the
//! format and the resolution rules.
//!
//! # Thread Safety
//!
//! `Module` is `Send` and `Sync`; the normalization pipeline mutates disjoint
//! functions from multiple threads through `&mut [Function]`.

use std::fmt;

use crate::ir::annotations::AnnotationTable;
use crate::ir::constant::Constant;
use crate::ir::function::Function;
use crate::Result;

/// An opaque handle to a function within its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(usize);

impl FuncId {
    /// Creates a function handle from a raw index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@f{}", self.0)
    }
}

/// An opaque handle to a global variable within its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(usize);

impl GlobalId {
    /// Creates a global handle from a raw index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@g{}", self.0)
    }
}

/// The initializer of a global variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Initializer {
    /// A byte string (annotation text lives here).
    Str(String),
    /// A scalar constant.
    Scalar(Constant),
}

/// A module-level global variable.
#[derive(Debug, Clone)]
pub struct GlobalVariable {
    name: String,
    init: Option<Initializer>,
}

impl GlobalVariable {
    /// Creates a global with an optional initializer.
    #[must_use]
    pub fn new(name: impl Into<String>, init: Option<Initializer>) -> Self {
        Self {
            name: name.into(),
            init,
        }
    }

    /// Creates a global holding a string constant.
    #[must_use]
    pub fn with_string(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, Some(Initializer::Str(text.into())))
    }

    /// Returns the global's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the initializer, if any.
    #[must_use]
    pub const fn initializer(&self) -> Option<&Initializer> {
        self.init.as_ref()
    }

    /// Returns the string content if the initializer is a string constant.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.init {
            Some(Initializer::Str(text)) => Some(text),
            _ => None,
        }
    }
}

/// A compilation unit: functions, globals, and the annotation side-table.
#[derive(Debug, Clone, Default)]
pub struct Module {
    name: String,
    functions: Vec<Function>,
    globals: Vec<GlobalVariable>,
    annotations: Option<AnnotationTable>,
}

impl Module {
    /// Creates an empty module.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            globals: Vec::new(),
            annotations: None,
        }
    }

    /// Returns the module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a function and returns its handle.
    pub fn add_function(&mut self, function: Function) -> FuncId {
        let id = FuncId::new(self.functions.len());
        self.functions.push(function);
        id
    }

    /// Returns a function by handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not belong to this module.
    #[must_use]
    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.index()]
    }

    /// Returns a function mutably by handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not belong to this module.
    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    /// Returns the functions in declaration order.
    #[must_use]
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Returns the functions mutably.
    ///
    /// The pipeline uses this to hand disjoint functions to worker threads.
    pub fn functions_mut(&mut self) -> &mut [Function] {
        &mut self.functions
    }

    /// Returns the number of functions.
    #[must_use]
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Returns an iterator over all function handles.
    pub fn function_ids(&self) -> impl Iterator<Item = FuncId> {
        (0..self.functions.len()).map(FuncId::new)
    }

    /// Finds a function by name.
    #[must_use]
    pub fn function_named(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .position(|f| f.name() == name)
            .map(FuncId::new)
    }

    /// Adds a global variable and returns its handle.
    pub fn add_global(&mut self, global: GlobalVariable) -> GlobalId {
        let id = GlobalId::new(self.globals.len());
        self.globals.push(global);
        id
    }

    /// Returns a global by handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not belong to this module.
    #[must_use]
    pub fn global(&self, id: GlobalId) -> &GlobalVariable {
        &self.globals[id.index()]
    }

    /// Returns the globals in declaration order.
    #[must_use]
    pub fn globals(&self) -> &[GlobalVariable] {
        &self.globals
    }

    /// Attaches the annotation side-table.
    pub fn set_annotations(&mut self, table: AnnotationTable) {
        self.annotations = Some(table);
    }

    /// Returns the annotation side-table, if the front end attached one.
    #[must_use]
    pub const fn annotations(&self) -> Option<&AnnotationTable> {
        self.annotations.as_ref()
    }

    /// Checks structural well-formedness of every function.
    ///
    /// # Errors
    ///
    /// Returns the first structural defect found in any function.
    pub fn verify(&self) -> Result<()> {
        for function in &self.functions {
            function.verify()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::function::Linkage;

    #[test]
    fn test_ids_display() {
        assert_eq!(format!("{}", FuncId::new(1)), "@f1");
        assert_eq!(format!("{}", GlobalId::new(4)), "@g4");
    }

    #[test]
    fn test_module_function_lookup() {
        let mut module = Module::new("m");
        let a = module.add_function(Function::declaration("a"));
        let b = module.add_function(Function::new("b", Linkage::Internal));

        assert_eq!(module.function_count(), 2);
        assert_eq!(module.function_named("a"), Some(a));
        assert_eq!(module.function_named("b"), Some(b));
        assert_eq!(module.function_named("c"), None);
        assert_eq!(module.function(a).name(), "a");
    }

    #[test]
    fn test_global_string_initializer() {
        let mut module = Module::new("m");
        let g = module.add_global(GlobalVariable::with_string("anno", "Fla"));
        assert_eq!(module.global(g).as_str(), Some("Fla"));
        assert_eq!(module.global(g).name(), "anno");

        let scalar = module.add_global(GlobalVariable::new(
            "counter",
            Some(Initializer::Scalar(Constant::i32(0))),
        ));
        assert_eq!(module.global(scalar).as_str(), None);
    }

    #[test]
    fn test_annotations_absent_by_default() {
        let module = Module::new("m");
        assert!(module.annotations().is_none());
    }

    #[test]
    fn test_verify_covers_all_functions() {
        let mut module = Module::new("m");
        module.add_function(Function::declaration("ok"));

        let mut broken = Function::new("broken", Linkage::Internal);
        broken.add_block("entry");
        module.add_function(broken);

        assert!(module.verify().is_err());
    }
}
