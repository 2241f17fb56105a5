//! Analyses consumed by the normalization passes.
//!
//! Currently a single analysis lives here: [`value_escapes`], the pure
//! predicate that decides whether an instruction's result can stay a
//! block-local virtual register once the block graph is rewritten.

pub mod escape;

pub use escape::value_escapes;
