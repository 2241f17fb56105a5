// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![deny(unsafe_code)]

//! # shroud
//!
//! An IR normalization toolkit for control-flow obfuscation.
//!
//! Control-flow transforms - flattening, bogus branches, block splitting -
//! rewrite the block graph underneath the values flowing through it. Run on
//! an arbitrary function they break two things: values consumed outside
//! their defining block (the dominance they rely on disappears) and
//! constant expressions (deferred computations with no position that can be
//! relocated). `shroud` rewrites eligible functions into a shape those
//! transforms can safely tear apart, and decides *which* functions are
//! eligible in the first place. The transforms themselves live elsewhere;
//! this crate is the preparation layer.
//!
//! ## Features
//!
//! - **Eligibility gating** - Per-function opt-in/opt-out via front-end
//!   annotations, underscore-delimited name tokens, or a global flag
//! - **Stack demotion** - Escaping values and phi nodes rewritten through
//!   explicit stack slots so no value crosses a block boundary in a register
//! - **Constant-expression lowering** - Every deferred constant computation
//!   materialized as a positioned instruction, worklist or per-block
//! - **Parallel driver** - Eligible functions normalized concurrently with
//!   per-function diagnostics in a lock-free event log
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shroud::prelude::*;
//!
//! let config = ObfuscationConfig::for_feature("fla").with_enabled(true);
//! let pipeline = Pipeline::new(config);
//! let stats = pipeline.run(&mut module)?;
//! println!("shroud: {stats}");
//! # Ok::<(), shroud::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Recoverable problems - a malformed module handed in by an embedder - are
//! reported through [`Result`] before anything is mutated:
//!
//! ```rust,ignore
//! use shroud::{Error, ir::Module};
//!
//! match module.verify() {
//!     Ok(()) => println!("module is well-formed"),
//!     Err(Error::MissingTerminator { function, block }) => {
//!         eprintln!("unterminated block {block} in '{function}'");
//!     }
//!     Err(e) => eprintln!("malformed module: {e}"),
//! }
//! ```
//!
//! Contract violations inside the passes (an entry block with predecessors,
//! an empty block) indicate IR corrupted by an earlier pass and abort via
//! assertion instead; there is no recovery that produces a meaningful
//! function.

mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,ignore
/// use shroud::prelude::*;
///
/// let stats = Pipeline::new(ObfuscationConfig::for_feature("fla")).run(&mut module)?;
/// ```
pub mod prelude;

/// The in-memory IR: types, constants, instructions, blocks, functions,
/// modules, and the annotation side-table.
///
/// Functions own their instructions in a flat arena and hand out opaque
/// [`ir::InstrId`] handles, so passes can insert and detach instructions
/// while iterating snapshots without invalidating anything.
pub mod ir;

/// Pure analyses over the IR.
///
/// Currently the escape analysis ([`analysis::value_escapes`]) the stack
/// demoter is built on.
pub mod analysis;

/// The normalization passes and their driver.
///
/// Eligibility gating, constant-expression lowering, stack demotion, and the
/// parallel [`obfuscation::Pipeline`] that runs them over a module.
pub mod obfuscation;

/// `shroud` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is
/// always [`Error`]. Used consistently throughout the crate for all fallible
/// operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `shroud` Error type
///
/// The main error type for all operations in this crate, covering the
/// structural defects module verification can report.
pub use error::Error;
