//! Normalization passes that prepare functions for control-flow rewriting.
//!
//! This module hosts the transformation side of the crate: deciding which
//! functions to touch and rewriting the eligible ones into a shape the
//! obfuscation transforms can safely tear apart.
//!
//! # Architecture
//!
//! - [`config`] - The explicit [`ObfuscationConfig`] the embedder constructs
//! - [`eligibility`] - The [`should_obfuscate`] gate over annotations, name
//!   tokens and the global flag
//! - [`lower`] - Constant-expression lowering, worklist and per-block
//! - [`demote`] - Stack demotion of escaping values and phi nodes
//! - [`events`] - The lock-free diagnostic [`EventLog`]
//! - [`pipeline`] - The [`Pipeline`] driver tying it all together
//!
//! # Usage
//!
//! ```rust,ignore
//! use shroud::obfuscation::{ObfuscationConfig, Pipeline};
//!
//! let config = ObfuscationConfig::for_feature("fla").with_enabled(true);
//! let stats = Pipeline::new(config).run(&mut module)?;
//! ```

pub mod config;
pub mod demote;
pub mod eligibility;
pub mod events;
pub mod lower;
pub mod pipeline;

// Re-export primary types at module level
pub use config::ObfuscationConfig;
pub use demote::{normalize_stack_usage, DemotionStats};
pub use eligibility::should_obfuscate;
pub use events::{Event, EventLog};
pub use lower::{
    lower_block_constant_expressions, lower_constant_expressions,
    lower_function_constant_expressions,
};
pub use pipeline::{Pipeline, PipelineStats};
