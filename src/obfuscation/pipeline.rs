//! The normalization pipeline: gate, lower, demote, per function.
//!
//! The pipeline is the embedder-facing driver. It verifies the module,
//! consults the eligibility gate for every function, then normalizes the
//! eligible bodies: constant expressions are lowered first (so the demoter
//! sees only positioned values), stack demotion second. The output is a
//! module whose eligible functions are safe inputs for control-flow
//! rewriting.
//!
//! # Concurrency
//!
//! Eligibility is decided up front against the immutable module (the gate
//! reads the shared annotation table). The transforms themselves touch one
//! function at a time and share nothing, so eligible bodies are processed in
//! parallel with `rayon`; per-function results land in a `DashMap` and
//! diagnostics in the lock-free [`EventLog`].

use std::fmt;

use dashmap::DashMap;
use rayon::prelude::*;

use crate::ir::Module;
use crate::obfuscation::config::ObfuscationConfig;
use crate::obfuscation::demote::normalize_stack_usage;
use crate::obfuscation::eligibility::should_obfuscate;
use crate::obfuscation::events::{Event, EventLog};
use crate::obfuscation::lower::lower_constant_expressions;
use crate::Result;

/// Aggregate counts for one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Functions that passed the gate and were normalized.
    pub functions_processed: usize,
    /// Functions the gate rejected (declarations included).
    pub functions_skipped: usize,
    /// Escaping values demoted to stack slots, summed over all functions.
    pub demoted_values: usize,
    /// Phi nodes demoted to stack slots, summed over all functions.
    pub demoted_phis: usize,
    /// Constant expressions materialized as instructions, summed over all
    /// functions.
    pub lowered_exprs: usize,
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} skipped, {} values demoted, {} phis demoted, {} constexprs lowered",
            self.functions_processed,
            self.functions_skipped,
            self.demoted_values,
            self.demoted_phis,
            self.lowered_exprs
        )
    }
}

/// Runs the full normalization over a module.
///
/// # Examples
///
/// ```rust,ignore
/// use shroud::obfuscation::{ObfuscationConfig, Pipeline};
///
/// let config = ObfuscationConfig::for_feature("fla").with_enabled(true);
/// let pipeline = Pipeline::new(config);
/// let stats = pipeline.run(&mut module)?;
/// println!("shroud: {stats}");
/// ```
#[derive(Debug, Default)]
pub struct Pipeline {
    config: ObfuscationConfig,
    events: EventLog,
}

impl Pipeline {
    /// Creates a pipeline with the given configuration.
    #[must_use]
    pub fn new(config: ObfuscationConfig) -> Self {
        Self {
            config,
            events: EventLog::new(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ObfuscationConfig {
        &self.config
    }

    /// Returns the diagnostic events recorded so far.
    #[must_use]
    pub const fn events(&self) -> &EventLog {
        &self.events
    }

    /// Verifies the module, then normalizes every eligible function.
    ///
    /// Lowering runs before demotion so the demoter never sees an operand
    /// without a position. Ineligible functions are left byte-for-byte
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns the first structural defect if the module fails verification;
    /// nothing is mutated in that case.
    pub fn run(&self, module: &mut Module) -> Result<PipelineStats> {
        module.verify()?;

        let eligible: Vec<bool> = module
            .function_ids()
            .map(|id| {
                should_obfuscate(
                    self.config.enabled,
                    module,
                    id,
                    &self.config.feature,
                    &self.config,
                    &self.events,
                )
            })
            .collect();

        let results: DashMap<usize, (usize, usize, usize)> = DashMap::new();
        module
            .functions_mut()
            .par_iter_mut()
            .enumerate()
            .filter(|(index, _)| eligible[*index])
            .for_each(|(index, func)| {
                let lowered = lower_constant_expressions(func);
                let demoted = normalize_stack_usage(func);
                self.events.record(Event::FunctionProcessed {
                    function: func.name().to_string(),
                    demoted_values: demoted.values,
                    demoted_phis: demoted.phis,
                    lowered_exprs: lowered,
                });
                results.insert(index, (demoted.values, demoted.phis, lowered));
            });

        let mut stats = PipelineStats {
            functions_processed: results.len(),
            functions_skipped: eligible.iter().filter(|e| !**e).count(),
            ..PipelineStats::default()
        };
        for entry in results.iter() {
            let (values, phis, lowered) = *entry.value();
            stats.demoted_values += values;
            stats.demoted_phis += phis;
            stats.lowered_exprs += lowered;
        }
        Ok(stats)
    }
}
