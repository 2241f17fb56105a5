//! Configuration for the normalization pipeline.
//!
//! Everything the passes need to know from the embedder travels in one
//! explicit configuration struct, constructed once and threaded by reference
//! into every component that needs it. There is no process-wide state to
//! initialize and nothing to reset between modules.

/// Configuration for the normalization pipeline and eligibility gate.
///
/// # Examples
///
/// ```rust,ignore
/// use shroud::obfuscation::ObfuscationConfig;
///
/// let config = ObfuscationConfig::for_feature("fla")
///     .with_name_matching(true);
/// ```
#[derive(Debug, Clone)]
pub struct ObfuscationConfig {
    /// The feature name the eligibility gate matches annotations and
    /// function-name tokens against (e.g. `"fla"` for flattening).
    pub feature: String,

    /// The global on/off flag consulted when neither annotations nor name
    /// tokens decide (default: `false`).
    pub enabled: bool,

    /// Match eligibility against underscore-delimited tokens in the function
    /// name, for front ends that cannot attach annotations (default: `false`).
    pub match_function_names: bool,
}

impl ObfuscationConfig {
    /// Creates a configuration for the given feature name with every switch
    /// at its default.
    #[must_use]
    pub fn for_feature(feature: impl Into<String>) -> Self {
        Self {
            feature: feature.into(),
            enabled: false,
            match_function_names: false,
        }
    }

    /// Sets the global on/off flag.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Enables or disables function-name token matching.
    #[must_use]
    pub fn with_name_matching(mut self, matching: bool) -> Self {
        self.match_function_names = matching;
        self
    }

    /// Returns the negated feature name (`"no"` + feature).
    ///
    /// The gate must check this *before* the positive name: the positive
    /// feature name is always a substring of the negated one.
    #[must_use]
    pub fn negated_feature(&self) -> String {
        format!("no{}", self.feature)
    }
}

impl Default for ObfuscationConfig {
    fn default() -> Self {
        Self::for_feature("")
    }
}
