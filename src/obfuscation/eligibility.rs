//! The eligibility gate: which functions get obfuscated at all.
//!
//! Four channels feed the decision, consulted in a fixed order where the
//! first match wins:
//!
//! 1. Structural rejection - declarations and `available_externally` bodies
//!    have nothing worth transforming.
//! 2. Annotations, negative before positive - `"no<feature>"` must be
//!    checked before `"<feature>"` because the positive name is a substring
//!    of the negated one ("fla" matches inside "nofla").
//! 3. Function-name tokens - a fallback for front ends that cannot attach
//!    annotations; only consulted when enabled in the configuration, and
//!    again negative before positive.
//! 4. The caller-supplied global flag.

use crate::ir::{read_annotation, FuncId, Module};
use crate::obfuscation::config::ObfuscationConfig;
use crate::obfuscation::events::{Event, EventLog};

/// Decides whether a function should be obfuscated.
///
/// `flag` is the global on/off default used when nothing more specific
/// matches. Name-token matches record a [`Event::NameMatch`] and print one
/// informational line; every other channel is silent.
///
/// # Examples
///
/// ```rust,ignore
/// use shroud::obfuscation::{should_obfuscate, EventLog, ObfuscationConfig};
///
/// let config = ObfuscationConfig::for_feature("fla").with_name_matching(true);
/// let events = EventLog::new();
/// if should_obfuscate(true, &module, func, "fla", &config, &events) {
///     // run the transforms
/// }
/// ```
#[must_use]
pub fn should_obfuscate(
    flag: bool,
    module: &Module,
    func: FuncId,
    feature: &str,
    config: &ObfuscationConfig,
    events: &EventLog,
) -> bool {
    let function = module.function(func);

    if function.is_declaration() {
        return false;
    }
    if function.linkage().is_available_externally() {
        return false;
    }

    let negated = format!("no{feature}");
    let annotation = read_annotation(module, func);
    // The negative check must come first: `feature` is a substring of
    // `negated`, so the positive check would also match opted-out functions.
    if annotation.contains(&negated) {
        return false;
    }
    if annotation.contains(feature) {
        return true;
    }

    if config.match_function_names {
        let name = function.name();
        if name.contains(&format!("_{negated}_")) {
            report_name_match(events, name, &negated, false);
            return false;
        }
        if name.contains(&format!("_{feature}_")) {
            report_name_match(events, name, feature, true);
            return true;
        }
    }

    flag
}

fn report_name_match(events: &EventLog, function: &str, token: &str, enabled: bool) {
    let event = Event::NameMatch {
        function: function.to_string(),
        token: token.to_string(),
        enabled,
    };
    println!("shroud: {event}");
    events.record(event);
}
