//! Append-only event log for pipeline diagnostics.
//!
//! Passes record what they did here instead of returning ad-hoc statistics.
//! The log is lock-free and append-only (`boxcar::Vec`), so worker threads
//! processing disjoint functions can record events concurrently without
//! coordination.

use std::fmt;

/// One diagnostic event recorded during normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The eligibility gate matched an underscore-delimited token in a
    /// function name.
    NameMatch {
        /// The function whose name matched
        function: String,
        /// The matched token (feature or negated feature)
        token: String,
        /// `true` if the match opts the function in, `false` if it opts out
        enabled: bool,
    },

    /// A function body was normalized.
    FunctionProcessed {
        /// The function that was processed
        function: String,
        /// Escaping values demoted to stack slots
        demoted_values: usize,
        /// Phi nodes demoted to stack slots
        demoted_phis: usize,
        /// Constant expressions lowered to instructions
        lowered_exprs: usize,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::NameMatch {
                function,
                token,
                enabled,
            } => {
                let verdict = if *enabled { "enables" } else { "disables" };
                write!(f, "{token}.function: {function} ({verdict})")
            }
            Event::FunctionProcessed {
                function,
                demoted_values,
                demoted_phis,
                lowered_exprs,
            } => write!(
                f,
                "{function}: {demoted_values} values demoted, {demoted_phis} phis demoted, {lowered_exprs} constexprs lowered"
            ),
        }
    }
}

/// A thread-safe, append-only log of [`Event`]s.
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Appends an event. Takes `&self`; safe to call from worker threads.
    pub fn record(&self, event: Event) {
        self.events.push(event);
    }

    /// Returns the number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates the recorded events in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, event)| event)
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
