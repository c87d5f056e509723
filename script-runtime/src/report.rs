//! Per-run outcome report
//!
//! A run never aborts because of a single unit. Instead every unit gets an
//! outcome and every problem becomes a [`Diagnostic`], which is also sent to
//! the `log` facade as soon as it is recorded.

use std::fmt;

use crate::{context::SandboxId, unit::UnitId};

/// Phase of a run a unit was processed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Class units, establishing shared definitions
    Class,
    /// Script units
    Script,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Class => write!(f, "class"),
            Phase::Script => write!(f, "script"),
        }
    }
}

/// What happened to one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitOutcome {
    /// The entry point ran to completion
    Executed,
    /// A class unit that could not be resolved yet
    SkippedPending,
    /// The host predicate declined the unit, or its kind did not fit the phase
    SkippedByPredicate,
    /// A class unit registered as a script
    Misconfigured,
    /// Loading or executing the unit failed
    Failed,
}

/// Diagnostic severity, mapped onto `log` levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Expected conditions worth tracing
    Debug,
    /// Progress information
    Info,
    /// Suspicious but harmless
    Warn,
    /// A unit did not do its job
    Error,
}

impl Severity {
    fn level(self) -> log::Level {
        match self {
            Severity::Debug => log::Level::Debug,
            Severity::Info => log::Level::Info,
            Severity::Warn => log::Level::Warn,
            Severity::Error => log::Level::Error,
        }
    }
}

/// One reportable problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Unit the problem belongs to, if any
    pub unit: Option<UnitId>,
    /// Human readable description
    pub message: String,
}

/// Outcome of one unit in one phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRecord {
    /// The unit
    pub unit: UnitId,
    /// Phase it was processed in
    pub phase: Phase,
    /// What happened
    pub outcome: UnitOutcome,
}

/// Everything that happened during a run
#[derive(Debug, Clone)]
pub struct RunReport {
    sandbox: SandboxId,
    records: Vec<UnitRecord>,
    diagnostics: Vec<Diagnostic>,
}

impl RunReport {
    /// Creates an empty report for `sandbox`
    pub fn new(sandbox: SandboxId) -> Self {
        Self {
            sandbox,
            records: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Sandbox that produced the report
    pub fn sandbox(&self) -> SandboxId {
        self.sandbox
    }

    /// Records the outcome of a unit
    pub fn record(&mut self, unit: &UnitId, phase: Phase, outcome: UnitOutcome) {
        self.records.push(UnitRecord {
            unit: unit.clone(),
            phase,
            outcome,
        });
    }

    /// Records a diagnostic and logs it at the matching level
    pub fn diagnose(&mut self, severity: Severity, unit: Option<&UnitId>, message: impl Into<String>) {
        let message = message.into();
        match unit {
            Some(unit) => log::log!(severity.level(), "[sandbox {}] {}: {}", self.sandbox, unit, message),
            None => log::log!(severity.level(), "[sandbox {}] {}", self.sandbox, message),
        }
        self.diagnostics.push(Diagnostic {
            severity,
            unit: unit.cloned(),
            message,
        });
    }

    /// Unit outcomes in processing order
    pub fn records(&self) -> &[UnitRecord] {
        &self.records
    }

    /// Diagnostics in the order they were raised
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Last recorded outcome for `unit`
    pub fn outcome_of(&self, unit: &UnitId) -> Option<UnitOutcome> {
        self.records
            .iter()
            .rev()
            .find(|record| &record.unit == unit)
            .map(|record| record.outcome)
    }

    /// Executed units in execution order
    pub fn executed(&self) -> Vec<&UnitId> {
        self.records
            .iter()
            .filter(|record| record.outcome == UnitOutcome::Executed)
            .map(|record| &record.unit)
            .collect()
    }

    /// Number of units with the given outcome
    pub fn count(&self, outcome: UnitOutcome) -> usize {
        self.records.iter().filter(|record| record.outcome == outcome).count()
    }

    /// Whether any error diagnostic was raised
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|diagnostic| diagnostic.severity == Severity::Error)
    }

    /// Logs a one-line summary at info level
    pub fn log_summary(&self) {
        log::info!(
            "[sandbox {}] run finished: {} executed, {} pending, {} skipped, {} misconfigured, {} failed",
            self.sandbox,
            self.count(UnitOutcome::Executed),
            self.count(UnitOutcome::SkippedPending),
            self.count(UnitOutcome::SkippedByPredicate),
            self.count(UnitOutcome::Misconfigured),
            self.count(UnitOutcome::Failed),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_of_returns_last_record() {
        let mut report = RunReport::new(SandboxId::next());
        let unit = UnitId::new("classes/util.lua");
        report.record(&unit, Phase::Class, UnitOutcome::SkippedPending);
        report.record(&unit, Phase::Script, UnitOutcome::Misconfigured);

        assert_eq!(report.outcome_of(&unit), Some(UnitOutcome::Misconfigured));
        assert_eq!(report.outcome_of(&UnitId::new("other.lua")), None);
    }

    #[test]
    fn test_counts_and_errors() {
        let mut report = RunReport::new(SandboxId::next());
        let a = UnitId::new("a.lua");
        let b = UnitId::new("b.lua");
        report.record(&a, Phase::Script, UnitOutcome::Executed);
        report.record(&b, Phase::Script, UnitOutcome::Failed);
        assert!(!report.has_errors());

        report.diagnose(Severity::Warn, None, "slow unit");
        assert!(!report.has_errors());
        report.diagnose(Severity::Error, Some(&b), "boom");

        assert!(report.has_errors());
        assert_eq!(report.executed(), vec![&a]);
        assert_eq!(report.count(UnitOutcome::Failed), 1);
        assert_eq!(report.diagnostics()[1].unit.as_ref(), Some(&b));
    }
}
