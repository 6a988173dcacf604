//! Diagnostics collected by integrity checks and imports.
//!
//! Topology and time series checks do not abort on the first problem. They
//! record every finding in a [`Diagnostics`] collection, log it through
//! `tracing`, and leave it to the caller to decide whether to continue.
//!
//! # Example
//!
//! ```
//! use gridplan_core::diagnostics::{Diagnostics, Severity};
//!
//! let mut diag = Diagnostics::new();
//! diag.add_warning("isolated", "The following buses are isolated: Bus_1.");
//! diag.add_error_with_entity("reference", "Load references unknown bus", "Load_1");
//!
//! assert_eq!(diag.warning_count(), 1);
//! assert_eq!(diag.error_count(), 1);
//! assert!(diag.contains("buses are isolated"));
//! ```

use serde::Serialize;

/// Severity level for diagnostic issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Suspicious data, analysis can still run
    Warning,
    /// Inconsistent data, analysis results would be meaningless
    Error,
}

/// A single finding of an integrity check
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    /// Category for grouping (e.g. "duplicate", "reference", "isolated", "line_length")
    pub category: String,
    pub message: String,
    /// Component the finding refers to, if it refers to exactly one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl DiagnosticIssue {
    pub fn new(
        severity: Severity,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            entity: None,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };

        write!(f, "[{}:{}] {}", severity, self.category, self.message)?;

        if let Some(entity) = &self.entity {
            write!(f, " ({})", entity)?;
        }

        Ok(())
    }
}

/// Collection of diagnostic issues for one check run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: DiagnosticIssue) {
        self.issues.push(issue);
    }

    /// Add a warning and emit it through `tracing`.
    pub fn add_warning(&mut self, category: &str, message: &str) {
        tracing::warn!("{}", message);
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message));
    }

    pub fn add_warning_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        tracing::warn!("{}", message);
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message).with_entity(entity));
    }

    /// Add an error and emit it through `tracing`.
    pub fn add_error(&mut self, category: &str, message: &str) {
        tracing::error!("{}", message);
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, category, message));
    }

    pub fn add_error_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        tracing::error!("{}", message);
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, category, message).with_entity(entity));
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    /// True if any issue message contains `fragment`.
    pub fn contains(&self, fragment: &str) -> bool {
        self.issues.iter().any(|i| i.message.contains(fragment))
    }

    pub fn issues_by_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }

    pub fn merge(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }

    pub fn summary(&self) -> String {
        let warnings = self.warning_count();
        let errors = self.error_count();

        match (warnings, errors) {
            (0, 0) => "No issues".to_string(),
            (w, 0) => format!("{} warning{}", w, if w == 1 { "" } else { "s" }),
            (0, e) => format!("{} error{}", e, if e == 1 { "" } else { "s" }),
            (w, e) => format!(
                "{} warning{}, {} error{}",
                w,
                if w == 1 { "" } else { "s" },
                e,
                if e == 1 { "" } else { "s" }
            ),
        }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Diagnostics: {}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }
        Ok(())
    }
}

/// Element counts reported after a topology import.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportStats {
    pub buses: usize,
    pub lines: usize,
    pub transformers: usize,
    pub loads: usize,
    pub generators: usize,
    pub storage_units: usize,
    pub switches: usize,
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} buses, {} lines, {} transformers, {} loads, {} generators, {} storage units, {} switches",
            self.buses,
            self.lines,
            self.transformers,
            self.loads,
            self.generators,
            self.storage_units,
            self.switches
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_counts() {
        let mut diag = Diagnostics::new();
        diag.add_warning("line_length", "There are lines with very large line lengths");
        diag.add_error("reference", "The following loads have buses which are not defined");

        assert_eq!(diag.warning_count(), 1);
        assert_eq!(diag.error_count(), 1);
        assert!(diag.has_errors());
    }

    #[test]
    fn test_diagnostics_serialization() {
        let mut diag = Diagnostics::new();
        diag.add_error_with_entity("duplicate", "duplicate entry", "Line_1");

        let json = serde_json::to_string_pretty(&diag).unwrap();
        assert!(json.contains("\"error\""));
        assert!(json.contains("\"entity\": \"Line_1\""));
    }

    #[test]
    fn test_diagnostics_summary() {
        let mut diag = Diagnostics::new();
        assert_eq!(diag.summary(), "No issues");

        diag.add_warning("isolated", "warning");
        assert_eq!(diag.summary(), "1 warning");

        diag.add_error("reference", "error");
        diag.add_warning("isolated", "another warning");
        assert_eq!(diag.summary(), "2 warnings, 1 error");
    }

    #[test]
    fn test_issues_by_category_and_contains() {
        let mut diag = Diagnostics::new();
        diag.add_warning("isolated", "The following buses are isolated: Bus_7.");
        diag.add_warning("impedance", "Very small values for impedance of lines");

        assert_eq!(diag.issues_by_category("isolated").count(), 1);
        assert!(diag.contains("Bus_7"));
        assert!(!diag.contains("Bus_8"));
    }
}
