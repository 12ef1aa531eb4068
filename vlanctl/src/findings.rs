//! Problems found while compiling a plan.
//!
//! A finding never aborts compilation. Each one names the entity that caused
//! it and is logged through `tracing` as soon as it is recorded.

use std::fmt::{self, Display, Formatter};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanFinding {
    pub severity: FindingSeverity,
    pub code: String,
    /// Id of the network, port forward or reservation the finding belongs to.
    pub entity: String,
    pub message: String,
}

impl Display for PlanFinding {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            FindingSeverity::Warning => "warning",
            FindingSeverity::Info => "info",
        };
        write!(f, "{level} [{}] {}: {}", self.code, self.entity, self.message)
    }
}

/// Collector shared by the compiler stages.
#[derive(Debug, Default)]
pub struct Findings {
    items: Vec<PlanFinding>,
}

impl Findings {
    pub fn warn(&mut self, entity: &str, code: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(entity, code, "{message}");
        self.items.push(PlanFinding {
            severity: FindingSeverity::Warning,
            code: code.to_string(),
            entity: entity.to_string(),
            message,
        });
    }

    pub fn info(&mut self, entity: &str, code: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(entity, code, "{message}");
        self.items.push(PlanFinding {
            severity: FindingSeverity::Info,
            code: code.to_string(),
            entity: entity.to_string(),
            message,
        });
    }

    pub fn into_vec(self) -> Vec<PlanFinding> {
        self.items
    }
}

/// Number of warnings in `findings`.
pub fn warning_count(findings: &[PlanFinding]) -> usize {
    findings
        .iter()
        .filter(|f| f.severity == FindingSeverity::Warning)
        .count()
}
