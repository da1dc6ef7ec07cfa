//! Scenario outcomes and the run summary.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

/// Status of a scenario run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    Skipped,
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    /// Scenario title
    pub name: String,

    /// Tags such as `@bug`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Issue tracking the known defect this scenario encodes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub known_defect: Option<String>,

    pub status: ScenarioStatus,

    /// How long the scenario took
    pub duration: Duration,

    /// Failure message, expected vs. actual for assertion failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Complete report of a suite run
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_duration: Duration,
    pub outcomes: Vec<ScenarioOutcome>,
}

impl SuiteReport {
    pub fn new() -> Self {
        Self {
            total: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
            total_duration: Duration::ZERO,
            outcomes: Vec::new(),
        }
    }

    pub fn add_outcome(&mut self, outcome: ScenarioOutcome) {
        match outcome.status {
            ScenarioStatus::Passed => self.passed += 1,
            ScenarioStatus::Failed => self.failed += 1,
            ScenarioStatus::Skipped => self.skipped += 1,
        }
        self.total += 1;
        self.total_duration += outcome.duration;
        self.outcomes.push(outcome);
    }

    /// True when nothing failed. Skipped scenarios do not count against the run.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Percentage of executed (non-skipped) scenarios that passed
    pub fn success_rate(&self) -> f64 {
        let executed = self.passed + self.failed;
        if executed == 0 {
            return 0.0;
        }
        (self.passed as f64 / executed as f64) * 100.0
    }

    pub fn failures(&self) -> impl Iterator<Item = &ScenarioOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == ScenarioStatus::Failed)
    }

    pub fn outcome(&self, name: &str) -> Option<&ScenarioOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    /// Human-readable summary, one line per scenario
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for outcome in &self.outcomes {
            let mark = match outcome.status {
                ScenarioStatus::Passed => "✓",
                ScenarioStatus::Failed => "✘",
                ScenarioStatus::Skipped => "-",
            };
            let _ = write!(
                out,
                "  {} {} ({:.1}s)",
                mark,
                outcome.name,
                outcome.duration.as_secs_f64()
            );
            if let Some(issue) = &outcome.known_defect {
                let _ = write!(out, " [known defect: {}]", issue);
            }
            out.push('\n');
            if let Some(error) = &outcome.error {
                let _ = writeln!(out, "      {}", error);
            }
        }
        let _ = writeln!(
            out,
            "\n  {} passed, {} failed, {} skipped, {:.0}% pass rate ({:.1}s)",
            self.passed,
            self.failed,
            self.skipped,
            self.success_rate(),
            self.total_duration.as_secs_f64()
        );
        out
    }

    /// Save this report as pretty JSON
    pub async fn to_file(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

impl Default for SuiteReport {
    fn default() -> Self {
        Self::new()
    }
}
