//! Scenario runner.
//!
//! One browser serves the whole run. Scenarios that do not need isolation
//! share a single page opened at suite start; timezone-sensitive scenarios
//! open their own context and close it when they finish.

pub mod expect;
pub mod report;
pub mod scenarios;

pub use report::{ScenarioOutcome, ScenarioStatus, SuiteReport};

use crate::browser::chrome::ChromeDriver;
use crate::browser::context::BrowserSession;
use crate::browser::time_keeper::TimeKeeperPage;
use crate::config::SuiteConfig;
use crate::error::{Result, ScenarioResult};
use chromiumoxide::page::Page;
use futures::future::LocalBoxFuture;
use std::time::Instant;

pub type ScenarioFuture<'a> = LocalBoxFuture<'a, ScenarioResult>;

type ScenarioBody = Box<dyn for<'a> Fn(&'a Suite) -> ScenarioFuture<'a>>;

/// A named, independently runnable check against the application
pub struct Scenario {
    name: String,
    tags: Vec<&'static str>,
    known_defect: Option<&'static str>,
    body: ScenarioBody,
}

impl Scenario {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: for<'a> Fn(&'a Suite) -> ScenarioFuture<'a> + 'static,
    {
        Self {
            name: name.into(),
            tags: Vec::new(),
            known_defect: None,
            body: Box::new(body),
        }
    }

    /// Mark the scenario as encoding a known, intentionally unfixed defect.
    pub fn known_defect(mut self, issue: &'static str) -> Self {
        self.tags.push("@bug");
        self.known_defect = Some(issue);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &[&'static str] {
        &self.tags
    }

    pub fn issue(&self) -> Option<&'static str> {
        self.known_defect
    }

    pub fn is_known_defect(&self) -> bool {
        self.known_defect.is_some()
    }
}

/// Which scenarios of a catalogue to run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Only scenarios whose name contains this substring
    pub filter: Option<String>,
    /// Report known-defect scenarios as skipped instead of running them
    pub skip_known_defects: bool,
}

impl RunOptions {
    fn selects(&self, scenario: &Scenario) -> bool {
        self.filter
            .as_deref()
            .map_or(true, |needle| scenario.name().contains(needle))
    }
}

pub struct Suite {
    driver: ChromeDriver,
    base_url: String,
    shared: Page,
}

impl Suite {
    /// Launch the browser and open the shared page
    pub async fn open(config: &SuiteConfig) -> Result<Self> {
        let driver = ChromeDriver::new(config.browser.connection_mode()).await?;
        let shared = match driver.new_page().await {
            Ok(page) => page,
            Err(e) => {
                let _ = driver.close().await;
                return Err(e);
            }
        };

        Ok(Self {
            driver,
            base_url: config.base_url.clone(),
            shared,
        })
    }

    /// Page object over the shared page
    pub fn shared_page(&self) -> TimeKeeperPage {
        TimeKeeperPage::new(self.shared.clone(), self.base_url.clone())
    }

    /// Fresh context whose clock runs in `zone`
    pub async fn pinned(&self, zone: &str) -> Result<BrowserSession<'_>> {
        log::info!("Set default {} timezone", zone);
        self.driver.new_context(Some(zone)).await
    }

    /// Page object over a session's page
    pub fn time_keeper(&self, session: &BrowserSession<'_>) -> TimeKeeperPage {
        TimeKeeperPage::new(session.page().clone(), self.base_url.clone())
    }

    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioOutcome {
        log::info!("Running: {}", scenario.name());
        let start = Instant::now();
        let result = (scenario.body)(self).await;
        let duration = start.elapsed();

        let (status, error) = match result {
            Ok(()) => {
                log::info!("Passed: {} ({:?})", scenario.name(), duration);
                (ScenarioStatus::Passed, None)
            }
            Err(e) => {
                log::error!("Failed: {}: {}", scenario.name(), e);
                (ScenarioStatus::Failed, Some(e.to_string()))
            }
        };

        ScenarioOutcome {
            name: scenario.name().to_string(),
            tags: scenario.tags().iter().map(|t| t.to_string()).collect(),
            known_defect: scenario.issue().map(str::to_string),
            status,
            duration,
            error,
        }
    }

    /// Run the selected scenarios one after another. A failure never stops the rest.
    pub async fn run(&self, scenarios: &[Scenario], options: &RunOptions) -> SuiteReport {
        let mut report = SuiteReport::new();

        for scenario in scenarios.iter().filter(|s| options.selects(s)) {
            let outcome = if options.skip_known_defects && scenario.is_known_defect() {
                log::info!("Skipping known defect: {}", scenario.name());
                ScenarioOutcome {
                    name: scenario.name().to_string(),
                    tags: scenario.tags().iter().map(|t| t.to_string()).collect(),
                    known_defect: scenario.issue().map(str::to_string),
                    status: ScenarioStatus::Skipped,
                    duration: std::time::Duration::ZERO,
                    error: None,
                }
            } else {
                self.run_scenario(scenario).await
            };
            report.add_outcome(outcome);
        }

        report
    }

    /// Close the shared page and the browser
    pub async fn close(self) -> Result<()> {
        if let Err(e) = self.shared.clone().close().await {
            log::debug!("Closing shared page failed: {}", e);
        }
        self.driver.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScenarioError;
    use futures::FutureExt;

    fn noop(name: &str) -> Scenario {
        Scenario::new(name, |_suite: &Suite| {
            async { Ok::<(), ScenarioError>(()) }.boxed_local()
        })
    }

    #[test]
    fn known_defect_adds_bug_tag() {
        let scenario = noop("should be sorted").known_defect("https://example.test/issues/3");
        assert!(scenario.is_known_defect());
        assert_eq!(scenario.tags(), ["@bug"]);
        assert_eq!(scenario.issue(), Some("https://example.test/issues/3"));
    }

    #[test]
    fn filter_matches_name_substring() {
        let options = RunOptions {
            filter: Some("timezone".to_string()),
            skip_known_defects: false,
        };
        assert!(options.selects(&noop("should add a new timezone")));
        assert!(!options.selects(&noop("should display title")));
        assert!(RunOptions::default().selects(&noop("anything")));
    }
}
