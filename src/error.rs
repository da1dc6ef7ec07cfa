use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to connect to Chrome: {0}")]
    ConnectionFailed(String),

    #[error("Failed to launch Chrome: {0}")]
    LaunchFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Script execution failed: {0}")]
    ScriptFailed(String),

    #[error("CDP error: {0}")]
    CdpError(#[from] chromiumoxide::error::CdpError),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, BrowserError>;

/// Setup phase a lifecycle failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupPhase {
    PortSearch,
    Spawn,
    Readiness,
    Teardown,
}

impl fmt::Display for SetupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SetupPhase::PortSearch => "port search",
            SetupPhase::Spawn => "spawn",
            SetupPhase::Readiness => "readiness",
            SetupPhase::Teardown => "teardown",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("No available ports found starting from {start} ({attempts} probed)")]
    NoPortAvailable { start: u16, attempts: u16 },

    #[error("Failed to launch server with `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server did not start at {url} within {} seconds", .timeout.as_secs())]
    ServerNotReady { url: String, timeout: Duration },

    #[error("Failed to stop server process group {pid}: {source}")]
    TerminationFailure {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Readiness browser failed: {0}")]
    Browser(#[from] BrowserError),
}

impl LifecycleError {
    pub fn phase(&self) -> SetupPhase {
        match self {
            LifecycleError::NoPortAvailable { .. } => SetupPhase::PortSearch,
            LifecycleError::SpawnFailed { .. } => SetupPhase::Spawn,
            LifecycleError::ServerNotReady { .. } | LifecycleError::Browser(_) => {
                SetupPhase::Readiness
            }
            LifecycleError::TerminationFailure { .. } => SetupPhase::Teardown,
        }
    }
}

/// A bounded retry ran out of time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("gave up after {attempts} attempt(s) in {elapsed:?}")]
pub struct RetryTimeout {
    pub attempts: u32,
    pub elapsed: Duration,
}

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("{what}: expected {expected}, got {actual}")]
    Assertion {
        what: String,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("Clock error: {0}")]
    Clock(String),
}

impl ScenarioError {
    pub fn is_assertion(&self) -> bool {
        matches!(self, ScenarioError::Assertion { .. })
    }
}

pub type ScenarioResult<T = ()> = std::result::Result<T, ScenarioError>;
