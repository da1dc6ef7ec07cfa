//! Run configuration shared by the binary and the tests.

use crate::browser::chrome::ConnectionMode;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable carrying the resolved server port from setup to the scenarios.
pub const PORT_ENV: &str = "TEST_SERVER_PORT";

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SERVER_COMMAND: &str = "npm run dev";
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// How browsers are launched for readiness probing and scenarios
#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    pub chrome_path: Option<String>,
    pub headless: bool,
    pub no_sandbox: bool,
    /// Attach to a Chrome already listening on this remote debugging port
    pub debug_port: Option<u16>,
}

impl BrowserOptions {
    /// Headless, sandbox disabled. What CI and the test suite use.
    pub fn headless() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            no_sandbox: true,
            debug_port: None,
        }
    }

    /// CI environments force headless mode and disable the sandbox.
    pub fn detect_ci(mut self) -> Self {
        if is_ci() {
            self.headless = true;
            self.no_sandbox = true;
        }
        self
    }

    pub fn connection_mode(&self) -> ConnectionMode {
        if let Some(port) = self.debug_port {
            return ConnectionMode::DebugPort(port);
        }
        ConnectionMode::Sandboxed {
            chrome_path: self.chrome_path.clone(),
            no_sandbox: self.no_sandbox,
            headless: self.headless,
        }
    }
}

pub fn is_ci() -> bool {
    ["CI", "GITHUB_ACTIONS", "GITLAB_CI", "JENKINS_HOME", "CIRCLECI"]
        .iter()
        .any(|var| std::env::var(var).is_ok())
}

/// Everything the lifecycle manager needs to bring the application up
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port_start: u16,
    pub command: String,
    pub cwd: PathBuf,
    pub ready_timeout: Duration,
    pub browser: BrowserOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port_start: DEFAULT_PORT,
            command: DEFAULT_SERVER_COMMAND.to_string(),
            cwd: PathBuf::from("."),
            ready_timeout: DEFAULT_READY_TIMEOUT,
            browser: BrowserOptions::headless(),
        }
    }
}

/// Where the scenarios point their browser
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    pub base_url: String,
    pub browser: BrowserOptions,
}

impl SuiteConfig {
    pub fn new(base_url: impl Into<String>, browser: BrowserOptions) -> Self {
        Self {
            base_url: base_url.into(),
            browser,
        }
    }

    /// Resolve the base URL from `TEST_SERVER_PORT`, falling back to port 3000.
    pub fn from_env(browser: BrowserOptions) -> Self {
        let port = port_from_env(std::env::var(PORT_ENV).ok().as_deref());
        Self::new(format!("http://localhost:{}", port), browser)
    }
}

fn port_from_env(value: Option<&str>) -> u16 {
    match value.map(str::trim) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            log::warn!(
                "Ignoring invalid {}='{}', using {}",
                PORT_ENV,
                raw,
                DEFAULT_PORT
            );
            DEFAULT_PORT
        }),
        None => DEFAULT_PORT,
    }
}
