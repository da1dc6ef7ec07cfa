pub mod browser;
pub mod clock;
pub mod config;
pub mod error;
pub mod random;
pub mod server;
pub mod suite;

//  Re-export commonly used items
pub use browser::{BrowserSession, ChromeDriver, ConnectionMode, TimeKeeperPage};
pub use config::{BrowserOptions, ServerConfig, SuiteConfig, PORT_ENV};
pub use error::{BrowserError, LifecycleError, RetryTimeout, ScenarioError, SetupPhase};
pub use server::{
    acquire_port, await_ready, launch_server, retry, start_server, ServerHandle, ServerState,
    TerminateOutcome,
};
pub use suite::{RunOptions, Scenario, ScenarioOutcome, ScenarioStatus, Suite, SuiteReport};
