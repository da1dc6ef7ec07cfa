//! Brings the application-under-test up before the scenarios and down after.

pub mod port;
pub mod process;
pub mod ready;
pub mod retry;

pub use port::{acquire_port, acquire_port_on, PORT_WINDOW};
pub use process::{launch_server, ServerHandle, ServerState, TerminateOutcome};
pub use ready::await_ready;
pub use retry::retry;

use crate::config::ServerConfig;
use crate::error::LifecycleError;

/// Find a port, start the server on it, and wait until it serves pages.
///
/// The resolved port travels on the returned handle. If readiness fails or
/// the returned future is dropped midway, the handle goes out of scope and
/// the process group is stopped.
pub async fn start_server(config: &ServerConfig) -> Result<ServerHandle, LifecycleError> {
    log::info!("Searching for a free port from {}...", config.port_start);
    let port = acquire_port(config.port_start)?;

    log::info!("Starting development server...");
    let server = launch_server(&config.command, &config.cwd, port)?;

    log::info!("Waiting for server to be ready...");
    await_ready(&server.url(), config.ready_timeout, &config.browser).await?;
    server.mark_ready();
    log::info!("Server is ready at {}", server.url());
    Ok(server)
}
