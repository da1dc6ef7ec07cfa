use crate::error::LifecycleError;
use std::net::{Ipv4Addr, TcpListener};

/// Number of consecutive ports probed before giving up.
pub const PORT_WINDOW: u16 = 10;

/// Find the lowest bindable port in `start..start + PORT_WINDOW` on all interfaces.
pub fn acquire_port(start: u16) -> Result<u16, LifecycleError> {
    acquire_port_on(Ipv4Addr::UNSPECIFIED, start)
}

/// Same as [`acquire_port`] but probing a specific host address.
///
/// Each candidate is bound with a transient listener that is dropped
/// immediately, so the port is free again when this returns.
pub fn acquire_port_on(host: Ipv4Addr, start: u16) -> Result<u16, LifecycleError> {
    let mut attempts = 0u16;

    for port in (start..=u16::MAX).take(PORT_WINDOW as usize) {
        attempts += 1;
        match TcpListener::bind((host, port)) {
            Ok(listener) => {
                drop(listener);
                log::debug!("Port {} is available", port);
                return Ok(port);
            }
            Err(e) => log::debug!("Port {} unavailable: {}", port, e),
        }
    }

    Err(LifecycleError::NoPortAvailable { start, attempts })
}
