//! Ephemeral port allocation

use crate::error::{DevServeError, Result};
use std::net::{Ipv4Addr, TcpListener};

/// Ask the OS for a free TCP port.
///
/// The probe socket is released before returning, so the port is only known
/// to be free at the instant of allocation. Another process may claim it
/// before the service binds.
pub fn allocate_free_port() -> Result<u16> {
    let listener =
        TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(DevServeError::PortAllocation)?;
    let port = listener
        .local_addr()
        .map_err(DevServeError::PortAllocation)?
        .port();
    Ok(port)
}
