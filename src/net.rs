//! Local port allocation.

use std::net::{Ipv4Addr, SocketAddr, TcpListener};

use tracing::debug;

use crate::error::{Error, Result};

/// Finds currently unbound TCP ports on the local host.
///
/// The port is free when `allocate` returns, nothing more: another process can
/// take it before the caller binds. Callers treat a later bind failure as
/// retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortAllocator {
    ip: Ipv4Addr,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self {
            ip: Ipv4Addr::LOCALHOST,
        }
    }
}

impl PortAllocator {
    /// Allocator probing the loopback interface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator probing a specific interface.
    pub fn on(ip: Ipv4Addr) -> Self {
        Self { ip }
    }

    /// Allocator probing the interface a node will bind for `host`.
    ///
    /// Host names and IPv6 literals fall back to loopback.
    pub fn for_host(host: &str) -> Self {
        host.parse().map(Self::on).unwrap_or_default()
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    /// Bind port 0, read back the port the OS picked, release it.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the interface cannot be bound at all.
    pub fn allocate(&self) -> Result<u16> {
        let listener = TcpListener::bind(SocketAddr::from((self.ip, 0)))
            .map_err(|e| Error::io(format!("binding {}:0", self.ip), e))?;
        let port = listener
            .local_addr()
            .map_err(|e| Error::io("reading allocated port", e))?
            .port();
        drop(listener);

        debug!(port, "Allocated free port");
        Ok(port)
    }

    /// True when `port` can be bound on this allocator's interface right now.
    pub fn is_free(&self, port: u16) -> bool {
        TcpListener::bind(SocketAddr::from((self.ip, port))).is_ok()
    }
}
