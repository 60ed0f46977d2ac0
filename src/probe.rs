//! Endpoint reachability probing.

use async_trait::async_trait;
use log::debug;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time;

/// Checks whether an endpoint accepts connections.
#[async_trait]
pub trait Prober: Send + Sync {
    /// `true` only if a connection to `addr` is established within `timeout`.
    async fn probe(&self, addr: SocketAddr, timeout: Duration) -> bool;
}

/// `Prober` making a single TCP connection attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProber;

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, addr: SocketAddr, timeout: Duration) -> bool {
        match time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!("Probe of {} failed: {}", addr, e);
                false
            }
            Err(_) => {
                debug!("Probe of {} timed out after {:?}", addr, timeout);
                false
            }
        }
    }
}
