//! Process shutdown flag

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Clonable shutdown flag shared by the accept loop and every session
///
/// The accept loop blocks in `accept`, so triggering also opens a
/// throwaway connection to the listener to wake it up.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    triggered: Arc<AtomicBool>,
    wake_addr: Option<SocketAddr>,
}

impl ShutdownSignal {
    /// A signal not attached to any listener
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal that wakes the listener bound at `addr`
    pub fn for_listener(addr: SocketAddr) -> Self {
        Self {
            triggered: Arc::new(AtomicBool::new(false)),
            wake_addr: Some(connectable(addr)),
        }
    }

    /// Whether shutdown has been requested
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Request shutdown. Only the first call wakes the listener.
    pub fn trigger(&self) {
        if self.triggered.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(target: "tally::server", "Shutdown requested");
        if let Some(addr) = self.wake_addr {
            if let Err(e) = TcpStream::connect_timeout(&addr, Duration::from_secs(1)) {
                debug!(target: "tally::server", error = %e, "Wake-up connection failed");
            }
        }
    }
}

/// A wildcard bind address cannot be connected to; use loopback instead
fn connectable(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_is_shared_by_clones() {
        let signal = ShutdownSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_triggered());
        signal.trigger();
        assert!(clone.is_triggered());
        signal.trigger();
        assert!(signal.is_triggered());
    }

    #[test]
    fn test_wildcard_wakes_loopback() {
        let addr: SocketAddr = "0.0.0.0:4000".parse().unwrap();
        assert_eq!(connectable(addr), "127.0.0.1:4000".parse().unwrap());
        let addr: SocketAddr = "10.0.0.1:4000".parse().unwrap();
        assert_eq!(connectable(addr), addr);
    }
}
