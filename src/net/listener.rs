//! TCP listener creation.
//!
//! # Responsibilities
//! - Normalize configured addresses
//! - Bind listeners, preferring IPv4 when a name resolves to both families
//! - Duplicate caller-supplied listeners so the caller keeps its handle
//! - Derive the loopback endpoint gateways dial

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, ToSocketAddrs};
use thiserror::Error;

/// Address used when none is configured.
pub const DEFAULT_ADDRESS: &str = "localhost:0";

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Address did not resolve.
    #[error("failed to resolve {address}: {source}")]
    Resolve {
        address: String,
        #[source]
        source: io::Error,
    },
    /// Failed to bind to address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
}

/// `""` means [`DEFAULT_ADDRESS`], `":port"` means every interface.
pub fn normalize_address(address: &str) -> String {
    if address.is_empty() {
        DEFAULT_ADDRESS.to_string()
    } else if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_string()
    }
}

/// Bind a non-blocking listener on `address`.
pub fn create_listener(address: &str) -> Result<TcpListener, ListenerError> {
    let normalized = normalize_address(address);
    let mut candidates: Vec<SocketAddr> = normalized
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            address: normalized.clone(),
            source,
        })?
        .collect();
    if candidates.is_empty() {
        return Err(ListenerError::Resolve {
            address: normalized,
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses found"),
        });
    }
    candidates.sort_by_key(|addr| addr.is_ipv6());

    let bind_error = |source| ListenerError::Bind {
        address: normalized.clone(),
        source,
    };
    let listener = TcpListener::bind(&candidates[..]).map_err(bind_error)?;
    listener.set_nonblocking(true).map_err(bind_error)?;

    if let Ok(local) = listener.local_addr() {
        tracing::info!(address = %local, requested = %normalized, "Listener bound");
    }
    Ok(listener)
}

/// Independent handle on an already bound listener.
pub fn duplicate(listener: &TcpListener) -> io::Result<TcpListener> {
    let listener = listener.try_clone()?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

pub fn extract_port(addr: &SocketAddr) -> u16 {
    addr.port()
}

/// Endpoint a local client should dial to reach a listener bound at `addr`.
pub fn dial_endpoint(addr: SocketAddr) -> String {
    let ip = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, addr.port()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_addresses() {
        assert_eq!(normalize_address(""), "localhost:0");
        assert_eq!(normalize_address(":8080"), "0.0.0.0:8080");
        assert_eq!(normalize_address("127.0.0.1:9"), "127.0.0.1:9");
    }

    #[test]
    fn default_address_binds_random_loopback_port() {
        let listener = create_listener("").unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(extract_port(&addr), 0);
    }

    #[test]
    fn bind_conflict_is_reported() {
        let first = create_listener("127.0.0.1:0").unwrap();
        let taken = first.local_addr().unwrap().to_string();
        let err = create_listener(&taken).unwrap_err();
        assert!(matches!(err, ListenerError::Bind { .. }));
    }

    #[test]
    fn unresolvable_address_is_reported() {
        assert!(matches!(
            create_listener("no-port-here").unwrap_err(),
            ListenerError::Resolve { .. }
        ));
    }

    #[test]
    fn duplicate_shares_the_socket() {
        let listener = create_listener("127.0.0.1:0").unwrap();
        let copy = duplicate(&listener).unwrap();
        assert_eq!(listener.local_addr().unwrap(), copy.local_addr().unwrap());
    }

    #[test]
    fn dial_endpoint_replaces_unspecified() {
        assert_eq!(dial_endpoint("0.0.0.0:80".parse().unwrap()), "127.0.0.1:80");
        assert_eq!(dial_endpoint("[::]:80".parse().unwrap()), "[::1]:80");
        assert_eq!(dial_endpoint("10.0.0.1:80".parse().unwrap()), "10.0.0.1:80");
    }
}
