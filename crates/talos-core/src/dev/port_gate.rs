//! Local port occupancy checks.

use std::fmt::Write;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::{TcpSocket, TcpStream};
use tokio::time::timeout;
use tracing::debug;

use super::service::Service;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConflict {
    pub key: String,
    pub port: u16,
}

/// Whether anything holds `port` on localhost.
///
/// A connect to `127.0.0.1` or `::1` that succeeds, or a failed bind to
/// `127.0.0.1` with `SO_REUSEADDR` that reports `EADDRINUSE`, counts as
/// occupied.
pub async fn is_port_in_use(port: u16, probe_timeout: Duration) -> bool {
    for ip in [IpAddr::V4(Ipv4Addr::LOCALHOST), IpAddr::V6(Ipv6Addr::LOCALHOST)] {
        let addr = SocketAddr::new(ip, port);
        if let Ok(Ok(_)) = timeout(probe_timeout, TcpStream::connect(addr)).await {
            debug!(port, %ip, "Port accepts connections");
            return true;
        }
    }
    !can_bind(port)
}

fn can_bind(port: u16) -> bool {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
    let Ok(socket) = TcpSocket::new_v4() else {
        return true;
    };
    if socket.set_reuseaddr(true).is_err() {
        return true;
    }
    match socket.bind(addr) {
        Ok(()) => true,
        Err(e) => {
            debug!(port, error = %e, "Bind check failed");
            !bind_error_means_occupied(&e)
        }
    }
}

/// Only `EADDRINUSE` says someone holds the port; other bind failures
/// (privileged ports, sandbox denials) say nothing about occupancy.
fn bind_error_means_occupied(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::AddrInUse
}

/// Every service whose primary port is taken, in the given order.
pub async fn find_conflicts<'a, I>(services: I, probe_timeout: Duration) -> Vec<PortConflict>
where
    I: IntoIterator<Item = &'a Service>,
{
    let mut conflicts = Vec::new();
    for service in services {
        let Some(port) = service.primary_port else {
            continue;
        };
        if is_port_in_use(port, probe_timeout).await {
            conflicts.push(PortConflict {
                key: service.key.clone(),
                port,
            });
        }
    }
    conflicts
}

/// Conflict table with the remediation hint.
pub fn format_conflicts(conflicts: &[PortConflict]) -> String {
    let width = conflicts.iter().map(|c| c.key.len()).max().unwrap_or(0);
    let mut out = String::from("Port conflicts detected:\n");
    for c in conflicts {
        let _ = writeln!(out, "  {:<width$} → {}", c.key, c.port);
    }
    out.push_str("Free the ports with `talos ports kill` and try again.");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE: Duration = Duration::from_millis(250);

    #[tokio::test]
    async fn bound_listener_is_detected() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(is_port_in_use(port, PROBE).await);
    }

    #[tokio::test]
    async fn conflicts_only_for_services_with_ports() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut foo = Service::for_test("foo", &[]);
        foo.primary_port = Some(port);
        let bar = Service::for_test("bar", &[]);

        let conflicts = find_conflicts([&foo, &bar], PROBE).await;
        assert_eq!(
            conflicts,
            vec![PortConflict {
                key: "foo".to_string(),
                port
            }]
        );
        assert!(format_conflicts(&conflicts).contains("foo → "));
    }

    #[test]
    fn only_addr_in_use_counts_as_occupied() {
        assert!(bind_error_means_occupied(&io::Error::from(io::ErrorKind::AddrInUse)));
        assert!(!bind_error_means_occupied(&io::Error::from(
            io::ErrorKind::PermissionDenied
        )));
        assert!(!bind_error_means_occupied(&io::Error::from_raw_os_error(libc::EACCES)));
    }

    #[tokio::test]
    async fn free_port_can_be_bound() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(can_bind(port));
    }
}
