//! Loopback port probing for LookinServer discovery.
//!
//! LookinServer binds one port out of a small well-known range on the
//! simulator loopback interface. Discovery is a concurrent sweep of TCP
//! connect attempts; a port counts as alive the moment the connect
//! succeeds. Probes never send bytes.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::ops::RangeInclusive;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinSet;

/// Ports LookinServer may listen on, lowest first.
pub const PORT_RANGE: RangeInclusive<u16> = 47164..=47169;

/// Default per-attempt connect timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Probe a single port; `Some(port)` when a connect succeeds within the
/// timeout. The accepted socket is dropped immediately.
async fn probe(port: u16, timeout: Duration) -> Option<u16> {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => Some(port),
        Ok(Err(e)) => {
            tracing::trace!(port, error = %e, "probe refused");
            None
        }
        Err(_) => {
            tracing::trace!(port, "probe timed out");
            None
        }
    }
}

/// Return the first port in `ports` that accepts a TCP connection.
///
/// All attempts run concurrently; the first success wins and the remaining
/// attempts are aborted. Returns `None` when every attempt fails or times
/// out.
pub async fn find_first<I>(ports: I, timeout: Duration) -> Option<u16>
where
    I: IntoIterator<Item = u16>,
{
    let mut set = JoinSet::new();
    for port in ports {
        set.spawn(probe(port, timeout));
    }

    while let Some(joined) = set.join_next().await {
        if let Ok(Some(port)) = joined {
            set.abort_all();
            tracing::debug!(port, "LookinServer found");
            return Some(port);
        }
    }
    None
}

/// Return every port in `ports` that accepts a TCP connection, sorted
/// ascending. Waits for all attempts to complete.
pub async fn find_all<I>(ports: I, timeout: Duration) -> Vec<u16>
where
    I: IntoIterator<Item = u16>,
{
    let attempts = ports.into_iter().map(|port| probe(port, timeout));
    let mut alive: Vec<u16> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .flatten()
        .collect();
    alive.sort_unstable();
    alive
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn ephemeral_listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn test_find_first_hits_single_listener() {
        let (_listener, port) = ephemeral_listener().await;

        // Surround the live port with ports that are almost certainly dead.
        let candidates = vec![1, port, 2];
        let found = find_first(candidates, Duration::from_millis(500)).await;
        assert_eq!(found, Some(port));
    }

    #[tokio::test]
    async fn test_find_first_none_when_all_dead() {
        let found = find_first(vec![1, 2, 3], Duration::from_millis(300)).await;
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_find_all_returns_sorted() {
        let (_l1, p1) = ephemeral_listener().await;
        let (_l2, p2) = ephemeral_listener().await;

        let candidates = vec![p2, 1, p1];
        let alive = find_all(candidates, Duration::from_millis(500)).await;

        let mut expected = vec![p1, p2];
        expected.sort_unstable();
        assert_eq!(alive, expected);
    }

    #[tokio::test]
    async fn test_find_all_empty_when_no_listener() {
        let alive = find_all(vec![1, 2], Duration::from_millis(300)).await;
        assert!(alive.is_empty());
    }

    #[test]
    fn test_port_range_constant() {
        let ports: Vec<u16> = PORT_RANGE.collect();
        assert_eq!(ports, vec![47164, 47165, 47166, 47167, 47168, 47169]);
    }
}
