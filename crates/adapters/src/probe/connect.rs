use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};

use ports::secondary::prober_port::ProbeOutcome;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpStream, UdpSocket};

const IPPROTO_SCTP: i32 = 132;

fn down(reason: impl Into<String>) -> ProbeOutcome {
    ProbeOutcome::Down {
        reason: reason.into(),
    }
}

/// TCP connect probe: up once the handshake completes within `timeout`.
pub async fn probe_tcp(addr: SocketAddr, timeout: Duration) -> ProbeOutcome {
    let start = Instant::now();
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => ProbeOutcome::Up {
            rtt: Some(start.elapsed()),
        },
        Ok(Err(e)) => down(format!("connect {addr}: {e}")),
        Err(_) => down(format!("connect {addr}: timed out")),
    }
}

/// UDP probe.
///
/// Sends `request` (a single zero byte when empty) and waits for a reply.
/// An ICMP port-unreachable surfaces as `ConnectionRefused` on the
/// connected socket and marks the host down. Silence until `timeout` is
/// treated as up. When `response` is set, a reply must match it.
pub async fn probe_udp(
    addr: SocketAddr,
    request: &str,
    response: &str,
    timeout: Duration,
) -> ProbeOutcome {
    let local: SocketAddr = match addr.ip() {
        IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = match UdpSocket::bind(local).await {
        Ok(s) => s,
        Err(e) => return down(format!("udp bind: {e}")),
    };
    if let Err(e) = socket.connect(addr).await {
        return down(format!("udp connect {addr}: {e}"));
    }

    let payload: &[u8] = if request.is_empty() {
        &[0]
    } else {
        request.as_bytes()
    };
    let start = Instant::now();
    if let Err(e) = socket.send(payload).await {
        return down(format!("udp send {addr}: {e}"));
    }

    let mut buf = vec![0u8; 2048];
    match tokio::time::timeout(timeout, socket.recv(&mut buf)).await {
        Ok(Ok(n)) => {
            if response.is_empty() || &buf[..n] == response.as_bytes() {
                ProbeOutcome::Up {
                    rtt: Some(start.elapsed()),
                }
            } else {
                down(format!("udp {addr}: unexpected reply"))
            }
        }
        Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
            down(format!("udp {addr}: port unreachable"))
        }
        Ok(Err(e)) => down(format!("udp recv {addr}: {e}")),
        Err(_) if response.is_empty() => ProbeOutcome::Up { rtt: None },
        Err(_) => down(format!("udp {addr}: no reply")),
    }
}

/// SCTP association probe over a kernel SCTP stream socket.
pub async fn probe_sctp(addr: SocketAddr, timeout: Duration) -> ProbeOutcome {
    let start = Instant::now();
    let joined = tokio::task::spawn_blocking(move || {
        let socket = Socket::new(
            Domain::for_address(addr),
            Type::STREAM,
            Some(Protocol::from(IPPROTO_SCTP)),
        )?;
        socket.connect_timeout(&addr.into(), timeout)
    })
    .await;

    match joined {
        Ok(Ok(())) => ProbeOutcome::Up {
            rtt: Some(start.elapsed()),
        },
        Ok(Err(e)) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
            down(format!("sctp {addr}: timed out"))
        }
        Ok(Err(e)) => down(format!("sctp {addr}: {e}")),
        Err(e) => down(format!("sctp {addr}: probe task failed: {e}")),
    }
}
