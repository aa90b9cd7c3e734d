use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use domain::common::error::DomainError;
use ports::secondary::prober_port::ProbeOutcome;
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence};

const PING_PAYLOAD: [u8; 56] = [0; 56];

/// ICMP echo prober backed by one `surge-ping` client per address family.
///
/// Client creation opens the ICMP sockets; a family whose socket could
/// not be opened reports every probe as down.
pub struct PingProber {
    v4: Option<Client>,
    v6: Option<Client>,
    ident: AtomicU16,
}

impl PingProber {
    /// Must be called from within a tokio runtime.
    pub fn new() -> Result<Self, DomainError> {
        let v4 = Client::new(&Config::default())
            .inspect_err(|e| tracing::warn!(error = %e, "ICMPv4 ping socket unavailable"))
            .ok();
        let v6 = Client::new(&Config::builder().kind(ICMP::V6).build())
            .inspect_err(|e| tracing::warn!(error = %e, "ICMPv6 ping socket unavailable"))
            .ok();
        if v4.is_none() && v6.is_none() {
            return Err(DomainError::EngineError(
                "no ICMP socket could be opened".to_string(),
            ));
        }
        Ok(Self {
            v4,
            v6,
            ident: AtomicU16::new(u16::try_from(std::process::id() & 0xffff).unwrap_or(0)),
        })
    }

    pub async fn probe(&self, host: IpAddr, timeout: Duration) -> ProbeOutcome {
        let client = match host {
            IpAddr::V4(_) => self.v4.as_ref(),
            IpAddr::V6(_) => self.v6.as_ref(),
        };
        let Some(client) = client else {
            return ProbeOutcome::Down {
                reason: format!("no ICMP socket for {host}"),
            };
        };

        let ident = self.ident.fetch_add(1, Ordering::Relaxed);
        let mut pinger = client.pinger(host, PingIdentifier(ident)).await;
        pinger.timeout(timeout);
        match pinger.ping(PingSequence(0), &PING_PAYLOAD).await {
            Ok((_, rtt)) => ProbeOutcome::Up { rtt: Some(rtt) },
            Err(e) => ProbeOutcome::Down {
                reason: format!("ping {host}: {e}"),
            },
        }
    }
}
