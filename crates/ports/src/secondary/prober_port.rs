use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::time::Duration;

use domain::healthcheck::entity::{EpHostKey, ProbeType};

/// Everything a prober needs to check one endpoint host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub key: EpHostKey,
    pub request: String,
    pub response: String,
    pub timeout: Duration,
}

impl ProbeRequest {
    pub fn host(&self) -> IpAddr {
        self.key.host
    }

    pub fn probe_type(&self) -> ProbeType {
        self.key.probe_type
    }

    pub fn port(&self) -> u16 {
        self.key.port
    }
}

/// Result of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Up { rtt: Option<Duration> },
    Down { reason: String },
}

impl ProbeOutcome {
    pub fn is_up(&self) -> bool {
        matches!(self, Self::Up { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up { .. } => "up",
            Self::Down { .. } => "down",
        }
    }
}

/// Secondary port performing liveness probes.
///
/// Uses `Pin<Box<dyn Future>>` so the trait stays dyn-compatible and can
/// be shared as `Arc<dyn ProberPort>` across checker workers.
pub trait ProberPort: Send + Sync {
    fn probe<'a>(
        &'a self,
        req: &'a ProbeRequest,
    ) -> Pin<Box<dyn Future<Output = ProbeOutcome> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysUp;
    impl ProberPort for AlwaysUp {
        fn probe<'a>(
            &'a self,
            _req: &'a ProbeRequest,
        ) -> Pin<Box<dyn Future<Output = ProbeOutcome> + Send + 'a>> {
            Box::pin(async { ProbeOutcome::Up { rtt: None } })
        }
    }

    #[tokio::test]
    async fn prober_port_is_dyn_compatible() {
        let prober: Box<dyn ProberPort> = Box::new(AlwaysUp);
        let req = ProbeRequest {
            key: EpHostKey::new("10.0.0.1".parse().unwrap(), ProbeType::Tcp, 80),
            request: String::new(),
            response: String::new(),
            timeout: Duration::from_secs(1),
        };
        let out = prober.probe(&req).await;
        assert!(out.is_up());
        assert_eq!(req.port(), 80);
    }
}
