use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use domain::healthcheck::entity::ProbeType;
use ports::secondary::prober_port::{ProbeOutcome, ProbeRequest, ProberPort};

use super::connect::{probe_sctp, probe_tcp, probe_udp};
use super::http_probe::HttpProber;
use super::ping::PingProber;

/// `ProberPort` implementation dispatching on the probe type of each
/// endpoint host.
pub struct Prober {
    ping: Option<PingProber>,
    http: HttpProber,
}

impl Prober {
    pub fn new(ping: Option<PingProber>, http: HttpProber) -> Self {
        Self { ping, http }
    }

    async fn run(&self, req: &ProbeRequest) -> ProbeOutcome {
        let addr = SocketAddr::new(req.host(), req.port());
        match req.probe_type() {
            ProbeType::None => ProbeOutcome::Up { rtt: None },
            ProbeType::Ping => match &self.ping {
                Some(p) => p.probe(req.host(), req.timeout).await,
                None => ProbeOutcome::Down {
                    reason: "ping prober unavailable".to_string(),
                },
            },
            ProbeType::Tcp => probe_tcp(addr, req.timeout).await,
            ProbeType::Udp => probe_udp(addr, &req.request, &req.response, req.timeout).await,
            ProbeType::Sctp => probe_sctp(addr, req.timeout).await,
            ProbeType::Http => {
                self.http
                    .probe("http", addr, &req.request, &req.response)
                    .await
            }
            ProbeType::Https => {
                self.http
                    .probe("https", addr, &req.request, &req.response)
                    .await
            }
        }
    }
}

impl ProberPort for Prober {
    fn probe<'a>(
        &'a self,
        req: &'a ProbeRequest,
    ) -> Pin<Box<dyn Future<Output = ProbeOutcome> + Send + 'a>> {
        Box::pin(async move {
            let out = self.run(req).await;
            if let ProbeOutcome::Down { reason } = &out {
                tracing::debug!(host = %req.key, %reason, "probe failed");
            }
            out
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::http_probe::ProbeTlsConfig;
    use domain::healthcheck::entity::EpHostKey;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn prober() -> Prober {
        let http = HttpProber::new(&ProbeTlsConfig::default(), Duration::from_secs(1)).unwrap();
        Prober::new(None, http)
    }

    fn request(key: EpHostKey) -> ProbeRequest {
        ProbeRequest {
            key,
            request: String::new(),
            response: String::new(),
            timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn none_probe_is_always_up() {
        let req = request(EpHostKey::new("192.0.2.1".parse().unwrap(), ProbeType::None, 0));
        assert!(prober().probe(&req).await.is_up());
    }

    #[tokio::test]
    async fn ping_without_socket_is_down() {
        let req = request(EpHostKey::new("127.0.0.1".parse().unwrap(), ProbeType::Ping, 0));
        let out = prober().probe(&req).await;
        assert_eq!(out.as_str(), "down");
    }

    #[tokio::test]
    async fn tcp_dispatch() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let req = request(EpHostKey::new("127.0.0.1".parse().unwrap(), ProbeType::Tcp, port));
        assert!(prober().probe(&req).await.is_up());
    }
}
