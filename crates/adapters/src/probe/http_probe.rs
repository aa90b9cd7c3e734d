use std::net::SocketAddr;
use std::path::Path;
use std::time::{Duration, Instant};

use domain::common::error::DomainError;
use ports::secondary::prober_port::ProbeOutcome;

/// TLS material for HTTPS probes.
#[derive(Debug, Clone, Default)]
pub struct ProbeTlsConfig {
    pub client_cert_path: Option<String>,
    pub client_key_path: Option<String>,
    pub ca_path: Option<String>,
}

/// HTTP/HTTPS GET prober.
///
/// A probe is up when the endpoint answers 200 and, if an expected
/// response is configured, the body equals it.
pub struct HttpProber {
    client: reqwest::Client,
}

fn read_pem(path: &str) -> Result<Vec<u8>, DomainError> {
    std::fs::read(Path::new(path))
        .map_err(|e| DomainError::InvalidConfig(format!("cannot read '{path}': {e}")))
}

impl HttpProber {
    pub fn new(tls: &ProbeTlsConfig, timeout: Duration) -> Result<Self, DomainError> {
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(5))
            .user_agent(concat!("lbplane-agent/", env!("CARGO_PKG_VERSION")));

        if let (Some(cert), Some(key)) = (&tls.client_cert_path, &tls.client_key_path) {
            let mut pem = read_pem(cert)?;
            pem.extend_from_slice(&read_pem(key)?);
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| DomainError::InvalidConfig(format!("client identity: {e}")))?;
            builder = builder.identity(identity);
        }
        if let Some(ca) = &tls.ca_path {
            let cert = reqwest::Certificate::from_pem(&read_pem(ca)?)
                .map_err(|e| DomainError::InvalidConfig(format!("CA certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| DomainError::EngineError(format!("HTTP probe client init failed: {e}")))?;
        Ok(Self { client })
    }

    pub async fn probe(
        &self,
        scheme: &str,
        addr: SocketAddr,
        request: &str,
        response: &str,
    ) -> ProbeOutcome {
        let url = probe_url(scheme, addr, request);
        let start = Instant::now();

        let resp = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                return ProbeOutcome::Down {
                    reason: format!("GET {url}: {e}"),
                };
            }
        };
        if resp.status() != reqwest::StatusCode::OK {
            return ProbeOutcome::Down {
                reason: format!("GET {url}: HTTP {}", resp.status()),
            };
        }
        let rtt = start.elapsed();

        if response.is_empty() {
            return ProbeOutcome::Up { rtt: Some(rtt) };
        }
        match resp.text().await {
            Ok(body) if body == response => ProbeOutcome::Up { rtt: Some(rtt) },
            Ok(_) => ProbeOutcome::Down {
                reason: format!("GET {url}: unexpected body"),
            },
            Err(e) => ProbeOutcome::Down {
                reason: format!("GET {url}: body read failed: {e}"),
            },
        }
    }
}

/// `scheme://host:port/request`, with the request path made absolute.
pub fn probe_url(scheme: &str, addr: SocketAddr, request: &str) -> String {
    let path = request.trim_start_matches('/');
    format!("{scheme}://{addr}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(status: &'static str, body: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await.unwrap();
            let reply = format!(
                "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(reply.as_bytes()).await.unwrap();
        });
        addr
    }

    fn prober() -> HttpProber {
        HttpProber::new(&ProbeTlsConfig::default(), Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn url_building() {
        let v4: SocketAddr = "10.0.0.1:8080".parse().unwrap();
        assert_eq!(probe_url("http", v4, "health"), "http://10.0.0.1:8080/health");
        assert_eq!(probe_url("http", v4, "/health"), "http://10.0.0.1:8080/health");
        let v6: SocketAddr = "[2001:db8::1]:443".parse().unwrap();
        assert_eq!(probe_url("https", v6, ""), "https://[2001:db8::1]:443/");
    }

    #[test]
    fn missing_ca_file_is_config_error() {
        let tls = ProbeTlsConfig {
            ca_path: Some("/nonexistent/ca.pem".to_string()),
            ..ProbeTlsConfig::default()
        };
        assert!(matches!(
            HttpProber::new(&tls, Duration::from_secs(1)),
            Err(DomainError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn ok_status_is_up() {
        let addr = serve_once("200 OK", "fine").await;
        assert!(prober().probe("http", addr, "/", "").await.is_up());
    }

    #[tokio::test]
    async fn body_must_match_when_expected() {
        let addr = serve_once("200 OK", "fine").await;
        assert!(prober().probe("http", addr, "/", "fine").await.is_up());
        let addr = serve_once("200 OK", "degraded").await;
        assert!(!prober().probe("http", addr, "/", "fine").await.is_up());
    }

    #[tokio::test]
    async fn error_status_is_down() {
        let addr = serve_once("503 Service Unavailable", "").await;
        assert!(!prober().probe("http", addr, "/", "").await.is_up());
    }
}
