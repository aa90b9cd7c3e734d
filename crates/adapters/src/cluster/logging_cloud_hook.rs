use std::net::IpAddr;

use domain::common::error::DomainError;
use ports::secondary::cloud_hook_port::CloudHookPort;
use tracing::info;

/// Cloud hook for on-premise deployments: records the calls and does
/// nothing else.
pub struct LoggingCloudHook;

impl CloudHookPort for LoggingCloudHook {
    fn update_private_ip(
        &self,
        vip: IpAddr,
        external: Option<IpAddr>,
        add: bool,
    ) -> Result<(), DomainError> {
        let external = external.map(|e| e.to_string()).unwrap_or_default();
        info!(%vip, %external, add, "cloud private IP update");
        Ok(())
    }

    fn prepare_network(&self, up: bool) -> Result<(), DomainError> {
        info!(up, "cloud network prepare");
        Ok(())
    }
}
