use std::net::IpAddr;

use domain::common::error::DomainError;

/// Secondary port for attaching VIPs in a cloud provider.
pub trait CloudHookPort: Send + Sync {
    /// Attach (`add`) or detach a private address, optionally mapped to
    /// an external one.
    fn update_private_ip(
        &self,
        vip: IpAddr,
        external: Option<IpAddr>,
        add: bool,
    ) -> Result<(), DomainError>;

    /// Prepare (`up`) or tear down cloud networking on role changes.
    fn prepare_network(&self, up: bool) -> Result<(), DomainError>;
}
