use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use domain::common::error::DomainError;
use domain::vip::entity::{ClusterRole, VipEntry, vip_interface_name};
use domain::vip::error::VipError;
use ports::secondary::cloud_hook_port::CloudHookPort;
use ports::secondary::cluster_port::ClusterPort;
use ports::secondary::metrics_port::MetricsPort;
use ports::secondary::netstack_port::NetstackPort;

/// Default bound on a gratuitous announcement.
pub const DEFAULT_ANNOUNCE_TIMEOUT: Duration = Duration::from_millis(300);

/// Reference-counted VIP claims and their advertisement according to the
/// cluster role.
pub struct VipManager {
    vips: BTreeMap<IpAddr, VipEntry>,
    netstack: Arc<dyn NetstackPort>,
    cluster: Arc<dyn ClusterPort>,
    cloud: Option<Arc<dyn CloudHookPort>>,
    metrics: Arc<dyn MetricsPort>,
    instance: String,
    announce_timeout: Duration,
}

impl VipManager {
    pub fn new(
        netstack: Arc<dyn NetstackPort>,
        cluster: Arc<dyn ClusterPort>,
        metrics: Arc<dyn MetricsPort>,
        instance: String,
    ) -> Self {
        Self {
            vips: BTreeMap::new(),
            netstack,
            cluster,
            cloud: None,
            metrics,
            instance,
            announce_timeout: DEFAULT_ANNOUNCE_TIMEOUT,
        }
    }

    pub fn set_cloud_hook(&mut self, cloud: Arc<dyn CloudHookPort>) {
        self.cloud = Some(cloud);
    }

    pub fn set_announce_timeout(&mut self, timeout: Duration) {
        self.announce_timeout = timeout;
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn role(&self) -> ClusterRole {
        self.cluster.role(&self.instance)
    }

    pub fn cluster_vip(&self) -> Option<IpAddr> {
        self.cluster.cluster_vip(&self.instance)
    }

    /// Take a reference on `vip`, advertising `advertised` on the first.
    pub fn add_rule_vip(&mut self, vip: IpAddr, advertised: IpAddr) {
        let entry = self
            .vips
            .entry(vip)
            .or_insert_with(|| VipEntry::new(vip, advertised));
        if entry.acquire() {
            let advertised = entry.advertised;
            tracing::info!(vip = %vip, advertised = %advertised, "rule VIP claimed");
            self.advertise(advertised, vip);
        }
        self.metrics.set_vips_claimed(self.vips.len() as u64);
    }

    /// Drop a reference on `vip`, releasing it on the last.
    pub fn delete_rule_vip(&mut self, vip: IpAddr) -> Result<(), DomainError> {
        let entry = self
            .vips
            .get_mut(&vip)
            .ok_or(VipError::NotFound { vip: vip.to_string() })?;
        if !entry.release() {
            return Ok(());
        }
        let advertised = entry.advertised;
        self.vips.remove(&vip);
        self.release(advertised, vip);
        self.metrics.set_vips_claimed(self.vips.len() as u64);
        tracing::info!(vip = %vip, "rule VIP released");
        Ok(())
    }

    pub fn is_rule_vip(&self, ip: IpAddr) -> bool {
        self.vips.contains_key(&ip)
    }

    pub fn get(&self, vip: IpAddr) -> Option<&VipEntry> {
        self.vips.get(&vip)
    }

    pub fn entries(&self) -> impl Iterator<Item = &VipEntry> {
        self.vips.values()
    }

    pub fn len(&self) -> usize {
        self.vips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vips.is_empty()
    }

    /// Re-advertise every tracked VIP.
    pub fn resweep(&self) {
        for e in self.vips.values() {
            self.advertise(e.advertised, e.vip);
        }
    }

    /// Bring cloud networking in line with the current role, then
    /// re-advertise everything.
    pub fn sync_to_cluster_state(&self) {
        if let Some(cloud) = &self.cloud {
            let res = match self.role() {
                ClusterRole::Master => cloud.prepare_network(true),
                ClusterRole::Backup => cloud.prepare_network(false),
                ClusterRole::NotDefined => Ok(()),
            };
            if let Err(e) = res {
                tracing::warn!("cloud network preparation failed: {e}");
            }
        }
        self.resweep();
    }

    /// Advertise `ip` (the address claimed locally) for `external` (the
    /// rule VIP) according to the cluster role.
    pub fn advertise(&self, ip: IpAddr, external: IpAddr) {
        match self.role() {
            ClusterRole::Master => self.advertise_master(ip, external),
            ClusterRole::Backup => {
                if self.netstack.is_host_address(ip)
                    && let Err(e) = self.netstack.delete_loopback_alias(ip)
                {
                    tracing::warn!(vip = %ip, "loopback alias delete failed: {e}");
                }
            }
            ClusterRole::NotDefined => {
                if !self.netstack.is_host_address(ip)
                    && let Err(e) = self
                        .netstack
                        .add_vip_interface(&vip_interface_name(ip), ip)
                {
                    tracing::warn!(vip = %ip, "VIP interface add failed: {e}");
                }
            }
        }
    }

    fn advertise_master(&self, ip: IpAddr, external: IpAddr) {
        if let Err(e) = self.netstack.delete_vip_interface(&vip_interface_name(ip)) {
            tracing::debug!(vip = %ip, "VIP interface delete failed: {e}");
        }
        if !self.netstack.is_local_reachable(ip) {
            return;
        }
        if !self.netstack.is_host_address(ip) {
            if let Some(cloud) = &self.cloud
                && let Err(e) = cloud.update_private_ip(ip, Some(external), true)
            {
                tracing::warn!(vip = %ip, "cloud VIP attach failed: {e}");
                return;
            }
            match self.netstack.add_loopback_alias(ip) {
                Ok(()) => tracing::info!(vip = %ip, "VIP added on loopback"),
                Err(e) => tracing::warn!(vip = %ip, "loopback alias add failed: {e}"),
            }
            if let Err(e) = self.netstack.delete_neighbor(ip) {
                tracing::debug!(vip = %ip, "neighbor flush failed: {e}");
            }
        }
        if let Err(e) = self.netstack.announce(ip, self.announce_timeout) {
            tracing::info!(vip = %ip, "gratuitous announcement timed out: {e}");
        }
    }

    fn release(&self, ip: IpAddr, external: IpAddr) {
        if let Err(e) = self.netstack.delete_vip_interface(&vip_interface_name(ip)) {
            tracing::debug!(vip = %ip, "VIP interface delete failed: {e}");
        }
        if self.netstack.is_host_address(ip) {
            if let Err(e) = self.netstack.delete_loopback_alias(ip) {
                tracing::warn!(vip = %ip, "loopback alias delete failed: {e}");
            }
            if let Some(cloud) = &self.cloud
                && let Err(e) = cloud.update_private_ip(ip, Some(external), false)
            {
                tracing::warn!(vip = %ip, "cloud VIP detach failed: {e}");
            }
        }
    }
}
