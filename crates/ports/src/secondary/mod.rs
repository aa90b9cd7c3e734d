pub mod cloud_hook_port;
pub mod cluster_port;
pub mod datapath_port;
pub mod metrics_port;
pub mod netstack_port;
pub mod prober_port;
