pub mod logging_cloud_hook;
pub mod static_cluster;
