pub mod connect;
pub mod http_probe;
pub mod ping;
pub mod prober;
