#![deny(unsafe_code)]

pub mod cluster;
pub mod datapath;
pub mod http;
pub mod netstack;
pub mod probe;
