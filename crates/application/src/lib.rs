#![forbid(unsafe_code)]

pub mod ep_host_registry;
pub mod healthcheck_service;
pub mod reconciler;
pub mod rule_service_impl;
pub mod rule_sync;
pub mod vip_service;
