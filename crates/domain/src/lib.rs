#![forbid(unsafe_code)]

pub mod common;
pub mod healthcheck;
pub mod rule;
pub mod selection;
pub mod tuple;
pub mod vip;
