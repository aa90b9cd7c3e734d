pub mod disabled;
pub mod ip_route;
