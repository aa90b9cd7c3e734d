pub mod args;
pub mod entity;
pub mod error;
pub mod fold;
pub mod id_pool;
pub mod merge;
pub mod table;
