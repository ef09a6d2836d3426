pub mod auth_cmd;
pub mod common;
pub mod config;
pub mod sync;
pub mod visit;
pub mod zone;
