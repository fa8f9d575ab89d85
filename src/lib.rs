pub mod config;
pub mod error;
pub mod model;
pub mod storage;
pub mod identity;
pub mod security;
pub mod attendance;
pub mod sessions;
pub mod server;
