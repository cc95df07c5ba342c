// Nakadachi - forward HTTP/1.x caching proxy

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod http;
pub mod logging;
pub mod proxy;
pub mod server;
