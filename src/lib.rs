// Library exports for murmur
// This allows integration tests and the binary to share one module tree

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod lifecycle;
pub mod media;
pub mod realtime;
pub mod routes;
pub mod state;
