//! # yams-client
//!
//! Client library for the YAMS daemon.
//!
//! This crate provides:
//! - Unix socket connection management with automatic reconnection
//! - Request/response correlation over a single multiplexed stream
//! - A typed async API for the daemon operations
//! - Layered configuration (defaults, YAML file, environment)

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod paths;

pub use client::DaemonClient;
pub use config::{ClientConfig, ConfigError, ReconnectConfig};
pub use connection::{ConnectionEvent, ConnectionEvents, ConnectionManager, ConnectionState};
pub use error::ClientError;
pub use paths::resolve_socket_path;
pub use yams_protocol;
