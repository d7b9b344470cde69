//! Configuration module for query-host.
//!
//! This module handles parsing, validation, and access to configuration
//! settings for the query server: the bind address, the shutdown grace
//! period, the CORS origin, and the HTTP route paths. Configurations can be
//! loaded from files or strings in JSON format.
//!
//! # Examples
//!
//! Loading a configuration from a file:
//!
//! ```no_run
//! use query_host::config::ServerConfig;
//!
//! let config = ServerConfig::from_file("config.json").unwrap();
//! println!("Will bind {}:{}", config.host, config.port);
//! ```
//!
//! Creating a configuration programmatically:
//!
//! ```
//! use query_host::config::ServerConfig;
//!
//! let config = ServerConfig {
//!     port: 0,
//!     stop_grace_period_millis: Some(5_000),
//!     ..ServerConfig::default()
//! };
//! assert_eq!(config.cors_origin, "*");
//! ```
mod parser;
pub mod validator;

pub use parser::ServerConfig;
pub use validator::validate_config;
