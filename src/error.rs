/// Error handling module for query-host.
///
/// This module defines the error types used throughout the library.
/// It provides a comprehensive set of errors that can occur when
/// starting, serving, and stopping a query server, along with helpful
/// context for debugging.
///
/// # Example
///
/// ```
/// use query_host::error::{Error, Result};
///
/// fn handle_error(result: Result<()>) {
///     match result {
///         Ok(_) => println!("Operation succeeded"),
///         Err(Error::Lifecycle(msg)) => println!("Lifecycle error: {}", msg),
///         Err(Error::Transport(msg)) => println!("Transport error: {}", msg),
///         Err(e) => println!("Other error: {}", e),
///     }
/// }
/// ```
use thiserror::Error;

/// Errors that can occur in the query-host library.
///
/// This enum represents all possible error types that can be returned from
/// operations in the library. Each variant includes context information to
/// help diagnose and handle the error appropriately.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to parse configuration from a file or string.
    ///
    /// This error occurs when:
    /// - The configuration JSON is malformed
    /// - Field types are incorrect
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration is valid JSON but contains values that fail validation checks.
    ///
    /// This error occurs when:
    /// - A route path does not start with `/`
    /// - The query path and the health-check path collide
    /// - The bind host is empty
    #[error("Config validation error: {0}")]
    ConfigValidation(String),

    /// An operation was attempted in a lifecycle state that does not allow it.
    ///
    /// This error occurs when:
    /// - `start` is called while the server is already starting or running
    /// - `start` is called after the server has stopped (restart is not supported)
    /// - A concurrent `stop` wins the race against an in-flight `start`
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// A plugin's startup hook failed.
    ///
    /// This error occurs when:
    /// - A `server_will_start` hook returns an error, aborting the pending start
    #[error("Startup hook failed: {0}")]
    StartupHook(String),

    /// One or more teardown hooks failed during shutdown.
    ///
    /// Teardown is best-effort: remaining hooks and connection draining still
    /// run, and the individual failures are aggregated into this error.
    #[error("Teardown failed: {0}")]
    Teardown(String),

    /// Error in the transport layer.
    ///
    /// This error occurs when:
    /// - The listener fails to bind to the configured address
    /// - A connection I/O operation fails
    /// - An inbound request is malformed beyond recovery
    #[error("Transport error: {0}")]
    Transport(String),

    /// Building the per-request context failed.
    ///
    /// This error occurs when:
    /// - A computed context function returns an error for a request
    #[error("Context error: {0}")]
    Context(String),

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for query-host operations.
///
/// This is a convenience type alias for `std::result::Result` with the `Error`
/// type from this module. Use this throughout the library and in client code to
/// handle errors in a consistent way.
pub type Result<T> = std::result::Result<T, Error>;
