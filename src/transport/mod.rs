//! Transport module for query-host.
//!
//! This module owns the TCP listener, the accept loop, and the per-connection
//! serve tasks, plus the minimal HTTP/1.1 framing they speak. It deliberately
//! stays below the HTTP surface: routing and response construction live in
//! [`crate::surface`], while this module's job is to keep the connection
//! tracker accurate so the drain controller can stop the server in bounded
//! time.
mod http;
pub mod message;

pub use http::HttpTransport;
pub use message::{HttpRequest, HttpResponse};
