//! HTTP surface for query-host.
//!
//! This module routes parsed requests: the query path accepts `POST` JSON
//! bodies and `GET` query-string form (HTML-preferring `GET`s receive a
//! landing page instead), the health-check path answers probes with
//! `{"status":"pass"}`, and every response carries an
//! `access-control-allow-origin` header reflecting configuration.
mod handlers;

pub use handlers::HttpSurface;
