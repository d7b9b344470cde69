//! Per-request context construction.
//!
//! A server is configured with either a static context value shared (by
//! clone) across requests, or a computed function that receives per-request
//! transport metadata and produces a context value, possibly asynchronously.
//! Whichever form is configured is invoked exactly once per request and its
//! result is never mutated or shared across requests.
use crate::error::{Error, Result};
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;

/// Transport metadata handed to a computed context function
#[derive(Debug, Clone)]
pub struct RequestDetails {
    /// Request method (`GET`, `POST`, or `LOCAL` for direct execution)
    pub method: String,
    /// Request path; empty for direct execution
    pub path: String,
    /// Header name/value pairs, names lower-cased
    pub headers: Vec<(String, String)>,
    /// Peer address; absent for direct execution
    pub peer_addr: Option<SocketAddr>,
}

impl RequestDetails {
    /// Details for a non-network invocation through `execute_operation`
    pub(crate) fn local() -> Self {
        Self {
            method: "LOCAL".to_string(),
            path: String::new(),
            headers: Vec::new(),
            peer_addr: None,
        }
    }
}

/// Computed context function
type ContextFn = dyn Fn(RequestDetails) -> BoxFuture<'static, Result<Value>> + Send + Sync;

/// Produces the per-request context handed to the query executor.
#[derive(Clone)]
pub enum ContextProvider {
    /// A fixed value, cloned for every request
    Static(Value),
    /// A function of per-request transport metadata
    Computed(Arc<ContextFn>),
}

impl ContextProvider {
    /// An empty object context
    pub fn empty() -> Self {
        Self::Static(Value::Object(Map::new()))
    }

    /// A static context value
    pub fn value(value: Value) -> Self {
        Self::Static(value)
    }

    /// A computed context function.
    ///
    /// # Example
    ///
    /// ```
    /// use query_host::context::ContextProvider;
    /// use serde_json::json;
    ///
    /// let provider = ContextProvider::computed(|details| async move {
    ///     Ok(json!({ "method": details.method }))
    /// });
    /// ```
    pub fn computed<F, Fut>(f: F) -> Self
    where
        F: Fn(RequestDetails) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
    {
        Self::Computed(Arc::new(move |details| Box::pin(f(details))))
    }

    /// Build the context for one request.
    ///
    /// Static values are cloned so no request can observe another's mutations;
    /// computed functions run once per request and their failure propagates to
    /// the caller as a context error.
    pub(crate) async fn build(&self, details: RequestDetails) -> Result<Value> {
        match self {
            Self::Static(value) => Ok(value.clone()),
            Self::Computed(f) => f(details)
                .await
                .map_err(|e| Error::Context(e.to_string())),
        }
    }
}

impl Default for ContextProvider {
    fn default() -> Self {
        Self::empty()
    }
}
