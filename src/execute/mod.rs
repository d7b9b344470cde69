//! Query execution boundary for query-host.
//!
//! Full query-language parsing and execution are external collaborators; this
//! module specifies their interface and ships a deliberately small built-in
//! executor, [`FieldSchema`], that resolves a flat brace-delimited selection
//! (`{ hello version }`) against registered top-level fields. That is enough
//! to serve demos and to exercise the lifecycle and draining machinery with
//! real in-flight requests.
//!
//! # Examples
//!
//! ```
//! use query_host::execute::FieldSchema;
//! use serde_json::json;
//!
//! let schema = FieldSchema::new().field_value("hello", json!("hi"));
//! ```
use crate::error::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// A query to execute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The query document
    pub query: String,
    /// Which named operation to run, for multi-operation documents
    #[serde(default, rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    /// Operation variables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
}

impl QueryRequest {
    /// Create a request for the given query document
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: None,
        }
    }
}

/// An error produced while executing a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryError {
    /// Human-readable description
    pub message: String,
}

impl QueryError {
    /// Create an error with the given message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The result of executing a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Resolved data, absent when the document could not be executed at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Field and document errors; empty on full success
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<QueryError>,
}

impl QueryResponse {
    /// A successful response carrying `data`
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// A failed response carrying a single error
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            data: None,
            errors: vec![QueryError::new(message)],
        }
    }

    /// Whether execution produced no errors
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Executes typed queries against a schema.
///
/// The server invokes this once per request with the context built by the
/// configured [`ContextProvider`](crate::context::ContextProvider).
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute one query with the given per-request context
    async fn execute(&self, request: &QueryRequest, context: &Value) -> QueryResponse;
}

/// Async resolver function over the request context
type ResolverFn = dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync;

/// How a registered field produces its value
enum FieldResolver {
    /// A fixed value, cloned per request
    Value(Value),
    /// An async function of the request context
    Function(Arc<ResolverFn>),
}

/// A flat schema of named top-level fields.
///
/// Supports selections of the form `{ field other }` (whitespace or commas
/// between names). Unknown fields produce per-field errors rather than
/// failing the whole response.
pub struct FieldSchema {
    fields: HashMap<String, FieldResolver>,
}

impl FieldSchema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self {
            fields: HashMap::new(),
        }
    }

    /// Register a field resolving to a fixed value
    pub fn field_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields
            .insert(name.into(), FieldResolver::Value(value));
        self
    }

    /// Register a field resolving through an async function of the request
    /// context
    pub fn field_fn<F, Fut>(mut self, name: impl Into<String>, resolver: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let resolver: Arc<ResolverFn> = Arc::new(move |context| Box::pin(resolver(context)));
        self.fields
            .insert(name.into(), FieldResolver::Function(resolver));
        self
    }

    /// Parse a `{ a b }` selection into field names
    fn parse_selection(query: &str) -> std::result::Result<Vec<String>, String> {
        let trimmed = query.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .ok_or_else(|| format!("Expected a braced selection, got: {}", trimmed))?;

        let fields: Vec<String> = inner
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();

        if fields.is_empty() {
            return Err("Selection must name at least one field".to_string());
        }
        Ok(fields)
    }
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryExecutor for FieldSchema {
    async fn execute(&self, request: &QueryRequest, context: &Value) -> QueryResponse {
        let fields = match Self::parse_selection(&request.query) {
            Ok(fields) => fields,
            Err(message) => return QueryResponse::error(message),
        };

        let mut data = Map::new();
        let mut errors = Vec::new();

        for name in fields {
            match self.fields.get(&name) {
                Some(FieldResolver::Value(value)) => {
                    data.insert(name, value.clone());
                }
                Some(FieldResolver::Function(resolver)) => {
                    match resolver(context.clone()).await {
                        Ok(value) => {
                            data.insert(name, value);
                        }
                        Err(e) => {
                            errors.push(QueryError::new(format!(
                                "Field \"{}\" failed to resolve: {}",
                                name, e
                            )));
                            data.insert(name, Value::Null);
                        }
                    }
                }
                None => {
                    errors.push(QueryError::new(format!("Cannot query field \"{}\"", name)));
                }
            }
        }

        QueryResponse {
            data: Some(Value::Object(data)),
            errors,
        }
    }
}
