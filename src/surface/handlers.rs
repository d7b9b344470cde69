use crate::context::{ContextProvider, RequestDetails};
use crate::execute::{QueryExecutor, QueryRequest, QueryResponse};
use crate::transport::message::{HttpRequest, HttpResponse};

use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

/// Minimal landing page served to HTML-preferring clients on the query path
const LANDING_PAGE_HTML: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8" />
    <title>query-host</title>
  </head>
  <body>
    <h1>query-host</h1>
    <p>This endpoint serves typed queries. Send a <code>POST</code> request
    with a JSON body of the form <code>{"query": "{hello}"}</code>, or a
    <code>GET</code> request with a <code>query</code> parameter.</p>
  </body>
</html>
"#;

/// Routes inbound requests to the query executor, the health check, or the
/// landing page, and applies the CORS origin header to every response.
pub struct HttpSurface {
    /// Query execution engine
    executor: Arc<dyn QueryExecutor>,
    /// Per-request context construction
    context: ContextProvider,
    /// Value reflected in `access-control-allow-origin`
    cors_origin: String,
    /// Route that accepts query requests
    query_path: String,
    /// Route that answers health probes
    health_check_path: String,
}

impl HttpSurface {
    /// Create a surface over the given executor and context provider
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        context: ContextProvider,
        cors_origin: String,
        query_path: String,
        health_check_path: String,
    ) -> Self {
        Self {
            executor,
            context,
            cors_origin,
            query_path,
            health_check_path,
        }
    }

    /// Handle one request, producing the response to write back.
    ///
    /// Every response, including errors, carries the CORS origin header.
    pub async fn handle(&self, request: &HttpRequest, peer_addr: SocketAddr) -> HttpResponse {
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            peer = %peer_addr,
            "Handling request"
        );

        let response = self.route(request, peer_addr).await;
        response.with_header("access-control-allow-origin", self.cors_origin.clone())
    }

    async fn route(&self, request: &HttpRequest, peer_addr: SocketAddr) -> HttpResponse {
        if request.method == "OPTIONS" {
            return HttpResponse::new(204)
                .with_header("access-control-allow-methods", "GET, POST, OPTIONS")
                .with_header("access-control-allow-headers", "content-type");
        }

        if request.path == self.health_check_path {
            return match request.method.as_str() {
                "GET" => json_response(200, &json!({"status": "pass"})),
                _ => json_response(405, &json!({"errors": [{"message": "Method not allowed"}]})),
            };
        }

        if request.path == self.query_path {
            // Browsers navigating to the endpoint get a human-readable page.
            if request.method == "GET" && request.accepts_html() {
                return HttpResponse::new(200).with_body("text/html", LANDING_PAGE_HTML);
            }
            return self.execute(request, peer_addr).await;
        }

        json_response(404, &json!({"errors": [{"message": "Not found"}]}))
    }

    /// Parse the query request, build its context, and run the executor.
    async fn execute(&self, request: &HttpRequest, peer_addr: SocketAddr) -> HttpResponse {
        let query_request = match parse_query_request(request) {
            Ok(query_request) => query_request,
            Err(message) => {
                return json_response(400, &json!({"errors": [{"message": message}]}));
            }
        };

        let details = RequestDetails {
            method: request.method.clone(),
            path: request.path.clone(),
            headers: request.headers.clone(),
            peer_addr: Some(peer_addr),
        };

        let context = match self.context.build(details).await {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build request context");
                return json_response(500, &json!({"errors": [{"message": e.to_string()}]}));
            }
        };

        let response: QueryResponse = self.executor.execute(&query_request, &context).await;
        json_response(200, &response)
    }
}

/// Extract a [`QueryRequest`] from a POST JSON body or GET query string.
fn parse_query_request(request: &HttpRequest) -> Result<QueryRequest, String> {
    match request.method.as_str() {
        "POST" => serde_json::from_slice(&request.body)
            .map_err(|e| format!("Invalid query request body: {}", e)),
        "GET" => {
            let raw = request
                .query
                .as_deref()
                .ok_or_else(|| "Missing query parameter".to_string())?;
            let pairs: Vec<(String, String)> = serde_urlencoded::from_str(raw)
                .map_err(|e| format!("Invalid query string: {}", e))?;

            let mut query_request: Option<QueryRequest> = None;
            let mut operation_name = None;
            let mut variables = None;
            for (key, value) in pairs {
                match key.as_str() {
                    "query" => query_request = Some(QueryRequest::new(value)),
                    "operationName" => operation_name = Some(value),
                    "variables" => {
                        variables = Some(
                            serde_json::from_str(&value)
                                .map_err(|e| format!("Invalid variables: {}", e))?,
                        );
                    }
                    _ => {}
                }
            }

            let mut query_request =
                query_request.ok_or_else(|| "Missing query parameter".to_string())?;
            query_request.operation_name = operation_name;
            query_request.variables = variables;
            Ok(query_request)
        }
        other => Err(format!("Unsupported method: {}", other)),
    }
}

/// Serialize a JSON response body; serialization failure becomes a 500.
fn json_response(status: u16, body: &impl Serialize) -> HttpResponse {
    match serde_json::to_vec(body) {
        Ok(bytes) => HttpResponse::new(status).with_body("application/json", bytes),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response body");
            HttpResponse::new(500).with_body(
                "application/json",
                r#"{"errors":[{"message":"Response serialization failed"}]}"#,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execute::FieldSchema;

    fn surface() -> HttpSurface {
        let schema = FieldSchema::new().field_value("hello", json!("hi"));
        HttpSurface::new(
            Arc::new(schema),
            ContextProvider::empty(),
            "*".to_string(),
            "/query".to_string(),
            "/.well-known/server-health".to_string(),
        )
    }

    fn request(method: &str, path: &str) -> HttpRequest {
        HttpRequest {
            method: method.to_string(),
            path: path.to_string(),
            query: None,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:9999".parse().unwrap()
    }

    #[tokio::test]
    async fn test_health_check_returns_pass() {
        let response = surface()
            .handle(&request("GET", "/.well-known/server-health"), peer())
            .await;

        assert_eq!(response.status, 200);
        assert_eq!(response.body, br#"{"status":"pass"}"#);
    }

    #[tokio::test]
    async fn test_unknown_path_is_404_with_cors() {
        let response = surface().handle(&request("GET", "/missing"), peer()).await;

        assert_eq!(response.status, 404);
        assert!(
            response
                .headers
                .iter()
                .any(|(n, v)| n == "access-control-allow-origin" && v == "*")
        );
    }

    #[tokio::test]
    async fn test_html_accept_gets_landing_page() {
        let mut req = request("GET", "/query");
        req.headers
            .push(("accept".to_string(), "text/html,application/xhtml+xml".to_string()));

        let response = surface().handle(&req, peer()).await;
        assert_eq!(response.status, 200);
        assert!(String::from_utf8(response.body).unwrap().contains("<html"));
    }

    #[tokio::test]
    async fn test_post_query_executes() {
        let mut req = request("POST", "/query");
        req.body = br#"{"query":"{hello}"}"#.to_vec();

        let response = surface().handle(&req, peer()).await;
        assert_eq!(response.status, 200);

        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["data"]["hello"], "hi");
        assert!(body.get("errors").is_none());
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let mut req = request("POST", "/query");
        req.body = b"not json".to_vec();

        let response = surface().handle(&req, peer()).await;
        assert_eq!(response.status, 400);
    }
}
