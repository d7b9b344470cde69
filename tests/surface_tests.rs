use query_host::config::ServerConfig;
use query_host::context::ContextProvider;
use query_host::error::Result;
use query_host::execute::{FieldSchema, QueryRequest};
use query_host::QueryServer;
use serde_json::{Value, json};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn test_config() -> ServerConfig {
    ServerConfig {
        port: 0,
        ..ServerConfig::default()
    }
}

fn test_schema() -> FieldSchema {
    FieldSchema::new().field_value("hello", json!("hi"))
}

/// Send one raw request (with `connection: close`) and return the parsed
/// status, headers (lower-cased names), and body.
async fn raw_request(
    address: SocketAddr,
    request: String,
) -> (u16, Vec<(String, String)>, String) {
    let mut stream = TcpStream::connect(address).await.expect("connect");
    stream
        .write_all(request.as_bytes())
        .await
        .expect("request write should succeed");

    let mut response = Vec::new();
    stream
        .read_to_end(&mut response)
        .await
        .expect("response read should succeed");
    let response = String::from_utf8(response).expect("response should be UTF-8");

    let (head, body) = response
        .split_once("\r\n\r\n")
        .expect("response should have a header/body separator");
    let mut lines = head.lines();
    let status_line = lines.next().expect("response should have a status line");
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .expect("status line should carry a code")
        .parse()
        .expect("status code should be numeric");

    let headers = lines
        .filter_map(|line| {
            line.split_once(':')
                .map(|(n, v)| (n.trim().to_ascii_lowercase(), v.trim().to_string()))
        })
        .collect();

    (status, headers, body.to_string())
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

async fn post_query(address: SocketAddr, query: &str) -> (u16, Vec<(String, String)>, String) {
    let body = json!({ "query": query }).to_string();
    let request = format!(
        "POST /query HTTP/1.1\r\nhost: localhost\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    raw_request(address, request).await
}

#[tokio::test]
async fn test_can_be_queried_over_http() -> Result<()> {
    let server = QueryServer::new(test_schema(), test_config());
    let address = server.start().await?;

    let (status, _, body) = post_query(address, "{hello}").await;
    assert_eq!(status, 200);

    let body: Value = serde_json::from_str(&body).expect("body should be JSON");
    assert_eq!(body["data"]["hello"], "hi");
    assert!(body.get("errors").is_none());

    server.stop().await
}

#[tokio::test]
async fn test_get_query_string_form() -> Result<()> {
    let server = QueryServer::new(test_schema(), test_config());
    let address = server.start().await?;

    let request = "GET /query?query=%7Bhello%7D HTTP/1.1\r\nhost: localhost\r\naccept: application/json\r\nconnection: close\r\n\r\n".to_string();
    let (status, _, body) = raw_request(address, request).await;
    assert_eq!(status, 200);

    let body: Value = serde_json::from_str(&body).expect("body should be JSON");
    assert_eq!(body["data"]["hello"], "hi");

    server.stop().await
}

#[tokio::test]
async fn test_renders_landing_page_for_browser_accept() -> Result<()> {
    let server = QueryServer::new(test_schema(), test_config());
    let address = server.start().await?;

    let request = "GET /query HTTP/1.1\r\nhost: localhost\r\naccept: text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8\r\nconnection: close\r\n\r\n".to_string();
    let (status, headers, body) = raw_request(address, request).await;

    assert_eq!(status, 200);
    assert_eq!(header(&headers, "content-type"), Some("text/html"));
    assert!(body.contains("<html"));

    server.stop().await
}

#[tokio::test]
async fn test_health_check_endpoint() -> Result<()> {
    let server = QueryServer::new(test_schema(), test_config());
    let address = server.start().await?;

    let request = "GET /.well-known/server-health HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n".to_string();
    let (status, _, body) = raw_request(address, request).await;

    assert_eq!(status, 200);
    assert_eq!(body, r#"{"status":"pass"}"#);

    server.stop().await
}

#[tokio::test]
async fn test_cors_origin_is_wildcard_by_default() -> Result<()> {
    let server = QueryServer::new(test_schema(), test_config());
    let address = server.start().await?;

    let (_, headers, _) = post_query(address, "{hello}").await;
    assert_eq!(header(&headers, "access-control-allow-origin"), Some("*"));

    server.stop().await
}

#[tokio::test]
async fn test_cors_origin_reflects_configuration() -> Result<()> {
    let config = ServerConfig {
        port: 0,
        cors_origin: "localhost".to_string(),
        ..ServerConfig::default()
    };
    let server = QueryServer::new(test_schema(), config);
    let address = server.start().await?;

    let (_, headers, _) = post_query(address, "{hello}").await;
    assert_eq!(
        header(&headers, "access-control-allow-origin"),
        Some("localhost")
    );

    server.stop().await
}

#[tokio::test]
async fn test_unknown_path_is_not_found() -> Result<()> {
    let server = QueryServer::new(test_schema(), test_config());
    let address = server.start().await?;

    let request =
        "GET /nope HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n".to_string();
    let (status, _, _) = raw_request(address, request).await;
    assert_eq!(status, 404);

    server.stop().await
}

#[tokio::test]
async fn test_malformed_query_body_is_bad_request() -> Result<()> {
    let server = QueryServer::new(test_schema(), test_config());
    let address = server.start().await?;

    let request = "POST /query HTTP/1.1\r\nhost: localhost\r\ncontent-length: 8\r\nconnection: close\r\n\r\nnot json".to_string();
    let (status, _, body) = raw_request(address, request).await;

    assert_eq!(status, 400);
    let body: Value = serde_json::from_str(&body).expect("body should be JSON");
    assert!(body["errors"].as_array().is_some_and(|e| !e.is_empty()));

    server.stop().await
}

#[tokio::test]
async fn test_execute_operation_without_starting() -> Result<()> {
    let server = QueryServer::new(test_schema(), test_config());

    let response = server.execute_operation(QueryRequest::new("{hello}")).await?;
    assert!(response.is_ok());
    assert_eq!(response.data, Some(json!({"hello": "hi"})));

    Ok(())
}

#[tokio::test]
async fn test_computed_context_sees_transport_metadata() -> Result<()> {
    let schema = FieldSchema::new().field_fn("method", |ctx| async move {
        Ok(ctx.get("method").cloned().unwrap_or(Value::Null))
    });

    let mut server = QueryServer::new(schema, test_config());
    server.set_context(ContextProvider::computed(|details| async move {
        Ok(json!({ "method": details.method }))
    }));

    // Direct execution builds a local context.
    let response = server.execute_operation(QueryRequest::new("{method}")).await?;
    assert_eq!(response.data, Some(json!({"method": "LOCAL"})));

    // Over the transport, the context sees the HTTP method.
    let address = server.start().await?;
    let (_, _, body) = post_query(address, "{method}").await;
    let body: Value = serde_json::from_str(&body).expect("body should be JSON");
    assert_eq!(body["data"]["method"], "POST");

    server.stop().await
}

#[tokio::test]
async fn test_static_context_can_hold_arbitrary_values() -> Result<()> {
    let schema = FieldSchema::new().field_fn("value", |ctx| async move {
        Ok(ctx.get("value").cloned().unwrap_or(Value::Null))
    });

    let mut server = QueryServer::new(schema, test_config());
    server.set_context(ContextProvider::value(json!({"value": "arbitrary"})));

    let response = server.execute_operation(QueryRequest::new("{value}")).await?;
    assert_eq!(response.data, Some(json!({"value": "arbitrary"})));

    Ok(())
}
