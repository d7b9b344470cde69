use crate::error::{Error, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on request body size accepted by the transport
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Upper bound on the request line and header section as a unit
const MAX_HEAD_BYTES: u64 = 16 * 1024;

/// A parsed inbound HTTP/1.1 request
///
/// Header names are lower-cased at parse time; lookups via [`header`] are by
/// lower-case name.
///
/// [`header`]: HttpRequest::header
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Request method (`GET`, `POST`, ...)
    pub method: String,
    /// Path component of the request target
    pub path: String,
    /// Raw query string, if the target had one
    pub query: Option<String>,
    /// Header name/value pairs, names lower-cased
    pub headers: Vec<(String, String)>,
    /// Request body, empty when no `content-length` was sent
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// First value of the named header (lower-case name)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whether the peer asked to keep the connection open after the response.
    ///
    /// HTTP/1.1 defaults to keep-alive unless `connection: close` is sent.
    pub fn keep_alive(&self) -> bool {
        !self
            .header("connection")
            .is_some_and(|v| v.eq_ignore_ascii_case("close"))
    }

    /// Whether the `Accept` header prefers an HTML rendering
    pub fn accepts_html(&self) -> bool {
        self.header("accept")
            .is_some_and(|accept| accept.contains("text/html"))
    }
}

/// An outbound HTTP/1.1 response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Header name/value pairs, written in order
    pub headers: Vec<(String, String)>,
    /// Response body; `content-length` is derived from it
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create a response with the given status and no headers or body
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Append a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body and its content type
    pub fn with_body(mut self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.headers
            .push(("content-type".to_string(), content_type.to_string()));
        self.body = body.into();
        self
    }

    fn reason_phrase(status: u16) -> &'static str {
        match status {
            200 => "OK",
            204 => "No Content",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            500 => "Internal Server Error",
            _ => "Unknown",
        }
    }
}

/// Read one request from the connection.
///
/// Returns `Ok(None)` when the peer closed the connection cleanly between
/// requests (EOF before any request bytes).
pub(crate) async fn read_request<R>(reader: &mut R) -> Result<Option<HttpRequest>>
where
    R: AsyncBufRead + Unpin,
{
    // The head is read through a capped reader so a peer cannot grow memory
    // with an endless request line or header section; the body cap is
    // enforced separately against content-length.
    let mut head = (&mut *reader).take(MAX_HEAD_BYTES);

    let mut request_line = String::new();
    let n = head
        .read_line(&mut request_line)
        .await
        .map_err(|e| Error::Transport(format!("Failed to read request line: {}", e)))?;
    if n == 0 {
        return Ok(None);
    }
    if !request_line.ends_with('\n') && head.limit() == 0 {
        return Err(Error::Transport(format!(
            "Request head too large: exceeds {} bytes",
            MAX_HEAD_BYTES
        )));
    }

    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| Error::Transport("Malformed request line".to_string()))?
        .to_string();
    let target = parts
        .next()
        .ok_or_else(|| Error::Transport("Malformed request line".to_string()))?
        .to_string();

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target, None),
    };

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        let n = head
            .read_line(&mut line)
            .await
            .map_err(|e| Error::Transport(format!("Failed to read header: {}", e)))?;
        if n == 0 {
            if head.limit() == 0 {
                return Err(Error::Transport(format!(
                    "Request head too large: exceeds {} bytes",
                    MAX_HEAD_BYTES
                )));
            }
            return Err(Error::Transport(
                "Connection closed mid-request".to_string(),
            ));
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(n, _)| n == "content-length")
        .map(|(_, v)| {
            v.parse::<usize>()
                .map_err(|_| Error::Transport(format!("Invalid content-length: {}", v)))
        })
        .transpose()?
        .unwrap_or(0);

    if content_length > MAX_BODY_BYTES {
        return Err(Error::Transport(format!(
            "Request body too large: {} bytes",
            content_length
        )));
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader
            .read_exact(&mut body)
            .await
            .map_err(|e| Error::Transport(format!("Failed to read request body: {}", e)))?;
    }

    Ok(Some(HttpRequest {
        method,
        path,
        query,
        headers,
        body,
    }))
}

/// Write one response to the connection and flush it.
pub(crate) async fn write_response<W>(writer: &mut W, response: &HttpResponse) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        response.status,
        HttpResponse::reason_phrase(response.status)
    );
    for (name, value) in &response.headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str(&format!("content-length: {}\r\n\r\n", response.body.len()));

    writer
        .write_all(head.as_bytes())
        .await
        .map_err(|e| Error::Transport(format!("Failed to write response head: {}", e)))?;
    writer
        .write_all(&response.body)
        .await
        .map_err(|e| Error::Transport(format!("Failed to write response body: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| Error::Transport(format!("Failed to flush response: {}", e)))?;

    Ok(())
}
