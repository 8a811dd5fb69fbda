//! One-shot HTTP/1.1 client over a fresh TCP connection.
//!
//! Every call connects, performs the hyper handshake, sends exactly one
//! request and reads the full body. Connections are not pooled.

use std::time::Duration;

use bytes::Bytes;
use http::{Method, Request, StatusCode, header};
use http_body_util::{BodyExt, Full};
use thiserror::Error;
use tracing::debug;

use crate::headers::TraceHeaders;

const USER_AGENT: &str = "pipemesh/0.1";

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("connect to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("request to {address} failed: {reason}")]
    Request { address: String, reason: String },

    #[error("request to {address} timed out after {timeout:?}")]
    Timeout { address: String, timeout: Duration },
}

/// Status and fully read body of a response.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: Bytes,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body as lossy UTF-8, for error messages.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A single outbound request.
#[derive(Debug, Clone)]
pub struct HttpCall<'a> {
    /// `host:port` to connect to.
    pub address: &'a str,
    pub method: Method,
    /// Path and query, starting with `/`.
    pub path: &'a str,
    /// `Host` header; defaults to `address`. The sidecar routes on it.
    pub authority: Option<&'a str>,
    /// JSON body, if any.
    pub body: Option<Bytes>,
    pub timeout: Duration,
}

impl<'a> HttpCall<'a> {
    pub fn new(method: Method, address: &'a str, path: &'a str, timeout: Duration) -> Self {
        Self {
            address,
            method,
            path,
            authority: None,
            body: None,
            timeout,
        }
    }

    pub fn authority(mut self, authority: &'a str) -> Self {
        self.authority = Some(authority);
        self
    }

    pub fn json(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Send one request and collect the response.
pub async fn send(call: HttpCall<'_>, trace: &TraceHeaders) -> Result<HttpReply, HttpError> {
    let address = call.address.to_string();
    let timeout = call.timeout;
    match tokio::time::timeout(timeout, send_inner(call, trace)).await {
        Ok(result) => result,
        Err(_) => Err(HttpError::Timeout { address, timeout }),
    }
}

async fn send_inner(call: HttpCall<'_>, trace: &TraceHeaders) -> Result<HttpReply, HttpError> {
    let uri = format!("http://{}{}", call.address, call.path);
    let request_err = |reason: String| HttpError::Request {
        address: call.address.to_string(),
        reason,
    };

    let stream = tokio::net::TcpStream::connect(call.address)
        .await
        .map_err(|e| HttpError::Connect {
            address: call.address.to_string(),
            reason: e.to_string(),
        })?;

    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| HttpError::Connect {
            address: call.address.to_string(),
            reason: e.to_string(),
        })?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "http connection closed with error");
        }
    });

    let mut builder = Request::builder()
        .method(call.method.clone())
        .uri(&uri)
        .header(header::HOST, call.authority.unwrap_or(call.address))
        .header(header::USER_AGENT, USER_AGENT);
    if call.body.is_some() {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
    }
    for (name, value) in trace.iter() {
        builder = builder.header(name, value);
    }
    let request = builder
        .body(Full::new(call.body.clone().unwrap_or_default()))
        .map_err(|e| request_err(e.to_string()))?;

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| request_err(e.to_string()))?;
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| request_err(e.to_string()))?
        .to_bytes();

    debug!(%uri, %status, bytes = body.len(), "http call completed");
    Ok(HttpReply { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accept one connection, capture the raw request, reply with `response`.
    async fn one_shot_server(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn sends_host_and_trace_headers() {
        let (addr, server) =
            one_shot_server("HTTP/1.1 200 OK\r\ncontent-length: 4\r\nconnection: close\r\n\r\n[42]").await;
        let trace = TraceHeaders::collect(|name| (name == "X-Request-Id").then(|| "req-1".to_string()));

        let call = HttpCall::new(Method::POST, &addr, "/predict", Duration::from_secs(2))
            .authority("classifier")
            .json(Bytes::from_static(b"[1]"));
        let reply = send(call, &trace).await.unwrap();

        assert!(reply.is_success());
        assert_eq!(reply.body, Bytes::from_static(b"[42]"));
        let raw = server.await.unwrap().to_ascii_lowercase();
        assert!(raw.starts_with("post /predict http/1.1"));
        assert!(raw.contains("host: classifier"));
        assert!(raw.contains("x-request-id: req-1"));
    }

    #[tokio::test]
    async fn refused_connection_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let call = HttpCall::new(Method::GET, &addr, "/health", Duration::from_secs(1));
        let err = send(call, &TraceHeaders::default()).await.unwrap_err();
        assert!(matches!(err, HttpError::Connect { .. }));
    }
}
