//! Fabric management API client.
//!
//! The API is reached through a local HTTP proxy that handles authentication,
//! so requests are plain HTTP GETs against `/api/class/<kind>.json`.
//!
//! # Graceful Degradation
//!
//! - Connection refused / timeout: `PlatformError::Transport` with context
//! - Error object first in `imdata`: `PlatformError::Api` with code and text
//! - Non-JSON or missing `imdata`: `PlatformError::Decode`
//!
//! All operations respect the client timeout.

use crate::platform::PlatformError;
use serde_json::{Map, Value};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

/// Query access to fabric objects.
pub trait FabricApi: Send + Sync {
    /// All objects of a class, optionally filtered by a query string
    /// (`query-target-filter=...` and friends, without the leading `?`).
    fn fetch(&self, kind: &str, query: &str) -> Result<Vec<Value>, PlatformError>;
}

/// Plain HTTP client for the local API proxy.
#[derive(Debug, Clone)]
pub struct ProxyApiClient {
    host: String,
    port: u16,
    timeout: Duration,
}

impl ProxyApiClient {
    /// Create a client for a base URL like `http://127.0.0.1:7777`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PlatformError> {
        let (host, port) = parse_base_url(base_url)?;
        Ok(ProxyApiClient { host, port, timeout })
    }

    fn get(&self, path: &str) -> Result<(u16, String), PlatformError> {
        let context = format!("GET {}", path);
        let transport = |message: String| PlatformError::Transport {
            context: context.clone(),
            message,
        };

        let addr = format!("{}:{}", self.host, self.port)
            .to_socket_addrs()
            .map_err(|e| transport(format!("DNS resolution failed: {}", e)))?
            .next()
            .ok_or_else(|| transport("No address resolved".to_string()))?;

        let mut stream =
            TcpStream::connect_timeout(&addr, self.timeout).map_err(|e| transport(e.to_string()))?;
        stream.set_read_timeout(Some(self.timeout)).ok();
        stream.set_write_timeout(Some(self.timeout)).ok();

        // HTTP/1.0 keeps the proxy from chunking the body.
        let request = format!(
            "GET {} HTTP/1.0\r\n\
             Host: {}\r\n\
             Accept: application/json\r\n\
             User-Agent: fabric-preflight/{}\r\n\
             \r\n",
            path,
            self.host,
            env!("CARGO_PKG_VERSION")
        );
        stream
            .write_all(request.as_bytes())
            .map_err(|e| transport(format!("Write failed: {}", e)))?;

        let mut reader = BufReader::new(stream);
        let mut status_line = String::new();
        reader
            .read_line(&mut status_line)
            .map_err(|e| transport(format!("Read failed: {}", e)))?;
        let status_code = status_line
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(0);

        loop {
            let mut line = String::new();
            let read = reader
                .read_line(&mut line)
                .map_err(|e| transport(format!("Read failed: {}", e)))?;
            if read == 0 || line.trim().is_empty() {
                break;
            }
        }

        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .map_err(|e| transport(format!("Read failed: {}", e)))?;
        Ok((status_code, String::from_utf8_lossy(&body).into_owned()))
    }
}

impl FabricApi for ProxyApiClient {
    fn fetch(&self, kind: &str, query: &str) -> Result<Vec<Value>, PlatformError> {
        let path = class_path(kind, query);
        let (status, body) = self.get(&path)?;
        debug!(path = %path, status, bytes = body.len(), "api response");

        // Error responses still carry an imdata error object worth surfacing.
        let objects = decode_imdata(&body)?;
        if status != 200 {
            return Err(PlatformError::Transport {
                context: format!("GET {}", path),
                message: format!("HTTP status {}", status),
            });
        }
        Ok(objects)
    }
}

fn class_path(kind: &str, query: &str) -> String {
    if query.is_empty() {
        format!("/api/class/{}.json", kind)
    } else {
        format!("/api/class/{}.json?{}", kind, query.trim_start_matches('?'))
    }
}

fn parse_base_url(url: &str) -> Result<(String, u16), PlatformError> {
    let decode = |message: String| PlatformError::Decode {
        context: "parse proxy url".to_string(),
        message,
    };

    let rest = url
        .strip_prefix("http://")
        .ok_or_else(|| decode(format!("Unsupported URL scheme: {}", url)))?;
    let host_port = rest.split('/').next().unwrap_or(rest);

    match host_port.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| decode(format!("Invalid port in URL: {}", url)))?;
            Ok((host.to_string(), port))
        }
        None => Ok((host_port.to_string(), 80)),
    }
}

/// Decode an API response body into its list of objects.
///
/// An `error` object in first position means the query failed.
pub fn decode_imdata(body: &str) -> Result<Vec<Value>, PlatformError> {
    let decode = |message: String| PlatformError::Decode {
        context: "imdata".to_string(),
        message,
    };

    let mut response: Value = serde_json::from_str(body).map_err(|e| decode(e.to_string()))?;
    let objects = match response.get_mut("imdata").map(Value::take) {
        Some(Value::Array(objects)) => objects,
        _ => return Err(decode("response has no imdata list".to_string())),
    };

    if let Some(error) = objects.first().and_then(|first| first.get("error")) {
        let attr = |name: &str| {
            error
                .pointer(&format!("/attributes/{}", name))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string()
        };
        return Err(PlatformError::Api {
            code: attr("code"),
            text: attr("text"),
        });
    }
    Ok(objects)
}

/// Attributes of a class object shaped like `{"<class>": {"attributes": {...}}}`.
pub fn object_attributes(object: &Value) -> Option<&Map<String, Value>> {
    object
        .as_object()?
        .values()
        .next()?
        .get("attributes")?
        .as_object()
}

/// One string attribute of a class object.
pub fn attribute<'a>(object: &'a Value, name: &str) -> Option<&'a str> {
    object_attributes(object)?.get(name)?.as_str()
}
