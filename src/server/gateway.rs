//! CGI gateway
//!
//! Runs the request handler in-process for each HTTP request: the request
//! becomes a CGI environment plus an in-memory body, and the handler's
//! output becomes the HTTP response.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderMap, CONTENT_LENGTH, HOST, USER_AGENT};
use hyper::{Request, Response};

use crate::cgi::{env, MapEnv, Outcome};
use crate::config::AppState;
use crate::http;
use crate::logger::{self, AccessLogEntry};

pub const GATEWAY_INTERFACE: &str = "CGI/1.1";

/// Addresses of the connection a request arrived on
#[derive(Debug, Clone, Copy)]
pub struct ConnectionInfo {
    pub peer_addr: SocketAddr,
    pub local_addr: SocketAddr,
}

/// Main entry point for gateway requests
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    conn: ConnectionInfo,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let started = Instant::now();
    let server_name = state.config.http.server_name.clone();
    let max_body_size = state.config.http.max_body_size;
    let (parts, body) = req.into_parts();

    let mut entry = AccessLogEntry::new(
        conn.peer_addr.ip().to_string(),
        parts.method.to_string(),
        parts.uri.path().to_string(),
    );
    entry.query = parts.uri.query().map(ToString::to_string);
    entry.http_version = version_label(parts.version).to_string();
    entry.user_agent = header_str(&parts.headers, USER_AGENT.as_str()).map(ToString::to_string);

    let response = match read_body(&parts.headers, body, max_body_size).await {
        Err(BodyError::TooLarge) => {
            entry.outcome = Some("rejected".to_string());
            http::build_413_response(&server_name)
        }
        Err(BodyError::Read) => {
            entry.outcome = Some("rejected".to_string());
            http::build_500_response(&server_name)
        }
        Ok(body) => {
            entry.request_bytes = body.len();
            let env = build_environment(&parts, body.len(), conn, &server_name);
            run_handler(&state, &env, &body, &server_name, &mut entry)
        }
    };

    if state.access_log_enabled() {
        entry.status = response.status().as_u16();
        entry.body_bytes = usize::try_from(response.body().size_hint().exact().unwrap_or(0))
            .unwrap_or(usize::MAX);
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

enum BodyError {
    TooLarge,
    Read,
}

/// Collect the body under `max_body_size`
async fn read_body<B>(headers: &HeaderMap, body: B, max_body_size: u64) -> Result<Bytes, BodyError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    if let Some(declared) = header_str(headers, CONTENT_LENGTH.as_str()) {
        match declared.trim().parse::<u64>() {
            Ok(size) if size > max_body_size => {
                logger::log_warning(&format!(
                    "Request body too large: {size} bytes (max: {max_body_size})"
                ));
                return Err(BodyError::TooLarge);
            }
            Ok(_) => {}
            Err(_) => logger::log_warning(&format!(
                "Invalid Content-Length value: '{declared}', relying on body limit"
            )),
        }
    }

    let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            logger::log_warning(&format!("Request body exceeded {max_body_size} bytes"));
            Err(BodyError::TooLarge)
        }
        Err(e) => {
            logger::log_error(&format!("Failed to read request body: {e}"));
            Err(BodyError::Read)
        }
    }
}

fn run_handler(
    state: &AppState,
    env: &MapEnv,
    body: &[u8],
    server_name: &str,
    entry: &mut AccessLogEntry,
) -> Response<Full<Bytes>> {
    let mut input = body;
    let mut output = Vec::new();

    match state.handler.handle(env, &mut input, &mut output) {
        Ok(outcome) => {
            logger::log_invocation(&entry.method, &outcome);
            entry.outcome = Some(outcome.label().to_string());
            if let Outcome::PostHandled { bytes_read } = outcome {
                entry.request_bytes = bytes_read;
            }
            http::build_cgi_response(http::parse_cgi_output(&output), server_name)
        }
        Err(e) => {
            logger::log_error(&format!("CGI handler failed: {e}"));
            entry.outcome = Some("error".to_string());
            http::build_error_response(&e, server_name)
        }
    }
}

/// Build the CGI environment for one request
pub fn build_environment(
    parts: &hyper::http::request::Parts,
    body_len: usize,
    conn: ConnectionInfo,
    server_name: &str,
) -> MapEnv {
    let mut cgi_env = MapEnv::new();

    for name in parts.headers.keys() {
        let joined = parts
            .headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        let key = name.as_str().to_ascii_uppercase().replace('-', "_");
        match key.as_str() {
            "CONTENT_LENGTH" | "CONTENT_TYPE" => cgi_env.set(key, joined),
            _ => cgi_env.set(format!("HTTP_{key}"), joined),
        }
    }

    let server_host = header_str(&parts.headers, HOST.as_str())
        .map(|host| strip_port(host).to_string())
        .unwrap_or_else(|| conn.local_addr.ip().to_string());

    cgi_env.set(env::REQUEST_METHOD, parts.method.as_str());
    cgi_env.set(
        env::CONTENT_LENGTH,
        if body_len == 0 {
            String::new()
        } else {
            body_len.to_string()
        },
    );
    cgi_env.set("QUERY_STRING", parts.uri.query().unwrap_or(""));
    cgi_env.set("SCRIPT_NAME", parts.uri.path());
    cgi_env.set("SERVER_NAME", server_host);
    cgi_env.set("SERVER_PORT", conn.local_addr.port().to_string());
    cgi_env.set("SERVER_PROTOCOL", format!("HTTP/{}", version_label(parts.version)));
    cgi_env.set("SERVER_SOFTWARE", server_name);
    cgi_env.set("GATEWAY_INTERFACE", GATEWAY_INTERFACE);
    cgi_env.set("REMOTE_ADDR", conn.peer_addr.ip().to_string());
    cgi_env
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `example.org:8080` -> `example.org`, `[::1]:8080` -> `[::1]`
fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((h, port)) if !port.contains(']') && (!h.contains(':') || h.ends_with(']')) => h,
        _ => host,
    }
}

fn version_label(version: hyper::Version) -> &'static str {
    match version {
        hyper::Version::HTTP_09 => "0.9",
        hyper::Version::HTTP_10 => "1.0",
        hyper::Version::HTTP_2 => "2",
        hyper::Version::HTTP_3 => "3",
        _ => "1.1",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgi::EnvironmentReader;
    use crate::config::Config;

    fn conn() -> ConnectionInfo {
        ConnectionInfo {
            peer_addr: "10.0.0.7:51000".parse().unwrap(),
            local_addr: "127.0.0.1:8080".parse().unwrap(),
        }
    }

    fn state_with(config: Config) -> Arc<AppState> {
        let mut config = config;
        config.logging.access_log = false;
        Arc::new(AppState::new(&config))
    }

    fn request(method: &str, uri: &str, body: &'static str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Host", "example.org:8080")
            .header("Content-Length", body.len())
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    async fn send(req: Request<Full<Bytes>>, state: Arc<AppState>) -> (u16, String) {
        let response = handle_request(req, state, conn()).await.unwrap();
        let status = response.status().as_u16();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_post_is_echoed() {
        let (status, body) = send(
            request("POST", "/echo", "hello world"),
            state_with(Config::default()),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body, "POST_DATA=hello world\n");
    }

    #[tokio::test]
    async fn test_get_is_400() {
        let (status, body) = send(request("GET", "/echo", ""), state_with(Config::default())).await;
        assert_eq!(status, 400);
        assert_eq!(body, "No POST data received.\n");
    }

    #[tokio::test]
    async fn test_oversized_declared_body_is_413() {
        let mut config = Config::default();
        config.http.max_body_size = 4;
        let (status, _) = send(request("POST", "/echo", "hello"), state_with(config)).await;
        assert_eq!(status, 413);
    }

    #[tokio::test]
    async fn test_oversized_undeclared_body_is_413() {
        let mut config = Config::default();
        config.http.max_body_size = 4;
        let req = Request::builder()
            .method("POST")
            .uri("/echo")
            .body(Full::new(Bytes::from_static(b"hello")))
            .unwrap();
        let (status, _) = send(req, state_with(config)).await;
        assert_eq!(status, 413);
    }

    #[tokio::test]
    async fn test_cgi_max_body_size_maps_to_413() {
        let mut config = Config::default();
        config.cgi.max_body_size = Some(2);
        let (status, body) = send(request("POST", "/echo", "abc"), state_with(config)).await;
        assert_eq!(status, 413);
        assert_eq!(body, "413 Payload Too Large");
    }

    #[tokio::test]
    async fn test_empty_post_echoes_nothing() {
        let (status, body) =
            send(request("POST", "/echo", ""), state_with(Config::default())).await;
        assert_eq!(status, 200);
        assert_eq!(body, "POST_DATA=\n");
    }

    #[test]
    fn test_build_environment() {
        let req = Request::builder()
            .method("POST")
            .uri("/cgi-bin/echo?x=1&y=2")
            .header("Host", "example.org:8080")
            .header("Content-Type", "text/plain")
            .header("X-Request-Id", "abc")
            .header("Accept", "text/plain")
            .header("Accept", "*/*")
            .body(())
            .unwrap();
        let (parts, ()) = req.into_parts();
        let cgi_env = build_environment(&parts, 5, conn(), "cgi-echo/0.1");

        assert_eq!(cgi_env.var("REQUEST_METHOD").as_deref(), Some("POST"));
        assert_eq!(cgi_env.var("CONTENT_LENGTH").as_deref(), Some("5"));
        assert_eq!(cgi_env.var("CONTENT_TYPE").as_deref(), Some("text/plain"));
        assert_eq!(cgi_env.var("QUERY_STRING").as_deref(), Some("x=1&y=2"));
        assert_eq!(cgi_env.var("SCRIPT_NAME").as_deref(), Some("/cgi-bin/echo"));
        assert_eq!(cgi_env.var("SERVER_NAME").as_deref(), Some("example.org"));
        assert_eq!(cgi_env.var("SERVER_PORT").as_deref(), Some("8080"));
        assert_eq!(cgi_env.var("SERVER_PROTOCOL").as_deref(), Some("HTTP/1.1"));
        assert_eq!(cgi_env.var("SERVER_SOFTWARE").as_deref(), Some("cgi-echo/0.1"));
        assert_eq!(cgi_env.var("GATEWAY_INTERFACE").as_deref(), Some("CGI/1.1"));
        assert_eq!(cgi_env.var("REMOTE_ADDR").as_deref(), Some("10.0.0.7"));
        assert_eq!(cgi_env.var("HTTP_X_REQUEST_ID").as_deref(), Some("abc"));
        assert_eq!(cgi_env.var("HTTP_ACCEPT").as_deref(), Some("text/plain, */*"));
        assert_eq!(cgi_env.var("HTTP_CONTENT_TYPE"), None);
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("example.org:8080"), "example.org");
        assert_eq!(strip_port("example.org"), "example.org");
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
        assert_eq!(strip_port("[::1]"), "[::1]");
    }

    #[test]
    fn test_empty_body_sets_empty_content_length() {
        let (parts, ()) = Request::builder()
            .method("GET")
            .uri("/")
            .body(())
            .unwrap()
            .into_parts();
        let cgi_env = build_environment(&parts, 0, conn(), "s");
        assert_eq!(cgi_env.var("CONTENT_LENGTH").as_deref(), Some(""));
        assert_eq!(cgi_env.var("QUERY_STRING").as_deref(), Some(""));
        // No Host header: fall back to the local address
        assert_eq!(cgi_env.var("SERVER_NAME").as_deref(), Some("127.0.0.1"));
    }
}
