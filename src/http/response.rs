//! HTTP response building module
//!
//! Builds gateway responses from parsed CGI output and from failures.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;

use super::cgi_output::CgiResponse;
use crate::cgi::CgiError;

/// Content type assumed when the CGI output names none
pub const DEFAULT_CGI_CONTENT_TYPE: &str = "text/html";

/// Build the HTTP response for parsed CGI output
///
/// Hop-by-hop framing stays with the server: `Content-Length` is recomputed
/// and any length the handler wrote is ignored.
pub fn build_cgi_response(cgi: CgiResponse, server_name: &str) -> Response<Full<Bytes>> {
    let content_length = cgi.body.len();
    let mut builder = Response::builder()
        .status(cgi.status)
        .header("Server", server_name);

    for (name, value) in &cgi.headers {
        if name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }
    if cgi.header("content-type").is_none() {
        builder = builder.header("Content-Type", DEFAULT_CGI_CONTENT_TYPE);
    }

    builder
        .header("Content-Length", content_length)
        .body(Full::new(Bytes::from(cgi.body)))
        .unwrap_or_else(|e| {
            log_build_error("CGI", &e);
            build_plain_response(502, server_name, "502 Bad Gateway")
        })
}

/// Build 413 Payload Too Large response
pub fn build_413_response(server_name: &str) -> Response<Full<Bytes>> {
    build_plain_response(413, server_name, "413 Payload Too Large")
}

/// Build 500 Internal Server Error response
pub fn build_500_response(server_name: &str) -> Response<Full<Bytes>> {
    build_plain_response(500, server_name, "500 Internal Server Error")
}

/// Build the response for a failed handler run
pub fn build_error_response(err: &CgiError, server_name: &str) -> Response<Full<Bytes>> {
    let status = err.status_code();
    let message = match err {
        CgiError::InvalidContentLength { .. } => "400 Bad Request",
        CgiError::BodyTooLarge { .. } => "413 Payload Too Large",
        CgiError::Io(_) => "500 Internal Server Error",
    };
    build_plain_response(status, server_name, message)
}

fn build_plain_response(
    status: u16,
    server_name: &str,
    message: &'static str,
) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Server", server_name)
        .header("Content-Type", "text/plain")
        .header("Content-Length", message.len())
        .body(Full::new(Bytes::from_static(message.as_bytes())))
        .unwrap_or_else(|e| {
            log_build_error(message, &e);
            Response::new(Full::new(Bytes::from_static(message.as_bytes())))
        })
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::parse_cgi_output;
    use http_body_util::BodyExt;

    async fn body_string(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_cgi_post_response() {
        let cgi = parse_cgi_output(b"Content-Type: text/plain\n\nPOST_DATA=hi\n");
        let response = build_cgi_response(cgi, "test/1");
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["content-type"], "text/plain");
        assert_eq!(response.headers()["content-length"], "13");
        assert_eq!(response.headers()["server"], "test/1");
        assert_eq!(body_string(response).await, "POST_DATA=hi\n");
    }

    #[tokio::test]
    async fn test_cgi_bad_request_response() {
        let cgi = parse_cgi_output(
            b"Content-Type: text/plain\nSTATUS: 400 Bad Request\n\nNo POST data received.\n",
        );
        let response = build_cgi_response(cgi, "test/1");
        assert_eq!(response.status(), 400);
        assert_eq!(body_string(response).await, "No POST data received.\n");
    }

    #[test]
    fn test_default_content_type() {
        let cgi = parse_cgi_output(b"X-Test: 1\n\nbody");
        let response = build_cgi_response(cgi, "test/1");
        assert_eq!(response.headers()["content-type"], DEFAULT_CGI_CONTENT_TYPE);
        assert_eq!(response.headers()["x-test"], "1");
    }

    #[test]
    fn test_handler_content_length_is_replaced() {
        let cgi = parse_cgi_output(b"Content-Length: 999\n\nabc");
        let response = build_cgi_response(cgi, "test/1");
        assert_eq!(response.headers().get_all("content-length").iter().count(), 1);
        assert_eq!(response.headers()["content-length"], "3");
    }

    #[test]
    fn test_invalid_header_name_is_502() {
        let cgi = parse_cgi_output(b"Bad Header: x\n\nabc");
        let response = build_cgi_response(cgi, "test/1");
        assert_eq!(response.status(), 502);
    }

    #[test]
    fn test_error_responses() {
        let invalid = CgiError::InvalidContentLength {
            value: "x".to_string(),
        };
        assert_eq!(build_error_response(&invalid, "s").status(), 400);
        let io = CgiError::Io(std::io::Error::other("boom"));
        assert_eq!(build_error_response(&io, "s").status(), 500);
        assert_eq!(build_413_response("s").status(), 413);
        assert_eq!(build_500_response("s").status(), 500);
    }
}
