//! # cgi-echo
//!
//! A CGI handler that echoes POST bodies back as `POST_DATA=<body>` and
//! answers every other method with a fixed bad-request text.
//!
//! The handler is driven by explicit capabilities instead of process
//! globals: an [`cgi::EnvironmentReader`] for the request variables and
//! generic `Read`/`Write` streams for the body and the response. The binary
//! runs it once over the real environment and stdio (CGI mode), or hosts it
//! behind an HTTP/1.1 listener (`--serve`).
//!
//! ```
//! use cgi_echo::cgi::{MapEnv, Outcome, RequestHandler};
//!
//! let env = MapEnv::new()
//!     .with("REQUEST_METHOD", "POST")
//!     .with("CONTENT_LENGTH", "5");
//! let mut output = Vec::new();
//! let outcome = RequestHandler::default()
//!     .handle(&env, &mut &b"hello"[..], &mut output)
//!     .unwrap();
//!
//! assert_eq!(outcome, Outcome::PostHandled { bytes_read: 5 });
//! assert_eq!(output, b"Content-Type: text/plain\n\nPOST_DATA=hello\n");
//! ```

pub mod cgi;
pub mod config;
pub mod http;
pub mod logger;
pub mod server;
