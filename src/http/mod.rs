//! HTTP protocol layer module
//!
//! Translates between CGI output and HTTP responses for the gateway.

pub mod cgi_output;
pub mod response;

// Re-export commonly used types
pub use cgi_output::{parse_cgi_output, CgiOutputError, CgiResponse};
pub use response::{
    build_413_response, build_500_response, build_cgi_response, build_error_response,
};
