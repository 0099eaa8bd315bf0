//! CGI request handling
//!
//! The core of the crate: a request handler that reads its invocation
//! through an [`EnvironmentReader`] and generic byte streams.

pub mod env;
pub mod error;
pub mod handler;
pub mod request;

pub use env::{EnvironmentReader, MapEnv, ProcessEnv};
pub use error::CgiError;
pub use handler::{HandlerOptions, Outcome, RequestHandler};
pub use request::{ContentLengthPolicy, InboundRequest};
