//! The POST echo handler
//!
//! Writes `Content-Type: text/plain` first, then either echoes the body as
//! `POST_DATA=<body>` or answers with the fixed bad-request text.

use std::io::{Read, Write};

use super::env::EnvironmentReader;
use super::error::CgiError;
use super::request::{ContentLengthPolicy, InboundRequest};

pub const CONTENT_TYPE_LINE: &str = "Content-Type: text/plain";
pub const BAD_REQUEST_STATUS_LINE: &str = "STATUS: 400 Bad Request";
pub const BAD_REQUEST_BODY: &str = "No POST data received.";
pub const POST_DATA_PREFIX: &str = "POST_DATA=";

/// Handler options, taken from the `[cgi]` config section
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerOptions {
    pub content_length_policy: ContentLengthPolicy,
    /// Refuse POST bodies whose declared length exceeds this
    pub max_body_size: Option<u64>,
}

/// Terminal state of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    PostHandled { bytes_read: usize },
    BadRequest,
}

impl Outcome {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::PostHandled { .. } => "post_handled",
            Self::BadRequest => "bad_request",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestHandler {
    options: HandlerOptions,
}

impl RequestHandler {
    pub const fn new(options: HandlerOptions) -> Self {
        Self { options }
    }

    pub const fn options(&self) -> &HandlerOptions {
        &self.options
    }

    /// Run one invocation
    ///
    /// `input` is only read in the POST branch. `output` is flushed before
    /// returning, also on the error paths that come after the first write.
    pub fn handle<E, R, W>(
        &self,
        env: &E,
        input: &mut R,
        output: &mut W,
    ) -> Result<Outcome, CgiError>
    where
        E: EnvironmentReader + ?Sized,
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let mut request = InboundRequest::from_env(env);
        writeln!(output, "{CONTENT_TYPE_LINE}")?;

        let result = if request.is_post() {
            self.echo_post(&mut request, env, input, output)
        } else {
            write_bad_request(output).map(|()| Outcome::BadRequest)
        };

        output.flush()?;
        result
    }

    fn echo_post<E, R, W>(
        &self,
        request: &mut InboundRequest,
        env: &E,
        input: &mut R,
        output: &mut W,
    ) -> Result<Outcome, CgiError>
    where
        E: EnvironmentReader + ?Sized,
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let length = request.load_content_length(env, self.options.content_length_policy)?;
        if let Some(limit) = self.options.max_body_size {
            if length > limit {
                return Err(CgiError::BodyTooLarge { length, limit });
            }
        }

        let bytes_read = request.read_body(input)?.len();
        if u64::try_from(bytes_read).unwrap_or(u64::MAX) < length {
            crate::logger::log_debug(&format!(
                "Short body: read {bytes_read} of {length} declared bytes"
            ));
        }

        writeln!(output)?;
        writeln!(output, "{POST_DATA_PREFIX}{}", request.body_text())?;
        Ok(Outcome::PostHandled { bytes_read })
    }
}

fn write_bad_request<W: Write + ?Sized>(output: &mut W) -> Result<(), CgiError> {
    writeln!(output, "{BAD_REQUEST_STATUS_LINE}")?;
    writeln!(output)?;
    writeln!(output, "{BAD_REQUEST_BODY}")?;
    Ok(())
}
