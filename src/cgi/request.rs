//! Inbound request model
//!
//! An [`InboundRequest`] lives for exactly one invocation. The method is read
//! eagerly, the body only when the handler takes the POST branch.

use std::io::Read;

use serde::{Deserialize, Serialize};

use super::env::{EnvironmentReader, CONTENT_LENGTH, REQUEST_METHOD};
use super::error::CgiError;

/// What to do with a `CONTENT_LENGTH` that is not a non-negative integer
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentLengthPolicy {
    /// Fail the invocation with [`CgiError::InvalidContentLength`]
    #[default]
    Strict,
    /// Log a warning and treat the length as 0
    Lenient,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    pub method: String,
    pub content_length: u64,
    pub body: Option<Vec<u8>>,
}

impl InboundRequest {
    /// Capture the method. Length and body stay empty until the POST branch.
    pub fn from_env<E: EnvironmentReader + ?Sized>(env: &E) -> Self {
        Self {
            method: env.var_or_empty(REQUEST_METHOD),
            content_length: 0,
            body: None,
        }
    }

    pub fn is_post(&self) -> bool {
        self.method == "POST"
    }

    /// Resolve `CONTENT_LENGTH` from `env` under `policy`
    pub fn load_content_length<E: EnvironmentReader + ?Sized>(
        &mut self,
        env: &E,
        policy: ContentLengthPolicy,
    ) -> Result<u64, CgiError> {
        self.content_length = parse_content_length(env.var(CONTENT_LENGTH).as_deref(), policy)?;
        Ok(self.content_length)
    }

    /// Read the body, up to `content_length` bytes
    pub fn read_body<R: Read + ?Sized>(&mut self, input: &mut R) -> Result<&[u8], CgiError> {
        let body = read_bounded(input, self.content_length)?;
        Ok(self.body.insert(body).as_slice())
    }

    /// Body decoded as text, invalid UTF-8 replaced
    pub fn body_text(&self) -> String {
        self.body
            .as_deref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }
}

/// Parse a textual `CONTENT_LENGTH`
///
/// Unset and blank values are 0 under either policy.
pub fn parse_content_length(
    raw: Option<&str>,
    policy: ContentLengthPolicy,
) -> Result<u64, CgiError> {
    let trimmed = raw.map_or("", str::trim);
    if trimmed.is_empty() {
        return Ok(0);
    }

    match trimmed.parse::<u64>() {
        Ok(length) => Ok(length),
        Err(_) => match policy {
            ContentLengthPolicy::Strict => Err(CgiError::InvalidContentLength {
                value: trimmed.to_string(),
            }),
            ContentLengthPolicy::Lenient => {
                crate::logger::log_warning(&format!(
                    "Invalid CONTENT_LENGTH '{trimmed}', treating as 0"
                ));
                Ok(0)
            }
        },
    }
}

/// Read up to `limit` bytes. A short stream is not an error.
pub fn read_bounded<R: Read + ?Sized>(input: &mut R, limit: u64) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(usize::try_from(limit.min(64 * 1024)).unwrap_or(0));
    input.take(limit).read_to_end(&mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgi::env::MapEnv;
    use std::io::Cursor;

    #[test]
    fn test_method_defaults_to_empty() {
        let req = InboundRequest::from_env(&MapEnv::new());
        assert_eq!(req.method, "");
        assert!(!req.is_post());
    }

    #[test]
    fn test_method_is_case_sensitive() {
        let req = InboundRequest::from_env(&MapEnv::new().with(REQUEST_METHOD, "post"));
        assert!(!req.is_post());
    }

    #[test]
    fn test_parse_content_length() {
        let strict = ContentLengthPolicy::Strict;
        assert_eq!(parse_content_length(None, strict).unwrap(), 0);
        assert_eq!(parse_content_length(Some(""), strict).unwrap(), 0);
        assert_eq!(parse_content_length(Some("  "), strict).unwrap(), 0);
        assert_eq!(parse_content_length(Some("11"), strict).unwrap(), 11);
        assert_eq!(parse_content_length(Some(" 42\n"), strict).unwrap(), 42);
    }

    #[test]
    fn test_strict_rejects_garbage() {
        let err = parse_content_length(Some("abc"), ContentLengthPolicy::Strict).unwrap_err();
        assert!(matches!(err, CgiError::InvalidContentLength { ref value } if value == "abc"));
    }

    #[test]
    fn test_strict_rejects_negative() {
        let result = parse_content_length(Some("-5"), ContentLengthPolicy::Strict);
        assert!(result.is_err());
    }

    #[test]
    fn test_lenient_defaults_garbage_to_zero() {
        let lenient = ContentLengthPolicy::Lenient;
        assert_eq!(parse_content_length(Some("abc"), lenient).unwrap(), 0);
        assert_eq!(parse_content_length(Some("-5"), lenient).unwrap(), 0);
    }

    #[test]
    fn test_read_bounded_stops_at_limit() {
        let mut input = Cursor::new(b"hello world, and more".to_vec());
        let body = read_bounded(&mut input, 11).unwrap();
        assert_eq!(body, b"hello world");
    }

    #[test]
    fn test_read_bounded_short_stream() {
        let mut input = Cursor::new(b"abc".to_vec());
        let body = read_bounded(&mut input, 100).unwrap();
        assert_eq!(body, b"abc");
    }

    #[test]
    fn test_read_body_and_text() {
        let env = MapEnv::new()
            .with(REQUEST_METHOD, "POST")
            .with(CONTENT_LENGTH, "5");
        let mut req = InboundRequest::from_env(&env);
        req.load_content_length(&env, ContentLengthPolicy::Strict)
            .unwrap();
        let mut input = Cursor::new(b"hello!".to_vec());
        assert_eq!(req.read_body(&mut input).unwrap(), b"hello");
        assert_eq!(req.body_text(), "hello");
    }

    #[test]
    fn test_body_text_replaces_invalid_utf8() {
        let req = InboundRequest {
            method: "POST".to_string(),
            content_length: 2,
            body: Some(vec![0x61, 0xff]),
        };
        assert_eq!(req.body_text(), "a\u{fffd}");
    }

    #[test]
    fn test_policy_deserializes_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: ContentLengthPolicy,
        }
        let w: Wrapper = toml::from_str("policy = \"lenient\"").unwrap();
        assert_eq!(w.policy, ContentLengthPolicy::Lenient);
    }
}
