//! CGI output parsing
//!
//! Splits what a CGI handler wrote into a header block and a body, and
//! pulls the `Status` pseudo-header out of the headers.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CgiOutputError {
    #[error("invalid Status header: '{value}'")]
    InvalidStatus { value: String },
}

/// Parsed CGI output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgiResponse {
    pub status: u16,
    /// Headers in output order, `Status` removed
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CgiResponse {
    /// First header named `name`, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Parse raw CGI output
///
/// The header block ends at the first `\r\n\r\n`, else the first `\n\n`.
/// Without either, the whole output is the body. An unparsable `Status`
/// is dropped with a warning and the status stays 200.
pub fn parse_cgi_output(output: &[u8]) -> CgiResponse {
    let (header_block, body) = split_header_block(output);

    let mut response = CgiResponse {
        status: 200,
        headers: Vec::new(),
        body: body.to_vec(),
    };

    let header_text = String::from_utf8_lossy(header_block);
    for line in header_text.lines() {
        let line = line.trim_end_matches('\r');
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim_start_matches([' ', '\t']);

        if key.eq_ignore_ascii_case("status") {
            match parse_status(value) {
                Ok(status) => response.status = status,
                Err(e) => crate::logger::log_warning(&e.to_string()),
            }
            continue;
        }
        response.headers.push((key.to_string(), value.to_string()));
    }

    response
}

fn split_header_block(output: &[u8]) -> (&[u8], &[u8]) {
    if let Some(pos) = find(output, b"\r\n\r\n") {
        return (&output[..pos], &output[pos + 4..]);
    }
    if let Some(pos) = find(output, b"\n\n") {
        return (&output[..pos], &output[pos + 2..]);
    }
    (&[], output)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parse `"<code> [reason]"` into the code. The reason phrase is dropped and
/// responses carry the canonical one.
pub fn parse_status(value: &str) -> Result<u16, CgiOutputError> {
    let invalid = || CgiOutputError::InvalidStatus {
        value: value.to_string(),
    };

    let value = value.trim();
    let code = value.split_once(' ').map_or(value, |(code, _)| code);
    let code: u16 = code.parse().map_err(|_| invalid())?;
    if !(100..=999).contains(&code) {
        return Err(invalid());
    }

    Ok(code)
}
