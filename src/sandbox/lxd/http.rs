//! Minimal blocking HTTP/1.1 client over a unix socket.
//!
//! One request per connection (`Connection: close`), which is all the LXD
//! API calls here need.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use tracing::trace;

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Send one request over the socket and read the whole response.
pub fn request(
    socket: &Path,
    method: &str,
    path: &str,
    body: Option<&[u8]>,
) -> Result<Response, HttpError> {
    trace!(socket = %socket.display(), method, path, "http:request");
    let mut stream = UnixStream::connect(socket)?;

    let mut head = format!("{method} {path} HTTP/1.1\r\nHost: lxd\r\nConnection: close\r\n");
    if let Some(body) = body {
        head.push_str("Content-Type: application/json\r\n");
        head.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    head.push_str("\r\n");
    stream.write_all(head.as_bytes())?;
    if let Some(body) = body {
        stream.write_all(body)?;
    }

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw)?;
    let response = parse_response(&raw)?;
    trace!(status = response.status, len = response.body.len(), "http:response");
    Ok(response)
}

/// Split a raw HTTP response into status and decoded body.
pub fn parse_response(raw: &[u8]) -> Result<Response, HttpError> {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or_else(|| HttpError::Malformed("missing header delimiter".to_string()))?;
    let header_text = String::from_utf8_lossy(&raw[..split]);
    let payload = &raw[split + 4..];

    let mut lines = header_text.lines();
    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| HttpError::Malformed("invalid status line".to_string()))?;

    let mut chunked = false;
    let mut content_length = None;
    for (key, value) in lines.filter_map(|line| line.split_once(':')) {
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        if key == "transfer-encoding" && value.eq_ignore_ascii_case("chunked") {
            chunked = true;
        } else if key == "content-length" {
            content_length = value.parse::<usize>().ok();
        }
    }

    let body = if chunked {
        decode_chunked(payload)?
    } else if let Some(len) = content_length {
        payload
            .get(..len)
            .ok_or_else(|| HttpError::Malformed("body shorter than content-length".to_string()))?
            .to_vec()
    } else {
        payload.to_vec()
    };

    Ok(Response { status, body })
}

fn decode_chunked(mut data: &[u8]) -> Result<Vec<u8>, HttpError> {
    let mut body = Vec::new();
    loop {
        let line_end = data
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or_else(|| HttpError::Malformed("unterminated chunk size".to_string()))?;
        let size_text = String::from_utf8_lossy(&data[..line_end]);
        // Chunk extensions follow a ';'.
        let size_text = size_text.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_text, 16)
            .map_err(|_| HttpError::Malformed(format!("invalid chunk size {size_text:?}")))?;
        data = &data[line_end + 2..];
        if size == 0 {
            return Ok(body);
        }
        let chunk = data
            .get(..size)
            .ok_or_else(|| HttpError::Malformed("truncated chunk".to_string()))?;
        body.extend_from_slice(chunk);
        data = data.get(size + 2..).unwrap_or_default();
    }
}
