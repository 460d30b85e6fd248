//! Minimal HTTP/1.1 framing for the hand-driven tunnel.
//!
//! Requests are always `GET` with `Connection: close`, so a response is
//! everything the server writes before closing. The parser splits the head
//! from the body and undoes chunked transfer encoding; nothing is
//! decompressed, which is why requests insist on `Accept-Encoding: identity`.

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use url::Url;

/// Upper bound on a buffered response; anything beyond is dropped.
pub const MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024;
/// Upper bound on a CONNECT reply head.
pub const MAX_HEAD_BYTES: usize = 16 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResponseParseError {
    #[error("response ended before the header terminator")]
    IncompleteHead,
    #[error("malformed status line: {0}")]
    MalformedStatusLine(String),
}

/// Parsed response head plus the (de-chunked) body.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Request target (`path?query`) for `url`.
pub fn request_target(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// `Host` header value; the port is only spelled out when it is not the
/// scheme default.
pub fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Serialize a `GET` request. Header order is preserved as given.
pub fn build_get_request(url: &Url, headers: &[(String, String)]) -> String {
    let mut request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\n",
        request_target(url),
        host_header(url)
    );
    for (name, value) in headers {
        request.push_str(name);
        request.push_str(": ");
        request.push_str(value);
        request.push_str("\r\n");
    }
    request.push_str("\r\n");
    request
}

/// Serialize the proxy `CONNECT` request for `authority` (`host:port`).
pub fn build_connect_request(authority: &str, proxy_authorization: &str, user_agent: &str) -> String {
    format!(
        "CONNECT {authority} HTTP/1.1\r\n\
         Host: {authority}\r\n\
         Proxy-Authorization: {proxy_authorization}\r\n\
         User-Agent: {user_agent}\r\n\
         Proxy-Connection: keep-alive\r\n\
         \r\n"
    )
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Returns `(head_len, separator_len)` where the body starts at
/// `head_len + separator_len`.
fn head_boundary(raw: &[u8]) -> Option<(usize, usize)> {
    if let Some(pos) = find(raw, b"\r\n\r\n") {
        return Some((pos, 4));
    }
    find(raw, b"\n\n").map(|pos| (pos, 2))
}

/// Status code from an `HTTP/1.x NNN reason` line.
pub fn parse_status_line(line: &str) -> Result<u16, ResponseParseError> {
    let mut parts = line.split_whitespace();
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(ResponseParseError::MalformedStatusLine(line.to_string()));
    }
    parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| ResponseParseError::MalformedStatusLine(line.to_string()))
}

/// Parse only the status code out of a response head (used for CONNECT).
pub fn parse_head_status(head: &[u8]) -> Result<u16, ResponseParseError> {
    let text = String::from_utf8_lossy(head);
    let line = text.lines().next().unwrap_or_default();
    parse_status_line(line.trim())
}

/// Split a full response into status, headers and body, de-chunking when
/// `Transfer-Encoding: chunked` is announced.
pub fn parse_response(raw: &[u8]) -> Result<RawResponse, ResponseParseError> {
    let (head_len, sep_len) = head_boundary(raw).ok_or(ResponseParseError::IncompleteHead)?;
    let head = String::from_utf8_lossy(&raw[..head_len]);
    let mut lines = head.lines();
    let status = parse_status_line(lines.next().unwrap_or_default().trim())?;

    let mut headers = HeaderMap::new();
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.trim().as_bytes()),
            HeaderValue::from_str(value.trim()),
        ) {
            headers.append(name, value);
        }
    }

    let body = &raw[head_len + sep_len..];
    let chunked = headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.to_ascii_lowercase().contains("chunked"));

    let body = if chunked {
        decode_chunked(body)
    } else {
        let declared = headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<usize>().ok());
        match declared {
            Some(len) if len < body.len() => body[..len].to_vec(),
            _ => body.to_vec(),
        }
    };

    Ok(RawResponse {
        status,
        headers,
        body: Bytes::from(body),
    })
}

/// Reassemble a chunked body. Chunk extensions and trailers are ignored;
/// a truncated stream yields whatever was complete.
pub fn decode_chunked(mut data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    loop {
        let Some(line_end) = find(data, b"\r\n") else {
            break;
        };
        let size_line = String::from_utf8_lossy(&data[..line_end]);
        let size_hex = size_line.split(';').next().unwrap_or_default().trim();
        let Ok(size) = usize::from_str_radix(size_hex, 16) else {
            break;
        };
        data = &data[line_end + 2..];
        if size == 0 {
            break;
        }

        let take = size.min(data.len());
        out.extend_from_slice(&data[..take]);
        data = &data[take..];
        if take < size {
            break;
        }
        if data.starts_with(b"\r\n") {
            data = &data[2..];
        }
    }
    out
}

/// Read until the peer closes. A TLS peer that hangs up without
/// `close_notify` surfaces as `UnexpectedEof`; once bytes have arrived
/// that is treated as a normal end of stream.
pub async fn read_to_close<S>(stream: &mut S) -> std::io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(64 * 1024);
    let mut chunk = vec![0u8; 16 * 1024];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.len() >= MAX_RESPONSE_BYTES {
                    log::warn!("response exceeded {MAX_RESPONSE_BYTES} bytes; truncating");
                    buf.truncate(MAX_RESPONSE_BYTES);
                    break;
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof && !buf.is_empty() => break,
            Err(err) => return Err(err),
        }
    }
    Ok(buf)
}

/// Read a response head (up to and including the blank line) and nothing
/// more, so no tunneled bytes are consumed.
pub async fn read_head<S>(stream: &mut S) -> std::io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            break;
        }
        head.push(byte[0]);
        if head.ends_with(b"\r\n\r\n") || head.ends_with(b"\n\n") || head.len() >= MAX_HEAD_BYTES {
            break;
        }
    }
    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dechunks_known_fixture_exactly() {
        let payload = "<html><body>Sponsored results</body></html>";
        let chunked = "7\r\n<html><\r\n\
                       19;ext=1\r\nbody>Sponsored results</b\r\n\
                       b\r\nody></html>\r\n\
                       0\r\n\r\n";
        assert_eq!(decode_chunked(chunked.as_bytes()), payload.as_bytes());
    }

    #[test]
    fn dechunk_keeps_complete_prefix_of_truncated_stream() {
        let chunked = b"5\r\nhello\r\n10\r\nwor";
        assert_eq!(decode_chunked(chunked), b"hellowor");
    }

    #[test]
    fn parses_chunked_response() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
        let response = parse_response(raw).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"Wikipedia");
        assert_eq!(response.headers.get("content-type").unwrap(), "text/html");
    }

    #[test]
    fn honours_content_length() {
        let raw = b"HTTP/1.1 429 Too Many Requests\r\nContent-Length: 5\r\n\r\nslow down";
        let response = parse_response(raw).unwrap();
        assert_eq!(response.status, 429);
        assert_eq!(&response.body[..], b"slow ");
    }

    #[test]
    fn rejects_missing_head_terminator() {
        assert_eq!(
            parse_response(b"HTTP/1.1 200 OK\r\nContent-Type").unwrap_err(),
            ResponseParseError::IncompleteHead
        );
    }

    #[test]
    fn rejects_garbage_status_line() {
        assert!(matches!(
            parse_response(b"SSH-2.0-OpenSSH\r\n\r\n"),
            Err(ResponseParseError::MalformedStatusLine(_))
        ));
    }

    #[test]
    fn builds_get_request_with_query() {
        let url = Url::parse("https://www.google.com/search?q=fiber+internet&hl=en").unwrap();
        let request = build_get_request(
            &url,
            &[("Connection".to_string(), "close".to_string())],
        );
        assert!(request.starts_with("GET /search?q=fiber+internet&hl=en HTTP/1.1\r\nHost: www.google.com\r\n"));
        assert!(request.ends_with("Connection: close\r\n\r\n"));
    }

    #[test]
    fn host_header_keeps_non_default_port() {
        let url = Url::parse("https://127.0.0.1:8443/").unwrap();
        assert_eq!(host_header(&url), "127.0.0.1:8443");
    }

    #[tokio::test]
    async fn read_head_stops_at_blank_line() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            server
                .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n\x16\x03\x01")
                .await
                .unwrap();
        });
        let head = read_head(&mut client).await.unwrap();
        assert_eq!(parse_head_status(&head).unwrap(), 200);
        assert!(head.ends_with(b"\r\n\r\n"));
    }
}
