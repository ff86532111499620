//! Wire framing for requests and responses.
//!
//! # Frame Layout
//!
//! ```text
//! request  := route SP protocol CRLF header* CRLF body
//! response := status SP message CRLF header* CRLF body
//! header   := key ":" SP value CRLF
//! ```
//!
//! The header block ends at the first `\r\n\r\n`. A request carries a body
//! only when it declares `Content-Length`; a response always declares it,
//! even for an empty body. Exactly `Content-Length` bytes follow the block.
//!
//! # Limits
//!
//! The block and the declared body are capped by [`FrameLimits`]. The
//! defaults are generous; [`FrameLimits::unbounded`] disables both caps.

use crate::error::{Error, Result};
use crate::message::{Headers, Request, Response};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Terminates the header block.
pub const DELIMITER: &[u8; 4] = b"\r\n\r\n";

/// Declared body length.
pub const CONTENT_LENGTH: &str = "Content-Length";

/// Address the sender dialed, written on every request.
pub const DESTINATION_ADDRESS: &str = "Destination-Address";

/// Size caps applied while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    /// Largest header block, delimiter included.
    pub max_head: usize,
    /// Largest declared `Content-Length`.
    pub max_body: usize,
}

impl FrameLimits {
    /// No caps beyond what the peer declares.
    pub const fn unbounded() -> Self {
        Self {
            max_head: usize::MAX,
            max_body: usize::MAX,
        }
    }
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_head: 64 * 1024,
            max_body: 16 * 1024 * 1024,
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Append the request line and header block of `request` to `dst`.
///
/// `Content-Length` is written only for a non-empty body and
/// `Destination-Address` is always written (empty when unknown). Caller
/// headers with either name are skipped so the framing headers win.
///
/// # Errors
/// [`Error::Parse`] if a field would break the framing: a space in the
/// route or protocol, a colon in a header key, or a line break anywhere.
pub fn encode_request_head<C>(request: &Request<C>, dst: &mut BytesMut) -> Result<()> {
    check_token("route", &request.route)?;
    check_token("protocol", &request.protocol)?;

    put_line(dst, &[request.route.as_bytes(), b" ", request.protocol.as_bytes()]);
    if !request.body.is_empty() {
        put_header(dst, CONTENT_LENGTH, &request.body.len().to_string());
    }
    let destination = request
        .destination
        .map(|addr| addr.to_string())
        .unwrap_or_default();
    put_header(dst, DESTINATION_ADDRESS, &destination);
    put_headers(dst, &request.headers, &[CONTENT_LENGTH, DESTINATION_ADDRESS])?;
    dst.extend_from_slice(b"\r\n");
    Ok(())
}

/// Append the status line and header block of `response` to `dst`.
///
/// `Content-Length` always reflects the exact body length, replacing any
/// value the handler set.
pub fn encode_response_head(response: &Response, dst: &mut BytesMut) -> Result<()> {
    check_line("message", &response.message)?;

    put_line(
        dst,
        &[response.status.to_string().as_bytes(), b" ", response.message.as_bytes()],
    );
    put_header(dst, CONTENT_LENGTH, &response.body.len().to_string());
    put_headers(dst, &response.headers, &[CONTENT_LENGTH])?;
    dst.extend_from_slice(b"\r\n");
    Ok(())
}

/// Encode a full request frame into one buffer.
pub fn encode_request<C>(request: &Request<C>) -> Result<BytesMut> {
    let mut dst = BytesMut::with_capacity(128 + request.body.len());
    encode_request_head(request, &mut dst)?;
    dst.extend_from_slice(&request.body);
    Ok(dst)
}

/// Encode a full response frame into one buffer.
pub fn encode_response(response: &Response) -> Result<BytesMut> {
    let mut dst = BytesMut::with_capacity(128 + response.body.len());
    encode_response_head(response, &mut dst)?;
    dst.extend_from_slice(&response.body);
    Ok(dst)
}

/// Write `request` to a stream. Nothing is written if the request cannot be framed.
pub async fn write_request<W, C>(writer: &mut W, request: &Request<C>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut head = BytesMut::with_capacity(128);
    encode_request_head(request, &mut head)?;
    writer.write_all(&head).await?;
    if !request.body.is_empty() {
        writer.write_all(&request.body).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Write `response` to a stream. Nothing is written if the response cannot be framed.
pub async fn write_response<W>(writer: &mut W, response: &Response) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut head = BytesMut::with_capacity(128);
    encode_response_head(response, &mut head)?;
    writer.write_all(&head).await?;
    writer.write_all(&response.body).await?;
    writer.flush().await?;
    Ok(())
}

fn put_line(dst: &mut BytesMut, parts: &[&[u8]]) {
    for part in parts {
        dst.extend_from_slice(part);
    }
    dst.extend_from_slice(b"\r\n");
}

fn put_header(dst: &mut BytesMut, key: &str, value: &str) {
    put_line(dst, &[key.as_bytes(), b": ", value.as_bytes()]);
}

fn put_headers(dst: &mut BytesMut, headers: &Headers, reserved: &[&str]) -> Result<()> {
    for (key, value) in headers {
        if reserved.contains(&key.as_str()) {
            continue;
        }
        if key.contains(':') {
            return Err(Error::parse(format!("header key {key:?} contains ':'")));
        }
        check_line("header key", key)?;
        check_line("header value", value)?;
        put_header(dst, key, value);
    }
    Ok(())
}

fn check_token(what: &str, value: &str) -> Result<()> {
    if value.contains(' ') {
        return Err(Error::parse(format!("{what} {value:?} contains a space")));
    }
    check_line(what, value)
}

fn check_line(what: &str, value: &str) -> Result<()> {
    if value.contains(['\r', '\n']) {
        return Err(Error::parse(format!("{what} contains a line break")));
    }
    Ok(())
}

// ============================================================================
// Decoding
// ============================================================================

/// Read bytes up to and including the first `\r\n\r\n`.
///
/// Matching is byte-at-a-time: on a mismatch the match position restarts at
/// 1 if the byte is `\r` and at 0 otherwise, which is exact for this
/// delimiter.
///
/// # Errors
/// - [`Error::Io`] with `UnexpectedEof` if the stream ends first
/// - [`Error::FrameTooLarge`] once the block passes `max_head` bytes
pub async fn read_head<R>(reader: &mut R, max_head: usize) -> Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut head = Vec::with_capacity(256);
    let mut matched = 0;

    loop {
        let byte = reader.read_u8().await?;
        head.push(byte);
        if head.len() > max_head {
            return Err(Error::FrameTooLarge {
                len: head.len(),
                max: max_head,
            });
        }

        if byte == DELIMITER[matched] {
            matched += 1;
            if matched == DELIMITER.len() {
                return Ok(head);
            }
        } else if byte == DELIMITER[0] {
            matched = 1;
        } else {
            matched = 0;
        }
    }
}

/// Read one request frame.
///
/// The request line must be exactly `route SP protocol`. A parseable
/// `Destination-Address` header also fills [`Request::destination`].
pub async fn read_request<R, C>(reader: &mut R, limits: &FrameLimits) -> Result<Request<C>>
where
    R: AsyncBufRead + Unpin,
{
    let head = read_head(reader, limits.max_head).await?;
    let (first, headers) = split_head(&head)?;

    let tokens: Vec<&str> = first.split(' ').collect();
    let (route, protocol) = match tokens.as_slice() {
        [route, protocol] => (*route, *protocol),
        _ => return Err(Error::parse(format!("invalid request line {first:?}"))),
    };

    let body = read_body(reader, &headers, limits).await?;
    let destination = headers
        .get(DESTINATION_ADDRESS)
        .and_then(|value| value.parse().ok());

    let mut request = Request::new(route);
    request.protocol = protocol.to_string();
    request.headers = headers;
    request.body = body;
    request.destination = destination;
    Ok(request)
}

/// Read one response frame.
///
/// Everything after the first space of the status line is the message.
pub async fn read_response<R>(reader: &mut R, limits: &FrameLimits) -> Result<Response>
where
    R: AsyncBufRead + Unpin,
{
    let head = read_head(reader, limits.max_head).await?;
    let (first, headers) = split_head(&head)?;

    let (code, message) = first.split_once(' ').unwrap_or((first, ""));
    let status = code
        .parse::<u16>()
        .map_err(|_| Error::parse(format!("invalid status code {code:?}")))?;

    let body = read_body(reader, &headers, limits).await?;

    let mut response = Response::new(status, message);
    response.headers = headers;
    response.body = body;
    Ok(response)
}

/// Split a header block into its first line and header map.
fn split_head(head: &[u8]) -> Result<(&str, Headers)> {
    let text =
        std::str::from_utf8(head).map_err(|_| Error::parse("header block is not UTF-8"))?;
    let mut lines = text.split("\r\n");
    let first = lines.next().unwrap_or_default();

    let mut headers = Headers::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    Ok((first, headers))
}

async fn read_body<R>(reader: &mut R, headers: &Headers, limits: &FrameLimits) -> Result<Bytes>
where
    R: AsyncBufRead + Unpin,
{
    let Some(declared) = headers.get(CONTENT_LENGTH) else {
        return Ok(Bytes::new());
    };
    let len = declared
        .parse::<usize>()
        .map_err(|_| Error::parse(format!("invalid Content-Length {declared:?}")))?;
    if len > limits.max_body {
        return Err(Error::FrameTooLarge {
            len,
            max: limits.max_body,
        });
    }

    let mut body = vec![0; len];
    reader.read_exact(&mut body).await?;
    Ok(Bytes::from(body))
}
