//! RESP2 framing.
//!
//! Commands are encoded as arrays of bulk strings. Replies are parsed from a
//! growing byte buffer; an incomplete frame yields `None` so the caller can read
//! more bytes and try again.

use crate::error::{KvError, KvResult};

/// A decoded RESP2 reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    Simple(String),
    Error(String),
    Integer(i64),
    /// Bulk string; `None` is the null bulk (and the null array).
    Bulk(Option<Vec<u8>>),
    Array(Vec<RespValue>),
}

/// Encodes a RESP2 array command into the provided buffer.
pub fn encode_command(args: &[Vec<u8>], out: &mut Vec<u8>) {
    out.push(b'*');
    out.extend_from_slice(args.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    for arg in args {
        out.push(b'$');
        out.extend_from_slice(arg.len().to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

/// Parse one complete frame from the front of `buf`.
///
/// Returns the value and the number of bytes it occupied.
pub fn parse_frame(buf: &[u8]) -> KvResult<Option<(RespValue, usize)>> {
    let Some(line_end) = find_crlf(buf) else {
        return Ok(None);
    };
    if line_end == 0 {
        return Err(protocol_error("empty frame header"));
    }

    let line = &buf[1..line_end];
    let header_len = line_end + 2;

    match buf[0] {
        b'+' => Ok(Some((RespValue::Simple(text(line)), header_len))),
        b'-' => Ok(Some((RespValue::Error(text(line)), header_len))),
        b':' => Ok(Some((RespValue::Integer(parse_i64(line)?), header_len))),
        b'$' => {
            let len = parse_i64(line)?;
            if len < 0 {
                return Ok(Some((RespValue::Bulk(None), header_len)));
            }
            let end = bulk_end(header_len, len)?;
            if buf.len() < end + 2 {
                return Ok(None);
            }
            if &buf[end..end + 2] != b"\r\n" {
                return Err(protocol_error("bulk string missing terminator"));
            }
            let data = buf[header_len..end].to_vec();
            Ok(Some((RespValue::Bulk(Some(data)), end + 2)))
        }
        b'*' => {
            let len = parse_i64(line)?;
            if len < 0 {
                return Ok(Some((RespValue::Bulk(None), header_len)));
            }
            let mut items = Vec::with_capacity((len as usize).min(1024));
            let mut offset = header_len;
            for _ in 0..len {
                match parse_frame(&buf[offset..])? {
                    Some((item, used)) => {
                        items.push(item);
                        offset += used;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((RespValue::Array(items), offset)))
        }
        other => Err(protocol_error(&format!(
            "unexpected frame prefix '{}'",
            other as char
        ))),
    }
}

/// Resumable completeness check for the frame at the front of a growing buffer.
///
/// Each call continues from where the last one stopped, so a large reply that
/// arrives over many reads is walked once instead of once per read.
#[derive(Debug, Default)]
pub struct FrameScanner {
    /// Offset of the next element header not yet accounted for.
    offset: usize,
    /// Elements still owed by each open array, innermost last.
    open: Vec<i64>,
}

impl FrameScanner {
    /// Decode the next frame once `buf` holds all of it.
    ///
    /// `buf` must only grow between calls until a frame is returned; the
    /// scanner then starts over for the next frame.
    pub fn next_frame(&mut self, buf: &[u8]) -> KvResult<Option<(RespValue, usize)>> {
        let Some(end) = self.scan(buf)? else {
            return Ok(None);
        };
        let frame = parse_frame(&buf[..end])?
            .ok_or_else(|| protocol_error("frame shorter than scanned"))?;
        Ok(Some(frame))
    }

    /// Total length of the first frame, once complete.
    fn scan(&mut self, buf: &[u8]) -> KvResult<Option<usize>> {
        loop {
            let rest = &buf[self.offset..];
            let Some(line_end) = find_crlf(rest) else {
                return Ok(None);
            };
            if line_end == 0 {
                return Err(protocol_error("empty frame header"));
            }
            let header_len = line_end + 2;

            let element_len = match rest[0] {
                b'+' | b'-' | b':' => header_len,
                b'$' => {
                    let len = parse_i64(&rest[1..line_end])?;
                    if len < 0 {
                        header_len
                    } else {
                        let total = bulk_end(header_len, len)?
                            .checked_add(2)
                            .ok_or_else(|| protocol_error("bulk length out of range"))?;
                        if rest.len() < total {
                            return Ok(None);
                        }
                        total
                    }
                }
                b'*' => {
                    let len = parse_i64(&rest[1..line_end])?;
                    if len > 0 {
                        self.offset += header_len;
                        self.open.push(len);
                        continue;
                    }
                    header_len
                }
                other => {
                    return Err(protocol_error(&format!(
                        "unexpected frame prefix '{}'",
                        other as char
                    )))
                }
            };
            self.offset += element_len;

            // close every array this element completes
            loop {
                match self.open.last_mut() {
                    None => {
                        let end = self.offset;
                        *self = Self::default();
                        return Ok(Some(end));
                    }
                    Some(remaining) => {
                        *remaining -= 1;
                        if *remaining > 0 {
                            break;
                        }
                        self.open.pop();
                    }
                }
            }
        }
    }
}

impl RespValue {
    /// Turn an error reply into `Err`, passing any other value through.
    pub fn into_result(self) -> KvResult<RespValue> {
        match self {
            RespValue::Error(message) => Err(KvError::remote(message)),
            other => Ok(other),
        }
    }

    /// Expect `+OK` (or any status reply).
    pub fn into_ok(self) -> KvResult<()> {
        match self.into_result()? {
            RespValue::Simple(_) => Ok(()),
            other => Err(unexpected("status", &other)),
        }
    }

    /// Expect a status reply and return its text.
    pub fn into_status(self) -> KvResult<String> {
        match self.into_result()? {
            RespValue::Simple(status) => Ok(status),
            RespValue::Bulk(Some(data)) => Ok(text(&data)),
            other => Err(unexpected("status", &other)),
        }
    }

    pub fn into_integer(self) -> KvResult<i64> {
        match self.into_result()? {
            RespValue::Integer(value) => Ok(value),
            RespValue::Bulk(Some(data)) => parse_i64(&data),
            other => Err(unexpected("integer", &other)),
        }
    }

    /// Integer replies count as true when positive; `+OK` is true, nil is false.
    pub fn into_bool(self) -> KvResult<bool> {
        match self.into_result()? {
            RespValue::Integer(value) => Ok(value > 0),
            RespValue::Simple(_) => Ok(true),
            RespValue::Bulk(None) => Ok(false),
            other => Err(unexpected("boolean", &other)),
        }
    }

    pub fn into_optional_string(self) -> KvResult<Option<String>> {
        match self.into_result()? {
            RespValue::Bulk(Some(data)) => Ok(Some(text(&data))),
            RespValue::Bulk(None) => Ok(None),
            RespValue::Simple(value) => Ok(Some(value)),
            RespValue::Integer(value) => Ok(Some(value.to_string())),
            other => Err(unexpected("bulk string", &other)),
        }
    }

    pub fn into_optional_strings(self) -> KvResult<Vec<Option<String>>> {
        match self.into_result()? {
            RespValue::Array(items) => items
                .into_iter()
                .map(RespValue::into_optional_string)
                .collect(),
            RespValue::Bulk(None) => Ok(Vec::new()),
            other => Err(unexpected("array", &other)),
        }
    }

    /// Array of non-null strings; nil elements are skipped.
    pub fn into_strings(self) -> KvResult<Vec<String>> {
        Ok(self.into_optional_strings()?.into_iter().flatten().collect())
    }

    /// `[cursor, [items...]]` as returned by the SCAN family.
    pub fn into_scan_page(self) -> KvResult<(u64, Vec<String>)> {
        match self.into_result()? {
            RespValue::Array(mut parts) if parts.len() == 2 => {
                let items = parts.pop().map(RespValue::into_strings).transpose()?;
                let cursor = parts
                    .pop()
                    .map(RespValue::into_integer)
                    .transpose()?
                    .unwrap_or(0);
                Ok((cursor as u64, items.unwrap_or_default()))
            }
            other => Err(unexpected("scan page", &other)),
        }
    }
}

/// Offset just past the payload of a bulk string of `len` bytes.
fn bulk_end(header_len: usize, len: i64) -> KvResult<usize> {
    usize::try_from(len)
        .ok()
        .and_then(|len| header_len.checked_add(len))
        .ok_or_else(|| protocol_error("bulk length out of range"))
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|window| window == b"\r\n")
}

fn text(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

fn parse_i64(data: &[u8]) -> KvResult<i64> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| protocol_error("invalid integer"))
}

fn protocol_error(detail: &str) -> KvError {
    KvError::remote(format!("Protocol error: {}", detail))
}

fn unexpected(expected: &str, got: &RespValue) -> KvError {
    KvError::remote(format!("Expected {} reply, got {:?}", expected, got))
}
