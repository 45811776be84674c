//! RESP2 codec for the client side of the connection.
//!
//! Requests are always encoded as arrays of bulk strings, so keys and values
//! are binary safe. Replies are parsed into an owned [`Value`] tree.

use bytes::{BufMut, BytesMut};

/// Maximum bulk string size accepted in a reply: 512MB (the RESP limit).
pub const MAX_BULK_STRING_LEN: usize = 512 * 1024 * 1024;

/// Maximum number of elements accepted in a single reply array.
const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Errors produced while parsing a reply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// More bytes are needed before a complete reply is available.
    #[error("incomplete reply")]
    Incomplete,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("invalid integer: {0}")]
    InvalidInteger(String),
    #[error("bulk string of {len} bytes exceeds limit of {max} bytes")]
    BulkStringTooLong { len: usize, max: usize },
    #[error("reply nesting exceeds depth {0}")]
    TooDeep(usize),
}

/// Limits applied while parsing replies.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    pub max_bulk_string_len: usize,
    pub max_depth: usize,
}

impl ParseOptions {
    pub fn new() -> Self {
        Self {
            max_bulk_string_len: MAX_BULK_STRING_LEN,
            max_depth: 8,
        }
    }

    pub fn max_bulk_string_len(mut self, len: usize) -> Self {
        self.max_bulk_string_len = len;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// A command sent to the cache server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    /// AUTH password
    Auth { password: &'a [u8] },
    /// SET key value
    Set { key: &'a [u8], value: &'a [u8] },
    /// SETEX key seconds value
    SetEx {
        key: &'a [u8],
        ttl_secs: u64,
        value: &'a [u8],
    },
    /// GET key
    Get { key: &'a [u8] },
    /// EXISTS key
    Exists { key: &'a [u8] },
}

impl<'a> Request<'a> {
    pub fn auth(password: &'a [u8]) -> Self {
        Request::Auth { password }
    }

    pub fn set(key: &'a [u8], value: &'a [u8]) -> Self {
        Request::Set { key, value }
    }

    pub fn set_ex(key: &'a [u8], value: &'a [u8], ttl_secs: u64) -> Self {
        Request::SetEx {
            key,
            ttl_secs,
            value,
        }
    }

    pub fn get(key: &'a [u8]) -> Self {
        Request::Get { key }
    }

    pub fn exists(key: &'a [u8]) -> Self {
        Request::Exists { key }
    }

    /// Returns the command name.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Auth { .. } => "AUTH",
            Request::Set { .. } => "SET",
            Request::SetEx { .. } => "SETEX",
            Request::Get { .. } => "GET",
            Request::Exists { .. } => "EXISTS",
        }
    }

    /// Number of bytes `encode` will append.
    pub fn encoded_len(&self) -> usize {
        let name = self.name().len();
        match self {
            Request::Auth { password } => {
                array_header_len(2) + bulk_len(name) + bulk_len(password.len())
            }
            Request::Set { key, value } => {
                array_header_len(3) + bulk_len(name) + bulk_len(key.len()) + bulk_len(value.len())
            }
            Request::SetEx {
                key,
                ttl_secs,
                value,
            } => {
                array_header_len(4)
                    + bulk_len(name)
                    + bulk_len(key.len())
                    + bulk_len(decimal_len(*ttl_secs))
                    + bulk_len(value.len())
            }
            Request::Get { key } | Request::Exists { key } => {
                array_header_len(2) + bulk_len(name) + bulk_len(key.len())
            }
        }
    }

    /// Append the RESP encoding of this request to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        let name = self.name().as_bytes();
        match self {
            Request::Auth { password } => {
                put_array_header(buf, 2);
                put_bulk(buf, name);
                put_bulk(buf, password);
            }
            Request::Set { key, value } => {
                put_array_header(buf, 3);
                put_bulk(buf, name);
                put_bulk(buf, key);
                put_bulk(buf, value);
            }
            Request::SetEx {
                key,
                ttl_secs,
                value,
            } => {
                put_array_header(buf, 4);
                put_bulk(buf, name);
                put_bulk(buf, key);
                let mut digits = [0u8; 20];
                put_bulk(buf, format_decimal(&mut digits, *ttl_secs));
                put_bulk(buf, value);
            }
            Request::Get { key } | Request::Exists { key } => {
                put_array_header(buf, 2);
                put_bulk(buf, name);
                put_bulk(buf, key);
            }
        }
    }
}

/// A parsed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    SimpleString(Vec<u8>),
    Error(Vec<u8>),
    Integer(i64),
    BulkString(Vec<u8>),
    /// Nil bulk string or nil array.
    Null,
    Array(Vec<Value>),
}

impl Value {
    /// Parse one reply from `buffer` using default limits.
    ///
    /// Returns the value and the number of bytes consumed.
    pub fn parse(buffer: &[u8]) -> Result<(Self, usize), ParseError> {
        Self::parse_with_options(buffer, &ParseOptions::default())
    }

    /// Parse one reply from `buffer` with custom limits.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::Incomplete` if more data is needed; nothing is
    /// consumed in that case.
    pub fn parse_with_options(
        buffer: &[u8],
        options: &ParseOptions,
    ) -> Result<(Self, usize), ParseError> {
        let mut cursor = Cursor::new(buffer, options);
        let value = cursor.read_value(0)?;
        Ok((value, cursor.position()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Returns the payload of string-typed replies.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::SimpleString(s) | Value::BulkString(s) | Value::Error(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Short type label used in log lines and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::SimpleString(_) => "simple string",
            Value::Error(_) => "error",
            Value::Integer(_) => "integer",
            Value::BulkString(_) => "bulk string",
            Value::Null => "nil",
            Value::Array(_) => "array",
        }
    }
}

// ── Encoding helpers ─────────────────────────────────────────────────────

fn put_array_header(buf: &mut BytesMut, count: usize) {
    let mut digits = [0u8; 20];
    buf.put_u8(b'*');
    buf.put_slice(format_decimal(&mut digits, count as u64));
    buf.put_slice(b"\r\n");
}

fn put_bulk(buf: &mut BytesMut, data: &[u8]) {
    let mut digits = [0u8; 20];
    buf.put_u8(b'$');
    buf.put_slice(format_decimal(&mut digits, data.len() as u64));
    buf.put_slice(b"\r\n");
    buf.put_slice(data);
    buf.put_slice(b"\r\n");
}

fn array_header_len(count: usize) -> usize {
    1 + decimal_len(count as u64) + 2
}

fn bulk_len(len: usize) -> usize {
    1 + decimal_len(len as u64) + 2 + len + 2
}

fn decimal_len(mut n: u64) -> usize {
    let mut len = 1;
    while n >= 10 {
        n /= 10;
        len += 1;
    }
    len
}

/// Write `n` as decimal digits into the tail of `scratch`.
fn format_decimal(scratch: &mut [u8; 20], mut n: u64) -> &[u8] {
    let mut pos = scratch.len();
    loop {
        pos -= 1;
        scratch[pos] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    &scratch[pos..]
}

// ── Reply parsing ────────────────────────────────────────────────────────

struct Cursor<'a> {
    buffer: &'a [u8],
    pos: usize,
    options: &'a ParseOptions,
}

impl<'a> Cursor<'a> {
    fn new(buffer: &'a [u8], options: &'a ParseOptions) -> Self {
        Self {
            buffer,
            pos: 0,
            options,
        }
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.buffer.len() - self.pos
    }

    #[inline]
    fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    fn get_u8(&mut self) -> u8 {
        let b = self.buffer[self.pos];
        self.pos += 1;
        b
    }

    fn read_value(&mut self, depth: usize) -> Result<Value, ParseError> {
        if depth > self.options.max_depth {
            return Err(ParseError::TooDeep(self.options.max_depth));
        }
        if self.remaining() < 1 {
            return Err(ParseError::Incomplete);
        }

        match self.get_u8() {
            b'+' => Ok(Value::SimpleString(self.read_line()?.to_vec())),
            b'-' => Ok(Value::Error(self.read_line()?.to_vec())),
            b':' => Ok(Value::Integer(self.read_integer()?)),
            b'$' => {
                let len = self.read_integer()?;
                if len == -1 {
                    return Ok(Value::Null);
                }
                let len = usize::try_from(len).map_err(|_| {
                    ParseError::Protocol(format!("invalid bulk string length {len}"))
                })?;
                Ok(Value::BulkString(self.read_bulk_body(len)?.to_vec()))
            }
            b'*' => {
                let count = self.read_integer()?;
                if count == -1 {
                    return Ok(Value::Null);
                }
                let count = usize::try_from(count)
                    .map_err(|_| ParseError::Protocol(format!("invalid array length {count}")))?;
                if count > MAX_ARRAY_LEN {
                    return Err(ParseError::Protocol("array too large".to_string()));
                }
                // Each element needs at least 3 bytes, so cap the preallocation by
                // what the buffer could possibly hold.
                let mut items = Vec::with_capacity(count.min(self.remaining() / 3));
                for _ in 0..count {
                    items.push(self.read_value(depth + 1)?);
                }
                Ok(Value::Array(items))
            }
            other => Err(ParseError::Protocol(format!(
                "unexpected type byte 0x{other:02x}"
            ))),
        }
    }

    fn read_integer(&mut self) -> Result<i64, ParseError> {
        let line = self.read_line()?;

        let (negative, digits) = match line.split_first() {
            Some((b'-', rest)) => (true, rest),
            Some((b'+', rest)) => (false, rest),
            _ => (false, line),
        };

        if digits.is_empty() {
            return Err(ParseError::InvalidInteger("empty integer".to_string()));
        }
        if digits.len() > 19 {
            return Err(ParseError::InvalidInteger("integer too large".to_string()));
        }

        let mut result = 0i64;
        for &byte in digits {
            if !byte.is_ascii_digit() {
                return Err(ParseError::InvalidInteger(
                    "non-digit character".to_string(),
                ));
            }
            result = result
                .checked_mul(10)
                .and_then(|r| r.checked_add((byte - b'0') as i64))
                .ok_or_else(|| ParseError::InvalidInteger("integer overflow".to_string()))?;
        }

        Ok(if negative { -result } else { result })
    }

    fn read_bulk_body(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        if len > self.options.max_bulk_string_len {
            return Err(ParseError::BulkStringTooLong {
                len,
                max: self.options.max_bulk_string_len,
            });
        }

        if self.remaining() < len + 2 {
            return Err(ParseError::Incomplete);
        }

        let data = &self.buffer[self.pos..self.pos + len];
        self.pos += len;

        if self.get_u8() != b'\r' || self.get_u8() != b'\n' {
            return Err(ParseError::Protocol(
                "expected CRLF after bulk string".to_string(),
            ));
        }

        Ok(data)
    }

    fn read_line(&mut self) -> Result<&'a [u8], ParseError> {
        let start = self.pos;
        let slice = &self.buffer[start..];

        if let Some(pos) = memchr::memchr(b'\r', slice)
            && pos + 1 < slice.len()
        {
            if slice[pos + 1] != b'\n' {
                return Err(ParseError::Protocol("expected LF after CR".to_string()));
            }
            let end = start + pos;
            let line = &self.buffer[start..end];
            self.pos = end + 2;
            return Ok(line);
        }

        Err(ParseError::Incomplete)
    }
}
