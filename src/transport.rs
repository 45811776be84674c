//! Blocking request/response transport.
//!
//! [`Connector`] opens a [`Transport`] for a [`ConnectionConfig`]; the client
//! owns at most one transport at a time and drops it to close the connection.

use bytes::{Buf, BytesMut};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Instant;

use crate::config::ConnectionConfig;
use crate::error::ClientError;
use crate::metrics;
use crate::resp::{ParseError, ParseOptions, Request, Value};

/// Bytes requested from the socket per read.
const READ_CHUNK: usize = 16 * 1024;

/// An open, exclusively owned connection to a cache server.
pub trait Transport: Send {
    /// Send one request and block until its reply has been read.
    ///
    /// Error replies are returned as `Ok(Value::Error(..))`. An `Err` means
    /// the request could not complete on the wire.
    fn request(&mut self, request: &Request<'_>) -> Result<Value, ClientError>;
}

/// Opens transports.
pub trait Connector: Send + Sync {
    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Transport>, ClientError>;
}

/// Connects over TCP, trying each resolved address within the connect timeout.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Transport>, ClientError> {
        Ok(Box::new(TcpTransport::connect(config)?))
    }
}

/// RESP over a blocking `TcpStream`.
pub struct TcpTransport {
    stream: TcpStream,
    peer: SocketAddr,
    send_buf: BytesMut,
    recv_buf: BytesMut,
    parse_options: ParseOptions,
}

impl TcpTransport {
    pub fn connect(config: &ConnectionConfig) -> Result<Self, ClientError> {
        let addrs = (config.host(), config.port()).to_socket_addrs()?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, config.connect_timeout()) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    stream.set_read_timeout(config.command_timeout())?;
                    stream.set_write_timeout(config.command_timeout())?;
                    return Ok(Self::new(stream, addr));
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "connect attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(ClientError::Io(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot resolve address: {}:{}", config.host(), config.port()),
            )
        })))
    }

    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            send_buf: BytesMut::with_capacity(4096),
            recv_buf: BytesMut::with_capacity(4096),
            parse_options: ParseOptions::default(),
        }
    }

    /// Address of the connected server.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    fn flush_request(&mut self, request: &Request<'_>) -> Result<(), ClientError> {
        self.send_buf.clear();
        request.encode(&mut self.send_buf);
        self.stream.write_all(&self.send_buf)?;
        self.stream.flush()?;
        Ok(())
    }

    fn read_reply(&mut self) -> Result<Value, ClientError> {
        loop {
            if !self.recv_buf.is_empty() {
                match Value::parse_with_options(&self.recv_buf, &self.parse_options) {
                    Ok((value, consumed)) => {
                        self.recv_buf.advance(consumed);
                        return Ok(value);
                    }
                    Err(ParseError::Incomplete) => {}
                    Err(e) => return Err(e.into()),
                }
            }

            let filled = self.recv_buf.len();
            self.recv_buf.resize(filled + READ_CHUNK, 0);
            let result = self.stream.read(&mut self.recv_buf[filled..]);
            self.recv_buf
                .truncate(filled + result.as_ref().copied().unwrap_or(0));

            match result {
                Ok(0) => return Err(ClientError::ConnectionClosed),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Transport for TcpTransport {
    fn request(&mut self, request: &Request<'_>) -> Result<Value, ClientError> {
        let start = Instant::now();
        self.flush_request(request)?;
        let value = self.read_reply()?;
        let _ = metrics::COMMAND_LATENCY.increment(start.elapsed().as_nanos() as u64);
        Ok(value)
    }
}
