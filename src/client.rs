//! The cache client and its connection state machine.
//!
//! A [`CacheClient`] holds at most one transport. Every data operation takes
//! the client lock, makes sure a connection is established (dialing at most
//! once per call), runs its command and releases the lock. A transport that
//! fails mid-command is dropped, so the next call starts from a fresh dial.

use parking_lot::Mutex;

use crate::config::ConnectionConfig;
use crate::error::ClientError;
use crate::metrics;
use crate::resp::{Request, Value};
use crate::transport::{Connector, TcpConnector, Transport};

/// Blocking client for a single Redis-compatible cache server.
///
/// `Send + Sync`; share it behind a reference or an `Arc`. Operations are
/// serialised on an internal lock, which also makes re-configuration atomic
/// with respect to in-flight operations.
///
/// The plain methods ([`store`], [`fetch`], [`exists`]) are best-effort and
/// never report why they did not succeed. The `try_` variants return the
/// underlying [`ClientError`].
///
/// [`store`]: CacheClient::store
/// [`fetch`]: CacheClient::fetch
/// [`exists`]: CacheClient::exists
pub struct CacheClient {
    connector: Box<dyn Connector>,
    state: Mutex<ConnectionState>,
}

#[derive(Default)]
struct ConnectionState {
    config: Option<ConnectionConfig>,
    transport: Option<Box<dyn Transport>>,
    /// Only set while `transport` holds an authenticated connection.
    connected: bool,
}

impl ConnectionState {
    fn is_ready(&self) -> bool {
        self.config.is_some() && self.connected && self.transport.is_some()
    }

    /// Drop the transport and clear the connected flag.
    fn release(&mut self) {
        if self.connected {
            metrics::CONNECTED.decrement();
        }
        self.connected = false;
        self.transport = None;
    }

    /// Forget the configuration and any connection.
    fn reset(&mut self) {
        self.release();
        self.config = None;
    }

    fn ensure_connected(&mut self, connector: &dyn Connector) -> Result<(), ClientError> {
        if self.connected {
            return Ok(());
        }

        self.release();

        let Some(config) = self.config.as_ref() else {
            return Err(ClientError::NotConnected);
        };

        metrics::CONNECT_ATTEMPTS.increment();

        let mut transport = match connector.connect(config) {
            Ok(transport) => transport,
            Err(e) => {
                metrics::CONNECT_FAILURES.increment();
                tracing::warn!(
                    host = config.host(),
                    port = config.port(),
                    error = %e,
                    "failed to connect to cache server"
                );
                return Err(ClientError::NotConnected);
            }
        };

        if let Some(password) = config.password() {
            match transport.request(&Request::auth(password.as_bytes())) {
                Ok(Value::Error(msg)) => {
                    metrics::AUTH_FAILURES.increment();
                    tracing::warn!(
                        host = config.host(),
                        port = config.port(),
                        reply = %String::from_utf8_lossy(&msg),
                        "authentication rejected"
                    );
                    return Err(ClientError::NotConnected);
                }
                Err(e) => {
                    metrics::AUTH_FAILURES.increment();
                    tracing::warn!(
                        host = config.host(),
                        port = config.port(),
                        error = %e,
                        "authentication failed"
                    );
                    return Err(ClientError::NotConnected);
                }
                Ok(_) => {}
            }
        }

        tracing::debug!(
            host = config.host(),
            port = config.port(),
            "connected to cache server"
        );
        self.transport = Some(transport);
        self.connected = true;
        metrics::CONNECTED.increment();
        Ok(())
    }

    /// Send one request on the current transport.
    ///
    /// A fatal transport error severs the connection.
    fn execute(&mut self, request: &Request<'_>) -> Result<Value, ClientError> {
        let transport = match self.transport.as_mut() {
            Some(transport) if self.connected => transport,
            _ => return Err(ClientError::NotConnected),
        };

        match transport.request(request) {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_fatal() {
                    metrics::DISCONNECTS.increment();
                    tracing::warn!(
                        command = request.name(),
                        error = %e,
                        "connection to cache server lost"
                    );
                    self.release();
                }
                Err(e)
            }
        }
    }
}

impl Drop for ConnectionState {
    fn drop(&mut self) {
        self.release();
    }
}

impl Default for CacheClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheClient {
    /// Create an unconfigured client that connects over TCP.
    pub fn new() -> Self {
        Self::with_connector(TcpConnector)
    }

    /// Create an unconfigured client that opens transports with `connector`.
    pub fn with_connector(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            state: Mutex::new(ConnectionState::default()),
        }
    }

    /// Replace the configuration and connect.
    ///
    /// Any existing configuration and connection are discarded first, even if
    /// the new parameters are invalid or the server is unreachable. Returns
    /// whether the client is connected afterwards.
    pub fn configure(&self, host: &str, port: u16, password: Option<&str>) -> bool {
        let mut state = self.state.lock();
        state.reset();

        match ConnectionConfig::new(host, port, password) {
            Ok(config) => self.install(&mut state, config),
            Err(e) => {
                tracing::warn!(host, port, error = %e, "invalid connection configuration");
                false
            }
        }
    }

    /// Like [`configure`](Self::configure), with full connection parameters.
    pub fn configure_with(&self, config: ConnectionConfig) -> bool {
        let mut state = self.state.lock();
        state.reset();
        self.install(&mut state, config)
    }

    fn install(&self, state: &mut ConnectionState, config: ConnectionConfig) -> bool {
        state.config = Some(config);
        state.ensure_connected(self.connector.as_ref()).is_ok()
    }

    /// True if configured and holding an established connection. No I/O.
    pub fn is_ready(&self) -> bool {
        self.state.lock().is_ready()
    }

    /// Close the connection and forget the configuration.
    pub fn shutdown(&self) {
        self.state.lock().reset();
    }

    /// Store `value` under `key`, expiring after `ttl_secs` if positive.
    ///
    /// Best-effort: nothing is reported if the client is not connected or the
    /// server rejects the write.
    pub fn store(&self, key: &[u8], value: &[u8], ttl_secs: i64) {
        if let Err(e) = self.try_store(key, value, ttl_secs) {
            tracing::debug!(error = %e, "store did not complete");
        }
    }

    /// Store `value` under `key`, reporting the outcome.
    pub fn try_store(&self, key: &[u8], value: &[u8], ttl_secs: i64) -> Result<(), ClientError> {
        if key.is_empty() {
            return Err(ClientError::EmptyKey);
        }

        let request = if ttl_secs > 0 {
            Request::set_ex(key, value, ttl_secs as u64)
        } else {
            Request::set(key, value)
        };

        metrics::STORE.increment();
        match self.execute(&request)? {
            Value::Error(msg) => Err(redis_error(&msg)),
            _ => Ok(()),
        }
    }

    /// Fetch the value for `key` if it is strictly shorter than
    /// `buffer_capacity` bytes.
    ///
    /// Returns `None` when not connected, when the key is missing, on an
    /// error reply, or when the value does not fit.
    pub fn fetch(&self, key: &[u8], buffer_capacity: usize) -> Option<Vec<u8>> {
        let result = self
            .try_fetch(key)
            .and_then(|value| match value {
                Some(data) => check_capacity(data.len(), buffer_capacity).map(|_| Some(data)),
                None => Ok(None),
            });

        match result {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "fetch did not complete");
                None
            }
        }
    }

    /// Fetch the value for `key` into `buffer`.
    ///
    /// On success the value occupies `buffer[..len]`, `buffer[len]` is set to
    /// zero and `len` is returned. The value must be strictly shorter than the
    /// buffer. On `None` the buffer contents are unspecified.
    pub fn fetch_into(&self, key: &[u8], buffer: &mut [u8]) -> Option<usize> {
        match self.try_fetch_into(key, buffer) {
            Ok(len) => len,
            Err(e) => {
                tracing::debug!(error = %e, "fetch did not complete");
                None
            }
        }
    }

    /// Fetch the value for `key` into `buffer`, reporting the outcome.
    ///
    /// Fails with [`ClientError::ValueTooLarge`] unless the value is strictly
    /// shorter than the buffer.
    pub fn try_fetch_into(
        &self,
        key: &[u8],
        buffer: &mut [u8],
    ) -> Result<Option<usize>, ClientError> {
        let Some(data) = self.try_fetch(key)? else {
            return Ok(None);
        };
        check_capacity(data.len(), buffer.len())?;

        let len = data.len().min(buffer.len() - 1);
        buffer[..len].copy_from_slice(&data[..len]);
        buffer[len] = 0;
        Ok(Some(len))
    }

    /// Fetch the value for `key` without a size bound.
    pub fn try_fetch(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ClientError> {
        if key.is_empty() {
            return Err(ClientError::EmptyKey);
        }

        metrics::FETCH.increment();
        match self.execute(&Request::get(key))? {
            Value::BulkString(data) => {
                metrics::FETCH_HIT.increment();
                Ok(Some(data))
            }
            Value::Null => {
                metrics::FETCH_MISS.increment();
                Ok(None)
            }
            Value::Error(msg) => Err(redis_error(&msg)),
            other => Err(ClientError::UnexpectedResponse {
                command: "GET",
                kind: other.kind(),
            }),
        }
    }

    /// Whether `key` exists on the server. False when not connected or on any
    /// reply other than a non-zero integer.
    pub fn exists(&self, key: &[u8]) -> bool {
        match self.try_exists(key) {
            Ok(exists) => exists,
            Err(e) => {
                tracing::debug!(error = %e, "exists did not complete");
                false
            }
        }
    }

    pub fn try_exists(&self, key: &[u8]) -> Result<bool, ClientError> {
        if key.is_empty() {
            return Err(ClientError::EmptyKey);
        }

        metrics::EXISTS.increment();
        match self.execute(&Request::exists(key))? {
            Value::Integer(n) => Ok(n != 0),
            Value::Error(msg) => Err(redis_error(&msg)),
            other => Err(ClientError::UnexpectedResponse {
                command: "EXISTS",
                kind: other.kind(),
            }),
        }
    }

    /// Connect if needed, then send `request`, all under the client lock.
    fn execute(&self, request: &Request<'_>) -> Result<Value, ClientError> {
        let mut state = self.state.lock();

        if let Err(e) = state.ensure_connected(self.connector.as_ref()) {
            metrics::NOT_CONNECTED.increment();
            return Err(e);
        }

        let result = state.execute(request);
        if matches!(result, Err(_) | Ok(Value::Error(_))) {
            metrics::COMMAND_ERRORS.increment();
        }
        result
    }
}

fn check_capacity(len: usize, capacity: usize) -> Result<(), ClientError> {
    if len < capacity {
        Ok(())
    } else {
        Err(ClientError::ValueTooLarge { len, capacity })
    }
}

fn redis_error(msg: &[u8]) -> ClientError {
    ClientError::Redis(String::from_utf8_lossy(msg).into_owned())
}
