//! In-process RESP server for integration tests.
//!
//! Implements just enough of the protocol for the client: AUTH, SET, SETEX,
//! GET and EXISTS, with optional `requirepass` and server-side expiry.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use cachelink::resp::{ParseError, Value};
use parking_lot::Mutex;

type Store = Arc<Mutex<HashMap<Vec<u8>, (Vec<u8>, Option<Instant>)>>>;

/// Get a port with nothing listening on it.
pub fn get_available_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub struct TestServer {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    accepted: Arc<AtomicUsize>,
    streams: Arc<Mutex<Vec<TcpStream>>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TestServer {
    pub fn start() -> Self {
        Self::start_with_password(None)
    }

    pub fn start_with_password(password: Option<&str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();

        let shutdown = Arc::new(AtomicBool::new(false));
        let accepted = Arc::new(AtomicUsize::new(0));
        let streams = Arc::new(Mutex::new(Vec::new()));
        let store: Store = Arc::new(Mutex::new(HashMap::new()));
        let password = password.map(|p| p.as_bytes().to_vec());

        let handle = {
            let shutdown = shutdown.clone();
            let accepted = accepted.clone();
            let streams = streams.clone();
            thread::spawn(move || {
                while !shutdown.load(Ordering::SeqCst) {
                    match listener.accept() {
                        Ok((stream, _)) => {
                            accepted.fetch_add(1, Ordering::SeqCst);
                            stream.set_nonblocking(false).unwrap();
                            streams.lock().push(stream.try_clone().unwrap());
                            let conn = Connection {
                                stream,
                                store: store.clone(),
                                password: password.clone(),
                                authenticated: password.is_none(),
                                shutdown: shutdown.clone(),
                            };
                            thread::spawn(move || conn.run());
                        }
                        Err(_) => thread::sleep(Duration::from_millis(5)),
                    }
                }
            })
        };

        Self {
            addr,
            shutdown,
            accepted,
            streams,
            handle: Some(handle),
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Number of connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Close every open connection from the server side.
    pub fn drop_connections(&self) {
        for stream in self.streams.lock().drain(..) {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.drop_connections();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct Connection {
    stream: TcpStream,
    store: Store,
    password: Option<Vec<u8>>,
    authenticated: bool,
    shutdown: Arc<AtomicBool>,
}

impl Connection {
    fn run(mut self) {
        self.stream
            .set_read_timeout(Some(Duration::from_millis(50)))
            .unwrap();

        let mut buf = Vec::new();
        let mut chunk = vec![0u8; 64 * 1024];

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.stream.read(&mut chunk) {
                Ok(0) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(_) => return,
            }

            loop {
                match Value::parse(&buf) {
                    Ok((request, consumed)) => {
                        buf.drain(..consumed);
                        let reply = self.handle(request);
                        if self.stream.write_all(&reply).is_err() {
                            return;
                        }
                    }
                    Err(ParseError::Incomplete) => break,
                    Err(_) => return,
                }
            }
        }
    }

    fn handle(&mut self, request: Value) -> Vec<u8> {
        let Value::Array(items) = request else {
            return error("ERR expected array");
        };
        let args: Vec<Vec<u8>> = items
            .into_iter()
            .filter_map(|item| match item {
                Value::BulkString(data) => Some(data),
                _ => None,
            })
            .collect();
        let Some((name, args)) = args.split_first() else {
            return error("ERR empty command");
        };
        let name = String::from_utf8_lossy(name).to_ascii_uppercase();

        if name == "AUTH" {
            return match (&self.password, args) {
                (None, _) => error("ERR AUTH called without any password configured"),
                (Some(expected), [given]) if expected == given => {
                    self.authenticated = true;
                    b"+OK\r\n".to_vec()
                }
                _ => error("WRONGPASS invalid username-password pair"),
            };
        }

        if !self.authenticated {
            return error("NOAUTH Authentication required.");
        }

        let mut store = self.store.lock();
        match (name.as_str(), args) {
            ("SET", [key, value]) => {
                store.insert(key.clone(), (value.clone(), None));
                b"+OK\r\n".to_vec()
            }
            ("SETEX", [key, ttl, value]) => {
                match std::str::from_utf8(ttl).ok().and_then(|t| t.parse::<u64>().ok()) {
                    Some(ttl) if ttl > 0 => {
                        let expires = Instant::now() + Duration::from_secs(ttl);
                        store.insert(key.clone(), (value.clone(), Some(expires)));
                        b"+OK\r\n".to_vec()
                    }
                    _ => error("ERR invalid expire time in 'setex' command"),
                }
            }
            ("GET", [key]) => match live(&mut store, key) {
                Some(value) => {
                    let mut reply = format!("${}\r\n", value.len()).into_bytes();
                    reply.extend_from_slice(&value);
                    reply.extend_from_slice(b"\r\n");
                    reply
                }
                None => b"$-1\r\n".to_vec(),
            },
            ("EXISTS", [key]) => {
                let found = live(&mut store, key).is_some();
                format!(":{}\r\n", found as i64).into_bytes()
            }
            _ => error("ERR unknown command or wrong number of arguments"),
        }
    }
}

/// Look up a key, evicting it if expired.
fn live(store: &mut HashMap<Vec<u8>, (Vec<u8>, Option<Instant>)>, key: &[u8]) -> Option<Vec<u8>> {
    let expired = match store.get(key) {
        Some((_, Some(expires))) => *expires <= Instant::now(),
        Some((_, None)) => false,
        None => return None,
    };
    if expired {
        store.remove(key);
        return None;
    }
    store.get(key).map(|(value, _)| value.clone())
}

fn error(msg: &str) -> Vec<u8> {
    format!("-{msg}\r\n").into_bytes()
}
