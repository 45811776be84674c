//! Client metrics.

use metriken::{AtomicHistogram, Counter, Gauge, metric};

/// Connection attempts (each `ensure_connected` that dials).
#[metric(name = "cachelink_connect_attempts")]
pub static CONNECT_ATTEMPTS: Counter = Counter::new();

/// Connection attempts that failed to open a transport.
#[metric(name = "cachelink_connect_failures")]
pub static CONNECT_FAILURES: Counter = Counter::new();

/// AUTH rejected or failed.
#[metric(name = "cachelink_auth_failures")]
pub static AUTH_FAILURES: Counter = Counter::new();

/// Established connections later found severed.
#[metric(name = "cachelink_disconnects")]
pub static DISCONNECTS: Counter = Counter::new();

/// 1 while the client holds an authenticated connection.
#[metric(name = "cachelink_connected")]
pub static CONNECTED: Gauge = Gauge::new();

/// Store operations sent to the server.
#[metric(name = "cachelink_store")]
pub static STORE: Counter = Counter::new();

/// Fetch operations sent to the server.
#[metric(name = "cachelink_fetch")]
pub static FETCH: Counter = Counter::new();

/// Fetches that returned a value.
#[metric(name = "cachelink_fetch_hit")]
pub static FETCH_HIT: Counter = Counter::new();

/// Fetches that returned no value.
#[metric(name = "cachelink_fetch_miss")]
pub static FETCH_MISS: Counter = Counter::new();

/// Exists operations sent to the server.
#[metric(name = "cachelink_exists")]
pub static EXISTS: Counter = Counter::new();

/// Operations skipped because no connection could be established.
#[metric(name = "cachelink_not_connected")]
pub static NOT_CONNECTED: Counter = Counter::new();

/// Commands that returned an error reply or failed on the wire.
#[metric(name = "cachelink_command_errors")]
pub static COMMAND_ERRORS: Counter = Counter::new();

#[metric(
    name = "cachelink_command_latency",
    description = "Command round-trip latency histogram (nanoseconds)"
)]
pub static COMMAND_LATENCY: AtomicHistogram = AtomicHistogram::new(7, 64);

/// Render every registered counter and gauge as `name value` lines.
pub fn snapshot() -> String {
    let mut output = String::new();

    for metric in metriken::metrics().iter() {
        let name = metric.name();
        if name.is_empty() {
            continue;
        }

        match metric.value() {
            Some(metriken::Value::Counter(v)) => {
                output.push_str(&format!("{name} {v}\n"));
            }
            Some(metriken::Value::Gauge(v)) => {
                output.push_str(&format!("{name} {v}\n"));
            }
            _ => {}
        }
    }

    output
}
