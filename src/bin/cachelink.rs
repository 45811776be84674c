//! Command line client for Redis-compatible caches.

use cachelink::{CacheClient, Config};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "cachelink")]
#[command(about = "Store, fetch and check keys on a Redis-compatible cache")]
struct Args {
    /// Config file path (optional, CLI args override config)
    config: Option<PathBuf>,

    /// Server host
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Password sent with AUTH
    #[arg(long, env = "CACHELINK_PASSWORD")]
    password: Option<String>,

    /// Print metrics after the command
    #[arg(long)]
    metrics: bool,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Store a value
    Set {
        key: String,
        value: String,
        /// Expire after this many seconds (0 = no expiry)
        #[arg(long, default_value_t = 0)]
        ttl: i64,
    },
    /// Fetch a value and write it to stdout
    Get {
        key: String,
        /// Largest value accepted is capacity - 1 bytes
        #[arg(long, default_value_t = 1024 * 1024)]
        capacity: usize,
    },
    /// Exit 0 if the key exists
    Exists { key: String },
    /// Exit 0 if the server is reachable (and accepts the password)
    Status,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return ExitCode::SUCCESS;
    }

    let Some(command) = args.command else {
        eprintln!("No command specified. Use --help for usage");
        return ExitCode::FAILURE;
    };

    let mut config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.password.is_some() {
        config.server.password = args.password;
    }

    cachelink::logging::init(&config.logging);

    let connection = match config.server.connection() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid server configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let client = CacheClient::new();
    client.configure_with(connection);

    let ok = run(&client, command);

    if args.metrics {
        eprint!("{}", cachelink::metrics::snapshot());
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run(client: &CacheClient, command: Command) -> bool {
    match command {
        Command::Set { key, value, ttl } => {
            match client.try_store(key.as_bytes(), value.as_bytes(), ttl) {
                Ok(()) => true,
                Err(e) => {
                    eprintln!("set failed: {}", e);
                    false
                }
            }
        }
        Command::Get { key, capacity } => match client.fetch(key.as_bytes(), capacity) {
            Some(value) => {
                println!("{}", String::from_utf8_lossy(&value));
                true
            }
            None => false,
        },
        Command::Exists { key } => client.exists(key.as_bytes()),
        Command::Status => {
            let ready = client.is_ready();
            println!("{}", if ready { "ready" } else { "not connected" });
            ready
        }
    }
}

fn print_default_config() {
    let config = r#"# cachelink configuration

[server]
# Cache server address
host = "127.0.0.1"
port = 6379

# Password sent with AUTH after connecting (omit for none)
# password = "secret"

# Connection timeout in milliseconds
connect_timeout_ms = 1500

# Read/write timeout in milliseconds (omit to wait indefinitely)
# command_timeout_ms = 1000

[logging]
# Log level: "error", "warn", "info", "debug", "trace"
level = "info"

# Log format: "pretty", "compact", or "json"
format = "pretty"
"#;
    print!("{}", config);
}
