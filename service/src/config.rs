use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Port the relay listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 3333;

/// Keep-alive cadence of the push hub, in seconds.
pub const DEFAULT_PUSH_KEEP_ALIVE_SECS: u64 = 2;

#[derive(Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// The 32 byte symmetric key used to encrypt every relayed event.
    /// The raw characters are used as key bytes (no hex or base64 decoding).
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "0.0.0.0")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Events each subscriber may have pending before new events are dropped for it
    #[arg(long, env, default_value_t = 64)]
    pub subscriber_queue_capacity: usize,

    /// Largest webhook body, in bytes, the relay will read
    #[arg(long, env, default_value_t = 10 * 1024 * 1024)]
    pub webhook_body_limit: usize,

    /// Seconds between keep-alive comments on idle SSE connections
    #[arg(long, env, default_value_t = 15)]
    pub sse_keep_alive_secs: u64,

    /// Seconds between ping messages sent to push hub clients
    #[arg(long, env, default_value_t = DEFAULT_PUSH_KEEP_ALIVE_SECS)]
    pub push_keep_alive_secs: u64,

    /// Seconds a push hub client has to complete the protocol handshake
    #[arg(long, env, default_value_t = 15)]
    pub push_handshake_timeout_secs: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[REDACTED]"))
            .field("interface", &self.interface)
            .field("port", &self.port)
            .field("log_level_filter", &self.log_level_filter)
            .field("subscriber_queue_capacity", &self.subscriber_queue_capacity)
            .field("webhook_body_limit", &self.webhook_body_limit)
            .field("sse_keep_alive_secs", &self.sse_keep_alive_secs)
            .field("push_keep_alive_secs", &self.push_keep_alive_secs)
            .field("push_handshake_timeout_secs", &self.push_handshake_timeout_secs)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn set_secret_key(mut self, secret_key: String) -> Self {
        self.secret_key = Some(secret_key);
        self
    }

    /// The raw `SECRET_KEY` value, if one was provided. Length is validated by the caller.
    pub fn secret_key(&self) -> Option<&str> {
        self.secret_key.as_deref()
    }

    /// Socket address the HTTP server binds to.
    pub fn listen_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        let interface = self.interface.as_deref().unwrap_or("0.0.0.0");
        let ip: IpAddr = interface.parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn sse_keep_alive(&self) -> Duration {
        Duration::from_secs(self.sse_keep_alive_secs.max(1))
    }

    pub fn push_keep_alive(&self) -> Duration {
        Duration::from_secs(self.push_keep_alive_secs.max(1))
    }

    pub fn push_handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.push_handshake_timeout_secs.max(1))
    }
}
