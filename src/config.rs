//! command line and environment configuration.
//!
//! every option can be given as a flag or through its environment variable; flags win.

use {
    crate::store::MAX_BATCH_SIZE,
    clap::{Args, Parser, ValueEnum},
    std::{fmt, net::SocketAddr, time::Duration},
    thiserror::Error,
};

/// samples host utilization into postgres.
#[derive(Clone, Debug, Parser)]
#[command(name = "sysmon", version, about)]
pub struct SamplerConfig {
    #[command(flatten)]
    pub db: DbConfig,

    /// seconds between samples.
    #[arg(
        long = "interval",
        env = "SAMPLE_INTERVAL",
        default_value = "2",
        value_parser = parse_interval
    )]
    pub interval: Duration,

    /// samples per insert.
    #[arg(
        long,
        env = "BATCH_SIZE",
        default_value_t = 10,
        value_parser = parse_batch_size
    )]
    pub batch_size: usize,

    /// extra attempts for a failed insert before giving up.
    #[arg(long, env = "FLUSH_RETRIES", default_value_t = 0)]
    pub flush_retries: u32,

    /// seconds between insert attempts.
    #[arg(
        long,
        env = "FLUSH_RETRY_DELAY",
        default_value = "1",
        value_parser = parse_interval
    )]
    pub flush_retry_delay: Duration,

    #[command(flatten)]
    pub log: LogConfig,
}

/// serves stored samples over http.
#[derive(Clone, Debug, Parser)]
#[command(name = "sysmon-api", version, about)]
pub struct ApiConfig {
    #[command(flatten)]
    pub db: DbConfig,

    /// address to listen on.
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8000")]
    pub addr: SocketAddr,

    #[command(flatten)]
    pub log: LogConfig,
}

/// where the metrics table lives.
#[derive(Clone, Args)]
pub struct DbConfig {
    #[arg(long = "db-host", env = "DB_HOST", default_value = "localhost")]
    pub host: String,

    #[arg(long = "db-port", env = "DB_PORT", default_value_t = 5433)]
    pub port: u16,

    #[arg(long = "db-name", env = "DB_NAME", default_value = "systems_monitor")]
    pub name: String,

    #[arg(long = "db-user", env = "DB_USER", default_value = "postgres")]
    pub user: String,

    #[arg(
        long = "db-password",
        env = "DB_PASSWORD",
        default_value = "pwd",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub password: String,
}

#[derive(Clone, Debug, Args)]
pub struct LogConfig {
    /// log line format.
    #[arg(long = "log-format", env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("`{0}` is not a number of seconds")]
    Seconds(String),
    #[error("interval must be finite and greater than zero, got {0}")]
    Interval(f64),
    #[error("`{0}` is not a whole number")]
    Integer(String),
    #[error("batch size must be between 1 and {max}, got {0}", max = MAX_BATCH_SIZE)]
    BatchSize(usize),
}

// === impl SamplerConfig ===

impl SamplerConfig {
    /// the sampling interval in seconds.
    pub fn interval_secs(&self) -> f64 {
        self.interval.as_secs_f64()
    }
}

// === impl DbConfig ===

/// NB: the password is never printed.
impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            host,
            port,
            name,
            user,
            password: _,
        } = self;
        f.debug_struct("DbConfig")
            .field("host", host)
            .field("port", port)
            .field("name", name)
            .field("user", user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// renders as `user@host:port/name`.
impl fmt::Display for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            host,
            port,
            name,
            user,
            ..
        } = self;
        write!(f, "{user}@{host}:{port}/{name}")
    }
}

// === value parsers ===

fn parse_interval(value: &str) -> Result<Duration, ConfigError> {
    let seconds = value
        .trim()
        .parse::<f64>()
        .map_err(|_| ConfigError::Seconds(value.to_owned()))?;

    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(ConfigError::Interval(seconds));
    }

    Duration::try_from_secs_f64(seconds).map_err(|_| ConfigError::Interval(seconds))
}

fn parse_batch_size(value: &str) -> Result<usize, ConfigError> {
    let size = value
        .trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::Integer(value.to_owned()))?;

    if size == 0 || size > MAX_BATCH_SIZE {
        return Err(ConfigError::BatchSize(size));
    }

    Ok(size)
}
