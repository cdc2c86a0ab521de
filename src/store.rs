//! persists batches of samples into postgres.

use {
    crate::{
        config::DbConfig,
        retry::{RetryExhausted, RetryPolicy},
        sample::Sample,
    },
    chrono::{DateTime, Utc},
    postgres::{Client, Config, NoTls, types::ToSql},
    std::{fmt::Write as _, time::Duration},
    thiserror::Error,
    tracing::{debug, info, warn},
};

/// the table samples are written to.
pub const TABLE: &str = "metrics";

/// the columns of [`TABLE`] written for each sample, in bind order.
pub const COLUMNS: [&str; 18] = [
    "ts",
    "cpu_percent",
    "cpu_per_core_percent",
    "cpu_user_percent",
    "cpu_system_percent",
    "load_1",
    "load_5",
    "load_15",
    "mem_percent",
    "mem_total_bytes",
    "mem_used_bytes",
    "mem_free_bytes",
    "mem_available_bytes",
    "disk_mount",
    "disk_percent",
    "disk_total_bytes",
    "disk_used_bytes",
    "disk_free_bytes",
];

/// postgres numbers bind parameters with a 16-bit integer.
const MAX_BIND_PARAMETERS: usize = u16::MAX as usize;

/// the most samples a single insert statement can carry.
pub const MAX_BATCH_SIZE: usize = MAX_BIND_PARAMETERS / COLUMNS.len();

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS metrics (
    id                   BIGSERIAL PRIMARY KEY,
    ts                   TIMESTAMPTZ NOT NULL,
    cpu_percent          DOUBLE PRECISION NOT NULL,
    cpu_per_core_percent DOUBLE PRECISION[],
    cpu_user_percent     DOUBLE PRECISION,
    cpu_system_percent   DOUBLE PRECISION,
    load_1               DOUBLE PRECISION,
    load_5               DOUBLE PRECISION,
    load_15              DOUBLE PRECISION,
    mem_percent          DOUBLE PRECISION NOT NULL,
    mem_total_bytes      BIGINT,
    mem_used_bytes       BIGINT,
    mem_free_bytes       BIGINT,
    mem_available_bytes  BIGINT,
    disk_mount           TEXT,
    disk_percent         DOUBLE PRECISION NOT NULL,
    disk_total_bytes     BIGINT,
    disk_used_bytes      BIGINT,
    disk_free_bytes      BIGINT
);
CREATE INDEX IF NOT EXISTS metrics_ts_idx ON metrics (ts);
";

/// how long a single connection attempt may take.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// somewhere batches of samples can be written.
pub trait SampleSink {
    type Error: std::error::Error + Send + Sync + 'static;

    /// writes every sample in `batch`, in order, or none of them.
    fn flush(&mut self, batch: &[Sample]) -> Result<(), Self::Error>;
}

/// the database could not be reached at startup.
pub type ConnectError = RetryExhausted<postgres::Error>;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to insert {rows} samples")]
    Database {
        rows: usize,
        #[source]
        source: postgres::Error,
    },
    #[error("failed to reconnect to the database")]
    Reconnect(#[source] postgres::Error),
}

/// a postgres connection that owns the metrics table.
pub struct PgStore {
    client: Client,
    config: Config,
    /// whether a closed client is replaced before the next insert.
    reconnect: bool,
}

/// the bind parameters of one sample.
struct Row<'a> {
    sample: &'a Sample,
    mem_total_bytes: i64,
    mem_used_bytes: i64,
    mem_free_bytes: i64,
    mem_available_bytes: i64,
    disk_total_bytes: i64,
    disk_used_bytes: i64,
    disk_free_bytes: i64,
}

// === impl PgStore ===

impl PgStore {
    /// connects to the database described by `db`, retrying according to `policy`, and
    /// creates the metrics table if it does not exist yet.
    pub fn open(db: &DbConfig, policy: RetryPolicy) -> Result<Self, ConnectError> {
        debug!(%db, "opening store");
        let store = Self::with_config(pg_config(db), policy)?;
        info!(%db, "connected to postgres");
        Ok(store)
    }

    pub(crate) fn with_config(config: Config, policy: RetryPolicy) -> Result<Self, ConnectError> {
        let client = policy.run("connecting to postgres", |attempt| {
            debug!(attempt, "connecting");
            connect(&config)
        })?;

        Ok(Self {
            client,
            config,
            reconnect: false,
        })
    }

    /// replace the client before an insert if the server has closed it.
    pub fn reconnecting(self, reconnect: bool) -> Self {
        Self { reconnect, ..self }
    }
}

impl SampleSink for PgStore {
    type Error = WriteError;

    fn flush(&mut self, batch: &[Sample]) -> Result<(), WriteError> {
        if batch.is_empty() {
            return Ok(());
        }

        let Self {
            client,
            config,
            reconnect,
        } = self;

        if *reconnect && client.is_closed() {
            warn!("database connection was closed, reconnecting");
            *client = connect(config).map_err(WriteError::Reconnect)?;
        }

        let rows = batch.iter().map(Row::from).collect::<Vec<_>>();
        let params = rows.iter().flat_map(Row::params).collect::<Vec<_>>();
        let statement = insert_statement(rows.len());

        let inserted =
            insert(client, &statement, &params).map_err(|source| WriteError::Database {
                rows: batch.len(),
                source,
            })?;
        debug!(inserted, "flushed batch");

        Ok(())
    }
}

/// runs one insert inside its own transaction.
fn insert(
    client: &mut Client,
    statement: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<u64, postgres::Error> {
    let mut tx = client.transaction()?;
    let inserted = tx.execute(statement, params)?;
    tx.commit()?;
    Ok(inserted)
}

fn connect(config: &Config) -> Result<Client, postgres::Error> {
    let mut client = config.connect(NoTls)?;
    client.batch_execute(SCHEMA)?;
    Ok(client)
}

/// builds connection parameters for `db`.
pub(crate) fn pg_config(db: &DbConfig) -> Config {
    let DbConfig {
        host,
        port,
        name,
        user,
        password,
    } = db;

    let mut config = Config::new();
    config
        .host(host)
        .port(*port)
        .dbname(name)
        .user(user)
        .password(password)
        .application_name(env!("CARGO_PKG_NAME"))
        .connect_timeout(CONNECT_TIMEOUT);
    config
}

/// an insert of `rows` samples, with placeholders numbered row by row.
fn insert_statement(rows: usize) -> String {
    let mut statement = format!("INSERT INTO {TABLE} ({}) VALUES ", COLUMNS.join(", "));

    for row in 0..rows {
        if row > 0 {
            statement.push_str(", ");
        }
        statement.push('(');
        for column in 0..COLUMNS.len() {
            if column > 0 {
                statement.push_str(", ");
            }
            let n = row * COLUMNS.len() + column + 1;
            // writing to a string cannot fail.
            let _ = write!(statement, "${n}");
        }
        statement.push(')');
    }

    statement
}

/// converts a byte count to `BIGINT`, saturating.
fn bigint(bytes: u64) -> i64 {
    i64::try_from(bytes).unwrap_or(i64::MAX)
}

// === impl Row ===

impl<'a> From<&'a Sample> for Row<'a> {
    fn from(sample: &'a Sample) -> Self {
        Self {
            sample,
            mem_total_bytes: bigint(sample.mem_total_bytes),
            mem_used_bytes: bigint(sample.mem_used_bytes),
            mem_free_bytes: bigint(sample.mem_free_bytes),
            mem_available_bytes: bigint(sample.mem_available_bytes),
            disk_total_bytes: bigint(sample.disk_total_bytes),
            disk_used_bytes: bigint(sample.disk_used_bytes),
            disk_free_bytes: bigint(sample.disk_free_bytes),
        }
    }
}

impl Row<'_> {
    /// the parameters of this row, in [`COLUMNS`] order.
    fn params(&self) -> [&(dyn ToSql + Sync); COLUMNS.len()] {
        let Self {
            sample,
            mem_total_bytes,
            mem_used_bytes,
            mem_free_bytes,
            mem_available_bytes,
            disk_total_bytes,
            disk_used_bytes,
            disk_free_bytes,
        } = self;
        let timestamp: &DateTime<Utc> = &sample.timestamp;

        [
            timestamp,
            &sample.cpu_total_percent,
            &sample.cpu_per_core_percent,
            &sample.cpu_user_percent,
            &sample.cpu_system_percent,
            &sample.load_1,
            &sample.load_5,
            &sample.load_15,
            &sample.mem_percent,
            mem_total_bytes,
            mem_used_bytes,
            mem_free_bytes,
            mem_available_bytes,
            &sample.disk_mount,
            &sample.disk_percent,
            disk_total_bytes,
            disk_used_bytes,
            disk_free_bytes,
        ]
    }
}

#[cfg(test)]
mod live_tests;
