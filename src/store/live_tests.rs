//! round trips through a real postgres.
//!
//! these are ignored by default. point `DB_HOST`, `DB_PORT`, `DB_NAME`, `DB_USER` and
//! `DB_PASSWORD` at a server and run them with `cargo test -- --ignored`. each test works in
//! its own schema, which is dropped afterwards.

use {
    super::*,
    crate::{
        config::ApiConfig,
        query::{self, Window},
        sample::tests::sample,
    },
    clap::Parser,
    std::process,
};

/// a throwaway schema that holds its own metrics table.
struct Scratch {
    admin: Client,
    schema: String,
    config: Config,
}

const ONCE: RetryPolicy = RetryPolicy {
    attempts: 1,
    delay: Duration::ZERO,
};

impl Scratch {
    fn new(name: &str) -> Self {
        let ApiConfig { db, .. } = ApiConfig::try_parse_from(["sysmon-api"]).unwrap();
        let base = pg_config(&db);
        let schema = format!("sysmon_test_{name}_{}", process::id());

        let mut admin = base.connect(NoTls).unwrap();
        admin
            .batch_execute(&format!(
                "DROP SCHEMA IF EXISTS {schema} CASCADE; CREATE SCHEMA {schema};"
            ))
            .unwrap();

        let mut config = base;
        config.options(&format!("-c search_path={schema}"));

        Self {
            admin,
            schema,
            config,
        }
    }

    fn store(&self) -> PgStore {
        PgStore::with_config(self.config.clone(), ONCE).unwrap()
    }

    fn client(&self) -> Client {
        self.config.connect(NoTls).unwrap()
    }

    fn count(&self) -> i64 {
        self.client()
            .query_one("SELECT count(*) FROM metrics", &[])
            .unwrap()
            .get(0)
    }

    /// `cpu_percent` of every stored row, in insertion order.
    fn stored(&self) -> Vec<f64> {
        self.client()
            .query("SELECT cpu_percent FROM metrics ORDER BY id", &[])
            .unwrap()
            .iter()
            .map(|row| row.get(0))
            .collect()
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let Self { admin, schema, .. } = self;
        let _ = admin.batch_execute(&format!("DROP SCHEMA IF EXISTS {schema} CASCADE"));
    }
}

fn sample_at(cpu: f64, age: chrono::Duration) -> Sample {
    let mut s = sample(cpu);
    s.timestamp = Utc::now() - age;
    s
}

#[test]
#[ignore = "requires postgres"]
fn empty_flush_writes_nothing() {
    let scratch = Scratch::new("empty");
    let mut store = scratch.store();

    store.flush(&[]).unwrap();

    assert_eq!(scratch.count(), 0);
}

#[test]
#[ignore = "requires postgres"]
fn rows_are_stored_in_batch_order() {
    let scratch = Scratch::new("order");
    let mut store = scratch.store();

    store.flush(&[sample(20.0), sample(10.0)]).unwrap();

    assert_eq!(scratch.stored(), [20.0, 10.0]);

    let row = query::latest(&mut scratch.client()).unwrap().unwrap();
    assert_eq!(row.cpu_per_core_percent, Some(vec![10.0, 10.0]));
    assert_eq!(row.mem_total_bytes, Some(8 << 30));
    assert_eq!(row.disk_mount.as_deref(), Some("/"));
}

#[test]
#[ignore = "requires postgres"]
fn failing_row_rolls_back_the_whole_batch() {
    let scratch = Scratch::new("atomic");
    let mut store = scratch.store();
    scratch
        .client()
        .batch_execute("ALTER TABLE metrics ADD CONSTRAINT cpu_below_90 CHECK (cpu_percent < 90)")
        .unwrap();

    let error = store.flush(&[sample(10.0), sample(95.0)]).unwrap_err();

    assert_eq!(error.to_string(), "failed to insert 2 samples");
    assert_eq!(scratch.count(), 0);

    // the store is still usable afterwards.
    store.flush(&[sample(10.0)]).unwrap();
    assert_eq!(scratch.stored(), [10.0]);
}

#[test]
#[ignore = "requires postgres"]
fn latest_and_range_read_back() {
    let scratch = Scratch::new("read");
    let mut store = scratch.store();
    let minutes = chrono::Duration::minutes;

    let mut client = scratch.client();
    assert_eq!(query::latest(&mut client).unwrap(), None);

    store
        .flush(&[
            sample_at(5.0, minutes(5)),
            sample_at(30.0, minutes(30)),
            sample_at(1.0, minutes(1)),
        ])
        .unwrap();

    let latest = query::latest(&mut client).unwrap().unwrap();
    assert_eq!(latest.cpu_percent, 1.0);

    let window = Window::new(Some(15), Some(10)).unwrap();
    let points = query::range(&mut client, window).unwrap();
    let cpu = points.iter().map(|p| p.cpu_percent).collect::<Vec<_>>();
    assert_eq!(cpu, [5.0, 1.0], "oldest first, without the 30 minute old row");
    assert!(points.windows(2).all(|w| w[0].ts <= w[1].ts));

    let window = Window::new(Some(15), Some(1)).unwrap();
    let points = query::range(&mut client, window).unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].cpu_percent, 5.0);
}
