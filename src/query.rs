//! reads stored samples back out of postgres.

use {
    crate::store::TABLE,
    chrono::{DateTime, Utc},
    postgres::{Client, Row},
    serde::Serialize,
    thiserror::Error,
};

const SELECT: &str = "\
SELECT id, ts, cpu_percent, cpu_per_core_percent, cpu_user_percent, cpu_system_percent, \
load_1, load_5, load_15, \
mem_percent, mem_total_bytes, mem_used_bytes, mem_free_bytes, mem_available_bytes, \
disk_mount, disk_percent, disk_total_bytes, disk_used_bytes, disk_free_bytes";

/// one stored sample. every column but `id`, `ts` and the headline percentages may be null.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricRow {
    pub id: i64,
    pub ts: DateTime<Utc>,

    pub cpu_percent: f64,
    pub cpu_per_core_percent: Option<Vec<f64>>,
    pub cpu_user_percent: Option<f64>,
    pub cpu_system_percent: Option<f64>,
    pub load_1: Option<f64>,
    pub load_5: Option<f64>,
    pub load_15: Option<f64>,

    pub mem_percent: f64,
    pub mem_total_bytes: Option<i64>,
    pub mem_used_bytes: Option<i64>,
    pub mem_free_bytes: Option<i64>,
    pub mem_available_bytes: Option<i64>,

    pub disk_mount: Option<String>,
    pub disk_percent: f64,
    pub disk_total_bytes: Option<i64>,
    pub disk_used_bytes: Option<i64>,
    pub disk_free_bytes: Option<i64>,
}

/// a trailing time window, and how many rows of it to return.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Window {
    minutes: i32,
    limit: i64,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum WindowError {
    #[error("minutes must be between 1 and {max}, got {0}", max = Window::MAX_MINUTES)]
    Minutes(i64),
    #[error("limit must be between 1 and {max}, got {0}", max = Window::MAX_LIMIT)]
    Limit(i64),
}

/// checks that the database answers.
pub fn health(client: &mut Client) -> Result<(), postgres::Error> {
    client.query_one("SELECT 1", &[])?;
    Ok(())
}

/// the most recent row, if there is one.
pub fn latest(client: &mut Client) -> Result<Option<MetricRow>, postgres::Error> {
    let statement = format!("{SELECT} FROM {TABLE} ORDER BY ts DESC LIMIT 1");
    client
        .query_opt(statement.as_str(), &[])?
        .as_ref()
        .map(MetricRow::try_from)
        .transpose()
}

/// rows inside `window`, oldest first.
pub fn range(client: &mut Client, window: Window) -> Result<Vec<MetricRow>, postgres::Error> {
    let Window { minutes, limit } = window;
    let statement = format!(
        "{SELECT} FROM {TABLE} \
         WHERE ts >= now() - make_interval(mins => $1) \
         ORDER BY ts ASC LIMIT $2"
    );
    client
        .query(statement.as_str(), &[&minutes, &limit])?
        .iter()
        .map(MetricRow::try_from)
        .collect()
}

// === impl MetricRow ===

impl TryFrom<&Row> for MetricRow {
    type Error = postgres::Error;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            ts: row.try_get("ts")?,
            cpu_percent: row.try_get("cpu_percent")?,
            cpu_per_core_percent: row.try_get("cpu_per_core_percent")?,
            cpu_user_percent: row.try_get("cpu_user_percent")?,
            cpu_system_percent: row.try_get("cpu_system_percent")?,
            load_1: row.try_get("load_1")?,
            load_5: row.try_get("load_5")?,
            load_15: row.try_get("load_15")?,
            mem_percent: row.try_get("mem_percent")?,
            mem_total_bytes: row.try_get("mem_total_bytes")?,
            mem_used_bytes: row.try_get("mem_used_bytes")?,
            mem_free_bytes: row.try_get("mem_free_bytes")?,
            mem_available_bytes: row.try_get("mem_available_bytes")?,
            disk_mount: row.try_get("disk_mount")?,
            disk_percent: row.try_get("disk_percent")?,
            disk_total_bytes: row.try_get("disk_total_bytes")?,
            disk_used_bytes: row.try_get("disk_used_bytes")?,
            disk_free_bytes: row.try_get("disk_free_bytes")?,
        })
    }
}

// === impl Window ===

impl Window {
    pub const DEFAULT_MINUTES: i64 = 15;
    pub const MAX_MINUTES: i64 = 24 * 60;
    pub const DEFAULT_LIMIT: i64 = 2000;
    pub const MAX_LIMIT: i64 = 20_000;

    /// validates a window, filling in defaults for absent values.
    pub fn new(minutes: Option<i64>, limit: Option<i64>) -> Result<Self, WindowError> {
        let minutes = minutes.unwrap_or(Self::DEFAULT_MINUTES);
        let limit = limit.unwrap_or(Self::DEFAULT_LIMIT);

        let minutes = match i32::try_from(minutes) {
            Ok(m) if (1..=Self::MAX_MINUTES).contains(&minutes) => m,
            _ => return Err(WindowError::Minutes(minutes)),
        };
        if !(1..=Self::MAX_LIMIT).contains(&limit) {
            return Err(WindowError::Limit(limit));
        }

        Ok(Self { minutes, limit })
    }

    pub fn minutes(&self) -> i32 {
        self.minutes
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }
}

impl Default for Window {
    fn default() -> Self {
        Self {
            minutes: Self::DEFAULT_MINUTES as i32,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_defaults() {
        assert_eq!(Window::new(None, None), Ok(Window::default()));
        let w = Window::default();
        assert_eq!((w.minutes(), w.limit()), (15, 2000));
    }

    #[test]
    fn window_bounds() {
        assert!(Window::new(Some(1), Some(1)).is_ok());
        assert!(Window::new(Some(1440), Some(20_000)).is_ok());

        assert_eq!(Window::new(Some(0), None), Err(WindowError::Minutes(0)));
        assert_eq!(Window::new(Some(1441), None), Err(WindowError::Minutes(1441)));
        assert_eq!(
            Window::new(Some(i64::MAX), None),
            Err(WindowError::Minutes(i64::MAX))
        );
        assert_eq!(Window::new(None, Some(0)), Err(WindowError::Limit(0)));
        assert_eq!(Window::new(None, Some(20_001)), Err(WindowError::Limit(20_001)));
    }

    #[test]
    fn window_error_messages() {
        assert_eq!(
            WindowError::Minutes(0).to_string(),
            "minutes must be between 1 and 1440, got 0"
        );
        assert_eq!(
            WindowError::Limit(-5).to_string(),
            "limit must be between 1 and 20000, got -5"
        );
    }

    #[test]
    fn rows_render_nulls() {
        let row = MetricRow {
            id: 7,
            ts: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            cpu_percent: 12.5,
            cpu_per_core_percent: None,
            cpu_user_percent: Some(10.0),
            cpu_system_percent: Some(2.5),
            load_1: None,
            load_5: None,
            load_15: None,
            mem_percent: 40.0,
            mem_total_bytes: Some(1024),
            mem_used_bytes: Some(512),
            mem_free_bytes: Some(256),
            mem_available_bytes: Some(614),
            disk_mount: Some("/".to_owned()),
            disk_percent: 60.0,
            disk_total_bytes: Some(100),
            disk_used_bytes: Some(60),
            disk_free_bytes: Some(40),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["cpu_per_core_percent"], serde_json::Value::Null);
        assert_eq!(json["load_1"], serde_json::Value::Null);
        assert_eq!(json["disk_mount"], "/");
        assert_eq!(json["ts"], "2023-11-14T22:13:20Z");
    }
}
