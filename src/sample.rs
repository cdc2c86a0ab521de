//! point-in-time measurements of host utilization.

use {
    chrono::{DateTime, Utc},
    std::fmt,
};

/// the filesystem whose usage is sampled.
pub const ROOT_MOUNT: &str = "/";

/// one measurement of the host, taken at `timestamp`.
///
/// cpu figures cover the window since the previous sample. fields that a platform cannot
/// provide are `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,

    pub cpu_total_percent: f64,
    /// busy percentage of each logical cpu, in cpu order.
    pub cpu_per_core_percent: Option<Vec<f64>>,
    pub cpu_user_percent: f64,
    pub cpu_system_percent: f64,
    pub load_1: Option<f64>,
    pub load_5: Option<f64>,
    pub load_15: Option<f64>,

    pub mem_percent: f64,
    pub mem_total_bytes: u64,
    pub mem_used_bytes: u64,
    pub mem_free_bytes: u64,
    pub mem_available_bytes: u64,

    pub disk_mount: String,
    pub disk_percent: f64,
    pub disk_total_bytes: u64,
    pub disk_used_bytes: u64,
    pub disk_free_bytes: u64,
}

/// cpu utilization over one sampling window.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CpuReading {
    pub total_percent: f64,
    pub per_core_percent: Option<Vec<f64>>,
    pub user_percent: f64,
    pub system_percent: f64,
}

/// the 1, 5 and 15 minute load averages.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoadReading {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MemoryReading {
    pub percent: f64,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub available_bytes: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DiskReading {
    pub mount: String,
    pub percent: f64,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

/// clamps a percentage into `[0, 100]`, reading `NaN` as zero.
pub fn clamp_percent(percent: f64) -> f64 {
    if percent.is_nan() {
        return 0.0;
    }
    percent.clamp(0.0, 100.0)
}

/// returns `part` as a percentage of `whole`.
pub fn percent_of(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    clamp_percent(part as f64 / whole as f64 * 100.0)
}

// === impl Sample ===

impl Sample {
    /// assembles a sample, clamping every figure into its valid range.
    pub fn new(
        timestamp: DateTime<Utc>,
        cpu: CpuReading,
        load: Option<LoadReading>,
        memory: MemoryReading,
        disk: DiskReading,
    ) -> Self {
        let CpuReading {
            total_percent,
            per_core_percent,
            user_percent,
            system_percent,
        } = cpu;
        let MemoryReading {
            percent: mem_percent,
            total_bytes: mem_total_bytes,
            used_bytes: mem_used_bytes,
            free_bytes: mem_free_bytes,
            available_bytes: mem_available_bytes,
        } = memory;
        let DiskReading {
            mount: disk_mount,
            percent: disk_percent,
            total_bytes: disk_total_bytes,
            used_bytes: disk_used_bytes,
            free_bytes: disk_free_bytes,
        } = disk;

        Self {
            timestamp,
            cpu_total_percent: clamp_percent(total_percent),
            cpu_per_core_percent: per_core_percent
                .map(|cores| cores.into_iter().map(clamp_percent).collect()),
            cpu_user_percent: clamp_percent(user_percent),
            cpu_system_percent: clamp_percent(system_percent),
            load_1: load.map(|l| l.one),
            load_5: load.map(|l| l.five),
            load_15: load.map(|l| l.fifteen),
            mem_percent: clamp_percent(mem_percent),
            mem_total_bytes,
            mem_used_bytes: mem_used_bytes.min(mem_total_bytes),
            mem_free_bytes,
            mem_available_bytes,
            disk_mount,
            disk_percent: clamp_percent(disk_percent),
            disk_total_bytes,
            disk_used_bytes: disk_used_bytes.min(disk_total_bytes),
            disk_free_bytes,
        }
    }

    /// whether this sample upholds the invariants every persisted row must satisfy.
    pub fn is_consistent(&self) -> bool {
        let in_range = |p: f64| (0.0..=100.0).contains(&p);

        in_range(self.cpu_total_percent)
            && in_range(self.cpu_user_percent)
            && in_range(self.cpu_system_percent)
            && in_range(self.mem_percent)
            && in_range(self.disk_percent)
            && self
                .cpu_per_core_percent
                .iter()
                .flatten()
                .copied()
                .all(in_range)
            && self.mem_used_bytes <= self.mem_total_bytes
            && self.disk_used_bytes <= self.disk_total_bytes
    }

    /// a short human-readable summary, for heartbeat logging.
    pub fn heartbeat(&self) -> Heartbeat<'_> {
        Heartbeat(self)
    }
}

/// displays a [`Sample`] as `cpu=..% mem=..% disk=..%`.
pub struct Heartbeat<'a>(&'a Sample);

impl fmt::Display for Heartbeat<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self(sample) = self;
        write!(
            f,
            "cpu={:.1}% mem={:.1}% disk={:.1}%",
            sample.cpu_total_percent, sample.mem_percent, sample.disk_percent
        )
    }
}

// === impl MemoryReading ===

impl MemoryReading {
    /// derives the usage percentage from what remains available.
    pub fn new(total_bytes: u64, used_bytes: u64, free_bytes: u64, available_bytes: u64) -> Self {
        let available_bytes = available_bytes.min(total_bytes);
        Self {
            percent: percent_of(total_bytes - available_bytes, total_bytes),
            total_bytes,
            used_bytes: used_bytes.min(total_bytes),
            free_bytes,
            available_bytes,
        }
    }
}

// === impl DiskReading ===

impl DiskReading {
    /// `free` is the space available to unprivileged users. blocks reserved for root count
    /// towards neither `used` nor `free`, so the percentage is taken over `used + free`.
    pub fn new(mount: impl Into<String>, total_bytes: u64, used_bytes: u64, free_bytes: u64) -> Self {
        let used_bytes = used_bytes.min(total_bytes);
        Self {
            mount: mount.into(),
            percent: percent_of(used_bytes, used_bytes.saturating_add(free_bytes)),
            total_bytes,
            used_bytes,
            free_bytes,
        }
    }

    /// an empty reading for a host with no root filesystem in view.
    pub fn unavailable() -> Self {
        Self::new(ROOT_MOUNT, 0, 0, 0)
    }
}
