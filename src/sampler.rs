//! reads host counters into [`Sample`]s.

use {
    crate::{
        sample::{CpuReading, DiskReading, LoadReading, MemoryReading, ROOT_MOUNT, Sample},
        sentinel::{Recording, Sentinel},
        source::{Clock, ProcStatFile, StatsSource, SystemClock},
        stat::StatReadError,
    },
    chrono::{DateTime, Utc},
    sysinfo::System,
    tracing::{debug, warn},
};

/// a source of samples.
pub trait MetricSource {
    /// takes one sample. this never fails; metrics the host cannot provide are left absent.
    ///
    /// cpu figures cover the window since the previous call, so the first sample a source
    /// produces is meaningless and should be discarded.
    fn sample(&mut self) -> Sample;
}

/// samples the host this process runs on.
///
/// cpu time comes from `/proc/stat`, which breaks usage down into user and system time.
/// memory and load come from `sysinfo`, and disk usage from `statvfs(3)` on the root mount.
pub struct HostSampler<S = ProcStatFile, C = SystemClock> {
    sentinel: Sentinel<S>,
    clock: C,
    system: System,
    /// the last timestamp handed out, so that wall clock steps never run samples backwards.
    last: Option<DateTime<Utc>>,
    /// set once the first sample has been taken.
    warmed_up: bool,
    warned: Warned,
}

/// platform gaps that have already been logged.
#[derive(Default)]
struct Warned {
    stat: bool,
    disk: bool,
}

// === impl HostSampler ===

impl HostSampler {
    pub fn new() -> Self {
        Self::with_parts(ProcStatFile, SystemClock)
    }
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, C> HostSampler<S, C> {
    /// creates a sampler reading cpu statistics from `source` and time from `clock`.
    pub fn with_parts(source: S, clock: C) -> Self {
        Self {
            sentinel: Sentinel::with_source(source),
            clock,
            system: System::new(),
            last: None,
            warmed_up: false,
            warned: Warned::default(),
        }
    }
}

impl<S, C> MetricSource for HostSampler<S, C>
where
    S: StatsSource + Default,
    C: Clock,
{
    fn sample(&mut self) -> Sample {
        let timestamp = self.timestamp();
        let cpu = self.cpu();
        let memory = self.memory();
        let disk = self.disk();

        Sample::new(timestamp, cpu, load_average(), memory, disk)
    }
}

impl<S, C> HostSampler<S, C>
where
    S: StatsSource + Default,
    C: Clock,
{
    fn timestamp(&mut self) -> DateTime<Utc> {
        let now = self.clock.now();
        let timestamp = match self.last {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last = Some(timestamp);
        timestamp
    }

    fn cpu(&mut self) -> CpuReading {
        let warm_up = !std::mem::replace(&mut self.warmed_up, true);

        match self.sentinel.observe() {
            Ok(Some(recording)) => CpuReading::from(&recording),
            // the warm-up reading; there is no window to measure yet.
            Ok(None) if warm_up => CpuReading::default(),
            // the warm-up read failed, so this read only starts the window.
            Ok(None) => {
                debug!("no earlier cpu statistics to compare with, using sysinfo");
                self.sysinfo_cpu()
            }
            Err(error) => self.cpu_fallback(error),
        }
    }

    fn cpu_fallback(&mut self, error: StatReadError) -> CpuReading {
        if !self.warned.stat {
            warn!(%error, "cannot read kernel cpu statistics, falling back to sysinfo");
            self.warned.stat = true;
        } else {
            debug!(%error, "cannot read kernel cpu statistics");
        }

        self.sysinfo_cpu()
    }

    /// reads overall and per-cpu usage from `sysinfo`, which has no user/system split.
    fn sysinfo_cpu(&mut self) -> CpuReading {
        self.system.refresh_cpu_usage();
        let per_core = self
            .system
            .cpus()
            .iter()
            .map(|cpu| f64::from(cpu.cpu_usage()))
            .collect::<Vec<_>>();

        CpuReading {
            total_percent: f64::from(self.system.global_cpu_usage()),
            per_core_percent: (!per_core.is_empty()).then_some(per_core),
            user_percent: 0.0,
            system_percent: 0.0,
        }
    }

    fn memory(&mut self) -> MemoryReading {
        let Self { system, .. } = self;
        system.refresh_memory();

        MemoryReading::new(
            system.total_memory(),
            system.used_memory(),
            system.free_memory(),
            system.available_memory(),
        )
    }

    fn disk(&mut self) -> DiskReading {
        match root_usage() {
            Ok(reading) => reading,
            Err(error) => {
                if !self.warned.disk {
                    warn!(%error, mount = ROOT_MOUNT, "cannot read filesystem usage");
                    self.warned.disk = true;
                }
                DiskReading::unavailable()
            }
        }
    }
}

/// reads usage of the root filesystem the way `df(1)` does.
#[cfg(unix)]
fn root_usage() -> Result<DiskReading, nix::Error> {
    let stat = nix::sys::statvfs::statvfs(ROOT_MOUNT)?;
    let fragment = u64::from(stat.fragment_size());
    let blocks = |count| u64::from(count).saturating_mul(fragment);

    let total = blocks(stat.blocks());
    let used = total.saturating_sub(blocks(stat.blocks_free()));
    let free = blocks(stat.blocks_available());

    Ok(DiskReading::new(ROOT_MOUNT, total, used, free))
}

#[cfg(not(unix))]
fn root_usage() -> Result<DiskReading, std::io::Error> {
    Err(std::io::ErrorKind::Unsupported.into())
}

/// load averages exist on unix-likes only.
fn load_average() -> Option<LoadReading> {
    if !cfg!(unix) {
        return None;
    }

    let sysinfo::LoadAvg {
        one,
        five,
        fifteen,
    } = System::load_average();
    Some(LoadReading { one, five, fifteen })
}

// === impl CpuReading ===

impl From<&Recording> for CpuReading {
    fn from(recording: &Recording) -> Self {
        let Recording { system, .. } = recording;
        Self {
            total_percent: system.busy_percent(),
            per_core_percent: recording.per_cpu_percent(),
            user_percent: system.user_percent(),
            system_percent: system.system_percent(),
        }
    }
}
