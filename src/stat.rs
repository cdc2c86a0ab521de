use {
    crate::source::StatsSource,
    std::{
        collections::BTreeMap,
        io::{self, BufRead, BufReader},
        ops::Not,
        str::FromStr,
    },
    thiserror::Error,
};

pub use self::{
    cpu_time::{CpuTime, Measurement},
    user_hz::UserHz,
};

mod cpu_time;
mod user_hz;


/// a snapshot of the cpus' statistics at a moment in time.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub system: CpuTime,
    pub cpus: BTreeMap<CpuId, CpuTime>,
}

/// an entry in the `/proc/stat` kernel statistics table.
///
/// see `proc_stat(5)` for more information.
#[derive(Debug, Eq, PartialEq)]
pub enum Entry {
    /// the amount of time that the system ("cpu" line) spent in various states.
    AllCpu {
        time: CpuTime,
    },
    /// the amount of time that a specific cpu ("cpuN" line) spent in various states.
    Cpu {
        id: CpuId,
        time: CpuTime,
    },
    /// the number of pages the system paged in and the number that were paged out (from disk).
    Page,
    /// the number of swap pages that have been brought in and out.
    Swap,
    /// this line shows counts of interrupts serviced since boot time.
    Intr,
    DiskIo,
    /// the number of context switches that the system underwent.
    Ctxt,
    Btime,
    /// the number of forks since boot.
    Processes,
    /// the number of processes in runnable state.  (linux 2.5.45 onward.)
    ProcsRunning,
    /// the number of processes blocked waiting for i/o to complete.
    ProcsBlocked,
    /// this line shows the number of softirq for all cpus.
    SoftIrq,
}

/// a logical cpu, numbered as the kernel numbers it.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct CpuId(u16);

#[derive(Debug, Eq, Error, PartialEq)]
pub enum EntryParseError {
    #[error("empty entry")]
    Empty,
    #[error("unrecognized entry kind: {kind}")]
    UnrecognizedEntry { kind: String },
    #[error("invalid cpu id: {0}")]
    CpuIdParse(#[source] std::num::ParseIntError),
    #[error("invalid time value: {0}")]
    UserHzParse(#[source] std::num::ParseIntError),
    #[error("expected 10 cpu time values, found {found}")]
    CpuTime { found: usize },
}

#[derive(Debug, Error)]
pub enum StatReadError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Entry(#[from] EntryParseError),
    #[error("no aggregate `cpu` line")]
    MissingAggregate,
}

enum Either<'a> {
    Cpu(&'a str),
    Entry(Entry),
}

// === impl Snapshot ===

impl Snapshot {
    /// uses the given source to parse a snapshot of the cpu statistics.
    pub(crate) fn read(stats: &impl StatsSource) -> Result<Snapshot, StatReadError> {
        let reader = stats.open()?;

        let mut system = None;
        let mut cpus = BTreeMap::default();
        for line in BufReader::new(reader).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Entry>()? {
                Entry::Cpu { id, time } => {
                    cpus.insert(id, time);
                }
                Entry::AllCpu { time } => {
                    system.replace(time);
                }
                _ => {}
            }
        }

        let system = system.ok_or(StatReadError::MissingAggregate)?;

        Ok(Snapshot { system, cpus })
    }
}

// === impl Entry ===

impl FromStr for Entry {
    type Err = EntryParseError;
    fn from_str(entry: &str) -> Result<Self, Self::Err> {
        let tokens = entry
            .split(' ')
            .filter(|t| t.is_empty().not())
            .collect::<Vec<_>>();
        let [kind, tokens @ ..] = tokens.as_slice() else {
            return Err(EntryParseError::Empty);
        };

        let id = match Self::parse_entry_kind(kind) {
            Either::Cpu(cpu) => Self::parse_cpu_id(cpu)?,
            Either::Entry(entry) => return Ok(entry),
        };

        let time = tokens
            .iter()
            .map(|token| token.parse::<UserHz>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(EntryParseError::UserHzParse)
            .and_then(CpuTime::try_from)?;

        Ok(if let Some(id) = id {
            Self::Cpu { id, time }
        } else {
            Self::AllCpu { time }
        })
    }
}

impl Entry {
    fn parse_entry_kind(kind: &str) -> Either<'_> {
        use Entry::*;

        match kind {
            "page" => Either::Entry(Page),
            "swap" => Either::Entry(Swap),
            "intr" => Either::Entry(Intr),
            "disk_io" => Either::Entry(DiskIo),
            "ctxt" => Either::Entry(Ctxt),
            "btime" => Either::Entry(Btime),
            "processes" => Either::Entry(Processes),
            "procs_running" => Either::Entry(ProcsRunning),
            "procs_blocked" => Either::Entry(ProcsBlocked),
            "softirq" => Either::Entry(SoftIrq),
            cpu => Either::Cpu(cpu),
        }
    }

    fn parse_cpu_id(token: &str) -> Result<Option<CpuId>, EntryParseError> {
        use EntryParseError::{CpuIdParse, UnrecognizedEntry};

        // strip the token of its "cpu" prefix.
        let suffix = token.strip_prefix("cpu").ok_or_else(|| UnrecognizedEntry {
            kind: token.to_owned(),
        })?;

        // if there is no suffix, this is the aggregate line.
        if suffix.is_empty() {
            return Ok(None);
        }

        suffix
            .parse::<u16>()
            .map(CpuId)
            .map(Some)
            .map_err(CpuIdParse)
    }
}
