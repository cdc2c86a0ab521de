use {
    crate::{
        source::{ProcStatFile, StatsSource},
        stat::{CpuId, Measurement, Snapshot, StatReadError},
    },
    std::collections::BTreeMap,
};

/// observes kernel statistics.
pub struct Sentinel<S = ProcStatFile> {
    inner: Inner<S>,
}

enum Inner<S> {
    Initialized {
        /// the underlying source of kernel statistics.
        source: S,
    },
    Running {
        /// the underlying source of kernel statistics.
        source: S,
        /// the last observed snapshot.
        last: Snapshot,
    },
}

/// a recording of the system's cpu load between two snapshots.
#[derive(Clone, Debug)]
pub struct Recording {
    /// how the system cpus spent their time, in aggregate.
    pub system: Measurement,
    /// how each cpu spent its time.
    ///
    /// this is `None` if the set of online cpus changed between the two snapshots.
    pub cpus: Option<BTreeMap<CpuId, Measurement>>,
}

/// === impl Sentinel ===

impl<S: Default> Sentinel<S> {
    /// creates a new [`Sentinel`].
    pub fn new() -> Self {
        Self::with_source(S::default())
    }
}

impl<S: Default> Default for Sentinel<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Sentinel<S> {
    /// creates a new [`Sentinel`] reading from the given source.
    pub fn with_source(source: S) -> Self {
        Self {
            inner: Inner::Initialized { source },
        }
    }
}

impl<S> Sentinel<S>
where
    S: StatsSource + Default,
{
    /// returns a [`Recording`] of cpu time since this was last called.
    ///
    /// NB: by virtue of this being a comparison to the previous reading, this will return
    /// `Ok(None)` the first time it is called. a failed read leaves the previous snapshot in
    /// place, so the next recording spans the gap.
    pub fn observe(&mut self) -> Result<Option<Recording>, StatReadError> {
        let Self { inner } = self;

        match inner {
            Inner::Initialized { source } => {
                let last = Snapshot::read(source)?;
                let source = std::mem::take(source);
                *inner = Inner::Running { source, last };
                Ok(None)
            }
            Inner::Running { source, last } => {
                let new = Snapshot::read(source)?;
                let prev = std::mem::replace(last, new.clone());
                let recording = Recording::new(prev, new);
                Ok(Some(recording))
            }
        }
    }
}

// === impl Recording ===

impl Recording {
    fn new(
        Snapshot {
            system: system_a,
            cpus: cpus_a,
        }: Snapshot,
        Snapshot {
            system: system_b,
            cpus: cpus_b,
        }: Snapshot,
    ) -> Recording {
        let system = Measurement::new(system_a, system_b);

        // zip together the two sets of cpu times, if the same cpus are online in both.
        let same_cpus = cpus_a.len() == cpus_b.len() && cpus_a.keys().eq(cpus_b.keys());
        let cpus = same_cpus.then(|| {
            cpus_a
                .into_iter()
                .zip(cpus_b.into_values())
                .map(|((id, times_a), times_b)| (id, Measurement::new(times_a, times_b)))
                .collect()
        });

        Self { system, cpus }
    }

    /// returns the busy percentage of each cpu, in cpu order.
    pub fn per_cpu_percent(&self) -> Option<Vec<f64>> {
        self.cpus
            .as_ref()
            .map(|cpus| cpus.values().map(Measurement::busy_percent).collect())
    }
}
