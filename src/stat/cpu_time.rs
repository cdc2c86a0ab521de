use super::*;

/// how a cpu has spent its time since boot, as reported by a `cpu` or `cpuN` line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CpuTime {
    /// time spent in user mode.
    user: UserHz,
    /// time spent in user mode with low priority (nice).
    nice: UserHz,
    /// time spent in system mode.
    system: UserHz,
    /// time spent in the idle task.
    idle: UserHz,
    /// time waiting for i/o to complete.
    ///
    /// this value is not reliable, and may decrease in certain conditions.
    iowait: UserHz,
    /// time servicing interrupts.
    irq: UserHz,
    /// time servicing softirqs.
    softirq: UserHz,
    /// stolen time, spent in other operating systems when running virtualized.
    steal: UserHz,
    /// time spent running a virtual cpu for guest operating systems.
    guest: UserHz,
    /// time spent running a niced guest.
    guest_nice: UserHz,
}

/// the difference between two [`CpuTime`]s of the same cpu.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Measurement {
    user: UserHz,
    nice: UserHz,
    system: UserHz,
    idle: UserHz,
    iowait: UserHz,
    irq: UserHz,
    softirq: UserHz,
    steal: UserHz,
    guest: UserHz,
    guest_nice: UserHz,
}

// == impl Measurement ===

impl Measurement {
    /// measures the time that elapsed between an earlier reading `a` and a later reading `b`.
    pub fn new(a: CpuTime, b: CpuTime) -> Self {
        let a: [UserHz; 10] = a.into();
        let b: [UserHz; 10] = b.into();

        let [
            user,
            nice,
            system,
            idle,
            iowait,
            irq,
            softirq,
            steal,
            guest,
            guest_nice,
        ] = std::array::from_fn(|i| b[i] - a[i]);

        Self {
            user,
            nice,
            system,
            idle,
            iowait,
            irq,
            softirq,
            steal,
            guest,
            guest_nice,
        }
    }

    /// returns the percentage of non-idle cpu time.
    pub fn busy_percent(&self) -> f64 {
        self.percent_of_total(self.active())
    }

    /// returns the percentage of time spent in user mode, niced or not.
    pub fn user_percent(&self) -> f64 {
        let Self { user, nice, .. } = *self;
        self.percent_of_total(user + nice)
    }

    /// returns the percentage of time spent in the kernel, including interrupt handling.
    pub fn system_percent(&self) -> f64 {
        let Self {
            system,
            irq,
            softirq,
            ..
        } = *self;
        self.percent_of_total(system + irq + softirq)
    }

    pub fn active(&self) -> UserHz {
        let Self {
            user,
            nice,
            system,
            iowait,
            irq,
            softirq,
            steal,
            guest,
            guest_nice,
            idle: _, // do not count idle time...
        } = *self;

        user + nice + system + iowait + irq + softirq + steal + guest + guest_nice
    }

    pub fn total(&self) -> UserHz {
        let Self { idle, .. } = *self;
        self.active() + idle
    }

    /// a zero-length window reads as an idle cpu.
    fn percent_of_total(&self, part: UserHz) -> f64 {
        let total = self.total();
        if total == UserHz::ZERO {
            return 0.0;
        }

        ((part / total) * 100.0).clamp(0.0, 100.0)
    }
}

// === impl CpuTime ===

impl TryFrom<Vec<UserHz>> for CpuTime {
    type Error = EntryParseError;
    fn try_from(times: Vec<UserHz>) -> Result<Self, Self::Error> {
        let found = times.len();
        <_ as TryInto<[_; 10]>>::try_into(times)
            .map(Self::from)
            .map_err(|_| EntryParseError::CpuTime { found })
    }
}

impl From<[UserHz; 10]> for CpuTime {
    fn from(
        [
            user,
            nice,
            system,
            idle,
            iowait,
            irq,
            softirq,
            steal,
            guest,
            guest_nice,
        ]: [UserHz; 10],
    ) -> Self {
        Self {
            user,
            nice,
            system,
            idle,
            iowait,
            irq,
            softirq,
            steal,
            guest,
            guest_nice,
        }
    }
}

impl From<CpuTime> for [UserHz; 10] {
    fn from(
        CpuTime {
            user,
            nice,
            system,
            idle,
            iowait,
            irq,
            softirq,
            steal,
            guest,
            guest_nice,
        }: CpuTime,
    ) -> Self {
        [
            user, nice, system, idle, iowait, irq, softirq, steal, guest, guest_nice,
        ]
    }
}
