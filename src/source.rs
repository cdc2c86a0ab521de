use {
    chrono::{DateTime, Utc},
    std::{
        cell::RefCell,
        collections::VecDeque,
        fs::File,
        io::{self, BufReader, Cursor, Read},
    },
};

pub use self::{clock::*, stats::*};

/// abstracts over wall clocks.
mod clock {
    use super::*;

    /// a source of sample timestamps.
    pub trait Clock {
        fn now(&self) -> DateTime<Utc>;
    }

    #[derive(Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// a mock clock.
    #[derive(Default)]
    #[allow(dead_code, reason = "this is a testing utility.")]
    pub struct MockClock {
        times: RefCell<VecDeque<DateTime<Utc>>>,
    }

    #[allow(dead_code, reason = "this is a testing utility.")]
    impl MockClock {
        pub fn with(times: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
            Self {
                times: RefCell::new(times.into_iter().collect()),
            }
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> DateTime<Utc> {
            let MockClock { times } = self;

            times
                .borrow_mut()
                .pop_front()
                .expect("mock times should not be empty")
        }
    }
}

/// abstracts over providers of statistics.
mod stats {
    use super::*;

    /// a source of kernel statistics.
    pub trait StatsSource {
        /// returns a reader.
        fn open(&self) -> io::Result<impl Read>;
    }

    /// stats backed by `/proc/stat`.
    #[derive(Default)]
    pub struct ProcStatFile;

    /// a mock stat source.
    #[derive(Default)]
    #[allow(dead_code, reason = "this is a testing utility.")]
    pub struct MockStatFile {
        stats: RefCell<VecDeque<String>>,
    }

    // === impl ProcStatFile ===

    impl StatsSource for ProcStatFile {
        fn open(&self) -> io::Result<impl Read> {
            File::open(Self::STAT).map(BufReader::new)
        }
    }

    impl ProcStatFile {
        const STAT: &str = "/proc/stat";
    }

    // === impl MockStatFile ===

    #[allow(dead_code, reason = "this is a testing utility.")]
    impl MockStatFile {
        pub fn with<S: Into<String>>(stats: impl IntoIterator<Item = S>) -> Self {
            Self {
                stats: RefCell::new(stats.into_iter().map(Into::into).collect()),
            }
        }
    }

    /// NB: an exhausted mock reports `NotFound`, like a host without procfs.
    impl StatsSource for MockStatFile {
        fn open(&self) -> io::Result<impl Read> {
            let Self { stats } = self;

            stats
                .borrow_mut()
                .pop_front()
                .map(Cursor::new)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "mock stats exhausted"))
        }
    }
}
