//! the sampling loop.
//!
//! a [`Pipeline`] samples the host on a fixed cadence, buffers samples, and writes them out
//! a batch at a time. it moves through these states:
//!
//! ```text
//! Starting -> Running -> Draining -> Stopped
//!     \          \
//!      `----------`-----> Failed
//! ```
//!
//! once a [`StopSignal`] is triggered, the loop stops sampling at the start of the next tick,
//! writes whatever is still buffered, and releases the sink.

use {
    crate::{
        batch::BatchBuffer,
        config::SamplerConfig,
        retry::{RetryExhausted, RetryPolicy},
        sampler::MetricSource,
        store::SampleSink,
    },
    std::{
        error::Error,
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        thread,
        time::Duration,
    },
    thiserror::Error,
    tracing::{debug, error, info},
};

#[cfg(test)]
mod tests;

type BoxError = Box<dyn Error + Send + Sync>;

/// how often to sample, and how samples are written.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cadence {
    pub interval: Duration,
    pub batch_size: usize,
    /// extra attempts for a failed write while running.
    pub flush_retries: u32,
    pub flush_retry_delay: Duration,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Starting,
    Running,
    Draining,
    Stopped,
    Failed,
}

/// asks a running [`Pipeline`] to shut down.
///
/// clones share one flag.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

/// what a pipeline did before it stopped.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Shutdown {
    /// samples taken, not counting the warm-up.
    pub ticks: u64,
    /// samples written to the sink.
    pub persisted: usize,
    /// successful writes.
    pub flushes: usize,
    /// samples dropped because the final write failed.
    pub lost: usize,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not connect to the sink")]
    Connect(#[source] BoxError),
    #[error("could not write samples, {pending} left unwritten")]
    Write {
        pending: usize,
        #[source]
        source: BoxError,
    },
}

pub struct Pipeline<M, S> {
    source: M,
    sink: S,
    buffer: BatchBuffer,
    cadence: Cadence,
    stop: StopSignal,
    state: State,
    report: Shutdown,
}

// === impl Cadence ===

impl From<&SamplerConfig> for Cadence {
    fn from(config: &SamplerConfig) -> Self {
        let SamplerConfig {
            interval,
            batch_size,
            flush_retries,
            flush_retry_delay,
            ..
        } = config;

        Self {
            interval: *interval,
            batch_size: *batch_size,
            flush_retries: *flush_retries,
            flush_retry_delay: *flush_retry_delay,
        }
    }
}

impl Cadence {
    fn flush_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.flush_retries.saturating_add(1),
            delay: self.flush_retry_delay,
        }
    }
}

// === impl Shutdown ===

impl Shutdown {
    /// whether every sample taken was written.
    pub fn is_clean(&self) -> bool {
        self.lost == 0
    }
}

// === impl StopSignal ===

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let Self(flag) = self;
        flag.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        let Self(flag) = self;
        flag.load(Ordering::Acquire)
    }
}

// === impl Pipeline ===

impl<M, S> Pipeline<M, S>
where
    M: MetricSource,
    S: SampleSink,
{
    /// takes the warm-up sample and then opens the sink.
    ///
    /// the warm-up sample is discarded; it only primes the source's cpu accounting.
    pub fn start<F, E>(
        mut source: M,
        connect: F,
        cadence: Cadence,
        stop: StopSignal,
    ) -> Result<Self, PipelineError>
    where
        F: FnOnce() -> Result<S, E>,
        E: Into<BoxError>,
    {
        debug!(state = ?State::Starting, "taking warm-up sample");
        let _warm_up = source.sample();

        let sink = connect().map_err(|error| {
            let error = error.into();
            error!(%error, "could not connect, giving up");
            PipelineError::Connect(error)
        })?;

        Ok(Self {
            source,
            sink,
            buffer: BatchBuffer::with_capacity(cadence.batch_size),
            cadence,
            stop,
            state: State::Running,
            report: Shutdown::default(),
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// samples until the stop signal is triggered, then writes out what is left.
    ///
    /// returns an error if a write fails while running. the samples still buffered at that
    /// point are lost.
    pub fn run(mut self) -> Result<Shutdown, PipelineError> {
        let Cadence {
            interval,
            batch_size,
            ..
        } = self.cadence;
        info!(?interval, batch_size, "sampling");

        while !self.stop.is_triggered() {
            if let Err(error) = self.tick() {
                self.transition(State::Failed);
                return Err(error);
            }
            thread::sleep(interval);
        }

        Ok(self.drain())
    }

    /// takes one sample, and writes the buffer out if it is full.
    fn tick(&mut self) -> Result<(), PipelineError> {
        let sample = self.source.sample();
        self.report.ticks += 1;

        if self.report.ticks == 1 {
            info!(heartbeat = %sample.heartbeat(), "first sample");
        } else {
            debug!(heartbeat = %sample.heartbeat(), "sample");
        }

        self.buffer.append(sample);
        if self.buffer.len() >= self.cadence.batch_size {
            self.flush()?;
        }

        Ok(())
    }

    fn flush(&mut self) -> Result<(), PipelineError> {
        let Self {
            sink,
            buffer,
            cadence,
            report,
            ..
        } = self;

        let written = cadence
            .flush_policy()
            .run("writing samples", |_| sink.flush(buffer.as_slice()));

        match written {
            Ok(()) => {
                let rows = buffer.drain().len();
                report.persisted += rows;
                report.flushes += 1;
                debug!(rows, "wrote batch");
                Ok(())
            }
            Err(RetryExhausted { attempts, source }) => {
                let pending = buffer.len();
                error!(error = %source, attempts, pending, "could not write samples, giving up");
                Err(PipelineError::Write {
                    pending,
                    source: Box::new(source),
                })
            }
        }
    }

    /// makes one last attempt to write the buffer, then releases the sink.
    fn drain(mut self) -> Shutdown {
        self.transition(State::Draining);

        if !self.buffer.is_empty() {
            let batch = self.buffer.drain();
            match self.sink.flush(&batch) {
                Ok(()) => {
                    self.report.persisted += batch.len();
                    self.report.flushes += 1;
                    info!(rows = batch.len(), "wrote remaining samples");
                }
                Err(error) => {
                    error!(%error, lost = batch.len(), "could not write remaining samples");
                    self.report.lost = batch.len();
                }
            }
        }

        self.transition(State::Stopped);
        let Self { sink, report, .. } = self;
        drop(sink);
        info!(
            ticks = report.ticks,
            persisted = report.persisted,
            lost = report.lost,
            "stopped"
        );

        report
    }

    fn transition(&mut self, to: State) {
        debug!(from = ?self.state, ?to, "state change");
        self.state = to;
    }
}
