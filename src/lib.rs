//! a host utilization sampler.
//!
//! [`HostSampler`] reads cpu, memory, load and disk figures from the running host. a
//! [`Pipeline`] takes a sample on a fixed cadence, buffers samples, and writes them to a
//! [`SampleSink`] a batch at a time. [`PgStore`] is the postgres sink, and [`api`] serves the
//! stored rows back over http.

pub use self::{
    batch::BatchBuffer,
    config::{ApiConfig, DbConfig, LogConfig, LogFormat, SamplerConfig},
    pipeline::{Cadence, Pipeline, PipelineError, Shutdown, State, StopSignal},
    retry::{RetryExhausted, RetryPolicy},
    sample::Sample,
    sampler::{HostSampler, MetricSource},
    store::{ConnectError, PgStore, SampleSink, WriteError},
};

/// the http query service.
pub mod api;

/// pending samples.
pub mod batch;

pub mod config;

pub mod logging;

pub mod pipeline;

/// queries over stored samples.
pub mod query;

/// retrying fallible operations.
pub mod retry;

pub mod sample;

pub mod sampler;

/// delta-observation of kernel cpu statistics.
pub mod sentinel;

pub mod signal;

/// sources of kernel statistics and time.
pub mod source;

/// kernel statistics facilities.
///
/// this file provides tools to interact with `/proc/stat`.
pub mod stat;

/// the postgres sink.
pub mod store;
