//! samples this host into postgres until asked to stop.

use {
    anyhow::Context,
    clap::Parser,
    std::process::ExitCode,
    sysmon::{
        Cadence, HostSampler, PgStore, Pipeline, RetryPolicy, SamplerConfig, StopSignal, logging,
        signal,
    },
    tracing::{error, info, warn},
};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let config = SamplerConfig::parse();
    logging::init(config.log.format)?;

    info!(
        interval = config.interval_secs(),
        batch_size = config.batch_size,
        flush_retries = config.flush_retries,
        db = %config.db,
        "starting sampler"
    );

    let stop = StopSignal::new();
    let mut sampling = tokio::task::spawn_blocking({
        let stop = stop.clone();
        move || {
            let SamplerConfig { db, .. } = &config;
            let reconnect = config.flush_retries > 0;
            let pipeline = Pipeline::start(
                HostSampler::new(),
                || PgStore::open(db, RetryPolicy::STARTUP).map(|s| s.reconnecting(reconnect)),
                Cadence::from(&config),
                stop,
            )?;
            pipeline.run()
        }
    });

    let finished = tokio::select! {
        finished = &mut sampling => finished,
        () = signal::shutdown() => {
            stop.trigger();
            sampling.await
        }
    };

    match finished.context("sampling thread panicked")? {
        Ok(report) if !report.is_clean() => {
            warn!(
                samples = report.persisted,
                lost = report.lost,
                "sampler stopped, samples lost"
            );
            Ok(ExitCode::SUCCESS)
        }
        Ok(report) => {
            info!(samples = report.persisted, "sampler stopped cleanly");
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            error!(%error, "sampler failed");
            Ok(ExitCode::FAILURE)
        }
    }
}
