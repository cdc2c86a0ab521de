use {
    super::*,
    crate::sample::{Sample, tests::sample},
    proptest::prelude::*,
    std::{
        cell::{Cell, RefCell},
        rc::Rc,
    },
};

/// a source whose samples carry their sequence number as `cpu_total_percent`.
///
/// the warm-up sample is number 0.
struct Scripted {
    taken: Rc<Cell<u32>>,
    stop_at: Option<u32>,
    stop: StopSignal,
}

impl MetricSource for Scripted {
    fn sample(&mut self) -> Sample {
        let id = self.taken.get();
        self.taken.set(id + 1);
        if self.stop_at == Some(id) {
            self.stop.trigger();
        }
        sample(f64::from(id))
    }
}

#[derive(Debug, Error)]
#[error("database went away")]
struct Unavailable;

#[derive(Default)]
struct Log {
    /// every call to `flush`, successful or not.
    attempts: usize,
    /// the sequence numbers of each successful write.
    batches: Vec<Vec<f64>>,
    /// how many upcoming writes should fail.
    failures: u32,
}

#[derive(Clone, Default)]
struct Recorder(Rc<RefCell<Log>>);

impl SampleSink for Recorder {
    type Error = Unavailable;

    fn flush(&mut self, batch: &[Sample]) -> Result<(), Unavailable> {
        let Self(log) = self;
        let mut log = log.borrow_mut();
        log.attempts += 1;

        if log.failures > 0 {
            log.failures -= 1;
            return Err(Unavailable);
        }

        log.batches
            .push(batch.iter().map(|s| s.cpu_total_percent).collect());
        Ok(())
    }
}

struct Harness {
    taken: Rc<Cell<u32>>,
    recorder: Recorder,
    pipeline: Pipeline<Scripted, Recorder>,
}

fn cadence(batch_size: usize) -> Cadence {
    Cadence {
        interval: Duration::ZERO,
        batch_size,
        flush_retries: 0,
        flush_retry_delay: Duration::ZERO,
    }
}

/// a pipeline that is stopped by its own source after `stop_at` samples.
fn harness(cadence: Cadence, stop_at: Option<u32>, failures: u32) -> Harness {
    let stop = StopSignal::new();
    let taken = Rc::new(Cell::new(0));
    let source = Scripted {
        taken: Rc::clone(&taken),
        stop_at,
        stop: stop.clone(),
    };
    let recorder = Recorder::default();
    recorder.0.borrow_mut().failures = failures;

    let sink = recorder.clone();
    let pipeline =
        Pipeline::start(source, || Ok::<_, Unavailable>(sink), cadence, stop).unwrap();

    Harness {
        taken,
        recorder,
        pipeline,
    }
}

fn batches(recorder: &Recorder) -> Vec<Vec<f64>> {
    recorder.0.borrow().batches.clone()
}

#[test]
fn full_batch_is_written_once() {
    let Harness {
        recorder, pipeline, ..
    } = harness(cadence(3), Some(3), 0);

    let report = pipeline.run().unwrap();

    assert_eq!(batches(&recorder), [vec![1.0, 2.0, 3.0]]);
    assert_eq!(recorder.0.borrow().attempts, 1);
    assert_eq!(
        report,
        Shutdown {
            ticks: 3,
            persisted: 3,
            flushes: 1,
            lost: 0,
        }
    );
}

#[test]
fn stop_writes_the_partial_batch() {
    let Harness {
        taken,
        recorder,
        pipeline,
    } = harness(cadence(5), Some(2), 0);

    let report = pipeline.run().unwrap();

    assert_eq!(batches(&recorder), [vec![1.0, 2.0]]);
    assert_eq!(report.persisted, 2);
    // the warm-up and two ticks; nothing is sampled once the stop is seen.
    assert_eq!(taken.get(), 3);
}

#[test]
fn stop_with_an_empty_buffer_writes_nothing() {
    let Harness {
        recorder, pipeline, ..
    } = harness(cadence(2), Some(4), 0);

    let report = pipeline.run().unwrap();

    assert_eq!(batches(&recorder), [vec![1.0, 2.0], vec![3.0, 4.0]]);
    assert_eq!(recorder.0.borrow().attempts, 2);
    assert_eq!(report.flushes, 2);
}

#[test]
fn stop_before_the_first_tick() {
    let Harness {
        taken,
        recorder,
        pipeline,
    } = harness(cadence(2), Some(0), 0);

    let report = pipeline.run().unwrap();

    assert_eq!(taken.get(), 1);
    assert_eq!(recorder.0.borrow().attempts, 0);
    assert_eq!(report, Shutdown::default());
}

#[test]
fn warm_up_is_discarded() {
    let Harness {
        taken,
        recorder,
        pipeline,
    } = harness(cadence(1), Some(1), 0);
    assert_eq!(taken.get(), 1, "the warm-up is taken at start");
    assert_eq!(pipeline.state(), State::Running);

    pipeline.run().unwrap();

    assert_eq!(batches(&recorder), [vec![1.0]]);
}

#[test]
fn several_batches_then_remainder() {
    let Harness {
        recorder, pipeline, ..
    } = harness(cadence(2), Some(5), 0);

    let report = pipeline.run().unwrap();

    assert_eq!(
        batches(&recorder),
        [vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0]]
    );
    assert_eq!(
        report,
        Shutdown {
            ticks: 5,
            persisted: 5,
            flushes: 3,
            lost: 0,
        }
    );
    assert!(report.is_clean());
}

#[test]
fn write_failure_is_fatal_without_retries() {
    let Harness {
        taken,
        recorder,
        pipeline,
    } = harness(cadence(2), None, 1);

    let error = pipeline.run().unwrap_err();

    assert!(matches!(error, PipelineError::Write { pending: 2, .. }));
    assert_eq!(error.source().unwrap().to_string(), "database went away");
    assert!(batches(&recorder).is_empty());
    // no samples are taken after the failure.
    assert_eq!(taken.get(), 3);
}

#[test]
fn transient_write_failure_is_retried() {
    let cadence = Cadence {
        flush_retries: 2,
        ..cadence(2)
    };
    let Harness {
        recorder, pipeline, ..
    } = harness(cadence, Some(2), 1);

    let report = pipeline.run().unwrap();

    assert_eq!(batches(&recorder), [vec![1.0, 2.0]]);
    assert_eq!(recorder.0.borrow().attempts, 2);
    assert_eq!(report.persisted, 2);
    assert_eq!(report.flushes, 1);
}

#[test]
fn retries_run_out() {
    let cadence = Cadence {
        flush_retries: 2,
        ..cadence(1)
    };
    let Harness {
        recorder, pipeline, ..
    } = harness(cadence, None, 3);

    let error = pipeline.run().unwrap_err();

    assert!(matches!(error, PipelineError::Write { pending: 1, .. }));
    assert_eq!(recorder.0.borrow().attempts, 3);
}

#[test]
fn failed_final_write_is_reported_not_fatal() {
    let Harness {
        recorder, pipeline, ..
    } = harness(cadence(5), Some(3), 1);

    let report = pipeline.run().unwrap();

    assert_eq!(recorder.0.borrow().attempts, 1);
    assert!(batches(&recorder).is_empty());
    assert_eq!(report.lost, 3);
    assert_eq!(report.persisted, 0);
    assert!(!report.is_clean());
}

#[test]
fn connect_failure_after_warm_up() {
    let taken = Rc::new(Cell::new(0));
    let source = Scripted {
        taken: Rc::clone(&taken),
        stop_at: None,
        stop: StopSignal::new(),
    };

    let started = Pipeline::start(
        source,
        || Err::<Recorder, _>(Unavailable),
        cadence(1),
        StopSignal::new(),
    );

    assert!(matches!(started, Err(PipelineError::Connect(_))));
    assert_eq!(taken.get(), 1);
}

#[test]
fn stop_signal_is_shared() {
    let stop = StopSignal::new();
    let handle = stop.clone();
    assert!(!stop.is_triggered());
    handle.trigger();
    assert!(stop.is_triggered());
}

proptest! {
    #[test]
    fn n_ticks_make_one_write(n in 1usize..=64) {
        let stop_at = u32::try_from(n).unwrap();
        let Harness { recorder, pipeline, .. } = harness(cadence(n), Some(stop_at), 0);

        let report = pipeline.run().unwrap();

        let expected = (1..=stop_at).map(f64::from).collect::<Vec<_>>();
        prop_assert_eq!(batches(&recorder), vec![expected]);
        prop_assert_eq!(recorder.0.borrow().attempts, 1);
        prop_assert_eq!(report.persisted, n);
    }

    #[test]
    fn stop_mid_batch_writes_exactly_what_was_buffered(n in 2usize..=64, k in 1usize..64) {
        prop_assume!(k < n);
        let stop_at = u32::try_from(k).unwrap();
        let Harness { recorder, pipeline, .. } = harness(cadence(n), Some(stop_at), 0);

        let report = pipeline.run().unwrap();

        let expected = (1..=stop_at).map(f64::from).collect::<Vec<_>>();
        prop_assert_eq!(batches(&recorder), vec![expected]);
        prop_assert_eq!(report.persisted, k);
    }
}
