use {
    std::{fmt::Display, thread, time::Duration},
    thiserror::Error,
    tracing::{info, warn},
};

/// a fixed number of attempts with a fixed pause between them.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// total attempts, including the first. zero is treated as one.
    pub attempts: u32,
    pub delay: Duration,
}

/// every attempt failed; `source` is the error from the last one.
#[derive(Debug, Error)]
#[error("gave up after {attempts} attempts: {source}")]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    #[source]
    pub source: E,
}

// === impl RetryPolicy ===

impl RetryPolicy {
    /// used while waiting for the database to come up: 30 attempts, one second apart.
    pub const STARTUP: Self = Self {
        attempts: 30,
        delay: Duration::from_secs(1),
    };

    /// calls `op` with the attempt number, starting at 1, until it succeeds or the attempts
    /// run out. `what` names the operation in log output.
    pub fn run<T, E, F>(&self, what: &str, mut op: F) -> Result<T, RetryExhausted<E>>
    where
        E: Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt) {
                Ok(value) => {
                    if attempt > 1 {
                        info!(attempt, "{what} succeeded");
                    }
                    return Ok(value);
                }
                Err(source) if attempt >= attempts => {
                    return Err(RetryExhausted { attempts, source });
                }
                Err(error) => {
                    warn!(%error, "{what} failed (attempt {attempt}/{attempts})");
                    thread::sleep(self.delay);
                    attempt += 1;
                }
            }
        }
    }
}
