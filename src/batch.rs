use crate::sample::Sample;

/// samples awaiting persistence, in the order they were taken.
///
/// the buffer does not enforce a capacity; callers decide when to drain it.
#[derive(Debug, Default)]
pub struct BatchBuffer {
    samples: Vec<Sample>,
}

// === impl BatchBuffer ===

impl BatchBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    pub fn append(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// borrows the pending samples without removing them.
    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    /// removes and returns every buffered sample, keeping the allocation for the next batch.
    pub fn drain(&mut self) -> Vec<Sample> {
        self.samples.drain(..).collect()
    }
}
