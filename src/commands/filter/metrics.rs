use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct QueueDepthSnapshot {
    pub current: usize,
    pub peak: usize,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PipelineQueueSnapshot {
    pub batches: QueueDepthSnapshot,
    pub artifacts: QueueDepthSnapshot,
}

#[derive(Debug, Default)]
pub struct QueueDepthTracker {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl QueueDepthTracker {
    pub fn increment(&self) -> usize {
        let current = self.current.fetch_add(1, Ordering::Relaxed) + 1;
        self.update_peak(current);
        current
    }

    pub fn decrement(&self) -> usize {
        let mut observed = self.current.load(Ordering::Relaxed);
        loop {
            if observed == 0 {
                return 0;
            }
            match self.current.compare_exchange_weak(
                observed,
                observed - 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return observed - 1,
                Err(next) => observed = next,
            }
        }
    }

    pub fn snapshot(&self) -> QueueDepthSnapshot {
        QueueDepthSnapshot {
            current: self.current.load(Ordering::Relaxed),
            peak: self.peak.load(Ordering::Relaxed),
        }
    }

    fn update_peak(&self, current: usize) {
        let mut peak = self.peak.load(Ordering::Relaxed);
        while current > peak {
            match self.peak.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(next) => peak = next,
            }
        }
    }
}

/// `batches`: dispatched and not yet picked up by a worker.
/// `artifacts`: finished and not yet written by the sequencer.
#[derive(Debug, Default)]
pub struct PipelineQueueMetrics {
    pub batches: QueueDepthTracker,
    pub artifacts: QueueDepthTracker,
}

impl PipelineQueueMetrics {
    pub fn snapshot(&self) -> PipelineQueueSnapshot {
        PipelineQueueSnapshot {
            batches: self.batches.snapshot(),
            artifacts: self.artifacts.snapshot(),
        }
    }
}

/// Maximum number of batches dispatched but not yet written.
pub fn compute_in_flight_capacity(num_threads: usize) -> usize {
    num_threads.max(1).saturating_mul(2)
}
