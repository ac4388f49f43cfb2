//! Processor-level counters.

/// Snapshot of the processor's throughput counters.
///
/// `active` counts registered machines that have not reached a terminal
/// state; the success and failure counters only ever grow.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorStats {
    /// Machines still moving through the pipeline.
    pub active: usize,
    /// Messages confirmed end to end.
    pub succeeded: u64,
    /// Messages settled in the dead letter, expired or cancelled.
    pub failed: u64,
}

impl ProcessorStats {
    pub fn success_rate(&self) -> f64 {
        let settled = self.succeeded + self.failed;
        if settled == 0 {
            return 0.0;
        }
        self.succeeded as f64 / settled as f64
    }
}

impl std::fmt::Display for ProcessorStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "active={} succeeded={} failed={} success_rate={:.2}%",
            self.active,
            self.succeeded,
            self.failed,
            self.success_rate() * 100.0
        )
    }
}
