use crate::item::ItemError;
use crate::models::StepCounters;
use crate::resilience::SkipPhase;

/// Counter changes produced by one chunk.
///
/// Built privately by the worker running the chunk and folded into the step
/// execution at the commit sync point.
#[derive(Debug, Clone, Default)]
pub struct StepContribution {
    pub read_count: u64,
    pub write_count: u64,
    pub filter_count: u64,
    pub read_skip_count: u64,
    pub process_skip_count: u64,
    pub write_skip_count: u64,
    pub rollback_count: u64,
    isolated_write_count: u64,
    folded: bool,
    skips: Vec<(SkipPhase, ItemError)>,
}

impl StepContribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_count(&self) -> u64 {
        self.read_skip_count + self.process_skip_count + self.write_skip_count
    }

    pub fn record_skip(&mut self, phase: SkipPhase, error: ItemError) {
        match phase {
            SkipPhase::Read => self.read_skip_count += 1,
            SkipPhase::Process => self.process_skip_count += 1,
            SkipPhase::Write => self.write_skip_count += 1,
        }
        self.skips.push((phase, error));
    }

    /// Item written and committed in its own transaction during a scan
    pub fn record_isolated_write(&mut self) {
        self.write_count += 1;
        self.isolated_write_count += 1;
    }

    /// Writes that are durable even if the chunk itself fails
    pub fn isolated_write_count(&self) -> u64 {
        self.isolated_write_count
    }

    /// Called once the contribution has been added to the step counters
    pub fn mark_folded(&mut self) {
        self.folded = true;
    }

    pub fn is_folded(&self) -> bool {
        self.folded
    }

    /// Failures this chunk skipped, in the order they happened
    pub fn skips(&self) -> &[(SkipPhase, ItemError)] {
        &self.skips
    }

    /// Counter delta with one commit when the chunk committed
    pub fn to_counters(&self, committed: bool) -> StepCounters {
        StepCounters {
            read_count: self.read_count,
            write_count: self.write_count,
            filter_count: self.filter_count,
            read_skip_count: self.read_skip_count,
            process_skip_count: self.process_skip_count,
            write_skip_count: self.write_skip_count,
            rollback_count: self.rollback_count,
            commit_count: u64::from(committed),
        }
    }
}
