// Path: crates/telemetry/src/time.rs
//! A RAII timer recording a consensus phase's duration on drop.

use crate::sinks::ConsensusMetricsSink;
use std::time::Instant;

/// Times a scope and records its elapsed duration against `phase` when
/// dropped, including on an early return via `?`.
pub struct PhaseTimer<'a> {
    sink: &'a dyn ConsensusMetricsSink,
    phase: &'static str,
    start: Instant,
}

impl<'a> PhaseTimer<'a> {
    /// Starts timing `phase` against `sink`.
    pub fn new(sink: &'a dyn ConsensusMetricsSink, phase: &'static str) -> Self {
        Self { sink, phase, start: Instant::now() }
    }
}

impl Drop for PhaseTimer<'_> {
    fn drop(&mut self) {
        self.sink.observe_phase_duration(self.phase, self.start.elapsed().as_secs_f64());
    }
}
