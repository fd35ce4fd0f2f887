// Path: crates/consensus/src/status.rs
//! The replica's externally observable status (§6, §10.6).

/// A replica's health as observed from outside the consensus task.
///
/// Set exclusively by the consensus task itself; `pop-node` exposes the
/// current value over a `watch` channel rather than locking shared state,
/// since there is only ever one writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaStatus {
    /// Caught up and participating normally.
    Healthy,
    /// Behind the observed chain tip; pulling state via sync (§4.5).
    Lagging {
        /// This replica's locally committed height.
        h_local: u64,
        /// The highest height this replica has observed from peers.
        h_observed: u64,
    },
    /// Mid view-change for height `h`, moving from view `from` to `to`.
    ViewChanging {
        /// The height stalled.
        h: u64,
        /// The view being abandoned.
        from: u64,
        /// The view being requested.
        to: u64,
    },
    /// The inbox or verification pipeline is saturated; admitting slower.
    Overloaded,
    /// Halted after a §7 Fatal condition. No further signatures are emitted.
    Fatal {
        /// Human-readable halt reason.
        reason: String,
    },
}

impl ReplicaStatus {
    /// `true` for the terminal halted state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_fatal_variant_reports_fatal() {
        assert!(!ReplicaStatus::Healthy.is_fatal());
        assert!(!ReplicaStatus::Overloaded.is_fatal());
        assert!(ReplicaStatus::Fatal { reason: "disk corrupt".into() }.is_fatal());
    }
}
