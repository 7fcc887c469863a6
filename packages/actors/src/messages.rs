//! Message types for actor communication.

use ractor::RpcReplyPort;

/// The background sweeps run by the storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SweepKind {
    /// Fold raw counters into aggregates.
    CountersAggregation,
    /// Delete documents past their expiry.
    Expiration,
}

impl SweepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepKind::CountersAggregation => "counters-aggregator",
            SweepKind::Expiration => "expiration-manager",
        }
    }
}

impl std::fmt::Display for SweepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Messages for a SweepActor.
#[derive(Debug)]
pub enum SweepMessage {
    /// Periodic tick: run one sweep, log failures.
    Tick,

    /// Run one sweep now and report how many documents it handled.
    RunNow {
        reply: RpcReplyPort<Result<u64, String>>,
    },

    /// Stop sweeping.
    Shutdown,
}

/// Messages for the SweepSupervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Run one sweep of the given kind now.
    RunSweep {
        kind: SweepKind,
        reply: RpcReplyPort<Result<u64, String>>,
    },

    /// Stop every sweep.
    Shutdown,
}
