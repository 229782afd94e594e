//! Arbitration between service instances sharing one builtin resource.
//!
//! When several clients issue requests to the same builtin port in one cycle,
//! an [`ArbitrationPolicy`] picks the one that is served. The policy kind is
//! chosen by the backend preset and may be overridden per target in
//! configuration. A backend may also supply its own policy through
//! [`Backend::arbitration_policy`](crate::Backend::arbitration_policy).

use std::fmt;
use weft_config::Arbitration;

/// Grants one of several simultaneous requests.
///
/// `select` is pure so it can be evaluated combinationally during a cycle;
/// `commit` records a completed grant at the clock edge.
pub trait ArbitrationPolicy: fmt::Debug + Send {
    /// Returns the policy kind.
    fn kind(&self) -> Arbitration;

    /// Returns the index of the request to serve, or `None` if nobody asks.
    fn select(&self, requests: &[bool]) -> Option<usize>;

    /// Records that `granted` was served this cycle.
    fn commit(&mut self, granted: usize);
}

/// The lowest-numbered requester always wins.
#[derive(Debug, Default, Clone)]
pub struct FixedPriority;

impl ArbitrationPolicy for FixedPriority {
    fn kind(&self) -> Arbitration {
        Arbitration::FixedPriority
    }

    fn select(&self, requests: &[bool]) -> Option<usize> {
        requests.iter().position(|&r| r)
    }

    fn commit(&mut self, _granted: usize) {}
}

/// The search for a requester starts just after the last one served.
#[derive(Debug, Default, Clone)]
pub struct RoundRobin {
    last: Option<usize>,
}

impl ArbitrationPolicy for RoundRobin {
    fn kind(&self) -> Arbitration {
        Arbitration::RoundRobin
    }

    fn select(&self, requests: &[bool]) -> Option<usize> {
        let n = requests.len();
        if n == 0 {
            return None;
        }
        let start = self.last.map_or(0, |last| (last + 1) % n);
        (0..n).map(|offset| (start + offset) % n).find(|&i| requests[i])
    }

    fn commit(&mut self, granted: usize) {
        self.last = Some(granted);
    }
}

/// Creates a fresh policy of the given kind.
pub fn policy_for(kind: Arbitration) -> Box<dyn ArbitrationPolicy> {
    match kind {
        Arbitration::FixedPriority => Box::new(FixedPriority),
        Arbitration::RoundRobin => Box::new(RoundRobin::default()),
    }
}
