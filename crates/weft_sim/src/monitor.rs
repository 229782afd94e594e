//! Channel stability checking.
//!
//! Once a producer raises `valid`, it must keep `valid` high and the payload
//! unchanged until the consumer raises `ready`. [`HandshakeMonitor`] watches
//! every channel and records each cycle that breaks this rule.

use crate::value::SimValue;
use std::collections::HashMap;
use std::fmt;
use weft_ir::{ChannelId, InstanceId};

/// How a stalled transfer was broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// `valid` fell before the transfer completed.
    ValidDropped,
    /// The payload changed while waiting for `ready`.
    DataChanged,
}

/// A recorded stability violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Cycle in which the rule was broken.
    pub cycle: u64,
    /// Path of the instance owning the channel.
    pub path: String,
    /// Channel index within the module.
    pub channel: u32,
    /// What happened.
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            ViolationKind::ValidDropped => "valid dropped before ready",
            ViolationKind::DataChanged => "payload changed before ready",
        };
        write!(
            f,
            "cycle {}: {} channel #{}: {what}",
            self.cycle, self.path, self.channel
        )
    }
}

/// Tracks stalled transfers across cycles.
#[derive(Debug, Default)]
pub struct HandshakeMonitor {
    /// Payloads offered but not accepted last cycle.
    stalled: HashMap<(InstanceId, ChannelId), SimValue>,
    violations: Vec<Violation>,
}

impl HandshakeMonitor {
    /// Creates a monitor with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one channel's handshake for `cycle`. `data` is only looked at
    /// while `valid` is high.
    pub fn observe(
        &mut self,
        cycle: u64,
        key: (InstanceId, ChannelId),
        path: &str,
        valid: bool,
        ready: bool,
        data: Option<&SimValue>,
    ) {
        if let Some(held) = self.stalled.remove(&key) {
            let kind = match data {
                _ if !valid => Some(ViolationKind::ValidDropped),
                Some(now) if *now != held => Some(ViolationKind::DataChanged),
                _ => None,
            };
            if let Some(kind) = kind {
                let violation = Violation {
                    cycle,
                    path: path.to_string(),
                    channel: key.1.as_raw(),
                    kind,
                };
                tracing::warn!(%violation, "handshake violation");
                self.violations.push(violation);
            }
        }
        if valid && !ready {
            if let Some(data) = data {
                self.stalled.insert(key, data.clone());
            }
        }
    }

    /// Returns every violation recorded so far.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> (InstanceId, ChannelId) {
        (InstanceId::from_raw(1), ChannelId::from_raw(3))
    }

    #[test]
    fn stable_stall_is_fine() {
        let mut m = HandshakeMonitor::new();
        let v = SimValue::Bits(7);
        m.observe(0, key(), "Top.w", true, false, Some(&v));
        m.observe(1, key(), "Top.w", true, false, Some(&v));
        m.observe(2, key(), "Top.w", true, true, Some(&v));
        m.observe(3, key(), "Top.w", false, false, None);
        assert!(m.violations().is_empty());
    }

    #[test]
    fn dropped_valid_is_recorded() {
        let mut m = HandshakeMonitor::new();
        m.observe(4, key(), "Top.w", true, false, Some(&SimValue::Bits(1)));
        m.observe(5, key(), "Top.w", false, false, None);
        assert_eq!(m.violations().len(), 1);
        let v = &m.violations()[0];
        assert_eq!(v.kind, ViolationKind::ValidDropped);
        assert_eq!(v.cycle, 5);
        assert_eq!(v.to_string(), "cycle 5: Top.w channel #3: valid dropped before ready");
    }

    #[test]
    fn changed_payload_is_recorded() {
        let mut m = HandshakeMonitor::new();
        m.observe(0, key(), "Top.w", true, false, Some(&SimValue::Bits(1)));
        m.observe(1, key(), "Top.w", true, true, Some(&SimValue::Bits(2)));
        assert_eq!(m.violations()[0].kind, ViolationKind::DataChanged);
    }
}
