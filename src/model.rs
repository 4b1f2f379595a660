//! Core data model shared by the supervisor, distributor, and autoscaler.
//!
//! Membership is a sorted set of small integer ids, never recycled
//! within a supervisor lifetime unless a slot is explicitly cleared by
//! a scale-down or failover.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;

/// Unique, non-negative identifier for a controller instance.
///
/// Allocated as `max(existing) + 1`, or `0` when the membership set is
/// empty. Never recycled implicitly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ControllerId(pub u32);

impl ControllerId {
    pub fn next(members: &BTreeSet<ControllerId>) -> ControllerId {
        match members.iter().next_back() {
            Some(ControllerId(max)) => ControllerId(max + 1),
            None => ControllerId(0),
        }
    }

    /// Process/container name this id is addressed by, e.g. `sdn-ctrl-3`.
    pub fn instance_name(self) -> String {
        format!("sdn-ctrl-{}", self.0)
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque data-plane datapath identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwitchId(pub u64);

impl fmt::Display for SwitchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// OpenFlow asynchronous role assigned to a (switch, controller) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Master => "MASTER",
            Role::Slave => "SLAVE",
        }
    }
}

/// A live controller instance record.
///
/// Invariant: no two live instances share an id or a port (enforced by
/// `ControllerId` allocation plus the base-port offsets below).
#[derive(Clone, Debug)]
pub struct Instance {
    pub id: ControllerId,
    pub ofp_port: u16,
    pub api_port: u16,
    pub started_at: Instant,
}

impl Instance {
    pub fn new(id: ControllerId, base_ofp: u16, base_api: u16) -> Instance {
        Instance {
            id,
            ofp_port: base_ofp + id.0 as u16,
            api_port: base_api + id.0 as u16,
            started_at: Instant::now(),
        }
    }
}

/// The previous packet-in sample retained for a controller, used to
/// compute a rate on the next poll.
#[derive(Clone, Copy, Debug)]
pub struct MetricSample {
    pub at: Instant,
    pub cumulative_count: u64,
}

/// Mutable decision-making state owned by the autoscaler.
#[derive(Clone, Copy, Debug)]
pub struct DecisionState {
    pub last_scale_at: Instant,
    pub is_scaling: bool,
    pub auto_mode: bool,
    pub monitoring_enabled: bool,
}

impl DecisionState {
    pub fn new(now: Instant) -> DecisionState {
        DecisionState {
            last_scale_at: now,
            is_scaling: false,
            auto_mode: false,
            monitoring_enabled: false,
        }
    }
}
