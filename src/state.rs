//! The single coarse-grained lock guarding membership, instance records,
//! previous metric samples, and decision state. Critical sections here
//! are kept small — membership read/write, rate-table swap — with all
//! I/O performed outside the lock.

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use crate::model::{ControllerId, DecisionState, Instance, MetricSample};

pub struct SupervisorState {
    pub members: BTreeSet<ControllerId>,
    pub instances: HashMap<ControllerId, Instance>,
    pub previous_samples: HashMap<ControllerId, MetricSample>,
    pub decision: DecisionState,
    pub current_rates: HashMap<ControllerId, f64>,
    pub current_avg_load: f64,
}

impl SupervisorState {
    pub fn new(now: Instant) -> SupervisorState {
        SupervisorState {
            members: BTreeSet::new(),
            instances: HashMap::new(),
            previous_samples: HashMap::new(),
            decision: DecisionState::new(now),
            current_rates: HashMap::new(),
            current_avg_load: 0.0,
        }
    }
}
