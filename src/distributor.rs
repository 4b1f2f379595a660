//! Authority Distributor : round-robin mastership with a
//! monotonic generation counter.
//!
//! Grounded in the original Python implementation's `distribute_switches` (round-robin by
//! sorted-index, one `CURRENT_GEN_ID` increment per round, a role POST to
//! every active controller for every switch).

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::controller_client::ControllerClient;
use crate::dataplane::DataPlaneClient;
use crate::metrics::Metrics;
use crate::model::{ControllerId, Role, SwitchId};

pub struct Distributor {
    generation: AtomicU64,
    dataplane: Arc<dyn DataPlaneClient>,
    controllers: Arc<dyn ControllerClient>,
    metrics: Arc<Metrics>,
}

impl Distributor {
    pub fn new(
        dataplane: Arc<dyn DataPlaneClient>,
        controllers: Arc<dyn ControllerClient>,
        metrics: Arc<Metrics>,
    ) -> Distributor {
        Distributor {
            generation: AtomicU64::new(0),
            dataplane,
            controllers,
            metrics,
        }
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Recomputes the round-robin master assignment and reissues role
    /// messages to every live controller for every switch. Returns the
    /// generation id used, or `None` if either set was empty (no-op, per
    /// step 2).
    pub async fn distribute(&self, members: &BTreeSet<ControllerId>) -> Option<u64> {
        let switches: BTreeSet<SwitchId> = self.dataplane.list_switches().into_iter().collect();

        if members.is_empty() || switches.is_empty() {
            return None;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let members: Vec<ControllerId> = members.iter().copied().collect();

        log::info!(
            "redistributing {} switches among {} controllers (generation {})",
            switches.len(),
            members.len(),
            generation
        );

        for (idx, switch) in switches.into_iter().enumerate() {
            let master = members[idx % members.len()];
            for &controller in &members {
                let role = if controller == master { Role::Master } else { Role::Slave };
                if self
                    .controllers
                    .post_role(controller, switch, role, generation)
                    .await
                    .is_err()
                {
                    self.metrics.role_post_failures_total.clone().incr(1);
                }
            }
        }

        self.metrics.distribute_total.clone().incr(1);
        Some(generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller_client::test_double::FakeControllerClient;
    use crate::dataplane::test_double::FakeDataPlane;

    fn set(ids: &[u32]) -> BTreeSet<ControllerId> {
        ids.iter().map(|&i| ControllerId(i)).collect()
    }

    #[tokio::test]
    async fn empty_switches_leaves_generation_unchanged() {
        let dp = Arc::new(FakeDataPlane::with_switches(&[]));
        let cc = Arc::new(FakeControllerClient::new());
        let dist = Distributor::new(dp, cc, Arc::new(Metrics::new()));

        assert_eq!(dist.distribute(&set(&[0, 1])).await, None);
        assert_eq!(dist.current_generation(), 0);
    }

    #[tokio::test]
    async fn empty_members_leaves_generation_unchanged() {
        let dp = Arc::new(FakeDataPlane::with_switches(&[1, 2, 3]));
        let cc = Arc::new(FakeControllerClient::new());
        let dist = Distributor::new(dp, cc, Arc::new(Metrics::new()));

        assert_eq!(dist.distribute(&BTreeSet::new()).await, None);
    }

    #[tokio::test]
    async fn round_robin_three_controllers_six_switches() {
        let dp = Arc::new(FakeDataPlane::with_switches(&[1, 2, 3, 4, 5, 6]));
        let cc = Arc::new(FakeControllerClient::new());
        let dist = Distributor::new(dp, cc.clone(), Arc::new(Metrics::new()));

        let gen = dist.distribute(&set(&[0, 1, 2])).await.unwrap();
        assert_eq!(gen, 1);

        let roles = cc.roles.lock().unwrap();
        let masters: Vec<(u64, u32)> = roles
            .iter()
            .filter(|(_, _, role, _)| *role == Role::Master)
            .map(|(c, s, _, _)| (s.0, c.0))
            .collect();
        let mut masters = masters;
        masters.sort();
        assert_eq!(
            masters,
            vec![(1, 0), (2, 1), (3, 2), (4, 0), (5, 1), (6, 2)]
        );

        // Every controller got a role for every switch: 3 controllers * 6 switches.
        assert_eq!(roles.len(), 18);
    }

    #[tokio::test]
    async fn generation_strictly_increases_across_rounds() {
        let dp = Arc::new(FakeDataPlane::with_switches(&[1, 2]));
        let cc = Arc::new(FakeControllerClient::new());
        let dist = Distributor::new(dp, cc, Arc::new(Metrics::new()));

        let g1 = dist.distribute(&set(&[0, 1])).await.unwrap();
        let g2 = dist.distribute(&set(&[0, 1])).await.unwrap();
        assert!(g2 > g1);
    }

    #[tokio::test]
    async fn deterministic_assignment_modulo_generation() {
        let dp = Arc::new(FakeDataPlane::with_switches(&[10, 20, 30]));
        let cc = Arc::new(FakeControllerClient::new());
        let dist = Distributor::new(dp, cc.clone(), Arc::new(Metrics::new()));

        dist.distribute(&set(&[0, 1])).await;
        let first_masters: Vec<_> = cc
            .roles
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, _, r, _)| *r == Role::Master)
            .map(|(c, s, _, _)| (s.0, c.0))
            .collect();
        cc.roles.lock().unwrap().clear();

        dist.distribute(&set(&[0, 1])).await;
        let second_masters: Vec<_> = cc
            .roles
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, _, r, _)| *r == Role::Master)
            .map(|(c, s, _, _)| (s.0, c.0))
            .collect();

        assert_eq!(first_masters, second_masters);
    }

    #[tokio::test]
    async fn victim_receives_no_master_when_excluded() {
        let dp = Arc::new(FakeDataPlane::with_switches(&[1, 2, 3]));
        let cc = Arc::new(FakeControllerClient::new());
        let dist = Distributor::new(dp, cc.clone(), Arc::new(Metrics::new()));

        // id 2 already removed from membership before this call, per
        // Supervisor::scale_down's ordering invariant.
        dist.distribute(&set(&[0, 1])).await;

        let got_role_for_2 = cc
            .roles
            .lock()
            .unwrap()
            .iter()
            .any(|(c, ..)| c.0 == 2);
        assert!(!got_role_for_2);
    }
}
