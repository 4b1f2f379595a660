//! Cluster Supervisor: lifecycle of controller instances and the
//! membership set.
//!
//! Grounded in the original Python implementation's
//! `scale_up`/`scale_down`/`_handle_failover`, redesigned so the warmup
//! sleep lives on a spawned scaling worker rather than blocking the
//! decision path — mirroring the separation of one-shot connect futures
//! from the driven reactor loop seen elsewhere in this codebase's
//! connection-pool managers.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;

use crate::config::SupervisorConfig;
use crate::dataplane::DataPlaneClient;
use crate::distributor::Distributor;
use crate::driver::InstanceDriver;
use crate::metrics::Metrics;
use crate::model::{ControllerId, Instance};
use crate::state::SupervisorState;

pub struct Supervisor {
    state: Arc<Mutex<SupervisorState>>,
    driver: Arc<dyn InstanceDriver>,
    dataplane: Arc<dyn DataPlaneClient>,
    distributor: Arc<Distributor>,
    metrics: Arc<Metrics>,
    config: SupervisorConfig,
    /// Set once the base cluster has completed at least one scale-up;
    /// governs whether `scale_up` uses the cold-start or steady-state
    /// warmup duration.
    cold_started: std::sync::atomic::AtomicBool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleUpOutcome {
    Started(ControllerId),
    AtMax,
    LaunchFailed,
    AlreadyScaling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDownOutcome {
    Stopped(ControllerId),
    AtMin,
    AlreadyScaling,
}

/// Clears `isScaling` on every exit path of a scaling operation, including
/// early returns and panics, so a failed launch or rejected bound can never
/// wedge the autoscaler in `SkippedScaling` forever.
struct ScalingGuard<'s> {
    state: &'s Mutex<SupervisorState>,
}

impl Drop for ScalingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.decision.is_scaling = false;
        state.decision.last_scale_at = Instant::now();
    }
}

impl Supervisor {
    pub fn new(
        state: Arc<Mutex<SupervisorState>>,
        driver: Arc<dyn InstanceDriver>,
        dataplane: Arc<dyn DataPlaneClient>,
        distributor: Arc<Distributor>,
        metrics: Arc<Metrics>,
        config: SupervisorConfig,
    ) -> Supervisor {
        Supervisor {
            state,
            driver,
            dataplane,
            distributor,
            metrics,
            config,
            cold_started: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn member_count(&self) -> usize {
        self.state.lock().unwrap().members.len()
    }

    pub fn members(&self) -> Vec<ControllerId> {
        self.state.lock().unwrap().members.iter().copied().collect()
    }

    fn endpoints(&self) -> Vec<(String, u16)> {
        let state = self.state.lock().unwrap();
        state
            .members
            .iter()
            .filter_map(|id| state.instances.get(id))
            .map(|inst| (self.config.controller_host.clone(), inst.ofp_port))
            .collect()
    }

    /// Atomically tests-and-sets `isScaling`, under the same lock used to
    /// read it, so two racing callers (the autoscaler tick and a manual
    /// `/scale_up`/`/scale_down`, or two manual calls) can never both
    /// proceed. Returns `None` if a scaling operation is already in
    /// flight.
    fn begin_scaling(&self) -> Option<ScalingGuard<'_>> {
        let mut state = self.state.lock().unwrap();
        if state.decision.is_scaling {
            None
        } else {
            state.decision.is_scaling = true;
            state.decision.last_scale_at = Instant::now();
            Some(ScalingGuard { state: &self.state })
        }
    }

    /// `scaleUp`.
    pub async fn scale_up(&self) -> ScaleUpOutcome {
        let _guard = match self.begin_scaling() {
            Some(guard) => guard,
            None => {
                log::debug!("scale_up: a scaling operation is already in flight, skipping");
                return ScaleUpOutcome::AlreadyScaling;
            }
        };

        let new_id = {
            let state = self.state.lock().unwrap();
            if state.members.len() as u32 >= self.config.max_controllers {
                log::warn!("MAX_CONTROLLERS reached, cannot scale up");
                return ScaleUpOutcome::AtMax;
            }
            ControllerId::next(&state.members)
        };

        let instance = Instance::new(new_id, self.config.base_ofp_port, self.config.base_api_port);
        if let Err(e) = self.driver.start(new_id, instance.ofp_port, instance.api_port) {
            log::error!("scale_up: launch failed: {}", e);
            return ScaleUpOutcome::LaunchFailed;
        }

        {
            let mut state = self.state.lock().unwrap();
            state.members.insert(new_id);
            state.instances.insert(new_id, instance);
        }

        self.dataplane.rewire(&self.endpoints());

        let warmup = if self.cold_started.swap(true, Ordering::SeqCst) {
            self.config.warmup()
        } else {
            self.config.cold_warmup()
        };
        log::debug!("waiting warmup time ({:?}) for instance {}", warmup, new_id);
        tokio::time::sleep(warmup).await;

        let members = self.members_set();
        self.distributor.distribute(&members).await;

        self.metrics.scale_up_total.clone().incr(1);
        log::info!("new controller {} ready", new_id);
        ScaleUpOutcome::Started(new_id)
    }

    /// `scaleDown`.
    pub async fn scale_down(&self) -> ScaleDownOutcome {
        let _guard = match self.begin_scaling() {
            Some(guard) => guard,
            None => {
                log::debug!("scale_down: a scaling operation is already in flight, skipping");
                return ScaleDownOutcome::AlreadyScaling;
            }
        };

        let victim = {
            let state = self.state.lock().unwrap();
            if state.members.len() as u32 <= self.config.min_controllers {
                log::warn!("MIN_CONTROLLERS reached, cannot scale down");
                return ScaleDownOutcome::AtMin;
            }
            *state.members.iter().next_back().expect("non-empty by the check above")
        };

        // Remove from membership *before* redistributing, so the victim
        // receives no new ownership.
        {
            let mut state = self.state.lock().unwrap();
            state.members.remove(&victim);
        }

        let members = self.members_set();
        self.distributor.distribute(&members).await;

        tokio::time::sleep(std::time::Duration::from_secs(1)).await;

        if let Err(e) = self.driver.stop(victim) {
            log::error!("scale_down: stop failed for {}: {}", victim, e);
        }

        {
            let mut state = self.state.lock().unwrap();
            state.instances.remove(&victim);
            state.previous_samples.remove(&victim);
        }

        self.metrics.scale_down_total.clone().incr(1);
        log::info!("controller {} removed", victim);
        ScaleDownOutcome::Stopped(victim)
    }

    /// `handleFailover`.
    pub async fn handle_failover(&self, dead: &[ControllerId]) {
        if dead.is_empty() {
            return;
        }

        {
            let mut state = self.state.lock().unwrap();
            for id in dead {
                state.members.remove(id);
                state.previous_samples.remove(id);
                state.instances.remove(id);
            }
        }

        self.dataplane.rewire(&self.endpoints());
        let members = self.members_set();
        self.distributor.distribute(&members).await;

        let mut state = self.state.lock().unwrap();
        state.decision.last_scale_at = Instant::now();
        drop(state);
        self.metrics.failover_total.clone().incr(1);
        log::warn!("failover: removed {:?}", dead);
    }

    /// Stops every live instance and clears membership. Used by
    /// `/stop_mininet` and process shutdown; best-effort, logging
    /// individual instance-stop failures rather than aborting.
    pub fn shutdown(&self) {
        let members: Vec<ControllerId> = {
            let mut state = self.state.lock().unwrap();
            let members: Vec<ControllerId> = state.members.iter().copied().collect();
            state.members.clear();
            state.instances.clear();
            state.decision.monitoring_enabled = false;
            members
        };
        for id in members {
            if let Err(e) = self.driver.stop(id) {
                log::warn!("shutdown: failed to stop {}: {}", id, e);
            }
        }
    }

    fn members_set(&self) -> std::collections::BTreeSet<ControllerId> {
        self.state.lock().unwrap().members.clone()
    }

    pub fn is_scaling(&self) -> bool {
        self.state.lock().unwrap().decision.is_scaling
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller_client::test_double::FakeControllerClient;
    use crate::dataplane::test_double::FakeDataPlane;
    use crate::driver::test_double::FakeDriver;

    fn mk_supervisor(
        max: u32,
        min: u32,
        switches: &[u64],
    ) -> (Supervisor, Arc<FakeDriver>, Arc<FakeDataPlane>) {
        let mut cfg = SupervisorConfig::default();
        cfg.max_controllers = max;
        cfg.min_controllers = min;
        let driver = Arc::new(FakeDriver::new());
        let dp = Arc::new(FakeDataPlane::with_switches(switches));
        let cc = Arc::new(FakeControllerClient::new());
        let metrics = Arc::new(Metrics::new());
        let dist = Arc::new(Distributor::new(dp.clone(), cc, metrics.clone()));
        let state = Arc::new(Mutex::new(SupervisorState::new(Instant::now())));
        let sup = Supervisor::new(state, driver.clone(), dp.clone(), dist, metrics, cfg);
        (sup, driver, dp)
    }

    #[tokio::test]
    async fn cold_start_single_scale_up() {
        let (sup, driver, dp) = mk_supervisor(5, 2, &[1]);
        let outcome = sup.scale_up().await;
        assert_eq!(outcome, ScaleUpOutcome::Started(ControllerId(0)));
        assert_eq!(sup.member_count(), 1);
        assert!(driver.exists(ControllerId(0)));
        assert_eq!(*dp.rewire_calls.lock().unwrap(), 1);
        let targets = dp.last_rewire.lock().unwrap().clone().unwrap();
        assert_eq!(targets, vec![("127.0.0.1".to_string(), 6653)]);
    }

    #[tokio::test]
    async fn scale_up_at_max_is_noop() {
        let (sup, _driver, _dp) = mk_supervisor(1, 1, &[1]);
        sup.scale_up().await;
        assert_eq!(sup.scale_up().await, ScaleUpOutcome::AtMax);
        assert_eq!(sup.member_count(), 1);
    }

    #[tokio::test]
    async fn scale_down_at_min_is_noop() {
        let (sup, _driver, _dp) = mk_supervisor(5, 2, &[1]);
        sup.scale_up().await;
        sup.scale_up().await;
        assert_eq!(sup.scale_down().await, ScaleDownOutcome::Stopped(ControllerId(1)));
        assert_eq!(sup.scale_down().await, ScaleDownOutcome::AtMin);
        assert_eq!(sup.member_count(), 2);
    }

    #[tokio::test]
    async fn scale_down_picks_highest_id() {
        let (sup, driver, _dp) = mk_supervisor(5, 1, &[1, 2]);
        sup.scale_up().await;
        sup.scale_up().await;
        sup.scale_up().await;
        let out = sup.scale_down().await;
        assert_eq!(out, ScaleDownOutcome::Stopped(ControllerId(2)));
        assert!(!driver.exists(ControllerId(2)));
        assert!(driver.exists(ControllerId(0)));
        assert!(driver.exists(ControllerId(1)));
    }

    #[tokio::test]
    async fn failover_removes_membership_and_redistributes() {
        let (sup, driver, dp) = mk_supervisor(5, 1, &[1, 2, 3]);
        sup.scale_up().await;
        sup.scale_up().await;
        sup.scale_up().await;
        sup.handle_failover(&[ControllerId(1)]).await;
        assert_eq!(sup.members(), vec![ControllerId(0), ControllerId(2)]);
        assert!(*dp.rewire_calls.lock().unwrap() >= 2);
    }

    #[tokio::test]
    async fn shutdown_stops_all_and_clears_membership() {
        let (sup, driver, _dp) = mk_supervisor(5, 1, &[1]);
        sup.scale_up().await;
        sup.scale_up().await;
        sup.shutdown();
        assert_eq!(sup.member_count(), 0);
        assert!(!driver.exists(ControllerId(0)));
        assert!(!driver.exists(ControllerId(1)));
    }

    #[tokio::test]
    async fn failed_launch_does_not_mutate_membership() {
        let (sup, driver, _dp) = mk_supervisor(5, 1, &[1]);
        driver.fail_start_for.lock().unwrap().insert(ControllerId(0));
        let out = sup.scale_up().await;
        assert_eq!(out, ScaleUpOutcome::LaunchFailed);
        assert_eq!(sup.member_count(), 0);
    }

    #[tokio::test]
    async fn failed_launch_clears_is_scaling_for_the_next_attempt() {
        let (sup, driver, _dp) = mk_supervisor(5, 1, &[1]);
        driver.fail_start_for.lock().unwrap().insert(ControllerId(0));
        assert_eq!(sup.scale_up().await, ScaleUpOutcome::LaunchFailed);
        assert!(!sup.is_scaling());

        driver.fail_start_for.lock().unwrap().clear();
        assert_eq!(sup.scale_up().await, ScaleUpOutcome::Started(ControllerId(0)));
    }

    #[tokio::test]
    async fn at_max_outcome_clears_is_scaling() {
        let (sup, _driver, _dp) = mk_supervisor(1, 1, &[1]);
        sup.scale_up().await;
        assert_eq!(sup.scale_up().await, ScaleUpOutcome::AtMax);
        assert!(!sup.is_scaling());
    }

    #[tokio::test]
    async fn concurrent_scale_up_calls_produce_only_one_new_instance() {
        let (sup, driver, _dp) = mk_supervisor(5, 1, &[1]);
        let (a, b) = tokio::join!(sup.scale_up(), sup.scale_up());
        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|o| matches!(o, ScaleUpOutcome::Started(_))).count(), 1);
        assert_eq!(outcomes.iter().filter(|o| **o == ScaleUpOutcome::AlreadyScaling).count(), 1);
        assert_eq!(sup.member_count(), 1);
        assert_eq!(driver.running.lock().unwrap().len(), 1);
    }
}
