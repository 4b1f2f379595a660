//! Typed configuration, loaded from a YAML or JSON file and layered with
//! environment-variable overrides, mirroring this codebase's
//! `app::config` (sniff `{` for JSON, otherwise YAML;
//! `deny_unknown_fields`).

use serde::{Deserialize, Serialize};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::SupervisorError;

pub fn from_str(txt: &str) -> io::Result<SupervisorConfig> {
    let txt = txt.trim_start();
    if txt.starts_with('{') {
        serde_json::from_str(txt).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    } else {
        serde_yaml::from_str(txt).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SupervisorConfig {
    #[serde(default = "defaults::base_ofp_port")]
    pub base_ofp_port: u16,
    #[serde(default = "defaults::base_api_port")]
    pub base_api_port: u16,

    #[serde(default = "defaults::min_controllers")]
    pub min_controllers: u32,
    #[serde(default = "defaults::max_controllers")]
    pub max_controllers: u32,

    #[serde(default = "defaults::target_load")]
    pub target_load_per_controller: f64,
    #[serde(default = "defaults::min_load")]
    pub min_load_per_controller: f64,

    #[serde(default = "defaults::check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "defaults::warmup_secs")]
    pub warmup_secs: u64,
    #[serde(default = "defaults::cold_warmup_secs")]
    pub cold_warmup_secs: u64,
    #[serde(default = "defaults::cooldown_secs")]
    pub cooldown_secs: u64,

    #[serde(default = "defaults::control_addr")]
    pub control_addr: SocketAddr,

    /// Host switches are told to dial controllers on; loopback in the
    /// single-host Mininet testbed this system targets.
    #[serde(default = "defaults::controller_host")]
    pub controller_host: String,

    pub topology: Option<TopologyConfig>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct TopologyConfig {
    pub init_script: String,
    pub traffic_gen_script: String,
}

mod defaults {
    use std::net::SocketAddr;

    pub fn base_ofp_port() -> u16 {
        6653
    }
    pub fn base_api_port() -> u16 {
        8081
    }
    pub fn min_controllers() -> u32 {
        2
    }
    pub fn max_controllers() -> u32 {
        5
    }
    pub fn target_load() -> f64 {
        50.0
    }
    pub fn min_load() -> f64 {
        15.0
    }
    pub fn check_interval_secs() -> u64 {
        1
    }
    pub fn warmup_secs() -> u64 {
        5
    }
    pub fn cold_warmup_secs() -> u64 {
        15
    }
    pub fn cooldown_secs() -> u64 {
        10
    }
    pub fn control_addr() -> SocketAddr {
        "0.0.0.0:5000".parse().unwrap()
    }
    pub fn controller_host() -> String {
        "127.0.0.1".to_string()
    }
}

impl Default for SupervisorConfig {
    fn default() -> SupervisorConfig {
        serde_yaml::from_str("{}").expect("empty config must parse to all defaults")
    }
}

impl SupervisorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_secs(self.warmup_secs)
    }

    pub fn cold_warmup(&self) -> Duration {
        Duration::from_secs(self.cold_warmup_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Validates the startup invariants a running cluster depends on.
    /// Fatal on failure: the process must refuse to start.
    pub fn validate(&self) -> Result<(), SupervisorError> {
        if self.min_controllers == 0 {
            return Err(SupervisorError::Config(
                "minControllers must be at least 1".into(),
            ));
        }
        if self.min_controllers > self.max_controllers {
            return Err(SupervisorError::Config(format!(
                "minControllers ({}) must be <= maxControllers ({})",
                self.min_controllers, self.max_controllers
            )));
        }
        if self.min_load_per_controller >= self.target_load_per_controller {
            return Err(SupervisorError::Config(format!(
                "minLoadPerController ({}) must be < targetLoadPerController ({})",
                self.min_load_per_controller, self.target_load_per_controller
            )));
        }
        if !(1..=5).contains(&self.check_interval_secs) {
            return Err(SupervisorError::Config(format!(
                "checkIntervalSecs ({}) must be within [1, 5]",
                self.check_interval_secs
            )));
        }
        Ok(())
    }
}
