//! Data-Plane Manager Client: enumerates live switches and rewires
//! their controller attachments via an OVS-compatible CLI.
//!
//! Grounded in the original Python implementation's
//! `get_all_switches`/`update_ovs_connections`, redesigned to issue
//! discrete argument-vector subprocess calls instead of
//! shell-concatenated commands.

use std::process::Command;
use std::time::Duration;

use crate::model::SwitchId;

const OVS_TIMEOUT: Duration = Duration::from_secs(5);

pub trait DataPlaneClient: Send + Sync {
    /// Returns the current switch set. Never raises: an unreachable data
    /// plane yields an empty list.
    fn list_switches(&self) -> Vec<SwitchId>;

    /// Attaches every switch to the union of `targets`. An empty `targets`
    /// detaches every switch from any controller.
    fn rewire(&self, targets: &[(String, u16)]);
}

/// Production adapter around the `ovs-vsctl` CLI.
pub struct OvsClient {
    timeout: Duration,
}

impl OvsClient {
    pub fn new() -> OvsClient {
        OvsClient { timeout: OVS_TIMEOUT }
    }

    fn run(&self, args: &[&str]) -> bool {
        let timeout_secs = self.timeout.as_secs().to_string();
        let mut cmd = Command::new("ovs-vsctl");
        cmd.arg(format!("--timeout={}", timeout_secs));
        cmd.args(args);
        match cmd.output() {
            Ok(out) if out.status.success() => true,
            Ok(out) => {
                log::warn!(
                    "ovs-vsctl {:?} failed: {}",
                    args,
                    String::from_utf8_lossy(&out.stderr)
                );
                false
            }
            Err(e) => {
                log::warn!("ovs-vsctl {:?} could not run: {}", args, e);
                false
            }
        }
    }

    fn bridges(&self) -> Vec<String> {
        let timeout_secs = self.timeout.as_secs().to_string();
        let out = Command::new("ovs-vsctl")
            .arg(format!("--timeout={}", timeout_secs))
            .arg("list-br")
            .output();
        match out {
            Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
                .lines()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect(),
            Ok(out) => {
                log::warn!("ovs-vsctl list-br failed: {}", String::from_utf8_lossy(&out.stderr));
                Vec::new()
            }
            Err(e) => {
                log::warn!("ovs-vsctl list-br could not run: {}", e);
                Vec::new()
            }
        }
    }
}

impl Default for OvsClient {
    fn default() -> OvsClient {
        OvsClient::new()
    }
}

/// Converts an OVS bridge name like `s3` to its numeric datapath id.
fn bridge_to_dpid(name: &str) -> Option<SwitchId> {
    name.strip_prefix('s')?.parse::<u64>().ok().map(SwitchId)
}

impl DataPlaneClient for OvsClient {
    fn list_switches(&self) -> Vec<SwitchId> {
        self.bridges()
            .iter()
            .filter_map(|name| bridge_to_dpid(name))
            .collect()
    }

    fn rewire(&self, targets: &[(String, u16)]) {
        let bridges = self.bridges();
        if bridges.is_empty() {
            return;
        }

        let target_strs: Vec<String> = targets
            .iter()
            .map(|(host, port)| format!("tcp:{}:{}", host, port))
            .collect();

        for sw in &bridges {
            self.run(&["set", "bridge", sw, "protocols=OpenFlow13"]);
            if target_strs.is_empty() {
                self.run(&["del-controller", sw]);
            } else {
                let mut args: Vec<&str> = vec!["set-controller", sw];
                args.extend(target_strs.iter().map(|s| s.as_str()));
                self.run(&args);
            }
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_double {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeDataPlane {
        pub switches: Mutex<Vec<SwitchId>>,
        pub last_rewire: Mutex<Option<Vec<(String, u16)>>>,
        pub rewire_calls: Mutex<usize>,
    }

    impl FakeDataPlane {
        pub fn with_switches(ids: &[u64]) -> FakeDataPlane {
            FakeDataPlane {
                switches: Mutex::new(ids.iter().map(|&i| SwitchId(i)).collect()),
                last_rewire: Mutex::new(None),
                rewire_calls: Mutex::new(0),
            }
        }
    }

    impl DataPlaneClient for FakeDataPlane {
        fn list_switches(&self) -> Vec<SwitchId> {
            self.switches.lock().unwrap().clone()
        }

        fn rewire(&self, targets: &[(String, u16)]) {
            *self.last_rewire.lock().unwrap() = Some(targets.to_vec());
            *self.rewire_calls.lock().unwrap() += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dpid_parses_leading_s() {
        assert_eq!(bridge_to_dpid("s12"), Some(SwitchId(12)));
        assert_eq!(bridge_to_dpid("br0"), None);
    }
}
