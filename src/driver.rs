//! Instance Driver : the only component allowed to create
//! OS-level resources (processes, sockets) for a controller instance.

use std::io;
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;

use crate::error::SupervisorError;
use crate::model::ControllerId;

pub trait InstanceDriver: Send + Sync {
    /// Starts a fresh instance for `id`, parameterized with its OpenFlow
    /// and API listen ports. If a prior instance with the same name
    /// exists it is force-removed first. On failure, no instance record
    /// is left behind.
    fn start(&self, id: ControllerId, ofp_port: u16, api_port: u16) -> Result<(), SupervisorError>;

    /// Gracefully stops and removes the instance. Idempotent: stopping a
    /// missing instance returns success.
    fn stop(&self, id: ControllerId) -> Result<(), SupervisorError>;

    /// Probes whether an instance with this id is currently running.
    fn exists(&self, id: ControllerId) -> bool;
}

/// Production adapter: one OS process per controller instance, launched
/// with `--observe-links` (LLDP topology discovery) enabled, matching
/// the original Python implementation's `ryu-manager ... --observe-links` invocation.
pub struct ProcessDriver {
    controller_binary: String,
    controller_script: String,
    handles: Mutex<std::collections::HashMap<ControllerId, Child>>,
}

impl ProcessDriver {
    pub fn new(controller_binary: impl Into<String>, controller_script: impl Into<String>) -> ProcessDriver {
        ProcessDriver {
            controller_binary: controller_binary.into(),
            controller_script: controller_script.into(),
            handles: Mutex::new(std::collections::HashMap::new()),
        }
    }

    fn kill_if_running(&self, id: ControllerId) {
        let mut handles = self.handles.lock().unwrap();
        if let Some(mut child) = handles.remove(&id) {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl InstanceDriver for ProcessDriver {
    fn start(&self, id: ControllerId, ofp_port: u16, api_port: u16) -> Result<(), SupervisorError> {
        self.kill_if_running(id);

        let name = id.instance_name();
        let child = Command::new(&self.controller_binary)
            .arg(&self.controller_script)
            .arg("--ofp-tcp-listen-port")
            .arg(ofp_port.to_string())
            .arg("--wsapi-port")
            .arg(api_port.to_string())
            .arg("--observe-links")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|cause| SupervisorError::Launch { name: name.clone(), cause })?;

        self.handles.lock().unwrap().insert(id, child);
        log::info!("started instance {} (ofp={} api={})", name, ofp_port, api_port);
        Ok(())
    }

    fn stop(&self, id: ControllerId) -> Result<(), SupervisorError> {
        let name = id.instance_name();
        let mut handles = self.handles.lock().unwrap();
        match handles.remove(&id) {
            None => Ok(()),
            Some(mut child) => {
                // InvalidInput here just means the process had already exited.
                if let Err(cause) = child.kill() {
                    if cause.kind() != io::ErrorKind::InvalidInput {
                        return Err(SupervisorError::Driver { name, cause });
                    }
                }
                child.wait().map_err(|cause| SupervisorError::Driver { name: name.clone(), cause })?;
                log::info!("stopped instance {}", name);
                Ok(())
            }
        }
    }

    fn exists(&self, id: ControllerId) -> bool {
        let mut handles = self.handles.lock().unwrap();
        match handles.get_mut(&id) {
            None => false,
            Some(child) => matches!(child.try_wait(), Ok(None)),
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_double {
    use super::*;
    use std::collections::HashSet;

    /// In-memory stand-in used by supervisor/distributor/autoscaler tests.
    pub struct FakeDriver {
        pub running: Mutex<HashSet<ControllerId>>,
        pub fail_start_for: Mutex<HashSet<ControllerId>>,
        pub fail_stop_for: Mutex<HashSet<ControllerId>>,
    }

    impl FakeDriver {
        pub fn new() -> FakeDriver {
            FakeDriver {
                running: Mutex::new(HashSet::new()),
                fail_start_for: Mutex::new(HashSet::new()),
                fail_stop_for: Mutex::new(HashSet::new()),
            }
        }
    }

    impl InstanceDriver for FakeDriver {
        fn start(&self, id: ControllerId, _ofp_port: u16, _api_port: u16) -> Result<(), SupervisorError> {
            if self.fail_start_for.lock().unwrap().contains(&id) {
                return Err(SupervisorError::Launch {
                    name: id.instance_name(),
                    cause: io::Error::new(io::ErrorKind::Other, "forced failure"),
                });
            }
            self.running.lock().unwrap().insert(id);
            Ok(())
        }

        fn stop(&self, id: ControllerId) -> Result<(), SupervisorError> {
            if self.fail_stop_for.lock().unwrap().contains(&id) {
                return Err(SupervisorError::Driver {
                    name: id.instance_name(),
                    cause: io::Error::new(io::ErrorKind::Other, "forced failure"),
                });
            }
            self.running.lock().unwrap().remove(&id);
            Ok(())
        }

        fn exists(&self, id: ControllerId) -> bool {
            self.running.lock().unwrap().contains(&id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_double::FakeDriver;
    use super::*;

    #[test]
    fn start_then_exists() {
        let d = FakeDriver::new();
        d.start(ControllerId(0), 6653, 8081).unwrap();
        assert!(d.exists(ControllerId(0)));
    }

    #[test]
    fn stop_is_idempotent() {
        let d = FakeDriver::new();
        assert!(d.stop(ControllerId(7)).is_ok());
        d.start(ControllerId(7), 6660, 8088).unwrap();
        assert!(d.stop(ControllerId(7)).is_ok());
        assert!(d.stop(ControllerId(7)).is_ok());
        assert!(!d.exists(ControllerId(7)));
    }

    #[test]
    fn start_failure_leaves_no_instance() {
        let d = FakeDriver::new();
        d.fail_start_for.lock().unwrap().insert(ControllerId(1));
        assert!(d.start(ControllerId(1), 6654, 8082).is_err());
        assert!(!d.exists(ControllerId(1)));
    }

    #[test]
    fn stop_failure_surfaces_driver_error() {
        let d = FakeDriver::new();
        d.start(ControllerId(2), 6655, 8083).unwrap();
        d.fail_stop_for.lock().unwrap().insert(ControllerId(2));
        match d.stop(ControllerId(2)) {
            Err(SupervisorError::Driver { name, .. }) => assert_eq!(name, ControllerId(2).instance_name()),
            other => panic!("expected Driver error, got {:?}", other),
        }
    }
}
