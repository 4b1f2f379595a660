//! Topology Runner: the out-of-scope external collaborators (Mininet
//! launcher, traffic generator), modeled as a thin trait seam so the
//! Control API never shells out to them directly.
//!
//! Grounded in the original Python implementation's
//! `subprocess.Popen(["sudo", "python3", "ryu_scenario/run_scenario.py"])`
//! and `traffic_gen.py` invocation, and in this codebase's adapter-trait
//! convention (one trait, one production adapter, one no-op/fake for
//! tests).

use std::process::{Child, Command, Stdio};
use std::sync::Mutex;

pub trait TopologyRunner: Send + Sync {
    fn start(&self) -> Result<(), String>;
    fn stop(&self) -> Result<(), String>;
    fn generate_traffic(&self, pps: u32, seconds: u32) -> Result<(), String>;
}

/// No-op adapter for environments without a Mininet installation; every
/// call succeeds immediately.
pub struct NullTopologyRunner;

impl TopologyRunner for NullTopologyRunner {
    fn start(&self) -> Result<(), String> {
        log::info!("topology runner disabled; /init_mininet is a no-op");
        Ok(())
    }

    fn stop(&self) -> Result<(), String> {
        Ok(())
    }

    fn generate_traffic(&self, _pps: u32, _seconds: u32) -> Result<(), String> {
        Ok(())
    }
}

/// Production adapter: shells out to configured scripts, matching
/// the original Python implementation's scenario launcher.
pub struct ProcessTopologyRunner {
    init_script: String,
    traffic_gen_script: String,
    child: Mutex<Option<Child>>,
}

impl ProcessTopologyRunner {
    pub fn new(init_script: impl Into<String>, traffic_gen_script: impl Into<String>) -> ProcessTopologyRunner {
        ProcessTopologyRunner {
            init_script: init_script.into(),
            traffic_gen_script: traffic_gen_script.into(),
            child: Mutex::new(None),
        }
    }
}

impl TopologyRunner for ProcessTopologyRunner {
    fn start(&self) -> Result<(), String> {
        let mut slot = self.child.lock().unwrap();
        if slot.is_some() {
            return Ok(());
        }
        let child = Command::new(&self.init_script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| format!("failed to launch topology: {}", e))?;
        *slot = Some(child);
        log::info!("topology runner started ({})", self.init_script);
        Ok(())
    }

    fn stop(&self) -> Result<(), String> {
        let mut slot = self.child.lock().unwrap();
        if let Some(mut child) = slot.take() {
            let _ = child.kill();
            let _ = child.wait();
            log::info!("topology runner stopped");
        }
        Ok(())
    }

    fn generate_traffic(&self, pps: u32, seconds: u32) -> Result<(), String> {
        Command::new(&self.traffic_gen_script)
            .arg(pps.to_string())
            .arg(seconds.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|e| format!("failed to launch traffic generator: {}", e))
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_double {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub struct FakeTopologyRunner {
        pub start_calls: AtomicUsize,
        pub stop_calls: AtomicUsize,
        pub traffic_calls: Mutex<Vec<(u32, u32)>>,
    }

    impl FakeTopologyRunner {
        pub fn new() -> FakeTopologyRunner {
            FakeTopologyRunner::default()
        }
    }

    impl TopologyRunner for FakeTopologyRunner {
        fn start(&self) -> Result<(), String> {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&self) -> Result<(), String> {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn generate_traffic(&self, pps: u32, seconds: u32) -> Result<(), String> {
            self.traffic_calls.lock().unwrap().push((pps, seconds));
            Ok(())
        }
    }
}
