//! Entry point: loads configuration, wires concrete adapters to the
//! library, serves the Control API, and drives the autoscaler tick loop
//! until SIGINT.

use clap::Parser;
use std::fs;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use sdn_supervisor::api::{self, ApiState};
use sdn_supervisor::autoscaler::Autoscaler;
use sdn_supervisor::config::{self, SupervisorConfig};
use sdn_supervisor::controller_client::HttpControllerClient;
use sdn_supervisor::dataplane::OvsClient;
use sdn_supervisor::distributor::Distributor;
use sdn_supervisor::driver::ProcessDriver;
use sdn_supervisor::metrics::Metrics;
use sdn_supervisor::state::SupervisorState;
use sdn_supervisor::supervisor::Supervisor;
use sdn_supervisor::topology::{NullTopologyRunner, ProcessTopologyRunner, TopologyRunner};

#[derive(Parser, Debug)]
#[command(name = "sdn-supervisord", version, about = "Elastic control-plane supervisor for an SDN testbed")]
struct Opts {
    /// Path to a YAML or JSON configuration file.
    #[arg(long, value_name = "PATH")]
    config: Option<String>,

    /// Overrides the Control API listen port from the configuration.
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,

    /// Path to the controller launcher binary (e.g. `python3`).
    #[arg(long, default_value = "python3")]
    controller_binary: String,

    /// Path to the controller launcher script (e.g. a Ryu app module).
    #[arg(long, default_value = "ryu_scenario/load_balancer/controller.py")]
    controller_script: String,
}

#[tokio::main]
async fn main() {
    sdn_supervisor::logging::init();

    let opts = Opts::parse();

    let mut config = match &opts.config {
        Some(path) => {
            let text = fs::read_to_string(path).unwrap_or_else(|e| {
                log::error!("could not read config file {}: {}", path, e);
                std::process::exit(64);
            });
            config::from_str(&text).unwrap_or_else(|e| {
                log::error!("configuration error: {}", e);
                std::process::exit(64);
            })
        }
        None => SupervisorConfig::default(),
    };

    if let Some(port) = opts.port {
        let mut addr = config.control_addr;
        addr.set_port(port);
        config.control_addr = addr;
    }

    if let Err(e) = config.validate() {
        log::error!("refusing to start: {}", e);
        std::process::exit(64);
    }

    let metrics = Arc::new(Metrics::new());
    let driver = Arc::new(ProcessDriver::new(opts.controller_binary, opts.controller_script));
    let dataplane = Arc::new(OvsClient::new());
    let controllers = Arc::new(HttpControllerClient::new(
        config.controller_host.clone(),
        config.base_api_port,
        metrics.clone(),
    ));
    let distributor = Arc::new(Distributor::new(dataplane.clone(), controllers.clone(), metrics.clone()));

    let topology: Arc<dyn TopologyRunner> = match &config.topology {
        Some(t) => Arc::new(ProcessTopologyRunner::new(t.init_script.clone(), t.traffic_gen_script.clone())),
        None => Arc::new(NullTopologyRunner),
    };

    let state = Arc::new(Mutex::new(SupervisorState::new(Instant::now())));
    let supervisor = Arc::new(Supervisor::new(
        state.clone(),
        driver,
        dataplane.clone(),
        distributor.clone(),
        metrics.clone(),
        config.clone(),
    ));
    let autoscaler = Arc::new(Autoscaler::new(
        state.clone(),
        controllers,
        supervisor.clone(),
        config.target_load_per_controller,
        config.min_load_per_controller,
        config.cooldown(),
    ));

    let api_state = Arc::new(ApiState {
        supervisor: supervisor.clone(),
        autoscaler: autoscaler.clone(),
        dataplane,
        distributor,
        topology,
        metrics,
        state,
        controller_host: config.controller_host.clone(),
    });

    let tick_handle = tokio::spawn(autoscaler.clone().run(config.check_interval()));

    let addr: SocketAddr = config.control_addr;
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        log::info!("received SIGINT, shutting down");
    };

    if let Err(e) = api::serve(addr, api_state, shutdown).await {
        log::error!("control API server error: {}", e);
    }

    tick_handle.abort();
    supervisor.shutdown();
    log::info!("shutdown complete");
}
