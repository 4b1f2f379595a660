//! Control API: the HTTP surface an operator or orchestration script
//! drives. Routed `(method, path)` via a `match`, the same shape as this
//! codebase's `Admin` service (`admin.rs`), with an additional
//! `GET /metrics` Prometheus route alongside the control endpoints.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::to_bytes;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::{Deserialize, Serialize};

use crate::autoscaler::Autoscaler;
use crate::dataplane::DataPlaneClient;
use crate::distributor::Distributor;
use crate::metrics::Metrics;
use crate::model::ControllerId;
use crate::state::SupervisorState;
use crate::supervisor::Supervisor;
use crate::topology::TopologyRunner;

pub struct ApiState {
    pub supervisor: Arc<Supervisor>,
    pub autoscaler: Arc<Autoscaler>,
    pub dataplane: Arc<dyn DataPlaneClient>,
    pub distributor: Arc<Distributor>,
    pub topology: Arc<dyn TopologyRunner>,
    pub metrics: Arc<Metrics>,
    pub state: Arc<std::sync::Mutex<SupervisorState>>,
    pub controller_host: String,
}

#[derive(Serialize, Deserialize)]
struct StatusBody {
    active_controllers: usize,
    avg_load: f64,
    individual_rates: std::collections::HashMap<String, f64>,
    is_scaling: bool,
    max_controllers: u32,
    auto_mode: bool,
}

#[derive(Serialize)]
struct Ack<'a> {
    status: &'a str,
    message: &'a str,
}

#[derive(Deserialize)]
struct TrafficRequest {
    pps: u32,
    time: u32,
}

fn json_response(code: StatusCode, body: &impl Serialize) -> Response<Body> {
    let payload = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(code)
        .header("content-type", "application/json")
        .body(Body::from(payload))
        .expect("well-formed response")
}

fn ok(message: &str) -> Response<Body> {
    json_response(StatusCode::OK, &Ack { status: "ok", message })
}

fn server_error(message: &str) -> Response<Body> {
    json_response(StatusCode::INTERNAL_SERVER_ERROR, &Ack { status: "error", message })
}

fn not_found() -> Response<Body> {
    json_response(StatusCode::NOT_FOUND, &Ack { status: "error", message: "no such route" })
}

fn endpoints(state: &ApiState) -> Vec<(String, u16)> {
    let guard = state.state.lock().unwrap();
    guard
        .members
        .iter()
        .filter_map(|id| guard.instances.get(id))
        .map(|inst| (state.controller_host.clone(), inst.ofp_port))
        .collect()
}

async fn handle(req: Request<Body>, state: Arc<ApiState>) -> Result<Response<Body>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::POST, "/init_mininet") => match state.topology.start() {
            Ok(()) => ok("mininet topology started"),
            Err(e) => server_error(&e),
        },
        (&Method::POST, "/stop_mininet") => {
            state.dataplane.rewire(&[]);
            state.supervisor.shutdown();
            state.autoscaler.disable_monitoring();
            match state.topology.stop() {
                Ok(()) => ok("mininet topology stopped, cluster torn down"),
                Err(e) => server_error(&e),
            }
        }
        (&Method::POST, "/init_controllers") => {
            let sup = state.supervisor.clone();
            tokio::spawn(async move {
                sup.scale_up().await;
            });
            state.autoscaler.enable_monitoring(false);
            ok("base cluster starting, monitoring enabled")
        }
        (&Method::POST, "/scale_up") => {
            let sup = state.supervisor.clone();
            tokio::spawn(async move {
                sup.scale_up().await;
            });
            ok("scale up accepted")
        }
        (&Method::POST, "/scale_down") => {
            let sup = state.supervisor.clone();
            tokio::spawn(async move {
                sup.scale_down().await;
            });
            ok("scale down accepted")
        }
        (&Method::POST, "/init_balancer") => {
            state.dataplane.rewire(&endpoints(&state));
            let members = state.state.lock().unwrap().members.clone();
            state.distributor.distribute(&members).await;
            state.autoscaler.set_auto_mode(true);
            ok("balancer initialized, autoMode enabled")
        }
        (&Method::POST, "/stop_balancer") => {
            state.autoscaler.disable_auto_mode();
            ok("autoMode disabled")
        }
        (&Method::GET, "/status") => {
            let (active, avg_load, rates, is_scaling, auto_mode) = state.autoscaler.status();
            let individual_rates = rates
                .into_iter()
                .map(|(ControllerId(id), rate)| (id.to_string(), rate))
                .collect();
            json_response(
                StatusCode::OK,
                &StatusBody {
                    active_controllers: active,
                    avg_load,
                    individual_rates,
                    is_scaling,
                    max_controllers: state.supervisor.config().max_controllers,
                    auto_mode,
                },
            )
        }
        (&Method::POST, "/generate_traffic") => {
            let bytes = match to_bytes(req.into_body()).await {
                Ok(b) => b,
                Err(e) => return Ok(server_error(&format!("failed to read body: {}", e))),
            };
            match serde_json::from_slice::<TrafficRequest>(&bytes) {
                Ok(body) => match state.topology.generate_traffic(body.pps, body.time) {
                    Ok(()) => ok("traffic generation started"),
                    Err(e) => server_error(&e),
                },
                Err(e) => json_response(
                    StatusCode::BAD_REQUEST,
                    &Ack { status: "error", message: &format!("malformed request: {}", e) },
                ),
            }
        }
        (&Method::GET, "/metrics") => Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/plain; version=0.0.4")
            .body(Body::from(state.metrics.render()))
            .expect("well-formed response"),
        _ => not_found(),
    };
    Ok(response)
}

/// Serves the Control API until `shutdown` resolves, using the same
/// `Server::bind(...).serve(...)`-plus-`with_graceful_shutdown` idiom
/// as this codebase's `bin/tcpd.rs`.
pub async fn serve(
    addr: SocketAddr,
    state: Arc<ApiState>,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<(), hyper::Error> {
    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(req, state.clone()))) }
    });

    log::info!("control API listening on {}", addr);
    Server::bind(&addr).serve(make_svc).with_graceful_shutdown(shutdown).await
}
