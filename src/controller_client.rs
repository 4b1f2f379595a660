//! Controller Client: HTTP client against a single controller instance's
//! `/metrics` and `/role` endpoints.
//!
//! Grounded in this codebase's `namerd::resolve`/`request` (periodic HTTP
//! GET against a service, JSON body parsed with `serde_json`, latency
//! recorded via `tacho`), adapted from a long-lived polling stream to a
//! one-shot per-tick call issued by the autoscaler and distributor.

use std::time::Duration;
use tacho::Timing;

use hyper::body::to_bytes;
use hyper::{Body, Client, Method, Request, StatusCode};
use serde::{Deserialize, Serialize};

use crate::metrics::Metrics;
use crate::model::{ControllerId, Role, SwitchId};

const FETCH_TIMEOUT: Duration = Duration::from_millis(500);
const ROLE_POST_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketInCount {
    Count(u64),
    Unreachable,
}

#[derive(Debug)]
pub struct RoleRejected {
    pub controller: ControllerId,
    pub switch: SwitchId,
}

#[async_trait::async_trait]
pub trait ControllerClient: Send + Sync {
    async fn fetch_packet_in_count(&self, id: ControllerId) -> PacketInCount;

    async fn post_role(
        &self,
        id: ControllerId,
        switch: SwitchId,
        role: Role,
        generation: u64,
    ) -> Result<(), RoleRejected>;
}

#[derive(Deserialize)]
struct MetricsBody {
    packet_in_count: u64,
    #[serde(default)]
    #[allow(dead_code)]
    switches: Vec<u64>,
}

#[derive(Serialize)]
struct RoleBody {
    dpid: u64,
    role: &'static str,
    generation_id: u64,
}

/// Production adapter: plain-HTTP calls against `http://{host}:{api_port}`.
pub struct HttpControllerClient {
    client: Client<hyper::client::HttpConnector>,
    host: String,
    base_api_port: u16,
    metrics: std::sync::Arc<Metrics>,
}

impl HttpControllerClient {
    pub fn new(host: impl Into<String>, base_api_port: u16, metrics: std::sync::Arc<Metrics>) -> HttpControllerClient {
        HttpControllerClient {
            client: Client::new(),
            host: host.into(),
            base_api_port,
            metrics,
        }
    }

    fn api_port(&self, id: ControllerId) -> u16 {
        self.base_api_port + id.0 as u16
    }
}

#[async_trait::async_trait]
impl ControllerClient for HttpControllerClient {
    async fn fetch_packet_in_count(&self, id: ControllerId) -> PacketInCount {
        let url = format!("http://{}:{}/metrics", self.host, self.api_port(id));
        let start = <dyn tacho::Timing>::start();
        let result = tokio::time::timeout(FETCH_TIMEOUT, self.client.get(url.parse().unwrap())).await;
        self.metrics.controller_poll_latency_ms.clone().add(start.elapsed_ms());

        let resp = match result {
            Ok(Ok(resp)) if resp.status() == StatusCode::OK => resp,
            Ok(Ok(resp)) => {
                log::info!("controller {} /metrics returned {}", id, resp.status());
                return PacketInCount::Unreachable;
            }
            Ok(Err(e)) => {
                log::info!("controller {} unreachable: {}", id, e);
                return PacketInCount::Unreachable;
            }
            Err(_) => {
                log::info!("controller {} /metrics timed out", id);
                return PacketInCount::Unreachable;
            }
        };

        let body = match to_bytes(resp.into_body()).await {
            Ok(b) => b,
            Err(e) => {
                log::info!("controller {} body read failed: {}", id, e);
                return PacketInCount::Unreachable;
            }
        };

        match serde_json::from_slice::<MetricsBody>(&body) {
            Ok(m) => PacketInCount::Count(m.packet_in_count),
            Err(e) => {
                log::info!("controller {} sent malformed /metrics body: {}", id, e);
                PacketInCount::Unreachable
            }
        }
    }

    async fn post_role(
        &self,
        id: ControllerId,
        switch: SwitchId,
        role: Role,
        generation: u64,
    ) -> Result<(), RoleRejected> {
        let url = format!("http://{}:{}/role", self.host, self.api_port(id));
        let body = RoleBody {
            dpid: switch.0,
            role: role.as_str(),
            generation_id: generation,
        };
        let payload = serde_json::to_vec(&body).expect("role body always serializes");

        let req = Request::builder()
            .method(Method::POST)
            .uri(&url)
            .header("content-type", "application/json")
            .body(Body::from(payload))
            .expect("well-formed role request");

        let result = tokio::time::timeout(ROLE_POST_TIMEOUT, self.client.request(req)).await;
        match result {
            Ok(Ok(resp)) if resp.status().is_success() => Ok(()),
            Ok(Ok(resp)) => {
                log::info!(
                    "role post rejected: controller {} switch {} status {}",
                    id,
                    switch,
                    resp.status()
                );
                Err(RoleRejected { controller: id, switch })
            }
            Ok(Err(e)) => {
                log::info!("role post failed: controller {} switch {}: {}", id, switch, e);
                Err(RoleRejected { controller: id, switch })
            }
            Err(_) => {
                log::info!("role post timed out: controller {} switch {}", id, switch);
                Err(RoleRejected { controller: id, switch })
            }
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_double {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeControllerClient {
        pub counts: Mutex<HashMap<ControllerId, PacketInCount>>,
        pub roles: Mutex<Vec<(ControllerId, SwitchId, Role, u64)>>,
        pub reject_roles_for: Mutex<std::collections::HashSet<ControllerId>>,
    }

    impl FakeControllerClient {
        pub fn new() -> FakeControllerClient {
            FakeControllerClient::default()
        }

        pub fn set_count(&self, id: ControllerId, count: PacketInCount) {
            self.counts.lock().unwrap().insert(id, count);
        }
    }

    #[async_trait::async_trait]
    impl ControllerClient for FakeControllerClient {
        async fn fetch_packet_in_count(&self, id: ControllerId) -> PacketInCount {
            self.counts
                .lock()
                .unwrap()
                .get(&id)
                .copied()
                .unwrap_or(PacketInCount::Unreachable)
        }

        async fn post_role(
            &self,
            id: ControllerId,
            switch: SwitchId,
            role: Role,
            generation: u64,
        ) -> Result<(), RoleRejected> {
            if self.reject_roles_for.lock().unwrap().contains(&id) {
                return Err(RoleRejected { controller: id, switch });
            }
            self.roles.lock().unwrap().push((id, switch, role, generation));
            Ok(())
        }
    }
}
