//! In-memory collaborators for scheduler tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Semaphore, watch};

use p2pfaas_core::{
    ActOutput, ApiResponse, DiscoveryError, FaasBackend, Learner, LoadSource, PeerDirectory,
    PeerForwarder, PeerJobRequest, PeerJobResponse, PeerLoad, PeersListMember, ServiceRequest,
    Timings, payload,
};

use crate::context::{NodeIdentity, SchedulerContext};
use crate::load_table::LoadTable;
use crate::prober::LoadProber;
use crate::queue::{AdmissionQueue, QueueConfig};

/// Echoes the payload back; optionally holds every call until released.
pub struct EchoBackend {
    gated: bool,
    gate: Semaphore,
}

impl EchoBackend {
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }
}

#[async_trait]
impl FaasBackend for EchoBackend {
    async fn execute(
        &self,
        _function: &str,
        payload: &[u8],
        _content_type: &str,
    ) -> anyhow::Result<ApiResponse> {
        if self.gated {
            self.gate.acquire().await?.forget();
        }
        let mut headers = HashMap::new();
        headers.insert("X-Duration-Seconds".to_string(), "0.001".to_string());
        Ok(ApiResponse {
            headers,
            body: payload.to_vec(),
            status_code: 200,
        })
    }
}

#[derive(Default)]
pub struct StaticDirectory {
    machines: Mutex<Vec<String>>,
}

impl StaticDirectory {
    pub fn set(&self, machines: &[&str]) {
        *self.machines.lock().unwrap() = machines.iter().map(|m| m.to_string()).collect();
    }
}

#[async_trait]
impl PeerDirectory for StaticDirectory {
    async fn machines(&self, _cached: bool) -> Result<Vec<String>, DiscoveryError> {
        Ok(self.machines.lock().unwrap().clone())
    }
}

/// Loads by peer; unknown peers fail the probe.
#[derive(Default)]
pub struct FakeLoads {
    loads: Mutex<HashMap<String, u32>>,
}

impl FakeLoads {
    pub fn set(&self, machine: &str, load: u32) {
        self.loads.lock().unwrap().insert(machine.to_string(), load);
    }
}

#[async_trait]
impl LoadSource for FakeLoads {
    async fn load(&self, machine: &str) -> anyhow::Result<PeerLoad> {
        match self.loads.lock().unwrap().get(machine) {
            Some(load) => Ok(PeerLoad {
                running: *load,
                queue_length: 0,
                max_running: None,
            }),
            None => anyhow::bail!("connection refused"),
        }
    }
}

/// Acts as a remote peer that executes everything it receives.
#[derive(Default)]
pub struct FakeForwarder {
    failing: Mutex<HashSet<String>>,
    empty: Mutex<HashSet<String>>,
    sent: Mutex<Vec<(String, PeerJobRequest)>>,
}

impl FakeForwarder {
    pub fn fail_for(&self, machine: &str) {
        self.failing.lock().unwrap().insert(machine.to_string());
    }

    pub fn empty_for(&self, machine: &str) {
        self.empty.lock().unwrap().insert(machine.to_string());
    }

    pub fn sent(&self) -> Vec<(String, PeerJobRequest)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PeerForwarder for FakeForwarder {
    async fn forward(
        &self,
        machine: &str,
        request: &PeerJobRequest,
    ) -> anyhow::Result<Option<PeerJobResponse>> {
        self.sent
            .lock()
            .unwrap()
            .push((machine.to_string(), request.clone()));
        if self.failing.lock().unwrap().contains(machine) {
            anyhow::bail!("connection refused");
        }
        if self.empty.lock().unwrap().contains(machine) {
            return Ok(None);
        }
        Ok(Some(PeerJobResponse {
            peers_list: vec![PeersListMember {
                machine_id: format!("id-{machine}"),
                machine_ip: machine.to_string(),
                timings: Timings {
                    execution_time: Some(0.01),
                    ..Default::default()
                },
            }],
            body: request.payload.clone(),
            status_code: 200,
        }))
    }
}

/// Replays scripted actions and records the states it was asked about.
#[derive(Default)]
pub struct ScriptedLearner {
    actions: Mutex<VecDeque<Option<ActOutput>>>,
    states: Mutex<Vec<Vec<f64>>>,
}

impl ScriptedLearner {
    pub fn push(&self, action: f64, eps: f64) {
        self.actions
            .lock()
            .unwrap()
            .push_back(Some(ActOutput { action, eps }));
    }

    pub fn push_failure(&self) {
        self.actions.lock().unwrap().push_back(None);
    }

    pub fn states(&self) -> Vec<Vec<f64>> {
        self.states.lock().unwrap().clone()
    }
}

#[async_trait]
impl Learner for ScriptedLearner {
    async fn act(&self, state: &[f64]) -> anyhow::Result<ActOutput> {
        self.states.lock().unwrap().push(state.to_vec());
        match self.actions.lock().unwrap().pop_front() {
            Some(Some(out)) => Ok(out),
            _ => anyhow::bail!("learner unreachable"),
        }
    }
}

pub struct TestNode {
    pub ctx: SchedulerContext,
    pub backend: Arc<EchoBackend>,
    pub directory: Arc<StaticDirectory>,
    pub loads: Arc<FakeLoads>,
    pub forwarder: Arc<FakeForwarder>,
    pub learner: Arc<ScriptedLearner>,
    pub shutdown: watch::Sender<bool>,
}

impl TestNode {
    pub fn builder() -> TestNodeBuilder {
        TestNodeBuilder {
            peers: Vec::new(),
            running_max: 2,
            queue_length_max: 4,
            queue_enabled: true,
            gated: false,
        }
    }
}

pub struct TestNodeBuilder {
    peers: Vec<String>,
    running_max: usize,
    queue_length_max: usize,
    queue_enabled: bool,
    gated: bool,
}

impl TestNodeBuilder {
    pub fn peers(mut self, peers: &[&str]) -> Self {
        self.peers = peers.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn running_max(mut self, n: usize) -> Self {
        self.running_max = n;
        self
    }

    pub fn queue_length_max(mut self, n: usize) -> Self {
        self.queue_length_max = n;
        self
    }

    pub fn queue_enabled(mut self, enabled: bool) -> Self {
        self.queue_enabled = enabled;
        self
    }

    /// Backend calls block until `EchoBackend::release`.
    pub fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> TestNode {
        let backend = Arc::new(EchoBackend {
            gated: self.gated,
            gate: Semaphore::new(0),
        });
        let directory = Arc::new(StaticDirectory::default());
        let peers: Vec<&str> = self.peers.iter().map(String::as_str).collect();
        directory.set(&peers);
        let loads = Arc::new(FakeLoads::default());
        let forwarder = Arc::new(FakeForwarder::default());
        let learner = Arc::new(ScriptedLearner::default());

        let load = Arc::new(LoadTable::new());
        let (shutdown, rx) = watch::channel(false);
        let queue = AdmissionQueue::start(
            QueueConfig {
                running_max: self.running_max,
                queue_length_max: self.queue_length_max,
                queue_enabled: self.queue_enabled,
            },
            backend.clone(),
            load.clone(),
            rx,
        );

        let ctx = SchedulerContext {
            queue,
            load,
            directory: directory.clone(),
            prober: LoadProber::new(directory.clone(), loads.clone()),
            forwarder: forwarder.clone(),
            learner: Some(learner.clone()),
            identity: NodeIdentity::new("node-a", "10.0.0.1"),
        };

        TestNode {
            ctx,
            backend,
            directory,
            loads,
            forwarder,
            learner,
            shutdown,
        }
    }
}

pub fn local_request(function: &str, body: &[u8]) -> ServiceRequest {
    ServiceRequest {
        function_name: function.to_string(),
        payload: body.to_vec(),
        content_type: "text/plain".to_string(),
        ..Default::default()
    }
}

/// A request received from a peer after `hops` forwards.
pub fn external_request(function: &str, body: &[u8], hops: u32) -> ServiceRequest {
    let encoded = payload::encode(body);
    ServiceRequest {
        function_name: function.to_string(),
        payload: encoded.clone().into_bytes(),
        content_type: "text/plain".to_string(),
        external: true,
        peer_request: Some(PeerJobRequest {
            function_name: function.to_string(),
            hops,
            payload: encoded,
            content_type: "text/plain".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub async fn wait_until(cond: impl Fn() -> bool) {
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

