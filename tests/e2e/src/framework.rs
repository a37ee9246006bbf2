//! Core E2E testing framework
//!
//! A [`TestFramework`] owns one in-memory cluster: a shared coordinate store,
//! a shared persistence backend and any number of [`CoordinateNode`]s with the
//! demo actors registered. Scenarios drive it through [`TestClient`]s that
//! speak the JSON client protocol over a channel driver.

use actor_runtime::{ChannelDriver, ConnectRequest, DriverEvent, Manager, MemoryPersistence};
use anyhow::{anyhow, bail, Context, Result};
use codec::{Encoding, ErrorFrame, Event, ToClient, ToClientBody, ToServer};
use config::RuntimeConfig;
use coordinate::{CoordinateNode, MemoryCoordinateStore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use types::{ActorQuery, ConnectionId, ConnectionToken, NodeId};
use uuid::Uuid;

use crate::fixtures::register_fixtures;
use crate::validation::ValidationResult;

/// Main test framework coordinator
pub struct TestFramework {
    config: TestConfig,
    store: Arc<MemoryCoordinateStore>,
    persistence: Arc<MemoryPersistence>,
    nodes: Mutex<Vec<CoordinateNode>>,
    test_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    /// Test timeout in seconds
    pub timeout_secs: u64,

    /// Enable detailed logging
    pub verbose: bool,

    /// Lease duration used by every node
    pub lease_duration_ms: u64,

    /// How often followers re-check a lease
    pub check_lease_interval_ms: u64,

    /// Relay acknowledgement timeout
    pub message_ack_timeout_ms: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            verbose: false,
            lease_duration_ms: 600,
            check_lease_interval_ms: 50,
            message_ack_timeout_ms: 250,
        }
    }
}

impl TestConfig {
    /// Runtime configuration handed to every node
    pub fn runtime_config(&self) -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.coordinate.lease_duration_ms = self.lease_duration_ms;
        config.coordinate.renew_lease_grace_ms = self.lease_duration_ms / 2;
        config.coordinate.check_lease_interval_ms = self.check_lease_interval_ms;
        config.coordinate.check_lease_jitter_ms = self.check_lease_interval_ms / 2;
        config.coordinate.message_ack_timeout_ms = self.message_ack_timeout_ms;
        config.coordinate.relay_retries = 1;
        config.lifecycle.connection_liveness_interval_ms = 60_000;
        config.lifecycle.connection_liveness_timeout_ms = 60_000;
        config
    }
}

/// Test scenario trait
#[async_trait::async_trait]
pub trait TestScenario {
    async fn setup(&self, framework: &TestFramework) -> Result<()>;
    async fn execute(&self, framework: &TestFramework) -> Result<TestResult>;
    async fn cleanup(&self, framework: &TestFramework) -> Result<()>;

    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn timeout(&self) -> Duration;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub scenario_name: String,
    pub success: bool,
    pub duration: Duration,
    pub error_message: Option<String>,
    pub metrics: TestMetrics,
    pub validation_results: Vec<ValidationResult>,
}

impl TestResult {
    /// Result built from a scenario's validations; passes when all of them did
    pub fn from_validations(
        scenario_name: &str,
        started: Instant,
        metrics: TestMetrics,
        validation_results: Vec<ValidationResult>,
    ) -> Self {
        let failures: Vec<_> = validation_results
            .iter()
            .filter(|v| !v.passed)
            .map(|v| v.validator.clone())
            .collect();
        Self {
            scenario_name: scenario_name.to_string(),
            success: failures.is_empty(),
            duration: started.elapsed(),
            error_message: (!failures.is_empty()).then(|| format!("Failed validations: {}", failures.join(", "))),
            metrics,
            validation_results,
        }
    }

    fn failed(scenario_name: &str, started: Instant, message: String) -> Self {
        Self {
            scenario_name: scenario_name.to_string(),
            success: false,
            duration: started.elapsed(),
            error_message: Some(message),
            metrics: TestMetrics::default(),
            validation_results: vec![],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestMetrics {
    pub nodes: u32,
    pub actions_executed: u64,
    pub broadcasts: u64,
    pub relay_forwards: u64,
    pub relay_timeouts: u64,
    pub leases_acquired: u64,
    pub leases_lost: u64,
    pub messages_dropped: u64,
}

impl TestFramework {
    pub fn new(config: TestConfig) -> Result<Self> {
        let runtime = config.runtime_config();
        runtime.validate().context("invalid test runtime configuration")?;

        Ok(Self {
            config,
            store: Arc::new(MemoryCoordinateStore::new()),
            persistence: Arc::new(MemoryPersistence::new()),
            nodes: Mutex::new(Vec::new()),
            test_id: Uuid::new_v4(),
        })
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<MemoryCoordinateStore> {
        &self.store
    }

    pub fn persistence(&self) -> &Arc<MemoryPersistence> {
        &self.persistence
    }

    /// Start a node named `name` in this cluster
    pub async fn start_node(&self, name: &str) -> Result<CoordinateNode> {
        let suffix = Uuid::new_v4().simple().to_string();
        let node_id = NodeId::parse(format!("{name}-{}", &suffix[..8]))?;
        let manager = register_fixtures(Manager::new(
            node_id,
            self.persistence.clone(),
            self.config.runtime_config(),
        ));
        let node = CoordinateNode::start(Arc::new(manager), self.store.clone())
            .await
            .with_context(|| format!("starting node {name}"))?;
        info!(node_id = %node.node_id(), "Test node started");
        self.nodes.lock().await.push(node.clone());
        Ok(node)
    }

    /// Start `count` nodes named `node-0`, `node-1`, ...
    pub async fn start_nodes(&self, count: usize) -> Result<Vec<CoordinateNode>> {
        let mut nodes = Vec::with_capacity(count);
        for index in 0..count {
            nodes.push(self.start_node(&format!("node-{index}")).await?);
        }
        Ok(nodes)
    }

    pub async fn nodes(&self) -> Vec<CoordinateNode> {
        self.nodes.lock().await.clone()
    }

    /// Summed counters of every node started so far
    pub async fn collect_metrics(&self) -> TestMetrics {
        let nodes = self.nodes.lock().await;
        let mut metrics = TestMetrics {
            nodes: nodes.len() as u32,
            messages_dropped: self.store.dropped(),
            ..TestMetrics::default()
        };
        for node in nodes.iter() {
            let actors = node.manager().metrics().snapshot();
            let coordinate = node.metrics().snapshot();
            metrics.actions_executed += actors.actions_executed;
            metrics.broadcasts += actors.broadcasts_sent;
            metrics.relay_forwards += coordinate.relay_forwards;
            metrics.relay_timeouts += coordinate.relay_timeouts;
            metrics.leases_acquired += coordinate.leases_acquired;
            metrics.leases_lost += coordinate.leases_lost;
        }
        metrics
    }

    /// Gracefully stop every node
    pub async fn shutdown(&self) {
        let nodes: Vec<_> = self.nodes.lock().await.drain(..).collect();
        for node in nodes {
            node.shutdown().await;
        }
    }

    /// Run a complete test scenario
    pub async fn run_scenario<S: TestScenario>(&self, scenario: S) -> Result<TestResult> {
        info!("Starting test scenario: {}", scenario.name());
        info!("Description: {}", scenario.description());
        info!("Test ID: {}", self.test_id);

        let start_time = Instant::now();

        if let Err(e) = scenario.setup(self).await {
            error!("Setup failed: {:#}", e);
            return Ok(TestResult::failed(scenario.name(), start_time, format!("Setup failed: {e:#}")));
        }

        let execution_result = tokio::time::timeout(scenario.timeout(), scenario.execute(self)).await;

        let mut test_result = match execution_result {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!("Test execution failed: {:#}", e);
                TestResult::failed(scenario.name(), start_time, format!("Execution failed: {e:#}"))
            }
            Err(_) => {
                error!("Test execution timed out");
                TestResult::failed(
                    scenario.name(),
                    start_time,
                    format!("Timed out after {:?}", scenario.timeout()),
                )
            }
        };

        if let Err(e) = scenario.cleanup(self).await {
            warn!("Cleanup failed: {:#}", e);
        }

        test_result.duration = start_time.elapsed();
        info!(
            "Scenario {} finished: success={} duration={:?}",
            test_result.scenario_name, test_result.success, test_result.duration
        );
        Ok(test_result)
    }
}

/// Poll `condition` every 10ms until it holds or `within` elapses
pub async fn wait_until(within: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Client attached to one node through a channel driver
pub struct TestClient {
    node: CoordinateNode,
    link: ConnectionId,
    connection_id: String,
    connection_token: String,
    rx: UnboundedReceiver<DriverEvent>,
    events: Vec<Event>,
    next_id: u64,
}

impl TestClient {
    pub async fn connect(node: &CoordinateNode, query: &ActorQuery) -> Result<Self> {
        Self::open(node, query, None).await
    }

    /// Resume an earlier connection using the credentials from its `Init`
    pub async fn reconnect(node: &CoordinateNode, query: &ActorQuery, previous: &TestClient) -> Result<Self> {
        Self::open(
            node,
            query,
            Some((previous.connection_id.as_str(), previous.connection_token.as_str())),
        )
        .await
    }

    async fn open(node: &CoordinateNode, query: &ActorQuery, credentials: Option<(&str, &str)>) -> Result<Self> {
        let (driver, rx) = ChannelDriver::new();
        let mut request = ConnectRequest::new(json!({}), Encoding::Json, driver);
        if let Some((connection_id, token)) = credentials {
            request = request.with_reconnect(
                ConnectionId::parse(connection_id)?,
                ConnectionToken::from_client(token),
            );
        }
        let link = node
            .connect(query, request)
            .await
            .with_context(|| format!("connecting to {} via {}", query.actor_id(), node.node_id()))?;

        let mut client = Self {
            node: node.clone(),
            link,
            connection_id: String::new(),
            connection_token: String::new(),
            rx,
            events: Vec::new(),
            next_id: 1,
        };
        match client.next_message().await? {
            Some(ToClientBody::Init(init)) => {
                client.connection_id = init.connection_id;
                client.connection_token = init.connection_token;
            }
            Some(ToClientBody::Error(e)) => bail!("connection rejected: {} ({})", e.message, e.code),
            other => bail!("expected init frame, got {other:?}"),
        }
        debug!(connection_id = %client.connection_id, node_id = %node.node_id(), "Test client connected");
        Ok(client)
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn node(&self) -> &CoordinateNode {
        &self.node
    }

    async fn next_message(&mut self) -> Result<Option<ToClientBody>> {
        match tokio::time::timeout(Duration::from_secs(5), self.rx.recv()).await {
            Ok(Some(DriverEvent::Frame(frame))) => {
                let message: ToClient = Encoding::Json.decode(&frame, usize::MAX)?;
                Ok(Some(message.body))
            }
            Ok(Some(DriverEvent::Closed { .. })) | Ok(None) => Ok(None),
            Err(_) => Err(anyhow!("timed out waiting for a frame")),
        }
    }

    pub async fn subscribe(&mut self, event_name: &str) -> Result<()> {
        let frame = Encoding::Json.encode(&ToServer::subscription(event_name, true))?;
        self.node.send(&self.link, frame).await?;
        Ok(())
    }

    /// Call an action and wait for its response
    pub async fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        self.try_call(name, args)
            .await?
            .map_err(|e| anyhow!("action {name} failed: {} ({})", e.message, e.code))
    }

    /// Call an action, returning the error frame instead of failing
    pub async fn try_call(&mut self, name: &str, args: Vec<Value>) -> Result<std::result::Result<Value, ErrorFrame>> {
        let id = self.next_id;
        self.next_id += 1;
        let frame = Encoding::Json.encode(&ToServer::action(id, name, args))?;
        if let Err(e) = self.node.send(&self.link, frame).await {
            debug!(action = name, error = %e, "Send failed, waiting for the error frame");
        }

        loop {
            match self.next_message().await? {
                Some(ToClientBody::ActionResponse(response)) if response.id == id => return Ok(Ok(response.output)),
                Some(ToClientBody::Error(error)) if error.related_action_id == Some(id) => return Ok(Err(error)),
                Some(ToClientBody::Event(event)) => self.events.push(event),
                Some(other) => bail!("unexpected frame while waiting for action {id}: {other:?}"),
                None => bail!("connection closed while waiting for action {name}"),
            }
        }
    }

    /// Wait until the link is closed by the cluster
    pub async fn wait_closed(&mut self, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(DriverEvent::Frame(_))) => continue,
                Ok(Some(DriverEvent::Closed { .. })) | Ok(None) => return true,
                Err(_) => return false,
            }
        }
    }

    /// Events received so far, in arrival order
    pub fn take_events(&mut self) -> Vec<Event> {
        while let Ok(event) = self.rx.try_recv() {
            if let DriverEvent::Frame(frame) = event {
                if let Ok(ToClient {
                    body: ToClientBody::Event(event),
                }) = Encoding::Json.decode::<ToClient>(&frame, usize::MAX)
                {
                    self.events.push(event);
                }
            }
        }
        std::mem::take(&mut self.events)
    }

    pub async fn close(self) -> Result<()> {
        self.node.close(&self.link, None).await?;
        Ok(())
    }
}
