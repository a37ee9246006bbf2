//! Counter Relay E2E Test
//!
//! One counter, one client per node. Only the leaseholder runs the actor;
//! every other client is relayed:
//! client → follower → store pub/sub → leader → actor → broadcast → followers

use crate::framework::{TestClient, TestFramework, TestResult, TestScenario};
use crate::validation::{self, ValidationResult};

use anyhow::{ensure, Result};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::info;
use types::ActorQuery;

pub struct CounterRelayTest {
    pub node_count: usize,
    pub increments: u32,
    pub key: String,
}

impl Default for CounterRelayTest {
    fn default() -> Self {
        Self {
            node_count: 3,
            increments: 9,
            key: "relay".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl TestScenario for CounterRelayTest {
    async fn setup(&self, framework: &TestFramework) -> Result<()> {
        ensure!(self.node_count >= 2, "relay scenario needs at least two nodes");
        framework.start_nodes(self.node_count).await?;
        Ok(())
    }

    async fn execute(&self, framework: &TestFramework) -> Result<TestResult> {
        let started = Instant::now();
        let nodes = framework.nodes().await;
        let query = ActorQuery::new("counter", [self.key.as_str()]);

        // First connection decides the leader
        let mut clients = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let mut client = TestClient::connect(node, &query).await?;
            client.subscribe("newCount").await?;
            clients.push(client);
        }
        info!(clients = clients.len(), "Clients connected");

        let mut last = Value::Null;
        for round in 0..self.increments as usize {
            let client = &mut clients[round % nodes.len()];
            last = client.call("increment", vec![json!(1)]).await?;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut validations = vec![
            validation::single_leader(&nodes, &query.actor_id()),
            validation::output_equals("final_count", &last, &json!(self.increments)),
        ];
        let expected: Vec<Value> = (1..=self.increments).map(|n| json!(n)).collect();
        for (index, client) in clients.iter_mut().enumerate() {
            let events = client.take_events();
            validations.push(validation::events_in_order(
                &format!("events_on_node_{index}"),
                &events,
                "newCount",
                &expected,
            ));
        }

        let metrics = framework.collect_metrics().await;
        validations.push(validation::at_most("relay_timeouts", metrics.relay_timeouts, 0));
        if metrics.relay_forwards == 0 {
            validations.push(ValidationResult::fail(
                "relay_used",
                validation::ValidationSeverity::Error,
                "no frame was relayed",
                json!({ "nodes": nodes.len() }),
            ));
        }

        for client in clients {
            client.close().await?;
        }
        Ok(TestResult::from_validations(self.name(), started, metrics, validations))
    }

    async fn cleanup(&self, framework: &TestFramework) -> Result<()> {
        framework.shutdown().await;
        Ok(())
    }

    fn name(&self) -> &str {
        "counter_relay"
    }

    fn description(&self) -> &str {
        "Clients on every node increment one counter and see every broadcast in order"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(20)
    }
}
