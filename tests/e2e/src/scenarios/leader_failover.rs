//! Leader Failover E2E Test
//!
//! The leaseholder dies without releasing its lease. The follower takes over
//! once the lease expires, closes its relayed clients, and those clients
//! resume their connections on the new leader with state intact.

use crate::framework::{wait_until, TestClient, TestFramework, TestResult, TestScenario};
use crate::validation;

use anyhow::{bail, Result};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use types::ActorQuery;

pub struct LeaderFailoverTest {
    pub increments_before_crash: u32,
    pub key: String,
}

impl Default for LeaderFailoverTest {
    fn default() -> Self {
        Self {
            increments_before_crash: 3,
            key: "failover".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl TestScenario for LeaderFailoverTest {
    async fn setup(&self, framework: &TestFramework) -> Result<()> {
        framework.start_nodes(2).await?;
        Ok(())
    }

    async fn execute(&self, framework: &TestFramework) -> Result<TestResult> {
        let started = Instant::now();
        let nodes = framework.nodes().await;
        let (leader, follower) = (&nodes[0], &nodes[1]);
        let query = ActorQuery::new("counter", [self.key.as_str()]);
        let actor_id = query.actor_id();

        let _owner = TestClient::connect(leader, &query).await?;
        let mut relayed = TestClient::connect(follower, &query).await?;
        relayed.subscribe("newCount").await?;
        for _ in 0..self.increments_before_crash {
            relayed.call("increment", vec![json!(1)]).await?;
        }
        relayed.take_events();

        warn!(node_id = %leader.node_id(), "Crashing leader");
        leader.crash().await;

        let lease = Duration::from_millis(framework.config().lease_duration_ms);
        if !relayed.wait_closed(lease * 5).await {
            bail!("relayed client was not closed after the leader died");
        }
        if !wait_until(lease * 5, || follower.is_leader(&actor_id)).await {
            bail!("follower never took over the lease");
        }
        info!(elapsed = ?started.elapsed(), "Follower took over");

        let mut resumed = TestClient::reconnect(follower, &query, &relayed).await?;
        let count = resumed.call("getCount", vec![]).await?;
        let next = resumed.call("increment", vec![json!(1)]).await?;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let events = resumed.take_events();

        let validations = vec![
            validation::output_equals(
                "same_connection",
                &json!(resumed.connection_id()),
                &json!(relayed.connection_id()),
            ),
            validation::output_equals("count_survived", &count, &json!(self.increments_before_crash)),
            validation::events_in_order(
                "subscription_survived",
                &events,
                "newCount",
                &[json!(self.increments_before_crash + 1)],
            ),
            validation::output_equals("next_count", &next, &json!(self.increments_before_crash + 1)),
            validation::single_leader(std::slice::from_ref(follower), &actor_id),
        ];

        let metrics = framework.collect_metrics().await;
        Ok(TestResult::from_validations(self.name(), started, metrics, validations))
    }

    async fn cleanup(&self, framework: &TestFramework) -> Result<()> {
        framework.shutdown().await;
        Ok(())
    }

    fn name(&self) -> &str {
        "leader_failover"
    }

    fn description(&self) -> &str {
        "A crashed leader is replaced and relayed clients resume on the new one"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
}
