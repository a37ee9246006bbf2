//! Contacts Sync E2E Test
//!
//! Two devices sync an address book through one contacts actor. Conflicts
//! resolve last-writer-wins on `updatedAt`; deletions are tombstones with an
//! empty name.

use crate::fixtures::{Contact, ContactFixture};
use crate::framework::{TestClient, TestFramework, TestResult, TestScenario};
use crate::validation;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::info;
use types::{now_ms, ActorQuery};

pub struct ContactsSyncTest {
    pub key: String,
}

impl Default for ContactsSyncTest {
    fn default() -> Self {
        Self {
            key: "address-book".to_string(),
        }
    }
}

fn changes(output: &Value) -> Result<Vec<Contact>> {
    let changes = output.get("changes").cloned().context("getChanges output without changes")?;
    Ok(serde_json::from_value(changes)?)
}

#[async_trait::async_trait]
impl TestScenario for ContactsSyncTest {
    async fn setup(&self, framework: &TestFramework) -> Result<()> {
        framework.start_nodes(2).await?;
        Ok(())
    }

    async fn execute(&self, framework: &TestFramework) -> Result<TestResult> {
        let started = Instant::now();
        let nodes = framework.nodes().await;
        let query = ActorQuery::new("contacts", [self.key.as_str()]);

        let mut phone = TestClient::connect(&nodes[0], &query).await?;
        let mut laptop = TestClient::connect(&nodes[1], &query).await?;
        laptop.subscribe("contactsChanged").await?;

        let base = now_ms();
        let ada = ContactFixture::new("c1", "Ada").updated_at(base).build();
        let grace = ContactFixture::new("c2", "Grace").with_phone("555-0100").updated_at(base).build();
        phone.call("pushChanges", vec![json!([ada, grace])]).await?;

        let pulled = changes(&laptop.call("getChanges", vec![json!(0)]).await?)?;
        info!(contacts = pulled.len(), "Laptop pulled changes");

        // Stale edit from the laptop loses, a newer tombstone wins
        let stale = ContactFixture::new("c1", "Ada Lovelace").updated_at(base - 1_000).build();
        laptop.call("pushChanges", vec![json!([stale])]).await?;
        let tombstone = ContactFixture::deleted("c2").updated_at(base + 1).build();
        laptop.call("pushChanges", vec![json!([tombstone])]).await?;

        let all = phone.call("getAllContacts", vec![]).await?;
        let stats = phone.call("getSyncStats", vec![]).await?;
        let recent = changes(&phone.call("getChanges", vec![json!(base)]).await?)?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let events = laptop.take_events();

        let names: Vec<&str> = all
            .as_array()
            .map(|list| list.iter().filter_map(|c| c.get("name").and_then(Value::as_str)).collect())
            .unwrap_or_default();
        let validations = vec![
            validation::output_equals("pulled_contacts", &json!(pulled.len()), &json!(2)),
            validation::output_equals("visible_contacts", &json!(names), &json!(["Ada"])),
            validation::output_equals("deleted_contacts", &stats["deletedContacts"], &json!(1)),
            validation::output_equals("changes_after_base", &json!(recent.len()), &json!(1)),
            validation::output_equals(
                "change_broadcasts",
                &json!(events.iter().filter(|e| e.name == "contactsChanged").count()),
                &json!(2),
            ),
            validation::single_leader(&nodes, &query.actor_id()),
        ];

        phone.close().await?;
        laptop.close().await?;
        let metrics = framework.collect_metrics().await;
        Ok(TestResult::from_validations(self.name(), started, metrics, validations))
    }

    async fn cleanup(&self, framework: &TestFramework) -> Result<()> {
        framework.shutdown().await;
        Ok(())
    }

    fn name(&self) -> &str {
        "contacts_sync"
    }

    fn description(&self) -> &str {
        "Two clients sync contacts with last-writer-wins conflict resolution"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(20)
    }
}
