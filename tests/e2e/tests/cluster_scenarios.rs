//! Full scenarios through the test framework

use config::{init_tracing, LoggingOptions};
use e2e_tests::{
    ContactsSyncTest, CounterRelayTest, LeaderFailoverTest, TestClient, TestConfig, TestFramework, TestResult,
};
use serde_json::json;
use types::ActorQuery;

fn framework() -> TestFramework {
    init_tracing(&LoggingOptions {
        level: "warn".to_string(),
        ..LoggingOptions::default()
    });
    TestFramework::new(TestConfig {
        lease_duration_ms: 400,
        ..TestConfig::default()
    })
    .unwrap()
}

fn assert_passed(result: &TestResult) {
    let failures: Vec<_> = result
        .validation_results
        .iter()
        .filter(|v| !v.passed)
        .map(|v| (&v.validator, &v.message, &v.details))
        .collect();
    assert!(
        result.success,
        "{} failed: {:?} {:?}",
        result.scenario_name, result.error_message, failures
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_counter_relay_scenario() {
    let framework = framework();
    let result = framework
        .run_scenario(CounterRelayTest::default())
        .await
        .unwrap();
    assert_passed(&result);
    assert_eq!(result.metrics.nodes, 3);
    assert!(result.metrics.relay_forwards > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_contacts_sync_scenario() {
    let result = framework()
        .run_scenario(ContactsSyncTest::default())
        .await
        .unwrap();
    assert_passed(&result);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_leader_failover_scenario() {
    let result = framework()
        .run_scenario(LeaderFailoverTest::default())
        .await
        .unwrap();
    assert_passed(&result);
    assert!(result.metrics.leases_acquired >= 2);
}

#[tokio::test]
async fn test_scenarios_can_share_one_framework() {
    let framework = framework();
    let first = framework
        .run_scenario(ContactsSyncTest {
            key: "shared-1".to_string(),
        })
        .await
        .unwrap();
    let second = framework
        .run_scenario(CounterRelayTest {
            node_count: 2,
            increments: 4,
            key: "shared-2".to_string(),
        })
        .await
        .unwrap();
    assert_passed(&first);
    assert_passed(&second);
    assert!(framework.nodes().await.is_empty());
}

#[tokio::test]
async fn test_invalid_contacts_payload_is_a_user_error() {
    let framework = framework();
    let nodes = framework.start_nodes(1).await.unwrap();
    let query = ActorQuery::new("contacts", ["invalid"]);

    let mut client = TestClient::connect(&nodes[0], &query).await.unwrap();
    let error = client
        .try_call("pushChanges", vec![json!("not a list")])
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(error.code, "invalid_argument");

    let stats = client.call("getSyncStats", vec![]).await.unwrap();
    assert_eq!(stats["totalContacts"], json!(0));
    framework.shutdown().await;
}
