//! End-to-End Test Runner for the actor runtime

use anyhow::{bail, Result};
use clap::Parser;
use config::{init_tracing, LoggingOptions};
use e2e_tests::{
    framework::{TestConfig, TestFramework},
    scenarios::{ContactsSyncTest, CounterRelayTest, LeaderFailoverTest},
    TestResult,
};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Test scenario to run
    #[arg(short, long, default_value = "all")]
    scenario: String,

    /// Nodes in the relay scenario
    #[arg(short, long, default_value_t = 3)]
    nodes: usize,

    /// Lease duration in milliseconds
    #[arg(short, long, default_value_t = 600)]
    lease_ms: u64,

    /// Output results to file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&LoggingOptions {
        level: if args.verbose { "debug" } else { "info" }.to_string(),
        ..LoggingOptions::default()
    });

    info!("Starting actor runtime E2E suite");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = TestConfig {
        verbose: args.verbose,
        lease_duration_ms: args.lease_ms,
        ..TestConfig::default()
    };
    let framework = TestFramework::new(config)?;

    let relay = CounterRelayTest {
        node_count: args.nodes,
        ..CounterRelayTest::default()
    };
    let results = match args.scenario.as_str() {
        "relay" | "counter_relay" => vec![framework.run_scenario(relay).await?],
        "contacts" | "contacts_sync" => vec![framework.run_scenario(ContactsSyncTest::default()).await?],
        "failover" | "leader_failover" => vec![framework.run_scenario(LeaderFailoverTest::default()).await?],
        "all" => {
            info!("Running all test scenarios");
            vec![
                framework.run_scenario(relay).await?,
                framework.run_scenario(ContactsSyncTest::default()).await?,
                framework.run_scenario(LeaderFailoverTest::default()).await?,
            ]
        }
        other => bail!("Unknown test scenario: {other}"),
    };

    print_results_summary(&results);

    if let Some(output_path) = args.output {
        save_results_to_file(&results, &output_path).await?;
        info!("Results saved to: {}", output_path.display());
    }

    if !results.iter().all(|r| r.success) {
        error!("Some tests failed");
        std::process::exit(1);
    }

    info!("All tests passed successfully!");
    Ok(())
}

fn print_results_summary(results: &[TestResult]) {
    println!("\n═══════════════════════════════════════");
    println!("        TEST RESULTS SUMMARY");
    println!("═══════════════════════════════════════");

    let passed_tests = results.iter().filter(|r| r.success).count();
    println!("Total Tests: {}", results.len());
    println!("Passed:      {} ✓", passed_tests);
    println!("Failed:      {} ✗", results.len() - passed_tests);
    println!();

    for result in results {
        let status = if result.success { "✓ PASS" } else { "✗ FAIL" };
        println!("{} {} ({} ms)", status, result.scenario_name, result.duration.as_millis());

        if let Some(ref error) = result.error_message {
            println!("      Error: {}", error);
        }

        println!(
            "      Nodes: {} | Actions: {} | Relayed: {} | Relay timeouts: {} | Leases: {}",
            result.metrics.nodes,
            result.metrics.actions_executed,
            result.metrics.relay_forwards,
            result.metrics.relay_timeouts,
            result.metrics.leases_acquired
        );

        let failed_validations: Vec<_> = result.validation_results.iter().filter(|v| !v.passed).collect();
        if !failed_validations.is_empty() {
            println!("      Validation Failures:");
            for validation in failed_validations {
                println!("        - {}: {}", validation.validator, validation.message);
            }
        }

        println!();
    }

    println!("═══════════════════════════════════════");
}

async fn save_results_to_file(results: &[TestResult], path: &PathBuf) -> Result<()> {
    let json_output = serde_json::json!({
        "test_run": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION"),
            "total_tests": results.len(),
            "passed_tests": results.iter().filter(|r| r.success).count(),
            "failed_tests": results.iter().filter(|r| !r.success).count(),
        },
        "results": results
    });

    tokio::fs::write(path, serde_json::to_string_pretty(&json_output)?).await?;
    Ok(())
}
