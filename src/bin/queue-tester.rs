//! Queue Tester CLI Tool
//!
//! Command-line tool for exercising the matchmaking queue in-process, on a
//! virtual clock, without starting the service.
//!
//! Usage:
//!   cargo run --bin queue-tester -- --help
//!   cargo run --bin queue-tester simulate --participants 10 --ticks 20
//!   cargo run --bin queue-tester run-scenario --scenario cooldown
//!   cargo run --bin queue-tester run-all-scenarios

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use duo_queue::config::QueueConfig;
use duo_queue::delivery::ChannelPairingSink;
use duo_queue::queue::{Clock, ManualClock, MatchQueue};
use duo_queue::service::{Matchmaker, MatchmakerConfig, TickOutcome};
use duo_queue::types::PairingNotification;
use duo_queue::utils::generate_participant_id;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

const SAMPLE_TAGS: &[&str] = &["any", "music", "games", "books", ""];

#[derive(Parser)]
#[command(name = "queue-tester")]
#[command(about = "In-process testing tool for the duo-queue matchmaking queue")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Cooldown window in milliseconds
    #[arg(long, default_value = "30000")]
    cooldown_ms: i64,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll participants and run matchmaking ticks on a virtual clock
    Simulate {
        /// Number of participants to enroll
        #[arg(short, long, default_value = "10")]
        participants: usize,
        /// Number of ticks to run
        #[arg(short, long, default_value = "10")]
        ticks: u32,
        /// Virtual time between ticks in milliseconds
        #[arg(long, default_value = "1500")]
        tick_ms: i64,
        /// Keep matched participants queued instead of withdrawing them
        #[arg(long)]
        keep_matched: bool,
    },
    /// Run a predefined test scenario
    RunScenario {
        /// Scenario name (pair, fairness, cooldown, withdraw, reconnect)
        #[arg(short, long)]
        scenario: String,
    },
    /// Run all test scenarios
    RunAllScenarios,
}

/// A queue on a virtual clock with a matchmaker and the delivered pairings
struct Harness {
    clock: Arc<ManualClock>,
    matchmaker: Matchmaker,
    pairings: ReceiverStream<PairingNotification>,
}

impl Harness {
    fn new(cooldown_ms: i64, withdraw_on_delivery: bool) -> Self {
        let clock = Arc::new(ManualClock::at_millis(0));
        let queue = Arc::new(
            MatchQueue::new(QueueConfig {
                cooldown_ms,
                ..QueueConfig::default()
            })
            .with_clock(clock.clone()),
        );
        let (sink, pairings) = ChannelPairingSink::channel(1024, Duration::from_millis(100));
        let matchmaker = Matchmaker::new(
            queue,
            Arc::new(sink),
            MatchmakerConfig {
                withdraw_on_delivery,
                ..MatchmakerConfig::default()
            },
        );

        Self {
            clock,
            matchmaker,
            pairings,
        }
    }

    /// Run one tick and print what happened
    async fn tick(&mut self) -> Result<TickOutcome> {
        let outcome = self.matchmaker.tick().await;
        let at = self.clock.now().timestamp_millis();

        match &outcome {
            TickOutcome::Delivered(pairing) => {
                let notification = self
                    .pairings
                    .next()
                    .await
                    .ok_or_else(|| anyhow::anyhow!("pairing stream closed"))?;
                println!(
                    "  [{:>7}ms] 🤝 {} + {} ({}) pairing {}",
                    at, pairing.id_a, pairing.id_b, pairing.combined_tag, notification.pairing_id
                );
            }
            TickOutcome::NoMatch => println!("  [{:>7}ms] ⏳ no eligible pair", at),
            other => println!("  [{:>7}ms] ⚠️  {:?}", at, other),
        }

        Ok(outcome)
    }
}

fn pairing_of(outcome: &TickOutcome) -> Option<(&str, &str)> {
    match outcome {
        TickOutcome::Delivered(p) | TickOutcome::Unconfirmed(p) | TickOutcome::Failed(p) => {
            Some((p.id_a.as_str(), p.id_b.as_str()))
        }
        _ => None,
    }
}

async fn simulate(
    cooldown_ms: i64,
    participants: usize,
    ticks: u32,
    tick_ms: i64,
    keep_matched: bool,
) -> Result<()> {
    let mut harness = Harness::new(cooldown_ms, !keep_matched);

    println!("👥 Enrolling {} participants...", participants);
    for i in 0..participants {
        let id = generate_participant_id();
        let tag = SAMPLE_TAGS[i % SAMPLE_TAGS.len()];
        harness.matchmaker.on_connect(&id, Some(tag));
        harness.clock.advance_millis(10);
    }

    println!("🎲 Running {} ticks ({}ms apart)...", ticks, tick_ms);
    for _ in 0..ticks {
        harness.tick().await?;
        harness.clock.advance_millis(tick_ms);
    }

    let queue = harness.matchmaker.queue();
    let stats = queue.stats();
    println!("\n📊 Queue statistics:");
    println!("  Waiting: {}", stats.participants_waiting);
    println!("  Enrollments: {}", stats.enrollments);
    println!("  Pairings offered: {}", stats.pairings_offered);
    println!("  Withdrawals: {}", stats.withdrawals);
    println!("  Internal faults: {}", stats.internal_faults);

    Ok(())
}

/// Two participants are paired and both leave the queue
async fn scenario_pair(cooldown_ms: i64) -> Result<bool> {
    let mut harness = Harness::new(cooldown_ms, true);
    harness.matchmaker.on_connect("alice", Some("music"));
    harness.clock.advance_millis(1);
    harness.matchmaker.on_connect("bob", None);

    let outcome = harness.tick().await?;
    Ok(pairing_of(&outcome) == Some(("alice", "bob")) && harness.matchmaker.queue().is_empty())
}

/// The two longest-waiting participants are chosen first
async fn scenario_fairness(cooldown_ms: i64) -> Result<bool> {
    let mut harness = Harness::new(cooldown_ms, true);
    for id in ["first", "second", "third"] {
        harness.matchmaker.on_connect(id, None);
        harness.clock.advance_millis(100);
    }

    let outcome = harness.tick().await?;
    Ok(pairing_of(&outcome) == Some(("first", "second"))
        && harness.matchmaker.queue().contains("third"))
}

/// Participants left queued are not re-offered until the cooldown elapses
async fn scenario_cooldown(cooldown_ms: i64) -> Result<bool> {
    let mut harness = Harness::new(cooldown_ms, false);
    harness.matchmaker.on_connect("alice", None);
    harness.clock.advance_millis(1);
    harness.matchmaker.on_connect("bob", None);

    let first = harness.tick().await?;
    harness.clock.advance_millis(cooldown_ms);
    let during = harness.tick().await?;
    harness.clock.advance_millis(1);
    let after = harness.tick().await?;

    Ok(pairing_of(&first).is_some() && during == TickOutcome::NoMatch && pairing_of(&after).is_some())
}

/// A disconnected participant is never offered
async fn scenario_withdraw(cooldown_ms: i64) -> Result<bool> {
    let mut harness = Harness::new(cooldown_ms, true);
    for id in ["alice", "bob", "carol"] {
        harness.matchmaker.on_connect(id, None);
        harness.clock.advance_millis(1);
    }
    harness.matchmaker.on_disconnect("alice");

    let outcome = harness.tick().await?;
    Ok(pairing_of(&outcome) == Some(("bob", "carol")))
}

/// Reconnection attempts are counted without losing the queue position
async fn scenario_reconnect(cooldown_ms: i64) -> Result<bool> {
    let mut harness = Harness::new(cooldown_ms, true);
    harness.matchmaker.on_connect("alice", None);
    harness.clock.advance_millis(1);
    harness.matchmaker.on_connect("bob", None);

    let attempts = harness.matchmaker.on_reconnect_attempt("alice");
    harness.matchmaker.on_reconnect_attempt("alice");
    let attempts_after = harness
        .matchmaker
        .queue()
        .entry("alice")
        .map(|e| e.reconnection_attempts);
    println!("  alice reconnection attempts: {:?}", attempts_after);

    let outcome = harness.tick().await?;
    Ok(attempts == Some(1)
        && attempts_after == Some(2)
        && pairing_of(&outcome) == Some(("alice", "bob")))
}

async fn run_scenario(name: &str, cooldown_ms: i64) -> Result<bool> {
    match name {
        "pair" => scenario_pair(cooldown_ms).await,
        "fairness" => scenario_fairness(cooldown_ms).await,
        "cooldown" => scenario_cooldown(cooldown_ms).await,
        "withdraw" => scenario_withdraw(cooldown_ms).await,
        "reconnect" => scenario_reconnect(cooldown_ms).await,
        _ => Err(anyhow::anyhow!(
            "Unknown scenario '{}'. Available: pair, fairness, cooldown, withdraw, reconnect",
            name
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            participants,
            ticks,
            tick_ms,
            keep_matched,
        } => {
            simulate(cli.cooldown_ms, participants, ticks, tick_ms, keep_matched).await?;
        }

        Commands::RunScenario { scenario } => {
            println!("🧪 Running scenario: {}", scenario);
            match run_scenario(&scenario.to_lowercase(), cli.cooldown_ms).await {
                Ok(true) => println!("✅ Scenario completed successfully!"),
                Ok(false) => {
                    println!("❌ Scenario failed.");
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("❌ Error running scenario: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::RunAllScenarios => {
            let mut passed = 0;
            let mut failed = 0;

            println!("🧪 Running all test scenarios...\n");

            for name in ["pair", "fairness", "cooldown", "withdraw", "reconnect"] {
                println!("Running '{}' scenario...", name);
                match run_scenario(name, cli.cooldown_ms).await {
                    Ok(true) => {
                        println!("✅ PASSED\n");
                        passed += 1;
                    }
                    Ok(false) => {
                        println!("❌ FAILED\n");
                        failed += 1;
                    }
                    Err(e) => {
                        println!("❌ FAILED ({})\n", e);
                        failed += 1;
                    }
                }
            }

            println!("📊 Results: {} passed, {} failed", passed, failed);
            if failed > 0 {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
