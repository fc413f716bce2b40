//! Ledger Stress Tool
//!
//! Hammers one wallet with concurrent withdrawals and checks that exactly
//! the funded amount was spent.
//!
//! Run with: cargo run --bin ledger_stress --release -- --withdrawals 500 --tasks 32

use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use uuid::Uuid;

use wallet_ledger::{InMemoryLedgerStore, LedgerConfig, LedgerEngine, MockOracle};

fn arg_or(args: &[String], flag: &str, default: u64) -> u64 {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let withdrawals = arg_or(&args, "--withdrawals", 500);
    let tasks = arg_or(&args, "--tasks", 16).max(1);
    // Extra attempts beyond the funded amount; all of them must be refused
    let overdraw = arg_or(&args, "--overdraw", 10);

    let engine = LedgerEngine::new(
        Arc::new(InMemoryLedgerStore::new()),
        Arc::new(MockOracle::new()),
        LedgerConfig::default(),
    );

    let wallet = engine.create_wallet(Uuid::new_v4(), "USD", None).await?;
    engine
        .deposit(wallet.id, Decimal::from(withdrawals), "stress-funding")
        .await?;

    println!(
        "Stress Test - {} withdrawals (+{} overdraw) over {} tasks",
        withdrawals, overdraw, tasks
    );

    let total = withdrawals + overdraw;
    let start = Instant::now();
    let mut handles = Vec::with_capacity(tasks as usize);

    for task in 0..tasks {
        let engine = engine.clone();
        let wallet_id = wallet.id;
        handles.push(tokio::spawn(async move {
            let mut applied = 0u64;
            let mut refused = 0u64;
            let mut i = task;
            while i < total {
                match engine
                    .withdraw(wallet_id, Decimal::ONE, &format!("stress-{}", i))
                    .await
                {
                    Ok(_) => applied += 1,
                    Err(_) => refused += 1,
                }
                i += tasks;
            }
            (applied, refused)
        }));
    }

    let mut applied = 0u64;
    let mut refused = 0u64;
    for handle in handles {
        let (a, r) = handle.await?;
        applied += a;
        refused += r;
    }

    let elapsed = start.elapsed();
    let balance = engine.get_balance(wallet.id).await?;

    println!("\n=== Stress Test Results ===");
    println!("Applied: {}", applied);
    println!("Refused: {}", refused);
    println!("Final balance: {}", balance);
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!(
        "Rate: {:.0} mutations/sec",
        total as f64 / elapsed.as_secs_f64()
    );

    if applied != withdrawals || !balance.is_zero() {
        anyhow::bail!(
            "ledger drifted: applied {} of {}, balance {}",
            applied,
            withdrawals,
            balance
        );
    }

    println!("OK");
    Ok(())
}
