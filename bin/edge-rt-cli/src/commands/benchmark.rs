// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `edge-rt benchmark` command: latency statistics over repeated runs.
//!
//! Runs one warm-up pass, then `iterations` timed passes, and prints
//! latency percentiles plus the nodes that dominate compute time.

use runtime::{InferenceEngine, InferenceMetrics, RuntimeConfig};
use std::collections::BTreeMap;
use std::time::Duration;

use super::{synthetic_inputs, truncate};

pub async fn execute(config: RuntimeConfig, iterations: usize) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║           edge-rt · Benchmark Suite                 ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();
    anyhow::ensure!(iterations > 0, "--iterations must be at least 1");

    println!("  Model:      {}", config.model_path.display());
    println!("  Backends:   {}", config.backends.join(", "));
    println!("  Budget:     {}", config.memory_budget);
    println!("  Iterations: {iterations}");
    println!();

    let mut engine = InferenceEngine::new(config).load_model()?.plan()?;
    println!("  {}", engine.graph().summary());
    println!("  {}", engine.memory_plan().stats().summary());
    println!();

    let inputs = synthetic_inputs(engine.graph())?;
    let runs = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<InferenceMetrics>> {
        engine.run(&inputs)?;
        (0..iterations)
            .map(|_| -> anyhow::Result<InferenceMetrics> { Ok(engine.run(&inputs)?.metrics) })
            .collect()
    })
    .await??;

    // ── Latency ────────────────────────────────────────────────
    let mut totals: Vec<Duration> = runs.iter().map(|m| m.total_duration).collect();
    totals.sort();
    let mean = totals.iter().sum::<Duration>() / totals.len() as u32;
    let pct = |p: f64| totals[((totals.len() - 1) as f64 * p).round() as usize];

    println!(
        "  {:>10} {:>10} {:>10} {:>10} {:>10}",
        "Min", "Mean", "P50", "P90", "Max"
    );
    println!("  {}", "-".repeat(56));
    println!(
        "  {:>8.3}ms {:>8.3}ms {:>8.3}ms {:>8.3}ms {:>8.3}ms",
        ms(totals[0]),
        ms(mean),
        ms(pct(0.5)),
        ms(pct(0.9)),
        ms(totals[totals.len() - 1]),
    );
    println!();

    // ── Hot nodes ──────────────────────────────────────────────
    let mut per_node: BTreeMap<(String, String, String), Duration> = BTreeMap::new();
    for m in runs.iter().flat_map(|r| &r.node_metrics) {
        *per_node
            .entry((m.name.clone(), m.kind.clone(), m.backend.clone()))
            .or_default() += m.compute_duration;
    }
    if per_node.is_empty() {
        println!("  Per-node timing disabled (enable_profiling = false).");
        println!();
        return Ok(());
    }

    let mut hot: Vec<_> = per_node.into_iter().collect();
    hot.sort_by(|a, b| b.1.cmp(&a.1));
    println!("  Slowest nodes (mean compute per run):");
    println!("  {:<28} {:<16} {:<8} {:>10}", "Node", "Kind", "Backend", "Compute");
    println!("  {}", "-".repeat(66));
    for ((name, kind, backend), total) in hot.iter().take(10) {
        println!(
            "  {:<28} {:<16} {:<8} {:>8.3}ms",
            truncate(name, 28),
            kind,
            backend,
            ms(*total / runs.len() as u32),
        );
    }
    println!();
    Ok(())
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
