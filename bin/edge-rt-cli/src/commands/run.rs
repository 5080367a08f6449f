// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `edge-rt run` command: execute one inference on synthetic inputs.
//!
//! Demonstrates the full type-state pipeline:
//! ```text
//! InferenceEngine<Idle> → load_model → <Prepared> → plan → <Ready> → run
//! ```
//!
//! A pass has no cancellation points, so a deadline is enforced from the
//! outside: the engine runs on a blocking task and is abandoned, arena and
//! all, if the deadline passes first.

use runtime::{InferenceEngine, InferenceOutput, RuntimeConfig};
use std::time::Duration;

use super::{synthetic_inputs, truncate};

pub async fn execute(config: RuntimeConfig, timeout_ms: Option<u64>) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║            edge-rt · Inference Runner               ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    println!("  Config:");
    println!("   Model:    {}", config.model_path.display());
    println!("   Budget:   {}", config.memory_budget);
    println!("   Backends: {}", config.backends.join(", "));
    if let Some(ms) = timeout_ms {
        println!("   Deadline: {ms} ms");
    }
    println!();

    // Step 1: Idle → Prepared (load, negotiate, build kernels).
    println!("  [1/3] Loading model and negotiating backends...");
    let prepared = InferenceEngine::new(config).load_model()?;
    println!("        {}", prepared.graph().summary());
    println!(
        "        {} layout conversions inserted",
        prepared.negotiated().conversions
    );
    println!();

    // Step 2: Prepared → Ready (configure kernels, plan the arena).
    println!("  [2/3] Configuring kernels and planning the arena...");
    let mut engine = prepared.plan()?;
    println!("        {}", engine.memory_plan().stats().summary());
    println!();

    // Step 3: Ready → run.
    println!("  [3/3] Running inference...");
    let inputs = synthetic_inputs(engine.graph())?;
    let task = tokio::task::spawn_blocking(move || engine.run(&inputs));
    let output = match timeout_ms {
        Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), task).await {
            Ok(joined) => joined??,
            Err(_) => {
                tracing::warn!(timeout_ms = ms, "deadline exceeded; engine discarded");
                anyhow::bail!("inference did not finish within {ms} ms");
            }
        },
        None => task.await??,
    };

    println!();
    print_results(&output);
    Ok(())
}

fn print_results(output: &InferenceOutput) {
    println!("  Results:");
    for (name, tensor) in output.names.iter().zip(&output.outputs) {
        let values = tensor.to_f32_vec();
        let preview: Vec<String> = values.iter().take(8).map(|v| format!("{v:.4}")).collect();
        println!(
            "   {:<24} {} {:?}  [{}{}]",
            truncate(name, 24),
            tensor.dtype(),
            tensor.dims(),
            preview.join(", "),
            if values.len() > 8 { ", ..." } else { "" },
        );
    }
    println!();
    println!("  Metrics:");
    println!("   {}", output.metrics.summary());
    if !output.metrics.node_metrics.is_empty() {
        println!();
        println!(
            "   {:<28} {:<16} {:<8} {:>10}",
            "Node", "Kind", "Backend", "Compute"
        );
        println!("   {}", "-".repeat(66));
        for m in &output.metrics.node_metrics {
            println!(
                "   {:<28} {:<16} {:<8} {:>8.3}ms",
                truncate(&m.name, 28),
                m.kind,
                m.backend,
                m.compute_duration.as_secs_f64() * 1000.0,
            );
        }
    }
    println!();
}
