// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `edge-rt inspect` command: display graph structure, resolved tensors,
//! negotiation result and arena plan.

use model_ir::ModelLoader;
use runtime::{InferenceEngine, RuntimeConfig};

use super::truncate;

pub async fn execute(config: RuntimeConfig) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║              edge-rt · Model Inspector              ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let graph = ModelLoader::load(&config.model_path).map_err(|e| {
        anyhow::anyhow!(
            "failed to load model from '{}': {e}",
            config.model_path.display()
        )
    })?;

    // ── Summary ────────────────────────────────────────────────
    println!("  {}", graph.summary());
    println!();

    println!("  {:<4} {:<28} {:<18} {:<28} {}", "Idx", "Node", "Kind", "Inputs", "Outputs");
    println!("  {}", "-".repeat(96));
    for &id in graph.order() {
        let Some(node) = graph.node(id) else { continue };
        let names = |ids: &[model_ir::TensorId]| {
            ids.iter()
                .filter_map(|&t| graph.tensor(t).map(|d| d.name.clone()))
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!(
            "  {:<4} {:<28} {:<18} {:<28} {}",
            id.0,
            truncate(&node.name, 28),
            node.kind.as_str(),
            truncate(&names(&node.inputs), 28),
            names(&node.outputs),
        );
    }
    println!();

    // ── Negotiation ────────────────────────────────────────────
    let backends = config.backends.join(", ");
    let prepared = InferenceEngine::new(config).prepare(graph)?;
    println!("  Backends: {backends}");
    for line in prepared.negotiated().summary().lines() {
        println!("  {line}");
    }
    println!();

    // ── Resolved tensors ───────────────────────────────────────
    println!("  Tensors after shape inference:");
    for t in prepared.graph().tensors() {
        println!("   {}", t.summary());
    }
    println!();

    // ── Arena plan ─────────────────────────────────────────────
    match prepared.plan() {
        Ok(ready) => {
            println!("  Arena:");
            println!("   {}", ready.memory_plan().stats().summary());
            let scratch: usize = ready.kernels().iter().map(|k| k.scratch_bytes()).sum();
            if scratch > 0 {
                println!("   Kernel scratch: {scratch} bytes");
            }
        }
        Err(e) => println!("  Arena: not planned ({e})"),
    }
    println!();
    Ok(())
}
