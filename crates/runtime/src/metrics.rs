// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Inference profiling metrics.
//!
//! [`InferenceMetrics`] collects per-node and aggregate timing together with
//! the arena footprint of the plan that produced them. These metrics are the
//! primary tool for comparing backend lists on a target device.

use std::time::Duration;

/// Metrics for a single node's execution.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NodeMetrics {
    /// Node name.
    pub name: String,
    /// Operation kind, e.g. `conv2d`.
    pub kind: String,
    /// Id of the backend that executed the node.
    pub backend: String,
    /// Time spent inside the kernel.
    pub compute_duration: Duration,
}

/// Aggregate metrics for a complete inference run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InferenceMetrics {
    /// Total wall-clock time for the run, including input and output copies.
    pub total_duration: Duration,
    /// Total time spent inside kernels.
    pub total_compute_duration: Duration,
    /// Size of the execution arena in bytes.
    pub arena_bytes: usize,
    /// Per-node metrics in execution order; empty when profiling is off.
    pub node_metrics: Vec<NodeMetrics>,
    /// Number of nodes executed.
    pub num_nodes: usize,
}

impl InferenceMetrics {
    /// Creates an empty metrics container.
    pub fn new(num_nodes: usize, arena_bytes: usize) -> Self {
        Self {
            total_duration: Duration::ZERO,
            total_compute_duration: Duration::ZERO,
            arena_bytes,
            node_metrics: Vec::new(),
            num_nodes,
        }
    }

    /// Records metrics for a single node.
    pub fn record_node(&mut self, name: String, kind: String, backend: String, compute: Duration) {
        self.total_compute_duration += compute;
        self.node_metrics.push(NodeMetrics {
            name,
            kind,
            backend,
            compute_duration: compute,
        });
    }

    /// Finalises metrics with the total wall-clock time.
    pub fn finalise(&mut self, total: Duration) {
        self.total_duration = total;
    }

    /// Slowest recorded node, if any were recorded.
    pub fn slowest(&self) -> Option<&NodeMetrics> {
        self.node_metrics.iter().max_by_key(|m| m.compute_duration)
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let arena_kb = self.arena_bytes as f64 / 1024.0;
        let compute_pct = if self.total_duration.as_secs_f64() > 0.0 {
            (self.total_compute_duration.as_secs_f64() / self.total_duration.as_secs_f64())
                * 100.0
        } else {
            0.0
        };

        let mut s = format!(
            "Inference: {:.3}ms total, {} nodes, {:.3}ms compute ({:.0}%), arena {:.1} KB",
            self.total_duration.as_secs_f64() * 1000.0,
            self.num_nodes,
            self.total_compute_duration.as_secs_f64() * 1000.0,
            compute_pct,
            arena_kb,
        );
        if let Some(m) = self.slowest() {
            s.push_str(&format!(
                ", slowest '{}' ({}, {}) {:.3}ms",
                m.name,
                m.kind,
                m.backend,
                m.compute_duration.as_secs_f64() * 1000.0
            ));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_metrics() {
        let m = InferenceMetrics::new(3, 1024);
        assert_eq!(m.num_nodes, 3);
        assert!(m.slowest().is_none());
        assert_eq!(m.total_compute_duration, Duration::ZERO);
    }

    #[test]
    fn test_record_and_finalise() {
        let mut m = InferenceMetrics::new(2, 0);
        m.record_node("c0".into(), "conv2d".into(), "cpu".into(), Duration::from_millis(10));
        m.record_node("r0".into(), "relu".into(), "planar".into(), Duration::from_millis(8));
        m.finalise(Duration::from_millis(30));

        assert_eq!(m.node_metrics.len(), 2);
        assert_eq!(m.total_compute_duration, Duration::from_millis(18));
        assert_eq!(m.total_duration, Duration::from_millis(30));
        assert_eq!(m.slowest().unwrap().name, "c0");
    }

    #[test]
    fn test_summary_format() {
        let mut m = InferenceMetrics::new(1, 2048);
        m.record_node("c0".into(), "conv2d".into(), "cpu".into(), Duration::from_millis(5));
        m.finalise(Duration::from_millis(10));

        let s = m.summary();
        assert!(s.contains("Inference:"));
        assert!(s.contains("1 nodes"));
        assert!(s.contains("arena 2.0 KB"));
        assert!(s.contains("slowest 'c0' (conv2d, cpu)"));
    }
}
