// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Arena planning statistics for profiling and diagnostics.
//!
//! [`PlanStats`] compares the planned arena against two references: the
//! naive footprint (every buffer gets its own bytes) and the peak live
//! footprint (the most bytes simultaneously live at any step, a lower bound
//! no plan can beat). These numbers are what to look at when tuning the
//! memory budget.

use crate::BufferRequest;

/// Summary of one arena plan.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct PlanStats {
    /// Number of buffer requests planned.
    pub buffers: usize,
    /// Size of the planned arena in bytes.
    pub arena_bytes: usize,
    /// Sum of all request sizes.
    pub naive_bytes: usize,
    /// Largest sum of sizes live during a single step.
    pub peak_live_bytes: usize,
}

impl PlanStats {
    pub(crate) fn from_requests(requests: &[BufferRequest], arena_bytes: usize) -> Self {
        let steps = requests.iter().map(|r| r.last + 1).max().unwrap_or(0);
        let mut live = vec![0usize; steps];
        for r in requests {
            for slot in &mut live[r.first..=r.last] {
                *slot += r.size;
            }
        }
        Self {
            buffers: requests.len(),
            arena_bytes,
            naive_bytes: requests.iter().map(|r| r.size).sum(),
            peak_live_bytes: live.into_iter().max().unwrap_or(0),
        }
    }

    /// Fraction of the naive footprint saved by reuse, in `[0.0, 1.0]`.
    ///
    /// Returns `0.0` when nothing was planned.
    pub fn reuse_ratio(&self) -> f64 {
        if self.naive_bytes == 0 {
            return 0.0;
        }
        1.0 - (self.arena_bytes.min(self.naive_bytes) as f64 / self.naive_bytes as f64)
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Arena: {} buffers, {:.1} KB planned ({:.1} KB naive, {:.1} KB peak live, {:.0}% saved)",
            self.buffers,
            self.arena_bytes as f64 / 1024.0,
            self.naive_bytes as f64 / 1024.0,
            self.peak_live_bytes as f64 / 1024.0,
            self.reuse_ratio() * 100.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let s = PlanStats::default();
        assert_eq!(s.buffers, 0);
        assert_eq!(s.reuse_ratio(), 0.0);
    }

    #[test]
    fn test_peak_live() {
        let requests = [
            BufferRequest::new(100, 0, 1),
            BufferRequest::new(50, 1, 2),
            BufferRequest::new(200, 3, 3),
        ];
        let s = PlanStats::from_requests(&requests, 208);
        assert_eq!(s.naive_bytes, 350);
        assert_eq!(s.peak_live_bytes, 200);
    }

    #[test]
    fn test_reuse_ratio() {
        let s = PlanStats {
            buffers: 2,
            arena_bytes: 256,
            naive_bytes: 1024,
            peak_live_bytes: 256,
        };
        assert!((s.reuse_ratio() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_summary() {
        let s = PlanStats::from_requests(&[BufferRequest::new(2048, 0, 0)], 2048);
        let summary = s.summary();
        assert!(summary.contains("1 buffers"));
        assert!(summary.contains("2.0 KB planned"));
        assert!(summary.contains("0% saved"));
    }
}
