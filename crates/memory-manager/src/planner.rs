// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Lifetime-based arena planning.
//!
//! Every buffer the engine needs during one execution pass (graph inputs,
//! intermediates, outputs, kernel scratch) is described by a
//! [`BufferRequest`]: a byte size and the inclusive range of execution steps
//! during which it is live. [`ArenaPlanner`] assigns each request an offset
//! into one shared arena so that buffers whose lifetimes overlap never share
//! bytes, while buffers with disjoint lifetimes may reuse the same region.
//!
//! # Algorithm
//!
//! Greedy first-fit by decreasing size:
//!
//! ```text
//! sort requests by (size desc, first step asc, index asc)
//! for each request:
//!     busy = already placed requests whose lifetime overlaps, by offset
//!     offset = lowest aligned gap in `busy` that fits the request
//! arena = high-water mark of offset + size, rounded to the alignment
//! ```
//!
//! The result is deterministic for a given request list.

use crate::{MemoryError, PlanStats};
use smallvec::SmallVec;
use std::fmt;
use tracing::debug;

/// Offset alignment used unless another one is requested.
pub const DEFAULT_ALIGNMENT: usize = 16;

/// One buffer that must live in the arena from step `first` to step `last`
/// (both inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRequest {
    pub size: usize,
    pub first: usize,
    pub last: usize,
}

impl BufferRequest {
    pub fn new(size: usize, first: usize, last: usize) -> Self {
        Self { size, first, last }
    }

    /// True when both buffers are live during at least one common step.
    pub fn overlaps(&self, other: &BufferRequest) -> bool {
        self.first <= other.last && other.first <= self.last
    }
}

/// A byte range inside the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slot {
    pub offset: usize,
    pub size: usize,
}

impl Slot {
    pub fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }

    /// One past the last byte.
    pub fn end(&self) -> usize {
        self.offset + self.size
    }

    /// True when the two ranges share at least one byte. Empty slots
    /// never overlap anything.
    pub fn overlaps(&self, other: &Slot) -> bool {
        self.size > 0 && other.size > 0 && self.offset < other.end() && other.offset < self.end()
    }

    pub(crate) fn bounds(&self) -> (usize, usize) {
        (self.offset, self.end())
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{})", self.offset, self.end())
    }
}

/// The outcome of planning: one slot per request, in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct ArenaPlan {
    slots: Vec<Slot>,
    arena_bytes: usize,
    stats: PlanStats,
}

impl ArenaPlan {
    /// The slot assigned to request `index`.
    pub fn slot(&self, index: usize) -> Option<Slot> {
        self.slots.get(index).copied()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Total arena size in bytes.
    pub fn arena_bytes(&self) -> usize {
        self.arena_bytes
    }

    pub fn stats(&self) -> &PlanStats {
        &self.stats
    }

    /// Checks that no two requests with overlapping lifetimes were given
    /// overlapping slots and that every slot fits the arena.
    pub fn verify(&self, requests: &[BufferRequest]) -> Result<(), MemoryError> {
        for (i, (a, sa)) in requests.iter().zip(&self.slots).enumerate() {
            if sa.end() > self.arena_bytes {
                return Err(MemoryError::OutOfBounds {
                    offset: sa.offset,
                    end: sa.end(),
                    arena_bytes: self.arena_bytes,
                });
            }
            for (b, sb) in requests.iter().zip(&self.slots).skip(i + 1) {
                if a.overlaps(b) && sa.overlaps(sb) {
                    return Err(MemoryError::Overlap {
                        first: sa.bounds(),
                        second: sb.bounds(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Assigns arena offsets to buffer requests.
#[derive(Debug, Clone, Copy)]
pub struct ArenaPlanner {
    alignment: usize,
}

impl Default for ArenaPlanner {
    fn default() -> Self {
        Self {
            alignment: DEFAULT_ALIGNMENT,
        }
    }
}

impl ArenaPlanner {
    /// Creates a planner aligning every offset to `alignment` bytes
    /// (rounded up to a power of two).
    pub fn with_alignment(alignment: usize) -> Self {
        Self {
            alignment: alignment.max(1).next_power_of_two(),
        }
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    fn align_up(&self, value: usize) -> usize {
        (value + self.alignment - 1) & !(self.alignment - 1)
    }

    /// Plans the arena for `requests`.
    pub fn plan(&self, requests: &[BufferRequest]) -> Result<ArenaPlan, MemoryError> {
        for (index, r) in requests.iter().enumerate() {
            if r.first > r.last {
                return Err(MemoryError::InvalidRequest {
                    index,
                    detail: format!("lifetime starts at step {} after it ends at {}", r.first, r.last),
                });
            }
        }

        let mut order: Vec<usize> = (0..requests.len()).collect();
        order.sort_by(|&a, &b| {
            let (ra, rb) = (&requests[a], &requests[b]);
            rb.size
                .cmp(&ra.size)
                .then(ra.first.cmp(&rb.first))
                .then(a.cmp(&b))
        });

        let mut slots = vec![Slot::default(); requests.len()];
        let mut placed: Vec<usize> = Vec::with_capacity(requests.len());
        let mut high_water = 0usize;

        for index in order {
            let request = &requests[index];
            if request.size == 0 {
                continue;
            }

            let mut busy: SmallVec<[Slot; 16]> = placed
                .iter()
                .filter(|&&p| requests[p].overlaps(request))
                .map(|&p| slots[p])
                .collect();
            busy.sort_by_key(|s| s.offset);

            let mut offset = 0usize;
            for taken in &busy {
                if offset + request.size <= taken.offset {
                    break;
                }
                offset = offset.max(self.align_up(taken.end()));
            }

            slots[index] = Slot::new(offset, request.size);
            high_water = high_water.max(offset + request.size);
            placed.push(index);
        }

        let arena_bytes = self.align_up(high_water);
        let stats = PlanStats::from_requests(requests, arena_bytes);
        debug!(
            buffers = requests.len(),
            arena_bytes,
            naive_bytes = stats.naive_bytes,
            "planned arena"
        );

        Ok(ArenaPlan {
            slots,
            arena_bytes,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn test_disjoint_lifetimes_share_memory() {
        let requests = [
            BufferRequest::new(100, 0, 1),
            BufferRequest::new(100, 2, 3),
        ];
        let plan = ArenaPlanner::default().plan(&requests).unwrap();
        assert_eq!(plan.slot(0).unwrap().offset, 0);
        assert_eq!(plan.slot(1).unwrap().offset, 0);
        assert_eq!(plan.arena_bytes(), 112);
    }

    #[test]
    fn test_overlapping_lifetimes_are_separated() {
        let requests = [
            BufferRequest::new(64, 0, 2),
            BufferRequest::new(32, 1, 3),
            BufferRequest::new(16, 2, 2),
        ];
        let plan = ArenaPlanner::default().plan(&requests).unwrap();
        assert_eq!(plan.slots(), &[Slot::new(0, 64), Slot::new(64, 32), Slot::new(96, 16)]);
        assert_eq!(plan.arena_bytes(), 112);
        plan.verify(&requests).unwrap();
    }

    #[test]
    fn test_first_fit_fills_gap() {
        // The 48-byte buffer dies before the 16-byte one is born, so the
        // small buffer reuses its bytes.
        let requests = [
            BufferRequest::new(64, 0, 4),
            BufferRequest::new(48, 0, 1),
            BufferRequest::new(64, 0, 4),
            BufferRequest::new(16, 2, 3),
        ];
        let plan = ArenaPlanner::default().plan(&requests).unwrap();
        assert_eq!(plan.slot(1).unwrap(), Slot::new(128, 48));
        assert_eq!(plan.slot(3).unwrap(), Slot::new(128, 16));
        assert_eq!(plan.arena_bytes(), 176);
    }

    #[test]
    fn test_offsets_are_aligned() {
        let requests = [
            BufferRequest::new(3, 0, 1),
            BufferRequest::new(5, 0, 1),
            BufferRequest::new(7, 0, 1),
        ];
        let plan = ArenaPlanner::with_alignment(8).plan(&requests).unwrap();
        for slot in plan.slots() {
            assert_eq!(slot.offset % 8, 0);
        }
        assert_eq!(plan.arena_bytes(), 24);
    }

    #[test]
    fn test_zero_sized_requests() {
        let requests = [BufferRequest::new(0, 0, 5), BufferRequest::new(8, 0, 5)];
        let plan = ArenaPlanner::default().plan(&requests).unwrap();
        assert_eq!(plan.slot(0).unwrap().size, 0);
        assert_eq!(plan.slot(1).unwrap().offset, 0);
    }

    #[test]
    fn test_inverted_lifetime_rejected() {
        let err = ArenaPlanner::default()
            .plan(&[BufferRequest::new(8, 3, 1)])
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidRequest { index: 0, .. }));
    }

    #[test]
    fn test_alignment_rounds_to_power_of_two() {
        assert_eq!(ArenaPlanner::with_alignment(0).alignment(), 1);
        assert_eq!(ArenaPlanner::with_alignment(12).alignment(), 16);
    }

    #[test]
    fn test_verify_detects_aliasing() {
        let requests = [BufferRequest::new(16, 0, 1), BufferRequest::new(16, 1, 2)];
        let plan = ArenaPlan {
            slots: vec![Slot::new(0, 16), Slot::new(8, 16)],
            arena_bytes: 32,
            stats: PlanStats::default(),
        };
        assert!(matches!(
            plan.verify(&requests),
            Err(MemoryError::Overlap { .. })
        ));
    }

    #[test]
    fn test_random_plans_never_alias() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..200 {
            let steps = rng.gen_range(1..20);
            let count = rng.gen_range(1..40);
            let requests: Vec<BufferRequest> = (0..count)
                .map(|_| {
                    let first = rng.gen_range(0..steps);
                    let last = rng.gen_range(first..steps);
                    BufferRequest::new(rng.gen_range(0..4096), first, last)
                })
                .collect();

            let plan = ArenaPlanner::default().plan(&requests).unwrap();
            plan.verify(&requests).unwrap();

            for (a, sa) in requests.iter().zip(plan.slots()) {
                assert_eq!(sa.offset % DEFAULT_ALIGNMENT, 0);
                for (b, sb) in requests.iter().zip(plan.slots()) {
                    if !std::ptr::eq(a, b) && a.overlaps(b) {
                        assert!(!sa.overlaps(sb), "{sa} aliases {sb}");
                    }
                }
            }
            assert!(plan.arena_bytes() >= plan.stats().peak_live_bytes);
            assert!(plan.arena_bytes() <= plan.stats().naive_bytes + DEFAULT_ALIGNMENT * count);
        }
    }
}
