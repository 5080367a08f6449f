// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The execution arena.
//!
//! An [`Arena`] is one zero-initialised byte buffer allocated when a plan is
//! made and never resized during execution. Kernels see it only through
//! [`Arena::bind`], which hands out shared slices for the slots a kernel
//! reads and exclusive slices for the slots it writes. Write slots must be
//! disjoint from each other and from every read slot; read slots may
//! overlap freely (the same tensor can feed two inputs of one node).
//!
//! ```text
//! arena:  [ gap | write 0 | gap | write 1 | gap ]
//!            ▲                      ▲
//!         reads are carved from the gaps left by split_at_mut
//! ```

use crate::{MemoryError, Slot};
use smallvec::SmallVec;

/// Slices bound for one kernel invocation, in the order they were requested.
pub struct ArenaBinding<'a> {
    pub reads: SmallVec<[&'a [u8]; 4]>,
    pub writes: SmallVec<[&'a mut [u8]; 2]>,
}

/// A fixed-size byte arena.
#[derive(Debug, Clone, Default)]
pub struct Arena {
    bytes: Vec<u8>,
}

impl Arena {
    /// Allocates a zeroed arena of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn check(&self, slot: &Slot) -> Result<(), MemoryError> {
        if slot.end() > self.bytes.len() {
            return Err(MemoryError::OutOfBounds {
                offset: slot.offset,
                end: slot.end(),
                arena_bytes: self.bytes.len(),
            });
        }
        Ok(())
    }

    /// Shared view of one slot.
    pub fn slot(&self, slot: Slot) -> Result<&[u8], MemoryError> {
        self.check(&slot)?;
        Ok(&self.bytes[slot.offset..slot.end()])
    }

    /// Exclusive view of one slot.
    pub fn slot_mut(&mut self, slot: Slot) -> Result<&mut [u8], MemoryError> {
        self.check(&slot)?;
        Ok(&mut self.bytes[slot.offset..slot.end()])
    }

    /// Binds `reads` as shared slices and `writes` as exclusive slices at
    /// the same time.
    pub fn bind(&mut self, reads: &[Slot], writes: &[Slot]) -> Result<ArenaBinding<'_>, MemoryError> {
        for slot in reads.iter().chain(writes) {
            self.check(slot)?;
        }
        for (i, w) in writes.iter().enumerate() {
            if let Some(other) = writes[i + 1..]
                .iter()
                .chain(reads)
                .find(|other| w.overlaps(other))
            {
                return Err(MemoryError::Overlap {
                    first: w.bounds(),
                    second: other.bounds(),
                });
            }
        }

        let arena_bytes = self.bytes.len();
        let mut order: SmallVec<[usize; 4]> =
            (0..writes.len()).filter(|&i| writes[i].size > 0).collect();
        order.sort_by_key(|&i| writes[i].offset);

        let mut carved: SmallVec<[&mut [u8]; 2]> =
            (0..writes.len()).map(|_| <&mut [u8]>::default()).collect();
        let mut gaps: SmallVec<[(usize, &[u8]); 8]> = SmallVec::new();
        let mut rest: &mut [u8] = &mut self.bytes;
        let mut cursor = 0usize;

        for i in order {
            let w = writes[i];
            let (gap, tail) = std::mem::take(&mut rest).split_at_mut(w.offset - cursor);
            let (region, tail) = tail.split_at_mut(w.size);
            gaps.push((cursor, &*gap));
            carved[i] = region;
            rest = tail;
            cursor = w.end();
        }
        gaps.push((cursor, &*rest));

        let mut bound_reads = SmallVec::with_capacity(reads.len());
        for r in reads {
            if r.size == 0 {
                bound_reads.push(<&[u8]>::default());
                continue;
            }
            let (start, gap) = gaps
                .iter()
                .copied()
                .find(|&(start, gap)| start <= r.offset && r.end() <= start + gap.len())
                .ok_or(MemoryError::OutOfBounds {
                    offset: r.offset,
                    end: r.end(),
                    arena_bytes,
                })?;
            bound_reads.push(&gap[r.offset - start..r.end() - start]);
        }

        Ok(ArenaBinding {
            reads: bound_reads,
            writes: carved,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_access() {
        let mut arena = Arena::new(32);
        arena.slot_mut(Slot::new(8, 4)).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(arena.slot(Slot::new(8, 4)).unwrap(), &[1, 2, 3, 4]);
        assert!(arena.slot(Slot::new(30, 4)).is_err());
    }

    #[test]
    fn test_bind_reads_and_writes() {
        let mut arena = Arena::new(64);
        arena.slot_mut(Slot::new(0, 4)).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        arena.slot_mut(Slot::new(48, 2)).unwrap().copy_from_slice(&[9, 9]);

        {
            let binding = arena
                .bind(
                    &[Slot::new(0, 4), Slot::new(48, 2), Slot::new(0, 4)],
                    &[Slot::new(32, 8), Slot::new(16, 4)],
                )
                .unwrap();
            assert_eq!(binding.reads[0], &[1, 2, 3, 4]);
            assert_eq!(binding.reads[1], &[9, 9]);
            assert_eq!(binding.reads[2], &[1, 2, 3, 4]);
            assert_eq!(binding.writes[0].len(), 8);
            assert_eq!(binding.writes[1].len(), 4);

            let ArenaBinding { mut writes, .. } = binding;
            writes[0].fill(7);
            writes[1].fill(5);
        }
        assert_eq!(arena.slot(Slot::new(32, 8)).unwrap(), &[7; 8]);
        assert_eq!(arena.slot(Slot::new(16, 4)).unwrap(), &[5; 4]);
    }

    #[test]
    fn test_bind_rejects_write_overlapping_read() {
        let mut arena = Arena::new(64);
        let err = arena
            .bind(&[Slot::new(0, 16)], &[Slot::new(8, 16)])
            .err()
            .unwrap();
        assert!(matches!(err, MemoryError::Overlap { first: (8, 24), second: (0, 16) }));
    }

    #[test]
    fn test_bind_rejects_overlapping_writes() {
        let mut arena = Arena::new(64);
        assert!(arena.bind(&[], &[Slot::new(0, 16), Slot::new(15, 4)]).is_err());
    }

    #[test]
    fn test_bind_out_of_bounds() {
        let mut arena = Arena::new(16);
        assert!(matches!(
            arena.bind(&[Slot::new(8, 16)], &[]).err().unwrap(),
            MemoryError::OutOfBounds { arena_bytes: 16, .. }
        ));
    }

    #[test]
    fn test_bind_empty_slots() {
        let mut arena = Arena::new(16);
        let binding = arena
            .bind(&[Slot::new(4, 0)], &[Slot::new(0, 16), Slot::new(8, 0)])
            .unwrap();
        assert!(binding.reads[0].is_empty());
        assert_eq!(binding.writes[0].len(), 16);
        assert!(binding.writes[1].is_empty());
    }
}
