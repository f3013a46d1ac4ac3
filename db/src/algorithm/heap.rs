//! Binary min-heap over TTL deadlines, addressable by position. Every time
//! an item moves, `set_pos` is invoked with the owning entry's slot and the
//! item's new index, so the owner always knows where its deadline sits and
//! can be updated or deleted in O(log n).

use crate::algorithm::dict::SlotId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HeapItem {
    /// Absolute deadline in monotonic milliseconds.
    pub(crate) deadline: u64,
    /// Keyspace slot of the owning entry.
    pub(crate) entry: SlotId,
}

fn parent(pos: usize) -> usize {
    (pos + 1) / 2 - 1
}

fn left(pos: usize) -> usize {
    pos * 2 + 1
}

fn right(pos: usize) -> usize {
    pos * 2 + 2
}

fn sift_up(heap: &mut [HeapItem], mut pos: usize, set_pos: &mut impl FnMut(SlotId, usize)) {
    let item = heap[pos];
    while pos > 0 && heap[parent(pos)].deadline > item.deadline {
        heap[pos] = heap[parent(pos)];
        set_pos(heap[pos].entry, pos);
        pos = parent(pos);
    }
    heap[pos] = item;
    set_pos(item.entry, pos);
}

fn sift_down(heap: &mut [HeapItem], mut pos: usize, set_pos: &mut impl FnMut(SlotId, usize)) {
    let item = heap[pos];
    loop {
        let mut min_pos = pos;
        let mut min_deadline = item.deadline;
        if left(pos) < heap.len() && heap[left(pos)].deadline < min_deadline {
            min_pos = left(pos);
            min_deadline = heap[left(pos)].deadline;
        }
        if right(pos) < heap.len() && heap[right(pos)].deadline < min_deadline {
            min_pos = right(pos);
        }
        if min_pos == pos {
            break;
        }
        heap[pos] = heap[min_pos];
        set_pos(heap[pos].entry, pos);
        pos = min_pos;
    }
    heap[pos] = item;
    set_pos(item.entry, pos);
}

/// Restores the heap property around `pos` after its deadline changed.
pub(crate) fn update(heap: &mut [HeapItem], pos: usize, set_pos: &mut impl FnMut(SlotId, usize)) {
    if pos > 0 && heap[parent(pos)].deadline > heap[pos].deadline {
        sift_up(heap, pos, set_pos);
    } else {
        sift_down(heap, pos, set_pos);
    }
}

/// Replaces the item at `pos` in place, or appends when `pos` is vacant.
pub(crate) fn upsert(
    heap: &mut Vec<HeapItem>,
    pos: Option<usize>,
    item: HeapItem,
    set_pos: &mut impl FnMut(SlotId, usize),
) {
    let pos = match pos {
        Some(pos) if pos < heap.len() => {
            heap[pos] = item;
            pos
        }
        _ => {
            heap.push(item);
            heap.len() - 1
        }
    };
    update(heap, pos, set_pos);
}

/// Removes the item at `pos` by swapping in the tail.
pub(crate) fn delete(
    heap: &mut Vec<HeapItem>,
    pos: usize,
    set_pos: &mut impl FnMut(SlotId, usize),
) {
    heap.swap_remove(pos);
    if pos < heap.len() {
        update(heap, pos, set_pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::prelude::*;

    /// Heap plus the position table the `set_pos` callback maintains,
    /// mirroring how the keyspace stores heap indices on its entries.
    #[derive(Default)]
    struct Harness {
        heap: Vec<HeapItem>,
        positions: Vec<Option<usize>>,
    }

    impl Harness {
        fn upsert(&mut self, entry: SlotId, deadline: u64) {
            if self.positions.len() <= entry {
                self.positions.resize(entry + 1, None);
            }
            let positions = &mut self.positions;
            upsert(
                &mut self.heap,
                positions[entry],
                HeapItem { deadline, entry },
                &mut |e, p| positions[e] = Some(p),
            );
        }

        fn delete(&mut self, entry: SlotId) {
            let pos = self.positions[entry].expect("entry has no heap slot");
            let positions = &mut self.positions;
            delete(&mut self.heap, pos, &mut |e, p| positions[e] = Some(p));
            positions[entry] = None;
        }

        fn verify(&self) {
            for pos in 1..self.heap.len() {
                assert!(self.heap[parent(pos)].deadline <= self.heap[pos].deadline);
            }
            for (pos, item) in self.heap.iter().enumerate() {
                assert_eq!(self.positions[item.entry], Some(pos));
            }
            let live = self.positions.iter().filter(|p| p.is_some()).count();
            assert_eq!(live, self.heap.len());
        }
    }

    #[test]
    fn min_is_kept_at_the_root() {
        let mut harness = Harness::default();
        for (entry, deadline) in [(0, 50u64), (1, 10), (2, 30), (3, 5), (4, 40)] {
            harness.upsert(entry, deadline);
            harness.verify();
        }
        assert_eq!(harness.heap[0].deadline, 5);
    }

    #[test]
    fn update_in_place_resifts() {
        let mut harness = Harness::default();
        for entry in 0..10u64 {
            harness.upsert(entry as usize, entry * 10);
        }
        harness.upsert(9, 1); // tail moves to the root
        harness.verify();
        assert_eq!(harness.heap[0].entry, 9);
        harness.upsert(9, 1000); // and sinks back down
        harness.verify();
        assert_eq!(harness.heap[0].entry, 0);
    }

    #[test]
    fn delete_keeps_back_references_consistent() {
        let mut harness = Harness::default();
        for entry in 0..20usize {
            harness.upsert(entry, 100 - entry as u64);
        }
        for entry in [3usize, 19, 0, 7] {
            harness.delete(entry);
            harness.verify();
        }
        assert_eq!(harness.heap.len(), 16);
    }

    #[test]
    fn random_operations_hold_the_invariants() {
        let mut rng = StdRng::seed_from_u64(0x8ea9);
        let mut harness = Harness::default();
        for _ in 0..500 {
            let entry = rng.gen_range(0..40usize);
            let has_slot = harness.positions.get(entry).copied().flatten().is_some();
            if has_slot && rng.gen_bool(0.4) {
                harness.delete(entry);
            } else {
                harness.upsert(entry, rng.gen_range(0..1_000u64));
            }
            harness.verify();
        }
    }
}
