// Copyright 2025 the Cambium Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Digest cycles and the scheduler that drives them.
//!
//! Bound properties have no way to observe plain sources, so the engine
//! checks them for changes in periodic sweeps called digests. The
//! [`DigestScheduler`] tracks which cells need that treatment (bound and not
//! covered by push notification), assigns each sweep a monotonically
//! increasing [`DigestId`], and collects the push notifications raised by
//! instrumented sources between sweeps so they can be digested without
//! waiting for the next full sweep.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::hash::Hash;

use hashbrown::HashSet;

use cambium_property::PropertyId;

/// Identifier of a digest cycle.
///
/// Ids increase monotonically over the life of a scheduler. A cell's
/// last-changed id can be compared against the current cycle to answer
/// "did this change this tick" in O(1).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DigestId(u64);

impl DigestId {
    /// The id before any sweep has run.
    pub const ZERO: Self = Self(0);

    /// The id of the cycle after this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Digest marks raised by push notifications, waiting to be flushed.
///
/// Shared between the scheduler and the watch callbacks installed on
/// instrumented sources. Marks are deduplicated, so a burst of notifications
/// for one cell flushes as a single digest.
#[derive(Debug)]
pub(crate) struct PendingDigests<K> {
    queue: Vec<(K, PropertyId)>,
    seen: HashSet<(K, PropertyId)>,
}

impl<K: Copy + Eq + Hash> PendingDigests<K> {
    fn new() -> Self {
        Self {
            queue: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub(crate) fn mark(&mut self, object: K, property: PropertyId) {
        if self.seen.insert((object, property)) {
            self.queue.push((object, property));
        }
    }

    fn drain_into(&mut self, out: &mut Vec<(K, PropertyId)>) -> bool {
        if self.queue.is_empty() {
            return false;
        }
        out.append(&mut self.queue);
        self.seen.clear();
        true
    }
}

/// Tracks which cells take part in digest sweeps and numbers the sweeps.
///
/// A cell is enrolled when its property is bound to a source the engine
/// cannot observe; cells covered by push notification are deliberately not
/// enrolled, since their sources tell the engine when to look. The scheduler
/// holds no cells itself; the engine asks for the sweep list each tick and
/// digests the cells it names.
#[derive(Debug)]
pub struct DigestScheduler<K> {
    cycle: DigestId,
    in_sweep: bool,
    enrolled: HashSet<(K, PropertyId)>,
    pending: Rc<RefCell<PendingDigests<K>>>,
}

impl<K: Copy + Eq + Hash> DigestScheduler<K> {
    /// Creates a scheduler with no enrolled cells.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cycle: DigestId::ZERO,
            in_sweep: false,
            enrolled: HashSet::new(),
            pending: Rc::new(RefCell::new(PendingDigests::new())),
        }
    }

    /// The id of the current sweep, or of the last completed one when idle.
    #[must_use]
    pub fn current_cycle(&self) -> DigestId {
        self.cycle
    }

    /// Returns `true` while a sweep is in progress.
    #[must_use]
    pub fn in_sweep(&self) -> bool {
        self.in_sweep
    }

    /// The id a change detected right now should be stamped with.
    ///
    /// During a sweep this is the sweep's own id. Between sweeps it is the
    /// id the next sweep will take, so that immediate digests group with the
    /// tick that follows them. Stamps never decrease.
    #[must_use]
    pub fn stamp(&self) -> DigestId {
        if self.in_sweep {
            self.cycle
        } else {
            self.cycle.next()
        }
    }

    /// Adds a cell to the sweep list.
    pub fn enroll(&mut self, object: K, property: PropertyId) {
        self.enrolled.insert((object, property));
    }

    /// Removes a cell from the sweep list.
    pub fn withdraw(&mut self, object: K, property: PropertyId) {
        self.enrolled.remove(&(object, property));
    }

    /// Removes every cell belonging to the given object from the sweep list.
    pub fn withdraw_object(&mut self, object: K) {
        self.enrolled.retain(|(k, _)| *k != object);
    }

    /// Returns `true` if the cell is on the sweep list.
    #[must_use]
    pub fn is_enrolled(&self, object: K, property: PropertyId) -> bool {
        self.enrolled.contains(&(object, property))
    }

    /// Number of cells on the sweep list.
    #[must_use]
    pub fn enrolled_count(&self) -> usize {
        self.enrolled.len()
    }

    /// Copies the sweep list into `out`.
    ///
    /// The engine iterates a snapshot because digesting a cell may enroll or
    /// withdraw others through change callbacks.
    pub fn sweep_list(&self, out: &mut Vec<(K, PropertyId)>) {
        out.extend(self.enrolled.iter().copied());
    }

    /// Starts a new sweep and returns its id.
    ///
    /// # Panics
    ///
    /// Panics if a sweep is already in progress. Digests are not reentrant;
    /// value writes made from change callbacks digest their own cell
    /// immediately instead of starting a nested sweep.
    pub fn begin_sweep(&mut self) -> DigestId {
        assert!(!self.in_sweep, "A digest sweep is already in progress");
        self.cycle = self.cycle.next();
        self.in_sweep = true;
        self.cycle
    }

    /// Marks the current sweep as finished.
    pub fn end_sweep(&mut self) {
        self.in_sweep = false;
    }

    /// Queues a cell for an out-of-sweep digest.
    ///
    /// Called by push-notification watchers when an instrumented source
    /// changes. Marks are deduplicated until drained.
    pub fn mark_pushed(&self, object: K, property: PropertyId) {
        self.pending.borrow_mut().mark(object, property);
    }

    /// Returns `true` if any push marks are waiting to be flushed.
    #[must_use]
    pub fn has_pushed(&self) -> bool {
        !self.pending.borrow().queue.is_empty()
    }

    /// Moves all queued push marks into `out`.
    ///
    /// Returns `false` if the queue was empty. Draining resets deduplication,
    /// so a source change during the flush queues a fresh mark.
    pub fn drain_pushed(&mut self, out: &mut Vec<(K, PropertyId)>) -> bool {
        self.pending.borrow_mut().drain_into(out)
    }

    /// A handle the engine embeds in watch callbacks to queue push marks.
    pub(crate) fn pending_handle(&self) -> Rc<RefCell<PendingDigests<K>>> {
        Rc::clone(&self.pending)
    }
}

impl<K: Copy + Eq + Hash> Default for DigestScheduler<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use cambium_property::{PropertyMetadataBuilder, PropertyRegistry};

    fn property() -> PropertyId {
        let mut registry = PropertyRegistry::new();
        let visual = registry.register_type("Visual", None);
        registry
            .register("Width", visual, PropertyMetadataBuilder::new(0.0_f64).build())
            .id()
    }

    #[test]
    fn stamps_group_with_the_upcoming_sweep() {
        let mut scheduler = DigestScheduler::<u32>::new();
        assert_eq!(scheduler.current_cycle(), DigestId::ZERO);

        // Idle stamps take the id the next sweep will use.
        let idle_stamp = scheduler.stamp();
        assert_eq!(idle_stamp, DigestId::ZERO.next());

        let sweep = scheduler.begin_sweep();
        assert_eq!(sweep, idle_stamp);
        assert_eq!(scheduler.stamp(), sweep);
        scheduler.end_sweep();

        // After the sweep, stamps move on to the following cycle.
        assert!(scheduler.stamp() > sweep);
    }

    #[test]
    fn cycle_ids_increase_monotonically() {
        let mut scheduler = DigestScheduler::<u32>::new();
        let mut last = scheduler.current_cycle();
        for _ in 0..3 {
            let id = scheduler.begin_sweep();
            assert!(id > last);
            scheduler.end_sweep();
            last = id;
        }
    }

    #[test]
    fn enrollment_roundtrip() {
        let width = property();
        let mut scheduler = DigestScheduler::<u32>::new();

        scheduler.enroll(1, width);
        scheduler.enroll(2, width);
        assert!(scheduler.is_enrolled(1, width));
        assert_eq!(scheduler.enrolled_count(), 2);

        scheduler.withdraw(1, width);
        assert!(!scheduler.is_enrolled(1, width));
        assert!(scheduler.is_enrolled(2, width));

        scheduler.withdraw_object(2);
        assert_eq!(scheduler.enrolled_count(), 0);
    }

    #[test]
    fn sweep_list_is_a_snapshot() {
        let width = property();
        let mut scheduler = DigestScheduler::<u32>::new();
        scheduler.enroll(1, width);
        scheduler.enroll(2, width);

        let mut list = alloc::vec::Vec::new();
        scheduler.sweep_list(&mut list);
        assert_eq!(list.len(), 2);

        // Withdrawing after the snapshot does not disturb the list.
        scheduler.withdraw(1, width);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn push_marks_deduplicate_until_drained() {
        let width = property();
        let mut scheduler = DigestScheduler::<u32>::new();

        scheduler.mark_pushed(1, width);
        scheduler.mark_pushed(1, width);
        scheduler.mark_pushed(2, width);
        assert!(scheduler.has_pushed());

        let mut out = alloc::vec::Vec::new();
        assert!(scheduler.drain_pushed(&mut out));
        assert_eq!(out.len(), 2);
        assert!(!scheduler.has_pushed());

        // Draining resets deduplication.
        scheduler.mark_pushed(1, width);
        out.clear();
        assert!(scheduler.drain_pushed(&mut out));
        assert_eq!(out, alloc::vec![(1, width)]);

        out.clear();
        assert!(!scheduler.drain_pushed(&mut out));
    }

    #[test]
    #[should_panic(expected = "A digest sweep is already in progress")]
    fn nested_sweeps_panic() {
        let mut scheduler = DigestScheduler::<u32>::new();
        scheduler.begin_sweep();
        scheduler.begin_sweep();
    }
}
