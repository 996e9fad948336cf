// Copyright 2025 the Cambium Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layout and render invalidation queues.
//!
//! Property metadata can flag a property as affecting measure, arrange, or
//! visual bounds. When such a property changes, the engine marks the owning
//! object here; the host drains the queues once per tick and re-runs the
//! corresponding layout passes. Marks are deduplicated, so an object whose
//! flagged properties change several times in one tick is enqueued once.

use core::hash::Hash;

use hashbrown::HashSet;

use cambium_property::PropertyOptions;

/// Deduplicated sets of objects needing layout or render work.
#[derive(Debug)]
pub struct InvalidationSet<K> {
    measure: HashSet<K>,
    arrange: HashSet<K>,
    visual_bounds: HashSet<K>,
}

impl<K: Copy + Eq + Hash> InvalidationSet<K> {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            measure: HashSet::new(),
            arrange: HashSet::new(),
            visual_bounds: HashSet::new(),
        }
    }

    /// Marks `object` in every queue named by `options`.
    pub fn mark(&mut self, options: PropertyOptions, object: K) {
        if options.contains(PropertyOptions::AFFECTS_MEASURE) {
            self.measure.insert(object);
        }
        if options.contains(PropertyOptions::AFFECTS_ARRANGE) {
            self.arrange.insert(object);
        }
        if options.contains(PropertyOptions::AFFECTS_VISUAL_BOUNDS) {
            self.visual_bounds.insert(object);
        }
    }

    /// Returns `true` if `object` is queued for measure.
    #[must_use]
    pub fn needs_measure(&self, object: K) -> bool {
        self.measure.contains(&object)
    }

    /// Returns `true` if `object` is queued for arrange.
    #[must_use]
    pub fn needs_arrange(&self, object: K) -> bool {
        self.arrange.contains(&object)
    }

    /// Returns `true` if `object` is queued for a visual bounds update.
    #[must_use]
    pub fn needs_visual_update(&self, object: K) -> bool {
        self.visual_bounds.contains(&object)
    }

    /// Number of objects queued for measure.
    #[must_use]
    pub fn measure_count(&self) -> usize {
        self.measure.len()
    }

    /// Number of objects queued for arrange.
    #[must_use]
    pub fn arrange_count(&self) -> usize {
        self.arrange.len()
    }

    /// Number of objects queued for visual bounds updates.
    #[must_use]
    pub fn visual_bounds_count(&self) -> usize {
        self.visual_bounds.len()
    }

    /// Removes and yields every object queued for measure.
    pub fn drain_measure(&mut self) -> impl Iterator<Item = K> + '_ {
        self.measure.drain()
    }

    /// Removes and yields every object queued for arrange.
    pub fn drain_arrange(&mut self) -> impl Iterator<Item = K> + '_ {
        self.arrange.drain()
    }

    /// Removes and yields every object queued for visual bounds updates.
    pub fn drain_visual_bounds(&mut self) -> impl Iterator<Item = K> + '_ {
        self.visual_bounds.drain()
    }

    /// Empties all three queues.
    pub fn clear(&mut self) {
        self.measure.clear();
        self.arrange.clear();
        self.visual_bounds.clear();
    }

    /// Returns `true` if no object is queued anywhere.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.measure.is_empty() && self.arrange.is_empty() && self.visual_bounds.is_empty()
    }
}

impl<K: Copy + Eq + Hash> Default for InvalidationSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn marks_route_by_option_flags() {
        let mut set = InvalidationSet::new();

        set.mark(PropertyOptions::AFFECTS_MEASURE, 1_u32);
        set.mark(PropertyOptions::AFFECTS_ARRANGE, 2);
        set.mark(PropertyOptions::AFFECTS_VISUAL_BOUNDS, 3);

        assert!(set.needs_measure(1));
        assert!(!set.needs_arrange(1));
        assert!(set.needs_arrange(2));
        assert!(set.needs_visual_update(3));
        assert!(!set.needs_measure(3));
    }

    #[test]
    fn combined_flags_mark_every_named_queue() {
        let mut set = InvalidationSet::new();
        set.mark(
            PropertyOptions::AFFECTS_MEASURE | PropertyOptions::AFFECTS_ARRANGE,
            7_u32,
        );
        assert!(set.needs_measure(7));
        assert!(set.needs_arrange(7));
        assert!(!set.needs_visual_update(7));
    }

    #[test]
    fn empty_options_mark_nothing() {
        let mut set = InvalidationSet::new();
        set.mark(PropertyOptions::default(), 1_u32);
        assert!(set.is_empty());
    }

    #[test]
    fn repeated_marks_deduplicate() {
        let mut set = InvalidationSet::new();
        for _ in 0..5 {
            set.mark(PropertyOptions::AFFECTS_MEASURE, 1_u32);
        }
        assert_eq!(set.measure_count(), 1);
    }

    #[test]
    fn drain_empties_one_queue() {
        let mut set = InvalidationSet::new();
        set.mark(PropertyOptions::AFFECTS_MEASURE, 1_u32);
        set.mark(PropertyOptions::AFFECTS_MEASURE, 2);
        set.mark(PropertyOptions::AFFECTS_ARRANGE, 3);

        let drained: Vec<_> = set.drain_measure().collect();
        assert_eq!(drained.len(), 2);
        assert!(drained.contains(&1));
        assert!(drained.contains(&2));

        assert_eq!(set.measure_count(), 0);
        assert!(set.needs_arrange(3));
    }

    #[test]
    fn clear_empties_everything() {
        let mut set = InvalidationSet::new();
        set.mark(
            PropertyOptions::AFFECTS_MEASURE
                | PropertyOptions::AFFECTS_ARRANGE
                | PropertyOptions::AFFECTS_VISUAL_BOUNDS,
            1_u32,
        );
        assert!(!set.is_empty());
        set.clear();
        assert!(set.is_empty());
    }
}
