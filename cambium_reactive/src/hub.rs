// Copyright 2025 the Cambium Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Change notification fan-out.
//!
//! The [`ChangeHub`] delivers [`PropertyChange`] events to subscribers. It
//! keeps one sub-hub per property, and within it the subscriber list is
//! keyed by target object, so notifying a change touches only subscribers
//! interested in exactly that (object, property) pair. Subscribers live in
//! slab slots with generation counters, and the per-target index lists are
//! pooled so churny subscribe/unsubscribe traffic does not allocate.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;
use core::hash::Hash;

use hashbrown::HashMap;
use smallvec::SmallVec;

use cambium_property::{ErasedValue, PropertyId};

use crate::precedence::ValueSource;

/// A property value change, as delivered to subscribers.
#[derive(Debug)]
pub struct PropertyChange<K> {
    /// The object whose property changed.
    pub object: K,
    /// The property that changed.
    pub property: PropertyId,
    /// The effective value before the change.
    pub old: ErasedValue,
    /// The effective value after the change.
    pub new: ErasedValue,
    /// The source the new value came from.
    pub source: ValueSource,
}

/// Callback invoked when a subscribed property changes.
pub type ChangeSubscriber<K> = Rc<dyn Fn(&PropertyChange<K>)>;

/// Identifies one subscription for later cancellation.
///
/// Slots are recycled; the generation distinguishes a live subscription
/// from a stale id whose slot has been reused.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    property: PropertyId,
    slot: u32,
    generation: u32,
}

struct SubSlot<K> {
    generation: u32,
    active: Option<(K, ChangeSubscriber<K>)>,
}

/// Subscribers for one property, indexed by target object.
struct PropertyHub<K> {
    slots: Vec<SubSlot<K>>,
    free: Vec<u32>,
    by_target: HashMap<K, Vec<u32>>,
    /// Emptied index lists waiting to be reused.
    pool: Vec<Vec<u32>>,
}

impl<K: Copy + Eq + Hash> PropertyHub<K> {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_target: HashMap::new(),
            pool: Vec::new(),
        }
    }

    fn subscribe(&mut self, target: K, subscriber: ChangeSubscriber<K>) -> (u32, u32) {
        let (slot, generation) = if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot as usize];
            entry.active = Some((target, subscriber));
            (slot, entry.generation)
        } else {
            let slot = self.slots.len();
            assert!(u32::try_from(slot).is_ok(), "Subscriber capacity exceeded");
            #[expect(clippy::cast_possible_truncation, reason = "bounds checked above")]
            let slot = slot as u32;
            self.slots.push(SubSlot {
                generation: 0,
                active: Some((target, subscriber)),
            });
            (slot, 0)
        };

        let list = self
            .by_target
            .entry(target)
            .or_insert_with(|| self.pool.pop().unwrap_or_default());
        list.push(slot);
        (slot, generation)
    }

    fn unsubscribe(&mut self, slot: u32, generation: u32) -> bool {
        let Some(entry) = self.slots.get_mut(slot as usize) else {
            return false;
        };
        if entry.generation != generation || entry.active.is_none() {
            return false;
        }
        let Some((target, _)) = entry.active.take() else {
            return false;
        };
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(slot);

        let emptied = if let Some(list) = self.by_target.get_mut(&target) {
            list.retain(|idx| *idx != slot);
            list.is_empty()
        } else {
            false
        };
        if emptied && let Some(mut list) = self.by_target.remove(&target) {
            list.clear();
            self.pool.push(list);
        }
        true
    }

    fn remove_target(&mut self, target: K) -> usize {
        let Some(mut list) = self.by_target.remove(&target) else {
            return 0;
        };
        let removed = list.len();
        for slot in &list {
            let entry = &mut self.slots[*slot as usize];
            entry.active = None;
            entry.generation = entry.generation.wrapping_add(1);
            self.free.push(*slot);
        }
        list.clear();
        self.pool.push(list);
        removed
    }
}

/// Routes property change events to their subscribers.
///
/// Notification is synchronous: every matching subscriber has run by the
/// time [`ChangeHub::notify`] returns. Callbacks are collected before they
/// are invoked, so the hub is never borrowed while a subscriber runs.
pub struct ChangeHub<K> {
    hubs: HashMap<PropertyId, PropertyHub<K>>,
}

impl<K: Copy + Eq + Hash> ChangeHub<K> {
    /// Creates a hub with no subscriptions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hubs: HashMap::new(),
        }
    }

    /// Subscribes to changes of `property` on `target`.
    pub fn subscribe(
        &mut self,
        property: PropertyId,
        target: K,
        subscriber: ChangeSubscriber<K>,
    ) -> SubscriptionId {
        let hub = self.hubs.entry(property).or_insert_with(PropertyHub::new);
        let (slot, generation) = hub.subscribe(target, subscriber);
        SubscriptionId {
            property,
            slot,
            generation,
        }
    }

    /// Cancels a subscription.
    ///
    /// Returns `false` if the id is stale: already cancelled, or its slot
    /// has been reused by a later subscription.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let Some(hub) = self.hubs.get_mut(&id.property) else {
            return false;
        };
        hub.unsubscribe(id.slot, id.generation)
    }

    /// Cancels every subscription targeting `target`, across all properties.
    ///
    /// Returns the number of subscriptions removed.
    pub fn unsubscribe_target(&mut self, target: K) -> usize {
        self.hubs
            .values_mut()
            .map(|hub| hub.remove_target(target))
            .sum()
    }

    /// Delivers a change to the subscribers watching its (object, property)
    /// pair.
    pub fn notify(&self, change: &PropertyChange<K>) {
        let Some(hub) = self.hubs.get(&change.property) else {
            return;
        };
        let Some(list) = hub.by_target.get(&change.object) else {
            return;
        };
        // Collect first so a subscriber that re-enters the owner of this hub
        // never observes it mid-iteration.
        let matching: SmallVec<[ChangeSubscriber<K>; 4]> = list
            .iter()
            .filter_map(|slot| hub.slots[*slot as usize].active.as_ref())
            .map(|(_, subscriber)| subscriber.clone())
            .collect();
        for subscriber in matching {
            subscriber(change);
        }
    }

    /// Number of live subscriptions for `property` on `target`.
    #[must_use]
    pub fn subscriber_count(&self, property: PropertyId, target: K) -> usize {
        self.hubs
            .get(&property)
            .and_then(|hub| hub.by_target.get(&target))
            .map_or(0, Vec::len)
    }

    /// Number of index lists currently parked in `property`'s pool.
    #[must_use]
    pub fn pooled_list_count(&self, property: PropertyId) -> usize {
        self.hubs.get(&property).map_or(0, |hub| hub.pool.len())
    }
}

impl<K: Copy + Eq + Hash> Default for ChangeHub<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Eq + Hash> fmt::Debug for ChangeHub<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subscribers: usize = self
            .hubs
            .values()
            .map(|hub| hub.slots.iter().filter(|s| s.active.is_some()).count())
            .sum();
        f.debug_struct("ChangeHub")
            .field("properties", &self.hubs.len())
            .field("subscribers", &subscribers)
            .finish()
    }
}
