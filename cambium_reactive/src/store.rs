// Copyright 2025 the Cambium Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-object sparse storage for source layers.
//!
//! This module provides [`SourceLayers`] for storing the per-source property
//! values of a single object, using sparse storage to minimize memory for
//! objects with few properties set.
//!
//! # Implementation
//!
//! Following the `WinUI` approach, each layer is a sorted vector with binary
//! search rather than a hash map. This provides:
//!
//! - Better cache locality (contiguous memory)
//! - Lower memory overhead (no hash buckets)
//! - O(log n) lookup, which is fast for typical property counts (5-20)
//! - Inline storage for small property sets via `SmallVec`
//!
//! # Scope
//!
//! `SourceLayers` handles **storage and layer precedence only**. Bound values
//! live on the binding that produces them, defaults live in the registry, and
//! change detection belongs to the engine (see `engine`).

use smallvec::SmallVec;

use cambium_property::{ErasedValue, OwnerTypeId, PropertyId, PropertyRegistry};

use crate::precedence::{SourceLayer, ValueSource};

/// Inline capacity for the local layer.
///
/// Most UI objects have fewer than 8 non-default local values set,
/// so this avoids heap allocation in the common case.
const LOCAL_INLINE: usize = 8;

/// Inline capacity for the styled layer.
const STYLED_INLINE: usize = 4;

/// Inline capacity for the sparse layers (triggered, inherited, animated).
///
/// These layers are empty on most objects; a single inline slot keeps the
/// one-entry case allocation-free without growing the struct much.
const SPARSE_INLINE: usize = 1;

type Entries<const N: usize> = SmallVec<[(PropertyId, ErasedValue); N]>;

/// Per-object sparse storage for source-layer values.
///
/// One value slot per (layer, property) pair, kept sorted by [`PropertyId`]
/// for binary-search lookup. Values are stored exactly as written; coercion
/// and precedence resolution happen when the effective value is computed.
#[derive(Clone, Debug, Default)]
pub struct SourceLayers {
    local: Entries<LOCAL_INLINE>,
    styled: Entries<STYLED_INLINE>,
    triggered: Entries<SPARSE_INLINE>,
    inherited: Entries<SPARSE_INLINE>,
    animated: Entries<SPARSE_INLINE>,
}

#[inline]
fn find_entry(entries: &[(PropertyId, ErasedValue)], id: PropertyId) -> Result<usize, usize> {
    entries.binary_search_by_key(&id, |(pid, _)| *pid)
}

fn set_entry<A>(entries: &mut SmallVec<A>, id: PropertyId, value: ErasedValue) -> Option<ErasedValue>
where
    A: smallvec::Array<Item = (PropertyId, ErasedValue)>,
{
    match find_entry(entries, id) {
        Ok(idx) => Some(core::mem::replace(&mut entries[idx].1, value)),
        Err(idx) => {
            entries.insert(idx, (id, value));
            None
        }
    }
}

fn clear_entry<A>(entries: &mut SmallVec<A>, id: PropertyId) -> Option<ErasedValue>
where
    A: smallvec::Array<Item = (PropertyId, ErasedValue)>,
{
    match find_entry(entries, id) {
        Ok(idx) => Some(entries.remove(idx).1),
        Err(_) => None,
    }
}

impl SourceLayers {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no layer holds any value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
            && self.styled.is_empty()
            && self.triggered.is_empty()
            && self.inherited.is_empty()
            && self.animated.is_empty()
    }

    /// Returns the number of distinct properties with at least one stored value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.property_ids().len()
    }

    /// Returns the distinct property IDs with at least one stored value,
    /// in ascending order.
    #[must_use]
    pub fn property_ids(&self) -> SmallVec<[PropertyId; LOCAL_INLINE]> {
        let mut ids: SmallVec<[PropertyId; LOCAL_INLINE]> = SmallVec::new();
        for entries in self.slices() {
            for (id, _) in entries {
                if let Err(idx) = ids.binary_search(id) {
                    ids.insert(idx, *id);
                }
            }
        }
        ids
    }

    /// Returns the property IDs stored in one layer, in ascending order.
    #[must_use]
    pub fn ids_in(&self, layer: SourceLayer) -> SmallVec<[PropertyId; LOCAL_INLINE]> {
        self.entries(layer).iter().map(|(id, _)| *id).collect()
    }

    fn slices(&self) -> [&[(PropertyId, ErasedValue)]; 5] {
        [
            &self.local,
            &self.styled,
            &self.triggered,
            &self.inherited,
            &self.animated,
        ]
    }

    fn entries(&self, layer: SourceLayer) -> &[(PropertyId, ErasedValue)] {
        match layer {
            SourceLayer::Local => &self.local,
            SourceLayer::Styled => &self.styled,
            SourceLayer::Triggered => &self.triggered,
            SourceLayer::Inherited => &self.inherited,
            SourceLayer::Animated => &self.animated,
        }
    }

    /// Gets the stored value in the given layer, if set.
    #[must_use]
    pub fn get(&self, layer: SourceLayer, id: PropertyId) -> Option<&ErasedValue> {
        let entries = self.entries(layer);
        find_entry(entries, id).ok().map(|idx| &entries[idx].1)
    }

    /// Returns `true` if the given layer holds a value for the property.
    #[must_use]
    pub fn has(&self, layer: SourceLayer, id: PropertyId) -> bool {
        find_entry(self.entries(layer), id).is_ok()
    }

    /// Stores a value in the given layer, returning the previous value if any.
    pub fn set(
        &mut self,
        layer: SourceLayer,
        id: PropertyId,
        value: ErasedValue,
    ) -> Option<ErasedValue> {
        match layer {
            SourceLayer::Local => set_entry(&mut self.local, id, value),
            SourceLayer::Styled => set_entry(&mut self.styled, id, value),
            SourceLayer::Triggered => set_entry(&mut self.triggered, id, value),
            SourceLayer::Inherited => set_entry(&mut self.inherited, id, value),
            SourceLayer::Animated => set_entry(&mut self.animated, id, value),
        }
    }

    /// Removes the value in the given layer, returning it if it was set.
    pub fn clear(&mut self, layer: SourceLayer, id: PropertyId) -> Option<ErasedValue> {
        match layer {
            SourceLayer::Local => clear_entry(&mut self.local, id),
            SourceLayer::Styled => clear_entry(&mut self.styled, id),
            SourceLayer::Triggered => clear_entry(&mut self.triggered, id),
            SourceLayer::Inherited => clear_entry(&mut self.inherited, id),
            SourceLayer::Animated => clear_entry(&mut self.animated, id),
        }
    }

    /// Returns the strongest stored base value for a property.
    ///
    /// The base value is whichever of Local, Triggered, or Styled is set,
    /// in that precedence order. Animation, inheritance, bindings, and
    /// defaults are not base values and are resolved separately.
    #[must_use]
    pub fn base(&self, id: PropertyId) -> Option<(ValueSource, &ErasedValue)> {
        for layer in [SourceLayer::Local, SourceLayer::Triggered, SourceLayer::Styled] {
            if let Some(value) = self.get(layer, id) {
                return Some((layer.as_source(), value));
            }
        }
        None
    }

    /// Returns `true` if the object itself provides a value for the property,
    /// through any layer other than the inherited one.
    ///
    /// An object with an own value shadows inherited values for that property.
    #[must_use]
    pub fn shadows_inherited(&self, id: PropertyId) -> bool {
        self.base(id).is_some() || self.has(SourceLayer::Animated, id)
    }

    /// Clears all animation values across all properties.
    ///
    /// Returns the number of animation values removed.
    pub fn clear_animations(&mut self) -> usize {
        let len = self.animated.len();
        self.animated.clear();
        len
    }
}

/// Resolves the effective value of a property from stored layers alone.
///
/// Precedence is animated over the strongest base (local, triggered, styled),
/// over inherited, over the default from the owner type's effective metadata.
/// The winning value is passed through the coerce callback when the source
/// calls for it. Bound values are not visible here; properties with an active
/// binding are resolved through their cell instead.
pub(crate) fn resolve_effective(
    registry: &PropertyRegistry,
    owner: OwnerTypeId,
    property: PropertyId,
    layers: &SourceLayers,
) -> (ValueSource, ErasedValue) {
    let (source, value) = if let Some(animated) = layers.get(SourceLayer::Animated, property) {
        (ValueSource::Animated, animated.clone_value())
    } else if let Some((source, base)) = layers.base(property) {
        (source, base.clone_value())
    } else if let Some(inherited) = layers.get(SourceLayer::Inherited, property) {
        (ValueSource::Inherited, inherited.clone_value())
    } else {
        (
            ValueSource::Default,
            registry.default_value_for_owner(property, owner),
        )
    };

    if source.is_coerced() {
        (source, registry.coerce_for_owner(property, owner, value))
    } else {
        (source, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use cambium_property::{Property, PropertyMetadataBuilder};

    fn setup() -> (PropertyRegistry, OwnerTypeId, Property<f64>, Property<i32>) {
        let mut registry = PropertyRegistry::new();
        let visual = registry.register_type("Visual", None);
        let width = registry.register("Width", visual, PropertyMetadataBuilder::new(0.0_f64).build());
        let count = registry.register("Count", visual, PropertyMetadataBuilder::new(0_i32).build());
        (registry, visual, width, count)
    }

    #[test]
    fn empty_layers() {
        let layers = SourceLayers::new();
        assert!(layers.is_empty());
        assert_eq!(layers.len(), 0);
        assert!(layers.property_ids().is_empty());
    }

    #[test]
    fn set_get_clear_roundtrip() {
        let (_, _, width, _) = setup();
        let mut layers = SourceLayers::new();

        assert!(layers.get(SourceLayer::Local, width.id()).is_none());

        let old = layers.set(SourceLayer::Local, width.id(), ErasedValue::new(100.0_f64));
        assert!(old.is_none());
        let stored = layers.get(SourceLayer::Local, width.id()).unwrap();
        assert_eq!(stored.downcast_ref::<f64>(), Some(&100.0));

        let old = layers.set(SourceLayer::Local, width.id(), ErasedValue::new(150.0_f64));
        assert_eq!(old.unwrap().downcast_ref::<f64>(), Some(&100.0));

        let removed = layers.clear(SourceLayer::Local, width.id());
        assert_eq!(removed.unwrap().downcast_ref::<f64>(), Some(&150.0));
        assert!(layers.clear(SourceLayer::Local, width.id()).is_none());
        assert!(layers.is_empty());
    }

    #[test]
    fn layers_are_independent() {
        let (_, _, width, _) = setup();
        let mut layers = SourceLayers::new();

        layers.set(SourceLayer::Local, width.id(), ErasedValue::new(1.0_f64));
        layers.set(SourceLayer::Styled, width.id(), ErasedValue::new(2.0_f64));
        layers.set(SourceLayer::Animated, width.id(), ErasedValue::new(3.0_f64));

        assert_eq!(
            layers
                .get(SourceLayer::Local, width.id())
                .unwrap()
                .downcast_ref::<f64>(),
            Some(&1.0)
        );
        assert_eq!(
            layers
                .get(SourceLayer::Styled, width.id())
                .unwrap()
                .downcast_ref::<f64>(),
            Some(&2.0)
        );

        layers.clear(SourceLayer::Local, width.id());
        assert!(layers.has(SourceLayer::Styled, width.id()));
        assert!(layers.has(SourceLayer::Animated, width.id()));
        assert_eq!(layers.len(), 1);
    }

    #[test]
    fn base_precedence_local_over_triggered_over_styled() {
        let (_, _, width, _) = setup();
        let mut layers = SourceLayers::new();

        layers.set(SourceLayer::Styled, width.id(), ErasedValue::new(1.0_f64));
        let (source, _) = layers.base(width.id()).unwrap();
        assert_eq!(source, ValueSource::Styled);

        layers.set(SourceLayer::Triggered, width.id(), ErasedValue::new(2.0_f64));
        let (source, _) = layers.base(width.id()).unwrap();
        assert_eq!(source, ValueSource::Triggered);

        layers.set(SourceLayer::Local, width.id(), ErasedValue::new(3.0_f64));
        let (source, value) = layers.base(width.id()).unwrap();
        assert_eq!(source, ValueSource::Local);
        assert_eq!(value.downcast_ref::<f64>(), Some(&3.0));

        layers.clear(SourceLayer::Local, width.id());
        layers.clear(SourceLayer::Triggered, width.id());
        let (source, _) = layers.base(width.id()).unwrap();
        assert_eq!(source, ValueSource::Styled);
    }

    #[test]
    fn shadowing_ignores_inherited_entries() {
        let (_, _, width, _) = setup();
        let mut layers = SourceLayers::new();

        layers.set(SourceLayer::Inherited, width.id(), ErasedValue::new(1.0_f64));
        assert!(!layers.shadows_inherited(width.id()));

        layers.set(SourceLayer::Animated, width.id(), ErasedValue::new(2.0_f64));
        assert!(layers.shadows_inherited(width.id()));

        layers.clear(SourceLayer::Animated, width.id());
        layers.set(SourceLayer::Styled, width.id(), ErasedValue::new(3.0_f64));
        assert!(layers.shadows_inherited(width.id()));
    }

    #[test]
    fn property_ids_sorted_and_deduplicated() {
        let (_, _, width, count) = setup();
        let mut layers = SourceLayers::new();

        layers.set(SourceLayer::Styled, count.id(), ErasedValue::new(5_i32));
        layers.set(SourceLayer::Local, width.id(), ErasedValue::new(1.0_f64));
        layers.set(SourceLayer::Animated, width.id(), ErasedValue::new(2.0_f64));

        let ids: Vec<_> = layers.property_ids().into_iter().collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&width.id()));
        assert!(ids.contains(&count.id()));
        for pair in ids.windows(2) {
            assert!(pair[0].index() < pair[1].index());
        }
        assert_eq!(layers.len(), 2);
    }

    #[test]
    fn clear_animations_leaves_other_layers() {
        let (_, _, width, count) = setup();
        let mut layers = SourceLayers::new();

        layers.set(SourceLayer::Local, width.id(), ErasedValue::new(1.0_f64));
        layers.set(SourceLayer::Animated, width.id(), ErasedValue::new(2.0_f64));
        layers.set(SourceLayer::Animated, count.id(), ErasedValue::new(3_i32));

        assert_eq!(layers.clear_animations(), 2);
        assert!(!layers.has(SourceLayer::Animated, width.id()));
        assert!(layers.has(SourceLayer::Local, width.id()));
        assert_eq!(layers.clear_animations(), 0);
    }

    #[test]
    fn resolve_falls_back_to_default() {
        let (registry, visual, width, _) = setup();
        let layers = SourceLayers::new();

        let (source, value) = resolve_effective(&registry, visual, width.id(), &layers);
        assert_eq!(source, ValueSource::Default);
        assert_eq!(value.downcast_ref::<f64>(), Some(&0.0));
    }

    #[test]
    fn resolve_applies_precedence() {
        let (registry, visual, width, _) = setup();
        let mut layers = SourceLayers::new();

        layers.set(SourceLayer::Inherited, width.id(), ErasedValue::new(10.0_f64));
        let (source, value) = resolve_effective(&registry, visual, width.id(), &layers);
        assert_eq!(source, ValueSource::Inherited);
        assert_eq!(value.downcast_ref::<f64>(), Some(&10.0));

        layers.set(SourceLayer::Styled, width.id(), ErasedValue::new(20.0_f64));
        let (source, _) = resolve_effective(&registry, visual, width.id(), &layers);
        assert_eq!(source, ValueSource::Styled);

        layers.set(SourceLayer::Local, width.id(), ErasedValue::new(30.0_f64));
        let (source, value) = resolve_effective(&registry, visual, width.id(), &layers);
        assert_eq!(source, ValueSource::Local);
        assert_eq!(value.downcast_ref::<f64>(), Some(&30.0));

        layers.set(SourceLayer::Animated, width.id(), ErasedValue::new(40.0_f64));
        let (source, value) = resolve_effective(&registry, visual, width.id(), &layers);
        assert_eq!(source, ValueSource::Animated);
        assert_eq!(value.downcast_ref::<f64>(), Some(&40.0));
    }

    #[test]
    fn resolve_coerces_strong_sources_only() {
        let mut registry = PropertyRegistry::new();
        let visual = registry.register_type("Visual", None);
        let width: Property<f64> = registry.register(
            "Width",
            visual,
            PropertyMetadataBuilder::new(0.0_f64)
                .coerce(|v: f64| v.clamp(0.0, 100.0))
                .build(),
        );

        let mut layers = SourceLayers::new();

        // Inherited values bypass coercion.
        layers.set(SourceLayer::Inherited, width.id(), ErasedValue::new(500.0_f64));
        let (source, value) = resolve_effective(&registry, visual, width.id(), &layers);
        assert_eq!(source, ValueSource::Inherited);
        assert_eq!(value.downcast_ref::<f64>(), Some(&500.0));

        // Local values are clamped.
        layers.set(SourceLayer::Local, width.id(), ErasedValue::new(500.0_f64));
        let (source, value) = resolve_effective(&registry, visual, width.id(), &layers);
        assert_eq!(source, ValueSource::Local);
        assert_eq!(value.downcast_ref::<f64>(), Some(&100.0));

        // The animated value is coerced, not the base underneath it.
        layers.set(SourceLayer::Animated, width.id(), ErasedValue::new(-25.0_f64));
        let (_, value) = resolve_effective(&registry, visual, width.id(), &layers);
        assert_eq!(value.downcast_ref::<f64>(), Some(&0.0));
    }
}
