// Copyright 2025 the Cambium Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared style definitions.
//!
//! This module provides [`Style`], a shared collection of property setters
//! that can be referenced by multiple objects, and [`StyleTarget`], the
//! surface a value store exposes for styles to write through.

use alloc::rc::Rc;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::id::{Property, PropertyId};
use crate::registry::PropertyRegistry;
use crate::value::ErasedValue;

/// A compiled style setter.
///
/// Compiled once per property at registration time. The function validates
/// that the erased value matches the property's declared value type, then
/// writes through the target's styled slot. Returns whether the write changed
/// anything.
pub type StyleSetterFn = Arc<dyn Fn(&mut dyn StyleTarget, &ErasedValue) -> bool + Send + Sync>;

/// The write surface a compiled style setter applies values through.
///
/// Implemented by the engine's per-object store adapter. By the time this is
/// called the value's type has already been validated against the property's
/// declared type.
pub trait StyleTarget {
    /// Writes `value` into the styled slot for `property`.
    ///
    /// Returns `true` if the styled value changed.
    fn apply_styled(&mut self, property: PropertyId, value: &ErasedValue) -> bool;
}

/// A shared, immutable collection of property setters.
///
/// Styles store property values once and are shared across many objects,
/// following `WinUI`'s optimized-style layout: objects hold a cheap reference
/// to shared data rather than per-object copies of every setter.
///
/// Styles are immutable after creation. Use [`StyleBuilder`] to construct
/// them, and [`Style::apply`] to push the setters through a [`StyleTarget`]
/// using each property's compiled setter.
///
/// # Example
///
/// ```rust
/// use cambium_property::{PropertyMetadataBuilder, PropertyRegistry, StyleBuilder};
///
/// let mut registry = PropertyRegistry::new();
/// let control = registry.register_type("Control", None);
/// let width = registry.register("Width", control, PropertyMetadataBuilder::new(0.0_f64).build());
///
/// let style = StyleBuilder::new().set(width, 100.0).build();
///
/// // Cloning shares the underlying data.
/// let style2 = style.clone();
/// assert_eq!(style2.get(width), Some(&100.0));
/// ```
#[derive(Clone, Debug)]
pub struct Style {
    inner: Rc<StyleData>,
}

/// Internal storage for style property values.
#[derive(Debug, Default)]
struct StyleData {
    /// Sorted by `PropertyId` for binary search lookup.
    entries: Vec<(PropertyId, ErasedValue)>,
}

impl Style {
    /// Returns `true` if this style has no property setters.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Returns the number of property setters in this style.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Gets the value for a property, if set in this style.
    #[must_use]
    #[inline]
    pub fn get<T: Clone + 'static>(&self, property: Property<T>) -> Option<&T> {
        self.inner
            .entries
            .binary_search_by_key(&property.id(), |(id, _)| *id)
            .ok()
            .and_then(|idx| self.inner.entries[idx].1.downcast_ref())
    }

    /// Returns `true` if this style has a value for the property.
    #[must_use]
    #[inline]
    pub fn contains<T: Clone + 'static>(&self, property: Property<T>) -> bool {
        self.inner
            .entries
            .binary_search_by_key(&property.id(), |(id, _)| *id)
            .is_ok()
    }

    /// Returns an iterator over the property IDs set in this style.
    pub fn property_ids(&self) -> impl Iterator<Item = PropertyId> + '_ {
        self.inner.entries.iter().map(|(id, _)| *id)
    }

    /// Applies every setter to `target` through its property's compiled
    /// setter.
    ///
    /// Returns the number of setters that changed the target's styled value.
    ///
    /// # Panics
    ///
    /// Panics if a setter names a read-only property (which has no compiled
    /// setter) or carries a value of the wrong type.
    pub fn apply(&self, registry: &PropertyRegistry, target: &mut dyn StyleTarget) -> usize {
        let mut changed = 0;
        for (id, value) in &self.inner.entries {
            let descriptor = registry.descriptor(*id);
            let Some(setter) = descriptor.style_setter() else {
                panic!(
                    "Property '{}' is read-only and cannot be styled",
                    descriptor.name()
                );
            };
            if setter(target, value) {
                changed += 1;
            }
        }
        changed
    }
}

/// Builder for constructing [`Style`] instances.
///
/// # Example
///
/// ```rust
/// use cambium_property::{PropertyMetadataBuilder, PropertyRegistry, StyleBuilder};
///
/// let mut registry = PropertyRegistry::new();
/// let control = registry.register_type("Control", None);
/// let width = registry.register("Width", control, PropertyMetadataBuilder::new(0.0_f64).build());
/// let height = registry.register("Height", control, PropertyMetadataBuilder::new(0.0_f64).build());
///
/// let style = StyleBuilder::new()
///     .set(width, 100.0)
///     .set(height, 50.0)
///     .build();
///
/// assert_eq!(style.get(width), Some(&100.0));
/// assert_eq!(style.get(height), Some(&50.0));
/// ```
#[derive(Debug, Default)]
pub struct StyleBuilder {
    entries: Vec<(PropertyId, ErasedValue)>,
}

impl StyleBuilder {
    /// Creates a new empty style builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a property value in the style.
    ///
    /// If the property was already set, the value is replaced.
    #[must_use]
    pub fn set<T: Clone + 'static>(self, property: Property<T>, value: T) -> Self {
        self.set_erased(property.id(), ErasedValue::new(value))
    }

    /// Sets an already-erased property value in the style.
    ///
    /// Used by pipelines that resolve properties by styling name and never
    /// hold a typed handle. Type validation happens when the style is
    /// applied.
    #[must_use]
    pub fn set_erased(mut self, property: PropertyId, value: ErasedValue) -> Self {
        match self.entries.binary_search_by_key(&property, |(pid, _)| *pid) {
            Ok(idx) => {
                self.entries[idx].1 = value;
            }
            Err(idx) => {
                self.entries.insert(idx, (property, value));
            }
        }
        self
    }

    /// Builds the style.
    #[must_use]
    pub fn build(self) -> Style {
        Style {
            inner: Rc::new(StyleData {
                entries: self.entries,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::PropertyMetadataBuilder;
    use alloc::vec;

    fn setup_registry() -> (PropertyRegistry, Property<f64>, Property<i32>) {
        let mut registry = PropertyRegistry::new();
        let control = registry.register_type("Control", None);
        let width = registry.register(
            "Width",
            control,
            PropertyMetadataBuilder::new(0.0_f64).build(),
        );
        let count = registry.register("Count", control, PropertyMetadataBuilder::new(0_i32).build());
        (registry, width, count)
    }

    struct Recorder {
        applied: Vec<(PropertyId, ErasedValue)>,
        report_changed: bool,
    }

    impl StyleTarget for Recorder {
        fn apply_styled(&mut self, property: PropertyId, value: &ErasedValue) -> bool {
            self.applied.push((property, value.clone_value()));
            self.report_changed
        }
    }

    #[test]
    fn style_empty() {
        let style = StyleBuilder::new().build();
        assert!(style.is_empty());
        assert_eq!(style.len(), 0);
    }

    #[test]
    fn style_single_property() {
        let (_, width, _) = setup_registry();

        let style = StyleBuilder::new().set(width, 100.0).build();

        assert!(!style.is_empty());
        assert_eq!(style.len(), 1);
        assert_eq!(style.get(width), Some(&100.0));
    }

    #[test]
    fn style_replace_value() {
        let (_, width, _) = setup_registry();

        let style = StyleBuilder::new()
            .set(width, 100.0)
            .set(width, 200.0)
            .build();

        assert_eq!(style.len(), 1);
        assert_eq!(style.get(width), Some(&200.0));
    }

    #[test]
    fn style_contains() {
        let (_, width, count) = setup_registry();

        let style = StyleBuilder::new().set(width, 100.0).build();

        assert!(style.contains(width));
        assert!(!style.contains(count));
    }

    #[test]
    fn style_clone_is_cheap() {
        let (_, width, _) = setup_registry();

        let style = StyleBuilder::new().set(width, 100.0).build();
        let style2 = style.clone();

        assert_eq!(style2.get(width), Some(&100.0));
        assert!(Rc::ptr_eq(&style.inner, &style2.inner));
    }

    #[test]
    fn style_property_ids_are_sorted() {
        let (_, width, count) = setup_registry();

        let style = StyleBuilder::new().set(count, 42).set(width, 100.0).build();

        let ids: Vec<_> = style.property_ids().collect();
        assert_eq!(ids.len(), 2);
        assert!(ids[0].index() < ids[1].index());
    }

    #[test]
    fn style_get_wrong_type_returns_none() {
        let (_, width, _) = setup_registry();

        let style = StyleBuilder::new().set(width, 100.0).build();

        // A mistyped handle with the same id downcasts to None.
        let mistyped = Property::<i32>::from_id(width.id());
        assert_eq!(style.get(mistyped), None);
    }

    #[test]
    fn apply_routes_through_compiled_setters() {
        let (registry, width, count) = setup_registry();

        let style = StyleBuilder::new().set(width, 100.0).set(count, 7).build();
        let mut target = Recorder {
            applied: vec![],
            report_changed: true,
        };

        let changed = style.apply(&registry, &mut target);
        assert_eq!(changed, 2);
        assert_eq!(target.applied.len(), 2);
        assert_eq!(target.applied[0].0, width.id());
        assert_eq!(target.applied[0].1.downcast_ref::<f64>(), Some(&100.0));
        assert_eq!(target.applied[1].1.downcast_ref::<i32>(), Some(&7));
    }

    #[test]
    fn apply_counts_only_changes() {
        let (registry, width, _) = setup_registry();

        let style = StyleBuilder::new().set(width, 100.0).build();
        let mut target = Recorder {
            applied: vec![],
            report_changed: false,
        };

        assert_eq!(style.apply(&registry, &mut target), 0);
        assert_eq!(target.applied.len(), 1);
    }

    #[test]
    #[should_panic(expected = "is read-only and cannot be styled")]
    fn apply_to_read_only_property_panics() {
        let mut registry = PropertyRegistry::new();
        let control = registry.register_type("Control", None);
        let actual =
            registry.register_read_only("ActualWidth", control, PropertyMetadataBuilder::new(0.0_f64).build());

        let style = StyleBuilder::new().set(actual, 10.0).build();
        let mut target = Recorder {
            applied: vec![],
            report_changed: true,
        };
        let _ = style.apply(&registry, &mut target);
    }

    #[test]
    #[should_panic(expected = "Cannot apply a styled value of type")]
    fn apply_with_mismatched_erased_value_panics() {
        let (registry, width, _) = setup_registry();

        let style = StyleBuilder::new()
            .set_erased(width.id(), ErasedValue::new("oops"))
            .build();
        let mut target = Recorder {
            applied: vec![],
            report_changed: true,
        };
        let _ = style.apply(&registry, &mut target);
    }
}
