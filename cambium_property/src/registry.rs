// Copyright 2025 the Cambium Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property registration and metadata resolution.
//!
//! The [`PropertyRegistry`] owns every [`PropertyDescriptor`] in the system,
//! together with the owner-type hierarchy used to resolve per-subtype
//! metadata overrides and name lookups.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::{Any, TypeId};

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::id::{OwnerTypeId, Property, PropertyId};
use crate::metadata::{MetadataPatch, PropertyMetadata, PropertyOptions};
use crate::style::{StyleSetterFn, StyleTarget};
use crate::value::ErasedValue;

/// Error returned by name-based property lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindError {
    /// No property with the given name is visible to the owner type.
    NotFound {
        /// The name that was looked up.
        name: String,
    },
    /// Two or more properties with the given name are visible to the owner
    /// type and their owners are not related by inheritance.
    Ambiguous {
        /// The name that was looked up.
        name: String,
    },
}

impl core::fmt::Display for FindError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound { name } => write!(f, "no property named '{name}' is visible"),
            Self::Ambiguous { name } => {
                write!(f, "property name '{name}' is ambiguous between unrelated owner types")
            }
        }
    }
}

impl core::error::Error for FindError {}

/// Type-erased metadata storage.
///
/// Metadata is stored as `Box<dyn ErasedMetadata>` inside descriptors so the
/// registry itself need not be generic. Typed access goes through
/// `downcast_ref`; the erased hooks serve write paths that only hold an
/// [`ErasedValue`], such as compiled style setters.
trait ErasedMetadata: Any {
    fn as_any(&self) -> &dyn Any;
    fn options(&self) -> PropertyOptions;
    fn default_erased(&self) -> ErasedValue;
    fn coerce_value_erased(&self, value: ErasedValue) -> ErasedValue;
    fn values_equal_erased(&self, a: &ErasedValue, b: &ErasedValue) -> bool;
    fn notify_changed_erased(&self, old: Option<&ErasedValue>, new: &ErasedValue);
}

impl<T: Clone + 'static> ErasedMetadata for PropertyMetadata<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn options(&self) -> PropertyOptions {
        PropertyMetadata::options(self)
    }

    fn default_erased(&self) -> ErasedValue {
        ErasedValue::new(self.default_value().clone())
    }

    fn coerce_value_erased(&self, value: ErasedValue) -> ErasedValue {
        self.coerce_erased(value)
    }

    fn values_equal_erased(&self, a: &ErasedValue, b: &ErasedValue) -> bool {
        let (Some(lhs), Some(rhs)) = (a.downcast_ref::<T>(), b.downcast_ref::<T>()) else {
            panic!(
                "Cannot compare values of type '{}' and '{}' as '{}'",
                a.type_name(),
                b.type_name(),
                core::any::type_name::<T>()
            );
        };
        self.values_equal(lhs, rhs)
    }

    fn notify_changed_erased(&self, old: Option<&ErasedValue>, new: &ErasedValue) {
        let Some(new_value) = new.downcast_ref::<T>() else {
            panic!(
                "Cannot notify with a value of type '{}' for a property of type '{}'",
                new.type_name(),
                core::any::type_name::<T>()
            );
        };
        let old_value = match old {
            Some(value) => match value.downcast_ref::<T>() {
                Some(v) => Some(v),
                None => panic!(
                    "Cannot notify with an old value of type '{}' for a property of type '{}'",
                    value.type_name(),
                    core::any::type_name::<T>()
                ),
            },
            None => None,
        };
        self.on_changed(old_value, new_value);
    }
}

impl dyn ErasedMetadata {
    fn downcast_ref<T: Clone + 'static>(&self) -> Option<&PropertyMetadata<T>> {
        self.as_any().downcast_ref::<PropertyMetadata<T>>()
    }
}

#[derive(Debug)]
struct OwnerTypeEntry {
    name: &'static str,
    base: Option<OwnerTypeId>,
}

/// The immutable identity of a registered property, plus its metadata table.
///
/// Descriptors are created by the `register` family and live for the lifetime
/// of the registry. Identity (name, owner, value type, flags) never changes;
/// the per-subtype override table grows through
/// [`PropertyRegistry::override_metadata`].
pub struct PropertyDescriptor {
    id: PropertyId,
    name: &'static str,
    styling_name: Option<&'static str>,
    owner: OwnerTypeId,
    value_type: TypeId,
    value_type_name: &'static str,
    read_only: bool,
    attached: bool,
    base_metadata: Box<dyn ErasedMetadata>,
    // Sorted by owner type id for binary search during the resolution walk.
    overrides: Vec<(OwnerTypeId, Box<dyn ErasedMetadata>)>,
    style_setter: Option<StyleSetterFn>,
}

impl PropertyDescriptor {
    /// Returns the property's id.
    #[must_use]
    #[inline]
    pub fn id(&self) -> PropertyId {
        self.id
    }

    /// Returns the property's registered name.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the name the styling system resolves this property under, or
    /// `None` if the property does not participate in styling.
    #[must_use]
    #[inline]
    pub fn styling_name(&self) -> Option<&'static str> {
        self.styling_name
    }

    /// Returns the owner type that registered this property.
    #[must_use]
    #[inline]
    pub fn owner_type(&self) -> OwnerTypeId {
        self.owner
    }

    /// Returns the [`TypeId`] of the property's value type.
    #[must_use]
    #[inline]
    pub fn value_type(&self) -> TypeId {
        self.value_type
    }

    /// Returns the name of the property's value type.
    ///
    /// Intended for error messages; the exact string is not stable.
    #[must_use]
    #[inline]
    pub fn value_type_name(&self) -> &'static str {
        self.value_type_name
    }

    /// Returns whether this property rejects external writes.
    #[must_use]
    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Returns whether this property attaches to arbitrary owner types.
    #[must_use]
    #[inline]
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Returns the compiled style setter, or `None` for read-only properties.
    #[must_use]
    #[inline]
    pub fn style_setter(&self) -> Option<&StyleSetterFn> {
        self.style_setter.as_ref()
    }
}

impl core::fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("styling_name", &self.styling_name)
            .field("owner", &self.owner)
            .field("value_type_name", &self.value_type_name)
            .field("read_only", &self.read_only)
            .field("attached", &self.attached)
            .field("overrides", &self.overrides.len())
            .finish_non_exhaustive()
    }
}

/// Registry of owner types and property descriptors.
///
/// Registration is a configuration phase; misconfiguration (duplicate names,
/// duplicate overrides, unknown ids) panics rather than returning errors.
/// Runtime lookups from untrusted strings go through [`Self::find_by_name`]
/// and [`Self::find_by_styling_name`], which return errors instead.
///
/// # Example
///
/// ```rust
/// use cambium_property::{PropertyMetadataBuilder, PropertyOptions, PropertyRegistry};
///
/// let mut registry = PropertyRegistry::new();
/// let visual = registry.register_type("Visual", None);
///
/// let opacity = registry.register(
///     "Opacity",
///     visual,
///     PropertyMetadataBuilder::new(1.0_f64)
///         .options(PropertyOptions::AFFECTS_VISUAL_BOUNDS)
///         .coerce(|v: f64| v.clamp(0.0, 1.0))
///         .build(),
/// );
///
/// let metadata = registry.metadata_for_owner(opacity, visual);
/// assert_eq!(metadata.default_value(), &1.0);
/// assert_eq!(metadata.coerce(2.5), 1.0);
/// ```
#[derive(Debug, Default)]
pub struct PropertyRegistry {
    owner_types: Vec<OwnerTypeEntry>,
    properties: Vec<PropertyDescriptor>,
    by_name: HashMap<&'static str, SmallVec<[PropertyId; 2]>>,
    by_styling_name: HashMap<&'static str, SmallVec<[PropertyId; 2]>>,
}

impl PropertyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an owner type, optionally deriving from `base`.
    ///
    /// # Panics
    ///
    /// Panics if `base` is not a registered type or the type capacity is
    /// exceeded.
    pub fn register_type(&mut self, name: &'static str, base: Option<OwnerTypeId>) -> OwnerTypeId {
        if let Some(base) = base {
            assert!(
                usize::from(base.index()) < self.owner_types.len(),
                "Base type {base} is not registered"
            );
        }
        let index = self.owner_types.len();
        assert!(index <= usize::from(u16::MAX), "Owner type capacity exceeded");
        #[expect(clippy::cast_possible_truncation, reason = "bounds checked above")]
        let id = OwnerTypeId::new(index as u16);
        self.owner_types.push(OwnerTypeEntry { name, base });
        id
    }

    /// Returns the name of a registered owner type.
    #[must_use]
    pub fn type_name(&self, ty: OwnerTypeId) -> &'static str {
        self.owner_type_entry(ty).name
    }

    /// Returns the base of an owner type, or `None` for a root type.
    #[must_use]
    pub fn base_type(&self, ty: OwnerTypeId) -> Option<OwnerTypeId> {
        self.owner_type_entry(ty).base
    }

    /// Returns whether `ty` is `base` or derives from `base`.
    #[must_use]
    pub fn is_assignable(&self, ty: OwnerTypeId, base: OwnerTypeId) -> bool {
        let mut current = Some(ty);
        while let Some(t) = current {
            if t == base {
                return true;
            }
            current = self.owner_type_entry(t).base;
        }
        false
    }

    /// Returns the number of registered owner types.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.owner_types.len()
    }

    /// Registers a property owned by `owner`.
    ///
    /// The property participates in styling under its registered name.
    ///
    /// # Panics
    ///
    /// Panics if a property with the same name is already registered for
    /// `owner`, if `owner` is unknown, or the property capacity is exceeded.
    pub fn register<T: Clone + 'static>(
        &mut self,
        name: &'static str,
        owner: OwnerTypeId,
        metadata: PropertyMetadata<T>,
    ) -> Property<T> {
        self.register_inner(name, Some(name), owner, metadata, false, false)
    }

    /// Registers a property that participates in styling under `styling_name`
    /// instead of its registered name.
    pub fn register_styled_as<T: Clone + 'static>(
        &mut self,
        name: &'static str,
        styling_name: &'static str,
        owner: OwnerTypeId,
        metadata: PropertyMetadata<T>,
    ) -> Property<T> {
        self.register_inner(name, Some(styling_name), owner, metadata, false, false)
    }

    /// Registers an attached property.
    ///
    /// Attached properties are owned by `owner` but may be set on objects of
    /// any type, and are visible to every type during name lookup.
    pub fn register_attached<T: Clone + 'static>(
        &mut self,
        name: &'static str,
        owner: OwnerTypeId,
        metadata: PropertyMetadata<T>,
    ) -> Property<T> {
        self.register_inner(name, Some(name), owner, metadata, false, true)
    }

    /// Registers a read-only property.
    ///
    /// Read-only properties reject local writes and style application; their
    /// value changes only through the engine's underlying write path. They do
    /// not participate in styling and have no compiled style setter.
    pub fn register_read_only<T: Clone + 'static>(
        &mut self,
        name: &'static str,
        owner: OwnerTypeId,
        metadata: PropertyMetadata<T>,
    ) -> Property<T> {
        self.register_inner(name, None, owner, metadata, true, false)
    }

    fn register_inner<T: Clone + 'static>(
        &mut self,
        name: &'static str,
        styling_name: Option<&'static str>,
        owner: OwnerTypeId,
        metadata: PropertyMetadata<T>,
        read_only: bool,
        attached: bool,
    ) -> Property<T> {
        assert!(
            usize::from(owner.index()) < self.owner_types.len(),
            "Owner type {owner} is not registered"
        );
        if let Some(ids) = self.by_name.get(name) {
            for id in ids {
                if self.properties[usize::from(id.index())].owner == owner {
                    panic!(
                        "Property '{name}' is already registered for type '{}'",
                        self.type_name(owner)
                    );
                }
            }
        }
        let index = self.properties.len();
        assert!(index <= usize::from(u16::MAX), "Property capacity exceeded");
        #[expect(clippy::cast_possible_truncation, reason = "bounds checked above")]
        let id = PropertyId::new(index as u16);

        // Read-only properties cannot be styled, so they get no setter.
        let style_setter: Option<StyleSetterFn> = if read_only {
            None
        } else {
            Some(Arc::new(move |target: &mut dyn StyleTarget, value: &ErasedValue| {
                assert!(
                    value.is::<T>(),
                    "Cannot apply a styled value of type '{}' to a property of type '{}'",
                    value.type_name(),
                    core::any::type_name::<T>(),
                );
                target.apply_styled(id, value)
            }))
        };

        self.properties.push(PropertyDescriptor {
            id,
            name,
            styling_name,
            owner,
            value_type: TypeId::of::<T>(),
            value_type_name: core::any::type_name::<T>(),
            read_only,
            attached,
            base_metadata: Box::new(metadata),
            overrides: Vec::new(),
            style_setter,
        });
        self.by_name.entry(name).or_default().push(id);
        if let Some(styling_name) = styling_name {
            self.by_styling_name.entry(styling_name).or_default().push(id);
        }
        Property::from_id(id)
    }

    /// Overrides a property's metadata for `for_type` and every type deriving
    /// from it that does not carry a nearer override.
    ///
    /// Unset patch fields are inherited from the nearest ancestor override
    /// (walking from `for_type`'s base upward), or from the property's base
    /// metadata when no ancestor overrides it. Set fields replace the
    /// inherited ones wholesale; callbacks are replaced, never chained. The
    /// merge happens at call time, so ancestor overrides must be registered
    /// before descendant ones to be picked up.
    ///
    /// # Panics
    ///
    /// Panics if an override already exists for exactly `for_type`, or if the
    /// property or owner type is unknown. The existing override table is left
    /// intact.
    pub fn override_metadata<T: Clone + 'static>(
        &mut self,
        property: Property<T>,
        for_type: OwnerTypeId,
        patch: MetadataPatch<T>,
    ) {
        let index = usize::from(property.id().index());
        let Some(descriptor) = self.properties.get(index) else {
            panic!("{} is not registered", property.id());
        };
        assert!(
            usize::from(for_type.index()) < self.owner_types.len(),
            "Owner type {for_type} is not registered"
        );
        if descriptor
            .overrides
            .binary_search_by_key(&for_type, |(ty, _)| *ty)
            .is_ok()
        {
            panic!(
                "Metadata for property '{}' is already overridden for type '{}'",
                descriptor.name,
                self.type_name(for_type)
            );
        }

        let base = match self.base_type(for_type) {
            Some(parent) => self.effective_erased(descriptor, parent),
            None => &*descriptor.base_metadata,
        };
        let Some(typed_base) = base.downcast_ref::<T>() else {
            panic!(
                "Property '{}' stores values of type '{}', not '{}'",
                descriptor.name,
                descriptor.value_type_name,
                core::any::type_name::<T>()
            );
        };
        let merged = patch.merge_over(typed_base);

        let descriptor = &mut self.properties[index];
        let position = descriptor
            .overrides
            .binary_search_by_key(&for_type, |(ty, _)| *ty)
            .unwrap_err();
        descriptor
            .overrides
            .insert(position, (for_type, Box::new(merged)));
    }

    /// Resolves the metadata in effect for `owner`.
    ///
    /// Walks from `owner` toward its base types and returns the first
    /// override found, else the property's base metadata. The walk performs
    /// no allocation and is linear in the hierarchy depth.
    ///
    /// # Panics
    ///
    /// Panics if the property or owner type is unknown, or if `T` is not the
    /// property's value type.
    #[must_use]
    pub fn metadata_for_owner<T: Clone + 'static>(
        &self,
        property: Property<T>,
        owner: OwnerTypeId,
    ) -> &PropertyMetadata<T> {
        let descriptor = self.descriptor(property.id());
        let erased = self.effective_erased(descriptor, owner);
        let Some(metadata) = erased.downcast_ref::<T>() else {
            panic!(
                "Property '{}' stores values of type '{}', not '{}'",
                descriptor.name,
                descriptor.value_type_name,
                core::any::type_name::<T>()
            );
        };
        metadata
    }

    /// Returns the option flags in effect for `owner`.
    #[must_use]
    pub fn options_for_owner(&self, property: PropertyId, owner: OwnerTypeId) -> PropertyOptions {
        let descriptor = self.descriptor(property);
        self.effective_erased(descriptor, owner).options()
    }

    /// Returns a freshly boxed copy of the default value in effect for
    /// `owner`.
    #[must_use]
    pub fn default_value_for_owner(&self, property: PropertyId, owner: OwnerTypeId) -> ErasedValue {
        let descriptor = self.descriptor(property);
        self.effective_erased(descriptor, owner).default_erased()
    }

    /// Coerces an erased value with the coerce callback in effect for
    /// `owner`, if any.
    ///
    /// # Panics
    ///
    /// Panics if the value's type does not match the property's value type.
    #[must_use]
    pub fn coerce_for_owner(
        &self,
        property: PropertyId,
        owner: OwnerTypeId,
        value: ErasedValue,
    ) -> ErasedValue {
        let descriptor = self.descriptor(property);
        self.effective_erased(descriptor, owner)
            .coerce_value_erased(value)
    }

    /// Compares two erased values with the comparer in effect for `owner`.
    ///
    /// # Panics
    ///
    /// Panics if either value's type does not match the property's value
    /// type.
    #[must_use]
    pub fn values_equal_for_owner(
        &self,
        property: PropertyId,
        owner: OwnerTypeId,
        a: &ErasedValue,
        b: &ErasedValue,
    ) -> bool {
        let descriptor = self.descriptor(property);
        self.effective_erased(descriptor, owner).values_equal_erased(a, b)
    }

    /// Invokes the changed callback in effect for `owner`, if any.
    pub fn notify_changed_for_owner(
        &self,
        property: PropertyId,
        owner: OwnerTypeId,
        old: Option<&ErasedValue>,
        new: &ErasedValue,
    ) {
        let descriptor = self.descriptor(property);
        self.effective_erased(descriptor, owner)
            .notify_changed_erased(old, new);
    }

    /// Returns the descriptor for a property id.
    ///
    /// # Panics
    ///
    /// Panics if the id is not registered.
    #[must_use]
    pub fn descriptor(&self, property: PropertyId) -> &PropertyDescriptor {
        let Some(descriptor) = self.properties.get(usize::from(property.index())) else {
            panic!("{property} is not registered");
        };
        descriptor
    }

    /// Resolves a property by registered name, as visible to `owner`.
    ///
    /// A property is visible if `owner` is or derives from the property's
    /// owner type, or if the property is attached. When several visible
    /// properties share the name and their owners lie on one inheritance
    /// chain, the most derived owner's property shadows the others; owners
    /// not related by inheritance make the name ambiguous.
    ///
    /// # Errors
    ///
    /// Returns [`FindError::NotFound`] if no visible property has the name,
    /// and [`FindError::Ambiguous`] if unrelated owners both supply one.
    pub fn find_by_name(&self, name: &str, owner: OwnerTypeId) -> Result<PropertyId, FindError> {
        let candidates = self.by_name.get(name).map_or(&[][..], |ids| &ids[..]);
        self.resolve_named(candidates, owner, name)
    }

    /// Resolves a property by styling name, as visible to `owner`.
    ///
    /// Visibility and ambiguity follow [`Self::find_by_name`]. Read-only
    /// properties have no styling name and are never returned.
    ///
    /// # Errors
    ///
    /// Returns [`FindError::NotFound`] or [`FindError::Ambiguous`] as for
    /// [`Self::find_by_name`].
    pub fn find_by_styling_name(
        &self,
        styling_name: &str,
        owner: OwnerTypeId,
    ) -> Result<PropertyId, FindError> {
        let candidates = self
            .by_styling_name
            .get(styling_name)
            .map_or(&[][..], |ids| &ids[..]);
        self.resolve_named(candidates, owner, styling_name)
    }

    /// Returns the number of registered properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns whether no properties are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    fn owner_type_entry(&self, ty: OwnerTypeId) -> &OwnerTypeEntry {
        let Some(entry) = self.owner_types.get(usize::from(ty.index())) else {
            panic!("{ty} is not registered");
        };
        entry
    }

    fn resolve_named(
        &self,
        candidates: &[PropertyId],
        owner: OwnerTypeId,
        name: &str,
    ) -> Result<PropertyId, FindError> {
        let mut best: Option<PropertyId> = None;
        for &id in candidates {
            let descriptor = &self.properties[usize::from(id.index())];
            if !descriptor.attached && !self.is_assignable(owner, descriptor.owner) {
                continue;
            }
            match best {
                None => best = Some(id),
                Some(current) => {
                    let current_owner = self.properties[usize::from(current.index())].owner;
                    if self.is_assignable(current_owner, descriptor.owner) {
                        // The current winner's owner is nearer to `owner`.
                    } else if self.is_assignable(descriptor.owner, current_owner) {
                        best = Some(id);
                    } else {
                        return Err(FindError::Ambiguous {
                            name: String::from(name),
                        });
                    }
                }
            }
        }
        best.ok_or_else(|| FindError::NotFound {
            name: String::from(name),
        })
    }

    /// Finds the nearest override at or above `owner`, else the base
    /// metadata.
    fn effective_erased<'a>(
        &self,
        descriptor: &'a PropertyDescriptor,
        owner: OwnerTypeId,
    ) -> &'a dyn ErasedMetadata {
        let mut current = Some(owner);
        while let Some(ty) = current {
            if let Ok(position) = descriptor
                .overrides
                .binary_search_by_key(&ty, |(t, _)| *t)
            {
                return &*descriptor.overrides[position].1;
            }
            current = self.owner_type_entry(ty).base;
        }
        &*descriptor.base_metadata
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::metadata::PropertyMetadataBuilder;
    use alloc::format;
    use alloc::vec;
    use core::sync::atomic::{AtomicUsize, Ordering};

    fn three_level(registry: &mut PropertyRegistry) -> (OwnerTypeId, OwnerTypeId, OwnerTypeId) {
        let a = registry.register_type("A", None);
        let b = registry.register_type("B", Some(a));
        let c = registry.register_type("C", Some(b));
        (a, b, c)
    }

    #[test]
    fn register_and_describe() {
        let mut registry = PropertyRegistry::new();
        let visual = registry.register_type("Visual", None);
        let opacity = registry.register("Opacity", visual, PropertyMetadata::new(1.0_f64));

        let descriptor = registry.descriptor(opacity.id());
        assert_eq!(descriptor.name(), "Opacity");
        assert_eq!(descriptor.styling_name(), Some("Opacity"));
        assert_eq!(descriptor.owner_type(), visual);
        assert_eq!(descriptor.value_type(), core::any::TypeId::of::<f64>());
        assert!(!descriptor.is_read_only());
        assert!(!descriptor.is_attached());
        assert!(descriptor.style_setter().is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    #[should_panic(expected = "Property 'Opacity' is already registered for type 'Visual'")]
    fn duplicate_registration_panics() {
        let mut registry = PropertyRegistry::new();
        let visual = registry.register_type("Visual", None);
        let _ = registry.register("Opacity", visual, PropertyMetadata::new(1.0_f64));
        let _ = registry.register("Opacity", visual, PropertyMetadata::new(0.5_f64));
    }

    #[test]
    fn same_name_different_owner_is_allowed() {
        let mut registry = PropertyRegistry::new();
        let a = registry.register_type("A", None);
        let b = registry.register_type("B", None);
        let on_a = registry.register("Value", a, PropertyMetadata::new(1_i32));
        let on_b = registry.register("Value", b, PropertyMetadata::new(2_i32));
        assert_ne!(on_a.id(), on_b.id());
    }

    #[test]
    fn metadata_walk_returns_nearest_override() {
        let mut registry = PropertyRegistry::new();
        let (a, b, c) = three_level(&mut registry);
        let size = registry.register("Size", a, PropertyMetadata::new(10.0_f64));

        registry.override_metadata(size, a, MetadataPatch::new().default_value(20.0));
        registry.override_metadata(size, c, MetadataPatch::new().default_value(30.0));

        // B carries no override of its own, so it sees A's.
        assert_eq!(registry.metadata_for_owner(size, a).default_value(), &20.0);
        assert_eq!(registry.metadata_for_owner(size, b).default_value(), &20.0);
        assert_eq!(registry.metadata_for_owner(size, c).default_value(), &30.0);
    }

    #[test]
    fn metadata_walk_falls_back_to_base() {
        let mut registry = PropertyRegistry::new();
        let (a, b, _c) = three_level(&mut registry);
        let size = registry.register("Size", a, PropertyMetadata::new(10.0_f64));
        assert_eq!(registry.metadata_for_owner(size, b).default_value(), &10.0);
    }

    #[test]
    fn override_merges_against_nearest_ancestor() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = calls.clone();

        let mut registry = PropertyRegistry::new();
        let (a, b, c) = three_level(&mut registry);
        let size = registry.register(
            "Size",
            a,
            PropertyMetadataBuilder::new(10.0_f64)
                .options(PropertyOptions::AFFECTS_MEASURE)
                .build(),
        );

        registry.override_metadata(
            size,
            b,
            MetadataPatch::new().default_value(20.0).on_changed(move |_, _| {
                calls_in.fetch_add(1, Ordering::SeqCst);
            }),
        );
        // C replaces the default only; B's callback and A's options carry
        // through the merge.
        registry.override_metadata(size, c, MetadataPatch::new().default_value(30.0));

        let on_c = registry.metadata_for_owner(size, c);
        assert_eq!(on_c.default_value(), &30.0);
        assert_eq!(on_c.options(), PropertyOptions::AFFECTS_MEASURE);
        on_c.on_changed(None, &1.0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "already overridden for type 'B'")]
    fn duplicate_override_panics() {
        let mut registry = PropertyRegistry::new();
        let (a, b, _c) = three_level(&mut registry);
        let size = registry.register("Size", a, PropertyMetadata::new(10.0_f64));
        registry.override_metadata(size, b, MetadataPatch::new().default_value(20.0));
        registry.override_metadata(size, b, MetadataPatch::new().default_value(30.0));
    }

    #[test]
    fn duplicate_override_leaves_first_intact() {
        let mut registry = PropertyRegistry::new();
        let (a, b, _c) = three_level(&mut registry);
        let size = registry.register("Size", a, PropertyMetadata::new(10.0_f64));
        registry.override_metadata(size, b, MetadataPatch::new().default_value(20.0));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            registry.override_metadata(size, b, MetadataPatch::new().default_value(99.0));
        }));
        assert!(result.is_err());
        assert_eq!(registry.metadata_for_owner(size, b).default_value(), &20.0);
    }

    #[test]
    fn find_by_name_sees_ancestor_properties() {
        let mut registry = PropertyRegistry::new();
        let (a, _b, c) = three_level(&mut registry);
        let size = registry.register("Size", a, PropertyMetadata::new(10.0_f64));

        assert_eq!(registry.find_by_name("Size", c), Ok(size.id()));
        assert_eq!(
            registry.find_by_name("Missing", c),
            Err(FindError::NotFound {
                name: String::from("Missing")
            })
        );
    }

    #[test]
    fn find_by_name_is_scoped_to_the_hierarchy() {
        let mut registry = PropertyRegistry::new();
        let a = registry.register_type("A", None);
        let other = registry.register_type("Other", None);
        let _ = registry.register("Size", other, PropertyMetadata::new(1_i32));

        assert!(matches!(
            registry.find_by_name("Size", a),
            Err(FindError::NotFound { .. })
        ));
    }

    #[test]
    fn find_by_name_prefers_the_most_derived_owner() {
        let mut registry = PropertyRegistry::new();
        let (a, b, c) = three_level(&mut registry);
        let _on_a = registry.register("Size", a, PropertyMetadata::new(1_i32));
        let on_b = registry.register("Size", b, PropertyMetadata::new(2_i32));

        assert_eq!(registry.find_by_name("Size", c), Ok(on_b.id()));
    }

    #[test]
    fn attached_properties_are_visible_everywhere() {
        let mut registry = PropertyRegistry::new();
        let grid = registry.register_type("Grid", None);
        let button = registry.register_type("Button", None);
        let row = registry.register_attached("Row", grid, PropertyMetadata::new(0_i32));

        assert_eq!(registry.find_by_name("Row", button), Ok(row.id()));
        assert!(registry.descriptor(row.id()).is_attached());
    }

    #[test]
    fn unrelated_owners_make_a_name_ambiguous() {
        let mut registry = PropertyRegistry::new();
        let grid = registry.register_type("Grid", None);
        let toolbar = registry.register_type("Toolbar", None);
        let button = registry.register_type("Button", None);
        let _ = registry.register_attached("Row", grid, PropertyMetadata::new(0_i32));
        let _ = registry.register_attached("Row", toolbar, PropertyMetadata::new(0_i32));

        assert_eq!(
            registry.find_by_name("Row", button),
            Err(FindError::Ambiguous {
                name: String::from("Row")
            })
        );
    }

    #[test]
    fn styling_name_lookup() {
        let mut registry = PropertyRegistry::new();
        let control = registry.register_type("Control", None);
        let background =
            registry.register_styled_as("Background", "background", control, PropertyMetadata::new(0_u32));

        assert_eq!(
            registry.find_by_styling_name("background", control),
            Ok(background.id())
        );
        // The registered name maps to the regular namespace only.
        assert!(registry.find_by_styling_name("Background", control).is_err());
        assert_eq!(registry.find_by_name("Background", control), Ok(background.id()));
    }

    #[test]
    fn read_only_properties_do_not_style() {
        let mut registry = PropertyRegistry::new();
        let control = registry.register_type("Control", None);
        let actual_width =
            registry.register_read_only("ActualWidth", control, PropertyMetadata::new(0.0_f64));

        let descriptor = registry.descriptor(actual_width.id());
        assert!(descriptor.is_read_only());
        assert_eq!(descriptor.styling_name(), None);
        assert!(descriptor.style_setter().is_none());
        assert!(registry.find_by_styling_name("ActualWidth", control).is_err());
    }

    #[test]
    fn compiled_style_setter_applies_through_the_target() {
        struct Recorder {
            applied: vec::Vec<(PropertyId, f64)>,
        }
        impl StyleTarget for Recorder {
            fn apply_styled(&mut self, property: PropertyId, value: &ErasedValue) -> bool {
                let value = *value.downcast_ref::<f64>().unwrap();
                self.applied.push((property, value));
                true
            }
        }

        let mut registry = PropertyRegistry::new();
        let control = registry.register_type("Control", None);
        let width = registry.register("Width", control, PropertyMetadata::new(0.0_f64));

        let mut recorder = Recorder { applied: vec![] };
        let setter = registry.descriptor(width.id()).style_setter().unwrap();
        assert!(setter(&mut recorder, &ErasedValue::new(42.0_f64)));
        assert_eq!(recorder.applied, vec![(width.id(), 42.0)]);
    }

    #[test]
    #[should_panic(expected = "Cannot apply a styled value of type")]
    fn compiled_style_setter_rejects_wrong_types() {
        struct Ignore;
        impl StyleTarget for Ignore {
            fn apply_styled(&mut self, _property: PropertyId, _value: &ErasedValue) -> bool {
                false
            }
        }

        let mut registry = PropertyRegistry::new();
        let control = registry.register_type("Control", None);
        let width = registry.register("Width", control, PropertyMetadata::new(0.0_f64));

        let setter = registry.descriptor(width.id()).style_setter().unwrap();
        let _ = setter(&mut Ignore, &ErasedValue::new("not a number"));
    }

    #[test]
    fn erased_metadata_surface() {
        let mut registry = PropertyRegistry::new();
        let (a, b, _c) = three_level(&mut registry);
        let size = registry.register(
            "Size",
            a,
            PropertyMetadataBuilder::new(10.0_f64)
                .options(PropertyOptions::AFFECTS_MEASURE)
                .coerce(|v: f64| v.max(0.0))
                .build(),
        );
        registry.override_metadata(
            size,
            b,
            MetadataPatch::new()
                .default_value(20.0)
                .options(PropertyOptions::AFFECTS_ARRANGE),
        );

        assert_eq!(
            registry.options_for_owner(size.id(), a),
            PropertyOptions::AFFECTS_MEASURE
        );
        assert_eq!(
            registry.options_for_owner(size.id(), b),
            PropertyOptions::AFFECTS_ARRANGE
        );

        let default = registry.default_value_for_owner(size.id(), b);
        assert_eq!(default.downcast_ref::<f64>(), Some(&20.0));

        let coerced = registry.coerce_for_owner(size.id(), b, ErasedValue::new(-5.0_f64));
        assert_eq!(coerced.downcast_ref::<f64>(), Some(&0.0));

        assert!(registry.values_equal_for_owner(
            size.id(),
            a,
            &ErasedValue::new(1.0_f64),
            &ErasedValue::new(1.0_f64)
        ));
        assert!(!registry.values_equal_for_owner(
            size.id(),
            a,
            &ErasedValue::new(1.0_f64),
            &ErasedValue::new(2.0_f64)
        ));
    }

    #[test]
    fn notify_changed_for_owner_runs_the_effective_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = calls.clone();

        let mut registry = PropertyRegistry::new();
        let (a, _b, _c) = three_level(&mut registry);
        let size = registry.register(
            "Size",
            a,
            PropertyMetadataBuilder::new(0.0_f64)
                .on_changed(move |old, new| {
                    assert_eq!(old, Some(&1.0));
                    assert_eq!(new, &2.0);
                    calls_in.fetch_add(1, Ordering::SeqCst);
                })
                .build(),
        );

        registry.notify_changed_for_owner(
            size.id(),
            a,
            Some(&ErasedValue::new(1.0_f64)),
            &ErasedValue::new(2.0_f64),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn type_hierarchy_queries() {
        let mut registry = PropertyRegistry::new();
        let (a, b, c) = three_level(&mut registry);

        assert_eq!(registry.type_name(b), "B");
        assert_eq!(registry.base_type(c), Some(b));
        assert_eq!(registry.base_type(a), None);
        assert!(registry.is_assignable(c, a));
        assert!(registry.is_assignable(a, a));
        assert!(!registry.is_assignable(a, c));
        assert_eq!(registry.type_count(), 3);
    }

    #[test]
    fn descriptor_debug_formatting() {
        let mut registry = PropertyRegistry::new();
        let visual = registry.register_type("Visual", None);
        let opacity = registry.register("Opacity", visual, PropertyMetadata::new(1.0_f64));

        let debug = format!("{:?}", registry.descriptor(opacity.id()));
        assert!(debug.contains("Opacity"));
        assert!(debug.contains("f64"));
    }
}
