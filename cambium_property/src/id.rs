// Copyright 2025 the Cambium Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property and owner-type identification.
//!
//! This module provides [`PropertyId`] for runtime property identification,
//! [`OwnerTypeId`] for identifying registered owner types, and [`Property<T>`]
//! for type-safe compile-time property keys.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

/// A runtime property identifier.
///
/// This is a lightweight handle (u16) that uniquely identifies a property
/// descriptor within a [`PropertyRegistry`](crate::PropertyRegistry). The u16
/// size allows up to 65,536 properties while keeping per-object storage
/// compact.
///
/// # Example
///
/// ```rust
/// use cambium_property::PropertyId;
///
/// let id = PropertyId::new(42);
/// assert_eq!(id.index(), 42);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyId(u16);

impl PropertyId {
    /// Creates a new property ID from the given index.
    ///
    /// This is typically called by
    /// [`PropertyRegistry::register`](crate::PropertyRegistry::register)
    /// rather than directly.
    #[must_use]
    #[inline]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Returns the underlying index of this property ID.
    #[must_use]
    #[inline]
    pub const fn index(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PropertyId").field(&self.0).finish()
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyId({})", self.0)
    }
}

/// A registered owner type.
///
/// Owner types form an explicit single-inheritance hierarchy inside a
/// [`PropertyRegistry`](crate::PropertyRegistry): each type optionally names a
/// base type registered before it. Properties are declared against an owner
/// type, and metadata overrides are resolved by walking from a concrete type
/// toward its bases.
///
/// # Example
///
/// ```rust
/// use cambium_property::PropertyRegistry;
///
/// let mut registry = PropertyRegistry::new();
/// let visual = registry.register_type("Visual", None);
/// let control = registry.register_type("Control", Some(visual));
///
/// assert!(registry.is_assignable(control, visual));
/// assert!(!registry.is_assignable(visual, control));
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OwnerTypeId(u16);

impl OwnerTypeId {
    /// Creates a new owner type ID from the given index.
    ///
    /// This is typically called by
    /// [`PropertyRegistry::register_type`](crate::PropertyRegistry::register_type)
    /// rather than directly.
    #[must_use]
    #[inline]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Returns the underlying index of this owner type ID.
    #[must_use]
    #[inline]
    pub const fn index(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for OwnerTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OwnerTypeId").field(&self.0).finish()
    }
}

impl fmt::Display for OwnerTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerTypeId({})", self.0)
    }
}

/// A type-safe property key with a phantom type for compile-time checking.
///
/// This wraps a [`PropertyId`] with a phantom type parameter `T` that
/// represents the property's declared value type, so getting and setting
/// values is statically typed even though descriptor storage is type-erased.
///
/// # Type Safety
///
/// ```rust
/// use cambium_property::{Property, PropertyMetadataBuilder, PropertyRegistry};
///
/// let mut registry = PropertyRegistry::new();
/// let visual = registry.register_type("Visual", None);
///
/// let width: Property<f64> = registry.register(
///     "Width",
///     visual,
///     PropertyMetadataBuilder::new(0.0_f64).build(),
/// );
///
/// // The value type is checked at compile time wherever `width` is used.
/// let metadata = registry.metadata_for_owner(width, visual);
/// assert_eq!(metadata.default_value(), &0.0);
/// ```
///
/// # Memory Layout
///
/// `Property<T>` is the same size as `PropertyId` (2 bytes) since
/// `PhantomData` has zero size.
pub struct Property<T> {
    id: PropertyId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Property<T> {
    /// Creates a new typed property from a property ID.
    ///
    /// The caller must ensure that the `PropertyId` was registered with the
    /// same value type `T`; mismatched types cause panics at runtime.
    #[must_use]
    #[inline]
    pub const fn from_id(id: PropertyId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Returns the underlying property ID.
    #[must_use]
    #[inline]
    pub const fn id(self) -> PropertyId {
        self.id
    }
}

// Manual trait implementations to avoid requiring T: Clone, etc.

impl<T> Copy for Property<T> {}

impl<T> Clone for Property<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Property<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Property<T> {}

impl<T> Hash for Property<T> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("id", &self.id)
            .field("type", &core::any::type_name::<T>())
            .finish()
    }
}
