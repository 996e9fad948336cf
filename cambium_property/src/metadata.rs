// Copyright 2025 the Cambium Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property metadata definitions.
//!
//! This module provides [`PropertyMetadata`] for storing per-property
//! configuration, [`PropertyMetadataBuilder`] for ergonomic construction, and
//! [`MetadataPatch`] for partial per-owner-type overrides.

use alloc::sync::Arc;

use crate::value::ErasedValue;

bitflags::bitflags! {
    /// Option flags describing what a property change affects.
    ///
    /// The empty set means a change has no layout or inheritance side effects
    /// beyond notification. Layout collaborators read these flags to decide
    /// which invalidation queues an owning object joins when the property
    /// changes.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct PropertyOptions: u8 {
        /// A change invalidates the owning object's measured size.
        const AFFECTS_MEASURE       = 0b0000_0001;
        /// A change invalidates the owning object's arrangement.
        const AFFECTS_ARRANGE       = 0b0000_0010;
        /// A change invalidates the owning object's visual bounds.
        const AFFECTS_VISUAL_BOUNDS = 0b0000_0100;
        /// The effective value flows to descendants that do not set one.
        const INHERITS              = 0b0000_1000;
    }
}

impl Default for PropertyOptions {
    fn default() -> Self {
        Self::empty()
    }
}

/// Callback invoked when a property's effective value changes.
///
/// The callback receives the old value and the new value. It observes the
/// change only; further mutation goes back through the owning engine.
pub type PropertyChangedCallback<T> = Arc<dyn Fn(Option<&T>, &T) + Send + Sync>;

/// Callback for coercing a property value before it becomes the cached value.
///
/// This can be used to clamp values, validate ranges, etc. The callback
/// receives the winning base value and returns the coerced value.
pub type CoerceValueCallback<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

/// Metadata for a property.
///
/// This contains the configuration for one property on one owner-type level:
/// its default value, option flags, the equality comparer used for change
/// detection, and optional changed/coerce callbacks. Subtypes customize
/// metadata through [`MetadataPatch`] overrides registered with the registry.
///
/// # Example
///
/// ```rust
/// use cambium_property::{PropertyMetadataBuilder, PropertyOptions};
///
/// let metadata = PropertyMetadataBuilder::new(100.0_f64)
///     .options(PropertyOptions::AFFECTS_MEASURE | PropertyOptions::INHERITS)
///     .coerce(|v: f64| v.clamp(0.0, 200.0))
///     .build();
///
/// assert_eq!(metadata.default_value(), &100.0);
/// assert!(metadata.inherits());
/// assert_eq!(metadata.coerce(500.0), 200.0);
/// ```
pub struct PropertyMetadata<T: Clone + 'static> {
    default_value: T,
    options: PropertyOptions,
    comparer: fn(&T, &T) -> bool,
    changed_callback: Option<PropertyChangedCallback<T>>,
    coerce_callback: Option<CoerceValueCallback<T>>,
}

impl<T: Clone + PartialEq + 'static> PropertyMetadata<T> {
    /// Creates new property metadata with the given default value.
    ///
    /// The comparer is `PartialEq` equality. All other fields use their
    /// defaults: empty options, no changed callback, no coerce callback.
    #[must_use]
    pub fn new(default_value: T) -> Self {
        Self::with_comparer(default_value, T::eq)
    }
}

impl<T: Clone + 'static> PropertyMetadata<T> {
    /// Creates new property metadata with an explicit equality comparer.
    ///
    /// Use this for value types without a usable `PartialEq`, or for
    /// reference-typed values that should compare by identity, e.g.
    /// `Rc::ptr_eq` for an `Rc`-typed property.
    #[must_use]
    pub fn with_comparer(default_value: T, comparer: fn(&T, &T) -> bool) -> Self {
        Self {
            default_value,
            options: PropertyOptions::empty(),
            comparer,
            changed_callback: None,
            coerce_callback: None,
        }
    }

    /// Returns a reference to the default value.
    #[must_use]
    #[inline]
    pub fn default_value(&self) -> &T {
        &self.default_value
    }

    /// Returns the option flags.
    #[must_use]
    #[inline]
    pub fn options(&self) -> PropertyOptions {
        self.options
    }

    /// Returns whether this property's value inherits to descendants.
    #[must_use]
    #[inline]
    pub fn inherits(&self) -> bool {
        self.options.contains(PropertyOptions::INHERITS)
    }

    /// Returns the equality comparer used for change detection.
    #[must_use]
    #[inline]
    pub fn comparer(&self) -> fn(&T, &T) -> bool {
        self.comparer
    }

    /// Compares two values with the resolved comparer.
    #[must_use]
    #[inline]
    pub fn values_equal(&self, a: &T, b: &T) -> bool {
        (self.comparer)(a, b)
    }

    /// Invokes the changed callback if one is set.
    #[inline]
    pub fn on_changed(&self, old_value: Option<&T>, new_value: &T) {
        if let Some(callback) = &self.changed_callback {
            callback(old_value, new_value);
        }
    }

    /// Coerces a value using the coerce callback if one is set.
    #[inline]
    pub fn coerce(&self, value: T) -> T {
        if let Some(callback) = &self.coerce_callback {
            callback(value)
        } else {
            value
        }
    }

    /// Returns whether a changed callback is set.
    #[must_use]
    #[inline]
    pub fn has_changed_callback(&self) -> bool {
        self.changed_callback.is_some()
    }

    /// Returns whether a coerce callback is set.
    #[must_use]
    #[inline]
    pub fn has_coerce_callback(&self) -> bool {
        self.coerce_callback.is_some()
    }

    /// Coerces a type-erased value, panicking on a type mismatch.
    ///
    /// Used by the erased write paths (style application) where the caller
    /// holds an [`ErasedValue`] rather than a `T`.
    #[must_use]
    pub fn coerce_erased(&self, value: ErasedValue) -> ErasedValue {
        if self.coerce_callback.is_none() {
            return value;
        }
        match value.downcast::<T>() {
            Ok(v) => ErasedValue::new(self.coerce(v)),
            Err(value) => panic!(
                "Cannot coerce value of type '{}' as '{}'",
                value.type_name(),
                core::any::type_name::<T>()
            ),
        }
    }
}

// Manual Debug impl since callbacks and fn pointers aren't Debug.
impl<T: Clone + core::fmt::Debug + 'static> core::fmt::Debug for PropertyMetadata<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PropertyMetadata")
            .field("default_value", &self.default_value)
            .field("options", &self.options)
            .field("has_changed_callback", &self.changed_callback.is_some())
            .field("has_coerce_callback", &self.coerce_callback.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`PropertyMetadata`].
///
/// # Example
///
/// ```rust
/// use cambium_property::{PropertyMetadataBuilder, PropertyOptions};
///
/// let metadata = PropertyMetadataBuilder::new(0.0_f64)
///     .options(PropertyOptions::AFFECTS_ARRANGE)
///     .on_changed(|_, new| { let _ = new; })
///     .build();
/// ```
pub struct PropertyMetadataBuilder<T: Clone + 'static> {
    metadata: PropertyMetadata<T>,
}

impl<T: Clone + PartialEq + 'static> PropertyMetadataBuilder<T> {
    /// Creates a new builder with the given default value and `PartialEq`
    /// equality as the comparer.
    #[must_use]
    pub fn new(default_value: T) -> Self {
        Self {
            metadata: PropertyMetadata::new(default_value),
        }
    }
}

impl<T: Clone + 'static> PropertyMetadataBuilder<T> {
    /// Creates a new builder with an explicit equality comparer.
    #[must_use]
    pub fn with_comparer(default_value: T, comparer: fn(&T, &T) -> bool) -> Self {
        Self {
            metadata: PropertyMetadata::with_comparer(default_value, comparer),
        }
    }

    /// Sets the option flags.
    #[must_use]
    pub fn options(mut self, options: PropertyOptions) -> Self {
        self.metadata.options = options;
        self
    }

    /// Replaces the equality comparer.
    #[must_use]
    pub fn compare_with(mut self, comparer: fn(&T, &T) -> bool) -> Self {
        self.metadata.comparer = comparer;
        self
    }

    /// Sets a callback to be invoked when the effective value changes.
    #[must_use]
    pub fn on_changed<F>(mut self, callback: F) -> Self
    where
        F: Fn(Option<&T>, &T) + Send + Sync + 'static,
    {
        self.metadata.changed_callback = Some(Arc::new(callback));
        self
    }

    /// Sets a callback to coerce the base value before it is cached.
    #[must_use]
    pub fn coerce<F>(mut self, callback: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        self.metadata.coerce_callback = Some(Arc::new(callback));
        self
    }

    /// Builds the [`PropertyMetadata`].
    #[must_use]
    pub fn build(self) -> PropertyMetadata<T> {
        self.metadata
    }
}

impl<T: Clone + core::fmt::Debug + 'static> core::fmt::Debug for PropertyMetadataBuilder<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PropertyMetadataBuilder")
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// A partial metadata override for a subtype.
///
/// Every field is optional. When applied, set fields replace the nearest
/// ancestor override's fields wholesale (callbacks are replaced, never
/// chained); unset fields fall through to that ancestor override, or to the
/// property's base metadata when no ancestor overrides it.
///
/// # Example
///
/// ```rust
/// use cambium_property::{MetadataPatch, PropertyMetadataBuilder, PropertyRegistry};
///
/// let mut registry = PropertyRegistry::new();
/// let visual = registry.register_type("Visual", None);
/// let control = registry.register_type("Control", Some(visual));
///
/// let opacity = registry.register(
///     "Opacity",
///     visual,
///     PropertyMetadataBuilder::new(1.0_f64).build(),
/// );
///
/// // Controls default to fully transparent instead.
/// registry.override_metadata(opacity, control, MetadataPatch::new().default_value(0.0));
///
/// assert_eq!(registry.metadata_for_owner(opacity, visual).default_value(), &1.0);
/// assert_eq!(registry.metadata_for_owner(opacity, control).default_value(), &0.0);
/// ```
pub struct MetadataPatch<T: Clone + 'static> {
    default_value: Option<T>,
    options: Option<PropertyOptions>,
    comparer: Option<fn(&T, &T) -> bool>,
    changed_callback: Option<PropertyChangedCallback<T>>,
    coerce_callback: Option<CoerceValueCallback<T>>,
}

impl<T: Clone + 'static> MetadataPatch<T> {
    /// Creates an empty patch that inherits every field.
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_value: None,
            options: None,
            comparer: None,
            changed_callback: None,
            coerce_callback: None,
        }
    }

    /// Replaces the default value.
    #[must_use]
    pub fn default_value(mut self, value: T) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Replaces the option flags.
    #[must_use]
    pub fn options(mut self, options: PropertyOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Replaces the equality comparer.
    #[must_use]
    pub fn compare_with(mut self, comparer: fn(&T, &T) -> bool) -> Self {
        self.comparer = Some(comparer);
        self
    }

    /// Replaces the changed callback.
    #[must_use]
    pub fn on_changed<F>(mut self, callback: F) -> Self
    where
        F: Fn(Option<&T>, &T) + Send + Sync + 'static,
    {
        self.changed_callback = Some(Arc::new(callback));
        self
    }

    /// Replaces the coerce callback.
    #[must_use]
    pub fn coerce<F>(mut self, callback: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        self.coerce_callback = Some(Arc::new(callback));
        self
    }

    /// Materializes a full metadata by merging this patch over `base`.
    ///
    /// `base` is the nearest ancestor override, or the property's base
    /// metadata when no ancestor supplies one.
    #[must_use]
    pub fn merge_over(self, base: &PropertyMetadata<T>) -> PropertyMetadata<T> {
        PropertyMetadata {
            default_value: self
                .default_value
                .unwrap_or_else(|| base.default_value.clone()),
            options: self.options.unwrap_or(base.options),
            comparer: self.comparer.unwrap_or(base.comparer),
            changed_callback: self.changed_callback.or_else(|| base.changed_callback.clone()),
            coerce_callback: self.coerce_callback.or_else(|| base.coerce_callback.clone()),
        }
    }
}

impl<T: Clone + 'static> Default for MetadataPatch<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + core::fmt::Debug + 'static> core::fmt::Debug for MetadataPatch<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MetadataPatch")
            .field("default_value", &self.default_value)
            .field("options", &self.options)
            .field("replaces_changed_callback", &self.changed_callback.is_some())
            .field("replaces_coerce_callback", &self.coerce_callback.is_some())
            .finish_non_exhaustive()
    }
}
