// Copyright 2025 the Cambium Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Value cells for bound properties.
//!
//! A [`ValueCell`] exists for every (object, property) pair with an active
//! binding. It owns the compiled accessors, the handle to the bound source,
//! the push-notification subscription when one could be installed, and the
//! cached effective value the last digest produced. Properties without a
//! binding have no cell; their effective value is resolved from stored
//! layers on demand.

use core::any::Any;
use core::fmt;

use cambium_binding::{AccessError, AccessorPair, BindingPath, SourceHandle, WatchHandle};
use cambium_property::{ErasedValue, OwnerTypeId, Property, PropertyId, PropertyRegistry};

use crate::digest::DigestId;
use crate::precedence::{SourceLayer, ValueSource};
use crate::store::SourceLayers;

/// Everything a cell needs to resolve its effective value.
///
/// Borrowed from the owning object for the duration of one digest.
#[derive(Debug)]
pub(crate) struct ResolveCtx<'a> {
    pub(crate) registry: &'a PropertyRegistry,
    pub(crate) owner: OwnerTypeId,
    pub(crate) layers: &'a SourceLayers,
}

/// The outcome of a digest that found a difference.
#[derive(Debug)]
pub(crate) struct CellChange {
    pub(crate) old: ErasedValue,
    pub(crate) new: ErasedValue,
    pub(crate) source: ValueSource,
}

/// A typed cell backing one bound property on one object.
pub(crate) struct ValueCell<T: Clone + 'static> {
    property: Property<T>,
    source: SourceHandle,
    accessors: AccessorPair<T>,
    /// The value last pulled through the compiled getter. `None` until the
    /// first pull, and always `None` for write-only bindings.
    bound_value: Option<T>,
    /// Push subscription on the source. Present exactly when the binding is
    /// push-covered.
    watch: Option<WatchHandle>,
    cached: T,
    cached_source: ValueSource,
    last_changed: DigestId,
}

impl<T: Clone + 'static> ValueCell<T> {
    /// Creates a cell whose cache holds the effective value from before the
    /// binding was attached.
    ///
    /// The first digest pulls the source and reports the transition away
    /// from that value, so attaching a binding raises a change like any
    /// other write.
    pub(crate) fn new(
        property: Property<T>,
        source: SourceHandle,
        accessors: AccessorPair<T>,
        watch: Option<WatchHandle>,
        initial: T,
        initial_source: ValueSource,
    ) -> Self {
        Self {
            property,
            source,
            accessors,
            bound_value: None,
            watch,
            cached: initial,
            cached_source: initial_source,
            last_changed: DigestId::ZERO,
        }
    }

    pub(crate) fn source(&self) -> &SourceHandle {
        &self.source
    }

    /// The effective value as of the last digest.
    pub(crate) fn cached(&self) -> &T {
        &self.cached
    }

    pub(crate) fn path(&self) -> &BindingPath {
        self.accessors.path()
    }

    /// Reads the raw underlying value through the compiled getter.
    ///
    /// This is the value at the source end of the binding, before animation
    /// or coercion.
    pub(crate) fn source_value(&self) -> Result<T, AccessError> {
        self.accessors.get(&self.source)
    }

    /// Writes a value through the compiled setter.
    ///
    /// Returns `Ok(false)` when a broken hop in the path made the write a
    /// no-op.
    pub(crate) fn write_source(&self, value: T) -> Result<bool, AccessError> {
        self.accessors.set(&self.source, value)
    }

    /// Recomputes the effective value and compares it with the cache.
    ///
    /// Pulls the bound value when the binding can read, resolves precedence
    /// across the stored layers, coerces when the winning source calls for
    /// it, and on a difference updates the cache, stamps it, and invokes the
    /// changed callback from the owner type's effective metadata.
    pub(crate) fn digest(
        &mut self,
        ctx: &ResolveCtx<'_>,
        stamp: DigestId,
    ) -> Option<CellChange> {
        if self.accessors.is_readable()
            && let Ok(value) = self.accessors.get(&self.source)
        {
            self.bound_value = Some(value);
        }

        let metadata = ctx.registry.metadata_for_owner(self.property, ctx.owner);
        let id = self.property.id();
        let layers = ctx.layers;

        let layer_value = |layer: SourceLayer| {
            layers
                .get(layer, id)
                .and_then(ErasedValue::downcast_ref::<T>)
                .cloned()
        };

        let base = if let Some(value) = layer_value(SourceLayer::Local) {
            Some((ValueSource::Local, value))
        } else if let Some(value) = &self.bound_value {
            Some((ValueSource::Bound, value.clone()))
        } else if let Some(value) = layer_value(SourceLayer::Triggered) {
            Some((ValueSource::Triggered, value))
        } else {
            layer_value(SourceLayer::Styled).map(|value| (ValueSource::Styled, value))
        };

        let (source, value) = if let Some(value) = layer_value(SourceLayer::Animated) {
            (ValueSource::Animated, value)
        } else if let Some(base) = base {
            base
        } else if let Some(value) = layer_value(SourceLayer::Inherited) {
            (ValueSource::Inherited, value)
        } else {
            (ValueSource::Default, metadata.default_value().clone())
        };

        let value = if source.is_coerced() {
            metadata.coerce(value)
        } else {
            value
        };

        self.cached_source = source;
        if metadata.values_equal(&self.cached, &value) {
            return None;
        }

        let old = core::mem::replace(&mut self.cached, value.clone());
        self.last_changed = stamp;
        metadata.on_changed(Some(&old), &value);
        Some(CellChange {
            old: ErasedValue::new(old),
            new: ErasedValue::new(value),
            source,
        })
    }
}

impl<T: Clone + 'static> fmt::Debug for ValueCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueCell")
            .field("property", &self.property.id())
            .field("path", &self.accessors.path().text())
            .field("cached_source", &self.cached_source)
            .field("last_changed", &self.last_changed)
            .field("push_covered", &self.watch.is_some())
            .finish_non_exhaustive()
    }
}

/// Type-erased view of a [`ValueCell`], stored per object.
pub(crate) trait ErasedCell: fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn property(&self) -> PropertyId;
    fn last_changed(&self) -> DigestId;
    fn cached_erased(&self) -> ErasedValue;
    fn cached_source(&self) -> ValueSource;
    fn is_push_covered(&self) -> bool;
    /// Whether the scheduler must sweep this cell: it can read its source
    /// and no push notification covers it.
    fn needs_sweep(&self) -> bool;
    fn digest_erased(&mut self, ctx: &ResolveCtx<'_>, stamp: DigestId) -> Option<CellChange>;
    /// Drops the push subscription, if one was installed.
    fn unhook(&mut self);
}

impl<T: Clone + 'static> ErasedCell for ValueCell<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn property(&self) -> PropertyId {
        self.property.id()
    }

    fn last_changed(&self) -> DigestId {
        self.last_changed
    }

    fn cached_erased(&self) -> ErasedValue {
        ErasedValue::new(self.cached.clone())
    }

    fn cached_source(&self) -> ValueSource {
        self.cached_source
    }

    fn is_push_covered(&self) -> bool {
        self.watch.is_some()
    }

    fn needs_sweep(&self) -> bool {
        self.accessors.is_readable() && self.watch.is_none()
    }

    fn digest_erased(&mut self, ctx: &ResolveCtx<'_>, stamp: DigestId) -> Option<CellChange> {
        self.digest(ctx, stamp)
    }

    fn unhook(&mut self) {
        if let Some(handle) = self.watch.take() {
            self.source.unwatch(handle);
        }
    }
}

impl dyn ErasedCell {
    pub(crate) fn downcast_ref<T: Clone + 'static>(&self) -> Option<&ValueCell<T>> {
        self.as_any().downcast_ref()
    }

    pub(crate) fn downcast_mut<T: Clone + 'static>(&mut self) -> Option<&mut ValueCell<T>> {
        self.as_any_mut().downcast_mut()
    }
}
