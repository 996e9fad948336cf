// Copyright 2025 the Cambium Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The property engine.
//!
//! [`PropertyEngine`] owns the per-object state of every attached object:
//! its stored source layers, the cells of its bound properties, its place in
//! the inheritance tree. On top of that it coordinates the machinery from
//! the rest of the crate — the digest scheduler, the change hub, the binding
//! compiler, and the invalidation queues — so that a value write, a style
//! application, a source mutation, or a tick all funnel through one change
//! pipeline: resolve, compare, cache, callback, notify, invalidate, inherit.
//!
//! The engine deliberately does not own a [`PropertyRegistry`]; callers pass
//! the registry into each operation that needs metadata. That keeps one
//! registry shareable across engines and makes the dependency explicit at
//! every call site.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::any::TypeId;
use core::fmt;
use core::hash::Hash;

use hashbrown::HashMap;
use smallvec::SmallVec;

use cambium_binding::{AccessError, BindError, BindingCompiler, SourceHandle, TypeSchema};
use cambium_property::{
    ErasedValue, OwnerTypeId, Property, PropertyId, PropertyOptions, PropertyRegistry, Style,
    StyleTarget,
};

use crate::cell::{CellChange, ErasedCell, ResolveCtx, ValueCell};
use crate::digest::{DigestId, DigestScheduler};
use crate::hub::{ChangeHub, ChangeSubscriber, PropertyChange, SubscriptionId};
use crate::invalidate::InvalidationSet;
use crate::precedence::{SourceLayer, ValueSource};
use crate::store::{SourceLayers, resolve_effective};

/// Counters reported by a digest pass.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Number of cells digested.
    pub digested: usize,
    /// Number of digests that found a change.
    pub changed: usize,
}

/// Everything the engine knows about one attached object.
struct ObjectEntry<K> {
    owner_type: OwnerTypeId,
    parent: Option<K>,
    children: Vec<K>,
    layers: SourceLayers,
    /// Cells for bound properties, sorted by [`PropertyId`].
    cells: SmallVec<[(PropertyId, Box<dyn ErasedCell>); 2]>,
}

fn find_cell_slot(
    cells: &[(PropertyId, Box<dyn ErasedCell>)],
    id: PropertyId,
) -> Result<usize, usize> {
    cells.binary_search_by_key(&id, |(pid, _)| *pid)
}

fn find_cell(
    cells: &[(PropertyId, Box<dyn ErasedCell>)],
    id: PropertyId,
) -> Option<&(dyn ErasedCell + 'static)> {
    find_cell_slot(cells, id).ok().map(|idx| &*cells[idx].1)
}

/// Style application target that records which slots it touched.
///
/// Captures the pre-write effective value per property so the engine can run
/// its change pipeline after the style's compiled setters have finished.
struct StyleSink<'a> {
    registry: &'a PropertyRegistry,
    owner: OwnerTypeId,
    layers: &'a mut SourceLayers,
    cells: &'a [(PropertyId, Box<dyn ErasedCell>)],
    touched: Vec<(PropertyId, (ValueSource, ErasedValue))>,
}

impl StyleTarget for StyleSink<'_> {
    fn apply_styled(&mut self, property: PropertyId, value: &ErasedValue) -> bool {
        let unchanged = self
            .layers
            .get(SourceLayer::Styled, property)
            .is_some_and(|existing| {
                self.registry
                    .values_equal_for_owner(property, self.owner, existing, value)
            });
        if unchanged {
            return false;
        }
        let old = match find_cell(self.cells, property) {
            Some(cell) => (cell.cached_source(), cell.cached_erased()),
            None => resolve_effective(self.registry, self.owner, property, self.layers),
        };
        self.layers
            .set(SourceLayer::Styled, property, value.clone_value());
        self.touched.push((property, old));
        true
    }
}

/// Reactive state for a tree of objects, keyed by `K`.
///
/// `K` is whatever the host uses to identify objects: an ECS entity id, a
/// slotmap key, an index. The engine never allocates keys itself; objects
/// enter with [`PropertyEngine::attach`] and leave with
/// [`PropertyEngine::detach`].
pub struct PropertyEngine<K> {
    objects: HashMap<K, ObjectEntry<K>>,
    hub: ChangeHub<K>,
    scheduler: DigestScheduler<K>,
    compiler: BindingCompiler,
    invalidations: InvalidationSet<K>,
    /// Reused digest batch buffer.
    scratch: Vec<(K, PropertyId)>,
}

impl<K: Copy + Eq + Hash + 'static> PropertyEngine<K> {
    /// Creates an engine with no attached objects.
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
            hub: ChangeHub::new(),
            scheduler: DigestScheduler::new(),
            compiler: BindingCompiler::new(),
            invalidations: InvalidationSet::new(),
            scratch: Vec::new(),
        }
    }

    // =========================================================================
    // Object topology
    // =========================================================================

    /// Attaches an object with the given owner type and optional parent.
    ///
    /// Inheritable values visible on the parent are seeded into the new
    /// object's inherited layer, silently: attaching defines initial state
    /// and raises no change events.
    ///
    /// # Panics
    ///
    /// Panics if the object is already attached, or if a parent is named
    /// that is not.
    pub fn attach(
        &mut self,
        registry: &PropertyRegistry,
        object: K,
        owner_type: OwnerTypeId,
        parent: Option<K>,
    ) {
        assert!(
            !self.objects.contains_key(&object),
            "Object is already attached to the property engine"
        );
        let seeds = match parent {
            Some(p) => {
                assert!(
                    self.objects.contains_key(&p),
                    "Parent object is not attached to the property engine"
                );
                self.inheritable_seeds(registry, p)
            }
            None => Vec::new(),
        };
        let mut entry = ObjectEntry {
            owner_type,
            parent,
            children: Vec::new(),
            layers: SourceLayers::new(),
            cells: SmallVec::new(),
        };
        for (property, value) in seeds {
            entry.layers.set(SourceLayer::Inherited, property, value);
        }
        self.objects.insert(object, entry);
        if let Some(p) = parent
            && let Some(parent_entry) = self.objects.get_mut(&p)
        {
            parent_entry.children.push(object);
        }
    }

    /// Detaches an object, dropping its values, bindings, and subscriptions.
    ///
    /// Push subscriptions on bound sources are released and the object's
    /// cells leave the sweep list. Children of the detached object stay
    /// attached with their parent link cleared; detaching a subtree is the
    /// host's loop to write. Returns `false` if the object was not attached.
    pub fn detach(&mut self, object: K) -> bool {
        let Some(mut entry) = self.objects.remove(&object) else {
            return false;
        };
        for (_, cell) in &mut entry.cells {
            cell.unhook();
        }
        self.scheduler.withdraw_object(object);
        self.hub.unsubscribe_target(object);
        if let Some(parent) = entry.parent
            && let Some(parent_entry) = self.objects.get_mut(&parent)
        {
            parent_entry.children.retain(|c| *c != object);
        }
        for child in &entry.children {
            if let Some(child_entry) = self.objects.get_mut(child) {
                child_entry.parent = None;
            }
        }
        true
    }

    /// Moves an object under a new parent (or to the root with `None`).
    ///
    /// Inherited values are recomputed against the new ancestor chain, and
    /// every resulting effective-value change runs the full change pipeline,
    /// descendants included.
    ///
    /// # Panics
    ///
    /// Panics if either object is not attached, or if the move would make
    /// the object its own ancestor.
    pub fn set_parent(&mut self, registry: &PropertyRegistry, object: K, new_parent: Option<K>) {
        let old_parent = self.entry(object).parent;
        if let Some(p) = new_parent {
            assert!(
                self.objects.contains_key(&p),
                "Parent object is not attached to the property engine"
            );
            let mut cursor = Some(p);
            while let Some(ancestor) = cursor {
                assert!(ancestor != object, "Reparenting would create a cycle");
                cursor = self.objects.get(&ancestor).and_then(|e| e.parent);
            }
        }
        if old_parent == new_parent {
            return;
        }

        if let Some(p) = old_parent
            && let Some(entry) = self.objects.get_mut(&p)
        {
            entry.children.retain(|c| *c != object);
        }
        self.entry_mut(object).parent = new_parent;
        if let Some(p) = new_parent
            && let Some(entry) = self.objects.get_mut(&p)
        {
            entry.children.push(object);
        }

        // Rebuild the inherited layer against the new chain and refresh
        // every property whose entry appears on either side of the move.
        let seeds = match new_parent {
            Some(p) => self.inheritable_seeds(registry, p),
            None => Vec::new(),
        };
        let mut union: Vec<PropertyId> = self
            .entry(object)
            .layers
            .ids_in(SourceLayer::Inherited)
            .into_iter()
            .collect();
        for (property, _) in &seeds {
            if !union.contains(property) {
                union.push(*property);
            }
        }
        for property in union {
            let seed = seeds
                .iter()
                .find(|(p, _)| *p == property)
                .map(|(_, v)| v.clone_value());
            let old = {
                let entry = self.entry_mut(object);
                let old = Self::entry_effective(registry, entry, property);
                match seed {
                    Some(value) => {
                        entry.layers.set(SourceLayer::Inherited, property, value);
                    }
                    None => {
                        entry.layers.clear(SourceLayer::Inherited, property);
                    }
                }
                old
            };
            self.refresh_property(registry, object, property, old);
        }
    }

    /// Returns `true` if the object is attached.
    #[must_use]
    pub fn contains(&self, object: K) -> bool {
        self.objects.contains_key(&object)
    }

    /// Number of attached objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// The object's parent, if any.
    #[must_use]
    pub fn parent(&self, object: K) -> Option<K> {
        self.entry(object).parent
    }

    /// The object's children, in attach order.
    #[must_use]
    pub fn children(&self, object: K) -> &[K] {
        &self.entry(object).children
    }

    /// The owner type the object was attached with.
    #[must_use]
    pub fn owner_type(&self, object: K) -> OwnerTypeId {
        self.entry(object).owner_type
    }

    // =========================================================================
    // Reading values
    // =========================================================================

    /// Returns the effective value of a property on an object.
    ///
    /// For bound properties this is the cell's cached value as of its last
    /// digest; for everything else the value is resolved from the stored
    /// layers on the spot, coercion included.
    ///
    /// # Panics
    ///
    /// Panics if the object is not attached, the property is not registered,
    /// or `T` is not the property's value type.
    #[must_use]
    pub fn value<T: Clone + 'static>(
        &self,
        registry: &PropertyRegistry,
        object: K,
        property: Property<T>,
    ) -> T {
        let entry = self.entry(object);
        if let Some(cell) = find_cell(&entry.cells, property.id()) {
            let Some(cell) = cell.downcast_ref::<T>() else {
                let descriptor = registry.descriptor(property.id());
                panic!(
                    "Property '{}' stores values of type '{}', not '{}'",
                    descriptor.name(),
                    descriptor.value_type_name(),
                    core::any::type_name::<T>()
                );
            };
            return cell.cached().clone();
        }
        let (_, value) = resolve_effective(registry, entry.owner_type, property.id(), &entry.layers);
        match value.downcast::<T>() {
            Ok(value) => value,
            Err(value) => {
                let descriptor = registry.descriptor(property.id());
                panic!(
                    "Property '{}' stores values of type '{}', not '{}'",
                    descriptor.name(),
                    value.type_name(),
                    core::any::type_name::<T>()
                );
            }
        }
    }

    /// Returns a borrowed view of the effective value, when one exists.
    ///
    /// Bound properties borrow from the cell's cache. Unbound properties
    /// borrow from the winning stored layer, or from the metadata default.
    /// Returns `None` exactly when the effective value would have to be
    /// computed, that is when the winning source passes through a coerce
    /// callback; [`Self::value`] always succeeds and clones.
    ///
    /// # Panics
    ///
    /// Panics if the object is not attached, the property is not registered,
    /// or `T` is not the property's value type.
    #[must_use]
    pub fn value_ref<'a, T: Clone + 'static>(
        &'a self,
        registry: &'a PropertyRegistry,
        object: K,
        property: Property<T>,
    ) -> Option<&'a T> {
        let entry = self.entry(object);
        if let Some(cell) = find_cell(&entry.cells, property.id()) {
            let Some(cell) = cell.downcast_ref::<T>() else {
                let descriptor = registry.descriptor(property.id());
                panic!(
                    "Property '{}' stores values of type '{}', not '{}'",
                    descriptor.name(),
                    descriptor.value_type_name(),
                    core::any::type_name::<T>()
                );
            };
            return Some(cell.cached());
        }
        let metadata = registry.metadata_for_owner(property, entry.owner_type);
        for layer in [
            SourceLayer::Animated,
            SourceLayer::Local,
            SourceLayer::Triggered,
            SourceLayer::Styled,
        ] {
            if let Some(value) = entry.layers.get(layer, property.id()) {
                if metadata.has_coerce_callback() {
                    return None;
                }
                return Some(Self::borrow_stored(registry, property.id(), value));
            }
        }
        if let Some(value) = entry.layers.get(SourceLayer::Inherited, property.id()) {
            return Some(Self::borrow_stored(registry, property.id(), value));
        }
        Some(metadata.default_value())
    }

    /// Returns the effective value as an erased box.
    #[must_use]
    pub fn value_erased(
        &self,
        registry: &PropertyRegistry,
        object: K,
        property: PropertyId,
    ) -> ErasedValue {
        Self::entry_effective(registry, self.entry(object), property).1
    }

    /// Reports where the effective value currently comes from.
    #[must_use]
    pub fn value_source(
        &self,
        registry: &PropertyRegistry,
        object: K,
        property: PropertyId,
    ) -> ValueSource {
        Self::entry_effective(registry, self.entry(object), property).0
    }

    /// Returns the raw local value, if one is set.
    ///
    /// This is the value as written, before animation or coercion.
    #[must_use]
    pub fn local_value(&self, object: K, property: PropertyId) -> Option<ErasedValue> {
        self.entry(object)
            .layers
            .get(SourceLayer::Local, property)
            .map(ErasedValue::clone_value)
    }

    /// Returns `true` if the property has an active binding on the object.
    #[must_use]
    pub fn is_bound(&self, object: K, property: PropertyId) -> bool {
        find_cell(&self.entry(object).cells, property).is_some()
    }

    /// The digest cycle in which a bound property last changed.
    ///
    /// `None` for properties without a binding; their changes are not
    /// stamped.
    #[must_use]
    pub fn last_changed(&self, object: K, property: PropertyId) -> Option<DigestId> {
        find_cell(&self.entry(object).cells, property).map(|cell| cell.last_changed())
    }

    /// Returns `true` if a bound property changed in the current digest
    /// cycle.
    ///
    /// Immediate digests between ticks stamp the upcoming cycle, so the tick
    /// that follows them still reports their changes. Always `false` before
    /// the first sweep and for properties without a binding.
    #[must_use]
    pub fn changed_this_tick(&self, object: K, property: PropertyId) -> bool {
        let current = self.current_cycle();
        current != DigestId::ZERO && self.last_changed(object, property) == Some(current)
    }

    // =========================================================================
    // Writing values
    // =========================================================================

    /// Sets the local value of a property.
    ///
    /// # Panics
    ///
    /// Panics if the object is not attached, the property is read-only, or
    /// the value type does not match.
    pub fn set_local<T: Clone + 'static>(
        &mut self,
        registry: &PropertyRegistry,
        object: K,
        property: Property<T>,
        value: T,
    ) {
        let descriptor = registry.descriptor(property.id());
        assert!(
            !descriptor.is_read_only(),
            "Property '{}' is read-only and cannot be set",
            descriptor.name()
        );
        self.write_layer(
            registry,
            object,
            property.id(),
            SourceLayer::Local,
            ErasedValue::new(value),
        );
    }

    /// Sets the local value of a read-only property.
    ///
    /// Read-only properties are computed by their owner type (think
    /// `ActualWidth`); this is the write path for that computation. All
    /// other write paths reject read-only properties.
    pub fn force_set_local<T: Clone + 'static>(
        &mut self,
        registry: &PropertyRegistry,
        object: K,
        property: Property<T>,
        value: T,
    ) {
        self.write_layer(
            registry,
            object,
            property.id(),
            SourceLayer::Local,
            ErasedValue::new(value),
        );
    }

    /// Sets the triggered value of a property.
    ///
    /// # Panics
    ///
    /// Panics if the object is not attached, the property is read-only, or
    /// the value type does not match.
    pub fn set_triggered<T: Clone + 'static>(
        &mut self,
        registry: &PropertyRegistry,
        object: K,
        property: Property<T>,
        value: T,
    ) {
        let descriptor = registry.descriptor(property.id());
        assert!(
            !descriptor.is_read_only(),
            "Property '{}' is read-only and cannot be triggered",
            descriptor.name()
        );
        self.write_layer(
            registry,
            object,
            property.id(),
            SourceLayer::Triggered,
            ErasedValue::new(value),
        );
    }

    /// Sets the animation value of a property.
    ///
    /// Animation outranks every other source, and the animated value passes
    /// through the coerce callback like any strong source.
    ///
    /// # Panics
    ///
    /// Panics if the object is not attached, the property is read-only, or
    /// the value type does not match.
    pub fn set_animation<T: Clone + 'static>(
        &mut self,
        registry: &PropertyRegistry,
        object: K,
        property: Property<T>,
        value: T,
    ) {
        let descriptor = registry.descriptor(property.id());
        assert!(
            !descriptor.is_read_only(),
            "Property '{}' is read-only and cannot be animated",
            descriptor.name()
        );
        self.write_layer(
            registry,
            object,
            property.id(),
            SourceLayer::Animated,
            ErasedValue::new(value),
        );
    }

    /// Clears the local value. Returns `true` if one was set.
    pub fn clear_local(
        &mut self,
        registry: &PropertyRegistry,
        object: K,
        property: PropertyId,
    ) -> bool {
        self.clear_layer(registry, object, property, SourceLayer::Local)
    }

    /// Clears the styled value. Returns `true` if one was set.
    pub fn clear_styled(
        &mut self,
        registry: &PropertyRegistry,
        object: K,
        property: PropertyId,
    ) -> bool {
        self.clear_layer(registry, object, property, SourceLayer::Styled)
    }

    /// Clears the triggered value. Returns `true` if one was set.
    pub fn clear_triggered(
        &mut self,
        registry: &PropertyRegistry,
        object: K,
        property: PropertyId,
    ) -> bool {
        self.clear_layer(registry, object, property, SourceLayer::Triggered)
    }

    /// Clears the animation value. Returns `true` if one was set.
    pub fn clear_animation(
        &mut self,
        registry: &PropertyRegistry,
        object: K,
        property: PropertyId,
    ) -> bool {
        self.clear_layer(registry, object, property, SourceLayer::Animated)
    }

    /// Applies a style's setters to an object.
    ///
    /// Returns the number of styled slots that changed. Each slot change
    /// runs the full change pipeline, so coercion, callbacks, notification,
    /// and invalidation behave exactly as for direct writes.
    ///
    /// # Panics
    ///
    /// Panics if the object is not attached, or if the style carries a value
    /// for a read-only property or a value of the wrong type.
    pub fn apply_style(
        &mut self,
        registry: &PropertyRegistry,
        object: K,
        style: &Style,
    ) -> usize {
        let touched = {
            let Some(entry) = self.objects.get_mut(&object) else {
                panic!("Object is not attached to the property engine");
            };
            let ObjectEntry {
                owner_type,
                layers,
                cells,
                ..
            } = entry;
            let mut sink = StyleSink {
                registry,
                owner: *owner_type,
                layers,
                cells,
                touched: Vec::new(),
            };
            style.apply(registry, &mut sink);
            sink.touched
        };
        let applied = touched.len();
        for (property, old) in touched {
            self.refresh_property(registry, object, property, old);
        }
        applied
    }

    /// Clears every styled slot a style had set.
    ///
    /// Returns the number of slots cleared.
    pub fn remove_style(
        &mut self,
        registry: &PropertyRegistry,
        object: K,
        style: &Style,
    ) -> usize {
        let ids: SmallVec<[PropertyId; 8]> = style.property_ids().collect();
        let mut cleared = 0;
        for property in ids {
            if self.clear_layer(registry, object, property, SourceLayer::Styled) {
                cleared += 1;
            }
        }
        cleared
    }

    /// Re-runs coercion for a bound property whose coerce inputs changed.
    ///
    /// Bound properties cache their coerced value, so a coerce callback that
    /// reads external state needs this nudge when that state moves.
    /// Properties without a binding coerce on every read and need no nudge;
    /// for them this is a no-op. Returns `true` if the value changed.
    pub fn coerce_value(
        &mut self,
        registry: &PropertyRegistry,
        object: K,
        property: PropertyId,
    ) -> bool {
        self.digest_one(registry, object, property)
    }

    // =========================================================================
    // Bindings
    // =========================================================================

    /// Registers a schema with the engine's binding compiler.
    ///
    /// # Panics
    ///
    /// Panics if a schema for the same source type is already registered.
    pub fn register_schema(&mut self, schema: TypeSchema) {
        self.compiler.register_schema(schema);
    }

    /// Binds a property to a path into a source.
    ///
    /// The path is compiled against the source's state type; compiled
    /// accessors are cached per (path, source type, value type), so binding
    /// the same shape on many objects compiles once. If the path is a single
    /// member and the source is instrumented, the binding is covered by push
    /// notification and skips digest sweeps; otherwise the cell enrolls with
    /// the scheduler and is pulled every tick.
    ///
    /// Binding an already bound property replaces the old binding in a
    /// single transition: one change event from the old binding's value to
    /// the new one.
    ///
    /// # Errors
    ///
    /// Returns a [`BindError`] when the path cannot be parsed or resolved.
    /// A failed bind leaves the property untouched.
    ///
    /// # Panics
    ///
    /// Panics if the object is not attached, the property is read-only, or
    /// `T` is not the property's value type.
    pub fn bind<T: Clone + Default + 'static>(
        &mut self,
        registry: &PropertyRegistry,
        object: K,
        property: Property<T>,
        source: &SourceHandle,
        path: &str,
    ) -> Result<(), BindError> {
        let descriptor = registry.descriptor(property.id());
        assert!(
            !descriptor.is_read_only(),
            "Property '{}' is read-only and cannot be bound",
            descriptor.name()
        );
        assert!(
            descriptor.value_type() == TypeId::of::<T>(),
            "Property '{}' stores values of type '{}', not '{}'",
            descriptor.name(),
            descriptor.value_type_name(),
            core::any::type_name::<T>()
        );
        // Compile first so a bad path leaves the property untouched.
        let accessors = self.compiler.compile::<T>(source, path)?;

        let watch = match accessors.path().single_member() {
            Some(member) if accessors.is_readable() => {
                let pending = self.scheduler.pending_handle();
                let id = property.id();
                source.watch(
                    Some(&**member),
                    Rc::new(move || pending.borrow_mut().mark(object, id)),
                )
            }
            _ => None,
        };
        let sweeps = accessors.is_readable() && watch.is_none();

        {
            let entry = self.entry_mut(object);
            let (initial_source, initial) = Self::entry_effective(registry, entry, property.id());
            if let Ok(idx) = find_cell_slot(&entry.cells, property.id()) {
                let mut old = entry.cells.remove(idx).1;
                old.unhook();
            }
            let Ok(initial) = initial.downcast::<T>() else {
                panic!(
                    "Property '{}' stores values of type '{}', not '{}'",
                    descriptor.name(),
                    descriptor.value_type_name(),
                    core::any::type_name::<T>()
                );
            };
            let cell = ValueCell::new(
                property,
                source.clone(),
                accessors,
                watch,
                initial,
                initial_source,
            );
            let idx = find_cell_slot(&entry.cells, property.id()).unwrap_or_else(|idx| idx);
            entry.cells.insert(idx, (property.id(), Box::new(cell)));
        }

        if sweeps {
            self.scheduler.enroll(object, property.id());
        } else {
            self.scheduler.withdraw(object, property.id());
        }
        self.digest_one(registry, object, property.id());
        Ok(())
    }

    /// Removes a property's binding.
    ///
    /// The effective value re-resolves from the remaining sources; if it
    /// differs from the binding's last value, the change pipeline runs.
    /// Returns `false` if the property was not bound.
    pub fn unbind(
        &mut self,
        registry: &PropertyRegistry,
        object: K,
        property: PropertyId,
    ) -> bool {
        let old = {
            let entry = self.entry_mut(object);
            let Ok(idx) = find_cell_slot(&entry.cells, property) else {
                return false;
            };
            let old = Self::entry_effective(registry, entry, property);
            let mut cell = entry.cells.remove(idx).1;
            cell.unhook();
            old
        };
        self.scheduler.withdraw(object, property);
        self.refresh_property(registry, object, property, old);
        true
    }

    /// Reads the raw underlying value of a bound property.
    ///
    /// This is the value at the source end of the binding, before animation
    /// and coercion.
    ///
    /// # Errors
    ///
    /// [`AccessError::WriteOnly`] if the binding compiled without a getter.
    ///
    /// # Panics
    ///
    /// Panics if the object is not attached, the property is not bound, or
    /// `T` is not the property's value type.
    pub fn source_value<T: Clone + 'static>(
        &self,
        registry: &PropertyRegistry,
        object: K,
        property: Property<T>,
    ) -> Result<T, AccessError> {
        self.bound_cell(registry, object, property).source_value()
    }

    /// Writes a value through a bound property to its source.
    ///
    /// The value is coerced with the owner type's coerce callback, written
    /// through the compiled setter, the source's leaf member notification is
    /// raised, and the cell digests immediately, without waiting for a
    /// sweep. A broken hop in the path makes the write a silent no-op.
    ///
    /// # Errors
    ///
    /// [`AccessError::ReadOnly`] if the binding compiled without a setter.
    ///
    /// # Panics
    ///
    /// Panics if the object is not attached, the property is not bound, or
    /// `T` is not the property's value type.
    pub fn set_source_value<T: Clone + 'static>(
        &mut self,
        registry: &PropertyRegistry,
        object: K,
        property: Property<T>,
        value: T,
    ) -> Result<(), AccessError> {
        {
            let entry = self.entry(object);
            let cell = Self::cell_of(registry, entry, property);
            let metadata = registry.metadata_for_owner(property, entry.owner_type);
            let coerced = metadata.coerce(value);
            let wrote = cell.write_source(coerced)?;
            if wrote {
                let member = cell.path().leaf_member().map(|m| &**m);
                cell.source().raise(member);
            }
        }
        self.digest_one(registry, object, property.id());
        Ok(())
    }

    // =========================================================================
    // Digests
    // =========================================================================

    /// Digests a single bound property now.
    ///
    /// Used by the engine itself after writes, and available to hosts that
    /// know one specific binding needs a look. Stamps with the current sweep
    /// id when called mid-sweep. Returns `true` if the value changed.
    /// Properties without a binding have nothing to digest.
    pub fn digest_one(
        &mut self,
        registry: &PropertyRegistry,
        object: K,
        property: PropertyId,
    ) -> bool {
        let stamp = self.scheduler.stamp();
        let change = {
            let Some(entry) = self.objects.get_mut(&object) else {
                return false;
            };
            let ObjectEntry {
                owner_type,
                layers,
                cells,
                ..
            } = entry;
            let Ok(idx) = find_cell_slot(cells, property) else {
                return false;
            };
            let ctx = ResolveCtx {
                registry,
                owner: *owner_type,
                layers,
            };
            cells[idx].1.digest_erased(&ctx, stamp)
        };
        match change {
            Some(change) => {
                self.after_change(registry, object, property, change);
                true
            }
            None => false,
        }
    }

    /// Runs one digest sweep.
    ///
    /// Queued push marks are digested first, then every enrolled cell is
    /// pulled and checked. Marks raised while the sweep runs (by change
    /// callbacks writing through sources) are digested before the sweep
    /// ends, so a sweep and its cascade always run to completion within one
    /// cycle id.
    pub fn run_tick(&mut self, registry: &PropertyRegistry) -> TickStats {
        let mut stats = TickStats::default();
        let mut batch = core::mem::take(&mut self.scratch);
        batch.clear();

        self.scheduler.begin_sweep();
        self.scheduler.drain_pushed(&mut batch);
        self.scheduler.sweep_list(&mut batch);

        let mut next = 0;
        while next < batch.len() {
            let (object, property) = batch[next];
            next += 1;
            stats.digested += 1;
            if self.digest_one(registry, object, property) {
                stats.changed += 1;
            }
            if next == batch.len() {
                self.scheduler.drain_pushed(&mut batch);
            }
        }
        self.scheduler.end_sweep();

        batch.clear();
        self.scratch = batch;
        stats
    }

    /// Digests the cells marked by push notifications, without a sweep.
    ///
    /// This is how a push-covered binding reacts to a source mutation
    /// between ticks: the notification queues a mark, and the flush digests
    /// exactly the marked cells. Does nothing when no marks are queued.
    pub fn flush_pushed(&mut self, registry: &PropertyRegistry) -> TickStats {
        let mut stats = TickStats::default();
        let mut batch = core::mem::take(&mut self.scratch);
        batch.clear();

        while self.scheduler.drain_pushed(&mut batch) {
            for (object, property) in batch.drain(..) {
                stats.digested += 1;
                if self.digest_one(registry, object, property) {
                    stats.changed += 1;
                }
            }
        }

        self.scratch = batch;
        stats
    }

    // =========================================================================
    // Subscriptions and components
    // =========================================================================

    /// Subscribes to changes of `property` on `target`.
    pub fn subscribe(
        &mut self,
        property: PropertyId,
        target: K,
        subscriber: ChangeSubscriber<K>,
    ) -> SubscriptionId {
        self.hub.subscribe(property, target, subscriber)
    }

    /// Cancels a subscription. Returns `false` for stale ids.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.hub.unsubscribe(id)
    }

    /// The digest scheduler, for enrollment and cycle queries.
    #[must_use]
    pub fn scheduler(&self) -> &DigestScheduler<K> {
        &self.scheduler
    }

    /// The binding compiler, for schema and cache queries.
    #[must_use]
    pub fn compiler(&self) -> &BindingCompiler {
        &self.compiler
    }

    /// The pending layout and render invalidations.
    #[must_use]
    pub fn invalidations(&self) -> &InvalidationSet<K> {
        &self.invalidations
    }

    /// Mutable access to the invalidation queues, for draining per tick.
    pub fn invalidations_mut(&mut self) -> &mut InvalidationSet<K> {
        &mut self.invalidations
    }

    /// The current digest cycle id.
    #[must_use]
    pub fn current_cycle(&self) -> DigestId {
        self.scheduler.current_cycle()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn entry(&self, object: K) -> &ObjectEntry<K> {
        let Some(entry) = self.objects.get(&object) else {
            panic!("Object is not attached to the property engine");
        };
        entry
    }

    fn entry_mut(&mut self, object: K) -> &mut ObjectEntry<K> {
        let Some(entry) = self.objects.get_mut(&object) else {
            panic!("Object is not attached to the property engine");
        };
        entry
    }

    fn borrow_stored<'a, T: Clone + 'static>(
        registry: &PropertyRegistry,
        property: PropertyId,
        value: &'a ErasedValue,
    ) -> &'a T {
        match value.downcast_ref::<T>() {
            Some(value) => value,
            None => {
                let descriptor = registry.descriptor(property);
                panic!(
                    "Property '{}' stores values of type '{}', not '{}'",
                    descriptor.name(),
                    descriptor.value_type_name(),
                    core::any::type_name::<T>()
                );
            }
        }
    }

    /// The effective value and its source, through the cell when one exists.
    fn entry_effective(
        registry: &PropertyRegistry,
        entry: &ObjectEntry<K>,
        property: PropertyId,
    ) -> (ValueSource, ErasedValue) {
        match find_cell(&entry.cells, property) {
            Some(cell) => (cell.cached_source(), cell.cached_erased()),
            None => resolve_effective(registry, entry.owner_type, property, &entry.layers),
        }
    }

    fn bound_cell<T: Clone + 'static>(
        &self,
        registry: &PropertyRegistry,
        object: K,
        property: Property<T>,
    ) -> &ValueCell<T> {
        Self::cell_of(registry, self.entry(object), property)
    }

    fn cell_of<'e, T: Clone + 'static>(
        registry: &PropertyRegistry,
        entry: &'e ObjectEntry<K>,
        property: Property<T>,
    ) -> &'e ValueCell<T> {
        let Some(cell) = find_cell(&entry.cells, property.id()) else {
            panic!(
                "Property '{}' is not bound on this object",
                registry.descriptor(property.id()).name()
            );
        };
        let Some(cell) = cell.downcast_ref::<T>() else {
            let descriptor = registry.descriptor(property.id());
            panic!(
                "Property '{}' stores values of type '{}', not '{}'",
                descriptor.name(),
                descriptor.value_type_name(),
                core::any::type_name::<T>()
            );
        };
        cell
    }

    fn write_layer(
        &mut self,
        registry: &PropertyRegistry,
        object: K,
        property: PropertyId,
        layer: SourceLayer,
        value: ErasedValue,
    ) {
        let descriptor = registry.descriptor(property);
        assert!(
            value.type_id() == descriptor.value_type(),
            "Cannot store a value of type '{}' in property '{}' of type '{}'",
            value.type_name(),
            descriptor.name(),
            descriptor.value_type_name()
        );
        let old = {
            let entry = self.entry_mut(object);
            let old = Self::entry_effective(registry, entry, property);
            entry.layers.set(layer, property, value);
            old
        };
        self.refresh_property(registry, object, property, old);
    }

    fn clear_layer(
        &mut self,
        registry: &PropertyRegistry,
        object: K,
        property: PropertyId,
        layer: SourceLayer,
    ) -> bool {
        let old = {
            let entry = self.entry_mut(object);
            let old = Self::entry_effective(registry, entry, property);
            if entry.layers.clear(layer, property).is_none() {
                return false;
            }
            old
        };
        self.refresh_property(registry, object, property, old);
        true
    }

    /// Recomputes one property after a layer mutation and runs the pipeline
    /// if the effective value moved. Returns `true` on a change.
    fn refresh_property(
        &mut self,
        registry: &PropertyRegistry,
        object: K,
        property: PropertyId,
        old: (ValueSource, ErasedValue),
    ) -> bool {
        let stamp = self.scheduler.stamp();
        let change = {
            let Some(entry) = self.objects.get_mut(&object) else {
                return false;
            };
            let ObjectEntry {
                owner_type,
                layers,
                cells,
                ..
            } = entry;
            match find_cell_slot(cells, property) {
                // Bound: the cell re-resolves and compares against its cache.
                Ok(idx) => {
                    let ctx = ResolveCtx {
                        registry,
                        owner: *owner_type,
                        layers,
                    };
                    cells[idx].1.digest_erased(&ctx, stamp)
                }
                // Unbound: compare the re-resolved value against the
                // pre-write effective value.
                Err(_) => {
                    let (source, new) = resolve_effective(registry, *owner_type, property, layers);
                    if registry.values_equal_for_owner(property, *owner_type, &old.1, &new) {
                        None
                    } else {
                        registry.notify_changed_for_owner(property, *owner_type, Some(&old.1), &new);
                        Some(CellChange {
                            old: old.1,
                            new,
                            source,
                        })
                    }
                }
            }
        };
        match change {
            Some(change) => {
                self.after_change(registry, object, property, change);
                true
            }
            None => false,
        }
    }

    /// The shared tail of every change: invalidation marks, hub
    /// notification, and inherited propagation.
    fn after_change(
        &mut self,
        registry: &PropertyRegistry,
        object: K,
        property: PropertyId,
        change: CellChange,
    ) {
        let owner_type = self.entry(object).owner_type;
        let options = registry.options_for_owner(property, owner_type);
        self.invalidations.mark(options, object);
        let event = PropertyChange {
            object,
            property,
            old: change.old,
            new: change.new,
            source: change.source,
        };
        self.hub.notify(&event);
        if options.contains(PropertyOptions::INHERITS) {
            // Children inherit this object's effective value; falling back
            // to the default means they fall back to their own.
            let downward = if event.source == ValueSource::Default {
                None
            } else {
                Some(event.new.clone_value())
            };
            self.propagate_inherited(registry, object, property, downward.as_ref());
        }
    }

    /// Pushes an inherited value into the direct children.
    ///
    /// Each child whose effective value moves runs the full pipeline, and
    /// its own `after_change` carries the value further down. Children that
    /// shadow the property absorb the write silently, pruning their subtree.
    fn propagate_inherited(
        &mut self,
        registry: &PropertyRegistry,
        origin: K,
        property: PropertyId,
        value: Option<&ErasedValue>,
    ) {
        let children: SmallVec<[K; 8]> = match self.objects.get(&origin) {
            Some(entry) => entry.children.iter().copied().collect(),
            None => return,
        };
        for child in children {
            let old = {
                let Some(entry) = self.objects.get_mut(&child) else {
                    continue;
                };
                let old = Self::entry_effective(registry, entry, property);
                match value {
                    Some(v) => {
                        entry.layers.set(SourceLayer::Inherited, property, v.clone_value());
                    }
                    None => {
                        entry.layers.clear(SourceLayer::Inherited, property);
                    }
                }
                old
            };
            self.refresh_property(registry, child, property, old);
        }
    }

    /// Collects the inheritable values an object would pass to a new child.
    fn inheritable_seeds(
        &self,
        registry: &PropertyRegistry,
        parent: K,
    ) -> Vec<(PropertyId, ErasedValue)> {
        let entry = self.entry(parent);
        let mut ids = entry.layers.property_ids();
        for (property, _) in &entry.cells {
            if let Err(idx) = ids.binary_search(property) {
                ids.insert(idx, *property);
            }
        }
        let mut seeds = Vec::new();
        for property in ids {
            if registry
                .options_for_owner(property, entry.owner_type)
                .contains(PropertyOptions::INHERITS)
            {
                let (_, value) = Self::entry_effective(registry, entry, property);
                seeds.push((property, value));
            }
        }
        seeds
    }
}

impl<K: Copy + Eq + Hash + 'static> Default for PropertyEngine<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Eq + Hash> fmt::Debug for PropertyEngine<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyEngine")
            .field("objects", &self.objects.len())
            .field("enrolled", &self.scheduler.enrolled_count())
            .field("compiler", &self.compiler)
            .finish_non_exhaustive()
    }
}
