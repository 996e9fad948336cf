// Copyright 2025 the Cambium Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Data sources for bindings.
//!
//! A [`Source`] wraps an application state value so bindings can read and
//! write it through erased accessors. Sources come in two flavors:
//!
//! - **Instrumented** sources carry a change broadcast; mutations through
//!   [`Source::update`] notify watchers, enabling push-based change
//!   observation.
//! - **Plain** sources have no broadcast; bound cells watching them fall
//!   back to per-tick pull digestion.
//!
//! A source may additionally opt into dynamic access
//! ([`SourceBuilder::dynamic`]), the reflective fallback used when no schema
//! is registered for the state type.

use alloc::rc::Rc;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::{Any, TypeId};
use core::cell::{Ref, RefCell, RefMut};

use cambium_property::ErasedValue;
use smallvec::SmallVec;

/// By-name access to a source's members, the reflective fallback for
/// schema-less binding.
///
/// Implementations typically match on the member name. The compiler uses
/// this only for single-member paths; walking deeper requires a schema.
pub trait DynamicSource {
    /// Reads a member by name. `None` means the member does not exist or is
    /// not readable.
    fn member(&self, name: &str) -> Option<ErasedValue>;

    /// Writes a member by name. Returns whether the write was applied.
    fn set_member(&mut self, name: &str, value: ErasedValue) -> bool;
}

/// Dynamic access captured as plain functions so the erased source needs no
/// `DynamicSource` bound.
struct DynAccess<S> {
    read: fn(&S, &str) -> Option<ErasedValue>,
    write: fn(&mut S, &str, ErasedValue) -> bool,
}

/// Handle to one registered watcher, used to cancel it.
///
/// Handles are generation-checked: a handle left over from a cancelled
/// watcher never affects the slot's next occupant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatchHandle {
    slot: u32,
    generation: u32,
}

struct WatchSlot {
    generation: u32,
    active: Option<(Option<Arc<str>>, Rc<dyn Fn()>)>,
}

/// Watcher registry for instrumented sources.
///
/// Slots are recycled through a free list; callbacks are collected before
/// invocation so a watcher may register or cancel watchers reentrantly.
struct ChangeBroadcast {
    slots: RefCell<Vec<WatchSlot>>,
    free: RefCell<Vec<u32>>,
}

impl ChangeBroadcast {
    fn new() -> Self {
        Self {
            slots: RefCell::new(Vec::new()),
            free: RefCell::new(Vec::new()),
        }
    }

    fn watch(&self, member: Option<&str>, callback: Rc<dyn Fn()>) -> WatchHandle {
        let filter = member.map(Arc::from);
        let mut slots = self.slots.borrow_mut();
        if let Some(slot) = self.free.borrow_mut().pop() {
            let entry = &mut slots[slot as usize];
            entry.active = Some((filter, callback));
            return WatchHandle {
                slot,
                generation: entry.generation,
            };
        }
        let slot = slots.len();
        assert!(u32::try_from(slot).is_ok(), "Watcher capacity exceeded");
        #[expect(clippy::cast_possible_truncation, reason = "bounds checked above")]
        let slot = slot as u32;
        slots.push(WatchSlot {
            generation: 0,
            active: Some((filter, callback)),
        });
        WatchHandle {
            slot,
            generation: 0,
        }
    }

    fn unwatch(&self, handle: WatchHandle) -> bool {
        let mut slots = self.slots.borrow_mut();
        let Some(entry) = slots.get_mut(handle.slot as usize) else {
            return false;
        };
        if entry.generation != handle.generation || entry.active.is_none() {
            return false;
        }
        entry.active = None;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.borrow_mut().push(handle.slot);
        true
    }

    fn raise(&self, member: Option<&str>) {
        // Collect first so callbacks can mutate the watcher list.
        let matching: SmallVec<[Rc<dyn Fn()>; 4]> = {
            let slots = self.slots.borrow();
            slots
                .iter()
                .filter_map(|slot| slot.active.as_ref())
                .filter(|(filter, _)| match (filter, member) {
                    (Some(filter), Some(member)) => &**filter == member,
                    // A filterless watcher hears everything; a whole-object
                    // raise reaches every watcher.
                    _ => true,
                })
                .map(|(_, callback)| callback.clone())
                .collect()
        };
        for callback in matching {
            callback();
        }
    }

    fn watcher_count(&self) -> usize {
        self.slots
            .borrow()
            .iter()
            .filter(|slot| slot.active.is_some())
            .count()
    }
}

struct SourceCore<S> {
    state: RefCell<S>,
    changes: Option<ChangeBroadcast>,
    dynamic: Option<DynAccess<S>>,
}

/// Object-safe surface the binding layer sees for any source.
pub(crate) trait ErasedSource {
    fn state_type(&self) -> TypeId;
    fn state_type_name(&self) -> &'static str;
    fn borrow_any(&self) -> Ref<'_, dyn Any>;
    fn borrow_any_mut(&self) -> RefMut<'_, dyn Any>;
    fn is_instrumented(&self) -> bool;
    fn is_dynamic(&self) -> bool;
    fn watch(&self, member: Option<&str>, callback: Rc<dyn Fn()>) -> Option<WatchHandle>;
    fn unwatch(&self, handle: WatchHandle) -> bool;
    fn raise(&self, member: Option<&str>);
    fn dynamic_get(&self, member: &str) -> Option<ErasedValue>;
    fn dynamic_set(&self, member: &str, value: ErasedValue) -> bool;
}

impl<S: 'static> ErasedSource for SourceCore<S> {
    fn state_type(&self) -> TypeId {
        TypeId::of::<S>()
    }

    fn state_type_name(&self) -> &'static str {
        core::any::type_name::<S>()
    }

    fn borrow_any(&self) -> Ref<'_, dyn Any> {
        Ref::map(self.state.borrow(), |s| s as &dyn Any)
    }

    fn borrow_any_mut(&self) -> RefMut<'_, dyn Any> {
        RefMut::map(self.state.borrow_mut(), |s| s as &mut dyn Any)
    }

    fn is_instrumented(&self) -> bool {
        self.changes.is_some()
    }

    fn is_dynamic(&self) -> bool {
        self.dynamic.is_some()
    }

    fn watch(&self, member: Option<&str>, callback: Rc<dyn Fn()>) -> Option<WatchHandle> {
        self.changes
            .as_ref()
            .map(|changes| changes.watch(member, callback))
    }

    fn unwatch(&self, handle: WatchHandle) -> bool {
        self.changes
            .as_ref()
            .is_some_and(|changes| changes.unwatch(handle))
    }

    fn raise(&self, member: Option<&str>) {
        if let Some(changes) = &self.changes {
            changes.raise(member);
        }
    }

    fn dynamic_get(&self, member: &str) -> Option<ErasedValue> {
        let access = self.dynamic.as_ref()?;
        let state = self.state.borrow();
        (access.read)(&state, member)
    }

    fn dynamic_set(&self, member: &str, value: ErasedValue) -> bool {
        let Some(access) = self.dynamic.as_ref() else {
            return false;
        };
        let mut state = self.state.borrow_mut();
        (access.write)(&mut state, member, value)
    }
}

/// A shareable, type-erased reference to a [`Source`].
///
/// Handles are what bindings hold; cloning is reference-counted. Two handles
/// compare as the same source when they reference the same underlying state
/// ([`SourceHandle::same_source`]).
#[derive(Clone)]
pub struct SourceHandle {
    inner: Rc<dyn ErasedSource>,
}

impl SourceHandle {
    /// Returns the [`TypeId`] of the wrapped state type.
    #[must_use]
    pub fn state_type(&self) -> TypeId {
        self.inner.state_type()
    }

    /// Returns the name of the wrapped state type.
    ///
    /// Intended for error messages; the exact string is not stable.
    #[must_use]
    pub fn state_type_name(&self) -> &'static str {
        self.inner.state_type_name()
    }

    /// Returns whether the source carries a change broadcast.
    #[must_use]
    pub fn is_instrumented(&self) -> bool {
        self.inner.is_instrumented()
    }

    /// Returns whether the source supports dynamic (by-name) access.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.inner.is_dynamic()
    }

    /// Borrows the state as `dyn Any` for compiled getter chains.
    ///
    /// # Panics
    ///
    /// Panics if the state is currently borrowed mutably.
    #[must_use]
    pub fn borrow_any(&self) -> Ref<'_, dyn Any> {
        self.inner.borrow_any()
    }

    /// Mutably borrows the state as `dyn Any` for compiled setter chains.
    ///
    /// # Panics
    ///
    /// Panics if the state is currently borrowed.
    #[must_use]
    pub fn borrow_any_mut(&self) -> RefMut<'_, dyn Any> {
        self.inner.borrow_any_mut()
    }

    /// Registers a watcher, or returns `None` if the source is not
    /// instrumented.
    ///
    /// `member` of `None` watches every change; `Some(name)` watches changes
    /// raised for that member plus whole-object raises.
    pub fn watch(&self, member: Option<&str>, callback: Rc<dyn Fn()>) -> Option<WatchHandle> {
        self.inner.watch(member, callback)
    }

    /// Cancels a watcher. Returns whether the handle was still live.
    pub fn unwatch(&self, handle: WatchHandle) -> bool {
        self.inner.unwatch(handle)
    }

    /// Notifies watchers of a change to `member`, or to the whole object
    /// when `member` is `None`.
    ///
    /// Must not be called while the state is borrowed; watchers are free to
    /// read the source.
    pub fn raise(&self, member: Option<&str>) {
        self.inner.raise(member);
    }

    /// Reads a member through dynamic access, or `None` when the source is
    /// not dynamic or lacks the member.
    #[must_use]
    pub fn dynamic_get(&self, member: &str) -> Option<ErasedValue> {
        self.inner.dynamic_get(member)
    }

    /// Writes a member through dynamic access. Returns whether the write was
    /// applied.
    pub fn dynamic_set(&self, member: &str, value: ErasedValue) -> bool {
        self.inner.dynamic_set(member, value)
    }

    /// Returns whether both handles reference the same source.
    #[must_use]
    pub fn same_source(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl core::fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SourceHandle")
            .field("state_type_name", &self.inner.state_type_name())
            .field("instrumented", &self.inner.is_instrumented())
            .field("dynamic", &self.inner.is_dynamic())
            .finish()
    }
}

/// A data source holding application state of type `S`.
///
/// # Example
///
/// ```rust
/// use cambium_binding::Source;
///
/// struct Model {
///     alpha: f64,
/// }
///
/// let model = Source::builder(Model { alpha: 0.5 }).instrumented().build();
///
/// // Mutations notify watchers of the named member.
/// model.update_member("Alpha", |m| m.alpha = 0.8);
/// assert_eq!(model.read(|m| m.alpha), 0.8);
/// ```
pub struct Source<S: 'static> {
    core: Rc<SourceCore<S>>,
}

impl<S: 'static> Source<S> {
    /// Creates a plain source: no change broadcast, no dynamic access.
    #[must_use]
    pub fn new(state: S) -> Self {
        Self::builder(state).build()
    }

    /// Starts building a source around `state`.
    #[must_use]
    pub fn builder(state: S) -> SourceBuilder<S> {
        SourceBuilder {
            state,
            instrumented: false,
            dynamic: None,
        }
    }

    /// Returns an erased handle for bindings.
    #[must_use]
    pub fn handle(&self) -> SourceHandle {
        SourceHandle {
            inner: self.core.clone(),
        }
    }

    /// Reads the state.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.core.state.borrow())
    }

    /// Mutates the state, then notifies every watcher.
    pub fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let result = f(&mut self.core.state.borrow_mut());
        self.core.raise(None);
        result
    }

    /// Mutates the state, then notifies watchers of `member`.
    pub fn update_member<R>(&self, member: &str, f: impl FnOnce(&mut S) -> R) -> R {
        let result = f(&mut self.core.state.borrow_mut());
        self.core.raise(Some(member));
        result
    }

    /// Returns whether this source carries a change broadcast.
    #[must_use]
    pub fn is_instrumented(&self) -> bool {
        self.core.is_instrumented()
    }

    /// Returns the number of live watchers.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.core
            .changes
            .as_ref()
            .map_or(0, ChangeBroadcast::watcher_count)
    }
}

impl<S: 'static> Clone for Source<S> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<S: 'static> core::fmt::Debug for Source<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Source")
            .field("state_type_name", &core::any::type_name::<S>())
            .field("instrumented", &self.core.is_instrumented())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Source`].
pub struct SourceBuilder<S: 'static> {
    state: S,
    instrumented: bool,
    dynamic: Option<DynAccess<S>>,
}

impl<S: 'static> SourceBuilder<S> {
    /// Attaches a change broadcast, making mutations observable by push.
    #[must_use]
    pub fn instrumented(mut self) -> Self {
        self.instrumented = true;
        self
    }

    /// Enables dynamic (by-name) access through the state's
    /// [`DynamicSource`] implementation.
    #[must_use]
    pub fn dynamic(mut self) -> Self
    where
        S: DynamicSource,
    {
        self.dynamic = Some(DynAccess {
            read: |state, name| state.member(name),
            write: |state, name, value| state.set_member(name, value),
        });
        self
    }

    /// Builds the source.
    #[must_use]
    pub fn build(self) -> Source<S> {
        Source {
            core: Rc::new(SourceCore {
                state: RefCell::new(self.state),
                changes: self.instrumented.then(ChangeBroadcast::new),
                dynamic: self.dynamic,
            }),
        }
    }
}

impl<S: 'static> core::fmt::Debug for SourceBuilder<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SourceBuilder")
            .field("state_type_name", &core::any::type_name::<S>())
            .field("instrumented", &self.instrumented)
            .field("dynamic", &self.dynamic.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;
    use core::cell::Cell;

    struct Model {
        alpha: f64,
        label: String,
    }

    fn model() -> Model {
        Model {
            alpha: 0.5,
            label: String::from("hello"),
        }
    }

    impl DynamicSource for Model {
        fn member(&self, name: &str) -> Option<ErasedValue> {
            match name {
                "Alpha" => Some(ErasedValue::new(self.alpha)),
                "Label" => Some(ErasedValue::new(self.label.clone())),
                _ => None,
            }
        }

        fn set_member(&mut self, name: &str, value: ErasedValue) -> bool {
            match name {
                "Alpha" => match value.downcast::<f64>() {
                    Ok(v) => {
                        self.alpha = v;
                        true
                    }
                    Err(_) => false,
                },
                _ => false,
            }
        }
    }

    #[test]
    fn plain_source_read_update() {
        let source = Source::new(model());
        assert_eq!(source.read(|m| m.alpha), 0.5);
        source.update(|m| m.alpha = 0.75);
        assert_eq!(source.read(|m| m.alpha), 0.75);
        assert!(!source.is_instrumented());
    }

    #[test]
    fn plain_source_cannot_be_watched() {
        let source = Source::new(model());
        let handle = source.handle();
        assert!(handle.watch(None, Rc::new(|| {})).is_none());
        // Raising on a plain source is a no-op.
        handle.raise(None);
    }

    #[test]
    fn instrumented_update_notifies_watchers() {
        let source = Source::builder(model()).instrumented().build();
        let handle = source.handle();

        let fired = Rc::new(Cell::new(0));
        let fired_in = fired.clone();
        let watch = handle
            .watch(None, Rc::new(move || fired_in.set(fired_in.get() + 1)))
            .unwrap();

        source.update(|m| m.alpha = 0.6);
        assert_eq!(fired.get(), 1);

        assert!(handle.unwatch(watch));
        source.update(|m| m.alpha = 0.7);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn member_filters_select_watchers() {
        let source = Source::builder(model()).instrumented().build();
        let handle = source.handle();

        let alpha_fired = Rc::new(Cell::new(0));
        let alpha_in = alpha_fired.clone();
        let _alpha = handle
            .watch(Some("Alpha"), Rc::new(move || alpha_in.set(alpha_in.get() + 1)))
            .unwrap();

        source.update_member("Label", |m| m.label.push('!'));
        assert_eq!(alpha_fired.get(), 0);

        source.update_member("Alpha", |m| m.alpha = 0.9);
        assert_eq!(alpha_fired.get(), 1);

        // A whole-object raise reaches member-filtered watchers too.
        source.update(|m| m.alpha = 1.0);
        assert_eq!(alpha_fired.get(), 2);
    }

    #[test]
    fn stale_watch_handles_are_rejected() {
        let source = Source::builder(model()).instrumented().build();
        let handle = source.handle();

        let first = handle.watch(None, Rc::new(|| {})).unwrap();
        assert!(handle.unwatch(first));
        assert!(!handle.unwatch(first));

        // The slot is recycled under a new generation.
        let second = handle.watch(None, Rc::new(|| {})).unwrap();
        assert_eq!(first.slot, second.slot);
        assert_ne!(first.generation, second.generation);
        assert!(!handle.unwatch(first));
        assert!(handle.unwatch(second));
        assert_eq!(source.watcher_count(), 0);
    }

    #[test]
    fn watchers_may_register_watchers_reentrantly() {
        let source = Source::builder(model()).instrumented().build();
        let handle = source.handle();

        let inner_handle = handle.clone();
        let _watch = handle
            .watch(
                None,
                Rc::new(move || {
                    let _ = inner_handle.watch(None, Rc::new(|| {}));
                }),
            )
            .unwrap();

        source.update(|m| m.alpha = 0.1);
        assert_eq!(source.watcher_count(), 2);
    }

    #[test]
    fn erased_borrows_reach_the_state() {
        let source = Source::new(model());
        let handle = source.handle();

        assert_eq!(handle.state_type(), TypeId::of::<Model>());
        {
            let borrowed = handle.borrow_any();
            let typed = borrowed.downcast_ref::<Model>().unwrap();
            assert_eq!(typed.alpha, 0.5);
        }
        {
            let mut borrowed = handle.borrow_any_mut();
            borrowed.downcast_mut::<Model>().unwrap().alpha = 0.9;
        }
        assert_eq!(source.read(|m| m.alpha), 0.9);
    }

    #[test]
    fn handle_identity() {
        let source = Source::new(model());
        let other = Source::new(model());
        assert!(source.handle().same_source(&source.handle()));
        assert!(!source.handle().same_source(&other.handle()));
    }

    #[test]
    fn dynamic_access() {
        let source = Source::builder(model()).dynamic().build();
        let handle = source.handle();
        assert!(handle.is_dynamic());

        let alpha = handle.dynamic_get("Alpha").unwrap();
        assert_eq!(alpha.downcast_ref::<f64>(), Some(&0.5));
        assert!(handle.dynamic_get("Missing").is_none());

        assert!(handle.dynamic_set("Alpha", ErasedValue::new(0.25_f64)));
        assert_eq!(source.read(|m| m.alpha), 0.25);
        // Wrong value type is rejected by the implementation.
        assert!(!handle.dynamic_set("Alpha", ErasedValue::new(1_i32)));

        let plain = Source::new(model());
        assert!(!plain.handle().is_dynamic());
        assert!(plain.handle().dynamic_get("Alpha").is_none());
    }
}
