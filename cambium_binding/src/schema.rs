// Copyright 2025 the Cambium Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Type schemas: declared member accessors for binding compilation.
//!
//! A [`TypeSchema`] declares, per source type, how each named member and the
//! optional indexer are reached. The declarations are plain function
//! pointers captured at schema construction; the compiler chains them into
//! reusable accessors without any per-call name lookup. Schemas play the
//! role dynamic code generation plays on platforms that have it.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::{Any, TypeId};

/// Erased shared accessor for one member hop.
pub type MemberGetFn = Arc<dyn for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any> + Send + Sync>;

/// Erased exclusive accessor for one member hop.
pub type MemberGetMutFn =
    Arc<dyn for<'a> Fn(&'a mut dyn Any) -> Option<&'a mut dyn Any> + Send + Sync>;

/// Erased shared accessor for an indexer hop.
pub type IndexGetFn = Arc<dyn for<'a> Fn(&'a dyn Any, usize) -> Option<&'a dyn Any> + Send + Sync>;

/// Erased exclusive accessor for an indexer hop.
pub type IndexGetMutFn =
    Arc<dyn for<'a> Fn(&'a mut dyn Any, usize) -> Option<&'a mut dyn Any> + Send + Sync>;

fn erase_get(f: impl for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any> + Send + Sync + 'static) -> MemberGetFn {
    Arc::new(f)
}

fn erase_get_mut(
    f: impl for<'a> Fn(&'a mut dyn Any) -> Option<&'a mut dyn Any> + Send + Sync + 'static,
) -> MemberGetMutFn {
    Arc::new(f)
}

fn erase_index_get(
    f: impl for<'a> Fn(&'a dyn Any, usize) -> Option<&'a dyn Any> + Send + Sync + 'static,
) -> IndexGetFn {
    Arc::new(f)
}

fn erase_index_get_mut(
    f: impl for<'a> Fn(&'a mut dyn Any, usize) -> Option<&'a mut dyn Any> + Send + Sync + 'static,
) -> IndexGetMutFn {
    Arc::new(f)
}

/// Accessors for one declared member.
///
/// `None` on either side means the member cannot be accessed in that
/// direction; a missing `get` makes bindings through this member write-only,
/// a missing `get_mut` makes them read-only.
pub struct MemberAccessor {
    value_type: TypeId,
    value_type_name: &'static str,
    get: Option<MemberGetFn>,
    get_mut: Option<MemberGetMutFn>,
}

impl MemberAccessor {
    /// Returns the [`TypeId`] of the member's value type.
    #[must_use]
    #[inline]
    pub fn value_type(&self) -> TypeId {
        self.value_type
    }

    /// Returns the name of the member's value type.
    ///
    /// Intended for error messages; the exact string is not stable.
    #[must_use]
    #[inline]
    pub fn value_type_name(&self) -> &'static str {
        self.value_type_name
    }

    /// Returns whether the member can be read.
    #[must_use]
    #[inline]
    pub fn is_readable(&self) -> bool {
        self.get.is_some()
    }

    /// Returns whether the member can be written through.
    #[must_use]
    #[inline]
    pub fn is_writable(&self) -> bool {
        self.get_mut.is_some()
    }

    pub(crate) fn get_fn(&self) -> Option<MemberGetFn> {
        self.get.clone()
    }

    pub(crate) fn get_mut_fn(&self) -> Option<MemberGetMutFn> {
        self.get_mut.clone()
    }
}

impl core::fmt::Debug for MemberAccessor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemberAccessor")
            .field("value_type_name", &self.value_type_name)
            .field("readable", &self.get.is_some())
            .field("writable", &self.get_mut.is_some())
            .finish_non_exhaustive()
    }
}

/// Accessors for a type's positional indexer.
///
/// Indexer reads are always fallible; an out-of-range index yields `None`,
/// which binding getters translate to the declared type's default.
pub struct Indexer {
    element_type: TypeId,
    element_type_name: &'static str,
    get: IndexGetFn,
    get_mut: Option<IndexGetMutFn>,
}

impl Indexer {
    /// Returns the [`TypeId`] of the element type.
    #[must_use]
    #[inline]
    pub fn element_type(&self) -> TypeId {
        self.element_type
    }

    /// Returns the name of the element type.
    #[must_use]
    #[inline]
    pub fn element_type_name(&self) -> &'static str {
        self.element_type_name
    }

    /// Returns whether elements can be written through.
    #[must_use]
    #[inline]
    pub fn is_writable(&self) -> bool {
        self.get_mut.is_some()
    }

    pub(crate) fn get_fn(&self) -> IndexGetFn {
        self.get.clone()
    }

    pub(crate) fn get_mut_fn(&self) -> Option<IndexGetMutFn> {
        self.get_mut.clone()
    }
}

impl core::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Indexer")
            .field("element_type_name", &self.element_type_name)
            .field("writable", &self.get_mut.is_some())
            .finish_non_exhaustive()
    }
}

/// The declared members and indexer of one source type.
///
/// Built once per type with [`SchemaBuilder`] and registered with the
/// binding compiler. Member lookup is a binary search over names; it runs
/// once per path segment at bind time, never per value access.
///
/// # Example
///
/// ```rust
/// use cambium_binding::SchemaBuilder;
///
/// struct Model {
///     alpha: f64,
///     label: String,
/// }
///
/// let schema = SchemaBuilder::<Model>::new()
///     .field_mut("Alpha", |m| &m.alpha, |m| &mut m.alpha)
///     .field("Label", |m| &m.label)
///     .build();
///
/// assert!(schema.member("Alpha").unwrap().is_writable());
/// assert!(!schema.member("Label").unwrap().is_writable());
/// assert!(schema.member("Missing").is_none());
/// ```
pub struct TypeSchema {
    source_type: TypeId,
    source_type_name: &'static str,
    /// Sorted by member name for binary search.
    members: Vec<(&'static str, MemberAccessor)>,
    indexer: Option<Indexer>,
}

impl TypeSchema {
    /// Returns the [`TypeId`] of the source type this schema describes.
    #[must_use]
    #[inline]
    pub fn source_type(&self) -> TypeId {
        self.source_type
    }

    /// Returns the name of the source type.
    #[must_use]
    #[inline]
    pub fn source_type_name(&self) -> &'static str {
        self.source_type_name
    }

    /// Looks up a member by name.
    #[must_use]
    pub fn member(&self, name: &str) -> Option<&MemberAccessor> {
        self.members
            .binary_search_by(|(n, _)| n.cmp(&name))
            .ok()
            .map(|idx| &self.members[idx].1)
    }

    /// Returns the indexer, if the type declares one.
    #[must_use]
    #[inline]
    pub fn indexer(&self) -> Option<&Indexer> {
        self.indexer.as_ref()
    }

    /// Returns the number of declared members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Returns the declared member names in sorted order.
    pub fn member_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.members.iter().map(|(name, _)| *name)
    }
}

impl core::fmt::Debug for TypeSchema {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TypeSchema")
            .field("source_type_name", &self.source_type_name)
            .field("members", &self.members.len())
            .field("has_indexer", &self.indexer.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`TypeSchema`].
///
/// Accessors are plain function pointers, typically closures with no
/// captures. Member names must be unique; declaring one twice panics.
pub struct SchemaBuilder<S: 'static> {
    members: Vec<(&'static str, MemberAccessor)>,
    indexer: Option<Indexer>,
    _marker: core::marker::PhantomData<fn(&S)>,
}

impl<S: 'static> SchemaBuilder<S> {
    /// Creates an empty builder for source type `S`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
            indexer: None,
            _marker: core::marker::PhantomData,
        }
    }

    /// Declares a read-only member that is always present.
    #[must_use]
    pub fn field<F: 'static>(self, name: &'static str, get: fn(&S) -> &F) -> Self {
        self.insert(
            name,
            MemberAccessor {
                value_type: TypeId::of::<F>(),
                value_type_name: core::any::type_name::<F>(),
                get: Some(erase_get(move |any| {
                    let source = any.downcast_ref::<S>()?;
                    Some(get(source) as &dyn Any)
                })),
                get_mut: None,
            },
        )
    }

    /// Declares a read-write member that is always present.
    #[must_use]
    pub fn field_mut<F: 'static>(
        self,
        name: &'static str,
        get: fn(&S) -> &F,
        get_mut: fn(&mut S) -> &mut F,
    ) -> Self {
        self.insert(
            name,
            MemberAccessor {
                value_type: TypeId::of::<F>(),
                value_type_name: core::any::type_name::<F>(),
                get: Some(erase_get(move |any| {
                    let source = any.downcast_ref::<S>()?;
                    Some(get(source) as &dyn Any)
                })),
                get_mut: Some(erase_get_mut(move |any| {
                    let source = any.downcast_mut::<S>()?;
                    Some(get_mut(source) as &mut dyn Any)
                })),
            },
        )
    }

    /// Declares a read-only member that may be absent.
    ///
    /// An absent value short-circuits binding getters to the declared type's
    /// default instead of failing.
    #[must_use]
    pub fn field_opt<F: 'static>(self, name: &'static str, get: fn(&S) -> Option<&F>) -> Self {
        self.insert(
            name,
            MemberAccessor {
                value_type: TypeId::of::<F>(),
                value_type_name: core::any::type_name::<F>(),
                get: Some(erase_get(move |any| {
                    let source = any.downcast_ref::<S>()?;
                    get(source).map(|f| f as &dyn Any)
                })),
                get_mut: None,
            },
        )
    }

    /// Declares a read-write member that may be absent.
    #[must_use]
    pub fn field_opt_mut<F: 'static>(
        self,
        name: &'static str,
        get: fn(&S) -> Option<&F>,
        get_mut: fn(&mut S) -> Option<&mut F>,
    ) -> Self {
        self.insert(
            name,
            MemberAccessor {
                value_type: TypeId::of::<F>(),
                value_type_name: core::any::type_name::<F>(),
                get: Some(erase_get(move |any| {
                    let source = any.downcast_ref::<S>()?;
                    get(source).map(|f| f as &dyn Any)
                })),
                get_mut: Some(erase_get_mut(move |any| {
                    let source = any.downcast_mut::<S>()?;
                    get_mut(source).map(|f| f as &mut dyn Any)
                })),
            },
        )
    }

    /// Declares a write-only member.
    ///
    /// Bindings whose leaf lands here compile with a setter but no getter;
    /// reading such a binding is a call-site error.
    #[must_use]
    pub fn write_only_field<F: 'static>(
        self,
        name: &'static str,
        get_mut: fn(&mut S) -> &mut F,
    ) -> Self {
        self.insert(
            name,
            MemberAccessor {
                value_type: TypeId::of::<F>(),
                value_type_name: core::any::type_name::<F>(),
                get: None,
                get_mut: Some(erase_get_mut(move |any| {
                    let source = any.downcast_mut::<S>()?;
                    Some(get_mut(source) as &mut dyn Any)
                })),
            },
        )
    }

    /// Declares a read-only positional indexer.
    ///
    /// # Panics
    ///
    /// Panics if an indexer is already declared.
    #[must_use]
    pub fn indexed<E: 'static>(mut self, get: fn(&S, usize) -> Option<&E>) -> Self {
        assert!(
            self.indexer.is_none(),
            "An indexer is already declared for '{}'",
            core::any::type_name::<S>()
        );
        self.indexer = Some(Indexer {
            element_type: TypeId::of::<E>(),
            element_type_name: core::any::type_name::<E>(),
            get: erase_index_get(move |any, index| {
                let source = any.downcast_ref::<S>()?;
                get(source, index).map(|e| e as &dyn Any)
            }),
            get_mut: None,
        });
        self
    }

    /// Declares a read-write positional indexer.
    ///
    /// # Panics
    ///
    /// Panics if an indexer is already declared.
    #[must_use]
    pub fn indexed_mut<E: 'static>(
        mut self,
        get: fn(&S, usize) -> Option<&E>,
        get_mut: fn(&mut S, usize) -> Option<&mut E>,
    ) -> Self {
        assert!(
            self.indexer.is_none(),
            "An indexer is already declared for '{}'",
            core::any::type_name::<S>()
        );
        self.indexer = Some(Indexer {
            element_type: TypeId::of::<E>(),
            element_type_name: core::any::type_name::<E>(),
            get: erase_index_get(move |any, index| {
                let source = any.downcast_ref::<S>()?;
                get(source, index).map(|e| e as &dyn Any)
            }),
            get_mut: Some(erase_index_get_mut(move |any, index| {
                let source = any.downcast_mut::<S>()?;
                get_mut(source, index).map(|e| e as &mut dyn Any)
            })),
        });
        self
    }

    /// Builds the schema.
    #[must_use]
    pub fn build(self) -> TypeSchema {
        TypeSchema {
            source_type: TypeId::of::<S>(),
            source_type_name: core::any::type_name::<S>(),
            members: self.members,
            indexer: self.indexer,
        }
    }

    fn insert(mut self, name: &'static str, accessor: MemberAccessor) -> Self {
        match self.members.binary_search_by(|(n, _)| n.cmp(&name)) {
            Ok(_) => panic!(
                "Member '{name}' is already declared for '{}'",
                core::any::type_name::<S>()
            ),
            Err(idx) => self.members.insert(idx, (name, accessor)),
        }
        self
    }
}

impl<S: 'static> Default for SchemaBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: 'static> core::fmt::Debug for SchemaBuilder<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SchemaBuilder")
            .field("source_type_name", &core::any::type_name::<S>())
            .field("members", &self.members.len())
            .finish_non_exhaustive()
    }
}
