// Copyright 2025 the Cambium Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The binding compiler.
//!
//! [`BindingCompiler`] turns a path expression plus a source type into an
//! [`AccessorPair`]: a matched getter/setter that walks pre-resolved schema
//! accessors with no per-call name lookup. Pairs are cached by
//! (path, source type, value type) so repeated bindings of the same shape
//! share one compiled accessor.
//!
//! When the source type has no registered schema, single-member paths can
//! fall back to the source's dynamic (by-name) access; everything else is a
//! bind-time error.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::{Any, TypeId};

use cambium_property::ErasedValue;
use hashbrown::HashMap;

use crate::path::{BindingPath, PathError, PathSegment};
use crate::schema::{MemberGetFn, MemberGetMutFn, TypeSchema};
use crate::source::SourceHandle;

/// Error raised when a binding is accessed in a direction it does not
/// support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    /// The binding has no setter; writing through it is not possible.
    ReadOnly,
    /// The binding has no getter; reading through it is not possible.
    WriteOnly,
}

impl core::fmt::Display for AccessError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "binding is read-only; no setter was compiled for this path"),
            Self::WriteOnly => write!(f, "binding is write-only; the path has no readable leaf"),
        }
    }
}

impl core::error::Error for AccessError {}

/// Error raised when a binding cannot be compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// The path expression could not be parsed.
    Path(PathError),
    /// The source type (or an intermediate hop's type) has no schema, and
    /// the path shape cannot use dynamic access.
    NoSchema {
        /// Name of the schema-less type.
        type_name: &'static str,
    },
    /// A path segment names a member the hop's schema does not declare.
    NoSuchMember {
        /// The missing member name.
        member: String,
        /// Name of the type that lacks the member.
        on: &'static str,
    },
    /// A path segment indexes a type whose schema declares no indexer.
    NotIndexable {
        /// Name of the non-indexable type.
        on: &'static str,
    },
    /// The path's leaf type does not match the requested value type.
    ValueType {
        /// Name of the requested value type.
        expected: &'static str,
        /// Name of the type the path actually produces.
        found: &'static str,
    },
    /// The path is neither readable nor writable end to end.
    NoAccess {
        /// The offending path text.
        path: String,
    },
}

impl From<PathError> for BindError {
    fn from(error: PathError) -> Self {
        Self::Path(error)
    }
}

impl core::fmt::Display for BindError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Path(error) => write!(f, "cannot resolve binding expression: {error}"),
            Self::NoSchema { type_name } => write!(
                f,
                "no schema is registered for type '{type_name}'; multi-segment paths and non-dynamic sources require one"
            ),
            Self::NoSuchMember { member, on } => {
                write!(f, "no member '{member}' on type '{on}'")
            }
            Self::NotIndexable { on } => write!(f, "type '{on}' has no indexer"),
            Self::ValueType { expected, found } => {
                write!(f, "binding produces '{found}' but '{expected}' was requested")
            }
            Self::NoAccess { path } => {
                write!(f, "path '{path}' is neither readable nor writable")
            }
        }
    }
}

impl core::error::Error for BindError {}

/// How an accessor pair reaches the source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessorKind {
    /// Pre-resolved schema accessor chain; no name lookup per call.
    Compiled,
    /// Single by-name lookup through the source's dynamic access per call.
    Dynamic,
}

type GetterFn<T> = Arc<dyn Fn(&SourceHandle) -> T + Send + Sync>;
type SetterFn<T> = Arc<dyn Fn(&SourceHandle, T) -> bool + Send + Sync>;

/// A matched getter/setter pair compiled for one (path, source type, value
/// type) shape.
///
/// Pairs are immutable after construction and cheap to clone; clones share
/// the compiled accessors. Either side may be absent: a path without a
/// writable leaf compiles read-only, a write-only leaf compiles write-only.
///
/// Getters never fail at call time: an absent hop (optional member, index
/// out of range) short-circuits to `T::default()`. Setters report whether
/// the write was applied; an absent hop leaves the source untouched.
pub struct AccessorPair<T> {
    getter: Option<GetterFn<T>>,
    setter: Option<SetterFn<T>>,
    path: BindingPath,
    kind: AccessorKind,
}

impl<T: Clone + 'static> AccessorPair<T> {
    /// Returns the path this pair was compiled from.
    #[must_use]
    #[inline]
    pub fn path(&self) -> &BindingPath {
        &self.path
    }

    /// Returns how the pair reaches the source.
    #[must_use]
    #[inline]
    pub fn kind(&self) -> AccessorKind {
        self.kind
    }

    /// Returns whether the pair has a getter.
    #[must_use]
    #[inline]
    pub fn is_readable(&self) -> bool {
        self.getter.is_some()
    }

    /// Returns whether the pair has a setter.
    #[must_use]
    #[inline]
    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }

    /// Reads the current value through the compiled getter.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::WriteOnly`] if no getter was compiled.
    pub fn get(&self, source: &SourceHandle) -> Result<T, AccessError> {
        match &self.getter {
            Some(getter) => Ok(getter(source)),
            None => Err(AccessError::WriteOnly),
        }
    }

    /// Writes a value through the compiled setter.
    ///
    /// Returns whether the write was applied; a broken hop along the path
    /// leaves the source untouched and returns `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::ReadOnly`] if no setter was compiled.
    pub fn set(&self, source: &SourceHandle, value: T) -> Result<bool, AccessError> {
        match &self.setter {
            Some(setter) => Ok(setter(source, value)),
            None => Err(AccessError::ReadOnly),
        }
    }
}

impl<T> Clone for AccessorPair<T> {
    fn clone(&self) -> Self {
        Self {
            getter: self.getter.clone(),
            setter: self.setter.clone(),
            path: self.path.clone(),
            kind: self.kind,
        }
    }
}

impl<T> core::fmt::Debug for AccessorPair<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AccessorPair")
            .field("path", &self.path.text())
            .field("kind", &self.kind)
            .field("readable", &self.getter.is_some())
            .field("writable", &self.setter.is_some())
            .finish()
    }
}

#[derive(Debug, Hash, PartialEq, Eq)]
struct CacheKey {
    path: Arc<str>,
    source: TypeId,
    value: TypeId,
}

/// Compiles binding paths into cached accessor pairs.
///
/// # Example
///
/// ```rust
/// use cambium_binding::{BindingCompiler, SchemaBuilder, Source};
///
/// struct Model {
///     alpha: f64,
/// }
///
/// let mut compiler = BindingCompiler::new();
/// compiler.register_schema(
///     SchemaBuilder::<Model>::new()
///         .field_mut("Alpha", |m| &m.alpha, |m| &mut m.alpha)
///         .build(),
/// );
///
/// let model = Source::new(Model { alpha: 0.5 });
/// let pair = compiler.compile::<f64>(&model.handle(), "Alpha").unwrap();
///
/// assert_eq!(pair.get(&model.handle()), Ok(0.5));
/// assert_eq!(pair.set(&model.handle(), 0.75), Ok(true));
/// assert_eq!(model.read(|m| m.alpha), 0.75);
/// ```
#[derive(Default)]
pub struct BindingCompiler {
    schemas: HashMap<TypeId, TypeSchema>,
    cache: HashMap<CacheKey, Box<dyn Any>>,
}

impl core::fmt::Debug for BindingCompiler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BindingCompiler")
            .field("schemas", &self.schemas.len())
            .field("cached_accessors", &self.cache.len())
            .finish()
    }
}

impl BindingCompiler {
    /// Creates a compiler with no schemas and an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type schema.
    ///
    /// # Panics
    ///
    /// Panics if a schema for the same source type is already registered.
    pub fn register_schema(&mut self, schema: TypeSchema) {
        if self.schemas.contains_key(&schema.source_type()) {
            panic!(
                "A schema for type '{}' is already registered",
                schema.source_type_name()
            );
        }
        self.schemas.insert(schema.source_type(), schema);
    }

    /// Returns the schema registered for a type, if any.
    #[must_use]
    pub fn schema(&self, source_type: TypeId) -> Option<&TypeSchema> {
        self.schemas.get(&source_type)
    }

    /// Returns the number of distinct compiled accessor shapes.
    #[must_use]
    pub fn cached_accessor_count(&self) -> usize {
        self.cache.len()
    }

    /// Compiles an accessor pair for `path` against `source`'s state type.
    ///
    /// # Errors
    ///
    /// Returns a [`BindError`] when the expression cannot be parsed or when
    /// the path cannot be resolved against the schemas (see the error
    /// variants for the specific conditions).
    pub fn compile<T: Clone + Default + 'static>(
        &mut self,
        source: &SourceHandle,
        path: &str,
    ) -> Result<AccessorPair<T>, BindError> {
        let path = BindingPath::parse(path)?;
        self.compile_parsed(source, &path)
    }

    /// Compiles an accessor pair for an already parsed path.
    ///
    /// # Errors
    ///
    /// As for [`Self::compile`], minus the parse failures.
    pub fn compile_parsed<T: Clone + Default + 'static>(
        &mut self,
        source: &SourceHandle,
        path: &BindingPath,
    ) -> Result<AccessorPair<T>, BindError> {
        let key = CacheKey {
            path: path.shared_text().clone(),
            source: source.state_type(),
            value: TypeId::of::<T>(),
        };
        if let Some(cached) = self.cache.get(&key) {
            if let Some(pair) = cached.downcast_ref::<AccessorPair<T>>() {
                return Ok(pair.clone());
            }
        }
        let pair = self.compile_uncached::<T>(source, path)?;
        self.cache.insert(key, Box::new(pair.clone()));
        Ok(pair)
    }

    fn compile_uncached<T: Clone + Default + 'static>(
        &self,
        source: &SourceHandle,
        path: &BindingPath,
    ) -> Result<AccessorPair<T>, BindError> {
        if self.schemas.contains_key(&source.state_type()) {
            return self.compile_chain(source, path);
        }
        // No schema for the source type. A single member can still go
        // through dynamic access; anything longer cannot.
        match path.single_member() {
            Some(member) if source.is_dynamic() => Ok(dynamic_pair(path, member)),
            _ => Err(BindError::NoSchema {
                type_name: source.state_type_name(),
            }),
        }
    }

    fn compile_chain<T: Clone + Default + 'static>(
        &self,
        source: &SourceHandle,
        path: &BindingPath,
    ) -> Result<AccessorPair<T>, BindError> {
        let segments = path.segments();
        let mut read_hops: Option<Vec<MemberGetFn>> = Some(Vec::with_capacity(segments.len()));
        let mut write_hops: Option<Vec<MemberGetMutFn>> = Some(Vec::with_capacity(segments.len()));
        let mut current_type = source.state_type();
        let mut current_type_name = source.state_type_name();

        for segment in segments {
            let schema = self.schemas.get(&current_type).ok_or(BindError::NoSchema {
                type_name: current_type_name,
            })?;
            match segment {
                PathSegment::Member(name) => {
                    let member = schema.member(name).ok_or_else(|| BindError::NoSuchMember {
                        member: String::from(&**name),
                        on: schema.source_type_name(),
                    })?;
                    match (read_hops.as_mut(), member.get_fn()) {
                        (Some(hops), Some(get)) => hops.push(get),
                        _ => read_hops = None,
                    }
                    match (write_hops.as_mut(), member.get_mut_fn()) {
                        (Some(hops), Some(get_mut)) => hops.push(get_mut),
                        _ => write_hops = None,
                    }
                    current_type = member.value_type();
                    current_type_name = member.value_type_name();
                }
                PathSegment::Index(index) => {
                    let indexer = schema.indexer().ok_or(BindError::NotIndexable {
                        on: schema.source_type_name(),
                    })?;
                    let index = *index;
                    if let Some(hops) = read_hops.as_mut() {
                        let get = indexer.get_fn();
                        hops.push(Arc::new(move |any| get(any, index)));
                    }
                    match (write_hops.as_mut(), indexer.get_mut_fn()) {
                        (Some(hops), Some(get_mut)) => {
                            hops.push(Arc::new(move |any| get_mut(any, index)));
                        }
                        _ => write_hops = None,
                    }
                    current_type = indexer.element_type();
                    current_type_name = indexer.element_type_name();
                }
            }
        }

        if current_type != TypeId::of::<T>() {
            return Err(BindError::ValueType {
                expected: core::any::type_name::<T>(),
                found: current_type_name,
            });
        }
        if read_hops.is_none() && write_hops.is_none() {
            return Err(BindError::NoAccess {
                path: String::from(path.text()),
            });
        }

        let getter = read_hops.map(|hops| {
            let hops: Arc<[MemberGetFn]> = hops.into();
            Arc::new(move |source: &SourceHandle| -> T {
                let borrow = source.borrow_any();
                let mut current: &dyn Any = &*borrow;
                for hop in hops.iter() {
                    match hop(current) {
                        Some(next) => current = next,
                        None => return T::default(),
                    }
                }
                // The leaf type was validated when the chain was compiled.
                match current.downcast_ref::<T>() {
                    Some(value) => value.clone(),
                    None => T::default(),
                }
            }) as GetterFn<T>
        });
        let setter = write_hops.map(|hops| {
            let hops: Arc<[MemberGetMutFn]> = hops.into();
            Arc::new(move |source: &SourceHandle, value: T| -> bool {
                let mut borrow = source.borrow_any_mut();
                let mut current: &mut dyn Any = &mut *borrow;
                for hop in hops.iter() {
                    match hop(current) {
                        Some(next) => current = next,
                        None => return false,
                    }
                }
                match current.downcast_mut::<T>() {
                    Some(slot) => {
                        *slot = value;
                        true
                    }
                    None => false,
                }
            }) as SetterFn<T>
        });

        Ok(AccessorPair {
            getter,
            setter,
            path: path.clone(),
            kind: AccessorKind::Compiled,
        })
    }
}

fn dynamic_pair<T: Clone + Default + 'static>(
    path: &BindingPath,
    member: &Arc<str>,
) -> AccessorPair<T> {
    let name = member.clone();
    let getter = Arc::new(move |source: &SourceHandle| -> T {
        source
            .dynamic_get(&name)
            .and_then(|value| value.downcast::<T>().ok())
            .unwrap_or_default()
    }) as GetterFn<T>;
    let name = member.clone();
    let setter = Arc::new(move |source: &SourceHandle, value: T| -> bool {
        source.dynamic_set(&name, ErasedValue::new(value))
    }) as SetterFn<T>;
    AccessorPair {
        getter: Some(getter),
        setter: Some(setter),
        path: path.clone(),
        kind: AccessorKind::Dynamic,
    }
}
