// Copyright 2025 the Cambium Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cambium Binding: compiled, reflection-free data-binding accessors.
//!
//! This crate turns property-path expressions like `model.Items[3].Alpha`
//! into matched getter/setter pairs over application data sources. It is the
//! data-model half of the binding story; the property engine in
//! `cambium_reactive` consumes [`AccessorPair`]s to keep bound property
//! values current.
//!
//! ## Core Concepts
//!
//! ### Schemas instead of reflection
//!
//! Hosts without runtime code generation need their member accesses declared
//! up front. A [`TypeSchema`] captures, per source type, plain function
//! pointers for each member and the optional indexer; the
//! [`BindingCompiler`] chains them into a reusable accessor at bind time, so
//! value access never looks a name up again.
//!
//! ### Sources: instrumented or plain
//!
//! A [`Source`] wraps application state. Instrumented sources notify
//! watchers on mutation ([`Source::update_member`]), which lets the property
//! engine observe single-member bindings by push. Plain sources are checked
//! by pull, once per tick. A schema-less source can opt into
//! [`DynamicSource`] access, the by-name fallback for single-member paths.
//!
//! ### Null propagation
//!
//! An absent hop (optional member that is `None`, index out of range) makes
//! a getter produce the declared type's default. Missing members and
//! mismatched leaf types are bind-time errors instead.
//!
//! ## Quick Start
//!
//! ```rust
//! use cambium_binding::{BindingCompiler, SchemaBuilder, Source};
//!
//! struct Model {
//!     alpha: f64,
//! }
//!
//! let mut compiler = BindingCompiler::new();
//! compiler.register_schema(
//!     SchemaBuilder::<Model>::new()
//!         .field_mut("Alpha", |m| &m.alpha, |m| &mut m.alpha)
//!         .build(),
//! );
//!
//! let model = Source::builder(Model { alpha: 0.5 }).instrumented().build();
//! let alpha = compiler.compile::<f64>(&model.handle(), "Alpha").unwrap();
//!
//! assert_eq!(alpha.get(&model.handle()), Ok(0.5));
//! model.update_member("Alpha", |m| m.alpha = 0.8);
//! assert_eq!(alpha.get(&model.handle()), Ok(0.8));
//! ```
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`. It does not depend on `std`.

#![no_std]

extern crate alloc;

mod compiler;
mod path;
mod schema;
mod source;

pub use compiler::{AccessError, AccessorKind, AccessorPair, BindError, BindingCompiler};
pub use path::{BindingPath, PathError, PathSegment};
pub use schema::{
    IndexGetFn, IndexGetMutFn, Indexer, MemberAccessor, MemberGetFn, MemberGetMutFn, SchemaBuilder,
    TypeSchema,
};
pub use source::{DynamicSource, Source, SourceBuilder, SourceHandle, WatchHandle};
