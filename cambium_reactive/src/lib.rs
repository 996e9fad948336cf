// Copyright 2025 the Cambium Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cambium Reactive: value resolution, digests, and change propagation.
//!
//! This crate is the runtime half of the dependency property system. It
//! stores per-object property values, resolves them through the precedence
//! ladder, keeps bound values current via digest cycles, and fans property
//! changes out to subscribers and layout invalidation sets. Property identity
//! and metadata live in `cambium_property`; binding paths compile in
//! `cambium_binding`.
//!
//! ## Core Concepts
//!
//! ### The precedence ladder
//!
//! Every property read resolves the strongest available source: animation
//! wins over a local value, which wins over triggered and styled values and
//! bindings, which win over an inherited value, which wins over the metadata
//! default ([`ValueSource`]). Storage is sparse. An object carries a
//! [`SourceLayers`] entry only for values actually set on it and a value cell
//! only for properties actually bound, so an object with ten thousand
//! registered properties and two set values stores two slots.
//!
//! ### Digest cycles
//!
//! Bound values change outside the engine's control, so the engine re-reads
//! them in digest cycles ([`DigestScheduler`]). Bindings on instrumented
//! sources are covered by push: the source marks the cell when the watched
//! member mutates, and nothing is polled. Everything else enrolls in the
//! sweep and is pulled once per [`PropertyEngine::run_tick`]. Marks raised by
//! change subscribers mid-sweep drain before the cycle ends, so one tick
//! settles a cascade.
//!
//! ### Change notification
//!
//! Effective-value transitions fire exactly once per transition through the
//! [`ChangeHub`], carrying old value, new value, and the new value's source.
//! Properties flagged as affecting layout also mark their object in the
//! [`InvalidationSet`], deduplicated per object, for the host's next layout
//! pass.
//!
//! ## Quick Start
//!
//! ```rust
//! use cambium_binding::{SchemaBuilder, Source};
//! use cambium_property::{Property, PropertyMetadataBuilder, PropertyOptions, PropertyRegistry};
//! use cambium_reactive::{PropertyEngine, ValueSource};
//!
//! struct Model {
//!     width: f64,
//! }
//!
//! let mut registry = PropertyRegistry::new();
//! let visual = registry.register_type("Visual", None);
//! let width: Property<f64> = registry.register(
//!     "Width",
//!     visual,
//!     PropertyMetadataBuilder::new(0.0_f64)
//!         .options(PropertyOptions::AFFECTS_MEASURE)
//!         .build(),
//! );
//!
//! let mut engine = PropertyEngine::new();
//! engine.register_schema(
//!     SchemaBuilder::<Model>::new()
//!         .field_mut("Width", |m| &m.width, |m| &mut m.width)
//!         .build(),
//! );
//! engine.attach(&registry, 1_u32, visual, None);
//!
//! let model = Source::builder(Model { width: 40.0 }).instrumented().build();
//! engine.bind(&registry, 1, width, &model.handle(), "Width").unwrap();
//! assert_eq!(engine.value(&registry, 1, width), 40.0);
//!
//! // The instrumented source pushes; flushing digests just the marked cell.
//! model.update_member("Width", |m| m.width = 64.0);
//! engine.flush_pushed(&registry);
//! assert_eq!(engine.value(&registry, 1, width), 64.0);
//!
//! // A local value shadows the binding without tearing it down.
//! engine.set_local(&registry, 1, width, 80.0);
//! assert_eq!(engine.value_source(&registry, 1, width.id()), ValueSource::Local);
//! ```
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`. It does not depend on `std`.

#![no_std]

extern crate alloc;

mod cell;
mod digest;
mod engine;
mod hub;
mod invalidate;
mod precedence;
mod store;

pub use digest::{DigestId, DigestScheduler};
pub use engine::{PropertyEngine, TickStats};
pub use hub::{ChangeHub, ChangeSubscriber, PropertyChange, SubscriptionId};
pub use invalidate::InvalidationSet;
pub use precedence::{SourceLayer, ValueSource};
pub use store::SourceLayers;
