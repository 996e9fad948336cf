// Copyright 2025 the Cambium Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cambium Property: property descriptors and per-owner-type metadata.
//!
//! This crate provides the identity layer of a dependency property system:
//! descriptor registration, metadata with per-subtype overrides, and shared
//! styles with compiled setters. Value storage, precedence resolution, and
//! change propagation live in `cambium_reactive`; binding path compilation
//! lives in `cambium_binding`.
//!
//! ## Core Concepts
//!
//! ### Descriptors
//!
//! A [`PropertyDescriptor`] is the process-wide identity of one property:
//! name, styling name, owner type, declared value type, and read-only /
//! attached flags. Descriptors are created once through the
//! [`PropertyRegistry::register`] family and never change identity.
//!
//! ### Metadata overrides
//!
//! [`PropertyMetadata`] carries a property's default value, option flags,
//! equality comparer, and optional changed/coerce callbacks. A subtype
//! customizes metadata with [`PropertyRegistry::override_metadata`]; lookups
//! through [`PropertyRegistry::metadata_for_owner`] walk the owner-type
//! hierarchy and return the nearest override without allocating.
//!
//! ### Styles
//!
//! [`Style`] is a shared, immutable set of property values. Each non
//! read-only property gets a setter compiled at registration time that
//! validates the value type and writes through a [`StyleTarget`].
//!
//! ## Quick Start
//!
//! ```rust
//! use cambium_property::{
//!     MetadataPatch, Property, PropertyMetadataBuilder, PropertyOptions, PropertyRegistry,
//! };
//!
//! let mut registry = PropertyRegistry::new();
//! let visual = registry.register_type("Visual", None);
//! let control = registry.register_type("Control", Some(visual));
//!
//! let opacity: Property<f64> = registry.register(
//!     "Opacity",
//!     visual,
//!     PropertyMetadataBuilder::new(1.0_f64)
//!         .options(PropertyOptions::AFFECTS_VISUAL_BOUNDS)
//!         .coerce(|v: f64| v.clamp(0.0, 1.0))
//!         .build(),
//! );
//!
//! // Controls are translucent by default.
//! registry.override_metadata(opacity, control, MetadataPatch::new().default_value(0.8));
//!
//! assert_eq!(registry.metadata_for_owner(opacity, visual).default_value(), &1.0);
//! assert_eq!(registry.metadata_for_owner(opacity, control).default_value(), &0.8);
//!
//! // Lookup by name respects the hierarchy.
//! assert_eq!(registry.find_by_name("Opacity", control), Ok(opacity.id()));
//! ```
//!
//! ## Memory Layout
//!
//! | Choice | Description |
//! |--------|-------------|
//! | **`PropertyId` as u16** | Compact property identification |
//! | **Sorted override tables** | Binary search per hierarchy level |
//! | **Shared defaults** | Default values stored once in the registry |
//! | **`Rc`-shared styles** | Objects reference style data, never copy it |
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`. It does not depend on `std`.

#![no_std]

extern crate alloc;

mod id;
mod metadata;
mod registry;
mod style;
mod value;

pub use id::{OwnerTypeId, Property, PropertyId};
pub use metadata::{
    CoerceValueCallback, MetadataPatch, PropertyChangedCallback, PropertyMetadata,
    PropertyMetadataBuilder, PropertyOptions,
};
pub use registry::{FindError, PropertyDescriptor, PropertyRegistry};
pub use style::{Style, StyleBuilder, StyleSetterFn, StyleTarget};
pub use value::ErasedValue;
