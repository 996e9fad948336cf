// Copyright 2025 the Cambium Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Value sources and their precedence order.
//!
//! An effective property value can come from a number of places: it may
//! have been written directly, pushed down by a style or a trigger, pulled
//! from a data binding, inherited from an ancestor object, or it may simply
//! be the registered default. When several of those are present at once,
//! the strongest source wins, and [`ValueSource`] defines that total order.

/// Where an effective property value came from.
///
/// Sources are declared from weakest to strongest, so the derived ordering
/// is the precedence order: a value from a greater source shadows any value
/// from a lesser one. Animation is the strongest source and the registered
/// default is the weakest.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueSource {
    /// The default value from the property's effective metadata.
    Default,
    /// A value inherited from an ancestor object in the tree.
    Inherited,
    /// A value applied by a style.
    Styled,
    /// A value applied by an active trigger.
    Triggered,
    /// A value pulled from a data binding.
    Bound,
    /// A value written directly on the object.
    Local,
    /// A value supplied by a running animation.
    Animated,
}

impl ValueSource {
    /// Whether values from this source pass through the coerce callback.
    ///
    /// Inherited and default values are used as-is; everything stronger is
    /// coerced before it becomes the effective value.
    #[must_use]
    pub fn is_coerced(self) -> bool {
        self >= ValueSource::Styled
    }
}

/// A storage layer a value can be written into.
///
/// This is the subset of [`ValueSource`] that is actually stored per object:
/// defaults live in the registry, and bound values are held by the binding
/// itself rather than written into a layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SourceLayer {
    /// The inherited-value layer, maintained by tree propagation.
    Inherited,
    /// The styled-value layer.
    Styled,
    /// The triggered-value layer.
    Triggered,
    /// The local-value layer.
    Local,
    /// The animation layer.
    Animated,
}

impl SourceLayer {
    /// The [`ValueSource`] a value stored in this layer resolves as.
    #[must_use]
    pub fn as_source(self) -> ValueSource {
        match self {
            SourceLayer::Inherited => ValueSource::Inherited,
            SourceLayer::Styled => ValueSource::Styled,
            SourceLayer::Triggered => ValueSource::Triggered,
            SourceLayer::Local => ValueSource::Local,
            SourceLayer::Animated => ValueSource::Animated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_order() {
        assert!(ValueSource::Default < ValueSource::Inherited);
        assert!(ValueSource::Inherited < ValueSource::Styled);
        assert!(ValueSource::Styled < ValueSource::Triggered);
        assert!(ValueSource::Triggered < ValueSource::Bound);
        assert!(ValueSource::Bound < ValueSource::Local);
        assert!(ValueSource::Local < ValueSource::Animated);
    }

    #[test]
    fn coercion_applies_above_inherited() {
        assert!(!ValueSource::Default.is_coerced());
        assert!(!ValueSource::Inherited.is_coerced());
        assert!(ValueSource::Styled.is_coerced());
        assert!(ValueSource::Triggered.is_coerced());
        assert!(ValueSource::Bound.is_coerced());
        assert!(ValueSource::Local.is_coerced());
        assert!(ValueSource::Animated.is_coerced());
    }

    #[test]
    fn layers_map_to_sources() {
        assert_eq!(SourceLayer::Local.as_source(), ValueSource::Local);
        assert_eq!(SourceLayer::Animated.as_source(), ValueSource::Animated);
        assert_eq!(SourceLayer::Inherited.as_source(), ValueSource::Inherited);
    }
}
