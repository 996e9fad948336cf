// Copyright 2025 the Cambium Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Type-erased property value storage.
//!
//! This module provides [`ErasedValue`] for carrying property values of any
//! type across the type-erased boundaries of the system: style setters,
//! dynamic binding sources, and change notifications.

use alloc::boxed::Box;
use core::any::{Any, TypeId};
use core::fmt;

/// A type-erased property value.
///
/// This wraps a value of any `'static + Clone` type, storing it on the heap
/// with its type information for later downcasting. The contained type's name
/// is retained for diagnostics, so a mismatched write can name both sides.
///
/// # Example
///
/// ```rust
/// use cambium_property::ErasedValue;
///
/// let value = ErasedValue::new(42_i32);
/// assert!(value.is::<i32>());
/// assert_eq!(value.downcast_ref::<i32>(), Some(&42));
///
/// // Owned extraction consumes the value.
/// assert_eq!(value.downcast::<i32>(), Ok(42));
/// ```
pub struct ErasedValue {
    inner: Box<dyn ErasedValueTrait>,
    type_id: TypeId,
    type_name: &'static str,
}

impl ErasedValue {
    /// Creates a new erased value from a concrete value.
    #[must_use]
    pub fn new<T: Clone + 'static>(value: T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: core::any::type_name::<T>(),
            inner: Box::new(value),
        }
    }

    /// Returns the [`TypeId`] of the contained value.
    #[must_use]
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the type name of the contained value.
    ///
    /// Intended for error messages; the exact string is not stable.
    #[must_use]
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if the contained value is of type `T`.
    #[must_use]
    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Attempts to downcast to a reference of type `T`.
    ///
    /// Returns `None` if the contained value is not of type `T`.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        if self.is::<T>() {
            self.inner.as_any().downcast_ref()
        } else {
            None
        }
    }

    /// Attempts to extract the contained value by type.
    ///
    /// Returns the value on success; returns `self` unchanged on a type
    /// mismatch so the caller can still report the contained type.
    pub fn downcast<T: Clone + 'static>(self) -> Result<T, Self> {
        if self.is::<T>() {
            match self.inner.into_any().downcast::<T>() {
                Ok(value) => Ok(*value),
                Err(_) => unreachable!("type id matched but downcast failed"),
            }
        } else {
            Err(self)
        }
    }

    /// Clones the contained value into a new [`ErasedValue`].
    #[must_use]
    pub fn clone_value(&self) -> Self {
        Self {
            inner: self.inner.clone_boxed(),
            type_id: self.type_id,
            type_name: self.type_name,
        }
    }
}

impl Clone for ErasedValue {
    fn clone(&self) -> Self {
        self.clone_value()
    }
}

impl fmt::Debug for ErasedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedValue")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Trait object for type-erased values that can be cloned.
trait ErasedValueTrait: Any {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn clone_boxed(&self) -> Box<dyn ErasedValueTrait>;
}

impl<T: Clone + 'static> ErasedValueTrait for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn clone_boxed(&self) -> Box<dyn ErasedValueTrait> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::string::String;

    #[test]
    fn erased_value_i32() {
        let value = ErasedValue::new(42_i32);
        assert!(value.is::<i32>());
        assert!(!value.is::<f64>());
        assert_eq!(value.downcast_ref::<i32>(), Some(&42));
        assert_eq!(value.downcast_ref::<f64>(), None);
    }

    #[test]
    fn erased_value_string() {
        let value = ErasedValue::new(String::from("hello"));
        assert!(value.is::<String>());
        assert_eq!(
            value.downcast_ref::<String>().map(|s| s.as_str()),
            Some("hello")
        );
    }

    #[test]
    fn erased_value_clone() {
        let value = ErasedValue::new(42_i32);
        let cloned = value.clone();
        assert_eq!(cloned.downcast_ref::<i32>(), Some(&42));
        assert_eq!(value.downcast_ref::<i32>(), Some(&42));
    }

    #[test]
    fn erased_value_owned_downcast() {
        let value = ErasedValue::new(String::from("taken"));
        assert_eq!(value.downcast::<String>(), Ok(String::from("taken")));
    }

    #[test]
    fn erased_value_owned_downcast_mismatch() {
        let value = ErasedValue::new(1.5_f64);
        let back = value.downcast::<i32>().unwrap_err();
        assert!(back.is::<f64>());
        assert_eq!(back.type_name(), "f64");
    }

    #[test]
    fn erased_value_type_id() {
        let value = ErasedValue::new(42_i32);
        assert_eq!(value.type_id(), TypeId::of::<i32>());
    }

    #[test]
    fn erased_value_debug() {
        let value = ErasedValue::new(42_i32);
        let debug = format!("{value:?}");
        assert!(debug.contains("ErasedValue"));
        assert!(debug.contains("i32"));
    }
}
