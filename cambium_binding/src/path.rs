// Copyright 2025 the Cambium Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Binding path expressions.
//!
//! A binding path names a location inside a data source as a sequence of
//! member accesses and indexers, e.g. `model.Items[3].Alpha`. Paths are
//! parsed once when a binding is constructed; the compiler consumes the
//! parsed segments.

use alloc::sync::Arc;

use smallvec::SmallVec;

/// One step of a binding path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSegment {
    /// A named member access, e.g. `Alpha` in `model.Alpha`.
    Member(Arc<str>),
    /// A positional indexer access, e.g. `[3]` in `Items[3]`.
    Index(usize),
}

/// Error produced when a binding path expression cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathError {
    /// The expression is empty.
    Empty,
    /// A character that is not valid in a member name or indexer.
    UnexpectedCharacter {
        /// Byte offset of the offending character.
        at: usize,
    },
    /// A `.` with no member name following it.
    MissingMember {
        /// Byte offset where a member name was expected.
        at: usize,
    },
    /// An indexer with a missing or non-numeric index.
    InvalidIndex {
        /// Byte offset of the indexer's opening bracket.
        at: usize,
    },
    /// An indexer that is never closed with `]`.
    UnclosedIndex {
        /// Byte offset of the indexer's opening bracket.
        at: usize,
    },
}

impl core::fmt::Display for PathError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Empty => write!(f, "binding path is empty"),
            Self::UnexpectedCharacter { at } => {
                write!(f, "unexpected character at byte {at} in binding path")
            }
            Self::MissingMember { at } => {
                write!(f, "expected a member name at byte {at} in binding path")
            }
            Self::InvalidIndex { at } => {
                write!(f, "invalid index in binding path at byte {at}")
            }
            Self::UnclosedIndex { at } => {
                write!(f, "unclosed indexer in binding path at byte {at}")
            }
        }
    }
}

impl core::error::Error for PathError {}

/// A parsed binding path.
///
/// Holds the original expression text alongside its segments. The text is
/// reference-counted so the compiler's accessor cache can key on it without
/// re-allocating per lookup.
///
/// # Example
///
/// ```rust
/// use cambium_binding::{BindingPath, PathSegment};
///
/// let path = BindingPath::parse("Items[3].Alpha").unwrap();
/// assert_eq!(path.segments().len(), 3);
/// assert_eq!(path.segments()[1], PathSegment::Index(3));
/// assert_eq!(path.text(), "Items[3].Alpha");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindingPath {
    text: Arc<str>,
    segments: SmallVec<[PathSegment; 2]>,
}

impl BindingPath {
    /// Parses a path expression.
    ///
    /// The grammar is member names (identifier characters) separated by `.`,
    /// with any number of `[index]` suffixes after a member. The first
    /// segment must be a member.
    ///
    /// # Errors
    ///
    /// Returns a [`PathError`] describing the first offending position when
    /// the expression cannot be parsed.
    pub fn parse(expression: &str) -> Result<Self, PathError> {
        if expression.is_empty() {
            return Err(PathError::Empty);
        }
        let mut segments = SmallVec::new();
        let bytes = expression.char_indices().collect::<SmallVec<[(usize, char); 32]>>();
        let mut i = 0;

        loop {
            // A member name is required at the start and after every '.'.
            let start = i;
            while i < bytes.len() && is_member_char(bytes[i].1, i == start) {
                i += 1;
            }
            if i == start {
                let at = bytes.get(i).map_or(expression.len(), |(pos, _)| *pos);
                return Err(if i < bytes.len() && bytes[i].1 != '.' {
                    PathError::UnexpectedCharacter { at }
                } else {
                    PathError::MissingMember { at }
                });
            }
            let end = bytes.get(i).map_or(expression.len(), |(pos, _)| *pos);
            segments.push(PathSegment::Member(Arc::from(
                &expression[bytes[start].0..end],
            )));

            // Zero or more indexers follow a member.
            while i < bytes.len() && bytes[i].1 == '[' {
                let open = bytes[i].0;
                i += 1;
                let digits_start = i;
                while i < bytes.len() && bytes[i].1.is_ascii_digit() {
                    i += 1;
                }
                if i == digits_start {
                    return Err(PathError::InvalidIndex { at: open });
                }
                if i >= bytes.len() || bytes[i].1 != ']' {
                    return Err(PathError::UnclosedIndex { at: open });
                }
                let digits = &expression[bytes[digits_start].0..bytes[i].0];
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| PathError::InvalidIndex { at: open })?;
                segments.push(PathSegment::Index(index));
                i += 1;
            }

            if i >= bytes.len() {
                break;
            }
            if bytes[i].1 != '.' {
                return Err(PathError::UnexpectedCharacter { at: bytes[i].0 });
            }
            i += 1;
            if i >= bytes.len() {
                return Err(PathError::MissingMember {
                    at: expression.len(),
                });
            }
        }

        Ok(Self {
            text: Arc::from(expression),
            segments,
        })
    }

    /// Returns the original expression text.
    #[must_use]
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the shared text allocation, used as an accessor cache key.
    #[must_use]
    #[inline]
    pub fn shared_text(&self) -> &Arc<str> {
        &self.text
    }

    /// Returns the parsed segments in access order.
    #[must_use]
    #[inline]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Returns the member name if the path is exactly one member access.
    ///
    /// Single-member paths are the only shape eligible for push coverage and
    /// for the dynamic (reflective) fallback.
    #[must_use]
    pub fn single_member(&self) -> Option<&Arc<str>> {
        match self.segments.as_slice() {
            [PathSegment::Member(name)] => Some(name),
            _ => None,
        }
    }

    /// Returns the leaf member name, or `None` when the path ends in an
    /// indexer.
    #[must_use]
    pub fn leaf_member(&self) -> Option<&Arc<str>> {
        match self.segments.last() {
            Some(PathSegment::Member(name)) => Some(name),
            _ => None,
        }
    }
}

impl core::fmt::Display for BindingPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.text)
    }
}

fn is_member_char(c: char, first: bool) -> bool {
    if first {
        c.is_alphabetic() || c == '_'
    } else {
        c.is_alphanumeric() || c == '_'
    }
}
