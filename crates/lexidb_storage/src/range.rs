//! Key ranges.

use crate::error::{StorageError, StorageResult};
use lexidb_codec::Key;
use std::ops::Bound;

/// A contiguous range of keys, used to bound lookups, counts and cursors.
///
/// Bounds are inclusive unless marked open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    lower: Bound<Key>,
    upper: Bound<Key>,
}

impl KeyRange {
    /// A range matching exactly one key.
    pub fn only(key: Key) -> Self {
        Self {
            lower: Bound::Included(key.clone()),
            upper: Bound::Included(key),
        }
    }

    /// A range with only a lower bound.
    pub fn lower_bound(key: Key, open: bool) -> Self {
        Self {
            lower: bound(key, open),
            upper: Bound::Unbounded,
        }
    }

    /// A range with only an upper bound.
    pub fn upper_bound(key: Key, open: bool) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: bound(key, open),
        }
    }

    /// A range with both bounds.
    ///
    /// # Errors
    ///
    /// Returns a data error if `lower` is greater than `upper`.
    pub fn bound(lower: Key, upper: Key, lower_open: bool, upper_open: bool) -> StorageResult<Self> {
        if lower > upper {
            return Err(StorageError::data(format!(
                "lower bound {lower} is greater than upper bound {upper}"
            )));
        }
        Ok(Self {
            lower: bound(lower, lower_open),
            upper: bound(upper, upper_open),
        })
    }

    /// Returns the lower bound.
    pub fn lower(&self) -> Bound<&Key> {
        self.lower.as_ref()
    }

    /// Returns the upper bound.
    pub fn upper(&self) -> Bound<&Key> {
        self.upper.as_ref()
    }

    /// Checks whether the range contains a key.
    pub fn contains(&self, key: &Key) -> bool {
        let above = match &self.lower {
            Bound::Included(l) => key >= l,
            Bound::Excluded(l) => key > l,
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(u) => key <= u,
            Bound::Excluded(u) => key < u,
            Bound::Unbounded => true,
        };
        above && below
    }

    /// Returns true if no key can fall inside the range.
    ///
    /// `BTreeMap::range` panics on such ranges, so callers check this first.
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(l), Bound::Included(u)) => l > u,
            (Bound::Included(l), Bound::Excluded(u))
            | (Bound::Excluded(l), Bound::Included(u))
            | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
            _ => false,
        }
    }

    pub(crate) fn as_bounds(&self) -> (Bound<&Key>, Bound<&Key>) {
        (self.lower.as_ref(), self.upper.as_ref())
    }
}

fn bound(key: Key, open: bool) -> Bound<Key> {
    if open {
        Bound::Excluded(key)
    } else {
        Bound::Included(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(n: i64) -> Key {
        Key::from(n)
    }

    #[test]
    fn only_contains_single_key() {
        let range = KeyRange::only(k(5));
        assert!(range.contains(&k(5)));
        assert!(!range.contains(&k(4)));
        assert!(!range.contains(&k(6)));
    }

    #[test]
    fn bound_respects_openness() {
        let closed = KeyRange::bound(k(1), k(3), false, false).unwrap();
        assert!(closed.contains(&k(1)));
        assert!(closed.contains(&k(3)));

        let open = KeyRange::bound(k(1), k(3), true, true).unwrap();
        assert!(!open.contains(&k(1)));
        assert!(open.contains(&k(2)));
        assert!(!open.contains(&k(3)));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let err = KeyRange::bound(k(3), k(1), false, false).unwrap_err();
        assert!(matches!(err, StorageError::Data { .. }));
    }

    #[test]
    fn equal_bounds_with_open_side_are_empty() {
        assert!(!KeyRange::bound(k(2), k(2), false, false).unwrap().is_empty());
        assert!(KeyRange::bound(k(2), k(2), true, false).unwrap().is_empty());
        assert!(KeyRange::bound(k(2), k(2), false, true).unwrap().is_empty());
    }

    #[test]
    fn half_open_ranges() {
        let lower = KeyRange::lower_bound(k(10), true);
        assert!(!lower.contains(&k(10)));
        assert!(lower.contains(&k(11)));
        assert!(lower.contains(&Key::from("text")));

        let upper = KeyRange::upper_bound(k(10), false);
        assert!(upper.contains(&k(10)));
        assert!(!upper.contains(&k(11)));
        assert!(!upper.is_empty());
    }
}
