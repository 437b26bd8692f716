//! Key ranges for index scans.

use std::ops::Bound;

/// A contiguous range over index values.
///
/// Mirrors the bound constructors of the platform key-range type: a range
/// may be open or closed at either end, or unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange<K> {
    lower: Bound<K>,
    upper: Bound<K>,
}

impl<K: Ord> KeyRange<K> {
    /// A range covering every value.
    #[must_use]
    pub fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Values up to `value`; `open` excludes `value` itself.
    #[must_use]
    pub fn upper_bound(value: K, open: bool) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: if open {
                Bound::Excluded(value)
            } else {
                Bound::Included(value)
            },
        }
    }

    /// Values from `value` on; `open` excludes `value` itself.
    #[must_use]
    pub fn lower_bound(value: K, open: bool) -> Self {
        Self {
            lower: if open {
                Bound::Excluded(value)
            } else {
                Bound::Included(value)
            },
            upper: Bound::Unbounded,
        }
    }

    /// Values between `lower` and `upper`, both inclusive.
    #[must_use]
    pub fn bound(lower: K, upper: K) -> Self {
        Self {
            lower: Bound::Included(lower),
            upper: Bound::Included(upper),
        }
    }

    /// Returns the lower bound.
    pub fn lower(&self) -> Bound<&K> {
        self.lower.as_ref()
    }

    /// Returns the upper bound.
    pub fn upper(&self) -> Bound<&K> {
        self.upper.as_ref()
    }

    /// Whether `value` lies below the lower bound.
    pub fn is_below(&self, value: &K) -> bool {
        match &self.lower {
            Bound::Included(l) => value < l,
            Bound::Excluded(l) => value <= l,
            Bound::Unbounded => false,
        }
    }

    /// Whether `value` lies above the upper bound.
    pub fn is_above(&self, value: &K) -> bool {
        match &self.upper {
            Bound::Included(u) => value > u,
            Bound::Excluded(u) => value >= u,
            Bound::Unbounded => false,
        }
    }

    /// Whether `value` lies within the range.
    pub fn contains(&self, value: &K) -> bool {
        !self.is_below(value) && !self.is_above(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn inclusive_upper_bound() {
        let range = KeyRange::upper_bound(70u64, false);
        assert!(range.contains(&0));
        assert!(range.contains(&70));
        assert!(!range.contains(&71));
        assert!(range.is_above(&71));
    }

    #[test]
    fn open_upper_bound() {
        let range = KeyRange::upper_bound(70u64, true);
        assert!(range.contains(&69));
        assert!(!range.contains(&70));
    }

    #[test]
    fn lower_and_closed_ranges() {
        let range = KeyRange::lower_bound(10u64, true);
        assert!(range.is_below(&10));
        assert!(range.contains(&11));

        let range = KeyRange::bound(3u64, 5);
        assert!(range.contains(&3));
        assert!(range.contains(&5));
        assert!(!range.contains(&6));
        assert!(range.is_below(&2));
    }

    #[test]
    fn all_contains_everything() {
        let range = KeyRange::<u64>::all();
        assert!(range.contains(&0));
        assert!(range.contains(&u64::MAX));
    }

    proptest! {
        #[test]
        fn contains_is_between_bounds(
            lower in 0u64..1000,
            span in 0u64..1000,
            value in 0u64..3000,
        ) {
            let range = KeyRange::bound(lower, lower + span);
            prop_assert_eq!(
                range.contains(&value),
                !range.is_below(&value) && !range.is_above(&value)
            );
            prop_assert_eq!(range.contains(&value), value >= lower && value <= lower + span);
        }
    }
}
