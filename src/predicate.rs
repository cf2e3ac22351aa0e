//! Query predicates.

use crate::error::{Error, Result};
use crate::record::RecordLayout;
use std::cmp::Ordering;

/// A filter tested against candidate keys by a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Every live record.
    All,
    /// Records whose key compares equal.
    Equality(Vec<u8>),
    /// Records whose key lies in `[lower, upper]`, both ends inclusive.
    Range {
        /// Smallest key to return.
        lower: Vec<u8>,
        /// Largest key to return.
        upper: Vec<u8>,
    },
}

impl Predicate {
    /// Equality predicate on `key`.
    pub fn equality(key: impl Into<Vec<u8>>) -> Self {
        Predicate::Equality(key.into())
    }

    /// Inclusive range predicate.
    pub fn range(lower: impl Into<Vec<u8>>, upper: impl Into<Vec<u8>>) -> Self {
        Predicate::Range { lower: lower.into(), upper: upper.into() }
    }

    /// Checks key widths and, for ranges, that `lower <= upper`.
    pub fn validate(&self, layout: &RecordLayout) -> Result<()> {
        match self {
            Predicate::All => Ok(()),
            Predicate::Equality(key) => check_width(layout, key),
            Predicate::Range { lower, upper } => {
                check_width(layout, lower)?;
                check_width(layout, upper)?;
                if layout.compare(lower, upper) == Ordering::Greater {
                    return Err(Error::invalid_predicate("range lower bound exceeds upper bound"));
                }
                Ok(())
            }
        }
    }

    /// Tests a decoded key.
    pub fn matches(&self, layout: &RecordLayout, key: &[u8]) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Equality(target) => layout.compare(key, target) == Ordering::Equal,
            Predicate::Range { lower, upper } => {
                layout.compare(key, lower) != Ordering::Less
                    && layout.compare(key, upper) != Ordering::Greater
            }
        }
    }

    /// Smallest key the predicate can match, if bounded below.
    pub fn lower_bound(&self) -> Option<&[u8]> {
        match self {
            Predicate::All => None,
            Predicate::Equality(key) => Some(key),
            Predicate::Range { lower, .. } => Some(lower),
        }
    }

    /// Largest key the predicate can match, if bounded above.
    pub fn upper_bound(&self) -> Option<&[u8]> {
        match self {
            Predicate::All => None,
            Predicate::Equality(key) => Some(key),
            Predicate::Range { upper, .. } => Some(upper),
        }
    }
}

fn check_width(layout: &RecordLayout, key: &[u8]) -> Result<()> {
    if key.len() != layout.key_size {
        return Err(Error::invalid_predicate(format!(
            "predicate key is {} bytes, dictionary expects {}",
            key.len(),
            layout.key_size
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{encode_i64, KeyType};

    fn layout() -> RecordLayout {
        RecordLayout::new(KeyType::NumericSigned, 4, 4)
    }

    #[test]
    fn test_range_is_inclusive() {
        let p = Predicate::range(encode_i64(-5, 4), encode_i64(5, 4));
        let l = layout();
        assert!(p.matches(&l, &encode_i64(-5, 4)));
        assert!(p.matches(&l, &encode_i64(0, 4)));
        assert!(p.matches(&l, &encode_i64(5, 4)));
        assert!(!p.matches(&l, &encode_i64(6, 4)));
        assert!(!p.matches(&l, &encode_i64(-6, 4)));
    }

    #[test]
    fn test_equality_and_all() {
        let l = layout();
        assert!(Predicate::All.matches(&l, &encode_i64(123, 4)));
        let p = Predicate::equality(encode_i64(3, 4));
        assert!(p.matches(&l, &encode_i64(3, 4)));
        assert!(!p.matches(&l, &encode_i64(4, 4)));
    }

    #[test]
    fn test_validate() {
        let l = layout();
        assert!(Predicate::range(encode_i64(1, 4), encode_i64(1, 4)).validate(&l).is_ok());
        assert!(matches!(
            Predicate::range(encode_i64(2, 4), encode_i64(1, 4)).validate(&l),
            Err(Error::InvalidPredicate(_))
        ));
        assert!(Predicate::equality(vec![0u8; 2]).validate(&l).is_err());
    }
}
