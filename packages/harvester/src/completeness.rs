//! Completeness verification of a finished harvest.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether a run visited exactly the number of items the listing declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Completeness {
    Completed,
    /// `missing` is `declared - visited`. Negative means more items were
    /// visited than declared.
    PartialWithGap {
        declared: u64,
        visited: usize,
        missing: i64,
    },
}

impl Completeness {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Signed gap; zero when complete.
    #[must_use]
    pub fn missing(&self) -> i64 {
        match self {
            Self::Completed => 0,
            Self::PartialWithGap { missing, .. } => *missing,
        }
    }
}

impl fmt::Display for Completeness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("complete"),
            Self::PartialWithGap {
                declared,
                visited,
                missing,
            } if *missing > 0 => write!(
                f,
                "incomplete: visited {visited} of {declared} declared items ({missing} missing)"
            ),
            Self::PartialWithGap {
                declared,
                visited,
                missing,
            } => write!(
                f,
                "surplus: visited {visited} items but {declared} declared ({} extra)",
                -missing
            ),
        }
    }
}

/// Compare visited and declared counts.
///
/// # Examples
/// ```
/// use policy_harvester::completeness::{verify, Completeness};
///
/// assert_eq!(verify(5, 5), Completeness::Completed);
/// assert_eq!(verify(3, 5).missing(), 2);
/// assert_eq!(verify(6, 5).missing(), -1);
/// ```
#[must_use]
pub fn verify(visited: usize, declared: u64) -> Completeness {
    let missing = i64::try_from(declared)
        .unwrap_or(i64::MAX)
        .saturating_sub(i64::try_from(visited).unwrap_or(i64::MAX));

    if missing == 0 {
        Completeness::Completed
    } else {
        Completeness::PartialWithGap {
            declared,
            visited,
            missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_completes() {
        assert_eq!(verify(5, 5), Completeness::Completed);
        assert_eq!(verify(0, 0), Completeness::Completed);
    }

    #[test]
    fn test_positive_gap() {
        assert_eq!(
            verify(3, 5),
            Completeness::PartialWithGap {
                declared: 5,
                visited: 3,
                missing: 2
            }
        );
    }

    #[test]
    fn test_surplus_not_clamped() {
        let result = verify(6, 5);
        assert_eq!(
            result,
            Completeness::PartialWithGap {
                declared: 5,
                visited: 6,
                missing: -1
            }
        );
        assert!(!result.is_complete());
        assert!(result.to_string().starts_with("surplus"));
    }

    #[test]
    fn test_display_gap_names_both_counts() {
        let text = verify(3, 5).to_string();
        assert!(text.contains('3'));
        assert!(text.contains('5'));
    }
}
