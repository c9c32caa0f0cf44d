//! Deterministic train/val/test assignment.
//!
//! An episode's split depends only on its id and the seed: the id is hashed
//! with seeded XXH3 and the hash is mapped to a bucket in `[0, 1]`. Order of
//! arrival and the rest of the dataset have no influence.

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Dataset split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    /// Training split
    Train,
    /// Validation split
    Val,
    /// Held-out test split
    Test,
}

impl Split {
    /// Serialized name
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }

    /// Parse a serialized name (`validation` accepted for `val`)
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "train" => Some(Split::Train),
            "val" | "validation" => Some(Split::Val),
            "test" => Some(Split::Test),
            _ => None,
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Train and val fractions; test takes the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    /// Fraction assigned to train
    pub train: f64,
    /// Fraction assigned to val
    pub val: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        SplitRatios { train: 0.8, val: 0.1 }
    }
}

impl SplitRatios {
    /// Test fraction
    pub fn test(&self) -> f64 {
        (1.0 - self.train - self.val).max(0.0)
    }

    /// True when both fractions are in `[0, 1]` and sum to at most 1
    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.train)
            && (0.0..=1.0).contains(&self.val)
            && self.train + self.val <= 1.0 + f64::EPSILON
    }
}

/// Hash bucket of an episode id in `[0, 1]`.
pub fn split_bucket(episode_id: &str, seed: u64) -> f64 {
    xxh3_64_with_seed(episode_id.as_bytes(), seed) as f64 / u64::MAX as f64
}

/// Split of `episode_id` under `seed` and `ratios`.
pub fn split_for(episode_id: &str, seed: u64, ratios: SplitRatios) -> Split {
    let bucket = split_bucket(episode_id, seed);
    if bucket < ratios.train {
        Split::Train
    } else if bucket < ratios.train + ratios.val {
        Split::Val
    } else {
        Split::Test
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_degenerate_ratios() {
        let all_train = SplitRatios { train: 1.0, val: 0.0 };
        let all_test = SplitRatios { train: 0.0, val: 0.0 };
        for i in 0..100 {
            let id = format!("ep_{}", i);
            assert_eq!(split_for(&id, 7, all_train), Split::Train);
            assert_eq!(split_for(&id, 7, all_test), Split::Test);
        }
    }

    #[test]
    fn test_ratios_roughly_respected() {
        let ratios = SplitRatios::default();
        let train = (0..5000)
            .filter(|i| split_for(&format!("episode_{:06}", i), 42, ratios) == Split::Train)
            .count();
        assert!((3700..4300).contains(&train), "train count {}", train);
    }

    #[test]
    fn test_split_names() {
        assert_eq!(Split::parse("validation"), Some(Split::Val));
        assert_eq!(serde_json::to_value(Split::Test).unwrap(), "test");
    }

    proptest! {
        #[test]
        fn prop_split_is_a_pure_function(id in "[a-z0-9_]{1,24}", seed in any::<u64>()) {
            let ratios = SplitRatios::default();
            prop_assert_eq!(split_for(&id, seed, ratios), split_for(&id, seed, ratios));
            let bucket = split_bucket(&id, seed);
            prop_assert!((0.0..=1.0).contains(&bucket));
        }
    }
}
