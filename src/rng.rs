//! Splittable random keys.
//!
//! Randomness is threaded through the engine as explicit key values. A key
//! can be split into statistically independent child keys, and two runs given
//! the same key produce bit-identical results. Key derivation draws from a
//! dedicated ChaCha stream so child keys never share a stream with the draws
//! a computation makes from its own key.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Stream reserved for deriving child keys.
const SPLIT_STREAM: u64 = 1;

/// An explicit, value-semantics random key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RngKey(u64);

impl RngKey {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Materialize the generator for draws under this key.
    pub fn rng(self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.0)
    }

    /// Derive `n` independent child keys.
    pub fn split_n(self, n: usize) -> Vec<RngKey> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.0);
        rng.set_stream(SPLIT_STREAM);
        (0..n).map(|_| RngKey(rng.random())).collect()
    }

    pub fn split2(self) -> (RngKey, RngKey) {
        let keys = self.split_n(2);
        (keys[0], keys[1])
    }

    pub fn split3(self) -> (RngKey, RngKey, RngKey) {
        let keys = self.split_n(3);
        (keys[0], keys[1], keys[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_are_reproducible() {
        let key = RngKey::new(42);
        assert_eq!(key.split_n(4), key.split_n(4));
        assert_eq!(key.split2(), key.split2());
    }

    #[test]
    fn shorter_splits_are_prefixes() {
        let key = RngKey::new(7);
        let four = key.split_n(4);
        let (a, b) = key.split2();
        assert_eq!(&four[..2], &[a, b]);
    }

    #[test]
    fn children_are_pairwise_distinct() {
        let (a, b, c) = RngKey::new(3).split3();
        assert!(a != b && b != c && a != c);
    }

    #[test]
    fn children_differ_from_parent_stream() {
        // the first draw under a key must not equal the first child key
        let key = RngKey::new(11);
        let first_draw: u64 = key.rng().random();
        let child = key.split_n(1)[0];
        assert!(RngKey::new(first_draw) != child);
    }
}
