use std::sync::{Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

/// Randomness used for question selection, variant permutation and variant assignment.
pub(crate) trait ShuffleSource: Send + Sync {
    fn shuffle(&self, ids: &mut [String]);

    /// Uniform index in `0..len`; `0` when `len` is zero.
    fn pick(&self, len: usize) -> usize;

    /// Seed that reproduces this source's sequence, when there is one.
    fn seed(&self) -> Option<u64> {
        None
    }
}

pub(crate) struct SeededShuffle {
    seed: u64,
    rng: Mutex<StdRng>,
}

impl SeededShuffle {
    pub(crate) fn from_seed(seed: u64) -> Self {
        Self { seed, rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }

    pub(crate) fn from_entropy() -> Self {
        Self::from_seed(rand::random())
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ShuffleSource for SeededShuffle {
    fn shuffle(&self, ids: &mut [String]) {
        ids.shuffle(&mut *self.rng());
    }

    fn pick(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        self.rng().gen_range(0..len)
    }

    fn seed(&self) -> Option<u64> {
        Some(self.seed)
    }
}

/// Permutation of `0..len` fully determined by `material`.
///
/// Used for answer-option order so a reload shows the same layout.
pub(crate) fn stable_permutation(material: &str, len: usize) -> Vec<usize> {
    let digest = Sha256::digest(material.as_bytes());
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest);

    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(&mut StdRng::from_seed(seed));
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(count: usize) -> Vec<String> {
        (0..count).map(|index| format!("q{index}")).collect()
    }

    #[test]
    fn same_seed_reproduces_sequence() {
        let first = SeededShuffle::from_seed(42);
        let second = SeededShuffle::from_seed(42);

        let mut a = ids(20);
        let mut b = ids(20);
        first.shuffle(&mut a);
        second.shuffle(&mut b);

        assert_eq!(a, b);
        assert_eq!(first.pick(7), second.pick(7));
        assert_eq!(first.seed(), Some(42));
    }

    #[test]
    fn pick_stays_in_range() {
        let source = SeededShuffle::from_entropy();
        for len in 1..10 {
            assert!(source.pick(len) < len);
        }
        assert_eq!(source.pick(0), 0);
    }

    #[test]
    fn stable_permutation_is_deterministic_permutation() {
        let first = stable_permutation("asg-1:student-9:q-3", 5);
        let again = stable_permutation("asg-1:student-9:q-3", 5);

        assert_eq!(first, again);
        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4]);
    }
}
