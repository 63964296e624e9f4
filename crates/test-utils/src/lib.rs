//! Fixtures shared by the unit and integration tests.

use std::cell::Cell;

use arbitrary::{Arbitrary, Unstructured};
use rand::RngCore;

pub mod chain;

/// Size of the random pool, enough for a few thousand task payloads.
const POOL_SIZE: usize = 1 << 20;

/// Hands out `Arbitrary` values drawn from one pool of random bytes, each
/// value consuming the bytes after the previous one.
pub struct ArbitraryGenerator {
    pool: Vec<u8>,
    cursor: Cell<usize>,
}

impl Default for ArbitraryGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ArbitraryGenerator {
    pub fn new() -> Self {
        Self::with_pool_size(POOL_SIZE)
    }

    pub fn with_pool_size(size: usize) -> Self {
        let mut pool = vec![0; size];
        rand::thread_rng().fill_bytes(&mut pool);
        Self {
            pool,
            cursor: Cell::new(0),
        }
    }

    /// # Panics
    ///
    /// If the pool cannot produce a valid `T`.
    pub fn generate<'a, T: Arbitrary<'a>>(&'a self) -> T {
        let start = self.cursor.get();
        let mut u = Unstructured::new(&self.pool[start..]);
        let before = u.len();
        let value = T::arbitrary(&mut u).expect("random pool exhausted");
        self.cursor.set(start + before - u.len());
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consecutive_values_differ() {
        let gen = ArbitraryGenerator::new();
        let a: [u8; 32] = gen.generate();
        let b: [u8; 32] = gen.generate();
        assert_ne!(a, b);
    }
}
