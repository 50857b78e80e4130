//! Fixed-size Bloom filter used to short-circuit negative vanity-path
//! lookups before they reach the backing store.

use siphasher::sip::SipHasher13;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

/// A Bloom filter over a fixed byte array. Two keyed SipHash instances
/// produce the base pair `(h1, h2)`; the remaining `k - 2` hashes are
/// derived by the standard `h1 + i * h2` combination (Kirsch-Mitzenmacher),
/// avoiding `k` independent hash functions.
pub struct BloomFilter {
    bits: Vec<AtomicU64>,
    num_bits: u64,
    k: u32,
}

const NUM_HASHES: u32 = 7;

impl BloomFilter {
    /// `max_bytes` mirrors `vanity_bloom_filter_max_bytes`.
    pub fn new(max_bytes: usize) -> Self {
        let words = (max_bytes.max(8) / 8).max(1);
        let num_bits = (words * 64) as u64;
        Self {
            bits: (0..words).map(|_| AtomicU64::new(0)).collect(),
            num_bits,
            k: NUM_HASHES,
        }
    }

    fn hash_pair(s: &str) -> (u64, u64) {
        let mut h1 = SipHasher13::new_with_keys(0, 0);
        s.hash(&mut h1);
        let mut h2 = SipHasher13::new_with_keys(0x5bd1_e995, 0x27d4_eb2f);
        s.hash(&mut h2);
        (h1.finish(), h2.finish())
    }

    fn positions(&self, s: &str) -> impl Iterator<Item = u64> + '_ {
        let (h1, h2) = Self::hash_pair(s);
        let num_bits = self.num_bits;
        (0..self.k).map(move |i| {
            let combined = h1.wrapping_add((i as u64).wrapping_mul(h2));
            combined % num_bits
        })
    }

    pub fn add(&self, s: &str) {
        for pos in self.positions(s) {
            let word = (pos / 64) as usize;
            let bit = pos % 64;
            self.bits[word].fetch_or(1u64 << bit, Ordering::Relaxed);
        }
    }

    /// `false` is a guaranteed negative; `true` may be a false positive.
    pub fn probably_contains(&self, s: &str) -> bool {
        self.positions(s).all(|pos| {
            let word = (pos / 64) as usize;
            let bit = pos % 64;
            self.bits[word].load(Ordering::Relaxed) & (1u64 << bit) != 0
        })
    }

    pub fn clear(&self) {
        for word in &self.bits {
            word.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn added_entries_are_found() {
        let filter = BloomFilter::new(1024);
        filter.add("/content/foo");
        filter.add("/content/bar");
        assert!(filter.probably_contains("/content/foo"));
        assert!(filter.probably_contains("/content/bar"));
    }

    #[test]
    fn absent_entries_are_usually_negative() {
        let filter = BloomFilter::new(65536);
        for i in 0..200 {
            filter.add(&format!("/content/known-{i}"));
        }
        let mut false_positives = 0;
        for i in 0..200 {
            if filter.probably_contains(&format!("/content/unknown-{i}")) {
                false_positives += 1;
            }
        }
        assert!(false_positives < 20, "false positive rate too high: {false_positives}/200");
    }

    #[test]
    fn clear_resets_all_bits() {
        let filter = BloomFilter::new(1024);
        filter.add("/content/foo");
        filter.clear();
        assert!(!filter.probably_contains("/content/foo"));
    }
}
