/// Fixed-size Bloom filter over byte keys.
///
/// Positions come from double hashing (`h1 + i * h2`) of two independent
/// 64-bit hashes, so any number of probe positions costs two passes over the key.
#[derive(Clone, Debug)]
pub struct BloomFilter {
    bits: Vec<u64>,
    size: u64,
    num_hashes: u32,
    inserted: usize,
}

impl BloomFilter {
    pub fn new(size: u64, num_hashes: u32) -> Self {
        let size = size.max(64);
        let words = ((size + 63) / 64) as usize;
        Self {
            bits: vec![0u64; words],
            size,
            num_hashes: num_hashes.max(1),
            inserted: 0,
        }
    }

    /// Sized for `elements` entries at the requested false-positive rate.
    /// size = -n * ln(p) / ln(2)^2, hashes = (m / n) * ln(2)
    pub fn with_capacity(elements: usize, false_positive_rate: f64) -> Self {
        let size = Self::optimal_size(elements, false_positive_rate);
        let num_hashes = Self::optimal_hashes(elements, size);
        Self::new(size, num_hashes)
    }

    fn optimal_size(elements: usize, fp_rate: f64) -> u64 {
        let n = elements.max(1) as f64;
        let p = fp_rate.clamp(1e-9, 0.5);
        let size = -(n * p.ln()) / 2.0_f64.ln().powi(2);
        size.ceil() as u64
    }

    fn optimal_hashes(elements: usize, size: u64) -> u32 {
        let n = elements.max(1) as f64;
        let m = size as f64;
        let k = (m / n) * 2.0_f64.ln();
        k.round().clamp(1.0, 16.0) as u32
    }

    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_hashes {
            let bit = self.position(h1, h2, i);
            self.bits[(bit / 64) as usize] |= 1 << (bit % 64);
        }
        self.inserted += 1;
    }

    /// False positives possible, false negatives not.
    pub fn contains(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_pair(key);
        (0..self.num_hashes).all(|i| {
            let bit = self.position(h1, h2, i);
            self.bits[(bit / 64) as usize] & (1 << (bit % 64)) != 0
        })
    }

    pub fn size_bits(&self) -> u64 {
        self.size
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    pub fn inserted(&self) -> usize {
        self.inserted
    }

    fn position(&self, h1: u64, h2: u64, i: u32) -> u64 {
        h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.size
    }
}

fn hash_pair(key: &[u8]) -> (u64, u64) {
    // FNV-1a
    let mut h1 = 0xcbf2_9ce4_8422_2325u64;
    for &byte in key {
        h1 ^= byte as u64;
        h1 = h1.wrapping_mul(0x0000_0100_0000_01b3);
    }
    // djb2, forced odd so the stride never collapses to zero
    let mut h2 = 5381u64;
    for &byte in key {
        h2 = h2.wrapping_mul(33).wrapping_add(byte as u64);
    }
    (h1, h2 | 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizing_follows_capacity_and_rate() {
        let bloom = BloomFilter::with_capacity(100_000, 0.01);
        // ~958_506 bits and 7 hashes for n=100k, p=1%
        assert!(bloom.size_bits() > 950_000 && bloom.size_bits() < 970_000);
        assert_eq!(bloom.num_hashes(), 7);
    }

    #[test]
    fn inserted_keys_are_always_found() {
        let mut bloom = BloomFilter::with_capacity(1_000, 0.01);
        for i in 0..1_000 {
            bloom.insert(format!("http://example.com/{i}").as_bytes());
        }
        for i in 0..1_000 {
            assert!(bloom.contains(format!("http://example.com/{i}").as_bytes()));
        }
        assert_eq!(bloom.inserted(), 1_000);
    }

    #[test]
    fn false_positive_rate_stays_near_target() {
        let mut bloom = BloomFilter::with_capacity(5_000, 0.01);
        for i in 0..5_000 {
            bloom.insert(format!("seen-{i}").as_bytes());
        }
        let false_hits = (0..10_000)
            .filter(|i| bloom.contains(format!("fresh-{i}").as_bytes()))
            .count();
        assert!(false_hits < 400, "false positives: {false_hits}");
    }
}
