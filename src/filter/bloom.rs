//! SIEVE - Bit Vector Core
//! A space-efficient probabilistic data structure used to test
//! whether an item has been seen before.
//!
//! False positives are possible, but false negatives are not.
//! Bit positions depend only on the item bytes and the geometry,
//! so every process computes the same positions for the same item.

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::config::FilterParams;
use crate::error::{Result, SieveError};

const SEED_PRIMARY: u64 = 0;
const SEED_SECONDARY: u64 = 0xDEAD_BEEF;

/// Number of bits and hash functions derived from capacity and error rate.
///
/// # Formulas
/// - Optimal bits: `m = -n * ln(p) / (ln(2)^2)`
/// - Optimal hashes: `k = (m/n) * ln(2)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub num_bits: u64,
    pub num_hashes: u32,
}

impl Geometry {
    pub fn for_params(params: &FilterParams) -> Self {
        let n = params.capacity.max(1) as f64;
        let p = params.error_rate;

        let num_bits = (-n * p.ln() / (2.0_f64.ln().powi(2))).ceil() as u64;
        let num_bits = num_bits.max(64); // minimum 64 bits

        let num_hashes = ((num_bits as f64 / n) * 2.0_f64.ln()).ceil() as u32;
        let num_hashes = num_hashes.clamp(1, 32);

        Self {
            num_bits,
            num_hashes,
        }
    }

    /// Bit indexes for `item` using double hashing.
    /// Uses the technique: `h(i) = h1 + i * h2` (mod m).
    pub fn positions(&self, item: &[u8]) -> impl Iterator<Item = u64> {
        let h1 = xxh3_64_with_seed(item, SEED_PRIMARY);
        let h2 = xxh3_64_with_seed(item, SEED_SECONDARY);
        let m = self.num_bits;
        (0..self.num_hashes as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % m)
    }

    /// Expected false positive rate after `count` distinct insertions.
    /// `FPR ≈ (1 - e^(-kn/m))^k`
    pub fn fpr_at(&self, count: u64) -> f64 {
        if count == 0 {
            return 0.0;
        }
        let k = self.num_hashes as f64;
        let m = self.num_bits as f64;
        let n = count as f64;
        (1.0 - (-k * n / m).exp()).powf(k)
    }
}

/// In-memory bloom filter: a bit array plus its geometry.
///
/// ## How it works
/// - `k` hash functions map each item to bit positions
/// - On insert: set all corresponding bits to 1
/// - On lookup: check if all corresponding bits are 1
/// - If any bit is 0 → item is **definitely not** in the set
/// - If all bits are 1 → item is **probably** in the set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitVector {
    geometry: Geometry,
    /// Bit array stored as bytes.
    bits: Vec<u8>,
    /// Number of insertions that set at least one new bit.
    count: u64,
}

impl BitVector {
    /// Allocate a zeroed filter sized for `params`.
    /// Allocation failure is reported as [`SieveError::Fatal`].
    pub fn try_new(params: &FilterParams) -> Result<Self> {
        Self::with_geometry(Geometry::for_params(params))
    }

    pub fn with_geometry(geometry: Geometry) -> Result<Self> {
        let num_bytes = usize::try_from(geometry.num_bits.div_ceil(8)).map_err(|_| {
            SieveError::Fatal(format!(
                "bit vector of {} bits does not fit in memory",
                geometry.num_bits
            ))
        })?;

        let mut bits = Vec::new();
        bits.try_reserve_exact(num_bytes).map_err(|e| {
            SieveError::Fatal(format!("cannot allocate {} bytes: {}", num_bytes, e))
        })?;
        bits.resize(num_bytes, 0);

        Ok(Self {
            geometry,
            bits,
            count: 0,
        })
    }

    /// Insert an item. Returns `true` if the item was **newly inserted**,
    /// i.e. at least one of its bits was previously unset.
    pub fn insert(&mut self, item: &[u8]) -> bool {
        let mut newly = false;
        for bit in self.geometry.positions(item) {
            let byte_index = (bit / 8) as usize;
            let mask = 1u8 << (bit % 8);
            if self.bits[byte_index] & mask == 0 {
                self.bits[byte_index] |= mask;
                newly = true;
            }
        }
        if newly {
            self.count += 1;
        }
        newly
    }

    /// Check if an item **may** be in the set.
    pub fn may_contain(&self, item: &[u8]) -> bool {
        self.geometry.positions(item).all(|bit| {
            let byte_index = (bit / 8) as usize;
            self.bits[byte_index] & (1u8 << (bit % 8)) != 0
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Approximate number of distinct items inserted.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns the number of bits in the filter.
    pub fn num_bits(&self) -> u64 {
        self.geometry.num_bits
    }

    /// Returns the number of hash functions used.
    pub fn num_hashes(&self) -> u32 {
        self.geometry.num_hashes
    }

    /// Returns the approximate memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        self.bits.len()
    }

    /// Estimated false positive rate based on current fill.
    pub fn estimated_fpr(&self) -> f64 {
        self.geometry.fpr_at(self.count)
    }

    /// Check internal consistency after deserialization.
    pub(crate) fn is_well_formed(&self) -> bool {
        self.geometry.num_bits >= 1
            && self.geometry.num_hashes >= 1
            && self.bits.len() as u64 == self.geometry.num_bits.div_ceil(8)
    }
}
