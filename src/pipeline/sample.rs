//! Image sampling: choose which pages the model gets to see.
//!
//! The pool is sorted by path. When it fits within the budget `k` the whole
//! sorted pool is returned. Otherwise the first two paths are always kept,
//! since scans are usually named in capture order and the opening pages
//! (covers, title pages) say the most about the material. The remaining
//! slots are a uniform draw without replacement from the rest of the pool,
//! left in draw order.
//!
//! The random source is injected so callers (and tests) can seed it.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;

/// How many leading paths are kept unconditionally.
pub const LEADING_PAGES: usize = 2;

/// Select at most `k` paths from `pool`.
///
/// `result.len() == min(k, pool.len())`, every returned path is a member of
/// `pool`, and no path is returned twice (pool paths are assumed unique).
pub fn sample_images<R: Rng + ?Sized>(pool: &[PathBuf], k: usize, rng: &mut R) -> Vec<PathBuf> {
    if k == 0 || pool.is_empty() {
        return Vec::new();
    }

    let mut sorted = pool.to_vec();
    sorted.sort();

    if sorted.len() <= k {
        return sorted;
    }

    let head = LEADING_PAGES.min(k);
    let rest = &sorted[head..];
    let draws = (k - head).min(rest.len());

    let mut picked = Vec::with_capacity(k);
    picked.extend_from_slice(&sorted[..head]);
    picked.extend(
        rand::seq::index::sample(rng, rest.len(), draws)
            .into_iter()
            .map(|i| rest[i].clone()),
    );
    picked
}

/// Build the sampler's random source: seeded when `seed` is given, from OS
/// entropy otherwise.
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
