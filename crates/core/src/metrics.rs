//! Retrieval quality measures for offline evaluation.

use std::collections::HashSet;
use std::hash::Hash;

/// Fraction of the first `k` retrieved identifiers that are relevant.
///
/// The denominator is `k` even when fewer than `k` results were retrieved.
pub fn precision_at_k<T: Eq + Hash>(retrieved: &[T], relevant: &[T], k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    let relevant: HashSet<&T> = relevant.iter().collect();
    let hits = retrieved
        .iter()
        .take(k)
        .filter(|item| relevant.contains(item))
        .count();
    hits as f64 / k as f64
}

/// Fraction of the distinct relevant identifiers found among the first `k` retrieved.
pub fn recall_at_k<T: Eq + Hash>(retrieved: &[T], relevant: &[T], k: usize) -> f64 {
    let relevant: HashSet<&T> = relevant.iter().collect();
    if relevant.is_empty() {
        return 0.0;
    }
    let top_k: HashSet<&T> = retrieved.iter().take(k).collect();
    top_k.intersection(&relevant).count() as f64 / relevant.len() as f64
}
