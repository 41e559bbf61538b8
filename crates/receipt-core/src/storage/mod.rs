//! Receipt storage backends and vector distance helpers.

pub mod memory;

pub use memory::{MemoryProductStore, MemoryReceiptStore};

use crate::traits::DistanceMetric;

/// Cosine distance (`1 - cosine similarity`); zero vectors are at distance 1 from everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

pub fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Cosine => cosine_distance(a, b),
        DistanceMetric::L2 => l2_distance(a, b),
    }
}

/// Scores every entry against `query` and keeps the `k` nearest, ties broken by id.
pub(crate) fn rank_nearest<'a, T: 'a>(
    entries: impl IntoIterator<Item = (i64, &'a [f32], &'a T)>,
    query: &[f32],
    k: usize,
    metric: DistanceMetric,
) -> Vec<(i64, f32, &'a T)> {
    let mut scored: Vec<_> = entries
        .into_iter()
        .map(|(id, embedding, item)| (id, distance(metric, query, embedding), item))
        .collect();
    scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_distance() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_l2_distance() {
        assert!((l2_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-6);
        assert_eq!(distance(DistanceMetric::L2, &[1.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_rank_nearest_breaks_ties_by_id() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        let ranked = rank_nearest(
            [(3, &a[..], &"c"), (1, &a[..], &"a"), (2, &b[..], &"b")],
            &[1.0, 0.0],
            2,
            DistanceMetric::Cosine,
        );
        let ids: Vec<_> = ranked.iter().map(|(id, _, _)| *id).collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
