//! Best-permutation accuracy.
//!
//! Cluster ids are arbitrary, so a predicted labeling is scored against the
//! ground truth under every relabeling and the best one is kept. Truth ids
//! are first mapped onto `0..L` in ascending order, `L` being the number of
//! distinct truth labels. With `K` predicted clusters and `m = max(K, L)`,
//! a relabeling is an injective map from the clusters into `0..m`, one of
//! `m! / (m - K)!`. Predicted cluster `p` is relabeled to `perm[p]`; targets
//! at or above `L` match no sample.
//!
//! Relabelings are addressed by their lexicographic rank (factorial number
//! system), which lets rayon split the search into independent ranges. The
//! reduction keeps the highest accuracy and, among equals, the lowest rank,
//! so the result does not depend on scheduling.

use rayon::prelude::*;
use serde::Serialize;

use crate::error::{Error, Result};

/// Largest `m` the exhaustive search accepts (`10! = 3_628_800`).
pub const MAX_PERMUTATION_LABELS: usize = 10;

/// Winner of the relabeling search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PermutationScore {
    /// Fraction of samples whose relabeled prediction equals the truth.
    pub accuracy: f64,
    /// Length `K`; entry `p` is the truth id assigned to cluster `p`.
    /// Clusters left without a truth label get fresh ids above the largest
    /// truth id.
    pub permutation: Vec<usize>,
    /// `permutation[pred[i]]` for every sample.
    pub remapped: Vec<usize>,
}

/// Number of ordered selections of `k` items out of `n`.
fn arrangements(n: usize, k: usize) -> usize {
    (n - k + 1..=n).product()
}

/// The ordered selection of `k` items from `0..n` with lexicographic rank
/// `rank`. `k == n` gives the plain permutations.
pub fn nth_arrangement(n: usize, k: usize, mut rank: usize) -> Vec<usize> {
    let mut pool: Vec<usize> = (0..n).collect();
    let mut picked = Vec::with_capacity(k);
    for i in 0..k {
        let block = arrangements(n - 1 - i, k - 1 - i);
        picked.push(pool.remove(rank / block));
        rank %= block;
    }
    picked
}

/// Score `pred` (labels in `0..k`) against `truth` under every relabeling.
///
/// Truth ids need not be dense.
pub fn best_permutation(truth: &[usize], pred: &[usize], k: usize) -> Result<PermutationScore> {
    if truth.is_empty() {
        return Err(Error::EmptyInput);
    }
    if truth.len() != pred.len() {
        return Err(Error::ShapeMismatch {
            context: "predicted labels",
            expected: truth.len(),
            got: pred.len(),
        });
    }
    if k == 0 {
        return Err(Error::DegenerateClusterCount {
            k,
            samples: pred.len(),
        });
    }
    if let Some(&label) = pred.iter().find(|&&p| p >= k) {
        return Err(Error::LabelOutOfRange { label, bound: k });
    }

    let mut ids = truth.to_vec();
    ids.sort_unstable();
    ids.dedup();
    let m = k.max(ids.len());
    if m > MAX_PERMUTATION_LABELS {
        return Err(Error::PermutationSearchTooLarge {
            labels: m,
            max: MAX_PERMUTATION_LABELS,
        });
    }

    // confusion[p][t]: samples predicted p with dense truth t
    let mut confusion = vec![vec![0usize; m]; k];
    for (t, &p) in truth.iter().zip(pred) {
        // ids is sorted and holds every truth value
        let dense = ids.partition_point(|id| id < t);
        confusion[p][dense] += 1;
    }

    let score = |rank: usize| -> (usize, usize) {
        let perm = nth_arrangement(m, k, rank);
        let hits = perm.iter().enumerate().map(|(p, &t)| confusion[p][t]).sum();
        (hits, rank)
    };
    let (hits, rank) = (0..arrangements(m, k))
        .into_par_iter()
        .map(score)
        .reduce(
            || (0, usize::MAX),
            |a, b| {
                if a.0 > b.0 || (a.0 == b.0 && a.1 < b.1) {
                    a
                } else {
                    b
                }
            },
        );

    let fresh_base = ids.last().map_or(0, |&id| id + 1);
    let permutation: Vec<usize> = nth_arrangement(m, k, rank)
        .into_iter()
        .map(|t| ids.get(t).copied().unwrap_or_else(|| fresh_base + t - ids.len()))
        .collect();
    let remapped = pred.iter().map(|&p| permutation[p]).collect();
    Ok(PermutationScore {
        accuracy: hits as f64 / truth.len() as f64,
        permutation,
        remapped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_enumerate_in_lexicographic_order() {
        let all: Vec<Vec<usize>> = (0..6).map(|r| nth_arrangement(3, 3, r)).collect();
        assert_eq!(
            all,
            vec![
                vec![0, 1, 2],
                vec![0, 2, 1],
                vec![1, 0, 2],
                vec![1, 2, 0],
                vec![2, 0, 1],
                vec![2, 1, 0],
            ]
        );
    }

    #[test]
    fn partial_arrangements_enumerate_in_lexicographic_order() {
        assert_eq!(arrangements(4, 2), 12);
        let all: Vec<Vec<usize>> = (0..12).map(|r| nth_arrangement(4, 2, r)).collect();
        assert_eq!(all[0], vec![0, 1]);
        assert_eq!(all[2], vec![0, 3]);
        assert_eq!(all[3], vec![1, 0]);
        assert_eq!(all[11], vec![3, 2]);
    }

    #[test]
    fn rotated_labels_score_perfectly() {
        let truth = [0, 1, 2, 0, 1, 2];
        let pred = [1, 2, 0, 1, 2, 0];
        let score = best_permutation(&truth, &pred, 3).unwrap();
        assert_eq!(score.accuracy, 1.0);
        // 0 -> 2, 1 -> 0, 2 -> 1
        assert_eq!(score.permutation, vec![2, 0, 1]);
        assert_eq!(score.remapped, truth.to_vec());
    }

    #[test]
    fn single_cluster_scores_majority_fraction() {
        let score = best_permutation(&[0, 0, 1, 1], &[0, 0, 0, 0], 1).unwrap();
        assert_eq!(score.accuracy, 0.5);
        // tie between 0 -> 0 and 0 -> 1 keeps the earlier
        assert_eq!(score.permutation, vec![0]);

        let score = best_permutation(&[0, 0, 0, 1, 1, 1, 1], &[0; 7], 1).unwrap();
        assert!((score.accuracy - 4.0 / 7.0).abs() < 1e-12);
        assert_eq!(score.permutation, vec![1]);
    }

    #[test]
    fn ties_keep_lowest_rank() {
        // every relabeling of two clusters gets exactly one of two samples right
        let score = best_permutation(&[0, 1], &[0, 0], 2).unwrap();
        assert_eq!(score.accuracy, 0.5);
        assert_eq!(score.permutation, vec![0, 1]);
    }

    #[test]
    fn more_clusters_than_truth_labels() {
        let truth = [0, 0, 0, 0];
        let pred = [2, 2, 1, 0];
        let score = best_permutation(&truth, &pred, 3).unwrap();
        assert_eq!(score.accuracy, 0.5);
        assert_eq!(score.permutation, vec![1, 2, 0]);
        assert_eq!(score.remapped, vec![0, 0, 2, 1]);
    }

    #[test]
    fn sparse_truth_ids_keep_their_values() {
        let score = best_permutation(&[0, 0, 100, 100], &[1, 1, 0, 0], 2).unwrap();
        assert_eq!(score.accuracy, 1.0);
        assert_eq!(score.permutation, vec![100, 0]);
        assert_eq!(score.remapped, vec![0, 0, 100, 100]);

        // unmatched cluster gets an id no truth label uses
        let score = best_permutation(&[7, 7, 7], &[1, 1, 0], 2).unwrap();
        assert_eq!(score.permutation, vec![8, 7]);
    }

    #[test]
    fn single_cluster_against_many_labels_searches_only_the_targets() {
        let truth: Vec<usize> = (0..10).collect();
        assert_eq!(arrangements(10, 1), 10);
        let score = best_permutation(&truth, &[0; 10], 1).unwrap();
        assert!((score.accuracy - 0.1).abs() < 1e-12);
        assert_eq!(score.permutation, vec![0]);
    }

    #[test]
    fn input_errors() {
        assert!(matches!(best_permutation(&[], &[], 1), Err(Error::EmptyInput)));
        assert!(matches!(
            best_permutation(&[0, 1], &[0], 1),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(matches!(
            best_permutation(&[0, 1], &[0, 2], 2),
            Err(Error::LabelOutOfRange { label: 2, bound: 2 })
        ));
        let truth: Vec<usize> = (0..11).collect();
        assert!(matches!(
            best_permutation(&truth, &[0; 11], 1),
            Err(Error::PermutationSearchTooLarge { labels: 11, max: 10 })
        ));
    }
}
