//! External clustering agreement scores. Labels are compared as partitions, so the actual
//! label values don't matter, only which samples share them.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};

/// Remaps arbitrary labels to `0..num_classes`, in order of first appearance.
fn compact_labels(labels: &[usize]) -> (Vec<usize>, usize) {
    let mut mapping = BTreeMap::new();
    let compacted = labels
        .iter()
        .map(|label| {
            let next = mapping.len();
            *mapping.entry(*label).or_insert(next)
        })
        .collect();
    (compacted, mapping.len())
}

/// Counts of samples for each (true class, predicted cluster) pair.
pub fn contingency_matrix(labels_true: &[usize], labels_pred: &[usize]) -> Result<Vec<Vec<usize>>> {
    if labels_true.len() != labels_pred.len() {
        return Err(anyhow!(
            "labels_true and labels_pred must have the same length, got {} and {}",
            labels_true.len(),
            labels_pred.len()
        ));
    }

    let (classes, num_classes) = compact_labels(labels_true);
    let (clusters, num_clusters) = compact_labels(labels_pred);
    let mut contingency = vec![vec![0; num_clusters]; num_classes];
    for (class, cluster) in classes.iter().zip(clusters.iter()) {
        contingency[*class][*cluster] += 1;
    }
    Ok(contingency)
}

/// Shannon entropy of a labeling, natural log.
pub fn entropy(labels: &[usize]) -> f64 {
    if labels.is_empty() {
        return 1.0;
    }
    let mut counts = BTreeMap::new();
    for label in labels {
        *counts.entry(*label).or_insert(0usize) += 1;
    }
    if counts.len() == 1 {
        return 0.0;
    }
    let total = labels.len() as f64;
    -counts
        .values()
        .map(|&count| {
            let p = count as f64 / total;
            p * p.ln()
        })
        .sum::<f64>()
}

pub fn mutual_info_score(labels_true: &[usize], labels_pred: &[usize]) -> Result<f64> {
    let contingency = contingency_matrix(labels_true, labels_pred)?;
    let total = labels_true.len() as f64;
    let row_sums: Vec<usize> = contingency.iter().map(|row| row.iter().sum()).collect();
    let mut col_sums = vec![0usize; contingency.first().map_or(0, |row| row.len())];
    for row in contingency.iter() {
        for (j, count) in row.iter().enumerate() {
            col_sums[j] += count;
        }
    }

    let mut mi = 0.0;
    for (i, row) in contingency.iter().enumerate() {
        for (j, &count) in row.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let n_ij = count as f64;
            mi += n_ij / total * (total * n_ij / (row_sums[i] as f64 * col_sums[j] as f64)).ln();
        }
    }
    // Rounding can push a zero score slightly negative.
    Ok(mi.max(0.0))
}

/// Returns (homogeneity, completeness, v_measure) with beta = 1.
pub fn homogeneity_completeness_v_measure(
    labels_true: &[usize],
    labels_pred: &[usize],
) -> Result<(f64, f64, f64)> {
    if labels_true.len() != labels_pred.len() {
        return Err(anyhow!(
            "labels_true and labels_pred must have the same length, got {} and {}",
            labels_true.len(),
            labels_pred.len()
        ));
    }
    if labels_true.is_empty() {
        return Ok((1.0, 1.0, 1.0));
    }

    let entropy_classes = entropy(labels_true);
    let entropy_clusters = entropy(labels_pred);
    let mi = mutual_info_score(labels_true, labels_pred)?;

    let homogeneity = if entropy_classes > 0.0 {
        mi / entropy_classes
    } else {
        1.0
    };
    let completeness = if entropy_clusters > 0.0 {
        mi / entropy_clusters
    } else {
        1.0
    };
    let v_measure = if homogeneity + completeness == 0.0 {
        0.0
    } else {
        2.0 * homogeneity * completeness / (homogeneity + completeness)
    };
    Ok((homogeneity, completeness, v_measure))
}

pub fn v_measure_score(labels_true: &[usize], labels_pred: &[usize]) -> Result<f64> {
    Ok(homogeneity_completeness_v_measure(labels_true, labels_pred)?.2)
}
