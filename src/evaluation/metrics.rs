//! Reductions over `(margin, label, weight)` triples.
//!
//! Margins already include offsets and default scores. Each function returns
//! `None` when the metric is undefined for its input (no examples, one class).

use crate::function::Loss;

/// Weighted ROC AUC; ties count half.
pub(crate) fn auc(margins: &[f64], labels: &[f64], weights: &[f64]) -> Option<f64> {
    let n = margins.len();
    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| margins[a].total_cmp(&margins[b]));

    let (sum_pos, sum_neg) = labels
        .iter()
        .zip(weights)
        .fold((0.0f64, 0.0f64), |(sp, sn), (&l, &w)| {
            if l > 0.5 {
                (sp + w, sn)
            } else {
                (sp, sn + w)
            }
        });
    if sum_pos <= 0.0 || sum_neg <= 0.0 {
        return None;
    }

    let mut weighted_concordant = 0.0f64;
    let mut cumulative_neg_weight = 0.0f64;
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && margins[indices[j]] == margins[indices[i]] {
            j += 1;
        }

        let (mut group_pos, mut group_neg) = (0.0f64, 0.0f64);
        for &idx in &indices[i..j] {
            if labels[idx] > 0.5 {
                group_pos += weights[idx];
            } else {
                group_neg += weights[idx];
            }
        }
        weighted_concordant += group_pos * (cumulative_neg_weight + 0.5 * group_neg);
        cumulative_neg_weight += group_neg;
        i = j;
    }

    Some(weighted_concordant / (sum_pos * sum_neg))
}

/// `sqrt(sum w (m - y)^2 / sum w)`.
pub(crate) fn rmse(margins: &[f64], labels: &[f64], weights: &[f64]) -> Option<f64> {
    let (sum_sq, sum_w) = margins
        .iter()
        .zip(labels)
        .zip(weights)
        .fold((0.0, 0.0), |(sq, sw), ((&m, &y), &w)| (sq + w * (m - y) * (m - y), sw + w));
    (sum_w > 0.0).then(|| (sum_sq / sum_w).sqrt())
}

/// Weighted sum of a pointwise loss.
pub(crate) fn loss_sum(loss: Loss, margins: &[f64], labels: &[f64], weights: &[f64]) -> f64 {
    margins
        .iter()
        .zip(labels)
        .zip(weights)
        .map(|((&m, &y), &w)| if w == 0.0 { 0.0 } else { w * loss.loss(m, y) })
        .sum()
}

/// Fraction of positives among the `k` highest margins (`hits / k`).
pub(crate) fn precision_at_k(k: usize, margins: &[f64], labels: &[f64]) -> Option<f64> {
    if margins.is_empty() || k == 0 {
        return None;
    }
    let mut indices: Vec<usize> = (0..margins.len()).collect();
    indices.sort_by(|&a, &b| margins[b].total_cmp(&margins[a]));
    let hits = indices.iter().take(k).filter(|&&i| labels[i] > 0.5).count();
    Some(hits as f64 / k as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    #[rstest]
    #[case::one_inversion(&[0.1, 0.4, 0.35, 0.8], &[0.0, 0.0, 1.0, 1.0], 0.75)]
    #[case::separable(&[-1.0, -0.5, 0.5, 1.0], &[0.0, 0.0, 1.0, 1.0], 1.0)]
    #[case::all_tied(&[0.0, 0.0, 0.0, 0.0], &[0.0, 1.0, 0.0, 1.0], 0.5)]
    fn auc_values(#[case] margins: &[f64], #[case] labels: &[f64], #[case] expected: f64) {
        let weights = vec![1.0; margins.len()];
        assert_abs_diff_eq!(auc(margins, labels, &weights).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn auc_undefined_for_one_class() {
        assert!(auc(&[0.1, 0.2], &[1.0, 1.0], &[1.0, 1.0]).is_none());
    }

    #[test]
    fn weights_count_as_repeats() {
        let weighted = auc(&[0.1, 0.4, 0.35, 0.8], &[0.0, 0.0, 1.0, 1.0], &[2.0, 1.0, 1.0, 1.0]).unwrap();
        let repeated = auc(
            &[0.1, 0.1, 0.4, 0.35, 0.8],
            &[0.0, 0.0, 0.0, 1.0, 1.0],
            &[1.0; 5],
        )
        .unwrap();
        assert_abs_diff_eq!(weighted, repeated, epsilon = 1e-12);
    }

    #[test]
    fn rmse_known_value() {
        assert_abs_diff_eq!(rmse(&[1.0, 2.0], &[0.0, 0.0], &[1.0, 1.0]).unwrap(), 2.5f64.sqrt());
        assert!(rmse(&[], &[], &[]).is_none());
    }

    #[test]
    fn squared_loss_sum() {
        assert_abs_diff_eq!(loss_sum(Loss::Squared, &[1.0, 2.0], &[0.0, 0.0], &[1.0, 2.0]), 4.5);
    }

    #[test]
    fn precision_counts_top_k() {
        let margins = [0.9, 0.1, 0.8, 0.3];
        let labels = [1.0, 1.0, 0.0, 0.0];
        assert_abs_diff_eq!(precision_at_k(2, &margins, &labels).unwrap(), 0.5);
        assert_abs_diff_eq!(precision_at_k(1, &margins, &labels).unwrap(), 1.0);
        // Fewer examples than k still divides by k.
        assert_abs_diff_eq!(precision_at_k(8, &margins, &labels).unwrap(), 0.25);
    }
}
