//! Rank-based Inverse Normal Transformation (INT).
//!
//! Each feature's values are ranked across the individuals that observe it
//! (average-rank tie handling), mapped to percentiles `(rank - 0.5) / n`, and
//! pushed through the standard-normal quantile function. Missing entries stay
//! missing and a feature observed fewer than twice transforms to all-missing.

use crate::select::FeatureMatrix;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, Normal};
use std::cmp::Ordering;
use std::collections::BTreeMap;

static STANDARD_NORMAL: Lazy<Normal> =
    Lazy::new(|| Normal::new(0.0, 1.0).expect("standard normal parameters are valid"));

/// Minimum observed values for the transform to be defined.
pub const MIN_OBSERVED: usize = 2;

/// 1-based ranks with average-rank tie handling: elements sharing a value
/// receive the mean of the ranks they jointly occupy.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // Ranks i+1 ..= j+1 collapse to their mean.
        let avg = (i + j + 2) as f64 / 2.0;
        for k in i..=j {
            ranks[order[k]] = avg;
        }
        i = j + 1;
    }
    ranks
}

/// Transform one feature's values across individuals.
///
/// The output has exactly the input's length and missing positions; with
/// fewer than [`MIN_OBSERVED`] defined values the whole output is missing.
pub fn inverse_normal_transform(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let observed: Vec<f64> = values.iter().filter_map(|v| *v).collect();
    let n = observed.len();
    if n < MIN_OBSERVED {
        return vec![None; values.len()];
    }

    let ranks = average_ranks(&observed);
    let mut transformed = ranks
        .into_iter()
        .map(|rank| STANDARD_NORMAL.inverse_cdf((rank - 0.5) / n as f64))
        .collect::<Vec<f64>>()
        .into_iter();

    values
        .iter()
        .map(|value| value.map(|_| transformed.next().unwrap_or(f64::NAN)))
        .collect()
}

/// Apply the INT to every feature row of a matrix. Rows are independent, so
/// the transform fans out read-only across them and reassembles in key order.
pub fn transform_matrix(matrix: &FeatureMatrix) -> FeatureMatrix {
    let rows: BTreeMap<String, Vec<Option<f64>>> = matrix
        .rows
        .par_iter()
        .map(|(feature_id, values)| (feature_id.clone(), inverse_normal_transform(values)))
        .collect::<Vec<_>>()
        .into_iter()
        .collect();
    FeatureMatrix {
        individuals: matrix.individuals.clone(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rank_order(values: &[f64]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap());
        order
    }

    #[test]
    fn test_average_ranks_with_ties() {
        assert_eq!(average_ranks(&[0.1, 0.3, 0.2]), vec![1.0, 3.0, 2.0]);
        // Two equal values occupy ranks 2 and 3: both get 2.5.
        assert_eq!(average_ranks(&[0.1, 0.2, 0.2, 0.4]), vec![1.0, 2.5, 2.5, 4.0]);
        assert_eq!(average_ranks(&[0.5, 0.5]), vec![1.5, 1.5]);
    }

    #[test]
    fn test_transform_preserves_rank_order() {
        let input = vec![Some(0.4), Some(0.1), Some(0.9), Some(0.2), Some(0.6)];
        let output = inverse_normal_transform(&input);
        let raw: Vec<f64> = input.iter().map(|v| v.unwrap()).collect();
        let transformed: Vec<f64> = output.iter().map(|v| v.unwrap()).collect();
        assert_eq!(rank_order(&raw), rank_order(&transformed));
        // Distinct inputs stay distinct.
        let mut sorted = transformed.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        sorted.dedup();
        assert_eq!(sorted.len(), transformed.len());
    }

    #[test]
    fn test_equal_inputs_get_equal_outputs() {
        let output = inverse_normal_transform(&[Some(0.3), Some(0.3), Some(0.7)]);
        assert_eq!(output[0], output[1]);
        assert!(output[2].unwrap() > output[0].unwrap());
    }

    #[test]
    fn test_missing_positions_preserved() {
        let input = vec![Some(0.4), None, Some(0.1), None, Some(0.9)];
        let output = inverse_normal_transform(&input);
        assert_eq!(output.len(), input.len());
        assert!(output[1].is_none());
        assert!(output[3].is_none());
        assert!(output[0].is_some());
    }

    #[test]
    fn test_too_few_observations_is_all_missing() {
        assert_eq!(
            inverse_normal_transform(&[Some(0.4), None, None]),
            vec![None, None, None]
        );
        assert_eq!(inverse_normal_transform(&[None, None]), vec![None, None]);
    }

    #[test]
    fn test_known_quantiles_for_n_two() {
        // n = 2: percentiles 0.25 and 0.75, so the transformed values are
        // the symmetric standard-normal quartiles.
        let output = inverse_normal_transform(&[Some(1.0), Some(2.0)]);
        let lo = output[0].unwrap();
        let hi = output[1].unwrap();
        assert!((lo + 0.674489750196).abs() < 1e-9);
        assert!((hi - 0.674489750196).abs() < 1e-9);
    }

    #[test]
    fn test_matrix_transform_is_feature_wise() {
        let mut matrix = FeatureMatrix::default();
        matrix.individuals = vec!["I1".into(), "I2".into(), "I3".into()];
        matrix
            .rows
            .insert("APP__Bcell".into(), vec![Some(0.1), Some(0.5), Some(0.3)]);
        matrix
            .rows
            .insert("GRIA2__Tcell".into(), vec![Some(0.9), None, None]);
        let transformed = transform_matrix(&matrix);
        assert_eq!(transformed.individuals, matrix.individuals);
        // Fully observed row transforms; under-observed row goes all-missing.
        assert!(transformed.rows["APP__Bcell"].iter().all(|v| v.is_some()));
        assert!(transformed.rows["GRIA2__Tcell"].iter().all(|v| v.is_none()));
    }
}
