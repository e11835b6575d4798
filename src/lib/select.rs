//! Representative-site selection: reduce the population matrix to one site
//! per (Gene, CellType) feature: the site with the highest population median
//! raw editing ratio.

use crate::collate::PopulationMatrix;
use crate::core::errors::{EdquantError, Result};
use crate::core::io::{format_optional_f64, get_raw_writer, get_reader, parse_optional_f64};
use log::info;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Median of the defined values in a row, `None` when every value is missing.
pub fn row_median(values: &[Option<f64>]) -> Option<f64> {
    let mut observed: Vec<f64> = values.iter().filter_map(|v| *v).collect();
    if observed.is_empty() {
        return None;
    }
    observed.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = observed.len() / 2;
    if observed.len() % 2 == 1 {
        Some(observed[mid])
    } else {
        Some((observed[mid - 1] + observed[mid]) / 2.0)
    }
}

/// Count of defined values in a row.
pub fn observed_count(values: &[Option<f64>]) -> usize {
    values.iter().filter(|v| v.is_some()).count()
}

/// Drop rows observed in fewer than `min_samples` individuals. Runs before
/// selection when configured.
pub fn apply_sample_filter(matrix: &mut PopulationMatrix, min_samples: usize) {
    let before = matrix.n_rows();
    matrix
        .rows
        .retain(|_, values| observed_count(values) >= min_samples);
    info!(
        "Sample size filter (N >= {}): {} -> {} rows",
        min_samples,
        before,
        matrix.n_rows()
    );
}

/// The selected feature matrix: `Gene__CellType` rows × individual columns.
#[derive(Debug, Default)]
pub struct FeatureMatrix {
    pub individuals: Vec<String>,
    pub rows: BTreeMap<String, Vec<Option<f64>>>,
}

impl FeatureMatrix {
    /// Serialize as TSV with the given identifier header (`FeatureID` for
    /// selection output, `feature_id` for the association tool's phenotype).
    pub fn write(&self, path: &Path, id_header: &str) -> Result<()> {
        let mut writer = get_raw_writer(path)?;
        write!(writer, "{}", id_header)?;
        for individual in &self.individuals {
            write!(writer, "\t{}", individual)?;
        }
        writeln!(writer)?;
        for (feature_id, values) in &self.rows {
            write!(writer, "{}", feature_id)?;
            for value in values {
                write!(writer, "\t{}", format_optional_f64(*value))?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Load a feature matrix (selection output or any feature × individual
    /// TSV with an identifier first column).
    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = get_reader(path, true, true)?;
        let headers = reader.headers()?.clone();
        if headers.len() < 2 {
            return Err(EdquantError::Parse(format!(
                "Feature matrix {} needs an identifier column and at least one individual",
                path.display()
            )));
        }
        let individuals: Vec<String> = headers.iter().skip(1).map(|h| h.to_string()).collect();
        let mut rows = BTreeMap::new();
        for record in reader.records() {
            let record = record?;
            let feature_id = record.get(0).unwrap_or("").to_string();
            if feature_id.is_empty() {
                continue;
            }
            let values: Vec<Option<f64>> = (1..1 + individuals.len())
                .map(|idx| record.get(idx).and_then(parse_optional_f64))
                .collect();
            rows.insert(feature_id, values);
        }
        if rows.is_empty() {
            return Err(EdquantError::EmptyData(format!(
                "No rows loaded from feature matrix {}",
                path.display()
            )));
        }
        Ok(FeatureMatrix { individuals, rows })
    }
}

/// Select the representative site per (Gene, CellType).
///
/// Rows are visited in ascending (Site, Gene, CellType) key order; within a
/// group the strictly highest defined median wins and an exact tie keeps the
/// earlier row, so repeated runs over the same matrix are byte-identical.
/// Rows with no defined median never win; groups with none are omitted.
pub fn select_representatives(matrix: &PopulationMatrix) -> FeatureMatrix {
    let mut best: BTreeMap<String, (f64, &Vec<Option<f64>>)> = BTreeMap::new();
    for (key, values) in &matrix.rows {
        let median = match row_median(values) {
            Some(median) => median,
            None => continue,
        };
        let feature_id = format!("{}__{}", key.gene, key.cell_type);
        let replace = match best.get(&feature_id) {
            Some((current, _)) => median > *current,
            None => true,
        };
        if replace {
            best.insert(feature_id, (median, values));
        }
    }
    let rows = best
        .into_iter()
        .map(|(feature_id, (_, values))| (feature_id, values.clone()))
        .collect();
    FeatureMatrix {
        individuals: matrix.individuals.clone(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collate::FeatureKey;

    fn matrix_with(rows: Vec<(&str, &str, &str, Vec<Option<f64>>)>) -> PopulationMatrix {
        let mut matrix = PopulationMatrix {
            individuals: vec!["I1".into(), "I2".into(), "I3".into()],
            rows: BTreeMap::new(),
        };
        for (site, gene, cell_type, values) in rows {
            matrix.rows.insert(
                FeatureKey {
                    site: site.parse().unwrap(),
                    gene: gene.to_string(),
                    cell_type: cell_type.to_string(),
                },
                values,
            );
        }
        matrix
    }

    #[test]
    fn test_row_median() {
        assert_eq!(row_median(&[Some(0.1), Some(0.3), Some(0.2)]), Some(0.2));
        assert_eq!(row_median(&[Some(0.1), None, Some(0.3)]), Some(0.2));
        assert_eq!(row_median(&[None, None]), None);
        assert_eq!(row_median(&[Some(0.4)]), Some(0.4));
    }

    #[test]
    fn test_highest_median_wins() {
        // Three APP/Bcell sites with medians 0.1, 0.3, 0.2: the 0.3 site
        // becomes APP__Bcell.
        let matrix = matrix_with(vec![
            ("1:100:A>G", "APP", "Bcell", vec![Some(0.1), Some(0.1), Some(0.1)]),
            ("1:200:A>G", "APP", "Bcell", vec![Some(0.3), Some(0.3), Some(0.3)]),
            ("1:300:A>G", "APP", "Bcell", vec![Some(0.2), Some(0.2), Some(0.2)]),
        ]);
        let features = select_representatives(&matrix);
        assert_eq!(features.rows.len(), 1);
        assert_eq!(
            features.rows["APP__Bcell"],
            vec![Some(0.3), Some(0.3), Some(0.3)]
        );
    }

    #[test]
    fn test_tie_break_keeps_first_key_order() {
        let matrix = matrix_with(vec![
            ("1:200:A>G", "APP", "Bcell", vec![Some(0.3), None, None]),
            ("1:100:A>G", "APP", "Bcell", vec![None, Some(0.3), None]),
        ]);
        let features = select_representatives(&matrix);
        // 1:100 sorts before 1:200 and ties at median 0.3: the earlier row
        // in key order is kept.
        assert_eq!(
            features.rows["APP__Bcell"],
            vec![None, Some(0.3), None]
        );
    }

    #[test]
    fn test_all_missing_row_cannot_win() {
        let matrix = matrix_with(vec![
            ("1:100:A>G", "APP", "Bcell", vec![None, None, None]),
            ("1:200:A>G", "APP", "Bcell", vec![Some(0.05), None, None]),
        ]);
        let features = select_representatives(&matrix);
        assert_eq!(
            features.rows["APP__Bcell"],
            vec![Some(0.05), None, None]
        );
    }

    #[test]
    fn test_group_with_no_defined_median_is_omitted() {
        let matrix = matrix_with(vec![
            ("1:100:A>G", "APP", "Bcell", vec![None, None, None]),
            ("2:100:T>C", "GRIA2", "Tcell", vec![Some(0.2), None, None]),
        ]);
        let features = select_representatives(&matrix);
        assert!(!features.rows.contains_key("APP__Bcell"));
        assert!(features.rows.contains_key("GRIA2__Tcell"));
    }

    #[test]
    fn test_sample_filter_drops_sparse_rows() {
        let mut matrix = matrix_with(vec![
            ("1:100:A>G", "APP", "Bcell", vec![Some(0.1), Some(0.2), None]),
            ("1:200:A>G", "APP", "Bcell", vec![Some(0.4), None, None]),
        ]);
        apply_sample_filter(&mut matrix, 2);
        assert_eq!(matrix.n_rows(), 1);
        let features = select_representatives(&matrix);
        // The sparse higher-median row was removed before selection.
        assert_eq!(
            features.rows["APP__Bcell"],
            vec![Some(0.1), Some(0.2), None]
        );
    }

    #[test]
    fn test_selector_is_deterministic() {
        let matrix = matrix_with(vec![
            ("1:100:A>G", "APP", "Bcell", vec![Some(0.3), Some(0.1), None]),
            ("1:200:A>G", "APP", "Bcell", vec![Some(0.2), Some(0.2), Some(0.2)]),
            ("2:100:T>C", "GRIA2", "Tcell", vec![Some(0.5), None, None]),
        ]);
        let first = select_representatives(&matrix);
        let second = select_representatives(&matrix);
        assert_eq!(first.rows, second.rows);
        assert_eq!(first.individuals, second.individuals);
    }
}
