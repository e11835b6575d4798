//! Covariate assembly: load independently-sourced covariate tables, align
//! them to the phenotype's individual set under an explicit join mode, prune
//! uninformative columns, and emit the transposed matrix the association tool
//! expects (covariate rows × individual columns).

use crate::core::errors::{EdquantError, Result};
use crate::core::io::{get_raw_writer, get_reader, parse_optional_f64};
use itertools::Itertools;
use log::{info, warn};
use rustc_hash::FxHashMap;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

/// How covariate sources combine across individuals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    /// Only individuals present in every loaded source survive.
    Inner,
    /// Phenotype individuals present in at least one source survive; absent
    /// covariate values impute to 0.0 (neutral effect).
    Union,
}

impl FromStr for JoinMode {
    type Err = EdquantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "inner" => Ok(JoinMode::Inner),
            "union" => Ok(JoinMode::Union),
            other => Err(EdquantError::InvalidInput(format!(
                "Invalid join mode: {}. Valid modes: inner, union",
                other
            ))),
        }
    }
}

/// One loaded covariate source: individual rows × named numeric columns.
#[derive(Debug)]
pub struct CovariateTable {
    pub label: String,
    pub columns: Vec<String>,
    pub values: FxHashMap<String, Vec<Option<f64>>>,
}

impl CovariateTable {
    /// Load a TSV whose first column is the individual identifier and whose
    /// remaining columns are numeric covariates (`NA` tolerated).
    pub fn load(path: &Path, label: &str) -> Result<Self> {
        let mut reader = get_reader(path, true, true)?;
        let headers = reader.headers()?.clone();
        if headers.len() < 2 {
            return Err(EdquantError::Parse(format!(
                "Covariate table {} needs an identifier column and at least one covariate",
                path.display()
            )));
        }
        let columns: Vec<String> = headers.iter().skip(1).map(|h| h.to_string()).collect();
        let mut values: FxHashMap<String, Vec<Option<f64>>> = FxHashMap::default();
        for record in reader.records() {
            let record = record?;
            let individual = record.get(0).unwrap_or("").to_string();
            if individual.is_empty() {
                continue;
            }
            let row: Vec<Option<f64>> = (1..1 + columns.len())
                .map(|idx| record.get(idx).and_then(parse_optional_f64))
                .collect();
            values.insert(individual, row);
        }
        if values.is_empty() {
            return Err(EdquantError::EmptyData(format!(
                "No individuals loaded from covariate table {}",
                path.display()
            )));
        }
        info!(
            "Loaded covariate source '{}': {} individuals x {} covariates",
            label,
            values.len(),
            columns.len()
        );
        Ok(CovariateTable {
            label: label.to_string(),
            columns,
            values,
        })
    }
}

/// The merged covariate matrix, still individual-major until written.
#[derive(Debug, PartialEq)]
pub struct CovariateMatrix {
    pub individuals: Vec<String>,
    pub columns: Vec<String>,
    /// Row per individual, aligned to `columns`.
    pub values: Vec<Vec<f64>>,
}

/// Merge covariate sources restricted to the phenotype's individual set.
///
/// The phenotype's column order defines the output individual order. A
/// covariate column name already claimed by an earlier source is skipped with
/// a warning rather than silently duplicated.
pub fn merge_covariates(
    tables: &[CovariateTable],
    phenotype_individuals: &[String],
    mode: JoinMode,
) -> Result<CovariateMatrix> {
    if tables.is_empty() {
        return Err(EdquantError::EmptyData(
            "No covariate sources loaded".to_string(),
        ));
    }

    let individuals: Vec<String> = phenotype_individuals
        .iter()
        .filter(|id| match mode {
            JoinMode::Inner => tables.iter().all(|t| t.values.contains_key(*id)),
            JoinMode::Union => tables.iter().any(|t| t.values.contains_key(*id)),
        })
        .cloned()
        .collect();
    if individuals.is_empty() {
        return Err(EdquantError::EmptyData(format!(
            "No phenotype individuals survive the {:?} covariate join",
            mode
        )));
    }

    let mut columns: Vec<String> = Vec::new();
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); individuals.len()];
    for table in tables {
        for (col_idx, column) in table.columns.iter().enumerate() {
            if columns.contains(column) {
                warn!(
                    "Covariate column '{}' from source '{}' duplicates an earlier source; skipping",
                    column, table.label
                );
                continue;
            }
            columns.push(column.clone());
            for (row, individual) in values.iter_mut().zip(&individuals) {
                let value = table
                    .values
                    .get(individual)
                    .and_then(|r| r.get(col_idx).copied().flatten())
                    .unwrap_or(0.0);
                row.push(value);
            }
        }
    }

    let matrix = CovariateMatrix {
        individuals,
        columns,
        values,
    };
    Ok(prune_constant_columns(matrix))
}

/// Drop covariate columns with a single distinct value across the retained
/// individuals; a constant covariate carries no information.
fn prune_constant_columns(matrix: CovariateMatrix) -> CovariateMatrix {
    let keep: Vec<usize> = (0..matrix.columns.len())
        .filter(|&col| {
            !matrix
                .values
                .iter()
                .map(|row| row[col].to_bits())
                .all_equal()
        })
        .collect();
    if keep.len() < matrix.columns.len() {
        info!(
            "Dropped {} constant covariate columns",
            matrix.columns.len() - keep.len()
        );
    }
    CovariateMatrix {
        individuals: matrix.individuals,
        columns: keep.iter().map(|&c| matrix.columns[c].clone()).collect(),
        values: matrix
            .values
            .iter()
            .map(|row| keep.iter().map(|&c| row[c]).collect())
            .collect(),
    }
}

impl CovariateMatrix {
    /// Write in the association tool's layout: covariate rows × individual
    /// columns, identifier header `id`.
    pub fn write_transposed(&self, path: &Path) -> Result<()> {
        let mut writer = get_raw_writer(path)?;
        write!(writer, "id")?;
        for individual in &self.individuals {
            write!(writer, "\t{}", individual)?;
        }
        writeln!(writer)?;
        for (col_idx, column) in self.columns.iter().enumerate() {
            write!(writer, "{}", column)?;
            for row in &self.values {
                write!(writer, "\t{}", row[col_idx])?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(label: &str, columns: &[&str], rows: &[(&str, &[Option<f64>])]) -> CovariateTable {
        CovariateTable {
            label: label.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            values: rows
                .iter()
                .map(|(id, vals)| (id.to_string(), vals.to_vec()))
                .collect(),
        }
    }

    fn phenotype_ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_inner_join_requires_all_sources() {
        let aei = table(
            "aei",
            &["AEI_Bcell"],
            &[("I1", &[Some(0.2)]), ("I2", &[Some(0.4)])],
        );
        let pcs = table("pcs", &["PC1"], &[("I1", &[Some(1.0)])]);
        let merged = merge_covariates(
            &[aei, pcs],
            &phenotype_ids(&["I1", "I2", "I3"]),
            JoinMode::Inner,
        )
        .unwrap();
        assert_eq!(merged.individuals, vec!["I1"]);
    }

    #[test]
    fn test_union_join_imputes_zero() {
        let aei = table(
            "aei",
            &["AEI_Bcell"],
            &[("I1", &[Some(0.2)]), ("I2", &[Some(0.4)])],
        );
        let pcs = table("pcs", &["PC1"], &[("I1", &[Some(1.0)]), ("I2", &[Some(2.0)])]);
        let merged = merge_covariates(
            &[aei, pcs],
            &phenotype_ids(&["I1", "I2", "I3"]),
            JoinMode::Union,
        )
        .unwrap();
        assert_eq!(merged.individuals, vec!["I1", "I2"]);
        assert_eq!(merged.columns, vec!["AEI_Bcell", "PC1"]);
        assert_eq!(merged.values[0], vec![0.2, 1.0]);
    }

    #[test]
    fn test_union_fills_missing_source_with_zero() {
        let aei = table("aei", &["AEI_Bcell"], &[("I1", &[Some(0.2)])]);
        let pcs = table("pcs", &["PC1"], &[("I2", &[Some(2.0)])]);
        let merged = merge_covariates(
            &[aei, pcs],
            &phenotype_ids(&["I1", "I2"]),
            JoinMode::Union,
        )
        .unwrap();
        assert_eq!(merged.individuals, vec!["I1", "I2"]);
        // I2 has no AEI, I1 has no PC1: both impute 0.
        assert_eq!(merged.values[0], vec![0.2, 0.0]);
        assert_eq!(merged.values[1], vec![0.0, 2.0]);
    }

    #[test]
    fn test_constant_columns_dropped() {
        let src = table(
            "src",
            &["constant", "varying"],
            &[
                ("I1", &[Some(1.0), Some(0.1)]),
                ("I2", &[Some(1.0), Some(0.2)]),
            ],
        );
        let merged =
            merge_covariates(&[src], &phenotype_ids(&["I1", "I2"]), JoinMode::Inner).unwrap();
        assert_eq!(merged.columns, vec!["varying"]);
        assert_eq!(merged.values[0], vec![0.1]);
    }

    #[test]
    fn test_phenotype_order_defines_output_order() {
        let src = table(
            "src",
            &["PC1"],
            &[("I1", &[Some(1.0)]), ("I2", &[Some(2.0)]), ("I3", &[Some(3.0)])],
        );
        let merged = merge_covariates(
            &[src],
            &phenotype_ids(&["I3", "I1", "I2"]),
            JoinMode::Inner,
        )
        .unwrap();
        assert_eq!(merged.individuals, vec!["I3", "I1", "I2"]);
        assert_eq!(
            merged.values.iter().map(|r| r[0]).collect::<Vec<_>>(),
            vec![3.0, 1.0, 2.0]
        );
    }
}
