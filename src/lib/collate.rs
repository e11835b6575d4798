//! Population collation: stacking every individual's phase-4 matrix into one
//! long-format table keyed by (Site, Gene, CellType) with one column per
//! individual.
//!
//! Individuals are merged one file at a time into a single keyed map, a
//! streaming outer join. A key present in any one individual's file is never
//! dropped; an individual lacking a key contributes a missing value. Memory
//! holds one copy of the accumulating matrix plus one individual's melted
//! records, never every individual's frame at once.

use crate::core::errors::{EdquantError, Result};
use crate::core::fs::{find_matching_files, FilePattern};
use crate::core::io::{format_optional_f64, get_raw_writer, get_reader, parse_optional_f64};
use crate::matrix::{read_phase4_long, LongRecord};
use crate::site::Site;
use log::{info, warn};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Composite key of one population-matrix row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FeatureKey {
    pub site: Site,
    pub gene: String,
    pub cell_type: String,
}

/// The population matrix: (Site, Gene, CellType) rows × individual columns.
///
/// Rows are held in a `BTreeMap` so iteration order, and therefore every
/// derived output, is deterministic.
#[derive(Debug, Default)]
pub struct PopulationMatrix {
    pub individuals: Vec<String>,
    pub rows: BTreeMap<FeatureKey, Vec<Option<f64>>>,
}

impl PopulationMatrix {
    /// Merge one individual's melted records into the matrix.
    pub fn insert_individual(&mut self, individual_id: &str, records: Vec<LongRecord>) {
        let column = self.individuals.len();
        self.individuals.push(individual_id.to_string());
        for record in records {
            let key = FeatureKey {
                site: record.site,
                gene: record.gene,
                cell_type: record.cell_type,
            };
            let row = self.rows.entry(key).or_default();
            if row.len() < column {
                row.resize(column, None);
            }
            if row.len() == column {
                row.push(record.value);
            } else if let Some(slot) = row.get_mut(column) {
                // Duplicate key within one file: keep the first defined value.
                if slot.is_none() {
                    *slot = record.value;
                }
            }
        }
    }

    /// Pad every row to the full individual count. Call after the last
    /// `insert_individual`.
    pub fn finalize(&mut self) {
        let width = self.individuals.len();
        for row in self.rows.values_mut() {
            row.resize(width, None);
        }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Serialize as TSV: `SiteID, Gene, CellType`, then one column per
    /// individual, `NA` for missing.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer = get_raw_writer(path)?;
        write!(writer, "SiteID\tGene\tCellType")?;
        for individual in &self.individuals {
            write!(writer, "\t{}", individual)?;
        }
        writeln!(writer)?;
        for (key, values) in &self.rows {
            write!(writer, "{}\t{}\t{}", key.site, key.gene, key.cell_type)?;
            for value in values {
                write!(writer, "\t{}", format_optional_f64(*value))?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Load a previously written population matrix.
    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = get_reader(path, true, true)?;
        let headers = reader.headers()?.clone();
        if headers.len() < 4
            || headers.get(0) != Some("SiteID")
            || headers.get(1) != Some("Gene")
            || headers.get(2) != Some("CellType")
        {
            return Err(EdquantError::Parse(format!(
                "Unexpected population matrix header in {}",
                path.display()
            )));
        }
        let individuals: Vec<String> = headers.iter().skip(3).map(|h| h.to_string()).collect();
        let mut rows = BTreeMap::new();
        for record in reader.records() {
            let record = record?;
            let site: Site = record.get(0).unwrap_or("").parse()?;
            let key = FeatureKey {
                site,
                gene: record.get(1).unwrap_or("").to_string(),
                cell_type: record.get(2).unwrap_or("").to_string(),
            };
            let values: Vec<Option<f64>> = (3..3 + individuals.len())
                .map(|idx| record.get(idx).and_then(parse_optional_f64))
                .collect();
            rows.insert(key, values);
        }
        if rows.is_empty() {
            return Err(EdquantError::EmptyData(format!(
                "No rows loaded from population matrix {}",
                path.display()
            )));
        }
        Ok(PopulationMatrix { individuals, rows })
    }
}

/// Collate every per-individual phase-4 matrix in `input_dir` matching
/// `pattern` into one population matrix.
///
/// A malformed or unreadable file is skipped with a warning; only zero
/// successfully loaded files is fatal.
pub fn collate_directory(input_dir: &Path, pattern: &FilePattern) -> Result<PopulationMatrix> {
    let files = find_matching_files(input_dir, pattern)?;
    if files.is_empty() {
        return Err(EdquantError::FileNotFound(format!(
            "No files found matching pattern in {}",
            input_dir.display()
        )));
    }
    info!("Found {} individual files for collation", files.len());

    let mut matrix = PopulationMatrix::default();
    let mut loaded = 0usize;
    for (index, path) in files.iter().enumerate() {
        if index == 0 || index + 1 == files.len() || (index + 1) % 500 == 0 {
            info!(
                "Processing file {}/{}: {}",
                index + 1,
                files.len(),
                path.display()
            );
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let individual_id = match pattern.stem(name) {
            Some(stem) => stem,
            None => continue,
        };
        match read_phase4_long(path) {
            Ok(records) => {
                matrix.insert_individual(&individual_id, records);
                loaded += 1;
            }
            Err(err) => {
                warn!("Skipping file {} due to error: {}", path.display(), err);
            }
        }
    }
    if loaded == 0 {
        return Err(EdquantError::EmptyData(
            "No individual matrices successfully loaded".to_string(),
        ));
    }
    matrix.finalize();
    info!(
        "Collation complete: {} rows x {} individuals",
        matrix.n_rows(),
        matrix.individuals.len()
    );
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(site: &str, gene: &str, cell_type: &str, value: Option<f64>) -> LongRecord {
        LongRecord {
            site: site.parse().unwrap(),
            gene: gene.to_string(),
            cell_type: cell_type.to_string(),
            value,
        }
    }

    #[test]
    fn test_outer_alignment_keeps_all_keys() {
        let mut matrix = PopulationMatrix::default();
        matrix.insert_individual(
            "IND_A",
            vec![
                record("1:1000:A>G", "APP", "Bcell", Some(0.5)),
                record("1:2000:T>C", "GRIA2", "Tcell", Some(0.2)),
            ],
        );
        matrix.insert_individual(
            "IND_B",
            vec![record("1:1000:A>G", "APP", "Bcell", Some(0.3))],
        );
        matrix.finalize();

        assert_eq!(matrix.individuals, vec!["IND_A", "IND_B"]);
        assert_eq!(matrix.n_rows(), 2);
        let key = FeatureKey {
            site: "1:2000:T>C".parse().unwrap(),
            gene: "GRIA2".to_string(),
            cell_type: "Tcell".to_string(),
        };
        // IND_B lacks the key: outer alignment pads with missing.
        assert_eq!(matrix.rows[&key], vec![Some(0.2), None]);
    }

    #[test]
    fn test_key_first_seen_in_later_individual() {
        let mut matrix = PopulationMatrix::default();
        matrix.insert_individual("IND_A", vec![record("1:1000:A>G", "APP", "Bcell", Some(0.5))]);
        matrix.insert_individual(
            "IND_B",
            vec![record("2:300:T>C", "NEW", "Tcell", Some(0.9))],
        );
        matrix.finalize();

        let key = FeatureKey {
            site: "2:300:T>C".parse().unwrap(),
            gene: "NEW".to_string(),
            cell_type: "Tcell".to_string(),
        };
        // The earlier individual is back-filled with missing.
        assert_eq!(matrix.rows[&key], vec![None, Some(0.9)]);
    }

    #[test]
    fn test_write_read_round_trip() {
        let mut matrix = PopulationMatrix::default();
        matrix.insert_individual("IND_A", vec![record("1:1000:A>G", "APP", "Bcell", Some(0.5))]);
        matrix.insert_individual("IND_B", vec![record("1:1000:A>G", "APP", "Bcell", None)]);
        matrix.finalize();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("population_matrix.tsv");
        matrix.write(&path).unwrap();

        let loaded = PopulationMatrix::read(&path).unwrap();
        assert_eq!(loaded.individuals, matrix.individuals);
        assert_eq!(loaded.rows, matrix.rows);
    }

    #[test]
    fn test_collate_skips_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = "\
SiteID\tChr\tPos\tRef\tAlt\tGlobalFilterStatus\tVCF_Status\tMinDistToSplice\tPhase3_FunctionalRegion\tPhase3_Gene\tPhase3_REDIPortal_Status\tBcell_ER\tBcell_TR\tBcell_QC
1:1000:A>G\t1\t1000\tA\tG\tPASS\tSomaticEdit\t50\tUTR3\tAPP\tKnown\t0.5\t20\tPASS
";
        std::fs::write(dir.path().join("IND_A_final_editing_matrix_p4.tsv"), good).unwrap();
        std::fs::write(
            dir.path().join("IND_B_final_editing_matrix_p4.tsv"),
            "not a matrix at all",
        )
        .unwrap();

        let pattern = FilePattern::new("*_final_editing_matrix_p4.tsv").unwrap();
        let matrix = collate_directory(dir.path(), &pattern).unwrap();
        // IND_B is skipped, IND_A survives.
        assert_eq!(matrix.individuals, vec!["IND_A"]);
        assert_eq!(matrix.n_rows(), 1);
    }

    #[test]
    fn test_collate_zero_loaded_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("IND_B_final_editing_matrix_p4.tsv"),
            "garbage",
        )
        .unwrap();
        let pattern = FilePattern::new("*_final_editing_matrix_p4.tsv").unwrap();
        assert!(collate_directory(dir.path(), &pattern).is_err());
    }
}
