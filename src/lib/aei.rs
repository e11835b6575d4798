//! Alu Editing Index (AEI) collation: gather per-individual, per-cell-type
//! AEI outputs into one covariate matrix (individual rows × `AEI_<CellType>`
//! columns).

use crate::core::errors::{EdquantError, Result};
use crate::core::fs::{find_matching_files, FilePattern};
use crate::core::io::{format_optional_f64, get_raw_writer, get_reader};
use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;

/// One extracted AEI observation.
#[derive(Debug, Clone, PartialEq)]
pub struct AeiRecord {
    pub individual_id: String,
    pub cell_type: String,
    pub aei: f64,
}

/// Parse one AEI output file: headerless two-column TSV
/// (`Substitution\tIndex`), returning the index of the requested
/// substitution label.
pub fn read_aei_value(path: &Path, substitution: &str) -> Result<f64> {
    let mut reader = get_reader(path, false, false)?;
    for record in reader.records() {
        let record = record?;
        if record.get(0) == Some(substitution) {
            return record
                .get(1)
                .and_then(|s| s.trim().parse::<f64>().ok())
                .ok_or_else(|| {
                    EdquantError::Parse(format!(
                        "Non-numeric index for substitution {} in {}",
                        substitution,
                        path.display()
                    ))
                });
        }
    }
    Err(EdquantError::Parse(format!(
        "Substitution {} not found in {}",
        substitution,
        path.display()
    )))
}

/// Split an AEI filename of the form `IID_CT_...` into individual and cell
/// type.
pub fn parse_aei_filename(name: &str) -> Option<(String, String)> {
    let mut parts = name.split('_');
    let individual = parts.next()?;
    let cell_type = parts.next()?;
    if individual.is_empty() || cell_type.is_empty() {
        return None;
    }
    Some((individual.to_string(), cell_type.to_string()))
}

/// The pivoted AEI covariate matrix.
#[derive(Debug, Default)]
pub struct AeiMatrix {
    /// `individual -> (cell type -> AEI)`.
    rows: BTreeMap<String, BTreeMap<String, f64>>,
    cell_types: BTreeSet<String>,
}

impl AeiMatrix {
    pub fn insert(&mut self, record: AeiRecord) {
        self.cell_types.insert(record.cell_type.clone());
        self.rows
            .entry(record.individual_id)
            .or_default()
            .insert(record.cell_type, record.aei);
    }

    pub fn n_individuals(&self) -> usize {
        self.rows.len()
    }

    /// Write as a covariate table: `Individual_ID` index column plus one
    /// `AEI_<CellType>` column per cell type, `NA` where an individual lacks
    /// a cell type.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer = get_raw_writer(path)?;
        write!(writer, "Individual_ID")?;
        for cell_type in &self.cell_types {
            write!(writer, "\tAEI_{}", cell_type)?;
        }
        writeln!(writer)?;
        for (individual, values) in &self.rows {
            write!(writer, "{}", individual)?;
            for cell_type in &self.cell_types {
                write!(
                    writer,
                    "\t{}",
                    format_optional_f64(values.get(cell_type).copied())
                )?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Collate every AEI file in `input_dir` matching `pattern`. Files that fail
/// to parse are skipped with a warning; zero valid files is fatal.
pub fn collate_aei_directory(
    input_dir: &Path,
    pattern: &FilePattern,
    substitution: &str,
) -> Result<AeiMatrix> {
    let files = find_matching_files(input_dir, pattern)?;
    if files.is_empty() {
        return Err(EdquantError::FileNotFound(format!(
            "No AEI files found matching pattern in {}",
            input_dir.display()
        )));
    }
    info!("Found {} AEI files for collation", files.len());

    let mut matrix = AeiMatrix::default();
    let mut loaded = 0usize;
    for path in &files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let (individual_id, cell_type) = match parse_aei_filename(name) {
            Some(parsed) => parsed,
            None => {
                warn!("Cannot parse individual/cell type from {}; skipping", name);
                continue;
            }
        };
        match read_aei_value(path, substitution) {
            Ok(aei) => {
                matrix.insert(AeiRecord {
                    individual_id,
                    cell_type,
                    aei,
                });
                loaded += 1;
            }
            Err(err) => warn!("Skipping AEI file {}: {}", name, err),
        }
    }
    if loaded == 0 {
        return Err(EdquantError::EmptyData(
            "No valid AEI data processed".to_string(),
        ));
    }
    info!(
        "AEI covariate matrix: {} individuals x {} cell types",
        matrix.n_individuals(),
        matrix.cell_types.len()
    );
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aei_filename() {
        assert_eq!(
            parse_aei_filename("IND0001_Bcell_ALU_ONLY.aei.tsv"),
            Some(("IND0001".to_string(), "Bcell".to_string()))
        );
        assert_eq!(parse_aei_filename("justonefield"), None);
    }

    #[test]
    fn test_read_aei_value_picks_substitution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("IND1_Bcell_ALU_ONLY.aei.tsv");
        std::fs::write(&path, "A-C\t0.001\nG-A\t0.023\nT-C\t0.002\n").unwrap();
        assert!((read_aei_value(&path, "G-A").unwrap() - 0.023).abs() < 1e-12);
        assert!(read_aei_value(&path, "C-T").is_err());
    }

    #[test]
    fn test_collate_pivots_to_covariate_layout() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("IND1_Bcell_ALU_ONLY.aei.tsv"),
            "G-A\t0.02\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("IND1_Tcell_ALU_ONLY.aei.tsv"),
            "G-A\t0.03\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("IND2_Bcell_ALU_ONLY.aei.tsv"),
            "G-A\t0.04\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("IND3_Bcell_ALU_ONLY.aei.tsv"), "bogus").unwrap();

        let pattern = FilePattern::new("*.aei.tsv").unwrap();
        let matrix = collate_aei_directory(dir.path(), &pattern, "G-A").unwrap();
        assert_eq!(matrix.n_individuals(), 2);

        let out = dir.path().join("aei_covariates.tsv");
        matrix.write(&out).unwrap();
        let written = std::fs::read_to_string(&out).unwrap();
        let mut lines = written.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Individual_ID\tAEI_Bcell\tAEI_Tcell"
        );
        assert_eq!(lines.next().unwrap(), "IND1\t0.02\t0.03");
        assert_eq!(lines.next().unwrap(), "IND2\t0.04\tNA");
    }
}
