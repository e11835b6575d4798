//! Benjamini-Hochberg FDR correction and lead-variant selection over
//! association-test result files.

use crate::core::errors::{EdquantError, Result};
use crate::core::io::{get_line_reader, get_raw_writer};
use log::{info, warn};
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::io::{BufRead, Write};
use std::path::Path;

/// Column positions inside a result row. Fields are whitespace-separated;
/// `pvalue` of `None` means the last field of each row.
#[derive(Debug, Clone, Copy)]
pub struct ResultColumns {
    pub feature: usize,
    pub variant: usize,
    pub pvalue: Option<usize>,
}

impl Default for ResultColumns {
    fn default() -> Self {
        ResultColumns {
            feature: 0,
            variant: 1,
            pvalue: None,
        }
    }
}

/// One loaded association result: a feature's best-tested variant and its
/// empirical p-value.
#[derive(Debug, Clone)]
pub struct AssociationRow {
    pub feature: String,
    pub variant: String,
    pub p_empirical: f64,
    pub family: String,
    pub source: String,
}

/// Parse one result file (whitespace- or tab-separated, gzip-optional).
///
/// Rows whose p-value field is non-numeric (headers, `NA` permutation
/// failures) are skipped. An empty yield is an error so the caller can skip
/// the file with a warning.
pub fn read_result_file(path: &Path, columns: &ResultColumns, family: &str) -> Result<Vec<AssociationRow>> {
    let reader = get_line_reader(path)?;
    let source = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();
    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        let p_idx = columns.pvalue.unwrap_or_else(|| fields.len().saturating_sub(1));
        let needed = columns.feature.max(columns.variant).max(p_idx);
        if fields.len() <= needed {
            skipped += 1;
            continue;
        }
        let p_empirical = match fields[p_idx].parse::<f64>() {
            Ok(p) if p.is_finite() && (0.0..=1.0).contains(&p) => p,
            _ => {
                skipped += 1;
                continue;
            }
        };
        rows.push(AssociationRow {
            feature: fields[columns.feature].to_string(),
            variant: fields[columns.variant].to_string(),
            p_empirical,
            family: family.to_string(),
            source: source.clone(),
        });
    }
    if skipped > 0 {
        warn!("Skipped {} unusable rows in {}", skipped, source);
    }
    if rows.is_empty() {
        return Err(EdquantError::EmptyData(format!(
            "No usable rows in {}",
            path.display()
        )));
    }
    Ok(rows)
}

/// Load a list of result files belonging to one family, skipping files that
/// fail to parse. Returns every usable row.
pub fn load_result_family(paths: &[std::path::PathBuf], columns: &ResultColumns, family: &str) -> Vec<AssociationRow> {
    let mut rows = Vec::new();
    for path in paths {
        match read_result_file(path, columns, family) {
            Ok(mut file_rows) => {
                info!(
                    "Loaded {} rows from {} ({})",
                    file_rows.len(),
                    path.display(),
                    family
                );
                rows.append(&mut file_rows);
            }
            Err(err) => warn!("Skipping result file {}: {}", path.display(), err),
        }
    }
    rows
}

/// Benjamini-Hochberg step-up q-values.
///
/// Sorted ascending, `q_(i) = p_(i) * m / i` with the non-decreasing envelope
/// enforced from the largest p down, clamped to 1. Output is aligned to the
/// input order.
pub fn benjamini_hochberg(pvalues: &[f64]) -> Vec<f64> {
    let m = pvalues.len();
    if m == 0 {
        return Vec::new();
    }
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| {
        pvalues[a]
            .partial_cmp(&pvalues[b])
            .unwrap_or(Ordering::Equal)
    });

    let mut qvalues = vec![0.0; m];
    let mut running_min = 1.0f64;
    for rank in (0..m).rev() {
        let idx = order[rank];
        let raw = pvalues[idx] * m as f64 / (rank + 1) as f64;
        running_min = running_min.min(raw).min(1.0);
        qvalues[idx] = running_min;
    }
    qvalues
}

/// A corrected row: the input plus its q-value and significance flag.
#[derive(Debug, Clone)]
pub struct CorrectedRow {
    pub row: AssociationRow,
    pub q_value: f64,
    pub significant: bool,
}

/// Correct one hypothesis family in place of the given rows. Significance is
/// strict: `q < threshold`.
pub fn correct_family(rows: Vec<AssociationRow>, threshold: f64) -> Vec<CorrectedRow> {
    let pvalues: Vec<f64> = rows.iter().map(|r| r.p_empirical).collect();
    let qvalues = benjamini_hochberg(&pvalues);
    rows.into_iter()
        .zip(qvalues)
        .map(|(row, q_value)| CorrectedRow {
            significant: q_value < threshold,
            row,
            q_value,
        })
        .collect()
}

/// Pick the lead variant per feature among significant rows: the minimum
/// empirical p-value, ties resolved by variant id then input order.
pub fn select_lead_variants(corrected: &[CorrectedRow]) -> Vec<CorrectedRow> {
    let mut best: FxHashMap<&str, &CorrectedRow> = FxHashMap::default();
    for row in corrected.iter().filter(|r| r.significant) {
        match best.get(row.row.feature.as_str()) {
            Some(current) => {
                let replace = match row.row.p_empirical.partial_cmp(&current.row.p_empirical) {
                    Some(Ordering::Less) => true,
                    Some(Ordering::Equal) => row.row.variant < current.row.variant,
                    _ => false,
                };
                if replace {
                    best.insert(row.row.feature.as_str(), row);
                }
            }
            None => {
                best.insert(row.row.feature.as_str(), row);
            }
        }
    }
    let mut leads: Vec<CorrectedRow> = best.into_values().cloned().collect();
    leads.sort_by(|a, b| {
        a.q_value
            .partial_cmp(&b.q_value)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                a.row
                    .p_empirical
                    .partial_cmp(&b.row.p_empirical)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.row.feature.cmp(&b.row.feature))
    });
    leads
}

/// Write a corrected table with `#` metadata lines describing the correction
/// mode (the pooling call-out is part of the output contract).
pub fn write_corrected_table(
    path: &Path,
    metadata: &[String],
    rows: &[CorrectedRow],
) -> Result<()> {
    let mut writer = get_raw_writer(path)?;
    for line in metadata {
        writeln!(writer, "# {}", line)?;
    }
    writeln!(
        writer,
        "feature_id\tvariant_id\tp_empirical\tq_value\tsignificant\tfamily\tsource_file"
    )?;
    for row in rows {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            row.row.feature,
            row.row.variant,
            row.row.p_empirical,
            row.q_value,
            row.significant,
            row.row.family,
            row.row.source
        )?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as IoWrite;

    fn row(feature: &str, variant: &str, p: f64) -> AssociationRow {
        AssociationRow {
            feature: feature.to_string(),
            variant: variant.to_string(),
            p_empirical: p,
            family: "edqtl".to_string(),
            source: "test.txt".to_string(),
        }
    }

    #[test]
    fn test_bh_scenario() {
        // Five features at alpha 0.05: q = [0.005, 0.025, 0.0333.., 0.625, 0.8],
        // so exactly the three smallest p-values are significant.
        let q = benjamini_hochberg(&[0.001, 0.01, 0.02, 0.5, 0.8]);
        assert!((q[0] - 0.005).abs() < 1e-12);
        assert!((q[1] - 0.025).abs() < 1e-12);
        assert!((q[2] - 0.1 / 3.0).abs() < 1e-12);
        assert!((q[3] - 0.625).abs() < 1e-12);
        assert!((q[4] - 0.8).abs() < 1e-12);
        let significant: Vec<bool> = q.iter().map(|&v| v < 0.05).collect();
        assert_eq!(significant, vec![true, true, true, false, false]);
    }

    #[test]
    fn test_bh_monotone_envelope() {
        // A raw q sequence that dips is flattened by the step-up envelope.
        let q = benjamini_hochberg(&[0.01, 0.011, 0.012, 0.013]);
        let mut sorted = q.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(q, sorted);
        // All raw values p*m/i are >= the final envelope values.
        assert!((q[3] - 0.013).abs() < 1e-12);
        assert_eq!(q[0], q[1]);
    }

    #[test]
    fn test_bh_handles_unsorted_input() {
        let q = benjamini_hochberg(&[0.8, 0.001, 0.5, 0.01, 0.02]);
        assert!((q[1] - 0.005).abs() < 1e-12);
        assert!((q[0] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_lead_variants_one_per_feature() {
        let corrected = correct_family(
            vec![
                row("F1", "rs1", 0.001),
                row("F1", "rs2", 0.002),
                row("F2", "rs3", 0.01),
                row("F3", "rs4", 0.9),
            ],
            0.05,
        );
        let leads = select_lead_variants(&corrected);
        assert_eq!(leads.len(), 2);
        // Smallest p-value leads the table.
        assert_eq!(leads[0].row.variant, "rs1");
        assert_eq!(leads[1].row.feature, "F2");
        assert!(leads.iter().all(|l| l.significant));
    }

    #[test]
    fn test_lead_tie_breaks_on_variant_id() {
        let corrected = correct_family(
            vec![row("F1", "rs9", 0.001), row("F1", "rs2", 0.001)],
            0.05,
        );
        let leads = select_lead_variants(&corrected);
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].row.variant, "rs2");
    }

    #[test]
    fn test_read_result_file_skips_header_and_na() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let content = "\
feature_id variant_id p_beta
F1 rs1 0.001
F2 rs2 NA
F3 rs3 0.02
";
        file.write_all(content.as_bytes()).unwrap();
        let rows = read_result_file(file.path(), &ResultColumns::default(), "edqtl").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].feature, "F1");
        assert!((rows[1].p_empirical - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_read_result_file_custom_pvalue_column() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        // FastQTL permutation layout: p_beta in the last of 8 columns.
        let content = "F1 12 0.0004 rs1 1200 0.9 0.002 0.0015\n";
        file.write_all(content.as_bytes()).unwrap();
        let columns = ResultColumns {
            feature: 0,
            variant: 3,
            pvalue: None,
        };
        let rows = read_result_file(file.path(), &columns, "edqtl").unwrap();
        assert_eq!(rows[0].variant, "rs1");
        assert!((rows[0].p_empirical - 0.0015).abs() < 1e-12);
    }

    #[test]
    fn test_empty_file_is_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(read_result_file(file.path(), &ResultColumns::default(), "edqtl").is_err());
    }
}
