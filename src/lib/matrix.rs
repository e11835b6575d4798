//! Per-individual matrix file contracts.
//!
//! Two contracts live here: the phase-3 annotated raw matrix written by the
//! aggregator (Site × CellType editing levels plus annotation columns) and
//! the phase-4 quantification matrix written by the quantifier (Site ×
//! CellType {ER,TR,QC} triplets gated by `GlobalFilterStatus`). Both carry
//! leading `#` provenance comments and use `NA` for masked values.

use crate::core::errors::{EdquantError, Result};
use crate::core::io::{format_optional_f64, get_raw_writer, get_reader, parse_optional_f64, NA};
use crate::site::{CellQc, GlobalFilterStatus, Site};
use std::io::Write;
use std::path::Path;

pub const SITE_ID_COLUMN: &str = "SiteID";
pub const STATUS_COLUMN: &str = "GlobalFilterStatus";
pub const GENE_COLUMN: &str = "Phase3_Gene";
pub const ER_SUFFIX: &str = "_ER";

/// One annotated site row of a phase-3 matrix.
#[derive(Debug, Clone)]
pub struct AnnotatedSite {
    pub site: Site,
    pub rediportal_status: String,
    pub functional_region: String,
    pub gene: String,
    /// Editing levels aligned to the matrix's cell-type columns; sites not
    /// observed in a cell type hold 0.0.
    pub levels: Vec<f64>,
}

/// Write the phase-3 annotated raw matrix for one individual.
pub fn write_phase3_matrix(
    path: &Path,
    individual_id: &str,
    cell_types: &[String],
    rows: &[AnnotatedSite],
) -> Result<()> {
    let mut writer = get_raw_writer(path)?;
    writeln!(writer, "# Processed Individual: {}", individual_id)?;
    writeln!(
        writer,
        "# --- SITE-LEVEL QUANTIFICATION (Raw Edit Levels) ---"
    )?;
    write!(
        writer,
        "{}\tREDIPortal_Status\tFunctional_Region\tGene",
        SITE_ID_COLUMN
    )?;
    for cell_type in cell_types {
        write!(writer, "\t{}", cell_type)?;
    }
    writeln!(writer)?;
    for row in rows {
        write!(
            writer,
            "{}\t{}\t{}\t{}",
            row.site, row.rediportal_status, row.functional_region, row.gene
        )?;
        for level in &row.levels {
            write!(writer, "\t{}", level)?;
        }
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// A phase-3 site as consumed by the quantifier: annotation only, the raw
/// level columns are not needed downstream.
#[derive(Debug, Clone)]
pub struct Phase3Site {
    pub site: Site,
    pub rediportal_status: String,
    pub functional_region: String,
    pub gene: String,
}

/// Read the annotation columns of a phase-3 matrix, skipping `#` comments.
pub fn read_phase3_sites(path: &Path) -> Result<Vec<Phase3Site>> {
    let mut reader = get_reader(path, true, true)?;
    let headers = reader.headers()?.clone();
    let col = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| EdquantError::MissingColumn {
                column: name.to_string(),
                path: path.display().to_string(),
            })
    };
    let site_idx = col(SITE_ID_COLUMN)?;
    let redip_idx = col("REDIPortal_Status")?;
    let region_idx = col("Functional_Region")?;
    let gene_idx = col("Gene")?;

    let mut sites = Vec::new();
    for record in reader.records() {
        let record = record?;
        let site: Site = record
            .get(site_idx)
            .unwrap_or("")
            .parse()
            .map_err(|e: EdquantError| {
                EdquantError::Parse(format!("{} in {}", e, path.display()))
            })?;
        sites.push(Phase3Site {
            site,
            rediportal_status: record.get(redip_idx).unwrap_or("").to_string(),
            functional_region: record.get(region_idx).unwrap_or("").to_string(),
            gene: record.get(gene_idx).unwrap_or("").to_string(),
        });
    }
    if sites.is_empty() {
        return Err(EdquantError::EmptyData(format!(
            "No sites loaded from {}",
            path.display()
        )));
    }
    Ok(sites)
}

/// One cell-type measurement of a quantified site. All fields are `None` for
/// sites that never reached the pileup (non-PASS global status).
#[derive(Debug, Clone, Default)]
pub struct CellMeasurement {
    pub editing_ratio: Option<f64>,
    pub total_reads: Option<u32>,
    pub qc: Option<CellQc>,
}

/// One fully quantified row of the phase-4 matrix.
#[derive(Debug, Clone)]
pub struct QuantifiedSite {
    pub site: Site,
    pub status: GlobalFilterStatus,
    pub vcf_status: String,
    pub min_dist_to_splice: u64,
    pub functional_region: String,
    pub gene: String,
    pub rediportal_status: String,
    /// Aligned to the matrix's cell-type columns.
    pub cells: Vec<CellMeasurement>,
}

/// Write the phase-4 quantification matrix for one individual.
pub fn write_phase4_matrix(
    path: &Path,
    individual_id: &str,
    cell_types: &[String],
    rows: &[QuantifiedSite],
) -> Result<()> {
    let mut writer = get_raw_writer(path)?;
    writeln!(writer, "# Quantified Individual: {}", individual_id)?;
    write!(
        writer,
        "{}\tChr\tPos\tRef\tAlt\t{}\tVCF_Status\tMinDistToSplice\tPhase3_FunctionalRegion\t{}\tPhase3_REDIPortal_Status",
        SITE_ID_COLUMN, STATUS_COLUMN, GENE_COLUMN
    )?;
    for cell_type in cell_types {
        write!(
            writer,
            "\t{ct}_ER\t{ct}_TR\t{ct}_QC",
            ct = cell_type
        )?;
    }
    writeln!(writer)?;
    for row in rows {
        write!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            row.site,
            row.site.chrom,
            row.site.pos,
            row.site.ref_base,
            row.site.alt_base,
            row.status,
            row.vcf_status,
            row.min_dist_to_splice,
            row.functional_region,
            row.gene,
            row.rediportal_status
        )?;
        for cell in &row.cells {
            let tr = cell
                .total_reads
                .map(|t| t.to_string())
                .unwrap_or_else(|| NA.to_string());
            let qc = cell
                .qc
                .map(|q| q.to_string())
                .unwrap_or_else(|| NA.to_string());
            write!(
                writer,
                "\t{}\t{}\t{}",
                format_optional_f64(cell.editing_ratio),
                tr,
                qc
            )?;
        }
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// One melted observation from a phase-4 matrix: a PASS site's editing ratio
/// for one cell type.
#[derive(Debug, Clone, PartialEq)]
pub struct LongRecord {
    pub site: Site,
    pub gene: String,
    pub cell_type: String,
    pub value: Option<f64>,
}

/// Read a phase-4 matrix and melt its `<CellType>_ER` columns into long
/// records, keeping only rows whose `GlobalFilterStatus` is `PASS`.
pub fn read_phase4_long(path: &Path) -> Result<Vec<LongRecord>> {
    let mut reader = get_reader(path, true, true)?;
    let headers = reader.headers()?.clone();
    let col = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| EdquantError::MissingColumn {
                column: name.to_string(),
                path: path.display().to_string(),
            })
    };
    let site_idx = col(SITE_ID_COLUMN)?;
    let status_idx = col(STATUS_COLUMN)?;
    let gene_idx = col(GENE_COLUMN)?;
    let er_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter_map(|(idx, header)| {
            header
                .strip_suffix(ER_SUFFIX)
                .map(|cell_type| (idx, cell_type.to_string()))
        })
        .collect();
    if er_columns.is_empty() {
        return Err(EdquantError::MissingColumn {
            column: format!("*{}", ER_SUFFIX),
            path: path.display().to_string(),
        });
    }

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        let status: GlobalFilterStatus = record.get(status_idx).unwrap_or("").parse()?;
        if status != GlobalFilterStatus::Pass {
            continue;
        }
        let site: Site = record.get(site_idx).unwrap_or("").parse()?;
        let gene = record.get(gene_idx).unwrap_or("").to_string();
        for (idx, cell_type) in &er_columns {
            records.push(LongRecord {
                site: site.clone(),
                gene: gene.clone(),
                cell_type: cell_type.clone(),
                value: record.get(*idx).and_then(parse_optional_f64),
            });
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as IoWrite;

    #[test]
    fn test_phase3_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("IND_0001_annotated_raw_matrix.tsv");
        let cell_types = vec!["Bcell".to_string(), "Tcell".to_string()];
        let rows = vec![AnnotatedSite {
            site: Site::new("1", 1000, 'A', 'G'),
            rediportal_status: "Known".to_string(),
            functional_region: "UTR3".to_string(),
            gene: "APP".to_string(),
            levels: vec![0.5, 0.0],
        }];
        write_phase3_matrix(&path, "IND_0001", &cell_types, &rows).unwrap();

        let sites = read_phase3_sites(&path).unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].site, Site::new("1", 1000, 'A', 'G'));
        assert_eq!(sites[0].gene, "APP");
        assert_eq!(sites[0].rediportal_status, "Known");
    }

    #[test]
    fn test_phase4_long_melts_pass_rows_only() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let content = "\
# Quantified Individual: IND_0001
SiteID\tChr\tPos\tRef\tAlt\tGlobalFilterStatus\tVCF_Status\tMinDistToSplice\tPhase3_FunctionalRegion\tPhase3_Gene\tPhase3_REDIPortal_Status\tBcell_ER\tBcell_TR\tBcell_QC\tTcell_ER\tTcell_TR\tTcell_QC
1:1000:A>G\t1\t1000\tA\tG\tPASS\tSomaticEdit\t50\tUTR3\tAPP\tKnown\t0.5\t20\tPASS\tNA\t3\tLowCoverage
1:2000:T>C\t1\t2000\tT\tC\tGermlineSNP\tGermlineSNP\t60\tExon\tGRIA2\tNovel\tNA\tNA\tNA\tNA\tNA\tNA
";
        file.write_all(content.as_bytes()).unwrap();

        let records = read_phase4_long(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].site, Site::new("1", 1000, 'A', 'G'));
        assert_eq!(records[0].cell_type, "Bcell");
        assert_eq!(records[0].value, Some(0.5));
        assert_eq!(records[1].cell_type, "Tcell");
        assert_eq!(records[1].value, None);
        assert!(records.iter().all(|r| r.gene == "APP"));
    }

    #[test]
    fn test_phase4_long_requires_er_columns() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"SiteID\tGlobalFilterStatus\tPhase3_Gene\n")
            .unwrap();
        assert!(read_phase4_long(file.path()).is_err());
    }
}
