//! Per-cell-type quantification of consensus sites.
//!
//! Loads one individual's phase-3 annotated matrix, applies optional
//! annotation pre-filters, gates every site through germline and
//! splice-junction exclusion, and pileup-counts the surviving sites in each
//! cell-type BAM. Low-coverage measurements are masked, never errors.

use anyhow::Result;
use log::{info, warn};
use rust_htslib::bam;
use std::path::PathBuf;
use structopt::StructOpt;

use crate::commands::common::validate_input_file;
use edquant_lib::core::errors::EdquantError;
use edquant_lib::core::fs::FilePattern;
use edquant_lib::matrix::{
    read_phase3_sites, write_phase4_matrix, CellMeasurement, Phase3Site, QuantifiedSite,
};
use edquant_lib::quantify::{
    discover_cell_type_bams, quantify_site, GermlineSet, SpliceJunctionIndex,
    NO_JUNCTION_DISTANCE,
};
use edquant_lib::site::{CellQc, GlobalFilterStatus};

#[derive(StructOpt, Debug)]
#[structopt(name = "quantify")]
pub struct QuantifyArgs {
    /// Phase-3 annotated matrix holding the sites to quantify
    #[structopt(long, parse(from_os_str))]
    pub sites: PathBuf,

    /// Path for the per-cell-type quantification matrix
    #[structopt(long, parse(from_os_str))]
    pub output: PathBuf,

    /// Directory holding the per-cell-type BAM files
    #[structopt(long, parse(from_os_str))]
    pub bams_dir: PathBuf,

    /// Pattern identifying the cell-type BAMs; the cell-type id is the last
    /// underscore-separated segment of the file stem
    #[structopt(long, default_value = "scRNA_file_*.bam")]
    pub bam_pattern: String,

    /// The individual's germline VCF
    #[structopt(long, parse(from_os_str))]
    pub germline_vcf: PathBuf,

    /// Individual ID, as named in the VCF sample column
    #[structopt(long)]
    pub individual_id: String,

    /// Ensembl GTF used for splice-junction coordinates (gzip-optional)
    #[structopt(long, parse(from_os_str))]
    pub gtf: PathBuf,

    /// Exclude sites within this many bp of a splice junction
    #[structopt(long, default_value = "4")]
    pub splice_site_threshold: u64,

    /// Minimum total reads required before an editing ratio is reported
    #[structopt(long, default_value = "10")]
    pub min_read_coverage: u32,

    /// Keep only sites with this REDIPortal status (e.g. Known)
    #[structopt(long)]
    pub filter_rediportal_status: Option<String>,

    /// Keep only sites with this functional region (e.g. UTR3)
    #[structopt(long)]
    pub filter_functional_region: Option<String>,
}

impl QuantifyArgs {
    pub fn validate(&self) -> Result<(), EdquantError> {
        validate_input_file("Phase-3 matrix", &self.sites)?;
        validate_input_file("BAM directory", &self.bams_dir)?;
        validate_input_file("Germline VCF", &self.germline_vcf)?;
        validate_input_file("GTF", &self.gtf)?;
        if self.min_read_coverage == 0 {
            return Err(EdquantError::InvalidInput(
                "min_read_coverage must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn apply_annotation_filters(args: &QuantifyArgs, sites: Vec<Phase3Site>) -> Vec<Phase3Site> {
    let initial = sites.len();
    let filtered: Vec<Phase3Site> = sites
        .into_iter()
        .filter(|site| {
            args.filter_rediportal_status
                .as_deref()
                .map_or(true, |status| site.rediportal_status == status)
        })
        .filter(|site| {
            args.filter_functional_region
                .as_deref()
                .map_or(true, |region| site.functional_region == region)
        })
        .collect();
    info!(
        "Annotation filter summary: {} -> {} sites",
        initial,
        filtered.len()
    );
    filtered
}

pub fn run_quantify(args: QuantifyArgs) -> Result<()> {
    args.validate()?;
    info!(
        "Quantifying sites for individual {} from {}",
        args.individual_id,
        args.sites.display()
    );

    let sites = read_phase3_sites(&args.sites)?;
    let sites = apply_annotation_filters(&args, sites);
    if sites.is_empty() {
        // Documented zero-sites case: empty output, successful exit.
        warn!("No sites remaining after annotation filtering; writing empty output");
        write_phase4_matrix(&args.output, &args.individual_id, &[], &[])?;
        return Ok(());
    }

    let bam_pattern = FilePattern::new(&args.bam_pattern)?;
    let cell_bams = discover_cell_type_bams(&args.bams_dir, &bam_pattern)?;
    info!("Quantifying against {} cell-type BAMs", cell_bams.len());

    let germline = GermlineSet::from_vcf(&args.germline_vcf, &args.individual_id)?;
    let junctions = match SpliceJunctionIndex::from_gtf(&args.gtf) {
        Ok(index) => Some(index),
        Err(err) => {
            warn!(
                "Failed to load GTF for splice-junction filtering: {}; sites will carry GTF_Error",
                err
            );
            None
        }
    };

    let mut readers: Vec<Option<bam::IndexedReader>> = Vec::with_capacity(cell_bams.len());
    for cell_bam in &cell_bams {
        match bam::IndexedReader::from_path(&cell_bam.path) {
            Ok(reader) => readers.push(Some(reader)),
            Err(err) => {
                warn!(
                    "Failed to open BAM {}: {}; cell type {} will carry BAM_Error",
                    cell_bam.path.display(),
                    err,
                    cell_bam.cell_type
                );
                readers.push(None);
            }
        }
    }

    let cell_types: Vec<String> = cell_bams.iter().map(|b| b.cell_type.clone()).collect();
    let mut rows: Vec<QuantifiedSite> = Vec::with_capacity(sites.len());
    let mut n_pass = 0usize;
    for phase3 in &sites {
        let is_germline = germline.contains(&phase3.site);
        let min_dist = junctions
            .as_ref()
            .and_then(|index| index.min_distance(&phase3.site.chrom, phase3.site.pos));
        let status = if is_germline {
            GlobalFilterStatus::GermlineSnp
        } else if junctions.is_none() {
            GlobalFilterStatus::GtfError
        } else if min_dist.map_or(false, |d| d <= args.splice_site_threshold) {
            GlobalFilterStatus::SjFiltered
        } else {
            GlobalFilterStatus::Pass
        };

        let cells: Vec<CellMeasurement> = if status == GlobalFilterStatus::Pass {
            n_pass += 1;
            readers
                .iter_mut()
                .map(|reader| match reader {
                    Some(reader) => {
                        let quant = quantify_site(reader, &phase3.site, args.min_read_coverage);
                        CellMeasurement {
                            editing_ratio: quant.editing_ratio,
                            total_reads: Some(quant.total_reads),
                            qc: Some(quant.qc),
                        }
                    }
                    None => CellMeasurement {
                        editing_ratio: None,
                        total_reads: None,
                        qc: Some(CellQc::BamError),
                    },
                })
                .collect()
        } else {
            vec![CellMeasurement::default(); cell_types.len()]
        };

        rows.push(QuantifiedSite {
            site: phase3.site.clone(),
            status,
            vcf_status: if is_germline {
                "GermlineSNP".to_string()
            } else {
                "SomaticEdit".to_string()
            },
            min_dist_to_splice: min_dist.unwrap_or(NO_JUNCTION_DISTANCE),
            functional_region: phase3.functional_region.clone(),
            gene: phase3.gene.clone(),
            rediportal_status: phase3.rediportal_status.clone(),
            cells,
        });
    }

    write_phase4_matrix(&args.output, &args.individual_id, &cell_types, &rows)?;
    info!(
        "Quantification complete: {} sites ({} PASS) x {} cell types written to {}",
        rows.len(),
        n_pass,
        cell_types.len(),
        args.output.display()
    );
    Ok(())
}
