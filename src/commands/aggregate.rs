//! Per-individual aggregation, consensus filtering, and annotation.
//!
//! Reads one individual's raw RED-ML and REDItools call files, applies the
//! minimum editing-level and canonical base-change filters, keeps only
//! two-tool consensus sites, pivots to a Site × CellType matrix, and appends
//! REDIPortal and functional-region annotation.

use anyhow::Result;
use log::{info, warn};
use std::path::PathBuf;
use structopt::StructOpt;

use crate::commands::common::{validate_fraction, validate_input_file};
use edquant_lib::aggregate::{pivot_consensus_matrix, CellObservation};
use edquant_lib::annotate::{FeatureIndex, FeatureSource, GeneMap, RediportalIndex};
use edquant_lib::calls::{discover_individual_call_files, read_raw_calls};
use edquant_lib::core::errors::EdquantError;
use edquant_lib::matrix::{write_phase3_matrix, AnnotatedSite};

#[derive(StructOpt, Debug)]
#[structopt(name = "aggregate")]
pub struct AggregateArgs {
    /// Unique ID of the individual being processed (e.g. IND_0001)
    #[structopt(long)]
    pub individual_id: String,

    /// Top-level directory searched recursively for raw call files
    #[structopt(long, parse(from_os_str))]
    pub root_search_dir: PathBuf,

    /// Path for the annotated raw editing-level matrix
    #[structopt(long, parse(from_os_str))]
    pub output: PathBuf,

    /// Minimum editing level required for a call to be kept
    #[structopt(long, default_value = "0.1")]
    pub min_edit_level: f64,

    /// REDIPortal known-sites BED file (gzip-optional)
    #[structopt(long, parse(from_os_str))]
    pub rediportal_bed: PathBuf,

    /// Ensembl GTF for functional annotation (gzip-optional)
    #[structopt(long, parse(from_os_str))]
    pub gtf: Option<PathBuf>,

    /// Pre-computed site-to-gene map TSV (Chr, Pos, GeneSymbol, FeatureType)
    #[structopt(long, parse(from_os_str))]
    pub gene_map_tsv: Option<PathBuf>,
}

impl AggregateArgs {
    pub fn validate(&self) -> Result<(), EdquantError> {
        validate_fraction("min_edit_level", self.min_edit_level)?;
        validate_input_file("Root search directory", &self.root_search_dir)?;
        validate_input_file("REDIPortal BED", &self.rediportal_bed)?;
        match (&self.gtf, &self.gene_map_tsv) {
            (Some(gtf), None) => validate_input_file("GTF", gtf),
            (None, Some(map)) => validate_input_file("Gene map TSV", map),
            _ => Err(EdquantError::Config(
                "Exactly one of --gtf and --gene-map-tsv must be provided".to_string(),
            )),
        }
    }
}

pub fn run_aggregate(args: AggregateArgs) -> Result<()> {
    args.validate()?;
    info!("Aggregating raw calls for individual {}", args.individual_id);

    let files = discover_individual_call_files(&args.root_search_dir, &args.individual_id)?;
    if files.is_empty() {
        return Err(EdquantError::FileNotFound(format!(
            "No raw call files found for individual {} in {}",
            args.individual_id,
            args.root_search_dir.display()
        ))
        .into());
    }
    info!("Found {} raw call files", files.len());

    let mut observations: Vec<CellObservation> = Vec::new();
    for file in &files {
        match read_raw_calls(&file.path, file.tool, args.min_edit_level) {
            Ok(calls) => {
                observations.extend(
                    calls
                        .into_iter()
                        .filter(|call| call.site.is_canonical())
                        .map(|call| CellObservation {
                            site: call.site,
                            cell_type: file.label.clone(),
                            tool: file.tool,
                            edit_level: call.edit_level,
                        }),
                );
            }
            Err(err) => warn!(
                "Failed to process file {}: {}",
                file.path.display(),
                err
            ),
        }
    }
    if observations.is_empty() {
        return Err(EdquantError::EmptyData(format!(
            "No valid data loaded after filtering for individual {}",
            args.individual_id
        ))
        .into());
    }
    info!(
        "Loaded {} raw entries after edit level >= {} and canonical filters",
        observations.len(),
        args.min_edit_level
    );

    let matrix = pivot_consensus_matrix(&observations);
    if matrix.rows.is_empty() {
        // Documented zero-sites case: empty output, successful exit.
        warn!(
            "No consensus sites found for individual {}; writing empty output",
            args.individual_id
        );
        write_phase3_matrix(&args.output, &args.individual_id, &[], &[])?;
        return Ok(());
    }
    info!("Unique consensus sites: {}", matrix.rows.len());

    let rediportal = match RediportalIndex::load(&args.rediportal_bed) {
        Ok(index) => Some(index),
        Err(err) => {
            warn!("Failed to load REDIPortal: {}; all sites marked Novel", err);
            None
        }
    };
    let features = match (&args.gtf, &args.gene_map_tsv) {
        (Some(gtf), _) => FeatureSource::Gtf(FeatureIndex::from_gtf(gtf)?),
        (_, Some(map)) => FeatureSource::Map(GeneMap::load(map)?),
        _ => unreachable!("validated above"),
    };

    info!("Annotating {} sites", matrix.rows.len());
    let rows: Vec<AnnotatedSite> = matrix
        .rows
        .iter()
        .map(|(site, levels)| {
            let status = rediportal
                .as_ref()
                .map(|index| index.status(&site.chrom, site.pos).to_string())
                .unwrap_or_else(|| "Novel".to_string());
            let annotation = features.annotate(&site.chrom, site.pos);
            AnnotatedSite {
                site: site.clone(),
                rediportal_status: status,
                functional_region: annotation.region.to_string(),
                gene: annotation.gene,
                levels: levels.clone(),
            }
        })
        .collect();

    write_phase3_matrix(&args.output, &args.individual_id, &matrix.cell_types, &rows)?;
    info!(
        "Saved annotated raw matrix ({} sites x {} cell types) to {}",
        rows.len(),
        matrix.cell_types.len(),
        args.output.display()
    );
    Ok(())
}
