//! edquant - population-scale RNA editing quantification and edQTL feature
//! preparation for single-cell RNA-seq cohorts.
//!
//! The pipeline runs as a fixed sequence of batch stages, one subcommand
//! each, communicating through flat tab-separated files:
//!
//! - `aggregate`: per-individual consensus filtering and annotation
//! - `discover`: project-wide master site discovery
//! - `quantify`: per-cell-type pileup quantification with germline and
//!   splice-junction exclusion
//! - `collate`: stack all individuals into one population matrix
//! - `select`: pick the representative site per (Gene, CellType) feature
//! - `normalize`: inverse normal transformation of the feature matrix
//! - `covariates`: assemble the covariate matrix for association testing
//! - `aei`: collate Alu editing index covariates
//! - `correct`: BH FDR correction and lead-variant selection
//!
//! # Usage
//!
//! ```bash
//! # Aggregate one individual's raw calls
//! edquant aggregate --individual-id IND_0001 --root-search-dir calls/ \
//!     --rediportal-bed rediportal.bed.gz --gtf genes.gtf.gz \
//!     --output IND_0001_annotated_raw_matrix.tsv
//!
//! # Collate, select, and normalize across the cohort
//! edquant collate --input-dir phase4/ --output population_matrix.tsv
//! edquant select --input population_matrix.tsv --min-samples 70 \
//!     --output feature_matrix.tsv
//! edquant normalize --input feature_matrix.tsv --output phenotypes.tsv
//!
//! # Correct association results
//! edquant correct --results chr*.perm.txt.gz --output-dir final/
//! ```
//!
//! Every stage exits 0 on success and 1 on a fatal condition; diagnostics go
//! to stderr.

extern crate edquant_lib;
pub mod commands;
use anyhow::Result;
use edquant_lib::core::errors::is_broken_pipe;
use env_logger::Env;
use log::*;
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case", author, about)]
/// Batch pipeline stages for population-scale RNA editing quantification
struct Args {
    #[structopt(subcommand)]
    subcommand: Subcommand,
}

#[derive(StructOpt)]
enum Subcommand {
    /// Aggregate one individual's raw calls with consensus filtering and annotation
    Aggregate(commands::AggregateArgs),
    /// Discover the project-wide master consensus site list
    Discover(commands::DiscoverArgs),
    /// Quantify consensus sites per cell-type BAM with germline/splice exclusion
    Quantify(commands::QuantifyArgs),
    /// Collate all individuals' matrices into one population matrix
    Collate(commands::CollateArgs),
    /// Select the representative site per (Gene, CellType) feature
    Select(commands::SelectArgs),
    /// Apply the inverse normal transformation to the feature matrix
    Normalize(commands::NormalizeArgs),
    /// Assemble the covariate matrix aligned to the phenotype individuals
    Covariates(commands::CovariatesArgs),
    /// Collate Alu editing index outputs into a covariate matrix
    Aei(commands::AeiArgs),
    /// Apply BH FDR correction and select lead variants
    Correct(commands::CorrectArgs),
}

impl Subcommand {
    fn run(self) -> Result<()> {
        match self {
            Subcommand::Aggregate(args) => commands::run_aggregate(args)?,
            Subcommand::Discover(args) => commands::run_discover(args)?,
            Subcommand::Quantify(args) => commands::run_quantify(args)?,
            Subcommand::Collate(args) => commands::run_collate(args)?,
            Subcommand::Select(args) => commands::run_select(args)?,
            Subcommand::Normalize(args) => commands::run_normalize(args)?,
            Subcommand::Covariates(args) => commands::run_covariates(args)?,
            Subcommand::Aei(args) => commands::run_aei(args)?,
            Subcommand::Correct(args) => commands::run_correct(args)?,
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    if let Err(err) = Args::from_args().subcommand.run() {
        if is_broken_pipe(&err) {
            std::process::exit(0);
        }
        error!("FATAL: {:#}", err);
        std::process::exit(1);
    }
    Ok(())
}
