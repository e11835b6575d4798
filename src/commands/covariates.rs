//! Covariate assembly aligned to the phenotype's individual set.

use anyhow::Result;
use log::{info, warn};
use std::path::PathBuf;
use structopt::StructOpt;

use crate::commands::common::validate_input_file;
use edquant_lib::core::errors::EdquantError;
use edquant_lib::covariate::{merge_covariates, CovariateTable, JoinMode};
use edquant_lib::select::FeatureMatrix;

#[derive(StructOpt, Debug)]
#[structopt(name = "covariates")]
pub struct CovariatesArgs {
    /// Phenotype matrix defining the individual set
    #[structopt(long, parse(from_os_str))]
    pub phenotype: PathBuf,

    /// AEI covariate matrix (required source)
    #[structopt(long, parse(from_os_str))]
    pub aei: PathBuf,

    /// Genotype principal components (optional source)
    #[structopt(long, parse(from_os_str))]
    pub genotype_pcs: Option<PathBuf>,

    /// Hidden-factor estimates, e.g. PEER (optional source)
    #[structopt(long, parse(from_os_str))]
    pub peer_factors: Option<PathBuf>,

    /// Cell-type proportions (optional source)
    #[structopt(long, parse(from_os_str))]
    pub cell_proportions: Option<PathBuf>,

    /// Join discipline across sources: inner (complete covariates required)
    /// or union (missing covariates imputed to zero)
    #[structopt(long, default_value = "union")]
    pub join: JoinMode,

    /// Path for the transposed covariate matrix
    #[structopt(long, parse(from_os_str))]
    pub output: PathBuf,
}

impl CovariatesArgs {
    pub fn validate(&self) -> Result<(), EdquantError> {
        validate_input_file("Phenotype matrix", &self.phenotype)?;
        validate_input_file("AEI covariates", &self.aei)
    }
}

fn load_optional(tables: &mut Vec<CovariateTable>, path: &Option<PathBuf>, label: &str) {
    if let Some(path) = path {
        match CovariateTable::load(path, label) {
            Ok(table) => tables.push(table),
            Err(err) => warn!("{} failed to load ({}); skipping", label, err),
        }
    }
}

pub fn run_covariates(args: CovariatesArgs) -> Result<()> {
    args.validate()?;
    let phenotype = FeatureMatrix::read(&args.phenotype)?;
    info!(
        "Phenotype defines {} individuals",
        phenotype.individuals.len()
    );

    let mut tables = Vec::new();
    tables.push(CovariateTable::load(&args.aei, "AEI")?);
    load_optional(&mut tables, &args.genotype_pcs, "Genotype PCs");
    load_optional(&mut tables, &args.peer_factors, "PEER factors");
    load_optional(&mut tables, &args.cell_proportions, "Cell-type proportions");

    let merged = merge_covariates(&tables, &phenotype.individuals, args.join)?;
    info!(
        "Merged covariates under {:?} join: {} covariates x {} individuals",
        args.join,
        merged.columns.len(),
        merged.individuals.len()
    );
    merged.write_transposed(&args.output)?;
    info!("Covariate matrix saved to {}", args.output.display());
    Ok(())
}
