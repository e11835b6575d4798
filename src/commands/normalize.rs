//! Inverse normal transformation of the selected feature matrix into the
//! association tool's phenotype layout.

use anyhow::Result;
use log::info;
use std::path::PathBuf;
use structopt::StructOpt;

use crate::commands::common::validate_input_file;
use edquant_lib::core::errors::EdquantError;
use edquant_lib::normalize::transform_matrix;
use edquant_lib::select::FeatureMatrix;

#[derive(StructOpt, Debug)]
#[structopt(name = "normalize")]
pub struct NormalizeArgs {
    /// Feature matrix (feature rows x individual columns) to transform
    #[structopt(long, parse(from_os_str))]
    pub input: PathBuf,

    /// Path for the INT-transformed phenotype matrix
    #[structopt(long, parse(from_os_str))]
    pub output: PathBuf,
}

impl NormalizeArgs {
    pub fn validate(&self) -> Result<(), EdquantError> {
        validate_input_file("Feature matrix", &self.input)
    }
}

pub fn run_normalize(args: NormalizeArgs) -> Result<()> {
    args.validate()?;
    let matrix = FeatureMatrix::read(&args.input)?;
    info!(
        "Applying inverse normal transformation to {} features x {} individuals",
        matrix.rows.len(),
        matrix.individuals.len()
    );
    let transformed = transform_matrix(&matrix);
    transformed.write(&args.output, "feature_id")?;
    info!(
        "INT phenotype matrix saved to {}",
        args.output.display()
    );
    Ok(())
}
