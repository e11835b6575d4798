//! Population collation: stack every individual's phase-4 matrix into one
//! long-format population matrix.

use anyhow::Result;
use log::info;
use std::path::PathBuf;
use structopt::StructOpt;

use crate::commands::common::validate_input_file;
use edquant_lib::collate::collate_directory;
use edquant_lib::core::errors::EdquantError;
use edquant_lib::core::fs::FilePattern;

#[derive(StructOpt, Debug)]
#[structopt(name = "collate")]
pub struct CollateArgs {
    /// Directory containing all individual phase-4 matrices
    #[structopt(long, parse(from_os_str))]
    pub input_dir: PathBuf,

    /// Pattern matching the phase-4 matrices; the wildcard segment is the
    /// individual ID
    #[structopt(long, default_value = "*_final_editing_matrix_p4.tsv")]
    pub file_pattern: String,

    /// Path for the population matrix
    #[structopt(long, parse(from_os_str))]
    pub output: PathBuf,
}

impl CollateArgs {
    pub fn validate(&self) -> Result<(), EdquantError> {
        validate_input_file("Input directory", &self.input_dir)?;
        FilePattern::new(&self.file_pattern).map(|_| ())
    }
}

pub fn run_collate(args: CollateArgs) -> Result<()> {
    args.validate()?;
    let pattern = FilePattern::new(&args.file_pattern)?;
    let matrix = collate_directory(&args.input_dir, &pattern)?;
    matrix.write(&args.output)?;
    info!(
        "Population matrix ({} rows x {} individuals) saved to {}",
        matrix.n_rows(),
        matrix.individuals.len(),
        args.output.display()
    );
    Ok(())
}
