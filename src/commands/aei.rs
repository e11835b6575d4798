//! Collation of per-individual Alu Editing Index outputs into one covariate
//! matrix.

use anyhow::Result;
use log::info;
use std::path::PathBuf;
use structopt::StructOpt;

use crate::commands::common::validate_input_file;
use edquant_lib::aei::collate_aei_directory;
use edquant_lib::core::errors::EdquantError;
use edquant_lib::core::fs::FilePattern;

#[derive(StructOpt, Debug)]
#[structopt(name = "aei")]
pub struct AeiArgs {
    /// Directory containing all individual AEI output files
    #[structopt(long, parse(from_os_str))]
    pub input_dir: PathBuf,

    /// Pattern matching the AEI files (filenames start `IID_CT_...`)
    #[structopt(long, default_value = "*.aei.tsv")]
    pub file_pattern: String,

    /// Substitution label whose index is the AEI value
    #[structopt(long, default_value = "G-A")]
    pub substitution: String,

    /// Path for the AEI covariate matrix
    #[structopt(long, parse(from_os_str))]
    pub output: PathBuf,
}

impl AeiArgs {
    pub fn validate(&self) -> Result<(), EdquantError> {
        validate_input_file("Input directory", &self.input_dir)?;
        FilePattern::new(&self.file_pattern).map(|_| ())
    }
}

pub fn run_aei(args: AeiArgs) -> Result<()> {
    args.validate()?;
    let pattern = FilePattern::new(&args.file_pattern)?;
    let matrix = collate_aei_directory(&args.input_dir, &pattern, &args.substitution)?;
    matrix.write(&args.output)?;
    info!(
        "AEI covariate matrix ({} individuals) saved to {}",
        matrix.n_individuals(),
        args.output.display()
    );
    Ok(())
}
