//! Representative-site selection over the population matrix.

use anyhow::Result;
use log::info;
use std::path::PathBuf;
use structopt::StructOpt;

use crate::commands::common::validate_input_file;
use edquant_lib::collate::PopulationMatrix;
use edquant_lib::core::errors::EdquantError;
use edquant_lib::select::{apply_sample_filter, select_representatives};

#[derive(StructOpt, Debug)]
#[structopt(name = "select")]
pub struct SelectArgs {
    /// Population matrix produced by `collate`
    #[structopt(long, parse(from_os_str))]
    pub input: PathBuf,

    /// Path for the selected feature matrix
    #[structopt(long, parse(from_os_str))]
    pub output: PathBuf,

    /// Minimum non-missing sample count required before selection; no filter
    /// when omitted (production runs typically use 70)
    #[structopt(long)]
    pub min_samples: Option<usize>,
}

impl SelectArgs {
    pub fn validate(&self) -> Result<(), EdquantError> {
        validate_input_file("Population matrix", &self.input)
    }
}

pub fn run_select(args: SelectArgs) -> Result<()> {
    args.validate()?;
    let mut matrix = PopulationMatrix::read(&args.input)?;
    info!(
        "Loaded population matrix: {} rows x {} individuals",
        matrix.n_rows(),
        matrix.individuals.len()
    );

    if let Some(min_samples) = args.min_samples {
        apply_sample_filter(&mut matrix, min_samples);
    }

    let features = select_representatives(&matrix);
    if features.rows.is_empty() {
        return Err(EdquantError::EmptyData(
            "No features selected: no (Gene, CellType) group has a defined median".to_string(),
        )
        .into());
    }
    features.write(&args.output, "FeatureID")?;
    info!(
        "Selected {} features ({} individuals) saved to {}",
        features.rows.len(),
        features.individuals.len(),
        args.output.display()
    );
    Ok(())
}
