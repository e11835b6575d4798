//! FDR correction and lead-variant selection over association-test results.

use anyhow::Result;
use log::info;
use std::path::PathBuf;
use structopt::StructOpt;

use crate::commands::common::validate_fraction;
use edquant_lib::core::errors::EdquantError;
use edquant_lib::fdr::{
    correct_family, load_result_family, select_lead_variants, write_corrected_table,
    CorrectedRow, ResultColumns,
};

#[derive(StructOpt, Debug)]
#[structopt(name = "correct")]
pub struct CorrectArgs {
    /// Primary association result files (whitespace/tab separated,
    /// gzip-optional)
    #[structopt(long, parse(from_os_str), required = true, min_values = 1)]
    pub results: Vec<PathBuf>,

    /// Secondary result family (e.g. index-level tests)
    #[structopt(long, parse(from_os_str))]
    pub secondary: Vec<PathBuf>,

    /// Correct the primary and secondary families jointly as one hypothesis
    /// family instead of per-family
    #[structopt(long)]
    pub pool: bool,

    /// Significance threshold: a row is significant iff q-value < threshold
    #[structopt(long, default_value = "0.05")]
    pub fdr_threshold: f64,

    /// 0-based column index of the feature identifier
    #[structopt(long, default_value = "0")]
    pub feature_col: usize,

    /// 0-based column index of the variant identifier
    #[structopt(long, default_value = "1")]
    pub variant_col: usize,

    /// 0-based column index of the empirical p-value (default: last field)
    #[structopt(long)]
    pub pvalue_col: Option<usize>,

    /// Directory for the corrected and lead-variant tables
    #[structopt(long, parse(from_os_str))]
    pub output_dir: PathBuf,
}

impl CorrectArgs {
    pub fn validate(&self) -> Result<(), EdquantError> {
        validate_fraction("fdr_threshold", self.fdr_threshold)
    }
}

pub fn run_correct(args: CorrectArgs) -> Result<()> {
    args.validate()?;
    let columns = ResultColumns {
        feature: args.feature_col,
        variant: args.variant_col,
        pvalue: args.pvalue_col,
    };

    let primary = load_result_family(&args.results, &columns, "primary");
    let secondary = load_result_family(&args.secondary, &columns, "secondary");
    let n_primary = primary.len();
    let n_secondary = secondary.len();
    if n_primary + n_secondary == 0 {
        return Err(
            EdquantError::EmptyData("No valid association results loaded".to_string()).into(),
        );
    }

    let pooled = args.pool || n_secondary == 0;
    let corrected: Vec<CorrectedRow> = if pooled {
        let mut all = primary;
        all.extend(secondary);
        info!(
            "Applying BH FDR correction on {} pooled tests",
            all.len()
        );
        correct_family(all, args.fdr_threshold)
    } else {
        info!(
            "Applying BH FDR correction per family ({} primary, {} secondary tests)",
            n_primary, n_secondary
        );
        let mut all = correct_family(primary, args.fdr_threshold);
        all.extend(correct_family(secondary, args.fdr_threshold));
        all
    };

    let n_significant = corrected.iter().filter(|r| r.significant).count();
    info!(
        "{} of {} tests significant at q < {}",
        n_significant,
        corrected.len(),
        args.fdr_threshold
    );

    let leads = select_lead_variants(&corrected);
    info!("{} unique lead variants identified", leads.len());

    let metadata = vec![
        format!(
            "correction: benjamini-hochberg, mode={}, threshold={}",
            if pooled { "pooled" } else { "per-family" },
            args.fdr_threshold
        ),
        format!(
            "tests: total={}, primary={}, secondary={}",
            n_primary + n_secondary,
            n_primary,
            n_secondary
        ),
    ];

    std::fs::create_dir_all(&args.output_dir).map_err(EdquantError::Io)?;
    let full_path = args.output_dir.join("full_corrected.tsv");
    write_corrected_table(&full_path, &metadata, &corrected)?;
    info!("Full corrected table saved to {}", full_path.display());

    let lead_path = args.output_dir.join("lead_variants.tsv");
    write_corrected_table(&lead_path, &metadata, &leads)?;
    info!("Lead-variant table saved to {}", lead_path.display());
    Ok(())
}
