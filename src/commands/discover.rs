//! Project-wide master site discovery.
//!
//! Scans every individual's raw call files under the search root, applies the
//! editing-level and canonical filters, and keeps the sites called by both
//! tools anywhere in the cohort. The output is the de-duplicated master site
//! list (Chr, Pos, Ref, Alt) with no quantification.

use anyhow::Result;
use log::{info, warn};
use rayon::prelude::*;
use std::io::Write;
use std::path::PathBuf;
use structopt::StructOpt;

use crate::commands::common::{
    configure_global_thread_pool, validate_fraction, validate_input_file,
};
use edquant_lib::calls::{discover_all_call_files, read_raw_calls, Tool};
use edquant_lib::consensus::consensus_sites;
use edquant_lib::core::errors::EdquantError;
use edquant_lib::core::io::get_raw_writer;
use edquant_lib::site::Site;

#[derive(StructOpt, Debug)]
#[structopt(name = "discover")]
pub struct DiscoverArgs {
    /// Top-level directory searched recursively for all raw call files
    #[structopt(long, parse(from_os_str))]
    pub root_search_dir: PathBuf,

    /// Path for the master consensus site list
    #[structopt(long, parse(from_os_str))]
    pub output: PathBuf,

    /// Minimum editing level required for a call to be kept
    #[structopt(long, default_value = "0.1")]
    pub min_edit_level: f64,

    /// Worker threads for parallel file parsing
    #[structopt(long, short = "t", default_value = "4")]
    pub threads: usize,
}

impl DiscoverArgs {
    pub fn validate(&self) -> Result<(), EdquantError> {
        validate_fraction("min_edit_level", self.min_edit_level)?;
        validate_input_file("Root search directory", &self.root_search_dir)
    }
}

pub fn run_discover(args: DiscoverArgs) -> Result<()> {
    args.validate()?;
    let threads = configure_global_thread_pool(args.threads)?;
    info!("Master site discovery with {} threads", threads);

    let files = discover_all_call_files(&args.root_search_dir)?;
    let n_redml = files.iter().filter(|f| f.tool == Tool::RedMl).count();
    let n_reditools = files.len() - n_redml;
    if n_redml == 0 || n_reditools == 0 {
        return Err(EdquantError::FileNotFound(format!(
            "Could not find raw call files for both tools under {} ({} RED-ML, {} REDItools)",
            args.root_search_dir.display(),
            n_redml,
            n_reditools
        ))
        .into());
    }
    info!(
        "Found {} RED-ML files and {} REDItools files",
        n_redml, n_reditools
    );

    // Files are independent: parse read-only in parallel, merge sequentially.
    let parsed: Vec<(usize, std::result::Result<Vec<(Site, Tool)>, EdquantError>)> = files
        .par_iter()
        .enumerate()
        .map(|(idx, file)| {
            let result = read_raw_calls(&file.path, file.tool, args.min_edit_level).map(|calls| {
                calls
                    .into_iter()
                    .filter(|call| call.site.is_canonical())
                    .map(|call| (call.site, file.tool))
                    .collect()
            });
            (idx, result)
        })
        .collect();

    let mut observations: Vec<(Site, Tool)> = Vec::new();
    let mut loaded = 0usize;
    for (idx, result) in parsed {
        match result {
            Ok(mut calls) => {
                observations.append(&mut calls);
                loaded += 1;
            }
            Err(err) => warn!(
                "Failed to process file {}: {}",
                files[idx].path.display(),
                err
            ),
        }
    }
    if loaded == 0 || observations.is_empty() {
        return Err(
            EdquantError::EmptyData("No valid site data loaded after filtering".to_string()).into(),
        );
    }
    info!(
        "Loaded {} canonical raw entries from {} files",
        observations.len(),
        loaded
    );

    let consensus = consensus_sites(observations);
    info!(
        "Sites after project-wide consensus filter: {}",
        consensus.len()
    );

    let mut writer = get_raw_writer(&args.output)?;
    writeln!(writer, "Chr\tPos\tRef\tAlt")?;
    for site in &consensus {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}",
            site.chrom, site.pos, site.ref_base, site.alt_base
        )?;
    }
    writer.flush()?;
    info!(
        "Master site discovery complete; {} unique sites written to {}",
        consensus.len(),
        args.output.display()
    );
    Ok(())
}
