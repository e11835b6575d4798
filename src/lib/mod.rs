//! edquant: population-scale RNA editing quantification and edQTL feature
//! preparation for single-cell RNA-seq cohorts.
//!
//! The library implements the batch transformations behind the `edquant`
//! CLI's pipeline stages:
//! 1. Per-individual aggregation of two callers' raw output with two-tool
//!    consensus filtering and annotation
//! 2. Project-wide master site discovery
//! 3. Per-cell-type pileup quantification with germline and splice-junction
//!    exclusion
//! 4. Population collation, representative-site selection, rank
//!    normalization, covariate assembly, and FDR correction
//!
//! # Modules
//!
//! - [`site`]: genomic-site value types and QC status vocabularies
//! - [`calls`]: raw caller file parsing (RED-ML, REDItools)
//! - [`consensus`]: two-tool consensus gate
//! - [`aggregate`]: per-individual consensus pivot
//! - [`annotate`]: REDIPortal and functional-region annotation indexes
//! - [`quantify`]: pileup counting, germline and splice-junction exclusion
//! - [`matrix`]: per-individual matrix file contracts
//! - [`collate`]: population-level streaming outer join
//! - [`select`]: representative-site selection
//! - [`normalize`]: inverse normal transformation
//! - [`covariate`]: covariate merging and pruning
//! - [`aei`]: Alu editing index collation
//! - [`fdr`]: Benjamini-Hochberg correction and lead-variant selection
//! - [`core`]: shared errors, filesystem, and tabular I/O helpers

pub mod aei;
pub mod aggregate;
pub mod annotate;
pub mod calls;
pub mod collate;
pub mod consensus;
pub mod core;
pub mod covariate;
pub mod fdr;
pub mod matrix;
pub mod normalize;
pub mod quantify;
pub mod select;
pub mod site;
