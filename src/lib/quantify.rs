//! Per-cell-type quantification support: splice-junction proximity index,
//! germline-variant exclusion set, and BAM pileup counting at single sites.
//!
//! The indexes are constructed once per stage invocation and passed by
//! reference into every call; their lifetime is the stage run, never the
//! process.

use crate::core::errors::{EdquantError, Result};
use crate::core::io::get_line_reader;
use crate::site::{CellQc, Site};
use log::{info, warn};
use rust_htslib::bam::{self, Read as BamRead};
use rust_htslib::bcf::record::GenotypeAllele;
use rust_htslib::bcf::{self, Read as BcfRead};
use rustc_hash::{FxHashMap, FxHashSet};
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::annotate::normalize_chrom;

/// Sentinel distance reported when a chromosome carries no known junction.
pub const NO_JUNCTION_DISTANCE: u64 = 9999;

const PILEUP_MAX_DEPTH: u32 = 100_000;

/// Sorted exon-boundary coordinates per chromosome, for splice-junction
/// proximity checks.
pub struct SpliceJunctionIndex {
    boundaries: FxHashMap<String, Vec<u64>>,
}

impl SpliceJunctionIndex {
    /// Collect every exon start/end from a GTF (gzip-optional).
    pub fn from_gtf(path: &Path) -> Result<Self> {
        info!(
            "Loading splice junction coordinates from {}",
            path.display()
        );
        let reader = get_line_reader(path)?;
        let mut boundaries: FxHashMap<String, Vec<u64>> = FxHashMap::default();
        for line in reader.lines() {
            let line = line?;
            if line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 9 || fields[2] != "exon" {
                continue;
            }
            if let (Ok(start), Ok(end)) = (fields[3].parse::<u64>(), fields[4].parse::<u64>()) {
                let entry = boundaries
                    .entry(normalize_chrom(fields[0]).to_string())
                    .or_default();
                entry.push(start);
                entry.push(end);
            }
        }
        if boundaries.is_empty() {
            return Err(EdquantError::EmptyData(format!(
                "No exon records found in {}",
                path.display()
            )));
        }
        for coords in boundaries.values_mut() {
            coords.sort_unstable();
            coords.dedup();
        }
        info!(
            "Indexed junctions for {} chromosomes",
            boundaries.len()
        );
        Ok(SpliceJunctionIndex { boundaries })
    }

    /// Distance from a position to the nearest exon boundary on its
    /// chromosome, or `None` when the chromosome has no junctions.
    pub fn min_distance(&self, chrom: &str, pos: u64) -> Option<u64> {
        let coords = self.boundaries.get(normalize_chrom(chrom))?;
        let idx = coords.partition_point(|&b| b < pos);
        let mut best: Option<u64> = None;
        if idx < coords.len() {
            best = Some(coords[idx] - pos);
        }
        if idx > 0 {
            let below = pos - coords[idx - 1];
            best = Some(best.map_or(below, |b| b.min(below)));
        }
        best
    }
}

/// The set of germline variant sites for one individual, scanned once from
/// the germline VCF.
///
/// A VCF record marks its (Chr, Pos, Ref, Alt) combinations germline when the
/// individual's genotype is heterozygous or homozygous-alternate
/// ((0,1), (1,0), or (1,1)); every single-base alternate allele of a
/// qualifying record is marked.
pub struct GermlineSet {
    sites: FxHashSet<Site>,
}

fn allele_index(allele: &GenotypeAllele) -> Option<i32> {
    match allele {
        GenotypeAllele::Unphased(i) | GenotypeAllele::Phased(i) => Some(*i),
        _ => None,
    }
}

fn is_germline_genotype(indices: &[i32]) -> bool {
    matches!(indices, [0, 1] | [1, 0] | [1, 1])
}

impl GermlineSet {
    pub fn from_vcf(path: &Path, individual_id: &str) -> Result<Self> {
        info!(
            "Scanning germline VCF {} for sample {}",
            path.display(),
            individual_id
        );
        let mut reader = bcf::Reader::from_path(path)?;
        let header = reader.header().clone();
        let sample_idx = header
            .samples()
            .iter()
            .position(|s| *s == individual_id.as_bytes())
            .ok_or_else(|| {
                EdquantError::InvalidInput(format!(
                    "Sample {} not present in {}",
                    individual_id,
                    path.display()
                ))
            })?;

        let mut sites = FxHashSet::default();
        let mut unparsable = 0usize;
        for result in reader.records() {
            let record = match result {
                Ok(record) => record,
                Err(_) => {
                    unparsable += 1;
                    continue;
                }
            };
            let chrom = match record.rid().and_then(|rid| header.rid2name(rid).ok()) {
                Some(name) => String::from_utf8_lossy(name).to_string(),
                None => {
                    unparsable += 1;
                    continue;
                }
            };
            let genotypes = match record.genotypes() {
                Ok(genotypes) => genotypes,
                Err(_) => {
                    unparsable += 1;
                    continue;
                }
            };
            let indices: Vec<i32> = genotypes
                .get(sample_idx)
                .iter()
                .filter_map(allele_index)
                .collect();
            if !is_germline_genotype(&indices) {
                continue;
            }
            let pos = record.pos() as u64 + 1;
            let alleles = record.alleles();
            if alleles.len() < 2 || alleles[0].len() != 1 {
                continue;
            }
            let ref_base = alleles[0][0] as char;
            for alt in &alleles[1..] {
                if alt.len() == 1 {
                    sites.insert(Site::new(
                        normalize_chrom(&chrom),
                        pos,
                        ref_base,
                        alt[0] as char,
                    ));
                }
            }
        }
        if unparsable > 0 {
            warn!("Skipped {} unparsable VCF records", unparsable);
        }
        info!("Loaded {} germline SNP sites", sites.len());
        Ok(GermlineSet { sites })
    }

    pub fn contains(&self, site: &Site) -> bool {
        let normalized = Site::new(
            normalize_chrom(&site.chrom),
            site.pos,
            site.ref_base,
            site.alt_base,
        );
        self.sites.contains(&normalized)
    }

    #[cfg(test)]
    fn from_sites(sites: FxHashSet<Site>) -> Self {
        GermlineSet { sites }
    }
}

/// One cell-type BAM resolved from the input directory.
#[derive(Debug, Clone)]
pub struct CellTypeBam {
    pub cell_type: String,
    pub path: PathBuf,
}

/// Resolve the per-cell-type BAMs in `dir` matching a single-`*` pattern.
/// The cell-type id is the last `_`-separated segment of the file stem.
pub fn discover_cell_type_bams(
    dir: &Path,
    pattern: &crate::core::fs::FilePattern,
) -> Result<Vec<CellTypeBam>> {
    let paths = crate::core::fs::find_matching_files(dir, pattern)?;
    let mut bams = Vec::new();
    for path in paths {
        let stem = match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem,
            None => continue,
        };
        let cell_type = stem.rsplit('_').next().unwrap_or(stem).to_string();
        bams.push(CellTypeBam { cell_type, path });
    }
    if bams.is_empty() {
        return Err(EdquantError::FileNotFound(format!(
            "No BAM files found in {}",
            dir.display()
        )));
    }
    Ok(bams)
}

/// Read counts for one site in one cell-type BAM.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteQuant {
    pub total_reads: u32,
    pub variant_reads: u32,
    /// Masked to `None` below the coverage threshold or on BAM failure.
    pub editing_ratio: Option<f64>,
    pub qc: CellQc,
}

impl SiteQuant {
    fn bam_error() -> Self {
        SiteQuant {
            total_reads: 0,
            variant_reads: 0,
            editing_ratio: None,
            qc: CellQc::BamError,
        }
    }
}

/// Pileup one site and count total/alt reads.
///
/// Deletions and reference skips do not contribute alt evidence; total depth
/// is the pileup column depth. Below `min_coverage` the ratio is masked, not
/// an error.
pub fn quantify_site(
    bam: &mut bam::IndexedReader,
    site: &Site,
    min_coverage: u32,
) -> SiteQuant {
    let start = site.pos.saturating_sub(1) as i64;
    if let Err(err) = bam.fetch((site.chrom.as_str(), start, site.pos as i64)) {
        warn!("Failed to fetch {} from BAM: {}", site, err);
        return SiteQuant::bam_error();
    }

    let mut total_reads = 0u32;
    let mut variant_reads = 0u32;
    let alt = site.alt_base as u8;
    let mut pileups = bam.pileup();
    pileups.set_max_depth(PILEUP_MAX_DEPTH);
    for result in pileups {
        let pileup = match result {
            Ok(pileup) => pileup,
            Err(err) => {
                warn!("Pileup failed at {}: {}", site, err);
                return SiteQuant::bam_error();
            }
        };
        if pileup.pos() as u64 != site.pos - 1 {
            continue;
        }
        total_reads = pileup.depth();
        for alignment in pileup.alignments() {
            if alignment.is_del() || alignment.is_refskip() {
                continue;
            }
            if let Some(qpos) = alignment.qpos() {
                let record = alignment.record();
                if record.seq()[qpos].to_ascii_uppercase() == alt {
                    variant_reads += 1;
                }
            }
        }
        break;
    }

    if total_reads < min_coverage {
        return SiteQuant {
            total_reads,
            variant_reads,
            editing_ratio: None,
            qc: CellQc::LowCoverage,
        };
    }
    SiteQuant {
        total_reads,
        variant_reads,
        editing_ratio: Some(variant_reads as f64 / total_reads as f64),
        qc: CellQc::Pass,
    }
}
