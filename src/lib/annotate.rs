//! Site annotation: REDIPortal known/novel status and functional-region /
//! gene assignment.
//!
//! Both indexes are built once per stage invocation as explicit immutable
//! values and passed by reference into every annotation call; nothing here is
//! process-global or lazily initialized.

use crate::core::errors::{EdquantError, Result};
use crate::core::io::{get_line_reader, get_reader};
use log::{info, warn};
use rust_lapper::{Interval, Lapper};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::io::BufRead;
use std::path::Path;

/// Whether a site position is present in the REDIPortal known-sites catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RediportalStatus {
    Known,
    Novel,
}

impl fmt::Display for RediportalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RediportalStatus::Known => write!(f, "Known"),
            RediportalStatus::Novel => write!(f, "Novel"),
        }
    }
}

/// Position-membership index over the REDIPortal known-sites BED file.
///
/// BED coordinates are 0-based; the known-site key is `Chr:(Start + 1)` to
/// match the 1-based positions used everywhere else in the pipeline.
#[derive(Debug, Default)]
pub struct RediportalIndex {
    known: FxHashSet<(String, u64)>,
}

impl RediportalIndex {
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading REDIPortal known sites from {}", path.display());
        let reader = get_line_reader(path)?;
        let mut known = FxHashSet::default();
        let mut skipped = 0usize;
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split('\t');
            let chrom = fields.next().unwrap_or("");
            match fields.next().and_then(|s| s.parse::<u64>().ok()) {
                Some(start) if !chrom.is_empty() => {
                    known.insert((normalize_chrom(chrom).to_string(), start + 1));
                }
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!("Skipped {} malformed REDIPortal BED lines", skipped);
        }
        if known.is_empty() {
            return Err(EdquantError::EmptyData(format!(
                "No known sites loaded from {}",
                path.display()
            )));
        }
        info!("Loaded {} REDIPortal known sites", known.len());
        Ok(RediportalIndex { known })
    }

    pub fn status(&self, chrom: &str, pos: u64) -> RediportalStatus {
        if self
            .known
            .contains(&(normalize_chrom(chrom).to_string(), pos))
        {
            RediportalStatus::Known
        } else {
            RediportalStatus::Novel
        }
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

/// Functional region labels, ordered by annotation priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionalRegion {
    Cds,
    Utr3,
    Utr5,
    Exon,
    Other(String),
    Intergenic,
}

impl fmt::Display for FunctionalRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionalRegion::Cds => write!(f, "CDS"),
            FunctionalRegion::Utr3 => write!(f, "UTR3"),
            FunctionalRegion::Utr5 => write!(f, "UTR5"),
            FunctionalRegion::Exon => write!(f, "Exon"),
            FunctionalRegion::Other(raw) => write!(f, "{}", raw),
            FunctionalRegion::Intergenic => write!(f, "Intergenic"),
        }
    }
}

/// A site's functional annotation: region label plus the owning gene symbol
/// (both `Intergenic` when nothing overlaps).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteAnnotation {
    pub region: FunctionalRegion,
    pub gene: String,
}

impl SiteAnnotation {
    fn intergenic() -> Self {
        SiteAnnotation {
            region: FunctionalRegion::Intergenic,
            gene: "Intergenic".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FeatureRecord {
    region: FunctionalRegion,
    gene: String,
}

/// Interval index over genomic features parsed from a GTF.
///
/// Only exon, CDS, and UTR features are retained. When several features
/// overlap a position the priority is CDS > UTR3 > UTR5 > Exon > first other
/// feature; within a class the feature with the lowest start coordinate wins.
pub struct FeatureIndex {
    per_chrom: FxHashMap<String, Lapper<u64, FeatureRecord>>,
}

/// Extract the value of one `key "value";` pair from a GTF attribute column.
pub fn gtf_attribute(attributes: &str, key: &str) -> Option<String> {
    for pair in attributes.split(';') {
        let pair = pair.trim();
        if let Some((name, value)) = pair.split_once(' ') {
            if name == key {
                return Some(value.trim().trim_matches('"').to_string());
            }
        }
    }
    None
}

fn classify_feature(feature_type: &str) -> Option<FunctionalRegion> {
    match feature_type {
        "CDS" => Some(FunctionalRegion::Cds),
        "exon" => Some(FunctionalRegion::Exon),
        "three_prime_utr" => Some(FunctionalRegion::Utr3),
        "five_prime_utr" => Some(FunctionalRegion::Utr5),
        "UTR" => Some(FunctionalRegion::Other("UTR".to_string())),
        other if other.ends_with("_utr") => Some(FunctionalRegion::Other(other.to_string())),
        _ => None,
    }
}

/// Strip a `chr` prefix so GTF, BED, and caller chromosome vocabularies meet
/// on one form.
pub fn normalize_chrom(chrom: &str) -> &str {
    chrom.strip_prefix("chr").unwrap_or(chrom)
}

impl FeatureIndex {
    pub fn from_gtf(path: &Path) -> Result<Self> {
        info!("Loading GTF features from {}", path.display());
        let reader = get_line_reader(path)?;
        let mut raw: FxHashMap<String, Vec<Interval<u64, FeatureRecord>>> = FxHashMap::default();
        let mut count = 0usize;
        for line in reader.lines() {
            let line = line?;
            if line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 9 {
                continue;
            }
            let region = match classify_feature(fields[2]) {
                Some(region) => region,
                None => continue,
            };
            let (start, end) = match (fields[3].parse::<u64>(), fields[4].parse::<u64>()) {
                (Ok(start), Ok(end)) if end >= start => (start, end),
                _ => continue,
            };
            let gene = gtf_attribute(fields[8], "gene_name")
                .or_else(|| gtf_attribute(fields[8], "gene_id"))
                .unwrap_or_else(|| "Unknown".to_string());
            raw.entry(normalize_chrom(fields[0]).to_string())
                .or_default()
                .push(Interval {
                    start,
                    stop: end + 1,
                    val: FeatureRecord { region, gene },
                });
            count += 1;
        }
        if count == 0 {
            return Err(EdquantError::EmptyData(format!(
                "No exon/CDS/UTR features found in {}",
                path.display()
            )));
        }
        info!("Loaded {} GTF features", count);
        let per_chrom = raw
            .into_iter()
            .map(|(chrom, intervals)| (chrom, Lapper::new(intervals)))
            .collect();
        Ok(FeatureIndex { per_chrom })
    }

    /// Annotate a 1-based position with its functional region and gene.
    pub fn annotate(&self, chrom: &str, pos: u64) -> SiteAnnotation {
        let lapper = match self.per_chrom.get(normalize_chrom(chrom)) {
            Some(lapper) => lapper,
            None => return SiteAnnotation::intergenic(),
        };
        let mut cds: Option<&FeatureRecord> = None;
        let mut utr3: Option<&FeatureRecord> = None;
        let mut utr5: Option<&FeatureRecord> = None;
        let mut exon: Option<&FeatureRecord> = None;
        let mut other: Option<&FeatureRecord> = None;
        for hit in lapper.find(pos, pos + 1) {
            let slot = match hit.val.region {
                FunctionalRegion::Cds => &mut cds,
                FunctionalRegion::Utr3 => &mut utr3,
                FunctionalRegion::Utr5 => &mut utr5,
                FunctionalRegion::Exon => &mut exon,
                _ => &mut other,
            };
            if slot.is_none() {
                *slot = Some(&hit.val);
            }
        }
        let best = cds.or(utr3).or(utr5).or(exon).or(other);
        match best {
            Some(record) => SiteAnnotation {
                region: record.region.clone(),
                gene: record.gene.clone(),
            },
            None => SiteAnnotation::intergenic(),
        }
    }
}

/// Position-keyed site-to-gene map, the pre-computed TSV alternative to a
/// full GTF (columns `Chr`, `Pos`, `GeneSymbol`, `FeatureType`).
pub struct GeneMap {
    entries: FxHashMap<(String, u64), SiteAnnotation>,
}

impl GeneMap {
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading gene map from {}", path.display());
        let mut reader = get_reader(path, true, false)?;
        let headers = reader.headers()?.clone();
        let col = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| EdquantError::MissingColumn {
                    column: name.to_string(),
                    path: path.display().to_string(),
                })
        };
        let chrom_idx = col("Chr")?;
        let pos_idx = col("Pos")?;
        let gene_idx = col("GeneSymbol")?;
        let feature_idx = col("FeatureType")?;

        let mut entries = FxHashMap::default();
        for record in reader.records() {
            let record = record?;
            let chrom = record.get(chrom_idx).unwrap_or("");
            let pos = match record.get(pos_idx).and_then(|s| s.parse::<u64>().ok()) {
                Some(pos) => pos,
                None => continue,
            };
            let key = (normalize_chrom(chrom).to_string(), pos);
            // First occurrence wins, matching the de-duplication of the map.
            entries.entry(key).or_insert_with(|| SiteAnnotation {
                region: match record.get(feature_idx).unwrap_or("") {
                    "CDS" => FunctionalRegion::Cds,
                    "UTR3" => FunctionalRegion::Utr3,
                    "UTR5" => FunctionalRegion::Utr5,
                    "Exon" => FunctionalRegion::Exon,
                    other => FunctionalRegion::Other(other.to_string()),
                },
                gene: record.get(gene_idx).unwrap_or("Unknown").to_string(),
            });
        }
        if entries.is_empty() {
            return Err(EdquantError::EmptyData(format!(
                "No entries loaded from gene map {}",
                path.display()
            )));
        }
        Ok(GeneMap { entries })
    }

    pub fn annotate(&self, chrom: &str, pos: u64) -> SiteAnnotation {
        self.entries
            .get(&(normalize_chrom(chrom).to_string(), pos))
            .cloned()
            .unwrap_or_else(SiteAnnotation::intergenic)
    }
}

/// The configured functional-annotation source: a full GTF or a pre-computed
/// site-to-gene TSV.
pub enum FeatureSource {
    Gtf(FeatureIndex),
    Map(GeneMap),
}

impl FeatureSource {
    pub fn annotate(&self, chrom: &str, pos: u64) -> SiteAnnotation {
        match self {
            FeatureSource::Gtf(index) => index.annotate(chrom, pos),
            FeatureSource::Map(map) => map.annotate(chrom, pos),
        }
    }
}
