//! Raw variant-caller output parsing.
//!
//! Two external callers produce the per-cell-type raw call files consumed by
//! the aggregation and discovery stages. RED-ML reports one substitution per
//! row with read counts; REDItools reports a position per row with a
//! space-separated `AllSubs` field that may carry several substitutions and a
//! single `Frequency` shared by all of them. Both are reduced here to a flat
//! stream of [`SiteCall`] records already filtered by the minimum editing
//! level.

use crate::core::errors::{EdquantError, Result};
use crate::core::io::get_reader;
use crate::site::Site;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const REDML_SUFFIX: &str = "_redml_raw.tsv";
pub const REDITOOLS_SUFFIX: &str = "_reditools_raw.tsv";

/// The external caller a raw file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    RedMl,
    RedItools,
}

impl Tool {
    /// Detect the tool from a raw call filename, if it matches either suffix.
    pub fn from_filename(name: &str) -> Option<Tool> {
        if name.ends_with(REDML_SUFFIX) {
            Some(Tool::RedMl)
        } else if name.ends_with(REDITOOLS_SUFFIX) {
            Some(Tool::RedItools)
        } else {
            None
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Tool::RedMl => REDML_SUFFIX,
            Tool::RedItools => REDITOOLS_SUFFIX,
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tool::RedMl => write!(f, "REDML"),
            Tool::RedItools => write!(f, "REDItools"),
        }
    }
}

/// One site observation parsed from a raw call file.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteCall {
    pub site: Site,
    pub edit_level: f64,
}

#[derive(Debug, Deserialize)]
struct RedmlRecord {
    #[serde(rename = "Chr")]
    chrom: String,
    #[serde(rename = "Pos")]
    pos: u64,
    #[serde(rename = "Ref")]
    ref_base: String,
    #[serde(rename = "Alt")]
    alt_base: String,
    #[serde(rename = "VariantReads")]
    variant_reads: f64,
    #[serde(rename = "TotalReads")]
    total_reads: f64,
}

#[derive(Debug, Deserialize)]
struct ReditoolsRecord {
    #[serde(rename = "Region")]
    region: String,
    #[serde(rename = "Position")]
    position: u64,
    #[serde(rename = "Reference")]
    reference: String,
    #[serde(rename = "AllSubs")]
    all_subs: String,
    #[serde(rename = "Frequency")]
    frequency: f64,
}

fn single_base(field: &str, path: &Path) -> Result<char> {
    let mut chars = field.chars();
    match (chars.next(), chars.next()) {
        (Some(base), None) => Ok(base),
        _ => Err(EdquantError::Parse(format!(
            "Expected a single base, got '{}' in {}",
            field,
            path.display()
        ))),
    }
}

/// Read one RED-ML raw call file.
///
/// The editing level is `VariantReads / TotalReads`; rows with zero total
/// reads carry no defined level and are dropped, matching the upstream
/// contract. Rows below `min_edit_level` are filtered here.
pub fn read_redml_calls(path: &Path, min_edit_level: f64) -> Result<Vec<SiteCall>> {
    let mut reader = get_reader(path, true, false)?;
    let mut calls = Vec::new();
    for record in reader.deserialize::<RedmlRecord>() {
        let record = record?;
        if record.total_reads <= 0.0 {
            continue;
        }
        let edit_level = record.variant_reads / record.total_reads;
        if edit_level < min_edit_level {
            continue;
        }
        calls.push(SiteCall {
            site: Site::new(
                record.chrom,
                record.pos,
                single_base(&record.ref_base, path)?,
                single_base(&record.alt_base, path)?,
            ),
            edit_level,
        });
    }
    Ok(calls)
}

/// Explode a REDItools `AllSubs` field (e.g. `"A>G C>T"`, or `"-"` for no
/// substitution) into alternate bases. Entries that are not a three-character
/// `X>Y` form are ignored.
fn explode_substitutions(all_subs: &str) -> Vec<char> {
    if all_subs == "-" {
        return Vec::new();
    }
    all_subs
        .split(' ')
        .filter(|sub| sub.len() == 3 && sub.as_bytes()[1] == b'>')
        .filter_map(|sub| sub.chars().nth(2))
        .collect()
}

/// Read one REDItools raw call file, exploding multi-substitution rows into
/// one [`SiteCall`] per substitution, each carrying the row's frequency as
/// its editing level.
pub fn read_reditools_calls(path: &Path, min_edit_level: f64) -> Result<Vec<SiteCall>> {
    let mut reader = get_reader(path, true, false)?;
    let mut calls = Vec::new();
    for record in reader.deserialize::<ReditoolsRecord>() {
        let record = record?;
        if record.frequency < min_edit_level {
            continue;
        }
        let ref_base = single_base(&record.reference, path)?;
        for alt_base in explode_substitutions(&record.all_subs) {
            calls.push(SiteCall {
                site: Site::new(record.region.clone(), record.position, ref_base, alt_base),
                edit_level: record.frequency,
            });
        }
    }
    Ok(calls)
}

/// Dispatch to the right parser for a discovered raw call file.
pub fn read_raw_calls(path: &Path, tool: Tool, min_edit_level: f64) -> Result<Vec<SiteCall>> {
    match tool {
        Tool::RedMl => read_redml_calls(path, min_edit_level),
        Tool::RedItools => read_reditools_calls(path, min_edit_level),
    }
}

/// A raw call file located on disk, with the metadata encoded in its name.
#[derive(Debug, Clone)]
pub struct RawCallFile {
    pub path: PathBuf,
    pub tool: Tool,
    /// Wildcard segment of the filename: the cell type for per-individual
    /// files, the sample label for project-wide discovery.
    pub label: String,
}

/// Recursively locate one individual's raw call files under
/// `root/<individual_id>/`, expecting names of the form
/// `<individual_id>_<celltype>_<tool>_raw.tsv`.
pub fn discover_individual_call_files(root: &Path, individual_id: &str) -> Result<Vec<RawCallFile>> {
    let subtree = root.join(individual_id);
    if !subtree.is_dir() {
        return Err(EdquantError::FileNotFound(format!(
            "No directory for individual {} under {}",
            individual_id,
            root.display()
        )));
    }
    let prefix = format!("{}_", individual_id);
    let mut files = collect_call_files(&subtree, |name, tool| {
        name.strip_prefix(prefix.as_str())
            .and_then(|rest| rest.strip_suffix(tool.suffix()))
            .map(|cell_type| cell_type.to_string())
    })?;
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Recursively locate every raw call file under `root`, across all
/// individuals, for project-wide site discovery.
pub fn discover_all_call_files(root: &Path) -> Result<Vec<RawCallFile>> {
    let mut files = collect_call_files(root, |name, tool| {
        name.strip_suffix(tool.suffix()).map(|stem| stem.to_string())
    })?;
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn collect_call_files<F>(root: &Path, label: F) -> Result<Vec<RawCallFile>>
where
    F: Fn(&str, Tool) -> Option<String>,
{
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| EdquantError::InvalidInput(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = match entry.file_name().to_str() {
            Some(name) => name,
            None => continue,
        };
        if let Some(tool) = Tool::from_filename(name) {
            if let Some(label) = label(name, tool) {
                files.push(RawCallFile {
                    path: entry.path().to_path_buf(),
                    tool,
                    label,
                });
            }
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_tool_from_filename() {
        assert_eq!(
            Tool::from_filename("IND_0001_Bcell_redml_raw.tsv"),
            Some(Tool::RedMl)
        );
        assert_eq!(
            Tool::from_filename("IND_0001_Bcell_reditools_raw.tsv"),
            Some(Tool::RedItools)
        );
        assert_eq!(Tool::from_filename("IND_0001_Bcell.tsv"), None);
    }

    #[test]
    fn test_explode_substitutions() {
        assert_eq!(explode_substitutions("A>G"), vec!['G']);
        assert_eq!(explode_substitutions("A>G C>T"), vec!['G', 'T']);
        assert!(explode_substitutions("-").is_empty());
        assert!(explode_substitutions("AG").is_empty());
    }

    #[test]
    fn test_read_redml_filters_level_and_zero_depth() {
        let file = write_temp(
            "Chr\tPos\tRef\tAlt\tVariantReads\tTotalReads\n\
             1\t1000\tA\tG\t5\t10\n\
             1\t2000\tA\tG\t1\t100\n\
             1\t3000\tA\tG\t3\t0\n",
        );
        let calls = read_redml_calls(file.path(), 0.1).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].site, Site::new("1", 1000, 'A', 'G'));
        assert!((calls[0].edit_level - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_read_reditools_explodes_multi_substitutions() {
        let file = write_temp(
            "Region\tPosition\tReference\tAllSubs\tFrequency\n\
             1\t1000\tA\tA>G A>C\t0.4\n\
             1\t2000\tT\t-\t0.9\n\
             1\t3000\tT\tT>C\t0.05\n",
        );
        let calls = read_reditools_calls(file.path(), 0.1).unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].site, Site::new("1", 1000, 'A', 'G'));
        assert_eq!(calls[1].site, Site::new("1", 1000, 'A', 'C'));
        assert!((calls[1].edit_level - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_discover_individual_call_files() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("IND_0001").join("P2_calls");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("IND_0001_Bcell_redml_raw.tsv"), "x").unwrap();
        std::fs::write(sub.join("IND_0001_Tcell_reditools_raw.tsv"), "x").unwrap();
        std::fs::write(sub.join("unrelated.tsv"), "x").unwrap();

        let files = discover_individual_call_files(dir.path(), "IND_0001").unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].label, "Bcell");
        assert_eq!(files[0].tool, Tool::RedMl);
        assert_eq!(files[1].label, "Tcell");
        assert_eq!(files[1].tool, Tool::RedItools);
    }
}
