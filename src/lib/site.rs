//! Core genomic-site value types.
//!
//! A [`Site`] identifies one candidate editing position by
//! (chromosome, position, reference base, alternate base) and serializes as
//! the canonical `Chr:Pos:Ref>Alt` key used in every matrix contract. Keeping
//! the components in a value type (rather than a string key) makes the
//! canonical-change invariant checkable before a site ever enters a matrix
//! and removes the parse-round-trip step from every downstream join.

use crate::core::errors::{EdquantError, Result};
use std::fmt;
use std::str::FromStr;

/// One candidate RNA-editing site.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Site {
    pub chrom: String,
    pub pos: u64,
    pub ref_base: char,
    pub alt_base: char,
}

impl Site {
    pub fn new(chrom: impl Into<String>, pos: u64, ref_base: char, alt_base: char) -> Self {
        Site {
            chrom: chrom.into(),
            pos,
            ref_base: ref_base.to_ascii_uppercase(),
            alt_base: alt_base.to_ascii_uppercase(),
        }
    }

    /// The canonical RNA-editing signature: A>G on the plus strand or its
    /// minus-strand mirror T>C. Every retention path in the pipeline goes
    /// through this predicate.
    pub fn is_canonical(&self) -> bool {
        matches!(
            (self.ref_base, self.alt_base),
            ('A', 'G') | ('T', 'C')
        )
    }

}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}>{}",
            self.chrom, self.pos, self.ref_base, self.alt_base
        )
    }
}

impl FromStr for Site {
    type Err = EdquantError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, ':');
        let chrom = parts.next().unwrap_or("");
        let pos = parts.next().unwrap_or("");
        let change = parts.next().unwrap_or("");
        let (ref_s, alt_s) = change.split_once('>').ok_or_else(|| {
            EdquantError::Parse(format!("Invalid site key (expected Chr:Pos:Ref>Alt): {}", s))
        })?;
        if chrom.is_empty() || ref_s.len() != 1 || alt_s.len() != 1 {
            return Err(EdquantError::Parse(format!(
                "Invalid site key (expected Chr:Pos:Ref>Alt): {}",
                s
            )));
        }
        let pos = pos
            .parse::<u64>()
            .map_err(|_| EdquantError::Parse(format!("Invalid position in site key: {}", s)))?;
        Ok(Site::new(
            chrom,
            pos,
            ref_s.chars().next().unwrap_or('N'),
            alt_s.chars().next().unwrap_or('N'),
        ))
    }
}

/// Cohort-wide QC verdict for a site, recorded in the phase-4 matrix and
/// gating all population-level aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalFilterStatus {
    Pass,
    SjFiltered,
    GermlineSnp,
    GtfError,
    BamError,
}

impl fmt::Display for GlobalFilterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            GlobalFilterStatus::Pass => "PASS",
            GlobalFilterStatus::SjFiltered => "SJ_Filtered",
            GlobalFilterStatus::GermlineSnp => "GermlineSNP",
            GlobalFilterStatus::GtfError => "GTF_Error",
            GlobalFilterStatus::BamError => "BAM_Error",
        };
        write!(f, "{}", token)
    }
}

impl FromStr for GlobalFilterStatus {
    type Err = EdquantError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PASS" => Ok(GlobalFilterStatus::Pass),
            "SJ_Filtered" => Ok(GlobalFilterStatus::SjFiltered),
            "GermlineSNP" => Ok(GlobalFilterStatus::GermlineSnp),
            "GTF_Error" => Ok(GlobalFilterStatus::GtfError),
            "BAM_Error" => Ok(GlobalFilterStatus::BamError),
            other => Err(EdquantError::Parse(format!(
                "Unknown GlobalFilterStatus: {}",
                other
            ))),
        }
    }
}

/// Per-cell-type quantification status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellQc {
    Pass,
    LowCoverage,
    BamError,
}

impl fmt::Display for CellQc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            CellQc::Pass => "PASS",
            CellQc::LowCoverage => "LowCoverage",
            CellQc::BamError => "BAM_Error",
        };
        write!(f, "{}", token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_display_round_trip() {
        let site = Site::new("1", 1000, 'A', 'G');
        assert_eq!(site.to_string(), "1:1000:A>G");
        assert_eq!("1:1000:A>G".parse::<Site>().unwrap(), site);
    }

    #[test]
    fn test_site_parse_rejects_malformed() {
        assert!("1:1000".parse::<Site>().is_err());
        assert!("1:xyz:A>G".parse::<Site>().is_err());
        assert!("1:1000:AG".parse::<Site>().is_err());
        assert!(":1000:A>G".parse::<Site>().is_err());
    }

    #[test]
    fn test_canonical_signature() {
        assert!(Site::new("1", 1, 'A', 'G').is_canonical());
        assert!(Site::new("1", 1, 'T', 'C').is_canonical());
        assert!(!Site::new("1", 1, 'C', 'T').is_canonical());
        assert!(!Site::new("1", 1, 'G', 'A').is_canonical());
        assert!(!Site::new("1", 1, 'A', 'C').is_canonical());
    }

    #[test]
    fn test_site_ordering_is_total() {
        let mut sites = vec![
            Site::new("2", 5, 'A', 'G'),
            Site::new("1", 10, 'T', 'C'),
            Site::new("1", 2, 'A', 'G'),
        ];
        sites.sort();
        assert_eq!(sites[0].to_string(), "1:2:A>G");
        assert_eq!(sites[1].to_string(), "1:10:T>C");
        assert_eq!(sites[2].to_string(), "2:5:A>G");
    }

    #[test]
    fn test_status_tokens_round_trip() {
        for status in [
            GlobalFilterStatus::Pass,
            GlobalFilterStatus::SjFiltered,
            GlobalFilterStatus::GermlineSnp,
            GlobalFilterStatus::GtfError,
            GlobalFilterStatus::BamError,
        ] {
            let token = status.to_string();
            assert_eq!(token.parse::<GlobalFilterStatus>().unwrap(), status);
        }
    }
}
