//! Two-tool consensus filtering.
//!
//! A site survives iff both RED-ML and REDItools observed it within the scope
//! of the invocation. The scope is whatever the caller feeds in: one
//! individual's calls for per-individual aggregation, the whole cohort's
//! calls for project-wide master discovery. Single-tool sites are permanently
//! dropped at this gate.

use crate::calls::Tool;
use crate::site::Site;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

const REDML_BIT: u8 = 0b01;
const REDITOOLS_BIT: u8 = 0b10;

fn tool_bit(tool: Tool) -> u8 {
    match tool {
        Tool::RedMl => REDML_BIT,
        Tool::RedItools => REDITOOLS_BIT,
    }
}

/// Compute the set of sites observed by both tools.
///
/// The returned set is ordered by the site's total order so every consumer
/// iterates deterministically.
pub fn consensus_sites<I>(observations: I) -> BTreeSet<Site>
where
    I: IntoIterator<Item = (Site, Tool)>,
{
    let mut seen: FxHashMap<Site, u8> = FxHashMap::default();
    for (site, tool) in observations {
        *seen.entry(site).or_insert(0) |= tool_bit(tool);
    }
    seen.into_iter()
        .filter(|(_, bits)| *bits == REDML_BIT | REDITOOLS_BIT)
        .map(|(site, _)| site)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_tools_required() {
        let a = Site::new("1", 1000, 'A', 'G');
        let b = Site::new("1", 2000, 'T', 'C');
        let consensus = consensus_sites(vec![
            (a.clone(), Tool::RedMl),
            (a.clone(), Tool::RedItools),
            (b.clone(), Tool::RedMl),
        ]);
        assert!(consensus.contains(&a));
        assert!(!consensus.contains(&b));
        assert_eq!(consensus.len(), 1);
    }

    #[test]
    fn test_repeat_observations_by_one_tool_do_not_count() {
        let a = Site::new("1", 1000, 'A', 'G');
        let consensus = consensus_sites(vec![
            (a.clone(), Tool::RedMl),
            (a.clone(), Tool::RedMl),
            (a.clone(), Tool::RedMl),
        ]);
        assert!(consensus.is_empty());
    }

    #[test]
    fn test_consensus_across_cell_types() {
        // Tool membership is tracked per site, not per (site, cell type);
        // observations from different files still make consensus.
        let a = Site::new("1", 1000, 'A', 'G');
        let consensus = consensus_sites(vec![
            (a.clone(), Tool::RedItools),
            (a.clone(), Tool::RedMl),
        ]);
        assert_eq!(consensus.len(), 1);
    }
}
