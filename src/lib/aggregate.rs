//! Per-individual aggregation: reduce one individual's raw caller
//! observations to a consensus-filtered Site × CellType matrix of raw
//! editing levels.

use crate::calls::Tool;
use crate::consensus::consensus_sites;
use crate::site::Site;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};

/// One raw observation attributed to a cell type and tool.
#[derive(Debug, Clone)]
pub struct CellObservation {
    pub site: Site,
    pub cell_type: String,
    pub tool: Tool,
    pub edit_level: f64,
}

/// The pivoted per-individual matrix: consensus sites × sorted cell types,
/// unobserved cells filled 0.0.
#[derive(Debug, Default)]
pub struct IndividualMatrix {
    pub cell_types: Vec<String>,
    pub rows: BTreeMap<Site, Vec<f64>>,
}

/// Apply the per-individual two-tool consensus gate and pivot to wide form.
///
/// When both tools report the same (site, cell type) the recorded level is
/// their mean, so each tool's observation contributes to the value.
pub fn pivot_consensus_matrix(observations: &[CellObservation]) -> IndividualMatrix {
    let consensus = consensus_sites(
        observations
            .iter()
            .map(|obs| (obs.site.clone(), obs.tool)),
    );
    if consensus.is_empty() {
        return IndividualMatrix::default();
    }

    let cell_types: Vec<String> = observations
        .iter()
        .filter(|obs| consensus.contains(&obs.site))
        .map(|obs| obs.cell_type.clone())
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect();
    let column: FxHashMap<&str, usize> = cell_types
        .iter()
        .enumerate()
        .map(|(idx, ct)| (ct.as_str(), idx))
        .collect();

    let mut sums: BTreeMap<Site, Vec<(f64, u32)>> = consensus
        .iter()
        .map(|site| (site.clone(), vec![(0.0, 0); cell_types.len()]))
        .collect();
    for obs in observations {
        if let Some(row) = sums.get_mut(&obs.site) {
            if let Some(&idx) = column.get(obs.cell_type.as_str()) {
                row[idx].0 += obs.edit_level;
                row[idx].1 += 1;
            }
        }
    }

    let rows = sums
        .into_iter()
        .map(|(site, cells)| {
            let levels = cells
                .into_iter()
                .map(|(sum, count)| if count > 0 { sum / count as f64 } else { 0.0 })
                .collect();
            (site, levels)
        })
        .collect();
    IndividualMatrix { cell_types, rows }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(site: &str, cell_type: &str, tool: Tool, level: f64) -> CellObservation {
        CellObservation {
            site: site.parse().unwrap(),
            cell_type: cell_type.to_string(),
            tool,
            edit_level: level,
        }
    }

    #[test]
    fn test_consensus_site_keeps_both_levels() {
        // Two files report 1:1000:A>G at 0.5 from each tool; a third site is
        // seen by one tool only and must be excluded.
        let observations = vec![
            obs("1:1000:A>G", "Bcell", Tool::RedMl, 0.5),
            obs("1:1000:A>G", "Tcell", Tool::RedItools, 0.5),
            obs("1:9999:A>G", "Bcell", Tool::RedMl, 0.8),
        ];
        let matrix = pivot_consensus_matrix(&observations);
        assert_eq!(matrix.rows.len(), 1);
        assert_eq!(matrix.cell_types, vec!["Bcell", "Tcell"]);
        let site: Site = "1:1000:A>G".parse().unwrap();
        // Both edit levels are recorded, one per cell-type column.
        assert_eq!(matrix.rows[&site], vec![0.5, 0.5]);
    }

    #[test]
    fn test_same_cell_type_from_both_tools_averages() {
        let observations = vec![
            obs("1:1000:A>G", "Bcell", Tool::RedMl, 0.4),
            obs("1:1000:A>G", "Bcell", Tool::RedItools, 0.6),
        ];
        let matrix = pivot_consensus_matrix(&observations);
        let site: Site = "1:1000:A>G".parse().unwrap();
        assert_eq!(matrix.rows[&site], vec![0.5]);
    }

    #[test]
    fn test_unobserved_cells_fill_zero() {
        let observations = vec![
            obs("1:1000:A>G", "Bcell", Tool::RedMl, 0.5),
            obs("1:1000:A>G", "Bcell", Tool::RedItools, 0.5),
            obs("1:2000:T>C", "Tcell", Tool::RedMl, 0.3),
            obs("1:2000:T>C", "Tcell", Tool::RedItools, 0.3),
        ];
        let matrix = pivot_consensus_matrix(&observations);
        let first: Site = "1:1000:A>G".parse().unwrap();
        let second: Site = "1:2000:T>C".parse().unwrap();
        assert_eq!(matrix.rows[&first], vec![0.5, 0.0]);
        assert_eq!(matrix.rows[&second], vec![0.0, 0.3]);
    }

    #[test]
    fn test_no_consensus_yields_empty_matrix() {
        let observations = vec![obs("1:1000:A>G", "Bcell", Tool::RedMl, 0.5)];
        let matrix = pivot_consensus_matrix(&observations);
        assert!(matrix.rows.is_empty());
        assert!(matrix.cell_types.is_empty());
    }
}
