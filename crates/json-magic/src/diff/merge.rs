use serde::Serialize;

use super::DiffEntry;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MergeResult {
    /// Entries from both sides that can be applied together, left first.
    pub diffs: Vec<DiffEntry>,
    /// Clusters of entries that touch the same subtree differently, as
    /// `(left, right)` pairs.
    pub conflicts: Vec<(Vec<DiffEntry>, Vec<DiffEntry>)>,
}

/// Combines two diffs taken against the same base.
///
/// Two entries conflict when one target path is a prefix of the other (or
/// they are equal) and the changes differ. Conflicting entries are clustered
/// transitively; identical changes on both sides are kept once.
pub fn merge(left: &[DiffEntry], right: &[DiffEntry]) -> MergeResult {
    let left_paths: Vec<_> = left.iter().map(DiffEntry::target_path).collect();
    let right_paths: Vec<_> = right.iter().map(DiffEntry::target_path).collect();

    let duplicate: Vec<bool> = right
        .iter()
        .map(|r| left.iter().any(|l| l.same_change(r)))
        .collect();

    let related = |a: &[String], b: &[String]| a.starts_with(b) || b.starts_with(a);
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); left.len()];
    for (li, l) in left.iter().enumerate() {
        for (ri, r) in right.iter().enumerate() {
            if !duplicate[ri] && !l.same_change(r) && related(&left_paths[li], &right_paths[ri]) {
                edges[li].push(ri);
            }
        }
    }

    let mut left_cluster: Vec<Option<usize>> = vec![None; left.len()];
    let mut right_cluster: Vec<Option<usize>> = vec![None; right.len()];
    let mut clusters = 0;
    for start in 0..left.len() {
        if left_cluster[start].is_some() || edges[start].is_empty() {
            continue;
        }
        let id = clusters;
        clusters += 1;
        let mut stack = vec![start];
        left_cluster[start] = Some(id);
        while let Some(li) = stack.pop() {
            for &ri in &edges[li] {
                if right_cluster[ri].is_some() {
                    continue;
                }
                right_cluster[ri] = Some(id);
                for (other, links) in edges.iter().enumerate() {
                    if left_cluster[other].is_none() && links.contains(&ri) {
                        left_cluster[other] = Some(id);
                        stack.push(other);
                    }
                }
            }
        }
    }

    let mut result = MergeResult {
        diffs: Vec::new(),
        conflicts: vec![(Vec::new(), Vec::new()); clusters],
    };
    for (entry, cluster) in left.iter().zip(&left_cluster) {
        match cluster {
            Some(id) => result.conflicts[*id].0.push(entry.clone()),
            None => result.diffs.push(entry.clone()),
        }
    }
    for ((entry, cluster), dup) in right.iter().zip(&right_cluster).zip(&duplicate) {
        match cluster {
            Some(id) => result.conflicts[*id].1.push(entry.clone()),
            None if !dup => result.diffs.push(entry.clone()),
            None => {}
        }
    }
    result
}
