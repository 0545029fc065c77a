use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::types::{CountChange, Discrepancies};

/// What a member-count recount has to change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecountPlan {
    /// Clusters with two or more members whose stored count is wrong
    /// (or which have no stored record at all).
    pub updates: Vec<(String, u64)>,
    /// Degenerate clusters with exactly one member, paired with that item.
    pub singles: Vec<(String, i64)>,
    /// Stored clusters no item points to.
    pub empties: Vec<String>,
    pub discrepancies: Discrepancies,
}

impl RecountPlan {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.singles.is_empty() && self.empties.is_empty()
    }

    /// Items to unassign from single-member clusters.
    pub fn unassigned_items(&self) -> Vec<i64> {
        self.singles.iter().map(|(_, item)| *item).collect()
    }

    /// Every cluster the plan deletes.
    pub fn deleted_clusters(&self) -> Vec<String> {
        self.singles
            .iter()
            .map(|(cid, _)| cid.clone())
            .chain(self.empties.iter().cloned())
            .collect()
    }
}

/// Compares stored member counts with actual assignments.
///
/// `stored` maps cluster id to its persisted `member_count`;
/// `assignments` lists every `(item_id, cluster_id)` with a non-null
/// assignment. Every id in either set is classified.
pub fn plan_recount(stored: &HashMap<String, u64>, assignments: &[(i64, String)]) -> RecountPlan {
    let mut members: BTreeMap<&str, Vec<i64>> = BTreeMap::new();
    for (item_id, cluster_id) in assignments {
        members.entry(cluster_id.as_str()).or_default().push(*item_id);
    }

    let ids: BTreeSet<&str> = stored
        .keys()
        .map(String::as_str)
        .chain(members.keys().copied())
        .collect();

    let mut plan = RecountPlan::default();
    for cid in ids {
        let old = stored.get(cid).copied().unwrap_or(0);
        let items = members.get(cid).map(Vec::as_slice).unwrap_or(&[]);
        let actual = items.len() as u64;

        if old != actual {
            plan.discrepancies
                .insert(cid.to_string(), CountChange { old, new: actual });
        }

        match items {
            [] => plan.empties.push(cid.to_string()),
            [only] => plan.singles.push((cid.to_string(), *only)),
            _ if actual != old => plan.updates.push((cid.to_string(), actual)),
            _ => {}
        }
    }
    plan
}
