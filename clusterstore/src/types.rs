use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle stage of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClusterStatus {
    /// Just created from a pair of items.
    New,
    /// Gained a member or absorbed another cluster.
    Updated,
    /// Not updated within the staleness window.
    Old,
}

impl ClusterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterStatus::New => "NEW",
            ClusterStatus::Updated => "UPDATED",
            ClusterStatus::Old => "OLD",
        }
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An item with its embedding, as handed to the matcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: i64,
    pub embedding: Vec<f32>,
}

/// The working copy of a cluster the matcher keeps in memory.
#[derive(Clone, PartialEq)]
pub struct ClusterState {
    pub id: String,
    pub centroid: Vec<f32>,
    pub count: u64,
}

impl fmt::Debug for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterState")
            .field("id", &self.id)
            .field("count", &self.count)
            .field("centroid_len", &self.centroid.len())
            .finish()
    }
}

/// A cluster as persisted. `centroid` is `None` when the stored value is
/// null or cannot be parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCluster {
    pub cluster_id: String,
    pub centroid: Option<Vec<f32>>,
    pub member_count: u64,
    pub status: ClusterStatus,
    pub updated_at: DateTime<Utc>,
}

/// A stored-versus-actual member count pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountChange {
    pub old: u64,
    pub new: u64,
}

/// Every cluster whose stored count differed from ground truth.
pub type Discrepancies = BTreeMap<String, CountChange>;

/// Result of the bulk recount procedure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcedureResult {
    pub message: String,
    #[serde(default)]
    pub updated_clusters: Vec<String>,
    #[serde(default)]
    pub deleted_clusters: Vec<String>,
    #[serde(default)]
    pub unassigned_items: Vec<i64>,
    #[serde(default)]
    pub discrepancies: Discrepancies,
}

/// Point-in-time counts for operators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub clusters: usize,
    pub new: usize,
    pub updated: usize,
    pub old: usize,
    pub items: usize,
    pub assigned: usize,
    pub unassigned: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        assert_eq!(ClusterStatus::Updated.to_string(), "UPDATED");
        let json = serde_json::to_string(&ClusterStatus::Old).unwrap();
        assert_eq!(json, "\"OLD\"");
    }

    #[test]
    fn test_procedure_result_accepts_sparse_payload() {
        let result: ProcedureResult = serde_json::from_str(
            r#"{"message":"ok","discrepancies":{"c1":{"old":5,"new":2}}}"#,
        )
        .unwrap();
        assert!(result.deleted_clusters.is_empty());
        assert_eq!(result.discrepancies["c1"], CountChange { old: 5, new: 2 });
    }
}
