//! KV key layout for the cluster store.
//!
//! ```text
//! cl:{cluster_id}      → msgpack ClusterRecord
//! it:{item_id:020}     → msgpack ItemRecord (assignment + created_at)
//! vec:{item_id:020}    → embedding text, e.g. "[0.1,0.2]"
//! ```
//!
//! Item ids are zero-padded to 20 digits so scans return them in id order.

pub const CLUSTER_PREFIX: &str = "cl:";
pub const ITEM_PREFIX: &str = "it:";
pub const VECTOR_PREFIX: &str = "vec:";

/// Format: "cl:{cluster_id}"
pub fn cluster_key(cluster_id: &str) -> String {
    format!("{CLUSTER_PREFIX}{cluster_id}")
}

/// Format: "it:{item_id:020}"
pub fn item_key(item_id: i64) -> String {
    format!("{ITEM_PREFIX}{item_id:020}")
}

/// Format: "vec:{item_id:020}"
pub fn vector_key(item_id: i64) -> String {
    format!("{VECTOR_PREFIX}{item_id:020}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formats() {
        assert_eq!(cluster_key("abc"), "cl:abc");
        assert_eq!(item_key(42), "it:00000000000000000042");
        assert_eq!(vector_key(42), "vec:00000000000000000042");
    }

    #[test]
    fn test_item_keys_sort_numerically() {
        let k1 = item_key(9);
        let k2 = item_key(10);
        assert!(k1 < k2, "zero-padded ids must sort correctly: {k1} < {k2}");
    }
}
