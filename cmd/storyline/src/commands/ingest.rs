//! Loading item embeddings.

use std::fs::File;
use std::io::{self, BufRead, BufReader};

use chrono::{DateTime, Utc};
use clap::Args;
use serde::Deserialize;
use storyline_clusterstore::ClusterStore;
use tracing::warn;

use super::{acquire_lock, get_config, open_store, print_success};
use crate::Cli;

/// Load item embeddings from JSON lines.
///
/// Each line is `{"id": 1, "embedding": [0.1, ...]}` with an optional
/// RFC 3339 `created_at` (default: now). Re-ingesting an id replaces its
/// embedding and keeps its cluster.
#[derive(Args)]
pub struct IngestCommand {
    /// JSON lines file, or - for stdin
    input: String,
}

#[derive(Debug, Deserialize)]
struct IngestRecord {
    id: i64,
    embedding: Vec<f32>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

/// Parses one input line. Blank lines yield `None`.
fn parse_line(line: &str) -> anyhow::Result<Option<IngestRecord>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line)?))
}

impl IngestCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let cfg = get_config(cli)?;
        let Some(_guard) = acquire_lock(&cfg)? else {
            return Ok(());
        };
        let store = open_store(&cfg)?;

        let reader: Box<dyn BufRead> = if self.input == "-" {
            Box::new(BufReader::new(io::stdin()))
        } else {
            Box::new(BufReader::new(File::open(&self.input)?))
        };

        let mut loaded = 0;
        let mut skipped = 0;
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            let record = parse_line(&line).map_err(|e| anyhow::anyhow!("line {}: {e}", n + 1))?;
            let Some(record) = record else {
                continue;
            };
            if record.embedding.is_empty() {
                warn!(item_id = record.id, line = n + 1, "empty embedding, skipping");
                skipped += 1;
                continue;
            }
            store.put_item(
                record.id,
                &record.embedding,
                record.created_at.unwrap_or_else(Utc::now),
            )?;
            loaded += 1;
        }

        print_success(&format!("ingested {loaded} items ({skipped} skipped)"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let r = parse_line(r#"{"id": 7, "embedding": [0.5, -1.0]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(r.id, 7);
        assert_eq!(r.embedding, vec![0.5, -1.0]);
        assert!(r.created_at.is_none());

        let r = parse_line(r#"{"id": 8, "embedding": [1], "created_at": "2024-05-01T12:00:00Z"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(r.created_at.unwrap().to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_parse_line_blank_and_bad() {
        assert!(parse_line("   ").unwrap().is_none());
        assert!(parse_line(r#"{"id": "x"}"#).is_err());
    }
}
