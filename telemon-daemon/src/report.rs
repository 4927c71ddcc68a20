//! JSON report of a finished collection session.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use telemon_core::types::ResultStore;

/// Snapshot plus derived process statistics, serialized as one JSON document.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    /// Number of series in the snapshot.
    pub series: usize,
    /// Total number of stored samples.
    pub samples: usize,
    /// Mean values of the virtual switch / VNF process series.
    pub process_summary: BTreeMap<String, BTreeMap<String, f64>>,
    /// Full snapshot: metric name -> ordered samples.
    pub results: &'a ResultStore,
}

impl<'a> Report<'a> {
    /// Build a report over a finished session's results.
    pub fn new(results: &'a ResultStore) -> Self {
        Self {
            series: results.len(),
            samples: results.sample_count(),
            process_summary: results.process_summary(),
            results,
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("failed to serialize report: {}", e))
    }

    /// Write the report to `output`, or to stdout when no path is given.
    pub fn write(&self, output: Option<&Path>) -> Result<()> {
        let json = self.to_json()?;
        match output {
            Some(path) => {
                std::fs::write(path, json + "\n").map_err(|e| {
                    anyhow::anyhow!("failed to write report to {}: {}", path.display(), e)
                })?;
                tracing::info!(path = %path.display(), "report written");
            }
            None => println!("{json}"),
        }
        Ok(())
    }
}
