use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

/// One persisted blink-count snapshot. Rows are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: u64,
    pub timestamp: String,
    pub blink_count: u64,
}

impl Store {
    /// Append a snapshot under the next auto-assigned id.
    pub fn record_blink_snapshot(
        &self,
        blink_count: u64,
        timestamp: &str,
    ) -> Result<MetricRecord, StoreError> {
        if timestamp.trim().is_empty() {
            return Err(StoreError::Validation("timestamp must not be empty".into()));
        }

        // generate_id 从 0 开始，+1 与自增主键保持一致
        let id = self.raw_db().generate_id()? + 1;
        let record = MetricRecord {
            id,
            timestamp: timestamp.to_string(),
            blink_count,
        };
        self.metrics
            .insert(keys::metric_key(id), Self::serialize(&record)?)?;
        Ok(record)
    }

    /// Newest first by id.
    pub fn recent_blink_snapshots(&self, limit: usize) -> Result<Vec<MetricRecord>, StoreError> {
        let mut rows = Vec::with_capacity(limit.min(64));
        for item in self.metrics.iter().rev() {
            if rows.len() >= limit {
                break;
            }
            let (_, raw) = item?;
            rows.push(Self::deserialize::<MetricRecord>(&raw)?);
        }
        Ok(rows)
    }

    pub fn count_blink_snapshots(&self) -> usize {
        self.metrics.len()
    }
}
