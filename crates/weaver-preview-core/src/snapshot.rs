//! Local session snapshot, persisted so a reload can resume where the user
//! left off.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::SnapshotError;
use crate::types::Position;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub doc_name: SmolStr,
    pub edit_name: SmolStr,
    pub position: Position,
    /// Storage state as produced by the remote's `persist`.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub storage: serde_json::Value,
}

impl SessionSnapshot {
    /// Serialize, falling back to `minimal()` when the result exceeds `limit`
    /// bytes. Fails only if the fallback is too large as well.
    pub fn encode_capped(
        &self,
        limit: usize,
        minimal: impl FnOnce() -> SessionSnapshot,
    ) -> Result<String, SnapshotError> {
        let full = serde_json::to_string(self).map_err(SnapshotError::Encode)?;
        if full.len() <= limit {
            return Ok(full);
        }
        tracing::debug!(size = full.len(), limit, "snapshot over limit, persisting minimal");
        let fallback = serde_json::to_string(&minimal()).map_err(SnapshotError::Encode)?;
        if fallback.len() <= limit {
            Ok(fallback)
        } else {
            Err(SnapshotError::TooLarge {
                size: fallback.len(),
                limit,
            })
        }
    }

    pub fn decode(data: &str) -> Result<Self, SnapshotError> {
        serde_json::from_str(data).map_err(SnapshotError::Decode)
    }
}
