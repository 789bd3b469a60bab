use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Stage;
use crate::inference::Analysis;

/// The persisted outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonsterRecord {
    pub id: Uuid,
    pub session_id: String,
    pub attributes: Analysis,
    pub image: ImageRef,

    /// Signed URL of the staged source photo, when staging succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image_url: Option<String>,

    /// Signed URL of the narration audio, when narration succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,

    pub created_at: DateTime<Utc>,
    pub metrics: PipelineMetrics,
}

/// Where the generated image can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageRef {
    /// Signed URL into the blob store
    Url { url: String },

    /// Inline `data:` URI, used when the blob store was unavailable
    Embedded { data_uri: String },
}

impl ImageRef {
    pub fn is_embedded(&self) -> bool {
        matches!(self, ImageRef::Embedded { .. })
    }

    /// The URL or data URI, whichever this is.
    pub fn as_str(&self) -> &str {
        match self {
            ImageRef::Url { url } => url,
            ImageRef::Embedded { data_uri } => data_uri,
        }
    }
}

/// Timing and provenance of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMetrics {
    /// Milliseconds spent per stage, keyed by stage name
    pub stage_latencies_ms: BTreeMap<String, u64>,

    /// Model identifier per collaborator role
    pub model_identifiers: BTreeMap<String, String>,

    /// Content fingerprint the record is cached under
    pub fingerprint: String,
}

impl PipelineMetrics {
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            ..Self::default()
        }
    }

    pub fn record_latency(&mut self, stage: Stage, elapsed_ms: u64) {
        self.stage_latencies_ms
            .insert(stage.as_str().to_string(), elapsed_ms);
    }

    pub fn record_model(&mut self, role: &str, model_id: &str) {
        self.model_identifiers
            .insert(role.to_string(), model_id.to_string());
    }

    pub fn total_ms(&self) -> u64 {
        self.stage_latencies_ms.values().sum()
    }
}

/// Result of `handle_scan`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResponse {
    pub result: MonsterRecord,

    /// True when the record came from the scan cache
    pub cache_hit: bool,
}

/// Result of `list_records`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionResponse {
    pub session_id: String,

    /// Newest first
    pub records: Vec<MonsterRecord>,

    /// True when the list came from the collection cache
    pub cache_hit: bool,
}
