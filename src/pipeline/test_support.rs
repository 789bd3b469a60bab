//! Fixtures and collaborator mocks for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

use super::{ImageRef, MonsterRecord, PipelineMetrics};
use crate::error::{PersistenceError, StorageError, UpstreamError};
use crate::inference::{
    Analysis, ImageAnalyzer, ImageSynthesizer, SpeechSynthesizer, SubAttribute,
    SynthesizedAudio, SynthesizedImage,
};
use crate::storage::{BlobStore, RecordStore, ScanCounters};

/// PNG signature followed by a few payload bytes.
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 7, 7, 7, 7];

pub fn sample_analysis() -> Analysis {
    Analysis {
        name: "Mugmaw".to_string(),
        source_label: "coffee mug".to_string(),
        tags: ["fire".to_string(), "ceramic".to_string()],
        narrative: "A sleepy beast that hoards warmth.".to_string(),
        sub_attributes: vec![SubAttribute {
            name: "Scald".to_string(),
            score: 80,
            description: "Spits hot coffee".to_string(),
        }],
    }
}

pub fn sample_record(session_id: &str) -> MonsterRecord {
    MonsterRecord {
        id: Uuid::new_v4(),
        session_id: session_id.to_string(),
        attributes: sample_analysis(),
        image: ImageRef::Embedded {
            data_uri: "data:image/png;base64,AA==".to_string(),
        },
        source_image_url: None,
        audio_url: None,
        created_at: Utc::now(),
        metrics: PipelineMetrics::new("0123456789abcdef"),
    }
}

pub struct MockAnalyzer {
    calls: AtomicUsize,
    fail_first: usize,
    delay: Option<Duration>,
}

impl MockAnalyzer {
    pub fn new() -> Self {
        Self::failing(0)
    }

    /// Fails the first `fail_first` calls with a transient error.
    pub fn failing(fail_first: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_first,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageAnalyzer for MockAnalyzer {
    async fn analyze(&self, _image: &[u8], _mime_type: &str) -> Result<Analysis, UpstreamError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if n < self.fail_first {
            return Err(UpstreamError::Status {
                status: 503,
                body: "overloaded".to_string(),
            });
        }
        Ok(sample_analysis())
    }

    fn model_id(&self) -> &str {
        "mock-vision"
    }
}

pub struct MockSynthesizer;

impl MockSynthesizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ImageSynthesizer for MockSynthesizer {
    async fn synthesize(&self, _prompt: &str) -> Result<SynthesizedImage, UpstreamError> {
        Ok(SynthesizedImage::from_bytes(PNG_BYTES.to_vec(), None))
    }

    fn model_id(&self) -> &str {
        "mock-painter"
    }
}

pub struct MockSpeech {
    fail: bool,
}

impl MockSpeech {
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSpeech {
    async fn synthesize_speech(&self, _text: &str) -> Result<SynthesizedAudio, UpstreamError> {
        if self.fail {
            return Err(UpstreamError::Request("connection reset".to_string()));
        }
        Ok(SynthesizedAudio {
            bytes: Bytes::from_static(b"ID3"),
            mime_type: "audio/mpeg".to_string(),
        })
    }

    fn model_id(&self) -> &str {
        "mock-voice"
    }
}

/// Blob store whose every upload fails.
#[derive(Default)]
pub struct FailingBlobStore {
    uploads: AtomicUsize,
}

impl FailingBlobStore {
    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn upload(&self, _data: Bytes, _path: &str, _ct: &str) -> Result<String, StorageError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::S3("bucket unavailable".to_string()))
    }

    async fn signed_url(&self, path: &str, _ttl: Duration) -> Result<String, StorageError> {
        Err(StorageError::NotFound(path.to_string()))
    }
}

/// Record store that cannot write.
pub struct FailingRecordStore;

#[async_trait]
impl RecordStore for FailingRecordStore {
    async fn save_record(&self, _record: &MonsterRecord) -> Result<(), PersistenceError> {
        Err(PersistenceError::Backend("disk full".to_string()))
    }

    async fn list_records(
        &self,
        _session_id: &str,
    ) -> Result<Vec<MonsterRecord>, PersistenceError> {
        Ok(Vec::new())
    }

    async fn increment_counters(
        &self,
        _session_id: &str,
    ) -> Result<ScanCounters, PersistenceError> {
        Ok(ScanCounters::default())
    }

    async fn counters(&self) -> Result<ScanCounters, PersistenceError> {
        Ok(ScanCounters::default())
    }
}

/// Memory record store whose reads stall after taking their snapshot.
pub struct SlowListStore {
    inner: crate::storage::MemoryRecordStore,
    delay: Duration,
    pub listed: tokio::sync::Notify,
}

impl SlowListStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: crate::storage::MemoryRecordStore::new(),
            delay,
            listed: tokio::sync::Notify::new(),
        }
    }
}

#[async_trait]
impl RecordStore for SlowListStore {
    async fn save_record(&self, record: &MonsterRecord) -> Result<(), PersistenceError> {
        self.inner.save_record(record).await
    }

    async fn list_records(&self, session_id: &str) -> Result<Vec<MonsterRecord>, PersistenceError> {
        let snapshot = self.inner.list_records(session_id).await?;
        self.listed.notify_one();
        tokio::time::sleep(self.delay).await;
        Ok(snapshot)
    }

    async fn increment_counters(&self, session_id: &str) -> Result<ScanCounters, PersistenceError> {
        self.inner.increment_counters(session_id).await
    }

    async fn counters(&self) -> Result<ScanCounters, PersistenceError> {
        self.inner.counters().await
    }
}
