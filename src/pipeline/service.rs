//! Scan service orchestrating the monster pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                             ScanService                              │
//! │  handle_scan()                                                       │
//! │   1. Validate         4. Analyze (retry)      7. Persist assets      │
//! │   2. Cache check      5. Synthesize (retry)   8. Persist record      │
//! │   3. Stage photo      6. Narrate (optional)   9. Update caches       │
//! │        │                   │          │             │          │     │
//! │        ▼                   ▼          ▼             ▼          ▼     │
//! │   ┌─────────┐   ┌───────────────┐ ┌──────────┐ ┌─────────┐ ┌───────┐ │
//! │   │BlobStore│   │ ImageAnalyzer │ │  Speech  │ │ Record  │ │  TTL  │ │
//! │   │         │   │ ImageSynth.   │ │  Synth.  │ │  Store  │ │caches │ │
//! │   └─────────┘   └───────────────┘ └──────────┘ └─────────┘ └───────┘ │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Staging, narration and asset persistence are best-effort: their failures
//! are logged and the pipeline continues (assets fall back to an embedded
//! data URI). Analysis, synthesis and record persistence are fatal.
//!
//! Concurrent scans of identical content are coalesced: the first caller runs
//! the pipeline while later callers wait for it and then read the scan cache.
//! If the leader fails, one of the waiters takes over.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::record::{CollectionResponse, ImageRef, MonsterRecord, PipelineMetrics, ScanResponse};
use super::request::{validate_session_id, ScanRequest, DEFAULT_MAX_IMAGE_BYTES};
use super::retry::{retry_with_backoff, RetryPolicy};
use super::stage::{Outcome, Stage, StageTimer};
use crate::cache::{CacheStats, Fingerprinter, TtlCache};
use crate::error::{PersistenceError, ScanError, StorageError, UpstreamError};
use crate::inference::{
    build_image_prompt, build_narration_text, Analysis, ImageAnalyzer, ImageSynthesizer,
    SpeechSynthesizer, SynthesizedImage,
};
use crate::media::{data_uri, detect_image, MediaFormat};
use crate::storage::{
    audio_object_path, monster_object_path, scan_object_path, BlobStore, RecordStore,
    ScanCounters,
};

// =============================================================================
// Defaults
// =============================================================================

/// Default scan-dedup cache capacity.
pub const DEFAULT_SCAN_CACHE_ENTRIES: usize = 256;

/// Default scan-dedup cache TTL (1 hour).
pub const DEFAULT_SCAN_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Default collection-read cache capacity.
pub const DEFAULT_COLLECTION_CACHE_ENTRIES: usize = 1024;

/// Default collection-read cache TTL (1 minute).
pub const DEFAULT_COLLECTION_CACHE_TTL: Duration = Duration::from_secs(60);

pub const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SPEECH_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(15);

/// Default lifetime of signed asset URLs (24 hours).
pub const DEFAULT_SIGNED_URL_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// =============================================================================
// Settings
// =============================================================================

/// Tunables of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Largest accepted image, in bytes (inclusive)
    pub max_image_bytes: usize,

    /// Retry policy for collaborator calls
    pub retry: RetryPolicy,

    pub analysis_timeout: Duration,
    pub synthesis_timeout: Duration,
    pub speech_timeout: Duration,
    pub storage_timeout: Duration,

    /// Lifetime of signed URLs placed in records
    pub signed_url_ttl: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            retry: RetryPolicy::default(),
            analysis_timeout: DEFAULT_ANALYSIS_TIMEOUT,
            synthesis_timeout: DEFAULT_SYNTHESIS_TIMEOUT,
            speech_timeout: DEFAULT_SPEECH_TIMEOUT,
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
            signed_url_ttl: DEFAULT_SIGNED_URL_TTL,
        }
    }
}

/// Snapshot of both caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatsReport {
    pub scan_cache: CacheStats,
    pub collection_cache: CacheStats,
}

// =============================================================================
// In-flight coalescing
// =============================================================================

type InFlightMap = Mutex<HashMap<String, Arc<Notify>>>;

/// Leadership of one fingerprint. Releasing it wakes every waiter.
struct InFlightGuard<'a> {
    in_flight: &'a InFlightMap,
    fingerprint: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock();
        if let Some(notify) = in_flight.remove(&self.fingerprint) {
            notify.notify_waiters();
        }
    }
}

enum Slot<'a> {
    Cached(MonsterRecord),
    Lead(InFlightGuard<'a>),
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`ScanService`].
///
/// ```ignore
/// let service = ScanService::builder()
///     .analyzer(Arc::new(analyzer))
///     .synthesizer(Arc::new(synthesizer))
///     .record_store(Arc::new(MemoryRecordStore::new()))
///     .blob_store(Arc::new(blob_store))
///     .build();
/// ```
#[derive(Default)]
pub struct ScanServiceBuilder {
    analyzer: Option<Arc<dyn ImageAnalyzer>>,
    synthesizer: Option<Arc<dyn ImageSynthesizer>>,
    speech: Option<Arc<dyn SpeechSynthesizer>>,
    blob_store: Option<Arc<dyn BlobStore>>,
    record_store: Option<Arc<dyn RecordStore>>,
    scan_cache: Option<Arc<TtlCache<MonsterRecord>>>,
    collection_cache: Option<Arc<TtlCache<Vec<MonsterRecord>>>>,
    fingerprinter: Fingerprinter,
    settings: PipelineSettings,
}

impl ScanServiceBuilder {
    pub fn analyzer(mut self, analyzer: Arc<dyn ImageAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn synthesizer(mut self, synthesizer: Arc<dyn ImageSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Enables the narration stage.
    pub fn speech_synthesizer(mut self, speech: Arc<dyn SpeechSynthesizer>) -> Self {
        self.speech = Some(speech);
        self
    }

    /// Without a blob store, staging is skipped and images are embedded.
    pub fn blob_store(mut self, blob_store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(blob_store);
        self
    }

    pub fn record_store(mut self, record_store: Arc<dyn RecordStore>) -> Self {
        self.record_store = Some(record_store);
        self
    }

    pub fn scan_cache(mut self, cache: Arc<TtlCache<MonsterRecord>>) -> Self {
        self.scan_cache = Some(cache);
        self
    }

    pub fn collection_cache(mut self, cache: Arc<TtlCache<Vec<MonsterRecord>>>) -> Self {
        self.collection_cache = Some(cache);
        self
    }

    pub fn fingerprinter(mut self, fingerprinter: Fingerprinter) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> ScanService {
        ScanService {
            analyzer: self.analyzer,
            synthesizer: self.synthesizer,
            speech: self.speech,
            blob_store: self.blob_store,
            record_store: self.record_store,
            scan_cache: self.scan_cache.unwrap_or_else(|| {
                Arc::new(TtlCache::new(
                    "scan",
                    DEFAULT_SCAN_CACHE_ENTRIES,
                    DEFAULT_SCAN_CACHE_TTL,
                ))
            }),
            collection_cache: self.collection_cache.unwrap_or_else(|| {
                Arc::new(TtlCache::new(
                    "collection",
                    DEFAULT_COLLECTION_CACHE_ENTRIES,
                    DEFAULT_COLLECTION_CACHE_TTL,
                ))
            }),
            fingerprinter: self.fingerprinter,
            settings: self.settings,
            in_flight: Mutex::new(HashMap::new()),
        }
    }
}

// =============================================================================
// Scan Service
// =============================================================================

/// Orchestrates scans and collection reads.
pub struct ScanService {
    analyzer: Option<Arc<dyn ImageAnalyzer>>,
    synthesizer: Option<Arc<dyn ImageSynthesizer>>,
    speech: Option<Arc<dyn SpeechSynthesizer>>,
    blob_store: Option<Arc<dyn BlobStore>>,
    record_store: Option<Arc<dyn RecordStore>>,
    scan_cache: Arc<TtlCache<MonsterRecord>>,
    collection_cache: Arc<TtlCache<Vec<MonsterRecord>>>,
    fingerprinter: Fingerprinter,
    settings: PipelineSettings,
    in_flight: InFlightMap,
}

/// The fatal collaborators, resolved once per scan.
struct Required<'a> {
    analyzer: &'a dyn ImageAnalyzer,
    synthesizer: &'a dyn ImageSynthesizer,
    record_store: &'a dyn RecordStore,
}

impl ScanService {
    pub fn builder() -> ScanServiceBuilder {
        ScanServiceBuilder::default()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn scan_cache(&self) -> &Arc<TtlCache<MonsterRecord>> {
        &self.scan_cache
    }

    pub fn collection_cache(&self) -> &Arc<TtlCache<Vec<MonsterRecord>>> {
        &self.collection_cache
    }

    /// Run one scan request through the pipeline.
    pub async fn handle_scan(&self, request: ScanRequest) -> Result<ScanResponse, ScanError> {
        let total = StageTimer::start(Stage::Completed, &request.session_id);

        // Validating
        let timer = StageTimer::start(Stage::Validating, &request.session_id);
        if let Err(err) = request.validate(self.settings.max_image_bytes) {
            timer.fail();
            let err = ScanError::from(err);
            log_failure(Stage::Validating, &err, &total);
            return Err(err);
        }
        let validating_ms = timer.finish(Outcome::Ok);
        let session_id = request.session_id.as_str();

        // CacheCheck
        let timer = StageTimer::start(Stage::CacheCheck, session_id);
        let fingerprint = self.fingerprinter.fingerprint(&request.image);
        let guard = match self.claim(&fingerprint, session_id).await {
            Slot::Cached(record) => {
                timer.finish(Outcome::Hit);
                total.finish(Outcome::Hit);
                return Ok(ScanResponse {
                    result: record,
                    cache_hit: true,
                });
            }
            Slot::Lead(guard) => guard,
        };
        let cache_check_ms = timer.finish(Outcome::Miss);

        let required = match self.required() {
            Ok(required) => required,
            Err(err) => {
                log_failure(Stage::CacheCheck, &err, &total);
                return Err(err);
            }
        };

        let mut metrics = PipelineMetrics::new(fingerprint.clone());
        metrics.record_latency(Stage::Validating, validating_ms);
        metrics.record_latency(Stage::CacheCheck, cache_check_ms);

        let result = self
            .run_pipeline(&request, &fingerprint, required, metrics, &total)
            .await;
        drop(guard);

        match result {
            Ok(record) => {
                total.finish(Outcome::Ok);
                Ok(ScanResponse {
                    result: record,
                    cache_hit: false,
                })
            }
            Err((stage, err)) => {
                log_failure(stage, &err, &total);
                Err(err)
            }
        }
    }

    /// Return a cached record, or become the one caller computing it.
    async fn claim(&self, fingerprint: &str, session_id: &str) -> Slot<'_> {
        loop {
            if let Some(record) = self.scan_cache.get(fingerprint) {
                return Slot::Cached(record);
            }

            let waiting_on: Arc<Notify>;
            let mut notified;
            {
                let mut in_flight = self.in_flight.lock();
                match in_flight.get(fingerprint) {
                    Some(notify) => waiting_on = Arc::clone(notify),
                    None => {
                        in_flight.insert(fingerprint.to_string(), Arc::new(Notify::new()));
                        return Slot::Lead(InFlightGuard {
                            in_flight: &self.in_flight,
                            fingerprint: fingerprint.to_string(),
                        });
                    }
                }
                // Register before unlocking so the leader's wakeup cannot be missed
                notified = Box::pin(waiting_on.notified());
                notified.as_mut().enable();
            }

            debug!(fingerprint, session_id, "waiting for in-flight scan");
            notified.await;
        }
    }

    fn required(&self) -> Result<Required<'_>, ScanError> {
        let analyzer = self
            .analyzer
            .as_deref()
            .ok_or(ScanError::ServiceUnavailable {
                collaborator: "image analyzer",
            })?;
        let synthesizer = self
            .synthesizer
            .as_deref()
            .ok_or(ScanError::ServiceUnavailable {
                collaborator: "image synthesizer",
            })?;
        let record_store = self
            .record_store
            .as_deref()
            .ok_or(ScanError::ServiceUnavailable {
                collaborator: "record store",
            })?;
        Ok(Required {
            analyzer,
            synthesizer,
            record_store,
        })
    }

    async fn run_pipeline(
        &self,
        request: &ScanRequest,
        fingerprint: &str,
        required: Required<'_>,
        mut metrics: PipelineMetrics,
        total: &StageTimer<'_>,
    ) -> Result<MonsterRecord, (Stage, ScanError)> {
        let session_id = request.session_id.as_str();
        let record_id = Uuid::new_v4();
        let source_format = detect_image(&request.image);

        // Staging
        let timer = StageTimer::start(Stage::Staging, session_id);
        let source_image_url = match &self.blob_store {
            Some(store) => {
                let path = scan_object_path(session_id, fingerprint, source_format.extension());
                let uploaded = self
                    .store_and_sign(
                        store.as_ref(),
                        request.image.clone(),
                        &path,
                        source_format.mime_type(),
                    )
                    .await;
                match uploaded {
                    Ok(url) => {
                        metrics.record_latency(Stage::Staging, timer.finish(Outcome::Ok));
                        Some(url)
                    }
                    Err(err) => {
                        warn!(
                            session_id,
                            path = %path,
                            error = %err,
                            "staging upload failed, continuing"
                        );
                        metrics.record_latency(Stage::Staging, timer.fail());
                        None
                    }
                }
            }
            None => {
                timer.finish(Outcome::Skipped);
                None
            }
        };

        // Analyzing
        let timer = StageTimer::start(Stage::Analyzing, session_id);
        let analysis = match self
            .analyze(required.analyzer, &request.image, source_format.mime_type())
            .await
        {
            Ok(analysis) => analysis,
            Err(source) => {
                timer.fail();
                return Err((
                    Stage::Analyzing,
                    ScanError::Upstream {
                        stage: Stage::Analyzing,
                        source,
                    },
                ));
            }
        };
        metrics.record_latency(Stage::Analyzing, timer.finish(Outcome::Ok));
        metrics.record_model("analyzer", required.analyzer.model_id());

        // Synthesizing
        let timer = StageTimer::start(Stage::Synthesizing, session_id);
        let prompt = build_image_prompt(&analysis);
        let image = match self.synthesize(required.synthesizer, &prompt).await {
            Ok(image) => image,
            Err(source) => {
                timer.fail();
                return Err((
                    Stage::Synthesizing,
                    ScanError::Upstream {
                        stage: Stage::Synthesizing,
                        source,
                    },
                ));
            }
        };
        metrics.record_latency(Stage::Synthesizing, timer.finish(Outcome::Ok));
        metrics.record_model("synthesizer", required.synthesizer.model_id());

        // Narrating
        let timer = StageTimer::start(Stage::Narrating, session_id);
        let audio_url = match &self.speech {
            Some(speech) => {
                let narrated = self
                    .narrate(speech.as_ref(), &analysis, session_id, record_id)
                    .await;
                match narrated {
                    Ok(url) => {
                        metrics.record_latency(Stage::Narrating, timer.finish(Outcome::Ok));
                        metrics.record_model("speech", speech.model_id());
                        url
                    }
                    Err(err) => {
                        warn!(session_id, error = %err, "narration failed, continuing");
                        metrics.record_latency(Stage::Narrating, timer.fail());
                        None
                    }
                }
            }
            None => {
                timer.finish(Outcome::Skipped);
                None
            }
        };

        // PersistingAssets
        let timer = StageTimer::start(Stage::PersistingAssets, session_id);
        let (image_ref, outcome) = self.persist_image(&image, session_id, record_id).await;
        metrics.record_latency(Stage::PersistingAssets, timer.finish(outcome));

        let record = MonsterRecord {
            id: record_id,
            session_id: session_id.to_string(),
            attributes: analysis,
            image: image_ref,
            source_image_url,
            audio_url,
            created_at: Utc::now(),
            metrics,
        };

        // PersistingRecord
        let timer = StageTimer::start(Stage::PersistingRecord, session_id);
        if let Err(source) = self.save(required.record_store, &record).await {
            timer.fail();
            return Err((
                Stage::PersistingRecord,
                ScanError::RecordNotSaved {
                    source,
                    record: Box::new(record),
                },
            ));
        }
        timer.finish(Outcome::Ok);

        if let Err(err) = required.record_store.increment_counters(session_id).await {
            warn!(session_id, error = %err, "failed to update scan counters");
        }

        // CacheUpdate
        let timer = StageTimer::start(Stage::CacheUpdate, session_id);
        self.scan_cache.set(fingerprint.to_string(), record.clone());
        self.collection_cache.invalidate(session_id);
        timer.finish(Outcome::Ok);

        info!(
            session_id,
            record_id = %record.id,
            name = %record.attributes.name,
            embedded = record.image.is_embedded(),
            elapsed_ms = total.elapsed_ms(),
            stage_ms = record.metrics.total_ms(),
            "scan completed"
        );
        Ok(record)
    }

    async fn analyze(
        &self,
        analyzer: &dyn ImageAnalyzer,
        image: &[u8],
        mime_type: &str,
    ) -> Result<Analysis, UpstreamError> {
        let budget = self.settings.analysis_timeout;
        retry_with_backoff("analyze", &self.settings.retry, || async move {
            let analysis = upstream_call(budget, analyzer.analyze(image, mime_type)).await?;
            analysis.validate()?;
            Ok(analysis)
        })
        .await
    }

    async fn synthesize(
        &self,
        synthesizer: &dyn ImageSynthesizer,
        prompt: &str,
    ) -> Result<SynthesizedImage, UpstreamError> {
        let budget = self.settings.synthesis_timeout;
        retry_with_backoff("synthesize", &self.settings.retry, || async move {
            upstream_call(budget, synthesizer.synthesize(prompt)).await
        })
        .await
    }

    /// Synthesize and store narration audio. `Ok(None)` when there is no blob store.
    async fn narrate(
        &self,
        speech: &dyn SpeechSynthesizer,
        analysis: &Analysis,
        session_id: &str,
        record_id: Uuid,
    ) -> Result<Option<String>, ScanError> {
        let text = build_narration_text(analysis);
        let budget = self.settings.speech_timeout;
        let text_ref = text.as_str();
        let audio = retry_with_backoff("narrate", &self.settings.retry, || async move {
            upstream_call(budget, speech.synthesize_speech(text_ref)).await
        })
        .await
        .map_err(|source| ScanError::Upstream {
            stage: Stage::Narrating,
            source,
        })?;

        let Some(store) = &self.blob_store else {
            debug!(session_id, "no blob store, dropping narration audio");
            return Ok(None);
        };

        let format = match audio.format() {
            MediaFormat::Unknown => MediaFormat::Mp3,
            format => format,
        };
        let path = audio_object_path(session_id, &record_id.to_string(), format.extension());
        match self
            .store_and_sign(store.as_ref(), audio.bytes, &path, &audio.mime_type)
            .await
        {
            Ok(url) => Ok(Some(url)),
            Err(err) => {
                warn!(session_id, path = %path, error = %err, "audio upload failed");
                Ok(None)
            }
        }
    }

    /// Store the generated image, falling back to an embedded data URI.
    async fn persist_image(
        &self,
        image: &SynthesizedImage,
        session_id: &str,
        record_id: Uuid,
    ) -> (ImageRef, Outcome) {
        let embedded = || ImageRef::Embedded {
            data_uri: data_uri(&image.mime_type, &image.encoded),
        };

        let Some(store) = &self.blob_store else {
            return (embedded(), Outcome::Skipped);
        };

        let extension = image.format().extension();
        let path = monster_object_path(session_id, &record_id.to_string(), extension);
        match self
            .store_and_sign(store.as_ref(), image.bytes.clone(), &path, &image.mime_type)
            .await
        {
            Ok(url) => (ImageRef::Url { url }, Outcome::Ok),
            Err(err) => {
                warn!(
                    session_id,
                    path = %path,
                    error = %err,
                    "image upload failed, embedding image in record"
                );
                (embedded(), Stage::PersistingAssets.failure_outcome())
            }
        }
    }

    async fn store_and_sign(
        &self,
        store: &dyn BlobStore,
        data: bytes::Bytes,
        path: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let budget = self.settings.storage_timeout;
        let ttl = self.settings.signed_url_ttl;

        retry_with_backoff("upload", &self.settings.retry, || {
            let data = data.clone();
            async move { storage_call(budget, store.upload(data, path, content_type)).await }
        })
        .await?;

        retry_with_backoff("sign", &self.settings.retry, || async move {
            storage_call(budget, store.signed_url(path, ttl)).await
        })
        .await
    }

    async fn save(
        &self,
        record_store: &dyn RecordStore,
        record: &MonsterRecord,
    ) -> Result<(), PersistenceError> {
        let budget = self.settings.storage_timeout;
        match tokio::time::timeout(budget, record_store.save_record(record)).await {
            Ok(result) => result,
            Err(_) => Err(PersistenceError::Backend(format!(
                "save timed out after {}ms",
                budget.as_millis()
            ))),
        }
    }

    /// Records of a session, newest first, through the collection cache.
    pub async fn list_records(&self, session_id: &str) -> Result<CollectionResponse, ScanError> {
        validate_session_id(session_id)?;

        if let Some(records) = self.collection_cache.get(session_id) {
            debug!(session_id, count = records.len(), "collection cache hit");
            return Ok(CollectionResponse {
                session_id: session_id.to_string(),
                records,
                cache_hit: true,
            });
        }

        let store = self
            .record_store
            .as_deref()
            .ok_or(ScanError::ServiceUnavailable {
                collaborator: "record store",
            })?;
        // A scan that lands while the store read is in flight invalidates the
        // session; the list read here must not be cached over it.
        let generation = self.collection_cache.generation();
        let records = store.list_records(session_id).await.map_err(|err| {
            error!(session_id, error = %err, "failed to list records");
            ScanError::Persistence(err)
        })?;

        self.collection_cache
            .set_if_generation(session_id.to_string(), records.clone(), generation);

        Ok(CollectionResponse {
            session_id: session_id.to_string(),
            records,
            cache_hit: false,
        })
    }

    pub fn cache_stats(&self) -> CacheStatsReport {
        CacheStatsReport {
            scan_cache: self.scan_cache.stats(),
            collection_cache: self.collection_cache.stats(),
        }
    }

    /// Empty both caches and reset their counters.
    pub fn flush_caches(&self) {
        self.scan_cache.flush_all();
        self.collection_cache.flush_all();
        info!("flushed scan and collection caches");
    }

    pub async fn counters(&self) -> Result<ScanCounters, ScanError> {
        let store = self
            .record_store
            .as_deref()
            .ok_or(ScanError::ServiceUnavailable {
                collaborator: "record store",
            })?;
        Ok(store.counters().await?)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Bound a collaborator call; a timeout counts as a failed attempt.
async fn upstream_call<T>(
    budget: Duration,
    call: impl Future<Output = Result<T, UpstreamError>>,
) -> Result<T, UpstreamError> {
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => Err(UpstreamError::Timeout {
            after_ms: budget.as_millis() as u64,
        }),
    }
}

async fn storage_call<T>(
    budget: Duration,
    call: impl Future<Output = Result<T, StorageError>>,
) -> Result<T, StorageError> {
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout {
            after_ms: budget.as_millis() as u64,
        }),
    }
}

fn log_failure(stage: Stage, err: &ScanError, total: &StageTimer<'_>) {
    let elapsed_ms = total.elapsed_ms();
    let session_id = total.session_id();
    match err {
        ScanError::Validation(_) => warn!(
            stage = %stage,
            elapsed_ms,
            session_id,
            kind = err.kind(),
            error = %err,
            "scan rejected"
        ),
        _ => error!(
            stage = %stage,
            elapsed_ms,
            session_id,
            kind = err.kind(),
            error = %err,
            "scan failed"
        ),
    }
}
