//! Job orchestration: mint event to durable asset.
//!
//! The service owns the job table and drives each job through the
//! pipeline: trait selection, rendering, upload, completion. Every state
//! mutation is broadcast on the [`EventBus`] for WebSocket subscribers.

use std::collections::HashSet;
use std::sync::Arc;

use alloy::primitives::Address;
use rand::Rng;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::chain::ContractClient;
use crate::domain::{
    EventBus, GenerationJob, JobEvent, JobId, JobStats, JobStatus, JobTable, MintEvent, RarityTier,
};
use crate::error::ForgeError;
use crate::generation::{AssetRenderer, TierSnapshot, TraitSelector, UNIQUENESS_TOLERANCE};
use crate::storage::StorageUploader;

/// Orchestrates generation jobs end to end.
#[derive(Debug)]
pub struct JobService {
    jobs: JobTable,
    event_bus: EventBus,
    selector: Arc<TraitSelector>,
    renderer: Arc<dyn AssetRenderer>,
    uploader: Arc<dyn StorageUploader>,
    /// Optional contract client, consulted for `tokenRarity` when a mint
    /// event carries no usable rarity.
    contract: Option<Arc<ContractClient>>,
    /// Tokens currently inside the pipeline. Guards against a second
    /// `process_job` for the same token while the first is in flight.
    in_flight: Mutex<HashSet<u64>>,
}

impl JobService {
    /// Creates the service around its collaborators.
    #[must_use]
    pub fn new(
        selector: Arc<TraitSelector>,
        renderer: Arc<dyn AssetRenderer>,
        uploader: Arc<dyn StorageUploader>,
        contract: Option<Arc<ContractClient>>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            jobs: JobTable::new(),
            event_bus,
            selector,
            renderer,
            uploader,
            contract,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// The bus this service publishes job events on.
    #[must_use]
    pub const fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Creates a job for a detected mint.
    ///
    /// Duplicate deliveries of the same mint are absorbed here: when a
    /// non-failed job already exists for the token, the event is ignored
    /// and `None` is returned. The check and the insert are one atomic
    /// table operation, so concurrent deliveries of the same mint (event
    /// pump plus back-office endpoint) land exactly one job. A
    /// previously failed token gets a fresh job, giving it a natural
    /// retry path.
    ///
    /// The job's rarity comes from the event when the contract emitted a
    /// valid level (1 to 5), then from a `tokenRarity` contract read,
    /// then from the live tier chances.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::GenerationExhausted`] when no rarity can be
    /// assigned because every tier's supply cap is reached.
    pub async fn create_job(&self, event: &MintEvent) -> Result<Option<GenerationJob>, ForgeError> {
        let rarity = self.resolve_rarity(event).await?;
        let job = GenerationJob::new(event.token_id, event.to, rarity);
        let snapshot = job.clone();
        if self.jobs.insert_unless_active(job).await?.is_none() {
            debug!(
                token_id = event.token_id,
                "mint already tracked; ignoring duplicate event"
            );
            return Ok(None);
        }
        self.event_bus.publish(JobEvent::JobCreated {
            job_id: snapshot.id,
            token_id: snapshot.token_id,
            rarity: snapshot.rarity,
            timestamp: snapshot.created_at,
        });
        info!(
            job_id = %snapshot.id,
            token_id = snapshot.token_id,
            rarity = rarity.name(),
            "generation job created"
        );
        Ok(Some(snapshot))
    }

    /// Runs the full pipeline for one job.
    ///
    /// Any step failure moves the job to `Failed` with the step's error
    /// message captured verbatim, and the failure is re-returned.
    ///
    /// # Errors
    ///
    /// - [`ForgeError::JobNotFound`] when the job does not exist.
    /// - [`ForgeError::AlreadyProcessing`] when the token is already in
    ///   the pipeline.
    /// - Any pipeline step error, after the job has been failed.
    pub async fn process_job(&self, job_id: JobId) -> Result<(), ForgeError> {
        let entry = self.jobs.get(job_id).await?;
        let (token_id, tier) = {
            let job = entry.read().await;
            (job.token_id, job.rarity)
        };

        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(token_id) {
                return Err(ForgeError::AlreadyProcessing(token_id));
            }
        }

        let result = self.run_pipeline(&entry, token_id, tier).await;
        self.in_flight.lock().await.remove(&token_id);

        if let Err(e) = &result {
            let mut job = entry.write().await;
            match job.fail(e.to_string()) {
                Ok(()) => {
                    self.event_bus.publish(JobEvent::JobFailed {
                        job_id,
                        token_id,
                        error: e.to_string(),
                        timestamp: chrono::Utc::now(),
                    });
                    error!(job_id = %job_id, token_id, %e, "generation job failed");
                }
                Err(transition) => {
                    warn!(job_id = %job_id, %transition, "could not mark job failed");
                }
            }
        }
        result
    }

    async fn run_pipeline(
        &self,
        entry: &Arc<RwLock<GenerationJob>>,
        token_id: u64,
        tier: RarityTier,
    ) -> Result<(), ForgeError> {
        self.advance(entry, JobStatus::Generating).await?;
        let selection = {
            let mut rng = rand::thread_rng();
            self.selector.select_for_tier(tier, &mut rng)?
        };
        debug!(token_id, dna = %selection.dna, "traits selected");
        let output = self.renderer.render(token_id, tier, &selection).await?;

        self.advance(entry, JobStatus::Uploading).await?;
        let bytes = tokio::fs::read(&output.image_path)
            .await
            .map_err(|e| ForgeError::Upload(format!("reading rendered image: {e}")))?;
        let image_url = self
            .uploader
            .upload_image(bytes, &format!("{token_id}.png"))
            .await?;
        let mut metadata = output.metadata.clone();
        metadata.image = image_url.clone();
        let metadata_url = self.uploader.upload_metadata(&metadata).await?;

        {
            let mut job = entry.write().await;
            job.complete(image_url.clone(), metadata_url.clone())?;
            self.event_bus.publish(JobEvent::JobCompleted {
                job_id: job.id,
                token_id,
                image_url,
                metadata_url,
                timestamp: chrono::Utc::now(),
            });
        }
        info!(token_id, "generation job completed");

        if let Err(e) = tokio::fs::remove_dir_all(&output.workdir).await {
            debug!(token_id, %e, "scratch directory not removed");
        }
        Ok(())
    }

    /// Transitions the job and broadcasts the change.
    async fn advance(
        &self,
        entry: &Arc<RwLock<GenerationJob>>,
        next: JobStatus,
    ) -> Result<(), ForgeError> {
        let mut job = entry.write().await;
        job.transition(next)?;
        self.event_bus.publish(JobEvent::JobStatusChanged {
            job_id: job.id,
            token_id: job.token_id,
            status: next,
            timestamp: chrono::Utc::now(),
        });
        debug!(job_id = %job.id, status = next.as_str(), "job advanced");
        Ok(())
    }

    /// Creates a job for the mint and kicks off processing in the
    /// background. The convenience entry point used by the event pump.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::create_job`] errors. Processing failures are
    /// logged from the spawned task, not returned.
    pub async fn handle_mint_event(
        self: &Arc<Self>,
        event: &MintEvent,
    ) -> Result<Option<JobId>, ForgeError> {
        let Some(job) = self.create_job(event).await? else {
            return Ok(None);
        };
        let job_id = job.id;
        let service = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = service.process_job(job_id).await {
                // Already recorded on the job; the log is for operators.
                error!(job_id = %job_id, %e, "pipeline task ended with error");
            }
        });
        Ok(Some(job_id))
    }

    /// Resolves the rarity for a mint: the event's level when valid,
    /// then a `tokenRarity` contract read, then a chance draw. A failing
    /// contract read is a transient transport problem and falls through
    /// rather than failing job creation.
    async fn resolve_rarity(&self, event: &MintEvent) -> Result<RarityTier, ForgeError> {
        if let Some(tier) = event.rarity.and_then(RarityTier::from_level) {
            return Ok(tier);
        }
        if let Some(contract) = &self.contract {
            match contract.token_rarity(event.token_id).await {
                Ok(level) => {
                    if let Some(tier) = RarityTier::from_level(level) {
                        return Ok(tier);
                    }
                }
                Err(e) => {
                    warn!(
                        token_id = event.token_id,
                        %e,
                        "tokenRarity read failed; drawing rarity by chance"
                    );
                }
            }
        }
        self.draw_fallback_rarity()
    }

    /// Draws a rarity from the live tier chances. Used when neither the
    /// mint event nor the contract yields a usable rarity.
    fn draw_fallback_rarity(&self) -> Result<RarityTier, ForgeError> {
        let roll = rand::thread_rng().gen_range(0.0..100.0);
        self.selector
            .counters()
            .select_by_chance(roll)
            .ok_or_else(|| ForgeError::GenerationExhausted {
                attempts: UNIQUENESS_TOLERANCE,
                reason: "all rarity tiers are at their supply cap".to_string(),
            })
    }

    /// Snapshot of one job by ID.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::JobNotFound`] when no such job exists.
    pub async fn get_job(&self, job_id: JobId) -> Result<GenerationJob, ForgeError> {
        let entry = self.jobs.get(job_id).await?;
        let job = entry.read().await;
        Ok(job.clone())
    }

    /// Snapshot of the latest job for a token.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::TokenNotFound`] when the token has no job.
    pub async fn get_job_by_token(&self, token_id: u64) -> Result<GenerationJob, ForgeError> {
        let entry = self.jobs.get_by_token(token_id).await?;
        let job = entry.read().await;
        Ok(job.clone())
    }

    /// All jobs owned by `address`, oldest first.
    pub async fn get_user_jobs(&self, address: Address) -> Vec<GenerationJob> {
        self.jobs.user_jobs(address).await
    }

    /// Current job counts per status.
    pub async fn get_stats(&self) -> JobStats {
        self.jobs.stats().await
    }

    /// Current per-tier supply and probability snapshot.
    #[must_use]
    pub fn rarity_snapshot(&self) -> Vec<TierSnapshot> {
        self.selector.counters().snapshot()
    }

    /// Removes terminal jobs older than `max_age`. Returns how many were
    /// dropped.
    pub async fn cleanup_old_jobs(&self, max_age: chrono::Duration) -> usize {
        let removed = self.jobs.cleanup_old(max_age).await;
        if removed > 0 {
            info!(removed, "cleaned up old jobs");
        }
        removed
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used)]
mod tests {
    use std::fmt;
    use std::path::PathBuf;

    use alloy::primitives::{Address, TxHash};
    use async_trait::async_trait;

    use super::*;
    use crate::generation::layers::tests::sample_set;
    use crate::generation::{NftMetadata, RenderOutput, SelectionOutcome, TierCounters};

    /// Renderer that writes a tiny real file so the upload step has
    /// something to read.
    struct StubRenderer {
        dirs: std::sync::Mutex<Vec<tempfile::TempDir>>,
        fail_with: Option<String>,
    }

    impl fmt::Debug for StubRenderer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("StubRenderer").finish_non_exhaustive()
        }
    }

    impl StubRenderer {
        fn ok() -> Self {
            Self {
                dirs: std::sync::Mutex::new(Vec::new()),
                fail_with: None,
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                dirs: std::sync::Mutex::new(Vec::new()),
                fail_with: Some(message.to_string()),
            }
        }
    }

    #[async_trait]
    impl AssetRenderer for StubRenderer {
        async fn render(
            &self,
            token_id: u64,
            tier: RarityTier,
            selection: &SelectionOutcome,
        ) -> Result<RenderOutput, ForgeError> {
            if let Some(message) = &self.fail_with {
                return Err(ForgeError::Render(message.clone()));
            }
            let dir = tempfile::tempdir().unwrap();
            let image_path = dir.path().join(format!("{token_id}.png"));
            std::fs::write(&image_path, b"png").unwrap();
            let metadata = NftMetadata::for_token(token_id, tier, selection);
            let workdir: PathBuf = dir.path().to_path_buf();
            self.dirs.lock().unwrap().push(dir);
            Ok(RenderOutput {
                image_path,
                metadata,
                workdir,
            })
        }
    }

    #[derive(Debug)]
    struct StubUploader;

    #[async_trait]
    impl StorageUploader for StubUploader {
        async fn upload_image(&self, _bytes: Vec<u8>, name: &str) -> Result<String, ForgeError> {
            Ok(format!("ipfs://image/{name}"))
        }

        async fn upload_metadata(&self, metadata: &NftMetadata) -> Result<String, ForgeError> {
            assert!(metadata.image.starts_with("ipfs://image/"));
            Ok(format!("ipfs://meta/{}", metadata.name))
        }
    }

    fn make_service(renderer: StubRenderer) -> Arc<JobService> {
        make_service_with_contract(renderer, None)
    }

    fn make_service_with_contract(
        renderer: StubRenderer,
        contract: Option<Arc<ContractClient>>,
    ) -> Arc<JobService> {
        let layers = Arc::new(sample_set());
        let counters = Arc::new(TierCounters::new(&layers.tiers).unwrap());
        let selector = Arc::new(TraitSelector::new(layers, counters));
        Arc::new(JobService::new(
            selector,
            Arc::new(renderer),
            Arc::new(StubUploader),
            contract,
            EventBus::new(64),
        ))
    }

    fn mint(token_id: u64, rarity: Option<u8>) -> MintEvent {
        MintEvent {
            token_id,
            to: Address::repeat_byte(0xab),
            from: Address::ZERO,
            transaction_hash: TxHash::repeat_byte(token_id as u8),
            block_number: 100,
            rarity,
        }
    }

    #[tokio::test]
    async fn job_rarity_comes_from_the_event() {
        let service = make_service(StubRenderer::ok());
        let job = service.create_job(&mint(1, Some(4))).await.unwrap().unwrap();
        assert_eq!(job.rarity, RarityTier::Epic);
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn out_of_range_rarity_falls_back_to_chance_draw() {
        let service = make_service(StubRenderer::ok());
        let job = service.create_job(&mint(1, Some(9))).await.unwrap().unwrap();
        assert!((1..=5).contains(&job.rarity.level()));
    }

    #[tokio::test]
    async fn unreachable_rarity_oracle_falls_through_to_chance_draw() {
        let Ok(contract) = ContractClient::new(
            "http://127.0.0.1:1".to_string(),
            "0x00000000000000000000000000000000000000cc",
        ) else {
            panic!("valid contract address");
        };
        let service = make_service_with_contract(StubRenderer::ok(), Some(Arc::new(contract)));
        let job = service.create_job(&mint(1, None)).await.unwrap().unwrap();
        assert!((1..=5).contains(&job.rarity.level()));
    }

    #[tokio::test]
    async fn concurrent_creates_for_one_token_yield_one_job() {
        let service = make_service(StubRenderer::ok());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = Arc::clone(&service);
            let event = mint(7, Some(1));
            handles.push(tokio::spawn(async move { service.create_job(&event).await }));
        }
        let mut created = 0;
        for handle in handles {
            let Ok(Ok(result)) = handle.await else {
                panic!("create task failed");
            };
            if result.is_some() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(service.get_stats().await.total, 1);
    }

    #[tokio::test]
    async fn duplicate_mint_events_yield_one_job() {
        let service = make_service(StubRenderer::ok());
        let event = mint(7, Some(1));
        let first = service.create_job(&event).await.unwrap();
        let second = service.create_job(&event).await.unwrap();
        assert!(first.is_some());
        assert!(second.is_none());
        let stats = service.get_stats().await;
        assert_eq!(stats.total, 1);
    }

    #[tokio::test]
    async fn failed_token_gets_a_fresh_job() {
        let service = make_service(StubRenderer::failing("boom"));
        let event = mint(7, Some(1));
        let job = service.create_job(&event).await.unwrap().unwrap();
        let _ = service.process_job(job.id).await;
        assert_eq!(
            service.get_job_by_token(7).await.unwrap().status,
            JobStatus::Failed
        );

        let retry = service.create_job(&event).await.unwrap();
        assert!(retry.is_some());
        assert_eq!(
            service.get_job_by_token(7).await.unwrap().status,
            JobStatus::Pending
        );
    }

    #[tokio::test]
    async fn pipeline_completes_job_with_durable_urls() {
        let service = make_service(StubRenderer::ok());
        let job = service.create_job(&mint(42, Some(2))).await.unwrap().unwrap();
        service.process_job(job.id).await.unwrap();

        let done = service.get_job(job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.image_url.as_deref(), Some("ipfs://image/42.png"));
        assert_eq!(done.metadata_url.as_deref(), Some("ipfs://meta/Plumffel #42"));
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn pipeline_emits_lifecycle_events_in_order() {
        let service = make_service(StubRenderer::ok());
        let mut rx = service.event_bus().subscribe();
        let job = service.create_job(&mint(42, Some(1))).await.unwrap().unwrap();
        service.process_job(job.id).await.unwrap();

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            types.push(event.event_type_str());
        }
        assert_eq!(
            types,
            vec![
                "job_created",
                "job_status_changed",
                "job_status_changed",
                "job_completed"
            ]
        );
    }

    #[tokio::test]
    async fn render_failure_is_captured_verbatim() {
        let message = "Plumffel generator failed: disk full";
        let service = make_service(StubRenderer::failing(message));
        let job = service.create_job(&mint(42, Some(3))).await.unwrap().unwrap();
        let result = service.process_job(job.id).await;
        assert!(result.is_err());

        let failed = service.get_job(job.id).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some(message));
        assert!(failed.image_url.is_none());
        assert!(failed.metadata_url.is_none());
    }

    #[tokio::test]
    async fn token_in_flight_rejects_a_second_run() {
        let service = make_service(StubRenderer::ok());
        let job = service.create_job(&mint(9, Some(1))).await.unwrap().unwrap();
        service.in_flight.lock().await.insert(9);

        let result = service.process_job(job.id).await;
        let Err(ForgeError::AlreadyProcessing(token)) = result else {
            panic!("expected AlreadyProcessing, got {result:?}");
        };
        assert_eq!(token, 9);
        // The guard entry belongs to the first run; still present.
        assert!(service.in_flight.lock().await.contains(&9));
    }

    #[tokio::test]
    async fn pending_job_is_visible_by_token_lookup() {
        let service = make_service(StubRenderer::ok());
        let _ = service.create_job(&mint(42, Some(1))).await.unwrap();
        let job = service.get_job_by_token(42).await.unwrap();
        assert_eq!(job.token_id, 42);
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn user_jobs_are_scoped_to_the_address() {
        let service = make_service(StubRenderer::ok());
        let _ = service.create_job(&mint(1, Some(1))).await.unwrap();
        let _ = service.create_job(&mint(2, Some(1))).await.unwrap();

        let owner = Address::repeat_byte(0xab);
        assert_eq!(service.get_user_jobs(owner).await.len(), 2);
        assert!(service.get_user_jobs(Address::ZERO).await.is_empty());
    }

    #[tokio::test]
    async fn unknown_job_id_is_not_found() {
        let service = make_service(StubRenderer::ok());
        let result = service.get_job(JobId::new()).await;
        assert!(matches!(result, Err(ForgeError::JobNotFound(_))));
    }
}
