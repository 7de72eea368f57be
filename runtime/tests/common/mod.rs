#![allow(dead_code)]

use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use kg_runtime::{
    AppState,
    config::DEFAULT_MAX_UPLOAD_BYTES,
    graph::{
        ConsolidationTrigger, Consolidator, GraphStore, GraphWriter, MemoryGraphStore,
        MemoryGraphStoreConfig, ReviewService,
    },
    jobs::{
        IngestJob, JobDispatcher, JobQueue, JobStatus, JobStore, JobTracker, JsonJobStore,
        JsonJobStoreConfig, LocalQueue, LocalQueueConfig, Worker,
    },
    pipeline::{
        DefaultDocumentDecoder, DocumentPayload, ExtractionOutput, ExtractionRequest,
        IngestConfig, IngestRequest, IngestService, TripletExtractor,
    },
    triplets::Triplet,
};
use tempfile::TempDir;

pub const MODEL: &str = "scripted-model";

pub fn temp_working_dir() -> TempDir {
    TempDir::new().expect("create temp dir")
}

/// Stand-in for the LLM: replays scripted replies in order, then keeps
/// returning the fallback triplets.
pub struct ScriptedExtractor {
    replies: Mutex<VecDeque<Result<Vec<Triplet>>>>,
    fallback: Vec<Triplet>,
    delay: Option<Duration>,
    pub requests: Mutex<Vec<ExtractionRequest>>,
}

impl ScriptedExtractor {
    pub fn returning(triplets: Vec<Triplet>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: triplets,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        let extractor = Self::returning(Vec::new());
        extractor
            .replies
            .lock()
            .unwrap()
            .push_back(Err(anyhow!(message.to_string())));
        extractor
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::returning(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl TripletExtractor for ScriptedExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionOutput> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.replies.lock().unwrap().pop_front();
        let triplets = match reply {
            Some(reply) => reply?,
            None => self.fallback.clone(),
        };
        Ok(ExtractionOutput {
            triplets,
            model: MODEL.to_string(),
            tokens_used: Some(42),
        })
    }
}

pub fn vemurafenib() -> Triplet {
    let mut triplet = Triplet::new("Vemurafenib", "targets", "BRAF V600E");
    triplet.subject_types = vec!["Drug".into()];
    triplet.object_types = vec!["Gene".into()];
    triplet.confidence_score = Some(0.9);
    triplet.original_text = Some("Vemurafenib targets BRAF V600E.".into());
    triplet
}

pub fn text_request(text: &str, document_id: Option<&str>) -> IngestRequest {
    IngestRequest {
        payload: DocumentPayload::Text {
            text: text.to_string(),
        },
        document_id: document_id.map(str::to_string),
        title: None,
        user_id: Some("alice".into()),
        max_triplets: 10,
        context: None,
    }
}

pub async fn open_graph(dir: &TempDir) -> Result<Arc<MemoryGraphStore>> {
    let store = Arc::new(MemoryGraphStore::new(MemoryGraphStoreConfig {
        working_dir: dir.path().into(),
        namespace: "test_graph".into(),
        workspace: None,
    }));
    store.initialize().await?;
    Ok(store)
}

pub async fn open_jobs(dir: &TempDir, ttl: chrono::Duration) -> Result<Arc<JsonJobStore>> {
    let store = Arc::new(JsonJobStore::new(JsonJobStoreConfig {
        working_dir: dir.path().into(),
        namespace: "test_jobs".into(),
        workspace: None,
        ttl,
    }));
    store.initialize().await?;
    Ok(store)
}

pub async fn open_queue(dir: &TempDir) -> Result<Arc<LocalQueue>> {
    let queue = Arc::new(LocalQueue::new(LocalQueueConfig {
        working_dir: dir.path().into(),
        name: "test_queue".into(),
        workspace: None,
    }));
    queue.initialize().await?;
    Ok(queue)
}

/// Fully wired services over temp-dir stores, without background tasks.
pub struct Harness {
    pub dir: TempDir,
    pub graph: Arc<MemoryGraphStore>,
    pub queue: Arc<LocalQueue>,
    pub extractor: Arc<ScriptedExtractor>,
    pub ingest: Arc<IngestService>,
    pub tracker: JobTracker,
    pub state: Arc<AppState>,
}

impl Harness {
    pub async fn new(extractor: ScriptedExtractor) -> Result<Self> {
        Self::with_options(extractor, &[], Duration::from_secs(5)).await
    }

    pub async fn with_options(
        extractor: ScriptedExtractor,
        admins: &[&str],
        extraction_timeout: Duration,
    ) -> Result<Self> {
        let dir = temp_working_dir();
        let jobs = open_jobs(&dir, chrono::Duration::hours(24)).await?;
        Self::build(dir, extractor, jobs, admins, extraction_timeout).await
    }

    /// Wires the services over a caller-supplied job store.
    pub async fn with_job_store<F>(extractor: ScriptedExtractor, wrap: F) -> Result<Self>
    where
        F: FnOnce(Arc<JsonJobStore>) -> Arc<dyn JobStore>,
    {
        let dir = temp_working_dir();
        let jobs = wrap(open_jobs(&dir, chrono::Duration::hours(24)).await?);
        Self::build(dir, extractor, jobs, &[], Duration::from_secs(5)).await
    }

    async fn build(
        dir: TempDir,
        extractor: ScriptedExtractor,
        jobs_dyn: Arc<dyn JobStore>,
        admins: &[&str],
        extraction_timeout: Duration,
    ) -> Result<Self> {
        let graph = open_graph(&dir).await?;
        let queue = open_queue(&dir).await?;
        let extractor = Arc::new(extractor);

        let graph_dyn: Arc<dyn GraphStore> = graph.clone();
        let queue_dyn: Arc<dyn JobQueue> = queue.clone();

        let ingest = Arc::new(IngestService::new(
            Arc::new(DefaultDocumentDecoder::default()),
            extractor.clone(),
            GraphWriter::new(graph_dyn.clone(), Duration::from_secs(5)),
            ConsolidationTrigger::disabled(),
            IngestConfig {
                extraction_timeout,
                max_triplets: 10,
            },
        ));
        let tracker = JobTracker::new(jobs_dyn);
        let dispatcher = JobDispatcher::new(tracker.clone(), queue_dyn);
        let review = Arc::new(ReviewService::new(
            graph_dyn.clone(),
            admins.iter().map(|a| a.to_string()).collect::<HashSet<_>>(),
        ));

        let state = Arc::new(AppState {
            ingest: ingest.clone(),
            dispatcher,
            tracker: tracker.clone(),
            review,
            consolidator: Arc::new(Consolidator::new(graph_dyn.clone())),
            graph: graph_dyn,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        });

        Ok(Self {
            dir,
            graph,
            queue,
            extractor,
            ingest,
            tracker,
            state,
        })
    }

    pub fn worker(&self) -> Worker {
        Worker::new(0, self.queue.clone(), self.tracker.clone(), self.ingest.clone())
    }
}

/// Job store whose writes of records in `status` fail a set number of times.
pub struct FlakyJobStore {
    inner: Arc<JsonJobStore>,
    status: JobStatus,
    failures_left: Mutex<usize>,
}

impl FlakyJobStore {
    pub fn new(inner: Arc<JsonJobStore>, status: JobStatus, failures: usize) -> Self {
        Self {
            inner,
            status,
            failures_left: Mutex::new(failures),
        }
    }
}

#[async_trait]
impl JobStore for FlakyJobStore {
    async fn initialize(&self) -> Result<()> {
        self.inner.initialize().await
    }

    async fn finalize(&self) -> Result<()> {
        self.inner.finalize().await
    }

    async fn put(&self, job: IngestJob) -> Result<()> {
        if job.status == self.status {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(anyhow!("job store unavailable"));
            }
        }
        self.inner.put(job).await
    }

    async fn get(&self, job_id: &str) -> Result<Option<IngestJob>> {
        self.inner.get(job_id).await
    }

    async fn list(&self, user_id: Option<&str>) -> Result<Vec<IngestJob>> {
        self.inner.list(user_id).await
    }

    async fn purge_expired(&self) -> Result<usize> {
        self.inner.purge_expired().await
    }

    async fn sync_if_dirty(&self) -> Result<()> {
        self.inner.sync_if_dirty().await
    }
}
