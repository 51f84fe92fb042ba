//! Wires the configured collaborators into a running application.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::analysis::{DocumentAnalyzer, HttpAnalysisService};
use crate::broadcast::{BroadcastMirror, ConnectionRegistry};
use crate::config::Config;
use crate::db::{default_database_path, Database};
use crate::error::{ConfigError, Result};
use crate::notify::{LogNotifier, Notifier, StaticUserDirectory, WebhookNotifier};
use crate::pipeline::{Pipeline, PipelineConfig, PipelineContext};
use crate::queue::{JobQueue, JobQueueService};
use crate::storage::{FsObjectStore, ObjectStore, UrlSigner};
use crate::upload::UploadService;
use crate::worker::WorkerPool;

pub struct App {
    config: Config,
    db: Database,
    store: Arc<dyn ObjectStore>,
    mirror: BroadcastMirror,
    registry: ConnectionRegistry,
    queue_service: JobQueueService,
    pipeline: Arc<Pipeline>,
    pipeline_config: PipelineConfig,
    uploads: UploadService,
}

impl App {
    /// Opens the database and builds every collaborator from `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let db_path = match &config.database_path {
            Some(path) => PathBuf::from(path),
            None => default_database_path().ok_or_else(|| ConfigError::Validation {
                message: "database_path is not set and no home directory was found".to_string(),
            })?,
        };
        let db = Database::open(&db_path)?;

        let mut store = FsObjectStore::new(&config.storage.root)?;
        if let Some(base_url) = &config.storage.public_base_url {
            let secret = config.storage.signing_secret.resolve()?;
            store = store.with_signer(UrlSigner::new(base_url, secret));
        }
        let store: Arc<dyn ObjectStore> = Arc::new(store);

        let notifier: Arc<dyn Notifier> = match &config.notifications.webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(
                url,
                Duration::from_secs(config.analysis.request_timeout_secs),
            )?),
            None => Arc::new(LogNotifier),
        };

        let pipeline_config = PipelineConfig::from_config(&config);
        let mirror = BroadcastMirror::default();
        let queue_service = JobQueueService::new(
            JobQueue::new(db.clone(), pipeline_config.lease),
            Arc::new(mirror.clone()),
            Arc::new(StaticUserDirectory::from_config(&config.users)),
            notifier,
        );

        let service = Arc::new(HttpAnalysisService::from_config(&config.analysis)?);
        let analyzer = DocumentAnalyzer::from_config(service, &config.storage.bucket, &config.analysis);
        let ctx = PipelineContext::new(Arc::clone(&store), analyzer, queue_service.clone());
        let pipeline = Arc::new(Pipeline::new(ctx, pipeline_config.retry.clone()));

        let uploads = UploadService::new(
            Arc::clone(&store),
            queue_service.clone(),
            &config.storage.key_prefix,
        );

        Ok(Self {
            config,
            db,
            store,
            mirror,
            registry: ConnectionRegistry::new(),
            queue_service,
            pipeline,
            pipeline_config,
            uploads,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.store)
    }

    pub fn mirror(&self) -> &BroadcastMirror {
        &self.mirror
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn queue_service(&self) -> &JobQueueService {
        &self.queue_service
    }

    pub fn uploads(&self) -> &UploadService {
        &self.uploads
    }

    pub fn pipeline(&self) -> Arc<Pipeline> {
        Arc::clone(&self.pipeline)
    }

    /// Start-up recovery sweep; returns the number of files queued.
    pub fn recover(&self) -> Result<usize> {
        self.queue_service.discover_and_enqueue_pending()
    }

    /// Forwards mirror events to live connections until the mirror closes.
    pub fn spawn_mirror_pump(&self) -> tokio::task::JoinHandle<()> {
        self.registry.spawn_pump(self.mirror.subscribe())
    }

    pub fn start_workers(&self) -> WorkerPool {
        WorkerPool::start(Arc::clone(&self.pipeline), &self.pipeline_config)
    }
}
