//! Shared application state

use axum::extract::FromRef;
use researchease_common::{
    auth::create_session_provider,
    config::AppConfig,
    db::create_paper_store,
    errors::Result,
    storage::create_object_store,
    ObjectStore, PaperStore, SessionProvider,
};
use researchease_pipeline::{
    create_analyzer, AnalysisGenerator, AnalysisPresenter, AnalysisWorkflow, FileIntake,
    IntakePolicy, ProgressHandle, Reconciler, ReconcilerSettings, WorkflowSettings,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// One user's intake and the progress of their running upload.
///
/// Progress sits outside the mutex so it can be read while an upload holds
/// the intake.
pub struct IntakeSlot {
    pub intake: Mutex<FileIntake>,
    pub progress: ProgressHandle,
    // millis since the registry epoch
    touched_ms: AtomicU64,
}

/// Per-user intakes; a user's second upload waits for the first
pub struct IntakeRegistry {
    policy: IntakePolicy,
    epoch: Instant,
    slots: RwLock<HashMap<Uuid, Arc<IntakeSlot>>>,
}

impl IntakeRegistry {
    pub fn new(policy: IntakePolicy) -> Self {
        Self {
            policy,
            epoch: Instant::now(),
            slots: RwLock::new(HashMap::new()),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    pub async fn slot(&self, user_id: Uuid) -> Arc<IntakeSlot> {
        let now = self.now_ms();
        if let Some(slot) = self.slots.read().await.get(&user_id) {
            slot.touched_ms.store(now, Ordering::Relaxed);
            return slot.clone();
        }

        let slot = self
            .slots
            .write()
            .await
            .entry(user_id)
            .or_insert_with(|| {
                Arc::new(IntakeSlot {
                    intake: Mutex::new(FileIntake::with_policy(self.policy.clone())),
                    progress: ProgressHandle::new(),
                    touched_ms: AtomicU64::new(now),
                })
            })
            .clone();
        slot.touched_ms.store(now, Ordering::Relaxed);
        slot
    }

    /// Drop a signed-out user's intake
    pub async fn evict(&self, user_id: Uuid) {
        self.slots.write().await.remove(&user_id);
    }

    pub async fn active_count(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Drop intakes untouched for `max_idle`; slots a request still holds are kept
    pub async fn sweep_idle(&self, max_idle: Duration) -> usize {
        let now = self.now_ms();
        let max_idle_ms = max_idle.as_millis() as u64;

        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|_, slot| {
            Arc::strong_count(slot) > 1
                || now.saturating_sub(slot.touched_ms.load(Ordering::Relaxed)) < max_idle_ms
        });
        before - slots.len()
    }

    /// Sweep idle intakes until shutdown is signalled
    pub async fn run_sweeper(self: Arc<Self>, max_idle: Duration, mut shutdown: watch::Receiver<bool>) {
        let period = max_idle.clamp(Duration::from_secs(1), Duration::from_secs(60));
        let mut ticker = tokio::time::interval(period);
        info!(max_idle_secs = max_idle.as_secs(), "Intake sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let dropped = self.sweep_idle(max_idle).await;
                    if dropped > 0 {
                        let remaining = self.active_count().await;
                        debug!(dropped, remaining, "Dropped idle intakes");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Intake sweeper stopped");
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionProvider>,
    pub objects: Arc<dyn ObjectStore>,
    pub papers: Arc<dyn PaperStore>,
    pub generator: Arc<AnalysisGenerator>,
    pub workflow: Arc<AnalysisWorkflow>,
    pub presenter: Arc<AnalysisPresenter>,
    pub intakes: Arc<IntakeRegistry>,
}

impl AppState {
    /// Build every backend selected by configuration
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let sessions = Arc::new(create_session_provider(&config)?);
        let objects = create_object_store(&config)?;
        let papers = create_paper_store(&config).await?;
        let analyzer = create_analyzer(&config, objects.clone(), papers.clone())?;

        tracing::info!(
            auth = sessions.backend().backend_name(),
            storage = objects.backend_name(),
            database = papers.backend_name(),
            analyzer = analyzer.name(),
            "Backends initialized"
        );

        let generator = Arc::new(AnalysisGenerator::new(papers.clone(), analyzer));
        let workflow = Arc::new(AnalysisWorkflow::new(
            objects.clone(),
            papers.clone(),
            generator.clone(),
            WorkflowSettings::from_config(&config),
        ));
        let presenter = Arc::new(AnalysisPresenter::new(papers.clone()));
        let intakes = Arc::new(IntakeRegistry::new(IntakePolicy::from_config(&config.intake)));

        Ok(Self {
            config: Arc::new(config),
            sessions,
            objects,
            papers,
            generator,
            workflow,
            presenter,
            intakes,
        })
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.objects.clone(),
            self.papers.clone(),
            self.generator.clone(),
            ReconcilerSettings::from_config(&self.config),
        )
    }
}

impl FromRef<AppState> for Arc<SessionProvider> {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}
