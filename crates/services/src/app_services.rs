use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::info;

use course_core::catalog::{CatalogError, ContentCatalog, StaticCatalog};
use course_core::model::{ModuleId, TestId};
use course_core::Clock;
use storage::repository::Storage;

use crate::assessment::{
    AnsweredScoring, EvaluatedScoring, RandomScoring, ScoringStrategy, TestSessionController,
    DEFAULT_TICK,
};
use crate::auth::AuthProvider;
use crate::config::{AppConfig, ScoringMode};
use crate::error::{AppServicesError, RevisionFlowError, TestSessionError};
use crate::events::{AppEvent, EventBus};
use crate::exercise_service::ExerciseService;
use crate::progress::ProgressStore;
use crate::revision::RevisionFlowController;

const BUNDLED_CATALOG: &str = include_str!("../data/catalog.json");

/// Catalog shipped with the crate, used when no catalog file is configured.
///
/// # Errors
///
/// Returns `CatalogError` if the bundled JSON fails validation.
pub fn bundled_catalog() -> Result<StaticCatalog, CatalogError> {
    StaticCatalog::from_json(BUNDLED_CATALOG)
}

/// Assembles the services a presentation layer talks to.
#[derive(Clone)]
pub struct AppServices {
    progress: Arc<ProgressStore>,
    exercises: ExerciseService,
    scoring: Arc<dyn ScoringStrategy>,
    countdown_tick: Duration,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the catalog cannot be loaded or storage
    /// initialization fails.
    pub async fn from_config(
        config: &AppConfig,
        auth: Arc<dyn AuthProvider>,
    ) -> Result<Self, AppServicesError> {
        let catalog = match &config.catalog_path {
            Some(path) => StaticCatalog::from_path(path)?,
            None => bundled_catalog()?,
        };
        let storage = Storage::sqlite(&config.database_url).await?;
        info!(
            database_url = %config.database_url,
            modules = catalog.modules().len(),
            "app services ready"
        );

        Ok(Self::assemble(
            Arc::new(catalog),
            storage,
            Clock::default(),
            auth,
            scoring_for(config.scoring),
            config.countdown_tick(),
        ))
    }

    /// Build services over in-memory storage.
    #[must_use]
    pub fn in_memory(
        catalog: Arc<dyn ContentCatalog>,
        clock: Clock,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self::assemble(
            catalog,
            Storage::in_memory(),
            clock,
            auth,
            Arc::new(RandomScoring::new()),
            DEFAULT_TICK,
        )
    }

    /// Build services over caller-supplied storage.
    #[must_use]
    pub fn with_storage(
        catalog: Arc<dyn ContentCatalog>,
        storage: Storage,
        clock: Clock,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self::assemble(
            catalog,
            storage,
            clock,
            auth,
            Arc::new(RandomScoring::new()),
            DEFAULT_TICK,
        )
    }

    fn assemble(
        catalog: Arc<dyn ContentCatalog>,
        storage: Storage,
        clock: Clock,
        auth: Arc<dyn AuthProvider>,
        scoring: Arc<dyn ScoringStrategy>,
        countdown_tick: Duration,
    ) -> Self {
        let progress = Arc::new(ProgressStore::new(
            clock,
            catalog,
            storage,
            auth,
            EventBus::default(),
        ));
        Self {
            exercises: ExerciseService::new(Arc::clone(&progress)),
            progress,
            scoring,
            countdown_tick,
        }
    }

    #[must_use]
    pub fn with_scoring(mut self, scoring: Arc<dyn ScoringStrategy>) -> Self {
        self.scoring = scoring;
        self
    }

    #[must_use]
    pub fn with_countdown_tick(mut self, tick: Duration) -> Self {
        self.countdown_tick = tick;
        self
    }

    #[must_use]
    pub fn progress(&self) -> &Arc<ProgressStore> {
        &self.progress
    }

    #[must_use]
    pub fn exercises(&self) -> &ExerciseService {
        &self.exercises
    }

    #[must_use]
    pub fn catalog(&self) -> &Arc<dyn ContentCatalog> {
        self.progress.catalog()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.progress.events().subscribe()
    }

    /// # Errors
    ///
    /// See [`TestSessionController::open`].
    pub fn open_test(
        &self,
        module_id: &ModuleId,
        test_id: &TestId,
    ) -> Result<TestSessionController, TestSessionError> {
        Ok(TestSessionController::open(
            Arc::clone(&self.progress),
            Arc::clone(&self.scoring),
            module_id,
            test_id,
        )?
        .with_tick(self.countdown_tick))
    }

    /// # Errors
    ///
    /// See [`RevisionFlowController::begin`].
    pub fn begin_revision(
        &self,
        module_id: &ModuleId,
        test_id: &TestId,
    ) -> Result<RevisionFlowController, RevisionFlowError> {
        RevisionFlowController::begin(Arc::clone(&self.progress), module_id, test_id)
    }
}

fn scoring_for(mode: ScoringMode) -> Arc<dyn ScoringStrategy> {
    match mode {
        ScoringMode::Random => Arc::new(RandomScoring::new()),
        ScoringMode::Answered => Arc::new(AnsweredScoring),
        ScoringMode::Evaluated => Arc::new(EvaluatedScoring),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_catalog_is_valid() {
        let catalog = bundled_catalog().expect("bundled catalog");
        assert_eq!(catalog.modules().len(), 3);
        let basics = catalog.module_by_slug("python-basics").unwrap();
        assert_eq!(basics.tests.len(), 1);
        assert_eq!(basics.tests[0].time_limit_minutes, 1);
    }

    #[tokio::test]
    async fn from_config_builds_over_memory_sqlite() {
        let config = AppConfig {
            database_url: "sqlite::memory:".into(),
            ..AppConfig::default()
        };
        let services = AppServices::from_config(&config, Arc::new(crate::auth::SessionAuth::anonymous()))
            .await
            .expect("services");
        assert!(services.catalog().module_by_slug("getting-started").is_ok());
    }
}
