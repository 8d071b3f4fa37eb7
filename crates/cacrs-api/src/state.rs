//! Shared application state.

use std::collections::HashMap;
use std::sync::Arc;

use cacrs_core::ai::{self, GenerativeAi};
use cacrs_core::analysis::FileAnalyzer;
use cacrs_core::chat::ChatFlow;
use cacrs_core::research::Research;
use cacrs_core::services::ServicesRegistry;
use cacrs_core::session::{IdentityVerifier, SessionManager};
use cacrs_core::tour::{
    CompletionStore, FileCompletionStore, TourController, TourStep, default_steps,
};
use cacrs_core::{CaseRepository, Config, store};
use tokio::sync::Mutex;

/// One tour controller per signed-in user, created on first use.
pub struct TourSessions {
    steps: Vec<TourStep>,
    store: Arc<dyn CompletionStore>,
    controllers: Mutex<HashMap<String, TourController>>,
}

impl TourSessions {
    pub fn new(steps: Vec<TourStep>, store: Arc<dyn CompletionStore>) -> Self {
        Self {
            steps,
            store,
            controllers: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` on the user's controller.
    pub async fn with<R>(
        &self,
        user_id: &str,
        f: impl FnOnce(&mut TourController) -> cacrs_core::Result<R>,
    ) -> cacrs_core::Result<R> {
        let mut controllers = self.controllers.lock().await;
        if !controllers.contains_key(user_id) {
            let controller =
                TourController::new(user_id, self.steps.clone(), self.store.clone())?;
            controllers.insert(user_id.to_string(), controller);
        }
        match controllers.get_mut(user_id) {
            Some(controller) => f(controller),
            None => Err(cacrs_core::Error::Other(format!(
                "tour controller missing for {user_id}"
            ))),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repo: Arc<dyn CaseRepository>,
    pub chat: Arc<ChatFlow>,
    pub analyzer: Arc<FileAnalyzer>,
    pub research: Arc<Research>,
    pub services: Arc<ServicesRegistry>,
    pub sessions: Arc<SessionManager>,
    pub tours: Arc<TourSessions>,
}

impl AppState {
    /// Assemble state from already constructed collaborators.
    pub fn new(
        config: Config,
        repo: Arc<dyn CaseRepository>,
        ai: Arc<dyn GenerativeAi>,
        services: ServicesRegistry,
        verifier: IdentityVerifier,
        completion_store: Arc<dyn CompletionStore>,
    ) -> Self {
        let sessions = SessionManager::new(
            repo.clone(),
            verifier,
            config.auth.admin_emails.clone(),
        );
        Self {
            chat: Arc::new(ChatFlow::new(repo.clone(), ai.clone())),
            analyzer: Arc::new(FileAnalyzer::new(repo.clone(), ai.clone())),
            research: Arc::new(Research::new(repo.clone(), ai)),
            services: Arc::new(services),
            sessions: Arc::new(sessions),
            tours: Arc::new(TourSessions::new(default_steps(), completion_store)),
            config: Arc::new(config),
            repo,
        }
    }

    /// Build everything the configuration describes.
    pub async fn from_config(config: Config) -> cacrs_core::Result<Self> {
        let repo = store::open(&config).await?;
        let services = ServicesRegistry::with_defaults(&config.services.secret_manager_base_path);
        let ai = ai::from_config(&config.ai, services.gemini_tuning())?;
        let verifier = IdentityVerifier::from_config(&config.auth)?;
        let completion_store = Arc::new(FileCompletionStore::new(
            config.onboarding.resolved_state_path(),
        ));
        log::info!("Using AI provider {}", ai.name());
        Ok(Self::new(
            config,
            repo,
            ai,
            services,
            verifier,
            completion_store,
        ))
    }
}
