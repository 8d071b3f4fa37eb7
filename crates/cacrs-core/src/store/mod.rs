//! Case repository: the persistence seam for every casework record.
//!
//! Two implementations ship with the crate: [`MemoryStore`], an in-process
//! store used for tests and local demos, and [`SqliteStore`], a sqlx-backed
//! store for durable deployments. Both are constructed once per process and
//! shared behind `Arc<dyn CaseRepository>`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{Config, StoreKind};
use crate::error::Result;
use crate::models::{
    Alert, Case, CaseEvent, CaseEventKind, CaseFile, CaseStatus, FileAnalysis, Finding, Message,
    NewCase, NewCaseFile, NewFinding, NewMessage, NewWatchlist, User, UserRole, UserStatus,
    Watchlist,
};

pub mod memory;
pub mod seed;
pub mod sqlite;

pub use memory::MemoryStore;
pub use seed::Dataset;
pub use sqlite::SqliteStore;

/// CRUD over cases and everything attached to them.
///
/// Mutating operations on a missing record return [`crate::Error::NotFound`].
/// Status changes, uploads and attached analyses are recorded on the case
/// timeline by the implementation.
#[async_trait]
pub trait CaseRepository: Send + Sync {
    // Cases
    async fn list_cases(&self) -> Result<Vec<Case>>;
    async fn get_case(&self, id: &str) -> Result<Option<Case>>;
    async fn create_case(&self, new_case: NewCase, created_by: &str) -> Result<Case>;
    async fn set_case_status(&self, id: &str, status: CaseStatus, changed_by: &str)
    -> Result<Case>;
    async fn delete_case(&self, id: &str) -> Result<()>;

    // Files
    async fn list_files(&self, case_id: &str) -> Result<Vec<CaseFile>>;
    async fn get_file(&self, case_id: &str, file_id: &str) -> Result<Option<CaseFile>>;
    async fn add_file(&self, case_id: &str, file: NewCaseFile, uploaded_by: &str)
    -> Result<CaseFile>;
    async fn set_file_analysis(
        &self,
        case_id: &str,
        file_id: &str,
        analysis: FileAnalysis,
    ) -> Result<CaseFile>;

    // Timeline
    async fn list_events(&self, case_id: &str) -> Result<Vec<CaseEvent>>;
    async fn record_event(
        &self,
        case_id: &str,
        kind: CaseEventKind,
        created_by: &str,
    ) -> Result<CaseEvent>;

    // Chat log
    async fn list_messages(&self, case_id: &str) -> Result<Vec<Message>>;
    async fn append_message(&self, case_id: &str, message: NewMessage) -> Result<Message>;
    async fn update_message_content(
        &self,
        case_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<Message>;
    /// Flag a message for report generation. Report messages are rejected.
    async fn set_message_selected(
        &self,
        case_id: &str,
        message_id: &str,
        selected: bool,
    ) -> Result<Message>;
    async fn clear_selection(&self, case_id: &str) -> Result<()>;

    // Research
    async fn list_findings(&self) -> Result<Vec<Finding>>;
    async fn add_finding(&self, finding: NewFinding) -> Result<Finding>;
    /// Delete findings by id, returning how many were removed.
    async fn delete_findings(&self, ids: &[String]) -> Result<usize>;
    async fn list_watchlists(&self) -> Result<Vec<Watchlist>>;
    async fn add_watchlist(&self, watchlist: NewWatchlist) -> Result<Watchlist>;

    // Users
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn upsert_user(&self, user: &User) -> Result<()>;
    async fn set_user_role(&self, id: &str, role: UserRole) -> Result<User>;
    async fn set_user_status(&self, id: &str, status: UserStatus) -> Result<User>;

    // Dashboard
    async fn list_alerts(&self) -> Result<Vec<Alert>>;

    /// Retrieval context used to ground chat answers.
    async fn retrieve_context(&self, query: &str) -> Result<String>;
}

/// Open the repository selected by the configuration.
pub async fn open(config: &Config) -> Result<Arc<dyn CaseRepository>> {
    let dataset = if config.seed_demo_data {
        Dataset::demo()
    } else {
        Dataset::default()
    };

    match config.store {
        StoreKind::Memory => {
            let store = MemoryStore::from_dataset(dataset)
                .with_latency(Duration::from_millis(config.simulated_latency_ms));
            tracing::info!(
                latency_ms = config.simulated_latency_ms,
                "Opened in-memory case store"
            );
            Ok(Arc::new(store))
        }
        StoreKind::Sqlite => {
            let store = SqliteStore::open(&config.database).await?;
            let imported = store.import_if_empty(&dataset).await?;
            tracing::info!(
                path = %config.database.display(),
                imported,
                "Opened SQLite case store"
            );
            Ok(Arc::new(store))
        }
    }
}

/// Join knowledge chunks into the retrieval blob handed to the model.
pub(crate) fn join_context(chunks: &[String]) -> String {
    chunks.join("\n\n")
}
