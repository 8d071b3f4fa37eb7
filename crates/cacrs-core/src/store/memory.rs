//! In-process case store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{CaseRepository, Dataset, join_context};
use crate::error::{Error, Result};
use crate::models::{
    Alert, Case, CaseEvent, CaseEventKind, CaseFile, CaseStatus, FileAnalysis, Finding, Message,
    NewCase, NewCaseFile, NewFinding, NewMessage, NewWatchlist, User, UserRole, UserStatus,
    Watchlist, new_id,
};

#[derive(Debug, Default)]
struct Tables {
    cases: Vec<Case>,
    files: HashMap<String, Vec<CaseFile>>,
    events: HashMap<String, Vec<CaseEvent>>,
    messages: HashMap<String, Vec<Message>>,
    users: Vec<User>,
    findings: Vec<Finding>,
    alerts: Vec<Alert>,
    watchlists: Vec<Watchlist>,
    knowledge: Vec<String>,
}

impl Tables {
    fn require_case(&self, case_id: &str) -> Result<()> {
        if self.cases.iter().any(|c| c.id == case_id) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("case {case_id}")))
        }
    }

    fn push_event(&mut self, case_id: &str, kind: CaseEventKind, created_by: &str) -> CaseEvent {
        let event = CaseEvent {
            id: new_id("evt"),
            case_id: case_id.to_string(),
            kind,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        };
        self.events
            .entry(case_id.to_string())
            .or_default()
            .push(event.clone());
        event
    }

    fn message_mut(&mut self, case_id: &str, message_id: &str) -> Result<&mut Message> {
        self.messages
            .get_mut(case_id)
            .and_then(|log| log.iter_mut().find(|m| m.id == message_id))
            .ok_or_else(|| Error::NotFound(format!("message {message_id} in case {case_id}")))
    }

    fn user_mut(&mut self, id: &str) -> Result<&mut User> {
        self.users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| Error::NotFound(format!("user {id}")))
    }
}

/// Case store backed by in-process tables.
///
/// Every call optionally sleeps for a fixed latency so that local demos
/// behave like a networked backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    latency: Duration,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store preloaded with the given dataset.
    pub fn from_dataset(dataset: Dataset) -> Self {
        let mut tables = Tables {
            cases: dataset.cases,
            users: dataset.users,
            findings: dataset.findings,
            alerts: dataset.alerts,
            watchlists: dataset.watchlists,
            knowledge: dataset.knowledge,
            ..Tables::default()
        };
        // Listings are newest first; inserts keep that order by pushing to the front.
        tables.cases.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tables.findings.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        tables.watchlists.sort_by(|a, b| b.last_run.cmp(&a.last_run));
        tables.alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        for (case_id, file) in dataset.files {
            tables.files.entry(case_id).or_default().push(file);
        }
        for (case_id, message) in dataset.messages {
            tables.messages.entry(case_id).or_default().push(message);
        }
        for event in dataset.events {
            tables
                .events
                .entry(event.case_id.clone())
                .or_default()
                .push(event);
        }
        Self {
            tables: RwLock::new(tables),
            latency: Duration::ZERO,
        }
    }

    /// The demo dataset, no latency.
    pub fn seeded() -> Self {
        Self::from_dataset(Dataset::demo())
    }

    /// Apply an artificial delay to every call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl CaseRepository for MemoryStore {
    async fn list_cases(&self) -> Result<Vec<Case>> {
        self.pause().await;
        Ok(self.tables.read().await.cases.clone())
    }

    async fn get_case(&self, id: &str) -> Result<Option<Case>> {
        self.pause().await;
        let tables = self.tables.read().await;
        Ok(tables.cases.iter().find(|c| c.id == id).cloned())
    }

    async fn create_case(&self, new_case: NewCase, created_by: &str) -> Result<Case> {
        self.pause().await;
        let new_case = new_case.normalized()?;
        let now = Utc::now();
        let case = Case {
            id: new_id("case"),
            title: new_case.title,
            description: new_case.description,
            status: CaseStatus::Open,
            category: new_case.category,
            tags: new_case.tags,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.cases.insert(0, case.clone());
        Ok(case)
    }

    async fn set_case_status(
        &self,
        id: &str,
        status: CaseStatus,
        changed_by: &str,
    ) -> Result<Case> {
        self.pause().await;
        let mut tables = self.tables.write().await;
        let case = tables
            .cases
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::NotFound(format!("case {id}")))?;
        let old = case.status;
        case.status = status;
        case.updated_at = Utc::now();
        let updated = case.clone();
        if old != status {
            tables.push_event(id, CaseEventKind::StatusChange { old, new: status }, changed_by);
        }
        Ok(updated)
    }

    async fn delete_case(&self, id: &str) -> Result<()> {
        self.pause().await;
        let mut tables = self.tables.write().await;
        let before = tables.cases.len();
        tables.cases.retain(|c| c.id != id);
        if tables.cases.len() == before {
            return Err(Error::NotFound(format!("case {id}")));
        }
        tables.files.remove(id);
        tables.events.remove(id);
        tables.messages.remove(id);
        Ok(())
    }

    async fn list_files(&self, case_id: &str) -> Result<Vec<CaseFile>> {
        self.pause().await;
        let tables = self.tables.read().await;
        Ok(tables.files.get(case_id).cloned().unwrap_or_default())
    }

    async fn get_file(&self, case_id: &str, file_id: &str) -> Result<Option<CaseFile>> {
        self.pause().await;
        let tables = self.tables.read().await;
        Ok(tables
            .files
            .get(case_id)
            .and_then(|files| files.iter().find(|f| f.id == file_id))
            .cloned())
    }

    async fn add_file(
        &self,
        case_id: &str,
        file: NewCaseFile,
        uploaded_by: &str,
    ) -> Result<CaseFile> {
        self.pause().await;
        let mut tables = self.tables.write().await;
        tables.require_case(case_id)?;
        let stored = CaseFile {
            id: new_id("file"),
            name: file.name,
            mime_type: file.mime_type,
            size: file.size,
            uploaded_at: Utc::now(),
            uploaded_by: uploaded_by.to_string(),
            analysis: None,
            content_base64: file.content_base64,
        };
        tables
            .files
            .entry(case_id.to_string())
            .or_default()
            .push(stored.clone());
        tables.push_event(
            case_id,
            CaseEventKind::FileAdded {
                file_name: stored.name.clone(),
            },
            uploaded_by,
        );
        Ok(stored)
    }

    async fn set_file_analysis(
        &self,
        case_id: &str,
        file_id: &str,
        analysis: FileAnalysis,
    ) -> Result<CaseFile> {
        self.pause().await;
        let mut tables = self.tables.write().await;
        let file = tables
            .files
            .get_mut(case_id)
            .and_then(|files| files.iter_mut().find(|f| f.id == file_id))
            .ok_or_else(|| Error::NotFound(format!("file {file_id} in case {case_id}")))?;
        let summary = analysis.summary.clone();
        file.analysis = Some(analysis);
        let updated = file.clone();
        tables.push_event(
            case_id,
            CaseEventKind::AiAnalysis {
                file_name: updated.name.clone(),
                summary,
            },
            "assistant",
        );
        Ok(updated)
    }

    async fn list_events(&self, case_id: &str) -> Result<Vec<CaseEvent>> {
        self.pause().await;
        let tables = self.tables.read().await;
        Ok(tables.events.get(case_id).cloned().unwrap_or_default())
    }

    async fn record_event(
        &self,
        case_id: &str,
        kind: CaseEventKind,
        created_by: &str,
    ) -> Result<CaseEvent> {
        self.pause().await;
        let mut tables = self.tables.write().await;
        tables.require_case(case_id)?;
        Ok(tables.push_event(case_id, kind, created_by))
    }

    async fn list_messages(&self, case_id: &str) -> Result<Vec<Message>> {
        self.pause().await;
        let tables = self.tables.read().await;
        Ok(tables.messages.get(case_id).cloned().unwrap_or_default())
    }

    async fn append_message(&self, case_id: &str, message: NewMessage) -> Result<Message> {
        self.pause().await;
        let mut tables = self.tables.write().await;
        tables.require_case(case_id)?;
        let stored = Message {
            id: new_id("msg"),
            role: message.role,
            content: message.content,
            timestamp: Utc::now(),
            sources: message.sources,
            is_report: message.is_report,
            is_selected: false,
        };
        tables
            .messages
            .entry(case_id.to_string())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn update_message_content(
        &self,
        case_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<Message> {
        self.pause().await;
        let mut tables = self.tables.write().await;
        let message = tables.message_mut(case_id, message_id)?;
        content.clone_into(&mut message.content);
        Ok(message.clone())
    }

    async fn set_message_selected(
        &self,
        case_id: &str,
        message_id: &str,
        selected: bool,
    ) -> Result<Message> {
        self.pause().await;
        let mut tables = self.tables.write().await;
        let message = tables.message_mut(case_id, message_id)?;
        if selected && !message.is_selectable() {
            return Err(Error::InvalidInput(format!(
                "report message {message_id} cannot be selected"
            )));
        }
        message.is_selected = selected;
        Ok(message.clone())
    }

    async fn clear_selection(&self, case_id: &str) -> Result<()> {
        self.pause().await;
        let mut tables = self.tables.write().await;
        if let Some(log) = tables.messages.get_mut(case_id) {
            for message in log.iter_mut() {
                message.is_selected = false;
            }
        }
        Ok(())
    }

    async fn list_findings(&self) -> Result<Vec<Finding>> {
        self.pause().await;
        Ok(self.tables.read().await.findings.clone())
    }

    async fn add_finding(&self, finding: NewFinding) -> Result<Finding> {
        self.pause().await;
        let stored = Finding {
            id: new_id("fin"),
            query: finding.query,
            text: finding.text,
            sources: finding.sources,
            saved_at: Utc::now(),
        };
        self.tables.write().await.findings.insert(0, stored.clone());
        Ok(stored)
    }

    async fn delete_findings(&self, ids: &[String]) -> Result<usize> {
        self.pause().await;
        let mut tables = self.tables.write().await;
        let before = tables.findings.len();
        tables.findings.retain(|f| !ids.contains(&f.id));
        Ok(before - tables.findings.len())
    }

    async fn list_watchlists(&self) -> Result<Vec<Watchlist>> {
        self.pause().await;
        Ok(self.tables.read().await.watchlists.clone())
    }

    async fn add_watchlist(&self, watchlist: NewWatchlist) -> Result<Watchlist> {
        self.pause().await;
        let stored = Watchlist {
            id: new_id("wl"),
            name: watchlist.name,
            query: watchlist.query,
            refresh_interval_minutes: watchlist.refresh_interval_minutes,
            last_run: Utc::now(),
        };
        self.tables.write().await.watchlists.insert(0, stored.clone());
        Ok(stored)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.pause().await;
        Ok(self.tables.read().await.users.clone())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.pause().await;
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        self.pause().await;
        let mut tables = self.tables.write().await;
        match tables.users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = user.clone(),
            None => tables.users.push(user.clone()),
        }
        Ok(())
    }

    async fn set_user_role(&self, id: &str, role: UserRole) -> Result<User> {
        self.pause().await;
        let mut tables = self.tables.write().await;
        let user = tables.user_mut(id)?;
        user.role = role;
        Ok(user.clone())
    }

    async fn set_user_status(&self, id: &str, status: UserStatus) -> Result<User> {
        self.pause().await;
        let mut tables = self.tables.write().await;
        let user = tables.user_mut(id)?;
        user.status = status;
        Ok(user.clone())
    }

    async fn list_alerts(&self) -> Result<Vec<Alert>> {
        self.pause().await;
        Ok(self.tables.read().await.alerts.clone())
    }

    async fn retrieve_context(&self, _query: &str) -> Result<String> {
        self.pause().await;
        Ok(join_context(&self.tables.read().await.knowledge))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageRole;

    fn new_case(title: &str) -> NewCase {
        NewCase {
            title: title.to_string(),
            description: "desc".to_string(),
            category: "Finance".to_string(),
            tags: vec!["tag".to_string()],
        }
    }

    #[tokio::test]
    async fn created_cases_are_listed_first() {
        let store = MemoryStore::seeded();
        let created = store
            .create_case(new_case("Nouveau dossier"), "Analyste Alpha")
            .await
            .expect("create");

        let cases = store.list_cases().await.expect("list");
        assert_eq!(cases[0].id, created.id);
        assert_eq!(created.status, CaseStatus::Open);
        assert_eq!(created.created_at, created.updated_at);
    }

    #[tokio::test]
    async fn seeded_listings_are_newest_first() {
        let store = MemoryStore::seeded();
        let ids: Vec<_> = store
            .list_cases()
            .await
            .expect("list")
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, ["2", "1", "3"]);

        let watchlists = store.list_watchlists().await.expect("watchlists");
        assert!(
            watchlists
                .windows(2)
                .all(|pair| pair[0].last_run >= pair[1].last_run)
        );
    }

    #[tokio::test]
    async fn status_change_records_timeline_event() {
        let store = MemoryStore::seeded();
        let updated = store
            .set_case_status("2", CaseStatus::Closed, "Analyste Bravo")
            .await
            .expect("status");
        assert_eq!(updated.status, CaseStatus::Closed);

        let events = store.list_events("2").await.expect("events");
        assert!(events.iter().any(|e| e.kind
            == CaseEventKind::StatusChange {
                old: CaseStatus::Open,
                new: CaseStatus::Closed,
            }));
    }

    #[tokio::test]
    async fn delete_case_drops_attached_records() {
        let store = MemoryStore::seeded();
        store.delete_case("1").await.expect("delete");

        assert!(store.get_case("1").await.expect("get").is_none());
        assert!(store.list_files("1").await.expect("files").is_empty());
        assert!(store.list_messages("1").await.expect("messages").is_empty());
        assert!(matches!(
            store.delete_case("1").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn append_to_missing_case_is_not_found() {
        let store = MemoryStore::new();
        let result = store.append_message("nope", NewMessage::user("x")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn report_messages_cannot_be_selected() {
        let store = MemoryStore::seeded();
        let report = store
            .append_message("1", NewMessage::report("## Rapport"))
            .await
            .expect("append");
        let result = store.set_message_selected("1", &report.id, true).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn clear_selection_resets_every_flag() {
        let store = MemoryStore::seeded();
        let first = store
            .append_message("1", NewMessage::user("a"))
            .await
            .expect("append");
        store
            .set_message_selected("1", &first.id, true)
            .await
            .expect("select");
        store
            .set_message_selected("1", "m1-1", true)
            .await
            .expect("select greeting");

        store.clear_selection("1").await.expect("clear");
        let log = store.list_messages("1").await.expect("list");
        assert!(log.iter().all(|m| !m.is_selected));
        assert_eq!(log[1].role, MessageRole::User);
    }

    #[tokio::test]
    async fn delete_findings_counts_removed() {
        let store = MemoryStore::seeded();
        let removed = store
            .delete_findings(&["fin-1".to_string(), "missing".to_string()])
            .await
            .expect("delete");
        assert_eq!(removed, 1);
        assert_eq!(store.list_findings().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn retrieval_context_joins_knowledge_chunks() {
        let store = MemoryStore::seeded();
        let context = store.retrieve_context("ingérence").await.expect("context");
        assert!(context.contains("Directive 03-B"));
        assert_eq!(context.split("\n\n").count(), 3);
    }

    #[tokio::test]
    async fn latency_is_applied() {
        let store = MemoryStore::new().with_latency(Duration::from_millis(20));
        let started = std::time::Instant::now();
        store.list_cases().await.expect("list");
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
