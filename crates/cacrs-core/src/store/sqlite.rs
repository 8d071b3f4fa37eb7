//! SQLite-backed case store.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use super::{CaseRepository, Dataset, join_context};
use crate::error::{Error, Result};
use crate::models::{
    Alert, AlertSeverity, Case, CaseEvent, CaseEventKind, CaseFile, CaseStatus, FileAnalysis,
    Finding, GroundingSource, Message, MessageRole, NewCase, NewCaseFile, NewFinding, NewMessage,
    NewWatchlist, User, UserRole, UserStatus, Watchlist, new_id,
};
use crate::schema::SCHEMA;

/// Case store backed by a SQLite database.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub async fn open(path: &Path) -> Result<Self> {
        let parent = path.parent().unwrap_or(Path::new("."));
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Initialize schema.
    async fn init(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database.
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Load a dataset when the database holds no cases, users or knowledge.
    /// Returns whether anything was imported.
    pub async fn import_if_empty(&self, dataset: &Dataset) -> Result<bool> {
        if dataset.is_empty() {
            return Ok(false);
        }
        let (cases, users, chunks): (i64, i64, i64) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM cases), (SELECT COUNT(*) FROM users), (SELECT COUNT(*) FROM knowledge_chunks)",
        )
        .fetch_one(&self.pool)
        .await?;
        if cases + users + chunks > 0 {
            return Ok(false);
        }

        let mut tx = self.pool.begin().await?;
        for case in &dataset.cases {
            sqlx::query(
                "INSERT INTO cases (id, title, description, status, category, tags, created_by, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&case.id)
            .bind(&case.title)
            .bind(&case.description)
            .bind(case.status.as_str())
            .bind(&case.category)
            .bind(serde_json::to_string(&case.tags)?)
            .bind(&case.created_by)
            .bind(case.created_at.timestamp_millis())
            .bind(case.updated_at.timestamp_millis())
            .execute(&mut *tx)
            .await?;
        }
        for (case_id, file) in &dataset.files {
            insert_file(&mut tx, case_id, file).await?;
        }
        for event in &dataset.events {
            insert_event(&mut tx, event).await?;
        }
        for (case_id, message) in &dataset.messages {
            insert_message(&mut tx, case_id, message).await?;
        }
        for user in &dataset.users {
            sqlx::query("INSERT INTO users (id, email, role, status) VALUES (?, ?, ?, ?)")
                .bind(&user.id)
                .bind(&user.email)
                .bind(user.role.as_str())
                .bind(user.status.as_str())
                .execute(&mut *tx)
                .await?;
        }
        for finding in &dataset.findings {
            insert_finding(&mut tx, finding).await?;
        }
        for alert in &dataset.alerts {
            sqlx::query(
                "INSERT INTO alerts (id, title, description, severity, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&alert.id)
            .bind(&alert.title)
            .bind(&alert.description)
            .bind(alert.severity.as_str())
            .bind(alert.timestamp.timestamp_millis())
            .execute(&mut *tx)
            .await?;
        }
        for watchlist in &dataset.watchlists {
            insert_watchlist(&mut tx, watchlist).await?;
        }
        for chunk in &dataset.knowledge {
            sqlx::query("INSERT INTO knowledge_chunks (content) VALUES (?)")
                .bind(chunk)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn require_case(&self, case_id: &str) -> Result<()> {
        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM cases WHERE id = ?")
            .bind(case_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_some() {
            Ok(())
        } else {
            Err(Error::NotFound(format!("case {case_id}")))
        }
    }

    async fn fetch_message(&self, case_id: &str, message_id: &str) -> Result<Message> {
        let row = sqlx::query("SELECT * FROM messages WHERE case_id = ? AND id = ?")
            .bind(case_id)
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("message {message_id} in case {case_id}")))?;
        message_from_row(&row)
    }

    async fn fetch_user(&self, id: &str) -> Result<User> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("user {id}")))?;
        user_from_row(&row)
    }
}

type Tx<'a> = sqlx::Transaction<'a, sqlx::Sqlite>;

async fn insert_file(tx: &mut Tx<'_>, case_id: &str, file: &CaseFile) -> Result<()> {
    let analysis = file
        .analysis
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    sqlx::query(
        "INSERT INTO case_files (id, case_id, name, mime_type, size, uploaded_at, uploaded_by, analysis, content_base64)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&file.id)
    .bind(case_id)
    .bind(&file.name)
    .bind(&file.mime_type)
    .bind(i64::try_from(file.size).unwrap_or(i64::MAX))
    .bind(file.uploaded_at.timestamp_millis())
    .bind(&file.uploaded_by)
    .bind(analysis)
    .bind(&file.content_base64)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_event(tx: &mut Tx<'_>, event: &CaseEvent) -> Result<()> {
    sqlx::query(
        "INSERT INTO case_events (id, case_id, kind, created_by, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&event.id)
    .bind(&event.case_id)
    .bind(serde_json::to_string(&event.kind)?)
    .bind(&event.created_by)
    .bind(event.created_at.timestamp_millis())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_message(tx: &mut Tx<'_>, case_id: &str, message: &Message) -> Result<()> {
    let sources = message
        .sources
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    sqlx::query(
        "INSERT INTO messages (id, case_id, role, content, created_at, sources, is_report, is_selected)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&message.id)
    .bind(case_id)
    .bind(message.role.to_string())
    .bind(&message.content)
    .bind(message.timestamp.timestamp_millis())
    .bind(sources)
    .bind(message.is_report)
    .bind(message.is_selected)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_finding(tx: &mut Tx<'_>, finding: &Finding) -> Result<()> {
    sqlx::query("INSERT INTO findings (id, query, text, sources, saved_at) VALUES (?, ?, ?, ?, ?)")
        .bind(&finding.id)
        .bind(&finding.query)
        .bind(&finding.text)
        .bind(serde_json::to_string(&finding.sources)?)
        .bind(finding.saved_at.timestamp_millis())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn insert_watchlist(tx: &mut Tx<'_>, watchlist: &Watchlist) -> Result<()> {
    sqlx::query(
        "INSERT INTO watchlists (id, name, query, refresh_interval_minutes, last_run) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&watchlist.id)
    .bind(&watchlist.name)
    .bind(&watchlist.query)
    .bind(i64::from(watchlist.refresh_interval_minutes))
    .bind(watchlist.last_run.timestamp_millis())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn ts(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn case_from_row(row: &SqliteRow) -> Result<Case> {
    Ok(Case {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        category: row.try_get("category")?,
        tags: serde_json::from_str(&row.try_get::<String, _>("tags")?)?,
        created_by: row.try_get("created_by")?,
        created_at: ts(row.try_get("created_at")?),
        updated_at: ts(row.try_get("updated_at")?),
    })
}

fn file_from_row(row: &SqliteRow) -> Result<CaseFile> {
    let analysis = row
        .try_get::<Option<String>, _>("analysis")?
        .map(|raw| serde_json::from_str::<FileAnalysis>(&raw))
        .transpose()?;
    Ok(CaseFile {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        mime_type: row.try_get("mime_type")?,
        size: u64::try_from(row.try_get::<i64, _>("size")?).unwrap_or_default(),
        uploaded_at: ts(row.try_get("uploaded_at")?),
        uploaded_by: row.try_get("uploaded_by")?,
        analysis,
        content_base64: row.try_get("content_base64")?,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<CaseEvent> {
    Ok(CaseEvent {
        id: row.try_get("id")?,
        case_id: row.try_get("case_id")?,
        kind: serde_json::from_str(&row.try_get::<String, _>("kind")?)?,
        created_by: row.try_get("created_by")?,
        created_at: ts(row.try_get("created_at")?),
    })
}

fn message_from_row(row: &SqliteRow) -> Result<Message> {
    let sources = row
        .try_get::<Option<String>, _>("sources")?
        .map(|raw| serde_json::from_str::<Vec<GroundingSource>>(&raw))
        .transpose()?;
    Ok(Message {
        id: row.try_get("id")?,
        role: row.try_get::<String, _>("role")?.parse::<MessageRole>()?,
        content: row.try_get("content")?,
        timestamp: ts(row.try_get("created_at")?),
        sources,
        is_report: row.try_get("is_report")?,
        is_selected: row.try_get("is_selected")?,
    })
}

fn finding_from_row(row: &SqliteRow) -> Result<Finding> {
    Ok(Finding {
        id: row.try_get("id")?,
        query: row.try_get("query")?,
        text: row.try_get("text")?,
        sources: serde_json::from_str(&row.try_get::<String, _>("sources")?)?,
        saved_at: ts(row.try_get("saved_at")?),
    })
}

fn watchlist_from_row(row: &SqliteRow) -> Result<Watchlist> {
    Ok(Watchlist {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        query: row.try_get("query")?,
        refresh_interval_minutes: u32::try_from(
            row.try_get::<i64, _>("refresh_interval_minutes")?,
        )
        .unwrap_or_default(),
        last_run: ts(row.try_get("last_run")?),
    })
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        role: row.try_get::<String, _>("role")?.parse::<UserRole>()?,
        status: row.try_get::<String, _>("status")?.parse::<UserStatus>()?,
    })
}

fn alert_from_row(row: &SqliteRow) -> Result<Alert> {
    Ok(Alert {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        severity: row.try_get::<String, _>("severity")?.parse::<AlertSeverity>()?,
        timestamp: ts(row.try_get("created_at")?),
    })
}

fn collect<T>(rows: &[SqliteRow], map: fn(&SqliteRow) -> Result<T>) -> Result<Vec<T>> {
    rows.iter().map(map).collect()
}

#[async_trait]
impl CaseRepository for SqliteStore {
    async fn list_cases(&self) -> Result<Vec<Case>> {
        let rows = sqlx::query("SELECT * FROM cases ORDER BY created_at DESC, rowid DESC")
            .fetch_all(&self.pool)
            .await?;
        collect(&rows, case_from_row)
    }

    async fn get_case(&self, id: &str) -> Result<Option<Case>> {
        let row = sqlx::query("SELECT * FROM cases WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(case_from_row).transpose()
    }

    async fn create_case(&self, new_case: NewCase, created_by: &str) -> Result<Case> {
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
        sqlx::query(
            "INSERT INTO cases (id, title, description, status, category, tags, created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&case.id)
        .bind(&case.title)
        .bind(&case.description)
        .bind(case.status.as_str())
        .bind(&case.category)
        .bind(serde_json::to_string(&case.tags)?)
        .bind(&case.created_by)
        .bind(now.timestamp_millis())
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(case)
    }

    async fn set_case_status(
        &self,
        id: &str,
        status: CaseStatus,
        changed_by: &str,
    ) -> Result<Case> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT * FROM cases WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::NotFound(format!("case {id}")))?;
        let mut case = case_from_row(&row)?;
        let old = case.status;
        case.status = status;
        case.updated_at = Utc::now();

        sqlx::query("UPDATE cases SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(case.updated_at.timestamp_millis())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if old != status {
            let event = CaseEvent {
                id: new_id("evt"),
                case_id: id.to_string(),
                kind: CaseEventKind::StatusChange { old, new: status },
                created_by: changed_by.to_string(),
                created_at: case.updated_at,
            };
            insert_event(&mut tx, &event).await?;
        }
        tx.commit().await?;
        Ok(case)
    }

    async fn delete_case(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM cases WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("case {id}")));
        }
        Ok(())
    }

    async fn list_files(&self, case_id: &str) -> Result<Vec<CaseFile>> {
        let rows = sqlx::query("SELECT * FROM case_files WHERE case_id = ? ORDER BY seq")
            .bind(case_id)
            .fetch_all(&self.pool)
            .await?;
        collect(&rows, file_from_row)
    }

    async fn get_file(&self, case_id: &str, file_id: &str) -> Result<Option<CaseFile>> {
        let row = sqlx::query("SELECT * FROM case_files WHERE case_id = ? AND id = ?")
            .bind(case_id)
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(file_from_row).transpose()
    }

    async fn add_file(
        &self,
        case_id: &str,
        file: NewCaseFile,
        uploaded_by: &str,
    ) -> Result<CaseFile> {
        self.require_case(case_id).await?;
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
        let event = CaseEvent {
            id: new_id("evt"),
            case_id: case_id.to_string(),
            kind: CaseEventKind::FileAdded {
                file_name: stored.name.clone(),
            },
            created_by: uploaded_by.to_string(),
            created_at: stored.uploaded_at,
        };
        let mut tx = self.pool.begin().await?;
        insert_file(&mut tx, case_id, &stored).await?;
        insert_event(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn set_file_analysis(
        &self,
        case_id: &str,
        file_id: &str,
        analysis: FileAnalysis,
    ) -> Result<CaseFile> {
        let mut file = self
            .get_file(case_id, file_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("file {file_id} in case {case_id}")))?;
        let event = CaseEvent {
            id: new_id("evt"),
            case_id: case_id.to_string(),
            kind: CaseEventKind::AiAnalysis {
                file_name: file.name.clone(),
                summary: analysis.summary.clone(),
            },
            created_by: "assistant".to_string(),
            created_at: Utc::now(),
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE case_files SET analysis = ? WHERE case_id = ? AND id = ?")
            .bind(serde_json::to_string(&analysis)?)
            .bind(case_id)
            .bind(file_id)
            .execute(&mut *tx)
            .await?;
        insert_event(&mut tx, &event).await?;
        tx.commit().await?;

        file.analysis = Some(analysis);
        Ok(file)
    }

    async fn list_events(&self, case_id: &str) -> Result<Vec<CaseEvent>> {
        let rows = sqlx::query("SELECT * FROM case_events WHERE case_id = ? ORDER BY seq")
            .bind(case_id)
            .fetch_all(&self.pool)
            .await?;
        collect(&rows, event_from_row)
    }

    async fn record_event(
        &self,
        case_id: &str,
        kind: CaseEventKind,
        created_by: &str,
    ) -> Result<CaseEvent> {
        self.require_case(case_id).await?;
        let event = CaseEvent {
            id: new_id("evt"),
            case_id: case_id.to_string(),
            kind,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        };
        let mut tx = self.pool.begin().await?;
        insert_event(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(event)
    }

    async fn list_messages(&self, case_id: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query("SELECT * FROM messages WHERE case_id = ? ORDER BY seq")
            .bind(case_id)
            .fetch_all(&self.pool)
            .await?;
        collect(&rows, message_from_row)
    }

    async fn append_message(&self, case_id: &str, message: NewMessage) -> Result<Message> {
        self.require_case(case_id).await?;
        let stored = Message {
            id: new_id("msg"),
            role: message.role,
            content: message.content,
            timestamp: Utc::now(),
            sources: message.sources,
            is_report: message.is_report,
            is_selected: false,
        };
        let mut tx = self.pool.begin().await?;
        insert_message(&mut tx, case_id, &stored).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn update_message_content(
        &self,
        case_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<Message> {
        let result = sqlx::query("UPDATE messages SET content = ? WHERE case_id = ? AND id = ?")
            .bind(content)
            .bind(case_id)
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "message {message_id} in case {case_id}"
            )));
        }
        self.fetch_message(case_id, message_id).await
    }

    async fn set_message_selected(
        &self,
        case_id: &str,
        message_id: &str,
        selected: bool,
    ) -> Result<Message> {
        let mut message = self.fetch_message(case_id, message_id).await?;
        if selected && !message.is_selectable() {
            return Err(Error::InvalidInput(format!(
                "report message {message_id} cannot be selected"
            )));
        }
        sqlx::query("UPDATE messages SET is_selected = ? WHERE case_id = ? AND id = ?")
            .bind(selected)
            .bind(case_id)
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        message.is_selected = selected;
        Ok(message)
    }

    async fn clear_selection(&self, case_id: &str) -> Result<()> {
        sqlx::query("UPDATE messages SET is_selected = 0 WHERE case_id = ?")
            .bind(case_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_findings(&self) -> Result<Vec<Finding>> {
        let rows = sqlx::query("SELECT * FROM findings ORDER BY saved_at DESC, rowid DESC")
            .fetch_all(&self.pool)
            .await?;
        collect(&rows, finding_from_row)
    }

    async fn add_finding(&self, finding: NewFinding) -> Result<Finding> {
        let stored = Finding {
            id: new_id("fin"),
            query: finding.query,
            text: finding.text,
            sources: finding.sources,
            saved_at: Utc::now(),
        };
        let mut tx = self.pool.begin().await?;
        insert_finding(&mut tx, &stored).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn delete_findings(&self, ids: &[String]) -> Result<usize> {
        let mut removed = 0;
        let mut tx = self.pool.begin().await?;
        for id in ids {
            let result = sqlx::query("DELETE FROM findings WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            removed += usize::try_from(result.rows_affected()).unwrap_or_default();
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn list_watchlists(&self) -> Result<Vec<Watchlist>> {
        let rows = sqlx::query("SELECT * FROM watchlists ORDER BY last_run DESC, rowid DESC")
            .fetch_all(&self.pool)
            .await?;
        collect(&rows, watchlist_from_row)
    }

    async fn add_watchlist(&self, watchlist: NewWatchlist) -> Result<Watchlist> {
        let stored = Watchlist {
            id: new_id("wl"),
            name: watchlist.name,
            query: watchlist.query,
            refresh_interval_minutes: watchlist.refresh_interval_minutes,
            last_run: Utc::now(),
        };
        let mut tx = self.pool.begin().await?;
        insert_watchlist(&mut tx, &stored).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;
        collect(&rows, user_from_row)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, role, status)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                role = excluded.role,
                status = excluded.status
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_user_role(&self, id: &str, role: UserRole) -> Result<User> {
        sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.fetch_user(id).await
    }

    async fn set_user_status(&self, id: &str, status: UserStatus) -> Result<User> {
        sqlx::query("UPDATE users SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.fetch_user(id).await
    }

    async fn list_alerts(&self) -> Result<Vec<Alert>> {
        let rows = sqlx::query("SELECT * FROM alerts ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        collect(&rows, alert_from_row)
    }

    async fn retrieve_context(&self, _query: &str) -> Result<String> {
        let chunks: Vec<(String,)> =
            sqlx::query_as("SELECT content FROM knowledge_chunks ORDER BY seq")
                .fetch_all(&self.pool)
                .await?;
        let chunks: Vec<String> = chunks.into_iter().map(|(content,)| content).collect();
        Ok(join_context(&chunks))
    }
}
