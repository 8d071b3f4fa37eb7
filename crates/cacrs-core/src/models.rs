//! Domain models for investigative casework.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Platform roles, from most to least privileged.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Analyst,
    Contributor,
    Viewer,
}

/// Account status. Blocked accounts cannot open a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[serde(alias = "actif")]
    Active,
    #[serde(alias = "bloqué")]
    Blocked,
}

/// A platform user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub role: UserRole,
    pub status: UserStatus,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Lifecycle of a case. Any status is reachable from any other.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Open,
    InProgress,
    Closed,
}

impl CaseStatus {
    pub const ALL: [CaseStatus; 3] = [CaseStatus::Open, CaseStatus::InProgress, CaseStatus::Closed];

    /// Display label used in the analyst-facing interface.
    pub fn label(self) -> &'static str {
        match self {
            CaseStatus::Open => "Ouvert",
            CaseStatus::InProgress => "En cours",
            CaseStatus::Closed => "Fermé",
        }
    }
}

/// An investigation case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: CaseStatus,
    pub category: String,
    pub tags: Vec<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when opening a case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCase {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewCase {
    /// Trim fields and drop empty or duplicate tags.
    pub fn normalized(mut self) -> crate::Result<Self> {
        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            return Err(Error::InvalidInput("case title is required".to_string()));
        }
        self.description = self.description.trim().to_string();
        self.category = self.category.trim().to_string();
        let mut tags: Vec<String> = Vec::new();
        for tag in self.tags {
            let tag = tag.trim().to_string();
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        self.tags = tags;
        Ok(self)
    }
}

/// Structured result of an AI file analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileAnalysis {
    pub summary: String,
    pub entities: Vec<String>,
    pub risks: Vec<String>,
}

/// A file attached to a case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaseFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub uploaded_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<FileAnalysis>,
    /// Base64 payload, only present for files uploaded through the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_base64: Option<String>,
}

impl CaseFile {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// An upload request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCaseFile {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    #[serde(default)]
    pub content_base64: Option<String>,
}

/// Chat roles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" | "human" => Ok(MessageRole::User),
            "assistant" | "model" | "ai" => Ok(MessageRole::Assistant),
            other => Err(Error::InvalidInput(format!("unknown message role: {other}"))),
        }
    }
}

/// A web source backing an answer or a finding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroundingSource {
    pub uri: String,
    pub title: String,
}

/// A chat message in a case log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<GroundingSource>>,
    #[serde(default)]
    pub is_report: bool,
    #[serde(default)]
    pub is_selected: bool,
}

impl Message {
    /// Reports cannot be selected for another report.
    pub fn is_selectable(&self) -> bool {
        !self.is_report
    }
}

/// A message about to be appended to a case log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub sources: Option<Vec<GroundingSource>>,
    #[serde(default)]
    pub is_report: bool,
}

impl NewMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            sources: None,
            is_report: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            sources: None,
            is_report: false,
        }
    }

    pub fn report(content: impl Into<String>) -> Self {
        Self {
            is_report: true,
            ..Self::assistant(content)
        }
    }
}

/// What happened on a case, one variant per event kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CaseEventKind {
    Message {
        author: String,
        text: String,
    },
    FileAdded {
        #[serde(rename = "fileName")]
        file_name: String,
    },
    StatusChange {
        old: CaseStatus,
        new: CaseStatus,
    },
    AiAnalysis {
        #[serde(rename = "fileName")]
        file_name: String,
        summary: String,
    },
}

/// A timeline entry for a case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaseEvent {
    pub id: String,
    pub case_id: String,
    pub kind: CaseEventKind,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// A saved web-search result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub id: String,
    pub query: String,
    pub text: String,
    pub sources: Vec<GroundingSource>,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFinding {
    pub query: String,
    pub text: String,
    #[serde(default)]
    pub sources: Vec<GroundingSource>,
}

/// A named, recurring saved search. Only `last_run` at creation is recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Watchlist {
    pub id: String,
    pub name: String,
    pub query: String,
    pub refresh_interval_minutes: u32,
    pub last_run: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWatchlist {
    pub name: String,
    pub query: String,
    pub refresh_interval_minutes: u32,
}

/// Alert severity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    High,
    Medium,
    Low,
}

/// A security alert shown on the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: AlertSeverity,
    pub timestamp: DateTime<Utc>,
}

macro_rules! text_enum {
    ($ty:ty { $($variant:path => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($variant => $text,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($variant),)+
                    other => Err(Error::InvalidInput(format!(
                        "unknown {}: {other}",
                        stringify!($ty)
                    ))),
                }
            }
        }
    };
}

text_enum!(UserRole {
    UserRole::Admin => "admin",
    UserRole::Analyst => "analyst",
    UserRole::Contributor => "contributor",
    UserRole::Viewer => "viewer",
});

text_enum!(UserStatus {
    UserStatus::Active => "active",
    UserStatus::Blocked => "blocked",
});

text_enum!(CaseStatus {
    CaseStatus::Open => "open",
    CaseStatus::InProgress => "in_progress",
    CaseStatus::Closed => "closed",
});

text_enum!(AlertSeverity {
    AlertSeverity::High => "high",
    AlertSeverity::Medium => "medium",
    AlertSeverity::Low => "low",
});

/// New identifier with a readable prefix, e.g. `case-0b6f...`.
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
#[path = "models_tests.rs"]
mod tests;
